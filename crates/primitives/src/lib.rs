pub mod call;
pub mod codec;
pub mod control;
pub mod stream;

pub use call::{CallId, InvalidCallId};
pub use codec::{CodecError, ControlCodec, DEFAULT_MAX_MESSAGE_SIZE};
pub use control::{CallResult, ControlRequest, ControlResponse, RequestPayload, ResponsePayload};
pub use stream::BoxedIo;
