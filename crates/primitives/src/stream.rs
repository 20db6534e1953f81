use tokio::io::{AsyncRead, AsyncWrite};

/// Byte-oriented duplex as the daemon sees it: a control socket connection
/// or a remote P2P stream, already adapted to tokio io. Framing happens on
/// top of this, with [`crate::codec::ControlCodec`].
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

pub type BoxedIo = Box<dyn Io>;
