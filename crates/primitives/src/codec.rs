#[cfg(test)]
#[path = "codec_test.rs"]
mod tests;

use core::marker::PhantomData;

use borsh::{BorshDeserialize, BorshSerialize};
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Default cap on a single framed message, on either wire.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1_024 * 1_024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    StdIo(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    SerDe(std::io::Error),
}

/// Length-delimited borsh framing.
///
/// Decodes `T`; encodes any serializable message, so one codec type serves
/// both directions of a duplex (requests in, responses out, and vice versa
/// on the client side).
#[derive(Debug)]
pub struct ControlCodec<T> {
    length_codec: LengthDelimitedCodec,
    _marker: PhantomData<T>,
}

impl<T> ControlCodec<T> {
    #[must_use]
    pub fn new(max_msg_size: usize) -> Self {
        Self {
            length_codec: LengthDelimitedCodec::builder()
                .max_frame_length(max_msg_size)
                .new_codec(),
            _marker: PhantomData,
        }
    }
}

impl<T: BorshDeserialize> Decoder for ControlCodec<T> {
    type Item = T;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame) = self.length_codec.decode(src)? else {
            return Ok(None);
        };

        borsh::from_slice(&frame).map(Some).map_err(CodecError::SerDe)
    }
}

impl<T, U: BorshSerialize> Encoder<U> for ControlCodec<T> {
    type Error = CodecError;

    fn encode(&mut self, item: U, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let encoded = borsh::to_vec(&item).map_err(CodecError::SerDe)?;

        self.length_codec
            .encode(Bytes::from(encoded), dst)
            .map_err(CodecError::StdIo)
    }
}
