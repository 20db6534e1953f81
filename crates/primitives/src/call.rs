use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use thiserror::Error as ThisError;

const BYTES_LEN: usize = 16;

/// Identifier of one unary call, chosen by the client.
///
/// Travels on the wire as a raw 16-byte field so that a malformed width only
/// affects the request carrying it, never the framing of the connection.
#[derive(Copy, Clone, Eq, Hash, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct CallId([u8; BYTES_LEN]);

impl CallId {
    pub const LEN: usize = BYTES_LEN;

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; BYTES_LEN] {
        &self.0
    }

    #[must_use]
    pub fn to_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl From<[u8; BYTES_LEN]> for CallId {
    fn from(id: [u8; BYTES_LEN]) -> Self {
        Self(id)
    }
}

#[derive(Clone, Copy, Debug, ThisError)]
#[error("call id must be {len} bytes, got {0}", len = BYTES_LEN)]
pub struct InvalidCallId(pub usize);

impl TryFrom<&[u8]> for CallId {
    type Error = InvalidCallId;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let id = <[u8; BYTES_LEN]>::try_from(bytes).map_err(|_| InvalidCallId(bytes.len()))?;
        Ok(Self(id))
    }
}

impl Display for CallId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(&hex::encode(self.0))
    }
}

impl fmt::Debug for CallId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CallId").field(&hex::encode(self.0)).finish()
    }
}

impl FromStr for CallId {
    type Err = InvalidCallId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| InvalidCallId(0))?;
        Self::try_from(&bytes[..])
    }
}
