use borsh::{BorshDeserialize, BorshSerialize};
use libp2p::PeerId;

use crate::call::CallId;

/// One frame sent by a client to the daemon, or between daemons on a remote
/// unary stream. The `call_id` field is raw bytes on purpose: a bad width is
/// a per-call error, not a decode error for the whole connection.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct ControlRequest {
    pub call_id: Vec<u8>,
    pub payload: RequestPayload,
}

impl ControlRequest {
    #[must_use]
    pub fn new(call_id: CallId, payload: RequestPayload) -> Self {
        Self {
            call_id: call_id.to_vec(),
            payload,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum RequestPayload {
    /// Promotes a freshly accepted control connection to a persistent
    /// session. Must be the first frame on the connection.
    Upgrade,
    AddUnaryHandler {
        protocol: String,
    },
    CallUnary {
        /// Binary encoding of the target's `PeerId`.
        peer: Vec<u8>,
        protocol: String,
        payload: Vec<u8>,
    },
    UnaryResponse(CallResult),
    Cancel,
}

/// One frame sent by the daemon back to a client.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct ControlResponse {
    pub call_id: Vec<u8>,
    pub payload: ResponsePayload,
}

#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum ResponsePayload {
    Ok,
    CallUnaryResponse(CallResult),
    /// A remote peer opened a unary call on a protocol this client
    /// registered. `peer` carries the connection's verified remote identity,
    /// never the peer-supplied bytes.
    RequestHandling {
        peer: Vec<u8>,
        protocol: String,
        payload: Vec<u8>,
    },
    Cancel,
    DaemonError {
        message: String,
    },
}

/// Application-level outcome of a unary call, opaque to the daemon.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum CallResult {
    Payload(Vec<u8>),
    Error(String),
}

impl ControlResponse {
    #[must_use]
    pub fn ok(call_id: CallId) -> Self {
        Self {
            call_id: call_id.to_vec(),
            payload: ResponsePayload::Ok,
        }
    }

    #[must_use]
    pub fn cancelled(call_id: CallId) -> Self {
        Self {
            call_id: call_id.to_vec(),
            payload: ResponsePayload::Cancel,
        }
    }

    #[must_use]
    pub fn daemon_error(call_id: CallId, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.to_vec(),
            payload: ResponsePayload::DaemonError {
                message: message.into(),
            },
        }
    }

    #[must_use]
    pub fn call_unary(call_id: CallId, result: CallResult) -> Self {
        Self {
            call_id: call_id.to_vec(),
            payload: ResponsePayload::CallUnaryResponse(result),
        }
    }

    #[must_use]
    pub fn request_handling(
        call_id: CallId,
        peer: &PeerId,
        protocol: String,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            call_id: call_id.to_vec(),
            payload: ResponsePayload::RequestHandling {
                peer: peer.to_bytes(),
                protocol,
                payload,
            },
        }
    }
}
