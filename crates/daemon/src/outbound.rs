use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use libp2p::PeerId;
use swarmd_primitives::{CallId, ControlCodec, ControlRequest, ControlResponse, RequestPayload};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::session::Session;
use crate::DaemonInner;

/// Runs one outbound unary call. Owns the registry entry for its call id and
/// writes the call's single terminal response, whichever way it ends.
pub(crate) async fn call_unary(
    inner: Arc<DaemonInner>,
    session: Arc<Session>,
    call_id: CallId,
    peer: Vec<u8>,
    protocol: String,
    payload: Vec<u8>,
) {
    // a child of the session token: an explicit Cancel fires it directly,
    // session teardown fires it through the parent
    let token = session.token.child_token();

    if !inner.calls.insert_outbound(call_id, token.clone()) {
        let response =
            ControlResponse::daemon_error(call_id, format!("call id {call_id} already in flight"));
        if let Err(err) = session.writer.send(response).await {
            debug!(session = %session.id, %call_id, %err, "failed to write response");
        }
        return;
    }

    let response = tokio::select! {
        () = token.cancelled() => ControlResponse::cancelled(call_id),
        response = exchange(&inner, call_id, peer, protocol, payload) => response,
    };

    inner.calls.remove_outbound(call_id);

    if let Err(err) = session.writer.send(response).await {
        debug!(session = %session.id, %call_id, %err, "failed to write response");
    }
}

/// Opens the remote stream, writes the framed request, reads one framed
/// reply. Dropping the future (cancellation) closes the stream.
async fn exchange(
    inner: &DaemonInner,
    call_id: CallId,
    peer: Vec<u8>,
    protocol: String,
    payload: Vec<u8>,
) -> ControlResponse {
    let peer_id = match PeerId::from_bytes(&peer) {
        Ok(peer_id) => peer_id,
        Err(err) => {
            return ControlResponse::daemon_error(call_id, format!("malformed peer id: {err}"))
        }
    };

    let io = match inner.host.new_stream(peer_id, &protocol).await {
        Ok(io) => io,
        Err(err) => return ControlResponse::daemon_error(call_id, err.to_string()),
    };

    let mut conn = Framed::new(io, ControlCodec::<ControlRequest>::new(inner.max_msg_size));

    let request = ControlRequest {
        call_id: call_id.to_vec(),
        payload: RequestPayload::CallUnary {
            peer,
            protocol,
            payload,
        },
    };

    if let Err(err) = conn.send(request).await {
        return ControlResponse::daemon_error(call_id, err.to_string());
    }

    match conn.next().await {
        Some(Ok(reply)) => match reply.payload {
            RequestPayload::UnaryResponse(result) => ControlResponse::call_unary(call_id, result),
            _ => ControlResponse::daemon_error(call_id, "unexpected reply from remote peer"),
        },
        Some(Err(err)) => ControlResponse::daemon_error(call_id, err.to_string()),
        None => ControlResponse::daemon_error(call_id, "remote stream closed before a response arrived"),
    }
}
