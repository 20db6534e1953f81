use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use libp2p::PeerId;
use swarmd_primitives::{
    BoxedIo, CallId, ControlCodec, ControlRequest, ControlResponse, RequestPayload,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::session::Session;
use crate::DaemonInner;

/// Accept loop for one registered protocol, bound to the session that
/// registered it. Aborted by the protocol registry on deregistration.
pub(crate) async fn accept_streams(
    inner: Arc<DaemonInner>,
    session: Arc<Session>,
    mut incoming: mpsc::Receiver<(PeerId, BoxedIo)>,
) {
    while let Some((peer, io)) = incoming.recv().await {
        drop(tokio::spawn(handle_stream(
            inner.clone(),
            session.clone(),
            peer,
            io,
        )));
    }
}

/// One inbound unary call: the daemon cannot answer it itself, so it
/// notifies the owning client and holds the stream open until the client
/// responds or the caller gives up.
async fn handle_stream(
    inner: Arc<DaemonInner>,
    session: Arc<Session>,
    peer: PeerId,
    io: BoxedIo,
) {
    let mut conn = Framed::new(io, ControlCodec::<ControlRequest>::new(inner.max_msg_size));

    let request = match conn.next().await {
        Some(Ok(request)) => request,
        Some(Err(err)) => {
            debug!(%peer, %err, "failed to read request from inbound stream");
            return;
        }
        None => {
            debug!(%peer, "inbound stream closed before a request arrived");
            return;
        }
    };

    let Ok(call_id) = CallId::try_from(&request.call_id[..]) else {
        debug!(%peer, "bad call id on inbound stream");
        return;
    };

    let RequestPayload::CallUnary {
        protocol, payload, ..
    } = request.payload
    else {
        debug!(%peer, "unexpected message on inbound stream");
        return;
    };

    // the call is attributed to the connection's verified identity; the peer
    // field on the wire is whatever the caller claimed
    let notification = ControlResponse::request_handling(call_id, &peer, protocol, payload);

    let (response_tx, response_rx) = oneshot::channel();
    if !inner.calls.insert_inbound(call_id, response_tx) {
        debug!(%peer, %call_id, "call id already being handled");
        return;
    }

    if let Err(err) = session.writer.send(notification).await {
        debug!(%peer, %call_id, %err, "failed to notify client of inbound call");
        inner.calls.remove_inbound(call_id);
        return;
    }

    let (mut sink, mut remote): (SplitSink<_, ControlRequest>, _) = conn.split();

    // the wire is request-then-one-response: the remote sending another
    // frame is as terminal as it hanging up or erroring out
    tokio::select! {
        item = remote.next() => {
            if item.is_some() {
                debug!(%peer, %call_id, "protocol violation on inbound stream");
            }

            inner.calls.remove_inbound(call_id);

            if let Err(err) = session.writer.send(ControlResponse::cancelled(call_id)).await {
                debug!(%peer, %call_id, %err, "failed to notify client of cancellation");
            }
        }
        response = response_rx => {
            if let Ok(response) = response {
                if let Err(err) = sink.send(response).await {
                    debug!(%peer, %call_id, %err, "failed to write response to remote stream");
                }
            }

            inner.calls.remove_inbound(call_id);
        }
        () = inner.shutdown.cancelled() => {
            inner.calls.remove_inbound(call_id);
        }
    }
}
