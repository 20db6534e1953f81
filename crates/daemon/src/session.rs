use core::fmt::{self, Display, Formatter};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use swarmd_primitives::{
    BoxedIo, CallId, CallResult, CodecError, ControlCodec, ControlRequest, ControlResponse,
    RequestPayload,
};
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{inbound, outbound, DaemonInner};

pub(crate) type ControlConn = Framed<BoxedIo, ControlCodec<ControlRequest>>;
type ResponseSink = SplitSink<ControlConn, ControlResponse>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct SessionId(pub u64);

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Write side of one client's control connection. Responses come from
/// concurrent per-request workers; the mutex guarantees a frame is never
/// interleaved with another.
#[derive(Clone)]
pub(crate) struct ClientWriter {
    inner: Arc<Mutex<ResponseSink>>,
}

impl ClientWriter {
    fn new(sink: ResponseSink) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    pub(crate) async fn send(&self, response: ControlResponse) -> Result<(), CodecError> {
        self.inner.lock().await.send(response).await
    }
}

pub(crate) struct Session {
    pub(crate) id: SessionId,
    pub(crate) writer: ClientWriter,
    /// Cancelling this cancels every outbound call the session owns.
    pub(crate) token: CancellationToken,
}

/// Drives one accepted control connection: upgrade handshake first, then the
/// persistent session until EOF, a frame error, or daemon shutdown.
pub(crate) async fn handle_connection(inner: Arc<DaemonInner>, io: BoxedIo) {
    let mut conn: ControlConn = Framed::new(io, ControlCodec::new(inner.max_msg_size));

    let request = tokio::select! {
        () = inner.shutdown.cancelled() => return,
        request = conn.next() => match request {
            Some(Ok(request)) => request,
            Some(Err(err)) => {
                debug!(%err, "error reading from control connection");
                return;
            }
            None => return,
        },
    };

    let Ok(call_id) = CallId::try_from(&request.call_id[..]) else {
        debug!("bad call id in upgrade request");
        return;
    };

    if !matches!(request.payload, RequestPayload::Upgrade) {
        let response = ControlResponse::daemon_error(call_id, "connection is not upgraded");
        if let Err(err) = conn.send(response).await {
            debug!(%err, "failed to reject non-upgraded request");
        }
        return;
    }

    if let Err(err) = conn.send(ControlResponse::ok(call_id)).await {
        debug!(%err, "failed to acknowledge upgrade");
        return;
    }

    run_session(inner, conn).await;
}

async fn run_session(inner: Arc<DaemonInner>, conn: ControlConn) {
    let id = SessionId(inner.next_session_id.fetch_add(1, Ordering::Relaxed));
    let (sink, mut requests): (ResponseSink, _) = conn.split();

    let session = Arc::new(Session {
        id,
        writer: ClientWriter::new(sink),
        token: CancellationToken::new(),
    });

    inner.watchdog.session_started();
    debug!(session = %id, "persistent session established");

    loop {
        tokio::select! {
            () = inner.shutdown.cancelled() => break,
            request = requests.next() => match request {
                Some(Ok(request)) => dispatch(&inner, &session, request),
                Some(Err(err)) => {
                    debug!(session = %id, %err, "error reading request");
                    break;
                }
                None => break,
            },
        }
    }

    // uninstall this session's handlers before its write half can drop, so
    // no in-flight inbound handling writes into a dead duplex
    inner.protocols.release_session(id, |protocol| {
        inner.host.remove_stream_handler(protocol);
        debug!(session = %id, protocol, "unary stream handler removed");
    });

    session.token.cancel();
    inner.watchdog.session_ended();

    debug!(session = %id, "persistent session terminated");
}

fn dispatch(inner: &Arc<DaemonInner>, session: &Arc<Session>, request: ControlRequest) {
    // parse the id before spawning anything: a bad id must not leak a worker
    let call_id = match CallId::try_from(&request.call_id[..]) {
        Ok(call_id) => call_id,
        Err(err) => {
            debug!(session = %session.id, %err, "bad call id");
            return;
        }
    };

    match request.payload {
        RequestPayload::Upgrade => {
            let session = session.clone();
            drop(tokio::spawn(async move {
                let response =
                    ControlResponse::daemon_error(call_id, "connection already upgraded");
                if let Err(err) = session.writer.send(response).await {
                    debug!(session = %session.id, %err, "failed to write response");
                }
            }));
        }
        RequestPayload::AddUnaryHandler { protocol } => {
            drop(tokio::spawn(add_unary_handler(
                inner.clone(),
                session.clone(),
                call_id,
                protocol,
            )));
        }
        RequestPayload::CallUnary {
            peer,
            protocol,
            payload,
        } => {
            drop(tokio::spawn(outbound::call_unary(
                inner.clone(),
                session.clone(),
                call_id,
                peer,
                protocol,
                payload,
            )));
        }
        RequestPayload::UnaryResponse(result) => {
            drop(tokio::spawn(deliver_unary_response(
                inner.clone(),
                session.clone(),
                call_id,
                result,
            )));
        }
        RequestPayload::Cancel => {
            // no response frame: the cancelled call's own worker emits the
            // terminal one; an unknown id may simply have completed already
            let _ = inner.calls.cancel_outbound(call_id);
        }
    }
}

async fn add_unary_handler(
    inner: Arc<DaemonInner>,
    session: Arc<Session>,
    call_id: CallId,
    protocol: String,
) {
    let result = inner.protocols.try_register(protocol.clone(), session.id, || {
        let incoming = inner.host.set_stream_handler(&protocol)?;
        let task = tokio::spawn(inbound::accept_streams(
            inner.clone(),
            session.clone(),
            incoming,
        ));
        Ok(task.abort_handle())
    });

    let response = match result {
        Ok(()) => {
            debug!(session = %session.id, protocol, "unary stream handler set");
            ControlResponse::ok(call_id)
        }
        Err(err) => ControlResponse::daemon_error(call_id, err.to_string()),
    };

    // the write happens outside the registry lock
    if let Err(err) = session.writer.send(response).await {
        debug!(session = %session.id, %err, "failed to write response");
    }
}

async fn deliver_unary_response(
    inner: Arc<DaemonInner>,
    session: Arc<Session>,
    call_id: CallId,
    result: CallResult,
) {
    let not_waiting =
        || format!("response for call id {call_id} not requested or cancelled");

    let response = match inner.calls.take_inbound(call_id) {
        Some(sender) => {
            let request = ControlRequest::new(call_id, RequestPayload::UnaryResponse(result));
            match sender.send(request) {
                Ok(()) => ControlResponse::ok(call_id),
                Err(_) => ControlResponse::daemon_error(call_id, not_waiting()),
            }
        }
        None => ControlResponse::daemon_error(call_id, not_waiting()),
    };

    if let Err(err) = session.writer.send(response).await {
        debug!(session = %session.id, %err, "failed to write response");
    }
}
