#![allow(dead_code)]

pub mod mocks;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use swarmd_daemon::Daemon;
use swarmd_primitives::{
    CallId, CallResult, ControlCodec, ControlRequest, ControlResponse, RequestPayload,
    ResponsePayload, DEFAULT_MAX_MESSAGE_SIZE,
};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_util::codec::Framed;

pub fn call_id(n: u8) -> CallId {
    CallId::from([n; 16])
}

pub fn add_unary_handler(id: CallId, protocol: &str) -> ControlRequest {
    ControlRequest::new(
        id,
        RequestPayload::AddUnaryHandler {
            protocol: protocol.to_owned(),
        },
    )
}

pub fn call_unary(id: CallId, peer: Vec<u8>, protocol: &str, payload: Vec<u8>) -> ControlRequest {
    ControlRequest::new(
        id,
        RequestPayload::CallUnary {
            peer,
            protocol: protocol.to_owned(),
            payload,
        },
    )
}

pub fn unary_response(id: CallId, payload: Vec<u8>) -> ControlRequest {
    ControlRequest::new(
        id,
        RequestPayload::UnaryResponse(CallResult::Payload(payload)),
    )
}

pub fn cancel(id: CallId) -> ControlRequest {
    ControlRequest::new(id, RequestPayload::Cancel)
}

/// Client side of a control connection, for driving a daemon in tests.
pub struct TestClient<S = DuplexStream> {
    conn: Framed<S, ControlCodec<ControlResponse>>,
}

impl TestClient<DuplexStream> {
    /// Opens an in-memory control connection and upgrades it.
    pub async fn connect(daemon: &Daemon) -> Self {
        let (client_io, daemon_io) = tokio::io::duplex(64 * 1024);
        daemon.handle_connection(Box::new(daemon_io));

        Self::upgrade(client_io).await
    }

    /// Opens an in-memory control connection without upgrading it.
    pub fn connect_raw(daemon: &Daemon) -> Self {
        let (client_io, daemon_io) = tokio::io::duplex(64 * 1024);
        daemon.handle_connection(Box::new(daemon_io));

        Self::raw(client_io)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> TestClient<S> {
    pub fn raw(io: S) -> Self {
        Self {
            conn: Framed::new(io, ControlCodec::new(DEFAULT_MAX_MESSAGE_SIZE)),
        }
    }

    pub async fn upgrade(io: S) -> Self {
        let mut client = Self::raw(io);

        client
            .send(ControlRequest::new(call_id(0), RequestPayload::Upgrade))
            .await;

        let response = client.recv().await;
        assert_eq!(response.payload, ResponsePayload::Ok);

        client
    }

    pub async fn send(&mut self, request: ControlRequest) {
        self.conn.send(request).await.expect("failed to send request");
    }

    pub async fn recv(&mut self) -> ControlResponse {
        tokio::time::timeout(Duration::from_secs(10), self.conn.next())
            .await
            .expect("timed out waiting for a response")
            .expect("control connection closed")
            .expect("frame error on control connection")
    }

    /// Asserts that no frame arrives for `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(frame) = tokio::time::timeout(window, self.conn.next()).await {
            panic!("unexpected frame: {frame:?}");
        }
    }

    /// Asserts that the daemon closed the connection.
    pub async fn expect_closed(&mut self) {
        let frame = tokio::time::timeout(Duration::from_secs(10), self.conn.next())
            .await
            .expect("timed out waiting for the connection to close");
        assert!(frame.is_none(), "unexpected frame: {frame:?}");
    }
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
