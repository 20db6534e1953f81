//! The persistent control connection: a multiplexed RPC layer between local
//! clients and the embedded P2P host.
//!
//! A client upgrades an accepted control connection into a session, then
//! registers protocols the daemon should serve ([`AddUnaryHandler`]) and
//! fires unary calls at remote peers ([`CallUnary`]). Remote peers' calls on
//! registered protocols surface as `RequestHandling` notifications, answered
//! by the client with `UnaryResponse`. Every request carries a 128-bit call
//! id; responses are matched by id and arrive in no particular order.
//!
//! [`AddUnaryHandler`]: swarmd_primitives::RequestPayload::AddUnaryHandler
//! [`CallUnary`]: swarmd_primitives::RequestPayload::CallUnary

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use swarmd_host::Host;
use swarmd_primitives::{BoxedIo, DEFAULT_MAX_MESSAGE_SIZE};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::warn;

mod calls;
mod inbound;
mod listener;
mod outbound;
mod registry;
mod session;
mod watchdog;

pub use listener::ControlListener;

use calls::CallRegistry;
use registry::ProtocolRegistry;
use watchdog::IdleWatchdog;

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    /// Shut the daemon down after this long with no live session. Zero
    /// disables the watchdog.
    pub idle_timeout: Duration,
    /// Cap on a single framed message, on the control socket and on remote
    /// unary streams alike.
    pub max_msg_size: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::ZERO,
            max_msg_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

pub(crate) struct DaemonInner {
    pub(crate) host: Arc<dyn Host>,
    pub(crate) max_msg_size: usize,
    pub(crate) calls: CallRegistry,
    pub(crate) protocols: ProtocolRegistry,
    pub(crate) watchdog: IdleWatchdog,
    pub(crate) shutdown: CancellationToken,
    pub(crate) tracker: TaskTracker,
    pub(crate) next_session_id: AtomicU64,
}

#[derive(Clone)]
pub struct Daemon {
    inner: Arc<DaemonInner>,
}

impl Daemon {
    #[must_use]
    pub fn new(host: Arc<dyn Host>, config: &DaemonConfig) -> Self {
        Self {
            inner: Arc::new(DaemonInner {
                host,
                max_msg_size: config.max_msg_size,
                calls: CallRegistry::default(),
                protocols: ProtocolRegistry::default(),
                watchdog: IdleWatchdog::new(config.idle_timeout),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    /// The token that ends [`Self::serve`]. Fired by the idle watchdog, or
    /// by the embedder (e.g. on an interrupt signal).
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Hands one accepted control connection to the daemon. The connection
    /// must complete the upgrade handshake before it becomes a persistent
    /// session.
    pub fn handle_connection(&self, io: BoxedIo) {
        let inner = self.inner.clone();
        let _task = self.inner.tracker.spawn(session::handle_connection(inner, io));
    }

    /// Accepts control connections until the shutdown token fires, then
    /// drops the listener and waits for live sessions to wind down.
    pub async fn serve(&self, listener: ControlListener) -> eyre::Result<()> {
        self.inner.watchdog.spawn(self.inner.shutdown.clone());

        loop {
            tokio::select! {
                () = self.inner.shutdown.cancelled() => break,
                conn = listener.accept() => match conn {
                    Ok(io) => self.handle_connection(io),
                    Err(err) => warn!(%err, "failed to accept control connection"),
                },
            }
        }

        drop(listener);
        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        Ok(())
    }
}
