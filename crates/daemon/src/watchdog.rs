use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shuts the daemon down once no persistent session has existed for
/// `idle_timeout`. Local clients are ephemeral; an unused daemon should
/// release its port, peer slot and identity.
pub(crate) struct IdleWatchdog {
    idle_timeout: Duration,
    sessions: watch::Sender<usize>,
    spawned: AtomicBool,
}

impl IdleWatchdog {
    pub(crate) fn new(idle_timeout: Duration) -> Self {
        let (sessions, _) = watch::channel(0);

        Self {
            idle_timeout,
            sessions,
            spawned: AtomicBool::new(false),
        }
    }

    pub(crate) fn session_started(&self) {
        self.sessions.send_modify(|live| *live += 1);
    }

    pub(crate) fn session_ended(&self) {
        self.sessions.send_modify(|live| *live = live.saturating_sub(1));
    }

    #[cfg(test)]
    pub(crate) fn live_sessions(&self) -> usize {
        *self.sessions.borrow()
    }

    /// Arms the timer. A no-op when `idle_timeout` is zero, and one-shot
    /// across the daemon's lifetime: the single timer task watches the live
    /// session count, restarting its countdown whenever the count returns to
    /// zero and abandoning it whenever a session appears.
    pub(crate) fn spawn(&self, shutdown: CancellationToken) {
        if self.idle_timeout.is_zero() || self.spawned.swap(true, Ordering::SeqCst) {
            return;
        }

        let idle_timeout = self.idle_timeout;
        let mut sessions = self.sessions.subscribe();

        drop(tokio::spawn(async move {
            loop {
                if *sessions.borrow_and_update() == 0 {
                    tokio::select! {
                        () = tokio::time::sleep(idle_timeout) => {
                            if *sessions.borrow() == 0 {
                                info!(
                                    "no persistent session for {:?}, shutting down",
                                    idle_timeout
                                );
                                shutdown.cancel();
                                return;
                            }
                        }
                        changed = sessions.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                    }
                } else if sessions.changed().await.is_err() {
                    return;
                }
            }
        }));
    }
}
