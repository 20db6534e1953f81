use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use tokio::task::AbortHandle;

use crate::session::SessionId;

/// Process-wide table of protocols with an installed inbound handler.
/// Protocols are a host-global namespace: one registration at a time, tagged
/// with the owning session.
#[derive(Default)]
pub(crate) struct ProtocolRegistry {
    inner: Mutex<HashMap<String, Registration>>,
}

pub(crate) struct Registration {
    session: SessionId,
    accept_task: AbortHandle,
}

#[derive(Debug, Error)]
pub(crate) enum RegisterError {
    #[error("handler for protocol {0} already set")]
    AlreadySet(String),
    #[error("{0}")]
    Host(eyre::Error),
}

impl ProtocolRegistry {
    /// Checks for a conflict and runs `install` (the host-side handler
    /// installation) under the registry lock, so that a successful return
    /// means the handler is already visible to inbound streams.
    pub(crate) fn try_register(
        &self,
        protocol: String,
        session: SessionId,
        install: impl FnOnce() -> eyre::Result<AbortHandle>,
    ) -> Result<(), RegisterError> {
        let mut inner = self.inner.lock().expect("lock poisoned");

        if inner.contains_key(&protocol) {
            return Err(RegisterError::AlreadySet(protocol));
        }

        let accept_task = install().map_err(RegisterError::Host)?;
        let _ = inner.insert(protocol, Registration {
            session,
            accept_task,
        });

        Ok(())
    }

    /// Removes every protocol `session` owns, aborting its accept task and
    /// uninstalling the host handler under the lock. Runs before the
    /// session's write half is dropped, so no inbound handler is left
    /// pointing at a dead duplex.
    pub(crate) fn release_session(&self, session: SessionId, mut uninstall: impl FnMut(&str)) {
        let mut inner = self.inner.lock().expect("lock poisoned");

        inner.retain(|protocol, registration| {
            if registration.session != session {
                return true;
            }

            registration.accept_task.abort();
            uninstall(protocol);
            false
        });
    }

    #[cfg(test)]
    pub(crate) fn is_registered(&self, protocol: &str) -> bool {
        self.inner
            .lock()
            .expect("lock poisoned")
            .contains_key(protocol)
    }
}
