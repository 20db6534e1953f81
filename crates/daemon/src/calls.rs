use std::collections::HashMap;
use std::sync::Mutex;

use swarmd_primitives::{CallId, ControlRequest};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// In-flight call state, keyed by [`CallId`].
///
/// Two independent tables: outbound calls this daemon initiated (value is
/// the call's cancel token) and inbound handlings awaiting a client response
/// (value is the single-shot delivery channel). No cross-key invariants; the
/// task that inserts an entry owns its eventual removal.
#[derive(Default)]
pub(crate) struct CallRegistry {
    outbound: Mutex<HashMap<CallId, CancellationToken>>,
    inbound: Mutex<HashMap<CallId, oneshot::Sender<ControlRequest>>>,
}

impl CallRegistry {
    /// Registers an outbound call. Returns false when the id is already in
    /// flight, in which case nothing is inserted.
    pub(crate) fn insert_outbound(&self, call_id: CallId, token: CancellationToken) -> bool {
        let mut outbound = self.outbound.lock().expect("lock poisoned");

        if outbound.contains_key(&call_id) {
            return false;
        }

        let _ = outbound.insert(call_id, token);
        true
    }

    pub(crate) fn remove_outbound(&self, call_id: CallId) {
        let _ = self.outbound.lock().expect("lock poisoned").remove(&call_id);
    }

    /// Fires the cancel token of an outbound call, leaving the entry for the
    /// owning worker to remove. Unknown ids are ignored: a cancel may race
    /// with normal completion.
    pub(crate) fn cancel_outbound(&self, call_id: CallId) -> bool {
        match self.outbound.lock().expect("lock poisoned").get(&call_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Registers the delivery channel of an inbound handling. Returns false
    /// when the id is already occupied.
    pub(crate) fn insert_inbound(
        &self,
        call_id: CallId,
        sender: oneshot::Sender<ControlRequest>,
    ) -> bool {
        let mut inbound = self.inbound.lock().expect("lock poisoned");

        if inbound.contains_key(&call_id) {
            return false;
        }

        let _ = inbound.insert(call_id, sender);
        true
    }

    /// Claims the delivery channel for `call_id`, removing the entry.
    pub(crate) fn take_inbound(&self, call_id: CallId) -> Option<oneshot::Sender<ControlRequest>> {
        self.inbound.lock().expect("lock poisoned").remove(&call_id)
    }

    pub(crate) fn remove_inbound(&self, call_id: CallId) {
        let _ = self.inbound.lock().expect("lock poisoned").remove(&call_id);
    }
}
