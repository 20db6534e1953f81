use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eyre::{eyre, WrapErr};
use futures_util::StreamExt;
use libp2p::{PeerId, StreamProtocol};
use libp2p_stream::{Control, IncomingStreams};
use multiaddr::Multiaddr;
use swarmd_primitives::BoxedIo;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio_util::compat::FuturesAsyncReadCompatExt;

use crate::{Command, Host};

/// Cloneable handle onto the running host. Stream operations go straight
/// through the libp2p-stream [`Control`]; everything that needs the swarm
/// itself goes through the event loop's command channel.
#[derive(Clone)]
pub struct HostClient {
    peer_id: PeerId,
    sender: mpsc::Sender<Command>,
    control: Control,
    handlers: Arc<Mutex<HashMap<String, AbortHandle>>>,
}

impl HostClient {
    pub(crate) fn new(peer_id: PeerId, sender: mpsc::Sender<Command>, control: Control) -> Self {
        Self {
            peer_id,
            sender,
            control,
            handlers: Arc::default(),
        }
    }

    #[must_use]
    pub fn local_peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Dial a full multiaddr (must end in `/p2p/<peer id>`) and wait for the
    /// connection to be established.
    pub async fn dial(&self, addr: Multiaddr) -> eyre::Result<()> {
        let (sender, receiver) = oneshot::channel();

        self.sender
            .send(Command::Dial { addr, sender })
            .await
            .expect("Command receiver not to be dropped.");

        receiver.await.expect("Sender not to be dropped.")
    }

    /// Start listening on `addr` and return the first resolved listen
    /// address (useful with an OS-assigned port).
    pub async fn listen_on(&self, addr: Multiaddr) -> eyre::Result<Multiaddr> {
        let (sender, receiver) = oneshot::channel();

        self.sender
            .send(Command::ListenOn { addr, sender })
            .await
            .expect("Command receiver not to be dropped.");

        receiver.await.expect("Sender not to be dropped.")
    }

    pub async fn listen_addrs(&self) -> Vec<Multiaddr> {
        let (sender, receiver) = oneshot::channel();

        self.sender
            .send(Command::ListenAddrs { sender })
            .await
            .expect("Command receiver not to be dropped.");

        receiver.await.expect("Sender not to be dropped.")
    }
}

#[async_trait]
impl Host for HostClient {
    async fn new_stream(&self, peer: PeerId, protocol: &str) -> eyre::Result<BoxedIo> {
        let protocol = StreamProtocol::try_from_owned(protocol.to_owned())
            .wrap_err_with(|| format!("invalid protocol id '{protocol}'"))?;

        let stream = self
            .control
            .clone()
            .open_stream(peer, protocol)
            .await
            .map_err(|err| eyre!("failed to open stream to {peer}: {err}"))?;

        Ok(Box::new(stream.compat()))
    }

    fn set_stream_handler(
        &self,
        protocol: &str,
    ) -> eyre::Result<mpsc::Receiver<(PeerId, BoxedIo)>> {
        let proto = StreamProtocol::try_from_owned(protocol.to_owned())
            .wrap_err_with(|| format!("invalid protocol id '{protocol}'"))?;

        let mut handlers = self.handlers.lock().expect("lock poisoned");

        let incoming = self.control.clone().accept(proto).map_err(|err| eyre!(err))?;

        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(forward_incoming(incoming, tx));

        if let Some(stale) = handlers.insert(protocol.to_owned(), task.abort_handle()) {
            stale.abort();
        }

        Ok(rx)
    }

    fn remove_stream_handler(&self, protocol: &str) {
        if let Some(task) = self
            .handlers
            .lock()
            .expect("lock poisoned")
            .remove(protocol)
        {
            // aborting drops the IncomingStreams, deregistering the protocol
            task.abort();
        }
    }
}

impl std::fmt::Debug for HostClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostClient")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

async fn forward_incoming(mut incoming: IncomingStreams, tx: mpsc::Sender<(PeerId, BoxedIo)>) {
    while let Some((peer, stream)) = incoming.next().await {
        if tx.send((peer, Box::new(stream.compat()))).await.is_err() {
            break;
        }
    }
}
