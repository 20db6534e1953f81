use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eyre::bail;
use libp2p::PeerId;
use swarmd_host::Host;
use swarmd_primitives::BoxedIo;
use tokio::sync::mpsc;

type StreamFactory = Box<dyn FnMut(PeerId, &str) -> eyre::Result<BoxedIo> + Send>;

/// In-memory host: outbound streams come from a test-provided factory,
/// inbound streams are injected by hand.
#[derive(Default)]
pub struct MockHost {
    handlers: Mutex<HashMap<String, mpsc::Sender<(PeerId, BoxedIo)>>>,
    on_new_stream: Mutex<Option<StreamFactory>>,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    /// Supplies the byte stream every `new_stream` call hands back.
    pub fn on_new_stream(
        &self,
        factory: impl FnMut(PeerId, &str) -> eyre::Result<BoxedIo> + Send + 'static,
    ) {
        *self.on_new_stream.lock().unwrap() = Some(Box::new(factory));
    }

    pub fn is_registered(&self, protocol: &str) -> bool {
        self.handlers.lock().unwrap().contains_key(protocol)
    }

    /// Hands the daemon an inbound stream, as if `peer` had opened one on
    /// `protocol`.
    pub async fn inject_inbound(&self, protocol: &str, peer: PeerId, io: BoxedIo) {
        let sender = self
            .handlers
            .lock()
            .unwrap()
            .get(protocol)
            .cloned()
            .expect("protocol not registered");

        sender.send((peer, io)).await.expect("accept loop gone");
    }
}

#[async_trait]
impl Host for MockHost {
    async fn new_stream(&self, peer: PeerId, protocol: &str) -> eyre::Result<BoxedIo> {
        match &mut *self.on_new_stream.lock().unwrap() {
            Some(factory) => factory(peer, protocol),
            None => bail!("no route to peer {peer}"),
        }
    }

    fn set_stream_handler(
        &self,
        protocol: &str,
    ) -> eyre::Result<mpsc::Receiver<(PeerId, BoxedIo)>> {
        let mut handlers = self.handlers.lock().unwrap();

        if handlers.contains_key(protocol) {
            bail!("handler for protocol {protocol} already set");
        }

        let (tx, rx) = mpsc::channel(16);
        let _ = handlers.insert(protocol.to_owned(), tx);

        Ok(rx)
    }

    fn remove_stream_handler(&self, protocol: &str) {
        let _ = self.handlers.lock().unwrap().remove(protocol);
    }
}
