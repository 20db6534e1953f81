//! The libp2p host the daemon embeds: swarm construction, the event loop
//! driving it, and the [`Host`] surface the control plane programs against.

use std::collections::hash_map::{self, HashMap};

use async_trait::async_trait;
use futures_util::StreamExt;
use libp2p::core::transport::ListenerId;
use libp2p::swarm::{Swarm, SwarmEvent};
use libp2p::PeerId;
use multiaddr::{Multiaddr, Protocol};
use swarmd_primitives::BoxedIo;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

mod behaviour;
pub mod client;
pub mod config;

pub use client::HostClient;
pub use config::HostConfig;

use behaviour::{Behaviour, BehaviourEvent};

/// What the control plane needs from the P2P host, and nothing more. The
/// host is internally thread-safe; all three operations may be called from
/// concurrent tasks.
#[async_trait]
pub trait Host: Send + Sync {
    /// Open an outbound stream to `peer` on `protocol`, over an existing or
    /// dialable connection.
    async fn new_stream(&self, peer: PeerId, protocol: &str) -> eyre::Result<BoxedIo>;

    /// Start accepting inbound streams on `protocol`. Registration is
    /// visible to inbound streams before this returns. The caller owns the
    /// receiving end; a protocol can be registered at most once at a time.
    fn set_stream_handler(&self, protocol: &str)
        -> eyre::Result<mpsc::Receiver<(PeerId, BoxedIo)>>;

    /// Stop accepting inbound streams on `protocol`. Unknown protocols are
    /// ignored.
    fn remove_stream_handler(&self, protocol: &str);
}

/// Builds the swarm and hands back its client handle plus the event loop.
/// The caller spawns [`EventLoop::run`]; every [`HostClient`] operation is
/// dead in the water until it does.
pub fn build(config: HostConfig) -> eyre::Result<(HostClient, EventLoop)> {
    let swarm = Behaviour::build_swarm(&config)?;

    let peer_id = *swarm.local_peer_id();
    let control = swarm.behaviour().stream.new_control();

    let (command_sender, command_receiver) = mpsc::channel(32);

    let client = HostClient::new(peer_id, command_sender, control);
    let event_loop = EventLoop::new(swarm, command_receiver);

    Ok((client, event_loop))
}

#[derive(Debug)]
pub(crate) enum Command {
    Dial {
        addr: Multiaddr,
        sender: oneshot::Sender<eyre::Result<()>>,
    },
    ListenOn {
        addr: Multiaddr,
        sender: oneshot::Sender<eyre::Result<Multiaddr>>,
    },
    ListenAddrs {
        sender: oneshot::Sender<Vec<Multiaddr>>,
    },
}

pub struct EventLoop {
    swarm: Swarm<Behaviour>,
    command_receiver: mpsc::Receiver<Command>,
    pending_dial: HashMap<PeerId, oneshot::Sender<eyre::Result<()>>>,
    pending_listen: HashMap<ListenerId, oneshot::Sender<eyre::Result<Multiaddr>>>,
}

impl EventLoop {
    fn new(swarm: Swarm<Behaviour>, command_receiver: mpsc::Receiver<Command>) -> Self {
        Self {
            swarm,
            command_receiver,
            pending_dial: HashMap::default(),
            pending_listen: HashMap::default(),
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.swarm.next() => self.handle_swarm_event(event.expect("Swarm stream to be infinite.")),
                command = self.command_receiver.recv() => match command {
                    Some(c) => self.handle_command(c),
                    None => break,
                },
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<BehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(behaviour) => self.handle_behaviour_event(behaviour),
            SwarmEvent::NewListenAddr {
                listener_id,
                address,
            } => {
                let local_peer_id = *self.swarm.local_peer_id();
                info!(
                    "host listening on {}",
                    address.clone().with(Protocol::P2p(local_peer_id))
                );

                if let Some(sender) = self.pending_listen.remove(&listener_id) {
                    let _ = sender.send(Ok(address));
                }
            }
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                if endpoint.is_dialer() {
                    if let Some(sender) = self.pending_dial.remove(&peer_id) {
                        let _ = sender.send(Ok(()));
                    }
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                cause,
                ..
            } => {
                debug!(
                    "connection closed: {} {} {:?}",
                    peer_id, num_established, cause
                );
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                if let Some(peer_id) = peer_id {
                    if let Some(sender) = self.pending_dial.remove(&peer_id) {
                        let _ = sender.send(Err(eyre::eyre!(error)));
                    }
                }
            }
            SwarmEvent::IncomingConnection { .. } => {}
            SwarmEvent::IncomingConnectionError { .. } => {}
            SwarmEvent::Dialing {
                peer_id: Some(peer_id),
                ..
            } => debug!("dialing peer: {}", peer_id),
            SwarmEvent::ListenerError { error, .. } => trace!("listener error: {:?}", error),
            unhandled => trace!("unhandled swarm event: {:?}", unhandled),
        }
    }

    fn handle_behaviour_event(&mut self, event: BehaviourEvent) {
        match event {
            BehaviourEvent::Mdns(libp2p::mdns::Event::Discovered(peers)) => {
                for (peer_id, addr) in peers {
                    debug!("mdns discovered {} at {}", peer_id, addr);
                    let _ = self.swarm.add_peer_address(peer_id, addr);
                }
            }
            BehaviourEvent::Mdns(libp2p::mdns::Event::Expired(_)) => {}
            BehaviourEvent::Identify(event) => trace!("identify: {:?}", event),
            BehaviourEvent::Ping(event) => trace!("ping: {:?}", event),
            BehaviourEvent::Stream(event) => trace!("stream: {:?}", event),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Dial { addr, sender } => {
                let Some(Protocol::P2p(peer_id)) = addr.iter().last() else {
                    let _ = sender.send(Err(eyre::eyre!("no peer id in address: {}", addr)));
                    return;
                };

                match self.pending_dial.entry(peer_id) {
                    hash_map::Entry::Occupied(_) => {
                        let _ = sender.send(Err(eyre::eyre!("already dialing {}", peer_id)));
                    }
                    hash_map::Entry::Vacant(entry) => match self.swarm.dial(addr) {
                        Ok(()) => {
                            let _ = entry.insert(sender);
                        }
                        Err(e) => {
                            let _ = sender.send(Err(eyre::eyre!(e)));
                        }
                    },
                }
            }
            Command::ListenOn { addr, sender } => match self.swarm.listen_on(addr) {
                Ok(listener_id) => {
                    let _ = self.pending_listen.insert(listener_id, sender);
                }
                Err(e) => {
                    let _ = sender.send(Err(eyre::eyre!(e)));
                }
            },
            Command::ListenAddrs { sender } => {
                let _ = sender.send(self.swarm.listeners().cloned().collect());
            }
        }
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop").finish_non_exhaustive()
    }
}
