use libp2p::identity;
use multiaddr::Multiaddr;

#[derive(Debug)]
pub struct HostConfig {
    pub identity: identity::Keypair,
    pub listen: Vec<Multiaddr>,
    pub mdns: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            identity: identity::Keypair::generate_ed25519(),
            listen: vec![
                "/ip4/0.0.0.0/tcp/0".parse().expect("valid multiaddr"),
                "/ip4/0.0.0.0/udp/0/quic-v1".parse().expect("valid multiaddr"),
            ],
            mdns: true,
        }
    }
}
