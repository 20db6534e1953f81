use camino::Utf8Path;
use eyre::WrapErr;
use libp2p::identity;
use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};
use swarmd_primitives::DEFAULT_MAX_MESSAGE_SIZE;

const CONFIG_FILE: &str = "swarmd.toml";
const IDENTITY_FILE: &str = "identity.key";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub swarm: SwarmConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default = "default_swarm_listen")]
    pub listen: Vec<Multiaddr>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            listen: default_swarm_listen(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "bool_true")]
    pub mdns: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { mdns: true }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Control socket multiaddr; tcp and unix address families only.
    #[serde(default = "default_control_listen")]
    pub listen: Multiaddr,
    /// Kill the daemon after this many seconds with no persistent client
    /// connection. 0 (the default) disables the watchdog.
    #[serde(default)]
    pub idle_timeout_secs: u64,
    /// Max size for persistent connection messages, in bytes.
    #[serde(default = "default_max_msg_size")]
    pub max_msg_size: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen: default_control_listen(),
            idle_timeout_secs: 0,
            max_msg_size: default_max_msg_size(),
        }
    }
}

impl Config {
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> eyre::Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let raw = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("unreadable config at {path}"))?;

        toml::from_str(&raw).wrap_err_with(|| format!("invalid config at {path}"))
    }

    pub fn save(&self, dir: &Utf8Path) -> eyre::Result<()> {
        let rendered = toml::to_string_pretty(self)?;
        let path = dir.join(CONFIG_FILE);

        std::fs::write(&path, rendered).wrap_err_with(|| format!("could not write config to {path}"))
    }
}

/// The daemon identity, from `identity.key` in the home directory. The file
/// holds the libp2p protobuf encoding of the private key; a missing file
/// means a first run, and a fresh ed25519 key is generated and written back.
pub fn load_or_generate_identity(dir: &Utf8Path) -> eyre::Result<identity::Keypair> {
    let path = dir.join(IDENTITY_FILE);

    if path.is_file() {
        let bytes =
            std::fs::read(&path).wrap_err_with(|| format!("unreadable identity at {path}"))?;

        return identity::Keypair::from_protobuf_encoding(&bytes)
            .wrap_err_with(|| format!("malformed identity at {path}"));
    }

    let keypair = identity::Keypair::generate_ed25519();

    let bytes = keypair
        .to_protobuf_encoding()
        .wrap_err("failed to encode identity")?;
    std::fs::write(&path, bytes)
        .wrap_err_with(|| format!("could not write identity to {path}"))?;

    Ok(keypair)
}

fn default_swarm_listen() -> Vec<Multiaddr> {
    vec![
        "/ip4/0.0.0.0/tcp/0".parse().expect("valid multiaddr"),
        "/ip4/0.0.0.0/udp/0/quic-v1".parse().expect("valid multiaddr"),
    ]
}

fn default_control_listen() -> Multiaddr {
    "/ip4/127.0.0.1/tcp/7998".parse().expect("valid multiaddr")
}

fn default_max_msg_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn bool_true() -> bool {
    true
}
