use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use eyre::WrapErr;
use multiaddr::Multiaddr;
use swarmd_daemon::{ControlListener, Daemon, DaemonConfig};
use swarmd_host::HostConfig;
use tracing::info;

use crate::config::{self, Config};

pub const EXAMPLES: &str = r"
  # Run with defaults, keeping config and identity in the current directory
  $ swarmd

  # Custom home and a unix control socket
  $ swarmd --home /var/lib/swarmd --listen /unix/var/run/swarmd.sock

  # Dial a known peer at startup and exit when unused for a minute
  $ swarmd --dial /ip4/10.0.0.7/tcp/4001/p2p/12D3KooW... --idle-timeout-secs 60
";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = EXAMPLES)]
pub struct RootCommand {
    /// Directory for config and identity
    #[arg(long, value_name = "PATH", default_value = ".")]
    #[arg(env = "SWARMD_HOME", hide_env_values = true)]
    pub home: Utf8PathBuf,

    /// Control socket multiaddr (tcp or unix)
    #[arg(long, value_name = "MULTIADDR")]
    pub listen: Option<Multiaddr>,

    /// Comma separated multiaddrs the host should listen on
    #[arg(long, value_name = "MULTIADDR", value_delimiter = ',')]
    pub host_addrs: Vec<Multiaddr>,

    /// Comma separated peers to dial at startup (full multiaddrs ending in
    /// /p2p/<peer id>)
    #[arg(long, value_name = "MULTIADDR", value_delimiter = ',')]
    pub dial: Vec<Multiaddr>,

    /// Kill the daemon if no client holds a persistent connection for this
    /// many seconds; 0 disables
    #[arg(long, value_name = "SECONDS")]
    pub idle_timeout_secs: Option<u64>,

    /// Max size for persistent connection messages (bytes)
    #[arg(long, value_name = "BYTES")]
    pub max_msg_size: Option<usize>,

    /// Disable mDNS peer discovery
    #[arg(long)]
    pub no_mdns: bool,
}

impl RootCommand {
    pub async fn run(self) -> eyre::Result<()> {
        let mut config = if Config::exists(&self.home) {
            Config::load(&self.home)?
        } else {
            std::fs::create_dir_all(&self.home)
                .wrap_err_with(|| format!("failed to create home directory {:?}", self.home))?;

            let config = Config::default();
            config.save(&self.home)?;
            config
        };

        let identity = config::load_or_generate_identity(&self.home)?;

        if !self.host_addrs.is_empty() {
            config.swarm.listen = self.host_addrs;
        }
        if let Some(listen) = self.listen {
            config.control.listen = listen;
        }
        if let Some(secs) = self.idle_timeout_secs {
            config.control.idle_timeout_secs = secs;
        }
        if let Some(size) = self.max_msg_size {
            config.control.max_msg_size = size;
        }
        if self.no_mdns {
            config.discovery.mdns = false;
        }

        let peer_id = identity.public().to_peer_id();

        let (host, event_loop) = swarmd_host::build(HostConfig {
            identity,
            listen: config.swarm.listen.clone(),
            mdns: config.discovery.mdns,
        })?;

        drop(tokio::spawn(event_loop.run()));

        for addr in self.dial {
            host.dial(addr.clone())
                .await
                .wrap_err_with(|| format!("failed to dial '{addr}'"))?;
        }

        let daemon = Daemon::new(
            Arc::new(host),
            &DaemonConfig {
                idle_timeout: Duration::from_secs(config.control.idle_timeout_secs),
                max_msg_size: config.control.max_msg_size,
            },
        );

        let listener = ControlListener::bind(&config.control.listen).await?;

        info!("peer id: {}", peer_id);
        info!("control socket: {}", listener.local_addr()?);

        let shutdown = daemon.shutdown_token();
        drop(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                shutdown.cancel();
            }
        }));

        daemon.serve(listener).await
    }
}
