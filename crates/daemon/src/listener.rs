use std::net::SocketAddr;

use eyre::bail;
use multiaddr::{Multiaddr, Protocol};
use swarmd_primitives::BoxedIo;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;

/// The control socket. Multiaddr-addressed like the rest of the daemon's
/// surface; the control wire itself is a plain byte duplex, so only the TCP
/// and Unix families qualify.
#[derive(Debug)]
pub enum ControlListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        addr: Multiaddr,
    },
}

impl ControlListener {
    pub async fn bind(addr: &Multiaddr) -> eyre::Result<Self> {
        let mut protocols = addr.iter();

        match protocols.next() {
            Some(Protocol::Ip4(ip)) => {
                let Some(Protocol::Tcp(port)) = protocols.next() else {
                    bail!("control socket address '{addr}' must be tcp");
                };

                Ok(Self::Tcp(TcpListener::bind((ip, port)).await?))
            }
            Some(Protocol::Ip6(ip)) => {
                let Some(Protocol::Tcp(port)) = protocols.next() else {
                    bail!("control socket address '{addr}' must be tcp");
                };

                Ok(Self::Tcp(TcpListener::bind((ip, port)).await?))
            }
            #[cfg(unix)]
            Some(Protocol::Unix(path)) => {
                // a stale socket file from a previous run would fail the bind
                let _ = std::fs::remove_file(path.as_ref());

                Ok(Self::Unix {
                    listener: UnixListener::bind(path.as_ref())?,
                    addr: addr.clone(),
                })
            }
            _ => bail!("unsupported control socket address '{addr}'"),
        }
    }

    /// The bound address, with any OS-assigned port resolved.
    pub fn local_addr(&self) -> eyre::Result<Multiaddr> {
        match self {
            Self::Tcp(listener) => {
                let addr = match listener.local_addr()? {
                    SocketAddr::V4(addr) => Multiaddr::empty()
                        .with(Protocol::Ip4(*addr.ip()))
                        .with(Protocol::Tcp(addr.port())),
                    SocketAddr::V6(addr) => Multiaddr::empty()
                        .with(Protocol::Ip6(*addr.ip()))
                        .with(Protocol::Tcp(addr.port())),
                };

                Ok(addr)
            }
            #[cfg(unix)]
            Self::Unix { addr, .. } => Ok(addr.clone()),
        }
    }

    pub async fn accept(&self) -> std::io::Result<BoxedIo> {
        match self {
            Self::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Self::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Box::new(stream))
            }
        }
    }
}
