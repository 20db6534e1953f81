//! End to end: two daemons over real hosts on localhost, exercised through
//! their control sockets.

mod common;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use common::{add_unary_handler, call_id, call_unary, unary_response, TestClient};
use libp2p::identity;
use multiaddr::{Multiaddr, Protocol};
use swarmd_daemon::{ControlListener, Daemon, DaemonConfig};
use swarmd_host::{HostClient, HostConfig};
use swarmd_primitives::{CallResult, ControlResponse, ResponsePayload};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

struct TestDaemon {
    host: HostClient,
    host_addr: Multiaddr,
    control_addr: Multiaddr,
    serve: JoinHandle<eyre::Result<()>>,
}

impl TestDaemon {
    async fn spawn(config: DaemonConfig) -> eyre::Result<Self> {
        let (host, event_loop) = swarmd_host::build(HostConfig {
            identity: identity::Keypair::generate_ed25519(),
            listen: vec![],
            mdns: false,
        })?;

        drop(tokio::spawn(event_loop.run()));

        let host_addr = host.listen_on("/ip4/127.0.0.1/tcp/0".parse()?).await?;

        let listener = ControlListener::bind(&"/ip4/127.0.0.1/tcp/0".parse()?).await?;
        let control_addr = listener.local_addr()?;

        let daemon = Daemon::new(Arc::new(host.clone()), &config);
        let serve = tokio::spawn(async move { daemon.serve(listener).await });

        Ok(Self {
            host,
            host_addr,
            control_addr,
            serve,
        })
    }

    /// The host address with the peer id appended, as a peer would dial it.
    fn full_addr(&self) -> Multiaddr {
        self.host_addr
            .clone()
            .with(Protocol::P2p(self.host.local_peer_id()))
    }

    async fn control_client(&self) -> TestClient<TcpStream> {
        let stream = TcpStream::connect(socket_addr(&self.control_addr))
            .await
            .expect("failed to connect to control socket");

        TestClient::upgrade(stream).await
    }
}

fn socket_addr(addr: &Multiaddr) -> SocketAddr {
    let mut ip = None;
    let mut port = None;

    for protocol in addr.iter() {
        match protocol {
            Protocol::Ip4(v4) => ip = Some(IpAddr::V4(v4)),
            Protocol::Ip6(v6) => ip = Some(IpAddr::V6(v6)),
            Protocol::Tcp(p) => port = Some(p),
            _ => {}
        }
    }

    SocketAddr::new(ip.expect("no ip in multiaddr"), port.expect("no port in multiaddr"))
}

#[tokio::test]
async fn unary_round_trip_between_two_daemons() -> eyre::Result<()> {
    let a = TestDaemon::spawn(DaemonConfig::default()).await?;
    let b = TestDaemon::spawn(DaemonConfig::default()).await?;

    b.host.dial(a.full_addr()).await?;

    let mut client_a = a.control_client().await;
    let mut client_b = b.control_client().await;

    client_a
        .send(add_unary_handler(call_id(1), "/swarmd/echo/1.0.0"))
        .await;
    assert_eq!(client_a.recv().await, ControlResponse::ok(call_id(1)));

    client_b
        .send(call_unary(
            call_id(2),
            a.host.local_peer_id().to_bytes(),
            "/swarmd/echo/1.0.0",
            b"ping".to_vec(),
        ))
        .await;

    let notification = client_a.recv().await;
    assert_eq!(notification.call_id, call_id(2).to_vec());
    assert_eq!(
        notification.payload,
        ResponsePayload::RequestHandling {
            peer: b.host.local_peer_id().to_bytes(),
            protocol: "/swarmd/echo/1.0.0".to_owned(),
            payload: b"ping".to_vec(),
        }
    );

    client_a.send(unary_response(call_id(2), b"pong".to_vec())).await;
    assert_eq!(client_a.recv().await, ControlResponse::ok(call_id(2)));

    assert_eq!(
        client_b.recv().await,
        ControlResponse::call_unary(call_id(2), CallResult::Payload(b"pong".to_vec()))
    );

    Ok(())
}

#[tokio::test]
async fn idle_timeout_shuts_the_daemon_down() -> eyre::Result<()> {
    let daemon = TestDaemon::spawn(DaemonConfig {
        idle_timeout: Duration::from_millis(500),
        ..DaemonConfig::default()
    })
    .await?;

    // a live session holds the watchdog off well past the idle interval
    let client = daemon.control_client().await;
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(!daemon.serve.is_finished());

    // ... and dropping it starts the countdown over
    drop(client);

    tokio::time::timeout(Duration::from_secs(5), daemon.serve)
        .await
        .expect("daemon did not shut down after going idle")?
        .expect("serve failed");

    Ok(())
}
