use std::{
    io,
    net::IpAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;

use portfwd::{
    dialer::{Connection, Dialer},
    net::ConnectOpts,
    resolver::{Resolver, Strategy},
};

struct StaticResolver {
    v4: Vec<IpAddr>,
    v6: Vec<IpAddr>,
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn lookup(&self, _host: &str, _strategy: Strategy) -> io::Result<(Vec<IpAddr>, Vec<IpAddr>)> {
        Ok((self.v4.clone(), self.v6.clone()))
    }
}

fn static_dialer(v4: Vec<IpAddr>, v6: Vec<IpAddr>, shutdown: CancellationToken) -> Arc<Dialer> {
    Arc::new(
        Dialer::new(
            Arc::new(StaticResolver { v4, v6 }),
            Strategy::Default,
            Duration::from_secs(5),
            ConnectOpts::default(),
            shutdown,
        )
        .unwrap(),
    )
}

async fn spawn_tcp_sink(addr: &str) -> std::net::SocketAddr {
    let listener = TcpListener::bind(addr).await.unwrap();
    let local_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut accepted = Vec::new();
        loop {
            match listener.accept().await {
                Ok((stream, ..)) => accepted.push(stream),
                Err(..) => return,
            }
        }
    });

    local_addr
}

#[tokio::test]
async fn happy_eyeballs_ipv6_wins() {
    let _ = env_logger::try_init();

    if TcpListener::bind("[::1]:0").await.is_err() {
        eprintln!("ipv6 loopback unavailable, skipping");
        return;
    }

    let target = spawn_tcp_sink("[::1]:0").await;

    // The IPv4 candidate is TEST-NET-1 and would hang until the timeout;
    // the IPv6 branch must win without ever waiting for it
    let dialer = static_dialer(
        vec!["192.0.2.1".parse().unwrap()],
        vec!["::1".parse().unwrap()],
        CancellationToken::new(),
    );

    let started = Instant::now();
    let connection = dialer
        .dial("tcp", &format!("dual.example:{}", target.port()))
        .await
        .unwrap();

    let peer = connection.peer_addr().unwrap();
    assert!(peer.ip().is_ipv6());
    assert!(started.elapsed() < Duration::from_millis(300));
}

#[tokio::test]
async fn happy_eyeballs_falls_back_to_ipv4() {
    let _ = env_logger::try_init();

    let target = spawn_tcp_sink("127.0.0.1:0").await;

    // Nothing listens on [::1] for that port, the IPv6 branch is refused
    // immediately and IPv4 must start without the full head-start delay
    let dialer = static_dialer(
        vec!["127.0.0.1".parse().unwrap()],
        vec!["::1".parse().unwrap()],
        CancellationToken::new(),
    );

    let connection = dialer
        .dial("tcp", &format!("dual.example:{}", target.port()))
        .await
        .unwrap();

    let peer = connection.peer_addr().unwrap();
    assert!(peer.ip().is_ipv4());
    assert_eq!(peer.port(), target.port());
}

#[tokio::test]
async fn literal_ip_skips_resolution() {
    let target = spawn_tcp_sink("127.0.0.1:0").await;

    // A resolver that fails loudly when consulted
    struct NoResolver;

    #[async_trait]
    impl Resolver for NoResolver {
        async fn lookup(&self, host: &str, _strategy: Strategy) -> io::Result<(Vec<IpAddr>, Vec<IpAddr>)> {
            Err(io::Error::other(format!("unexpected lookup of {}", host)))
        }
    }

    let dialer = Arc::new(
        Dialer::new(
            Arc::new(NoResolver),
            Strategy::Default,
            Duration::from_secs(5),
            ConnectOpts::default(),
            CancellationToken::new(),
        )
        .unwrap(),
    );

    let connection = dialer.dial("tcp", &target.to_string()).await.unwrap();
    assert!(matches!(connection, Connection::Tcp(..)));
}

#[tokio::test]
async fn udp_dial_returns_a_connected_socket() {
    let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target = responder.local_addr().unwrap();

    let dialer = static_dialer(Vec::new(), Vec::new(), CancellationToken::new());
    let connection = dialer.dial("udp", &target.to_string()).await.unwrap();

    let socket = match connection {
        Connection::Udp(socket) => socket,
        Connection::Tcp(..) => panic!("expected a udp connection"),
    };

    socket.send(b"probe").await.unwrap();
    let mut buffer = [0u8; 16];
    let (n, from) = responder.recv_from(&mut buffer).await.unwrap();
    assert_eq!(&buffer[..n], b"probe");
    assert_eq!(from.port(), socket.local_addr().unwrap().port());
}

#[tokio::test]
async fn network_version_filters_candidates() {
    let target = spawn_tcp_sink("127.0.0.1:0").await;

    let dialer = static_dialer(Vec::new(), Vec::new(), CancellationToken::new());
    let err = dialer.dial("tcp6", &target.to_string()).await.unwrap_err();
    assert!(err.to_string().contains("no available address"));
}

#[tokio::test]
async fn invalid_networks_are_rejected() {
    let dialer = static_dialer(Vec::new(), Vec::new(), CancellationToken::new());
    let err = dialer.dial("tcp+udp", "127.0.0.1:80").await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}

#[tokio::test]
async fn shutdown_aborts_dials() {
    let shutdown = CancellationToken::new();
    let dialer = static_dialer(Vec::new(), Vec::new(), shutdown.clone());

    shutdown.cancel();

    let err = dialer.dial("tcp", "127.0.0.1:41299").await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Interrupted);
}
