//! Outbound dialing with Happy-Eyeballs (RFC 6555)
//!
//! A [`Dialer`] owns the resolver and socket options of one upstream. Literal
//! IP targets are dialed directly; hostnames are resolved and both address
//! families are raced, IPv6 first with a short head start.

use std::{
    fmt,
    io::{self, ErrorKind},
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use log::{debug, trace};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, UdpSocket},
    sync::mpsc,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::{
    net::{self, ConnectOpts, Network, Protocol},
    resolver::{Resolver, Strategy},
};

/// Head start of the preferred IPv6 branch before IPv4 is attempted
const HAPPY_EYEBALLS_DELAY: Duration = Duration::from_millis(300);

/// Payload carried in the SYN of a TFO dial
const TFO_PROBE: [u8; 1] = [0];

/// An established outbound connection
pub enum Connection {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connection::Tcp(_) => f.debug_tuple("Tcp").finish(),
            Connection::Udp(_) => f.debug_tuple("Udp").finish(),
        }
    }
}

impl Connection {
    /// Remote address of the connection
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Connection::Tcp(stream) => stream.peer_addr(),
            Connection::Udp(socket) => socket.peer_addr(),
        }
    }
}

/// Dialer for one upstream target
pub struct Dialer {
    resolver: Arc<dyn Resolver>,
    strategy: Strategy,
    timeout: Duration,
    opts: ConnectOpts,
    shutdown: CancellationToken,
}

impl Dialer {
    /// Creates a dialer. Fails fast when an option is not expressible on the
    /// running platform.
    pub fn new(
        resolver: Arc<dyn Resolver>,
        strategy: Strategy,
        timeout: Duration,
        opts: ConnectOpts,
        shutdown: CancellationToken,
    ) -> io::Result<Dialer> {
        if opts.fwmark.is_some() && !cfg!(any(target_os = "linux", target_os = "android")) {
            return Err(io::Error::new(
                ErrorKind::Unsupported,
                "`fwmark` is only supported on Linux",
            ));
        }

        Ok(Dialer {
            resolver,
            strategy,
            timeout,
            opts,
            shutdown,
        })
    }

    /// Dials `address` (`host:port`) on `network` (`tcp`, `tcp4`, `udp6`, ...)
    ///
    /// The attempt is bounded by the dialer timeout and aborted on shutdown.
    pub async fn dial(&self, network: &str, address: &str) -> io::Result<Connection> {
        tokio::select! {
            _ = self.shutdown.cancelled() => {
                Err(io::Error::new(ErrorKind::Interrupted, "dialer is shutting down"))
            }
            result = time::timeout(self.timeout, self.dial_inner(network, address)) => match result {
                Ok(r) => r,
                Err(..) => Err(io::Error::new(
                    ErrorKind::TimedOut,
                    format!("dial {} {} timed out", network, address),
                )),
            }
        }
    }

    async fn dial_inner(&self, network: &str, address: &str) -> io::Result<Connection> {
        let (host, port) = split_host_port(address)?;

        if let Ok(ip) = host.parse::<IpAddr>() {
            return self.dial_serial(network, &[ip], port).await;
        }

        let (v4, v6) = self
            .resolver
            .lookup(host, self.strategy)
            .await
            .map_err(|err| io::Error::new(err.kind(), format!("resolve {} failed: {}", host, err)))?;

        self.dial_parallel(network, v4, v6, port).await
    }

    /// Attempts `addresses` in order and returns the first connection
    pub async fn dial_serial(&self, network: &str, addresses: &[IpAddr], port: u16) -> io::Result<Connection> {
        serial_attempts(&self.shutdown, &self.opts, network, addresses, port).await
    }

    /// Races both address families for `port` and returns the winner
    pub async fn dial_parallel(
        &self,
        network: &str,
        v4: Vec<IpAddr>,
        v6: Vec<IpAddr>,
        port: u16,
    ) -> io::Result<Connection> {
        if v4.is_empty() {
            return self.dial_serial(network, &v6, port).await;
        }
        if v6.is_empty() {
            return self.dial_serial(network, &v4, port).await;
        }

        let cancel = self.shutdown.child_token();
        // Dropping this dial (e.g. on timeout) must tear down both branches
        let _cancel_guard = cancel.clone().drop_guard();
        let (tx, mut rx) = mpsc::channel::<(io::Result<Connection>, bool)>(2);

        // IPv6 is preferred, its serial attempt starts immediately
        spawn_attempt(
            cancel.clone(),
            tx.clone(),
            self.opts.clone(),
            network.to_owned(),
            v6,
            port,
            true,
        );

        let delay = time::sleep(HAPPY_EYEBALLS_DELAY);
        tokio::pin!(delay);

        let mut v4_pending = Some(v4);
        let mut failures = 0u8;
        let mut last_err: Option<io::Error> = None;

        loop {
            tokio::select! {
                _ = &mut delay, if v4_pending.is_some() => {
                    let v4 = v4_pending.take().unwrap();
                    spawn_attempt(cancel.clone(), tx.clone(), self.opts.clone(), network.to_owned(), v4, port, false);
                }

                received = rx.recv() => {
                    let (result, from_v6) = received.expect("dial result channel closed");
                    match result {
                        Ok(conn) => {
                            // Any late connection from the losing branch is
                            // dropped by its task
                            cancel.cancel();
                            return Ok(conn);
                        }
                        Err(err) => {
                            debug!(
                                "happy-eyeballs {} branch failed, error: {}",
                                if from_v6 { "ipv6" } else { "ipv4" },
                                err
                            );
                            last_err = Some(err);
                            failures += 1;

                            // IPv6 failing early starts IPv4 without waiting
                            if from_v6 {
                                if let Some(v4) = v4_pending.take() {
                                    spawn_attempt(
                                        cancel.clone(),
                                        tx.clone(),
                                        self.opts.clone(),
                                        network.to_owned(),
                                        v4,
                                        port,
                                        false,
                                    );
                                }
                            }

                            if failures == 2 {
                                break;
                            }
                        }
                    }
                }
            }
        }

        let last = last_err.unwrap();
        Err(io::Error::new(
            last.kind(),
            format!("happy-eyeballs dial failed for both address families, last error: {}", last),
        ))
    }
}

fn spawn_attempt(
    cancel: CancellationToken,
    tx: mpsc::Sender<(io::Result<Connection>, bool)>,
    opts: ConnectOpts,
    network: String,
    addresses: Vec<IpAddr>,
    port: u16,
    from_v6: bool,
) {
    tokio::spawn(async move {
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            r = serial_attempts(&cancel, &opts, &network, &addresses, port) => r,
        };
        // A winner already being picked drops the channel; the connection is
        // closed right here with it
        let _ = tx.send((result, from_v6)).await;
    });
}

async fn serial_attempts(
    cancel: &CancellationToken,
    opts: &ConnectOpts,
    network: &str,
    addresses: &[IpAddr],
    port: u16,
) -> io::Result<Connection> {
    if addresses.is_empty() {
        return Err(io::Error::other("no addresses to dial"));
    }

    let network = Network::parse(network).map_err(|err| io::Error::new(ErrorKind::InvalidInput, err))?;

    let candidates: Vec<IpAddr> = addresses
        .iter()
        .copied()
        .filter(|ip| network.matches_addr(ip))
        .collect();
    if candidates.is_empty() {
        return Err(io::Error::other(format!(
            "no available address found for network {}",
            network
        )));
    }

    let mut last_err: Option<io::Error> = None;

    for ip in candidates {
        if cancel.is_cancelled() {
            return Err(io::Error::new(ErrorKind::Interrupted, "dial cancelled"));
        }

        let target = SocketAddr::new(ip, port);

        let attempt = match network.protocol {
            Protocol::Tcp => connect_tcp(target, opts).await,
            Protocol::Udp => net::udp::connect(target, opts).await.map(Connection::Udp),
            _ => {
                return Err(io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("network {} is not dialable", network),
                ));
            }
        };

        match attempt {
            Ok(conn) => {
                trace!("connected to {}", target);
                return Ok(conn);
            }
            Err(err) => {
                debug!("connect {} failed, error: {}", target, err);
                last_err = Some(err);
            }
        }
    }

    let last = last_err.unwrap();
    Err(io::Error::new(
        last.kind(),
        format!("all addresses failed, last error: {}", last),
    ))
}

async fn connect_tcp(target: SocketAddr, opts: &ConnectOpts) -> io::Result<Connection> {
    let mut stream = net::tcp::connect(target, opts).await?;

    // With TCP_FASTOPEN_CONNECT the first write rides in the SYN; the probe
    // makes sure a SYN actually goes out
    if opts.tcp.fastopen {
        stream.write_all(&TFO_PROBE).await?;
    }

    Ok(Connection::Tcp(stream))
}

/// Splits `host:port`, tolerating bracketed IPv6 hosts
fn split_host_port(address: &str) -> io::Result<(&str, u16)> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, format!("missing port in address {}", address)))?;

    let port = port
        .parse::<u16>()
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, format!("invalid port in address {}", address)))?;

    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_port_splitting() {
        assert_eq!(split_host_port("example.com:80").unwrap(), ("example.com", 80));
        assert_eq!(split_host_port("127.0.0.1:53").unwrap(), ("127.0.0.1", 53));
        assert_eq!(split_host_port("[::1]:53").unwrap(), ("::1", 53));
        assert!(split_host_port("example.com").is_err());
        assert!(split_host_port("example.com:http").is_err());
    }
}
