//! Raw DNS-over-UDP client with a bounded socket pool

use std::{
    io::{self, ErrorKind},
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use hickory_proto::op::{Message, ResponseCode};
use log::{debug, trace};
use tokio::{net::UdpSocket, sync::Semaphore, time};

use super::{Exchanger, ResolveError};

/// Upper bound of pooled sockets towards one server
const MAX_POOL_SIZE: usize = 8;
/// Read deadline for one exchange
const READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Maximum size of a response datagram
const MAX_PACKET_SIZE: usize = 4096;
/// Safety catch against a kernel handing back dead sockets forever
const MAX_REDIAL_RETRIES: u32 = 1024;

/// Parses a DNS server address; a bare IP defaults to port 53
pub fn parse_server_addr(s: &str) -> Option<SocketAddr> {
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Some(SocketAddr::new(ip, 53));
    }
    s.parse::<SocketAddr>().ok()
}

/// DNS message transport over a pool of connected UDP sockets
pub struct UdpDnsClient {
    server: SocketAddr,
    permits: Semaphore,
    idle: Mutex<Vec<UdpSocket>>,
}

impl UdpDnsClient {
    pub fn new(server: SocketAddr) -> UdpDnsClient {
        UdpDnsClient {
            server,
            permits: Semaphore::new(MAX_POOL_SIZE),
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Server this client exchanges with
    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    async fn checkout(&self) -> io::Result<UdpSocket> {
        if let Some(socket) = self.idle.lock().expect("dns pool poisoned").pop() {
            return Ok(socket);
        }

        let bind_addr: SocketAddr = match self.server {
            SocketAddr::V4(..) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(..) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(self.server).await?;

        trace!("dns client opened socket to {}", self.server);
        Ok(socket)
    }

    fn check_in(&self, socket: UdpSocket) {
        self.idle.lock().expect("dns pool poisoned").push(socket);
    }
}

/// A write failure that means the socket itself is gone and a fresh one may
/// succeed
fn is_closed_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::NotConnected
    )
}

#[async_trait]
impl Exchanger for UdpDnsClient {
    async fn exchange(&self, query: &Message) -> Result<Message, ResolveError> {
        let payload = query.to_vec()?;

        // One permit per in-flight socket; waiting here is the pool's
        // exhaustion backpressure
        let _permit = self.permits.acquire().await.expect("dns pool semaphore closed");

        let mut retries = 0u32;
        let socket = loop {
            if retries > MAX_REDIAL_RETRIES {
                panic!("dns client exceeded its redial budget");
            }

            let socket = self.checkout().await.map_err(ResolveError::Io)?;

            match socket.send(&payload).await {
                Ok(n) if n > 0 => break socket,
                Ok(n) => {
                    return Err(ResolveError::Io(io::Error::other(format!(
                        "dns socket wrote {} bytes of {}",
                        n,
                        payload.len()
                    ))));
                }
                Err(err) if is_closed_error(&err) => {
                    debug!("dns socket to {} went away, redialing: {}", self.server, err);
                    retries += 1;
                    continue;
                }
                Err(err) => return Err(ResolveError::Io(err)),
            }
        };

        let mut buf = [0u8; MAX_PACKET_SIZE];
        let n = match time::timeout(READ_TIMEOUT, socket.recv(&mut buf)).await {
            Ok(Ok(n)) => n,
            Ok(Err(err)) => return Err(ResolveError::Io(err)),
            Err(..) => {
                return Err(ResolveError::Io(io::Error::new(
                    ErrorKind::TimedOut,
                    format!("dns read from {} timed out", self.server),
                )));
            }
        };

        let answer = Message::from_vec(&buf[..n])?;

        if answer.id() != query.id() {
            return Err(ResolveError::IdMismatch);
        }
        if answer.truncated() {
            return Err(ResolveError::Truncated);
        }
        if answer.response_code() != ResponseCode::NoError {
            return Err(ResolveError::Rcode(answer.response_code()));
        }

        self.check_in(socket);
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_addr_defaults_to_53() {
        assert_eq!(
            parse_server_addr("1.1.1.1"),
            Some("1.1.1.1:53".parse().unwrap())
        );
        assert_eq!(
            parse_server_addr("127.0.0.1:5353"),
            Some("127.0.0.1:5353".parse().unwrap())
        );
        assert_eq!(parse_server_addr("[::1]:53"), Some("[::1]:53".parse().unwrap()));
        assert_eq!(parse_server_addr("dns.example"), None);
    }
}
