//! Relaying handlers: TCP splice and per-client UDP flow tracking

use std::{
    io::ErrorKind,
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, error, info, trace, warn};
use tokio::{
    io::copy_bidirectional,
    net::{TcpStream, UdpSocket},
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    dialer::{Connection, Dialer},
    listener::{PacketHandler, PacketWriter, StreamHandler},
};

/// TCP handler splicing each accepted connection to the upstream
pub struct TcpForwarder {
    name: String,
    dialer: Arc<Dialer>,
    target: String,
}

impl TcpForwarder {
    pub fn new(name: String, dialer: Arc<Dialer>, target: String) -> TcpForwarder {
        TcpForwarder { name, dialer, target }
    }
}

#[async_trait]
impl StreamHandler for TcpForwarder {
    async fn handle_stream(&self, mut local: TcpStream, peer_addr: SocketAddr) {
        let connection = match self.dialer.dial("tcp", &self.target).await {
            Ok(connection) => connection,
            Err(err) => {
                error!(
                    "listener {} dial tcp {} for {} failed, error: {}",
                    self.name, self.target, peer_addr, err
                );
                return;
            }
        };

        let mut remote = match connection {
            Connection::Tcp(stream) => stream,
            Connection::Udp(..) => panic!("tcp dial returned a non-tcp connection"),
        };

        info!(
            "listener {} new tcp connection {} <-> {}",
            self.name,
            peer_addr,
            remote.peer_addr().map_or_else(|_| self.target.clone(), |a| a.to_string()),
        );

        match copy_bidirectional(&mut local, &mut remote).await {
            Ok((l2r, r2l)) => {
                trace!(
                    "listener {} tcp connection {} closed, l2r {} bytes, r2l {} bytes",
                    self.name, peer_addr, l2r, r2l
                );
            }
            Err(err) => {
                debug!(
                    "listener {} tcp connection {} closed with error: {}",
                    self.name, peer_addr, err
                );
            }
        }
    }
}

type FlowMap = DashMap<SocketAddr, Arc<UdpSocket>>;

/// UDP handler mapping each client endpoint to one long-lived upstream socket
pub struct UdpForwarder {
    name: String,
    dialer: Arc<Dialer>,
    target: String,
    time_to_live: Duration,
    buffer_size: usize,
    flows: Arc<FlowMap>,
    shutdown: CancellationToken,
}

impl UdpForwarder {
    pub fn new(
        name: String,
        dialer: Arc<Dialer>,
        target: String,
        time_to_live: Duration,
        buffer_size: usize,
        shutdown: CancellationToken,
    ) -> UdpForwarder {
        UdpForwarder {
            name,
            dialer,
            target,
            time_to_live,
            buffer_size,
            flows: Arc::new(DashMap::new()),
            shutdown: shutdown.child_token(),
        }
    }

    /// Number of live flows
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Evicts every flow, closing the upstream sockets
    pub fn close(&self) {
        self.shutdown.cancel();
        self.flows.clear();
    }
}

#[async_trait]
impl PacketHandler for UdpForwarder {
    async fn handle_packet(&self, data: &[u8], peer_addr: SocketAddr, writer: &PacketWriter) {
        // The receive loop is the only caller, so at most one upstream socket
        // exists per client endpoint
        if let Some(socket) = self.flows.get(&peer_addr).map(|entry| entry.value().clone()) {
            if let Err(err) = socket.send(data).await {
                error!(
                    "listener {} udp relay {} -> {} write failed, error: {}",
                    self.name, peer_addr, self.target, err
                );
            }
            return;
        }

        debug!("listener {} dialing {} for new udp flow from {}", self.name, self.target, peer_addr);

        let connection = match self.dialer.dial("udp", &self.target).await {
            Ok(connection) => connection,
            Err(err) => {
                error!(
                    "listener {} dial udp {} for {} failed, error: {}",
                    self.name, self.target, peer_addr, err
                );
                return;
            }
        };

        let socket = match connection {
            Connection::Udp(socket) => Arc::new(socket),
            Connection::Tcp(..) => panic!("udp dial returned a non-udp connection"),
        };

        self.flows.insert(peer_addr, socket.clone());

        tokio::spawn(flow_loop(
            self.name.clone(),
            self.flows.clone(),
            peer_addr,
            socket.clone(),
            writer.clone(),
            self.time_to_live,
            self.buffer_size,
            self.shutdown.clone(),
        ));

        debug!(
            "listener {} new udp flow {} <-> {}",
            self.name,
            peer_addr,
            socket.peer_addr().map_or_else(|_| self.target.clone(), |a| a.to_string()),
        );

        if let Err(err) = socket.send(data).await {
            error!(
                "listener {} udp relay {} -> {} write failed, error: {}",
                self.name, peer_addr, self.target, err
            );
        }
    }
}

/// Per-flow upstream read loop; owns the read side and the map entry
#[allow(clippy::too_many_arguments)]
async fn flow_loop(
    name: String,
    flows: Arc<FlowMap>,
    peer_addr: SocketAddr,
    socket: Arc<UdpSocket>,
    writer: PacketWriter,
    time_to_live: Duration,
    buffer_size: usize,
    shutdown: CancellationToken,
) {
    let mut buffer = vec![0u8; buffer_size];
    let mut deadline = Instant::now() + time_to_live;

    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = time::timeout_at(deadline, socket.recv(&mut buffer)) => received,
        };

        match received {
            Err(..) => {
                trace!("listener {} udp flow {} reached its idle ttl", name, peer_addr);
                break;
            }
            Ok(Err(err)) if err.kind() == ErrorKind::ConnectionRefused => {
                // ICMP port unreachable bounced back from an earlier write
                // (e.g. nothing listens on the forwarded port yet). Keep the
                // flow until the ttl expires, like a NAT would.
                continue;
            }
            Ok(Err(err)) => {
                debug!("listener {} udp flow {} read failed, error: {}", name, peer_addr, err);
                break;
            }
            Ok(Ok(n)) => {
                deadline = Instant::now() + time_to_live;
                if n == 0 {
                    continue;
                }
                if let Err(err) = writer.write_to(&buffer[..n], peer_addr).await {
                    warn!(
                        "listener {} udp flow {} write back failed, error: {}",
                        name, peer_addr, err
                    );
                }
            }
        }
    }

    // Removing the entry is the single close point of the upstream socket
    flows.remove(&peer_addr);
    debug!("listener {} udp flow {} closed", name, peer_addr);
}
