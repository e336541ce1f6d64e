//! Inbound listener serving TCP and/or UDP on one endpoint

use std::{io, net::IpAddr, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, error, info};
use tokio::{
    net::{TcpListener, TcpStream, UdpSocket},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::net::{self, AcceptOpts, Protocol, ProtocolList};

/// Handler for accepted TCP connections, one invocation per connection
#[async_trait]
pub trait StreamHandler: Send + Sync {
    async fn handle_stream(&self, stream: TcpStream, peer_addr: SocketAddr);
}

/// Handler for received UDP datagrams
#[async_trait]
pub trait PacketHandler: Send + Sync {
    async fn handle_packet(&self, data: &[u8], peer_addr: SocketAddr, writer: &PacketWriter);
}

/// Capability for sending datagrams back through the inbound socket
#[derive(Clone)]
pub struct PacketWriter {
    socket: Arc<UdpSocket>,
    shutdown: CancellationToken,
}

impl PacketWriter {
    /// Sends `data` to `addr` through the listening socket
    pub async fn write_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<()> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        self.socket.send_to(data, addr).await.map(|_| ())
    }
}

/// Options of one listener
pub struct ListenOptions {
    pub protocols: ProtocolList,
    pub addr: IpAddr,
    pub port: u16,
    pub accept_opts: AcceptOpts,
    pub udp_buffer_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerState {
    New,
    Listening,
    Closed,
}

/// A listener binding TCP and/or UDP on the configured endpoint, feeding the
/// attached handlers
pub struct Listener {
    name: String,
    options: ListenOptions,
    stream_handler: Option<Arc<dyn StreamHandler>>,
    packet_handler: Option<Arc<dyn PacketHandler>>,
    shutdown: CancellationToken,
    state: ListenerState,
    loops: Vec<JoinHandle<()>>,
    tcp_local_addr: Option<SocketAddr>,
    udp_local_addr: Option<SocketAddr>,
}

impl Listener {
    pub fn new(
        name: String,
        options: ListenOptions,
        stream_handler: Option<Arc<dyn StreamHandler>>,
        packet_handler: Option<Arc<dyn PacketHandler>>,
        shutdown: CancellationToken,
    ) -> Listener {
        Listener {
            name,
            options,
            stream_handler,
            packet_handler,
            shutdown: shutdown.child_token(),
            state: ListenerState::New,
            loops: Vec::new(),
            tcp_local_addr: None,
            udp_local_addr: None,
        }
    }

    /// Listener name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local TCP address once listening
    pub fn tcp_local_addr(&self) -> Option<SocketAddr> {
        self.tcp_local_addr
    }

    /// Local UDP address once listening
    pub fn udp_local_addr(&self) -> Option<SocketAddr> {
        self.udp_local_addr
    }

    /// Binds the configured sockets and spawns the serving loops.
    /// Starting twice is an error.
    pub async fn start(&mut self) -> io::Result<()> {
        if self.state != ListenerState::New {
            return Err(io::Error::other(format!("listener {} already started", self.name)));
        }
        self.state = ListenerState::Listening;

        let bind_addr = SocketAddr::new(self.options.addr, self.options.port);

        if self.options.protocols.has(Protocol::Tcp) {
            if let Some(ref handler) = self.stream_handler {
                let listener = net::tcp::listen(bind_addr, &self.options.accept_opts).await?;
                self.tcp_local_addr = Some(listener.local_addr()?);

                info!("listener {} tcp server started at {}", self.name, listener.local_addr()?);

                self.loops.push(tokio::spawn(accept_loop(
                    self.name.clone(),
                    listener,
                    handler.clone(),
                    self.options.accept_opts.clone(),
                    self.shutdown.clone(),
                )));
            }
        }

        if self.options.protocols.has(Protocol::Udp) {
            if let Some(ref handler) = self.packet_handler {
                let socket = net::udp::listen(bind_addr, &self.options.accept_opts).await?;
                self.udp_local_addr = Some(socket.local_addr()?);

                info!("listener {} udp server started at {}", self.name, socket.local_addr()?);

                let socket = Arc::new(socket);
                let writer = PacketWriter {
                    socket: socket.clone(),
                    shutdown: self.shutdown.clone(),
                };

                self.loops.push(tokio::spawn(recv_loop(
                    self.name.clone(),
                    socket,
                    handler.clone(),
                    writer,
                    self.options.udp_buffer_size,
                    self.shutdown.clone(),
                )));
            }
        }

        Ok(())
    }

    /// Stops the serving loops and drops the sockets
    pub fn close(&mut self) {
        if self.state == ListenerState::Closed {
            return;
        }
        self.state = ListenerState::Closed;
        self.shutdown.cancel();
        for task in self.loops.drain(..) {
            task.abort();
        }
        debug!("listener {} closed", self.name);
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

async fn accept_loop(
    name: String,
    listener: TcpListener,
    handler: Arc<dyn StreamHandler>,
    accept_opts: AcceptOpts,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                if let Err(err) = net::tcp::configure_accepted(&stream, &accept_opts) {
                    debug!("listener {} failed to set accepted socket options, error: {}", name, err);
                }

                let handler = handler.clone();
                tokio::spawn(async move {
                    handler.handle_stream(stream, peer_addr).await;
                });
            }
            Err(err) => {
                if shutdown.is_cancelled() {
                    break;
                }
                error!("listener {} accept failed, error: {}", name, err);
                time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn recv_loop(
    name: String,
    socket: Arc<UdpSocket>,
    handler: Arc<dyn PacketHandler>,
    writer: PacketWriter,
    buffer_size: usize,
    shutdown: CancellationToken,
) {
    let mut buffer = vec![0u8; buffer_size];

    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buffer) => received,
        };

        match received {
            Ok((0, peer_addr)) => {
                debug!("listener {} read a zero sized udp message from {}", name, peer_addr);
            }
            Ok((n, peer_addr)) => {
                handler.handle_packet(&buffer[..n], peer_addr, &writer).await;
            }
            Err(err) => {
                if shutdown.is_cancelled() {
                    break;
                }
                error!("listener {} read udp message failed, error: {}", name, err);
            }
        }
    }
}
