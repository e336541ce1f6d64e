//! Service supervisor
//!
//! Builds the dialer table from the remote list, one listener per bind, and
//! owns the root cancellation token the whole tree shuts down through.

use std::{collections::HashMap, io, sync::Arc};

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, ConfigError},
    dialer::Dialer,
    listener::{ListenOptions, Listener, PacketHandler, StreamHandler},
    net::{AcceptOpts, AddrFamily, ConnectOpts, Protocol, TcpSocketOpts, UdpSocketOpts},
    relay::{TcpForwarder, UdpForwarder},
    resolver::{parse_server_addr, CachedResolver, Resolver, SystemResolver, UdpDnsClient},
};

struct DialerEntry {
    address: String,
    dialer: Arc<Dialer>,
}

/// The assembled forwarding service
pub struct Service {
    shutdown: CancellationToken,
    listeners: Vec<Listener>,
    udp_forwarders: Vec<Arc<UdpForwarder>>,
}

impl Service {
    /// Builds dialers and listeners out of `config` without touching the
    /// network yet
    pub fn new(mut config: Config) -> Result<Service, ConfigError> {
        let shutdown = CancellationToken::new();

        // A single bind and a single remote wire up implicitly
        if config.remotes.len() == 1 && config.binds.len() == 1 && config.binds[0].remote.is_empty() {
            config.binds[0].remote = config.remotes[0].name.clone();
        }

        let system_resolver: Arc<dyn Resolver> = Arc::new(SystemResolver::new());

        let mut dialers: HashMap<String, DialerEntry> = HashMap::new();

        for remote in &config.remotes {
            if remote.name.is_empty() {
                return Err(ConfigError::MissingRemoteName(remote.server.clone()));
            }
            if dialers.contains_key(&remote.name) {
                return Err(ConfigError::DuplicateRemoteName(remote.name.clone()));
            }

            let resolver: Arc<dyn Resolver> = match remote.dns {
                Some(ref dns) => {
                    let server =
                        parse_server_addr(dns).ok_or_else(|| ConfigError::InvalidDnsServer(dns.clone()))?;
                    Arc::new(CachedResolver::new(UdpDnsClient::new(server)))
                }
                None => system_resolver.clone(),
            };

            let opts = ConnectOpts {
                fwmark: if remote.fwmark != 0 { Some(remote.fwmark) } else { None },
                bind_interface: remote.interface.clone(),
                bind_local_addr4: remote.bind_address4,
                bind_local_addr6: remote.bind_address6,
                reuse_addr: remote.reuse_addr,
                tcp: TcpSocketOpts {
                    fastopen: remote.tfo,
                    mptcp: remote.mptcp,
                    ..Default::default()
                },
                udp: UdpSocketOpts {
                    allow_fragmentation: remote.udp_fragment,
                },
            };

            let dialer = Dialer::new(
                resolver,
                remote.strategy,
                remote.timeout,
                opts,
                shutdown.clone(),
            )
            .map_err(|err| {
                if err.kind() == io::ErrorKind::Unsupported {
                    ConfigError::FwmarkUnsupported
                } else {
                    ConfigError::Io(err)
                }
            })?;

            debug!("remote {} forwards to {}", remote.name, remote.server_address());

            dialers.insert(
                remote.name.clone(),
                DialerEntry {
                    address: remote.server_address(),
                    dialer: Arc::new(dialer),
                },
            );
        }

        let mut listeners = Vec::with_capacity(config.binds.len());
        let mut udp_forwarders = Vec::new();

        for bind in &config.binds {
            let name = bind.display_name();

            if bind.remote.is_empty() {
                return Err(ConfigError::MissingRemoteRef(name));
            }

            let entry = match dialers.get(&bind.remote) {
                Some(entry) => entry,
                None => return Err(ConfigError::UnknownRemoteRef(bind.remote.clone())),
            };

            let protocols = bind.protocol.to_list();

            let stream_handler: Option<Arc<dyn StreamHandler>> = if protocols.has(Protocol::Tcp) {
                Some(Arc::new(TcpForwarder::new(
                    name.clone(),
                    entry.dialer.clone(),
                    entry.address.clone(),
                )))
            } else {
                None
            };

            let packet_handler: Option<Arc<dyn PacketHandler>> = if protocols.has(Protocol::Udp) {
                let forwarder = Arc::new(UdpForwarder::new(
                    name.clone(),
                    entry.dialer.clone(),
                    entry.address.clone(),
                    bind.udp_ttl,
                    bind.udp_buffer_size,
                    shutdown.clone(),
                ));
                udp_forwarders.push(forwarder.clone());
                Some(forwarder)
            } else {
                None
            };

            let options = ListenOptions {
                protocols,
                addr: bind.listen.expect("bind config not validated"),
                port: bind.port,
                accept_opts: AcceptOpts {
                    bind_interface: bind.interface.clone(),
                    reuse_addr: bind.reuse_addr,
                    ipv6_only: bind.family == Some(AddrFamily::Ipv6),
                    tcp: TcpSocketOpts {
                        fastopen: bind.tfo,
                        mptcp: bind.mptcp,
                        ..Default::default()
                    },
                    udp: UdpSocketOpts {
                        allow_fragmentation: bind.udp_fragment,
                    },
                },
                udp_buffer_size: bind.udp_buffer_size,
            };

            listeners.push(Listener::new(
                name,
                options,
                stream_handler,
                packet_handler,
                shutdown.clone(),
            ));
        }

        Ok(Service {
            shutdown,
            listeners,
            udp_forwarders,
        })
    }

    /// Starts every listener; the first failure rolls back the ones already
    /// running
    pub async fn start(&mut self) -> io::Result<()> {
        for index in 0..self.listeners.len() {
            if let Err(err) = self.listeners[index].start().await {
                let name = self.listeners[index].name().to_owned();
                self.close();
                return Err(io::Error::new(
                    err.kind(),
                    format!("listener {} failed to start: {}", name, err),
                ));
            }
        }

        info!("service started with {} listener(s)", self.listeners.len());
        Ok(())
    }

    /// Cancels the root token, closes all listeners and evicts every tracked
    /// UDP flow
    pub fn close(&mut self) {
        self.shutdown.cancel();
        for listener in &mut self.listeners {
            listener.close();
        }
        for forwarder in &self.udp_forwarders {
            forwarder.close();
        }
    }

    /// Number of live UDP flows across all listeners
    pub fn active_udp_flows(&self) -> usize {
        self.udp_forwarders.iter().map(|f| f.flow_count()).sum()
    }

    /// Local TCP address of listener `index`, useful with ephemeral test ports
    pub fn tcp_local_addr(&self, index: usize) -> Option<std::net::SocketAddr> {
        self.listeners.get(index).and_then(|l| l.tcp_local_addr())
    }

    /// Local UDP address of listener `index`
    pub fn udp_local_addr(&self, index: usize) -> Option<std::net::SocketAddr> {
        self.listeners.get(index).and_then(|l| l.udp_local_addr())
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
