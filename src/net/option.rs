//! Options for creating inbound and outbound sockets

use std::{
    net::{Ipv4Addr, Ipv6Addr},
    time::Duration,
};

/// `TCP_KEEPIDLE`, idle time before the first keep-alive probe
pub const KEEPALIVE_IDLE: Duration = Duration::from_secs(10 * 60);
/// `TCP_KEEPINTVL`, interval between keep-alive probes
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(75);
/// `TCP_KEEPCNT`, probes before the connection is considered dead
pub const KEEPALIVE_PROBE_COUNT: u32 = 16;

/// Options for TCP sockets
#[derive(Debug, Clone)]
pub struct TcpSocketOpts {
    /// `TCP_FASTOPEN`, enables TFO
    pub fastopen: bool,

    /// Request a Multipath-TCP socket (Linux >= 5.6). Falls back to plain
    /// TCP when the kernel has no MPTCP support.
    pub mptcp: bool,

    /// `SO_KEEPALIVE` with `TCP_KEEPIDLE`, `TCP_KEEPINTVL`, `TCP_KEEPCNT`
    /// set to the crate defaults
    pub keepalive: bool,
}

impl Default for TcpSocketOpts {
    fn default() -> TcpSocketOpts {
        TcpSocketOpts {
            fastopen: false,
            mptcp: false,
            keepalive: true,
        }
    }
}

/// Options for UDP sockets
#[derive(Debug, Clone, Default)]
pub struct UdpSocketOpts {
    /// Allow IP fragmentation of outgoing datagrams. When unset, the
    /// don't-fragment analogue of the platform is applied.
    pub allow_fragmentation: bool,
}

/// Options for connecting to an upstream
#[derive(Debug, Clone, Default)]
pub struct ConnectOpts {
    /// Linux mark based routing, set with `SO_MARK`.
    /// Requires `CAP_NET_ADMIN` and is only supported on Linux.
    pub fwmark: Option<u32>,

    /// Outbound socket binds to interface (`SO_BINDTODEVICE`)
    pub bind_interface: Option<String>,

    /// Source address for outbound IPv4 sockets
    pub bind_local_addr4: Option<Ipv4Addr>,

    /// Source address for outbound IPv6 sockets
    pub bind_local_addr6: Option<Ipv6Addr>,

    /// `SO_REUSEADDR`
    pub reuse_addr: bool,

    /// TCP options
    pub tcp: TcpSocketOpts,

    /// UDP options
    pub udp: UdpSocketOpts,
}

/// Options for inbound listening sockets
#[derive(Debug, Clone, Default)]
pub struct AcceptOpts {
    /// Inbound socket binds to interface (`SO_BINDTODEVICE`)
    pub bind_interface: Option<String>,

    /// `SO_REUSEADDR`
    pub reuse_addr: bool,

    /// `IPV6_V6ONLY`. Unset on an unspecified IPv6 address gives a
    /// dual-stack listener.
    pub ipv6_only: bool,

    /// TCP options
    pub tcp: TcpSocketOpts,

    /// UDP options
    pub udp: UdpSocketOpts,
}
