//! Network primitives: protocol/network identifiers and socket wrappers

use std::{
    fmt::{self, Display},
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

use thiserror::Error;

pub use self::option::{AcceptOpts, ConnectOpts, TcpSocketOpts, UdpSocketOpts};

pub mod option;
mod sys;
pub mod tcp;
pub mod udp;

/// Transport protocol selector of a bind or a dial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Ip,
    TcpUdp,
}

impl Protocol {
    /// Parses `tcp`, `udp`, `ip`, `tcp+udp` and `udp+tcp`. Anything else is
    /// no protocol at all.
    pub fn parse(name: &str) -> Option<Protocol> {
        match name {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            "ip" => Some(Protocol::Ip),
            "tcp+udp" | "udp+tcp" => Some(Protocol::TcpUdp),
            _ => None,
        }
    }

    /// Expands into the list of concrete transport protocols
    pub fn to_list(self) -> ProtocolList {
        match self {
            Protocol::Tcp => ProtocolList(vec![Protocol::Tcp]),
            Protocol::Udp => ProtocolList(vec![Protocol::Udp]),
            Protocol::Ip => ProtocolList(vec![Protocol::Ip]),
            Protocol::TcpUdp => ProtocolList(vec![Protocol::Tcp, Protocol::Udp]),
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
            Protocol::Ip => f.write_str("ip"),
            Protocol::TcpUdp => f.write_str("tcp+udp"),
        }
    }
}

/// A set of transport protocols a listener serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolList(Vec<Protocol>);

impl ProtocolList {
    /// Checks whether `network` (a network string like `tcp`, `udp6`) belongs
    /// to this list. Invalid network strings are never contained.
    pub fn contains(&self, network: &str) -> bool {
        match Network::parse(network) {
            Ok(n) => self.0.contains(&n.protocol),
            Err(..) => false,
        }
    }

    /// Checks whether the list carries `protocol`
    pub fn has(&self, protocol: Protocol) -> bool {
        self.0.contains(&protocol)
    }
}

/// Address family restriction of a network string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkVersion {
    V4,
    V6,
    Dual,
}

/// Invalid network string
#[derive(Debug, Clone, Error)]
#[error("invalid network `{0}`")]
pub struct InvalidNetworkError(pub String);

/// A transport protocol together with its address family restriction,
/// in the form of network strings like `tcp`, `udp4` or `ip6`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Network {
    pub protocol: Protocol,
    pub version: NetworkVersion,
}

impl Network {
    pub fn parse(network: &str) -> Result<Network, InvalidNetworkError> {
        let (protocol, version) = match network {
            "tcp" => (Protocol::Tcp, NetworkVersion::Dual),
            "udp" => (Protocol::Udp, NetworkVersion::Dual),
            "ip" => (Protocol::Ip, NetworkVersion::Dual),
            "tcp4" => (Protocol::Tcp, NetworkVersion::V4),
            "udp4" => (Protocol::Udp, NetworkVersion::V4),
            "ip4" => (Protocol::Ip, NetworkVersion::V4),
            "tcp6" => (Protocol::Tcp, NetworkVersion::V6),
            "udp6" => (Protocol::Udp, NetworkVersion::V6),
            "ip6" => (Protocol::Ip, NetworkVersion::V6),
            _ => return Err(InvalidNetworkError(network.to_owned())),
        };
        Ok(Network { protocol, version })
    }

    /// Checks whether `ip` belongs to this network's address family
    pub fn matches_addr(&self, ip: &IpAddr) -> bool {
        match self.version {
            NetworkVersion::Dual => true,
            NetworkVersion::V4 => ip.is_ipv4(),
            NetworkVersion::V6 => ip.is_ipv6(),
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.version {
            NetworkVersion::Dual => write!(f, "{}", self.protocol),
            NetworkVersion::V4 => write!(f, "{}4", self.protocol),
            NetworkVersion::V6 => write!(f, "{}6", self.protocol),
        }
    }
}

impl FromStr for Network {
    type Err = InvalidNetworkError;

    fn from_str(s: &str) -> Result<Network, InvalidNetworkError> {
        Network::parse(s)
    }
}

/// Address family, `AF_INET`, `AF_INET6`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrFamily {
    Ipv4,
    Ipv6,
}

impl AddrFamily {
    /// Parses the `family` option values `4` and `6`
    pub fn parse(s: &str) -> Option<AddrFamily> {
        match s {
            "4" => Some(AddrFamily::Ipv4),
            "6" => Some(AddrFamily::Ipv6),
            _ => None,
        }
    }
}

impl Display for AddrFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AddrFamily::Ipv4 => f.write_str("4"),
            AddrFamily::Ipv6 => f.write_str("6"),
        }
    }
}

impl From<&SocketAddr> for AddrFamily {
    fn from(addr: &SocketAddr) -> AddrFamily {
        match addr {
            SocketAddr::V4(..) => AddrFamily::Ipv4,
            SocketAddr::V6(..) => AddrFamily::Ipv6,
        }
    }
}

impl From<&IpAddr> for AddrFamily {
    fn from(ip: &IpAddr) -> AddrFamily {
        match ip {
            IpAddr::V4(..) => AddrFamily::Ipv4,
            IpAddr::V6(..) => AddrFamily::Ipv6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parse_roundtrip() {
        for protocol in [Protocol::Tcp, Protocol::Udp, Protocol::Ip, Protocol::TcpUdp] {
            assert_eq!(Protocol::parse(&protocol.to_string()), Some(protocol));
        }
    }

    #[test]
    fn protocol_parse_aliases() {
        assert_eq!(Protocol::parse("udp+tcp"), Some(Protocol::TcpUdp));
        assert_eq!(Protocol::parse("tcp+udp"), Some(Protocol::TcpUdp));
        assert_eq!(Protocol::parse("sctp"), None);
        assert_eq!(Protocol::parse(""), None);
    }

    #[test]
    fn protocol_expansion() {
        assert!(Protocol::TcpUdp.to_list().has(Protocol::Tcp));
        assert!(Protocol::TcpUdp.to_list().has(Protocol::Udp));
        assert!(!Protocol::Tcp.to_list().has(Protocol::Udp));
    }

    #[test]
    fn protocol_list_contains_networks() {
        let list = Protocol::TcpUdp.to_list();
        assert!(list.contains("tcp"));
        assert!(list.contains("udp6"));
        assert!(list.contains("tcp4"));
        assert!(!list.contains("ip"));
        assert!(!list.contains("bogus"));
    }

    #[test]
    fn network_parse_roundtrip() {
        for protocol in [Protocol::Tcp, Protocol::Udp, Protocol::Ip] {
            for version in [NetworkVersion::V4, NetworkVersion::V6, NetworkVersion::Dual] {
                let network = Network { protocol, version };
                assert_eq!(Network::parse(&network.to_string()).unwrap(), network);
            }
        }
    }

    #[test]
    fn network_parse_rejects_compound() {
        assert!(Network::parse("tcp+udp").is_err());
        assert!(Network::parse("tcp46").is_err());
        assert!(Network::parse("").is_err());
    }

    #[test]
    fn network_family_match() {
        let n4 = Network::parse("tcp4").unwrap();
        let n6 = Network::parse("udp6").unwrap();
        let dual = Network::parse("tcp").unwrap();

        let v4: IpAddr = "127.0.0.1".parse().unwrap();
        let v6: IpAddr = "::1".parse().unwrap();

        assert!(n4.matches_addr(&v4));
        assert!(!n4.matches_addr(&v6));
        assert!(n6.matches_addr(&v6));
        assert!(!n6.matches_addr(&v4));
        assert!(dual.matches_addr(&v4));
        assert!(dual.matches_addr(&v6));
    }
}
