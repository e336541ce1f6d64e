//! Name resolution with strategy filtering
//!
//! Two resolver families exist: [`SystemResolver`] asks the host stack
//! through `getaddrinfo`, [`CachedResolver`] speaks raw DNS over UDP to a
//! configured server and keeps a TTL-bounded answer cache.

use std::{io, net::IpAddr, str::FromStr};

use async_trait::async_trait;
use hickory_proto::{
    error::ProtoError,
    op::{Message, ResponseCode},
    rr::RData,
};
use thiserror::Error;

pub use self::{
    cached::CachedResolver,
    client::{parse_server_addr, UdpDnsClient},
    system::SystemResolver,
};

mod cached;
mod client;
mod system;

/// Preference rule for choosing between A and AAAA records after resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// No filter; both families are queried, dialing prefers IPv6 with an
    /// IPv4 fallback
    #[default]
    Default,
    PreferIpv4,
    PreferIpv6,
    Ipv4Only,
    Ipv6Only,
}

impl Strategy {
    /// Applies the family filter on resolved address lists
    pub fn filter(self, v4: Vec<IpAddr>, v6: Vec<IpAddr>) -> (Vec<IpAddr>, Vec<IpAddr>) {
        match self {
            Strategy::Ipv4Only => (v4, Vec::new()),
            Strategy::Ipv6Only => (Vec::new(), v6),
            _ => (v4, v6),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Default => "",
            Strategy::PreferIpv4 => "prefer_ipv4",
            Strategy::PreferIpv6 => "prefer_ipv6",
            Strategy::Ipv4Only => "ipv4_only",
            Strategy::Ipv6Only => "ipv6_only",
        }
    }
}

/// Unsupported strategy identifier
#[derive(Debug, Clone, Error)]
#[error("unsupported strategy: {0}")]
pub struct InvalidStrategyError(pub String);

impl FromStr for Strategy {
    type Err = InvalidStrategyError;

    fn from_str(s: &str) -> Result<Strategy, InvalidStrategyError> {
        match s {
            "" => Ok(Strategy::Default),
            "prefer_ipv4" => Ok(Strategy::PreferIpv4),
            "prefer_ipv6" => Ok(Strategy::PreferIpv6),
            "ipv4_only" => Ok(Strategy::Ipv4Only),
            "ipv6_only" => Ok(Strategy::Ipv6Only),
            _ => Err(InvalidStrategyError(s.to_owned())),
        }
    }
}

/// DNS resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("server returned rcode {0}")]
    Rcode(ResponseCode),

    #[error("truncated response")]
    Truncated,

    #[error("response id does not match the query")]
    IdMismatch,

    #[error("no available address found for {0}")]
    NoAddress(String),

    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<ResolveError> for io::Error {
    fn from(err: ResolveError) -> io::Error {
        match err {
            ResolveError::Io(err) => err,
            err => io::Error::other(format!("resolve: {}", err)),
        }
    }
}

/// Abstract name resolver
///
/// `lookup` returns the A and AAAA address lists for `host` after applying
/// `strategy`. Both lists empty is an error, never an `Ok`.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup(&self, host: &str, strategy: Strategy) -> io::Result<(Vec<IpAddr>, Vec<IpAddr>)>;
}

/// Abstract DNS message transport
#[async_trait]
pub trait Exchanger: Send + Sync {
    async fn exchange(&self, query: &Message) -> Result<Message, ResolveError>;
}

/// Appends the trailing root dot when missing
pub(crate) fn fqdn(host: &str) -> String {
    if host.ends_with('.') {
        host.to_owned()
    } else {
        format!("{}.", host)
    }
}

/// Extracts A/AAAA records and the minimum positive TTL of an answer.
/// A zero TTL means the message carried no usable answer records.
pub(crate) fn positive_answers(message: &Message) -> (Vec<IpAddr>, u32) {
    let mut addresses = Vec::new();
    let mut min_ttl = 0u32;

    for record in message.answers() {
        let addr = match record.data() {
            Some(RData::A(a)) => IpAddr::V4(a.0),
            Some(RData::AAAA(a)) => IpAddr::V6(a.0),
            _ => continue,
        };

        let ttl = record.ttl();
        if min_ttl == 0 || (ttl > 0 && ttl < min_ttl) {
            min_ttl = ttl;
        }
        addresses.push(addr);
    }

    (addresses, min_ttl)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use hickory_proto::rr::{rdata, Name, Record};

    use super::*;

    #[test]
    fn strategy_parse_roundtrip() {
        for strategy in [
            Strategy::Default,
            Strategy::PreferIpv4,
            Strategy::PreferIpv6,
            Strategy::Ipv4Only,
            Strategy::Ipv6Only,
        ] {
            assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
        }
        assert!("prefer_v4".parse::<Strategy>().is_err());
    }

    #[test]
    fn strategy_filters_families() {
        let v4: Vec<IpAddr> = vec!["127.0.0.1".parse().unwrap()];
        let v6: Vec<IpAddr> = vec!["::1".parse().unwrap()];

        let (a, aaaa) = Strategy::Ipv4Only.filter(v4.clone(), v6.clone());
        assert!(!a.is_empty() && aaaa.is_empty());

        let (a, aaaa) = Strategy::Ipv6Only.filter(v4.clone(), v6.clone());
        assert!(a.is_empty() && !aaaa.is_empty());

        let (a, aaaa) = Strategy::Default.filter(v4, v6);
        assert!(!a.is_empty() && !aaaa.is_empty());
    }

    #[test]
    fn fqdn_appends_root_dot() {
        assert_eq!(fqdn("example.com"), "example.com.");
        assert_eq!(fqdn("example.com."), "example.com.");
    }

    #[test]
    fn answers_track_min_positive_ttl() {
        let name = Name::from_utf8("example.com.").unwrap();
        let mut message = Message::new();
        message.add_answer(Record::from_rdata(
            name.clone(),
            300,
            RData::A(rdata::A(Ipv4Addr::new(192, 0, 2, 1))),
        ));
        message.add_answer(Record::from_rdata(
            name,
            60,
            RData::A(rdata::A(Ipv4Addr::new(192, 0, 2, 2))),
        ));

        let (addresses, ttl) = positive_answers(&message);
        assert_eq!(addresses.len(), 2);
        assert_eq!(ttl, 60);
    }
}
