//! System resolver, which is tokio's builtin `getaddrinfo` in blocking pool

use std::{io, net::IpAddr};

use async_trait::async_trait;
use log::trace;
use rand::seq::SliceRandom;
use tokio::net::lookup_host;

use super::{fqdn, Resolver, Strategy};

/// Resolver backed by the host stack's name lookup
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl SystemResolver {
    pub fn new() -> SystemResolver {
        SystemResolver
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str, strategy: Strategy) -> io::Result<(Vec<IpAddr>, Vec<IpAddr>)> {
        let name = fqdn(host);

        let mut v4 = Vec::new();
        let mut v6 = Vec::new();

        let addrs = lookup_host((name.as_str(), 0)).await.map_err(|err| {
            io::Error::other(format!("dns resolve {} error: {}", host, err))
        })?;

        for addr in addrs {
            match addr.ip() {
                ip @ IpAddr::V4(..) if strategy != Strategy::Ipv6Only => v4.push(ip),
                ip @ IpAddr::V6(..) if strategy != Strategy::Ipv4Only => v6.push(ip),
                _ => {}
            }
        }

        if v4.is_empty() && v6.is_empty() {
            return Err(io::Error::other(format!("no available address found for {}", host)));
        }

        // Spread load between equal records; order is not guaranteed
        let mut rng = rand::thread_rng();
        v4.shuffle(&mut rng);
        v6.shuffle(&mut rng);

        trace!("resolved {} to {} A and {} AAAA records", host, v4.len(), v6.len());

        Ok((v4, v6))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_localhost() {
        let resolver = SystemResolver::new();
        let (v4, v6) = resolver.lookup("localhost", Strategy::Default).await.unwrap();
        assert!(!v4.is_empty() || !v6.is_empty());
    }

    #[tokio::test]
    async fn family_only_strategies_filter() {
        let resolver = SystemResolver::new();
        if let Ok((v4, v6)) = resolver.lookup("localhost", Strategy::Ipv4Only).await {
            assert!(v6.is_empty());
            assert!(v4.iter().all(|ip| ip.is_ipv4()));
        }
    }
}
