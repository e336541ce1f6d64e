//! Caching DNS resolver over an abstract message transport

use std::{
    io,
    net::IpAddr,
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use hickory_proto::{
    op::{Message, MessageType, Query},
    rr::{Name, RecordType},
};
use log::trace;
use lru_time_cache::LruCache;
use rand::seq::SliceRandom;

use super::{fqdn, positive_answers, Exchanger, ResolveError, Resolver, Strategy};

/// Maximum number of cached names
const CACHE_SIZE: usize = 1024;
/// Upper bound on the lifetime of any cache entry
const CACHE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct CachedAnswer {
    v4: Vec<IpAddr>,
    v6: Vec<IpAddr>,
    expires_at: Instant,
}

impl CachedAnswer {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }
}

/// Resolver that exchanges raw DNS messages through `E` and caches positive
/// answers until their TTL runs out
pub struct CachedResolver<E> {
    exchanger: E,
    cache: Mutex<LruCache<String, CachedAnswer>>,
}

impl<E> CachedResolver<E>
where
    E: Exchanger,
{
    pub fn new(exchanger: E) -> CachedResolver<E> {
        CachedResolver::with_capacity(exchanger, CACHE_SIZE)
    }

    pub fn with_capacity(exchanger: E, capacity: usize) -> CachedResolver<E> {
        CachedResolver {
            exchanger,
            cache: Mutex::new(LruCache::with_expiry_duration_and_capacity(CACHE_MAX_AGE, capacity)),
        }
    }

    fn load(&self, name: &str) -> Option<(Vec<IpAddr>, Vec<IpAddr>)> {
        let mut cache = self.cache.lock().expect("dns cache poisoned");
        match cache.get(name) {
            Some(answer) if answer.is_expired() || answer.is_empty() => {
                cache.remove(name);
                None
            }
            Some(answer) => Some((answer.v4.clone(), answer.v6.clone())),
            None => None,
        }
    }

    fn store(&self, name: &str, v4: Vec<IpAddr>, v6: Vec<IpAddr>, min_ttl: u32) {
        if min_ttl == 0 || (v4.is_empty() && v6.is_empty()) {
            return;
        }

        let answer = CachedAnswer {
            v4,
            v6,
            expires_at: Instant::now() + Duration::from_secs(u64::from(min_ttl)),
        };

        let mut cache = self.cache.lock().expect("dns cache poisoned");
        cache.insert(name.to_owned(), answer);
    }

    async fn query(&self, name: &Name, record_type: RecordType) -> Result<(Vec<IpAddr>, u32), ResolveError> {
        let mut message = Message::new();
        message.set_id(rand::random());
        message.set_message_type(MessageType::Query);
        message.set_recursion_desired(true);
        message.add_query(Query::query(name.clone(), record_type));

        let answer = self.exchanger.exchange(&message).await?;
        Ok(positive_answers(&answer))
    }
}

#[async_trait]
impl<E> Resolver for CachedResolver<E>
where
    E: Exchanger,
{
    async fn lookup(&self, host: &str, strategy: Strategy) -> io::Result<(Vec<IpAddr>, Vec<IpAddr>)> {
        if host.is_empty() {
            return Err(io::Error::other("resolve: empty host"));
        }

        let name = fqdn(host);

        if let Some((v4, v6)) = self.load(&name) {
            let (v4, v6) = strategy.filter(v4, v6);
            if !v4.is_empty() || !v6.is_empty() {
                trace!("resolved {} from cache, {} A and {} AAAA records", host, v4.len(), v6.len());
                return Ok((v4, v6));
            }
        }

        let qname = Name::from_utf8(&name).map_err(|err| io::Error::from(ResolveError::from(err)))?;

        let (r4, r6) = tokio::join!(
            async {
                if strategy != Strategy::Ipv6Only {
                    self.query(&qname, RecordType::A).await
                } else {
                    Ok((Vec::new(), 0))
                }
            },
            async {
                if strategy != Strategy::Ipv4Only {
                    self.query(&qname, RecordType::AAAA).await
                } else {
                    Ok((Vec::new(), 0))
                }
            },
        );

        let (answers4, ttl4) = r4.map_err(io::Error::from)?;
        let (answers6, ttl6) = r6.map_err(io::Error::from)?;

        // Answer sections may mix families; merge before splitting
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();
        for ip in answers4.into_iter().chain(answers6) {
            match ip {
                IpAddr::V4(..) => v4.push(ip),
                IpAddr::V6(..) => v6.push(ip),
            }
        }

        let min_ttl = match (ttl4, ttl6) {
            (0, ttl) => ttl,
            (ttl, 0) => ttl,
            (a, b) => a.min(b),
        };
        self.store(&name, v4.clone(), v6.clone(), min_ttl);

        let (mut v4, mut v6) = strategy.filter(v4, v6);
        if v4.is_empty() && v6.is_empty() {
            return Err(io::Error::from(ResolveError::NoAddress(name)));
        }

        let mut rng = rand::thread_rng();
        v4.shuffle(&mut rng);
        v6.shuffle(&mut rng);

        Ok((v4, v6))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::Ipv4Addr,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use hickory_proto::{
        op::ResponseCode,
        rr::{rdata, RData, Record},
    };

    use super::*;

    struct StaticExchanger {
        queries: AtomicUsize,
        rcode: ResponseCode,
        ttl: u32,
    }

    impl StaticExchanger {
        fn new(ttl: u32) -> StaticExchanger {
            StaticExchanger {
                queries: AtomicUsize::new(0),
                rcode: ResponseCode::NoError,
                ttl,
            }
        }
    }

    #[async_trait]
    impl Exchanger for StaticExchanger {
        async fn exchange(&self, query: &Message) -> Result<Message, ResolveError> {
            self.queries.fetch_add(1, Ordering::SeqCst);

            if self.rcode != ResponseCode::NoError {
                return Err(ResolveError::Rcode(self.rcode));
            }

            let question = query.queries()[0].clone();
            let mut answer = Message::new();
            answer.set_id(query.id());
            answer.set_message_type(MessageType::Response);
            answer.add_query(question.clone());

            if question.query_type() == RecordType::A {
                answer.add_answer(Record::from_rdata(
                    question.name().clone(),
                    self.ttl,
                    RData::A(rdata::A(Ipv4Addr::new(192, 0, 2, 7))),
                ));
            }

            Ok(answer)
        }
    }

    #[tokio::test]
    async fn caches_positive_answers() {
        let resolver = CachedResolver::new(StaticExchanger::new(300));

        let (v4, v6) = resolver.lookup("example.com", Strategy::Default).await.unwrap();
        assert_eq!(v4.len(), 1);
        assert!(v6.is_empty());
        // One A and one AAAA query
        assert_eq!(resolver.exchanger.queries.load(Ordering::SeqCst), 2);

        let (v4, ..) = resolver.lookup("example.com", Strategy::Default).await.unwrap();
        assert_eq!(v4.len(), 1);
        assert_eq!(resolver.exchanger.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_ttl_answers_are_not_cached() {
        let resolver = CachedResolver::new(StaticExchanger::new(0));

        resolver.lookup("example.com", Strategy::Default).await.unwrap();
        resolver.lookup("example.com", Strategy::Default).await.unwrap();
        assert_eq!(resolver.exchanger.queries.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn rcode_failures_propagate() {
        let mut exchanger = StaticExchanger::new(300);
        exchanger.rcode = ResponseCode::NXDomain;
        let resolver = CachedResolver::new(exchanger);

        let err = resolver.lookup("missing.example", Strategy::Default).await.unwrap_err();
        assert!(err.to_string().contains("rcode"));
    }

    #[tokio::test]
    async fn v6_only_strategy_skips_a_queries() {
        let resolver = CachedResolver::new(StaticExchanger::new(300));

        let result = resolver.lookup("example.com", Strategy::Ipv6Only).await;
        assert!(result.is_err());
        assert_eq!(resolver.exchanger.queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_entries_are_dropped_on_load() {
        let resolver = CachedResolver::new(StaticExchanger::new(300));
        {
            let mut cache = resolver.cache.lock().unwrap();
            cache.insert(
                "stale.example.".to_owned(),
                CachedAnswer {
                    v4: vec!["192.0.2.9".parse().unwrap()],
                    v6: Vec::new(),
                    expires_at: Instant::now() - Duration::from_secs(1),
                },
            );
        }
        assert!(resolver.load("stale.example.").is_none());
    }
}
