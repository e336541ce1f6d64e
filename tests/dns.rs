use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use hickory_proto::{
    op::{Message, MessageType},
    rr::{rdata, RData, Record, RecordType},
};
use tokio::net::UdpSocket;

use portfwd::resolver::{CachedResolver, Resolver, Strategy, UdpDnsClient};

/// An answering DNS server echoing one A record for every A query
async fn spawn_dns_responder(truncated: bool) -> (SocketAddr, Arc<AtomicUsize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    let queries = Arc::new(AtomicUsize::new(0));
    let counter = queries.clone();

    tokio::spawn(async move {
        let mut buffer = [0u8; 512];
        loop {
            let (n, peer) = match socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(..) => return,
            };
            counter.fetch_add(1, Ordering::SeqCst);

            let query = match Message::from_vec(&buffer[..n]) {
                Ok(query) => query,
                Err(..) => continue,
            };
            let question = query.queries()[0].clone();

            let mut answer = Message::new();
            answer.set_id(query.id());
            answer.set_message_type(MessageType::Response);
            answer.set_truncated(truncated);
            answer.add_query(question.clone());

            if question.query_type() == RecordType::A {
                answer.add_answer(Record::from_rdata(
                    question.name().clone(),
                    300,
                    RData::A(rdata::A("127.0.0.1".parse().unwrap())),
                ));
            }

            let bytes = answer.to_vec().unwrap();
            let _ = socket.send_to(&bytes, peer).await;
        }
    });

    (addr, queries)
}

#[tokio::test]
async fn cached_resolver_resolves_and_caches() {
    let _ = env_logger::try_init();

    let (server, queries) = spawn_dns_responder(false).await;
    let resolver = CachedResolver::new(UdpDnsClient::new(server));

    let (v4, v6) = resolver.lookup("service.internal", Strategy::Default).await.unwrap();
    assert_eq!(v4, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    assert!(v6.is_empty());
    // One A and one AAAA query went out
    assert_eq!(queries.load(Ordering::SeqCst), 2);

    // The second lookup is served from the cache
    let (v4, ..) = resolver.lookup("service.internal", Strategy::Default).await.unwrap();
    assert_eq!(v4.len(), 1);
    assert_eq!(queries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ipv4_only_sends_a_single_query() {
    let (server, queries) = spawn_dns_responder(false).await;
    let resolver = CachedResolver::new(UdpDnsClient::new(server));

    let (v4, v6) = resolver.lookup("a.internal", Strategy::Ipv4Only).await.unwrap();
    assert!(!v4.is_empty());
    assert!(v6.is_empty());
    assert_eq!(queries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn truncated_responses_are_rejected() {
    let (server, ..) = spawn_dns_responder(true).await;
    let resolver = CachedResolver::new(UdpDnsClient::new(server));

    let err = resolver
        .lookup("service.internal", Strategy::Default)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("truncated"));
}
