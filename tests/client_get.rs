//! End-to-end query behavior against the in-process agent.
//!
//! Covers the scalar/subtree fallback contract: a scalar identifier
//! yields one result from a single GET, a non-leaf identifier yields its
//! whole subtree in ascending order via GETBULK, and an identifier with
//! no entries yields nothing without failing.

mod common;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use common::{TestAgent, tree_store};
use snmp_query::message::CommunityMessage;
use snmp_query::pdu::{Pdu, PduType};
use snmp_query::{Auth, Client, ClientConfig, Oid, Value, VarBind, oid};

fn test_config() -> ClientConfig {
    ClientConfig {
        timeout: Duration::from_secs(5),
        repeat_interval: Duration::from_millis(50),
        min_repeat_delay: Duration::from_millis(500),
        repeat_randomization: Duration::from_millis(100),
        ..ClientConfig::default()
    }
}

fn test_client() -> Client {
    Client::builder()
        .bind("127.0.0.1:0".parse().unwrap())
        .config(test_config())
        .open()
        .unwrap()
}

async fn get_all(client: &Client, addr: SocketAddr, oid: Oid) -> Vec<String> {
    client
        .get(addr, Auth::community("community"), oid)
        .collect()
        .await
        .unwrap()
        .iter()
        .map(|vb| vb.to_string())
        .collect()
}

#[tokio::test]
async fn scalar_yields_exactly_one_result() {
    let agent = TestAgent::with_data(tree_store()).await;
    let client = test_client();

    let results = get_all(&client, agent.addr(), oid!(1, 1, 1)).await;
    assert_eq!(results, ["1.1.1:val1.1.1"]);

    // No fallback: exactly one wire GET
    assert_eq!(agent.requests(), [PduType::GetRequest]);
}

#[tokio::test]
async fn internal_node_yields_subtree_in_ascending_order() {
    let agent = TestAgent::with_data(tree_store()).await;
    let client = test_client();

    let results = get_all(&client, agent.addr(), oid!(1, 1)).await;
    assert_eq!(
        results,
        [
            "1.1.1:val1.1.1",
            "1.1.1.1:val1.1.1.1",
            "1.1.1.2:val1.1.1.2",
            "1.1.2:val1.1.2",
            "1.1.3.1:val1.1.3.1",
            "1.1.3.2:val1.1.3.2",
        ]
    );

    // The initial GET fell back to at least one GETBULK
    let requests = agent.requests();
    assert_eq!(requests[0], PduType::GetRequest);
    assert!(requests.contains(&PduType::GetBulkRequest));
}

#[tokio::test]
async fn reference_scenario() {
    let agent = TestAgent::with_data(tree_store()).await;
    let client = test_client();
    let addr = agent.addr();

    assert_eq!(get_all(&client, addr, oid!(1, 1, 1)).await, ["1.1.1:val1.1.1"]);
    assert_eq!(get_all(&client, addr, oid!(1, 1, 1)).await, ["1.1.1:val1.1.1"]);
    assert_eq!(get_all(&client, addr, oid!(1, 1, 2)).await, ["1.1.2:val1.1.2"]);
    assert_eq!(
        get_all(&client, addr, oid!(1, 1, 3)).await,
        ["1.1.3.1:val1.1.3.1", "1.1.3.2:val1.1.3.2"]
    );
    assert_eq!(get_all(&client, addr, oid!(1, 1, 4)).await, Vec::<String>::new());
}

#[tokio::test]
async fn empty_subtree_finishes_without_failure() {
    let agent = TestAgent::with_data(tree_store()).await;
    let client = test_client();

    let results = client
        .get(agent.addr(), Auth::community("community"), oid!(1, 1, 4))
        .collect()
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn walk_pages_through_small_bulk_size() {
    let agent = TestAgent::with_data(tree_store()).await;
    let client = Client::builder()
        .bind("127.0.0.1:0".parse().unwrap())
        .config(ClientConfig {
            bulk_size: 2,
            ..test_config()
        })
        .open()
        .unwrap();

    let results = get_all(&client, agent.addr(), oid!(1, 1)).await;
    assert_eq!(results.len(), 6);

    // Six entries at two per page plus the empty tail page
    let bulk_count = agent
        .requests()
        .iter()
        .filter(|t| **t == PduType::GetBulkRequest)
        .count();
    assert!(bulk_count >= 3, "expected >= 3 GETBULKs, saw {bulk_count}");
}

#[tokio::test]
async fn walk_stops_at_first_entry_outside_subtree() {
    let mut store = tree_store();
    store.insert(oid!(1, 2, 1), Value::from("outside"));
    let agent = TestAgent::with_data(store).await;
    let client = test_client();

    let results = get_all(&client, agent.addr(), oid!(1, 1, 3)).await;
    assert_eq!(results, ["1.1.3.1:val1.1.3.1", "1.1.3.2:val1.1.3.2"]);
}

#[tokio::test]
async fn result_ceiling_ends_walk_early() {
    let agent = TestAgent::with_data(tree_store()).await;
    let client = Client::builder()
        .bind("127.0.0.1:0".parse().unwrap())
        .config(ClientConfig {
            max_results: Some(3),
            ..test_config()
        })
        .open()
        .unwrap();

    let results = get_all(&client, agent.addr(), oid!(1, 1)).await;
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn concurrent_queries_correlate_independently() {
    let agent = TestAgent::with_data(tree_store()).await;
    let client = test_client();
    let addr = agent.addr();

    let a = client
        .get(addr, Auth::community("community"), oid!(1, 1, 1))
        .collect();
    let b = client
        .get(addr, Auth::community("community"), oid!(1, 1, 3))
        .collect();
    let c = client
        .get(addr, Auth::community("community"), oid!(1, 1, 4))
        .collect();

    let (a, b, c) = tokio::join!(a, b, c);
    assert_eq!(a.unwrap().len(), 1);
    assert_eq!(b.unwrap().len(), 2);
    assert!(c.unwrap().is_empty());
}

#[tokio::test]
async fn callback_interface_delivers_and_finishes() {
    let agent = TestAgent::with_data(tree_store()).await;
    let client = test_client();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let done = tx.clone();
    client
        .request()
        .receiving(move |vb| {
            tx.send(format!("{vb}")).unwrap();
        })
        .finished(move || {
            done.send("finished".into()).unwrap();
        })
        .get(
            agent.addr(),
            Auth::community("community"),
            oid!(1, 1, 2),
        );

    let mut seen = Vec::new();
    while let Some(event) = rx.recv().await {
        let finished = event == "finished";
        seen.push(event);
        if finished {
            break;
        }
    }
    assert_eq!(seen, ["1.1.2:val1.1.2", "finished"]);
}

#[tokio::test]
async fn duplicate_response_for_finished_request_is_dropped() {
    // A responder that answers every GET twice with identical datagrams.
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let store: BTreeMap<Oid, Value> = tree_store();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 65507];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let Ok(message) = CommunityMessage::decode(Bytes::copy_from_slice(&buf[..len]))
            else {
                continue;
            };
            let requested = message.pdu.varbinds[0].oid.clone();
            let value = store
                .get(&requested)
                .cloned()
                .unwrap_or(Value::NoSuchObject);
            let response = CommunityMessage::new(
                message.community,
                Pdu::response(
                    message.pdu.request_id,
                    0,
                    0,
                    vec![VarBind::new(requested, value)],
                ),
            )
            .encode();
            let _ = socket.send_to(&response, peer).await;
            let _ = socket.send_to(&response, peer).await;
        }
    });

    let client = test_client();

    // The duplicate lands on an already-removed request id and is ignored
    let first = get_all(&client, addr, oid!(1, 1, 1)).await;
    assert_eq!(first, ["1.1.1:val1.1.1"]);

    // The engine keeps working afterwards
    let second = get_all(&client, addr, oid!(1, 1, 2)).await;
    assert_eq!(second, ["1.1.2:val1.1.2"]);
}

#[tokio::test]
async fn close_fails_in_flight_queries() {
    // Silent responder: queries stay in flight until close
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    let client = test_client();
    let mut stream = client.get(addr, Auth::community("community"), oid!(1, 1));

    tokio::time::sleep(Duration::from_millis(50)).await;
    client.close();
    client.close(); // idempotent

    match stream.next().await {
        Some(Err(snmp_query::Error::Closed)) => {}
        other => panic!("expected Closed, got {other:?}"),
    }
    drop(socket);
}
