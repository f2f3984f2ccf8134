//! Refs carried inside messages are rebuilt by the receiving node

mod common;

use common::*;
use proptest::prelude::*;
use remoting::{InMemoryNetwork, Message, WireFormat};
use std::collections::BTreeMap;

#[test]
fn test_sender_ref_becomes_remote_and_replies_route_back() {
    let network = InMemoryNetwork::new();
    let (a, _) = connect(&network, "A");
    let (b, _) = connect(&network, "B");
    let (reply_cell, reply_to) = probe(&a, "/client");
    let (worker_cell, _) = probe(&b, "/worker");

    a.lookup_str("B/worker")
        .unwrap()
        .tell(Message::tuple([Message::from("ping"), Message::from(reply_to)]));
    network.run_until_idle();

    let received = worker_cell.take();
    assert_eq!(received.len(), 1);
    let Message::Tuple(items) = &received[0] else {
        panic!("unexpected {:?}", received[0]);
    };
    let client_on_b = items[1].as_ref_value().unwrap();
    assert_eq!(client_on_b.uri(), &uri("A/client"));
    assert!(!client_on_b.is_local());

    client_on_b.tell("pong");
    network.run_until_idle();
    assert_eq!(reply_cell.received(), vec![Message::from("pong")]);
}

#[test]
fn test_refs_to_the_receiver_become_local() {
    let network = InMemoryNetwork::new();
    let (a, _) = connect(&network, "A");
    let (b, _) = connect(&network, "B");
    let (worker_cell, _) = probe(&b, "/worker");
    probe(&b, "/peer");

    let mut map = BTreeMap::new();
    map.insert("live".to_string(), Message::from(a.lookup_str("B/peer").unwrap()));
    map.insert("gone".to_string(), Message::from(a.lookup_str("B/gone").unwrap()));
    map.insert("third".to_string(), Message::from(a.lookup_str("C/x").unwrap()));

    a.lookup_str("B/worker").unwrap().tell(Message::Map(map));
    network.run_until_idle();

    let received = worker_cell.take();
    let Message::Map(map) = &received[0] else {
        panic!("unexpected {:?}", received[0]);
    };

    let live = map["live"].as_ref_value().unwrap();
    assert!(live.is_local());
    assert!(live.cell().is_some());

    let gone = map["gone"].as_ref_value().unwrap();
    assert!(gone.is_local());
    assert!(gone.is_dead());
    assert_eq!(gone.uri(), &uri("B/gone"));

    let third = map["third"].as_ref_value().unwrap();
    assert!(!third.is_local());
}

#[test]
fn test_corrupt_inbound_bytes_are_dropped() {
    let network = InMemoryNetwork::new();
    let (_a, a_events) = connect(&network, "A");
    let (b, b_events) = connect(&network, "B");
    let (worker_cell, _) = probe(&b, "/worker");

    b.on_receive(&nid("A"), b"ACTR\x01garbage");
    b.on_receive(&nid("A"), &[]);

    assert!(worker_cell.received().is_empty());
    assert!(a_events.is_empty());
    assert!(b_events.is_empty());
}

#[test]
fn test_deeply_nested_inbound_frame_is_dropped() {
    let network = InMemoryNetwork::new();
    let (_a, a_events) = connect(&network, "A");
    let (b, b_events) = connect(&network, "B");
    let (worker_cell, _) = probe(&b, "/worker");

    // 300k single-element tuples: ~3.6 MB, under the 4 MiB frame limit
    let mut frame = WireFormat::MAGIC.to_vec();
    frame.push(WireFormat::VERSION);
    frame.extend_from_slice(&7u64.to_le_bytes());
    frame.extend_from_slice(b"/worker");
    for _ in 0..300_000 {
        frame.extend_from_slice(&6u32.to_le_bytes());
        frame.extend_from_slice(&1u64.to_le_bytes());
    }
    frame.extend_from_slice(&0u32.to_le_bytes());
    assert!(frame.len() as u64 <= b.codec().max_envelope_bytes());

    b.on_receive(&nid("A"), &frame);

    assert!(worker_cell.received().is_empty());
    assert!(a_events.is_empty());
    assert!(b_events.is_empty());

    // The node keeps serving afterwards
    b.on_receive(&nid("A"), &b.codec().encode(&uri("/worker"), &ping(), None).unwrap());
    assert_eq!(worker_cell.received(), vec![ping()]);
}

proptest! {
    #[test]
    fn prop_locality_is_recomputed_by_receiver(
        owner in prop::sample::select(vec!["A", "B", "C"]),
        segments in prop::collection::vec("[a-z]{1,6}", 1..4),
    ) {
        let network = InMemoryNetwork::new();
        let (a, _) = connect(&network, "A");
        let (b, _) = connect(&network, "B");
        let (worker_cell, _) = probe(&b, "/worker");

        let target = format!("{}/{}", owner, segments.join("/"));
        let embedded = a.lookup_str(&target).unwrap();
        a.lookup_str("B/worker").unwrap().tell(embedded.clone());
        network.run_until_idle();

        let received = worker_cell.take();
        prop_assert_eq!(received.len(), 1);
        let rebuilt = received[0].as_ref_value().unwrap();
        prop_assert_eq!(rebuilt.uri(), embedded.uri());
        prop_assert_eq!(rebuilt.is_local(), owner == "B");
    }
}
