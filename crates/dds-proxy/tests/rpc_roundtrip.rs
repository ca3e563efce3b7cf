// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Black-box RPC tests: request/reply correlation across participants.

use dds_proxy::bridge::BridgeState;
use dds_proxy::types::{ParticipantId, RpcTopic};
use dds_proxy::{DdsProxy, ProxyConfig};
use std::time::Duration;

fn config(participant_ids: &[&str]) -> ProxyConfig {
    let mut yaml = String::from("version: v4.0\nparticipants:\n");
    for id in participant_ids {
        yaml.push_str(&format!("  - kind: echo\n    id: {id}\n"));
    }
    ProxyConfig::from_yaml(&yaml).expect("valid configuration")
}

#[test]
fn test_rpc_round_trip() {
    // A talks to a service hosted behind C; B is a bystander.
    let proxy = DdsProxy::new(config(&["a", "b", "c"])).expect("proxy");
    proxy.start().expect("start");

    let a = proxy.echo_participant(&ParticipantId::from("a")).expect("a");
    let c = proxy.echo_participant(&ParticipantId::from("c")).expect("c");

    let server = c.rpc_server("add", "AddTwoInts");
    let client = a.rpc_client("add", "AddTwoInts");

    let request_id = client.send_request(&[41]).expect("request");

    let request = server
        .recv_request(Duration::from_millis(500))
        .expect("server observes the request");
    assert_eq!(request.bytes(), &[41]);

    // Exactly once at the server.
    assert!(server.recv_request(Duration::from_millis(200)).is_none());

    let forwarded_id = request.identity().expect("forwarded identity");
    server
        .send_reply(&[request.bytes()[0] + 1], forwarded_id)
        .expect("reply");

    let reply = client
        .recv_reply(Duration::from_millis(500))
        .expect("client receives the reply");
    assert_eq!(reply.bytes(), &[42]);
    assert_eq!(reply.related_identity(), Some(request_id));

    // The correlation entry is gone: replaying the reply correlates to
    // nothing and reaches nobody.
    server
        .send_reply(&[42], forwarded_id)
        .expect("stray replay");
    assert!(client.recv_reply(Duration::from_millis(300)).is_none());
}

#[test]
fn test_reply_reaches_only_the_originating_participant() {
    let proxy = DdsProxy::new(config(&["a", "b", "c"])).expect("proxy");
    proxy.start().expect("start");

    let a = proxy.echo_participant(&ParticipantId::from("a")).expect("a");
    let b = proxy.echo_participant(&ParticipantId::from("b")).expect("b");
    let c = proxy.echo_participant(&ParticipantId::from("c")).expect("c");

    let server = c.rpc_server("add", "AddTwoInts");
    let client_a = a.rpc_client("add", "AddTwoInts");
    let client_b = b.rpc_client("add", "AddTwoInts");

    client_a.send_request(&[1]).expect("request");
    let request = server
        .recv_request(Duration::from_millis(500))
        .expect("request");
    server
        .send_reply(&[2], request.identity().expect("identity"))
        .expect("reply");

    assert!(client_a.recv_reply(Duration::from_millis(500)).is_some());
    assert!(client_b.recv_reply(Duration::from_millis(200)).is_none());
}

#[test]
fn test_server_loss_mid_flight() {
    let proxy = DdsProxy::new(config(&["a", "c1", "c2"])).expect("proxy");
    proxy.start().expect("start");

    let a = proxy.echo_participant(&ParticipantId::from("a")).expect("a");
    let c1 = proxy
        .echo_participant(&ParticipantId::from("c1"))
        .expect("c1");
    let c2 = proxy
        .echo_participant(&ParticipantId::from("c2"))
        .expect("c2");

    let server1 = c1.rpc_server("add", "AddTwoInts");
    let server2 = c2.rpc_server("add", "AddTwoInts");
    let client = a.rpc_client("add", "AddTwoInts");

    let request_id = client.send_request(&[7]).expect("request");

    let seen1 = server1.recv_request(Duration::from_millis(500));
    let seen2 = server2
        .recv_request(Duration::from_millis(500))
        .expect("second server sees the request");
    assert!(seen1.is_some());

    // First server goes away before answering.
    server1.close();

    server2
        .send_reply(&[8], seen2.identity().expect("identity"))
        .expect("reply");

    let reply = client
        .recv_reply(Duration::from_millis(500))
        .expect("reply survives the first server's loss");
    assert_eq!(reply.bytes(), &[8]);
    assert_eq!(reply.related_identity(), Some(request_id));

    // Losing the last server disables the bridge.
    server2.close();
    let rpc = RpcTopic::new("add", "AddTwoInts");
    assert_eq!(
        proxy.pipe().bridge_state(&rpc.request_topic),
        Some(BridgeState::Disabled)
    );

    // Requests are no longer forwarded anywhere.
    client.send_request(&[9]).expect("request into the void");
    assert!(client.recv_reply(Duration::from_millis(300)).is_none());
}

#[test]
fn test_no_reply_when_no_server_ever_appeared() {
    let proxy = DdsProxy::new(config(&["a", "c"])).expect("proxy");
    proxy.start().expect("start");

    let a = proxy.echo_participant(&ParticipantId::from("a")).expect("a");
    let client = a.rpc_client("add", "AddTwoInts");

    client.send_request(&[1]).expect("request");
    assert!(client.recv_reply(Duration::from_millis(300)).is_none());

    let rpc = RpcTopic::new("add", "AddTwoInts");
    // The bridge exists (the client's endpoints were observed) but never
    // activated.
    assert_eq!(
        proxy.pipe().bridge_state(&rpc.request_topic),
        Some(BridgeState::Created)
    );
}

#[test]
fn test_no_payload_leaks_after_rpc_traffic() {
    let proxy = DdsProxy::new(config(&["a", "c"])).expect("proxy");
    let pool = proxy.payload_pool().clone();
    proxy.start().expect("start");

    let a = proxy.echo_participant(&ParticipantId::from("a")).expect("a");
    let c = proxy.echo_participant(&ParticipantId::from("c")).expect("c");

    let server = c.rpc_server("add", "AddTwoInts");
    let client = a.rpc_client("add", "AddTwoInts");

    for i in 0..50u8 {
        client.send_request(&[i]).expect("request");
        let request = server
            .recv_request(Duration::from_millis(500))
            .expect("request");
        server
            .send_reply(&[i.wrapping_add(1)], request.identity().expect("identity"))
            .expect("reply");
        let reply = client
            .recv_reply(Duration::from_millis(500))
            .expect("reply");
        assert_eq!(reply.bytes(), &[i.wrapping_add(1)]);
    }

    proxy.stop();
    server.close();
    drop(client);
    drop(server);
    drop(proxy);
    assert_eq!(pool.outstanding(), 0, "payload pool leaked");
}
