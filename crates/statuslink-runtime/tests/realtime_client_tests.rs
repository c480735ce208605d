//! Realtime client behavior against a scripted server

use serde_json::json;
use statuslink_core::protocol::{events, Envelope};
use statuslink_core::{
    ChannelSpec, ConnectionState, Endpoint, HeapBudget, JoinConfig, PostgresChangeFilter,
    RealtimeConfig, Timestamp,
};
use statuslink_harness::{frames, ScriptedTransport, ScriptedTransportConfig, SimulatedMemory, TransportHandle};
use statuslink_runtime::{GateError, RealtimeClient, RealtimeLink, RuntimeError};

const TOPIC: &str = "realtime:display";

struct TestClient {
    client: RealtimeClient<ScriptedTransport>,
    server: TransportHandle,
    memory: SimulatedMemory,
}

fn create_test_client(config: RealtimeConfig) -> TestClient {
    let (transport, server) = ScriptedTransport::new(ScriptedTransportConfig::default());
    let mut client = RealtimeClient::new(config, HeapBudget::default(), transport);
    client.set_endpoint(Endpoint::new("demo.example.co", "anon-key").unwrap());
    TestClient {
        client,
        server,
        memory: SimulatedMemory::roomy(),
    }
}

fn ms(millis: u64) -> Timestamp {
    Timestamp::from_millis(millis)
}

impl TestClient {
    fn connect(&mut self, now: Timestamp) {
        self.client.begin(now, &self.memory).unwrap();
        self.server.accept();
        self.client.poll(now, &self.memory);
        assert_eq!(self.client.state(), ConnectionState::SocketConnected);
    }

    fn subscribe(&mut self, join: JoinConfig, now: Timestamp) -> Envelope {
        self.client
            .subscribe(ChannelSpec::new(TOPIC, join), now, &self.memory)
            .unwrap();
        self.server.sent_events(events::JOIN).pop().unwrap()
    }

    fn deliver(&mut self, frame: &str, now: Timestamp) {
        self.server.receive(frame);
        self.client.poll(now, &self.memory);
    }
}

#[test]
fn socket_url_carries_api_key_and_version() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.connect(ms(0));

    let urls = t.server.connect_urls();
    assert_eq!(
        urls,
        vec!["wss://demo.example.co/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"]
    );
}

#[test]
fn reply_to_superseded_join_is_ignored() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.connect(ms(0));

    let first = t.subscribe(JoinConfig::default(), ms(0));
    let second = t.subscribe(JoinConfig::default(), ms(0));
    assert!(second.msg_ref > first.msg_ref);

    t.deliver(&frames::join_ok(&first), ms(10));
    assert_eq!(t.client.state(), ConnectionState::SocketConnected);
    assert!(!t.client.session(TOPIC).unwrap().is_subscribed());

    t.deliver(&frames::join_ok(&second), ms(20));
    assert_eq!(t.client.state(), ConnectionState::ChannelSubscribed);
    assert!(t.client.flags().is_subscribed());
}

#[test]
fn rejected_join_is_not_retried_on_heartbeat() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.connect(ms(0));
    let join = t.subscribe(JoinConfig::default(), ms(0));

    t.deliver(&frames::join_error(&join, "unauthorized"), ms(10));
    t.deliver(&frames::heartbeat_reply(1), ms(1_000));

    assert_eq!(t.server.sent_events(events::JOIN).len(), 1);
    assert_eq!(t.client.state(), ConnectionState::SocketConnected);
}

#[test]
fn presence_confirms_join_without_reply() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.connect(ms(0));
    t.subscribe(JoinConfig::default(), ms(0));

    t.deliver(&frames::presence_state(TOPIC), ms(5));

    assert_eq!(t.client.state(), ConnectionState::ChannelSubscribed);
}

#[test]
fn closed_channel_rejoins_on_next_heartbeat() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.connect(ms(0));
    let join = t.subscribe(JoinConfig::default(), ms(0));
    t.deliver(&frames::join_ok(&join), ms(5));

    t.deliver(&frames::channel_close(TOPIC), ms(10));
    assert_eq!(t.client.state(), ConnectionState::SocketConnected);

    t.client.poll(ms(1_000), &t.memory);
    let joins = t.server.sent_events(events::JOIN);
    assert_eq!(joins.len(), 2);
    assert!(joins[1].join_ref > joins[0].join_ref);
    assert_eq!(t.server.sent_events(events::HEARTBEAT).len(), 1);
}

#[test]
fn burst_beyond_mailbox_capacity_drops_newest() {
    let mut t = create_test_client(RealtimeConfig {
        mailbox_capacity: 4,
        ..RealtimeConfig::testing()
    });
    t.connect(ms(0));

    for i in 0..5 {
        t.server
            .receive(&frames::broadcast(TOPIC, "status", json!({ "seq": i })));
    }
    t.client.poll(ms(10), &t.memory);

    let seqs: Vec<_> = t
        .client
        .drain_messages()
        .map(|m| m.payload["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);
    assert_eq!(t.client.dropped_frames(), 1);
}

#[test]
fn low_memory_blocks_connect_and_sends_without_writing() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.memory.set_free(90_000);
    assert!(matches!(
        t.client.begin(ms(0), &t.memory),
        Err(RuntimeError::Gate(GateError::HeapBelowThreshold { .. }))
    ));
    assert_eq!(t.server.connect_count(), 0);

    t.memory.set_free(200_000);
    t.connect(ms(0));
    let join = t.subscribe(JoinConfig::default(), ms(0));
    t.deliver(&frames::join_ok(&join), ms(5));

    t.memory.set_free(40_000);
    let before = t.server.bytes_sent();
    let result = t
        .client
        .send_broadcast(TOPIC, "device_state", json!({ "rssi": -60 }), ms(10), &t.memory);
    assert!(matches!(
        result,
        Err(RuntimeError::Gate(GateError::HeapBelowThreshold { required: 60_000, .. }))
    ));
    t.client.poll(ms(1_000), &t.memory);
    assert_eq!(t.server.bytes_sent(), before);
}

#[test]
fn broadcast_requires_subscribed_channel() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.connect(ms(0));
    t.subscribe(JoinConfig::default(), ms(0));

    assert!(matches!(
        t.client.send_broadcast(TOPIC, "status", json!({}), ms(1), &t.memory),
        Err(RuntimeError::NotSubscribed { .. })
    ));
}

#[test]
fn backoff_grows_on_failure_and_resets_on_connect() {
    let mut t = create_test_client(RealtimeConfig::testing());

    t.client.begin(ms(0), &t.memory).unwrap();
    t.client.poll(ms(1_001), &t.memory);
    assert_eq!(t.client.retry_at(), Some(ms(1_101)));

    t.client.begin(ms(1_101), &t.memory).unwrap();
    t.client.poll(ms(2_102), &t.memory);
    assert_eq!(t.client.retry_at(), Some(ms(2_302)));

    t.connect(ms(2_302));
    assert_eq!(t.client.retry_at(), None);

    t.server.drop_connection();
    t.client.poll(ms(2_400), &t.memory);
    assert_eq!(t.client.state(), ConnectionState::Disconnected);
    assert_eq!(t.client.retry_at(), Some(ms(2_500)));
}

#[test]
fn traffic_keeps_connection_alive() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.connect(ms(0));

    t.deliver(&frames::heartbeat_reply(1), ms(3_000));
    t.client.poll(ms(4_001), &t.memory);
    assert!(t.client.state().is_socket_connected());

    t.client.poll(ms(7_001), &t.memory);
    assert_eq!(t.client.state(), ConnectionState::Disconnected);
    assert_eq!(t.server.close_count(), 1);
}

#[test]
fn malformed_frames_do_not_count_as_traffic() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.connect(ms(0));

    t.deliver("{not json", ms(3_000));
    t.client.poll(ms(4_001), &t.memory);

    assert_eq!(t.client.state(), ConnectionState::Disconnected);
}

#[test]
fn token_refresh_reaches_private_channels() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.client.set_access_token("jwt-1", ms(0), &t.memory);
    t.connect(ms(0));
    let join = t.subscribe(JoinConfig::broadcast(true), ms(0));
    assert_eq!(join.payload["access_token"], "jwt-1");
    assert_eq!(join.payload["config"]["private"], true);
    t.deliver(&frames::join_ok(&join), ms(5));

    t.client.set_access_token("Bearer jwt-2", ms(10), &t.memory);

    let tokens = t.server.sent_events(events::ACCESS_TOKEN);
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].payload["access_token"], "jwt-2");
    assert_eq!(tokens[0].join_ref, join.join_ref);
}

#[test]
fn row_changes_reach_the_inbox() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.connect(ms(0));
    let join = t.subscribe(
        JoinConfig::postgres(vec![PostgresChangeFilter::table("public", "commands")]),
        ms(0),
    );
    assert_eq!(join.payload["config"]["postgres_changes"][0]["table"], "commands");

    t.deliver(
        &frames::postgres_insert(TOPIC, "commands", frames::command_row("cmd-00000001", "ping")),
        ms(5),
    );

    let messages: Vec<_> = t.client.drain_messages().collect();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].table, "commands");
    assert_eq!(messages[0].event, "INSERT");
    assert_eq!(messages[0].record().unwrap()["id"], "cmd-00000001");
}

#[test]
fn callbacks_from_replaced_connection_are_ignored() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.connect(ms(0));
    let old_sink = t.server.sink().unwrap();

    t.client.disconnect();
    t.client.begin(ms(100), &t.memory).unwrap();
    old_sink.on_disconnected();
    old_sink.on_data(statuslink_runtime::DataFrame::text(&frames::broadcast(TOPIC, "x", json!({}))));
    t.server.accept();
    t.client.poll(ms(100), &t.memory);

    assert_eq!(t.client.state(), ConnectionState::SocketConnected);
    assert_eq!(t.client.pending_messages(), 0);
}

#[test]
fn held_joins_use_refs_of_the_next_connection() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.client
        .subscribe(ChannelSpec::new(TOPIC, JoinConfig::default()), ms(0), &t.memory)
        .unwrap();
    assert!(t.server.sent().is_empty());

    t.connect(ms(0));
    t.client.poll(ms(1_000), &t.memory);

    let sent = t.server.sent_envelopes();
    assert_eq!(sent[0].event, events::JOIN);
    assert_eq!(sent[1].event, events::HEARTBEAT);
    assert!(sent[1].msg_ref > sent[0].msg_ref);
}

#[test]
fn subscribe_refused_for_low_memory_changes_nothing() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.connect(ms(0));
    let join = t.subscribe(JoinConfig::default(), ms(0));
    t.deliver(&frames::join_ok(&join), ms(5));
    assert_eq!(t.client.state(), ConnectionState::ChannelSubscribed);

    t.memory.set_free(40_000);
    let result = t
        .client
        .subscribe(ChannelSpec::new(TOPIC, JoinConfig::default()), ms(10), &t.memory);
    assert!(matches!(
        result,
        Err(RuntimeError::Gate(GateError::HeapBelowThreshold { .. }))
    ));
    let session = t.client.session(TOPIC).unwrap();
    assert!(session.is_subscribed());
    assert_eq!(session.join_ref(), join.msg_ref);
    assert!(session.pending_join().is_none());
    assert_eq!(t.client.state(), ConnectionState::ChannelSubscribed);

    t.memory.set_free(200_000);
    t.client.poll(ms(1_000), &t.memory);
    assert_eq!(t.server.sent_events(events::JOIN).len(), 1);
}

#[test]
fn rejoining_a_subscribed_channel_drops_to_socket_connected() {
    let mut t = create_test_client(RealtimeConfig::testing());
    t.connect(ms(0));
    let join = t.subscribe(JoinConfig::default(), ms(0));
    t.deliver(&frames::join_ok(&join), ms(5));

    let rejoin = t.subscribe(JoinConfig::broadcast(false), ms(10));

    assert!(rejoin.join_ref > join.join_ref);
    assert_eq!(t.client.state(), ConnectionState::SocketConnected);
    assert!(!t.client.flags().is_subscribed());
}

