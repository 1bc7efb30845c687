mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::timeout;
use vigil_cluster::handlers::{SetLogPosition, SET_LOG_POSITION};
use vigil_cluster::{
    ConnectionRole, ConnectionState, Directory, DispatchTable, MethodResult, Origin,
    PeerConnection, SessionTransport, OUTBOUND_QUEUE_LIMIT,
};
use vigil_wire::Message;

use support::{eventually, FakeTransport};

const WAIT: Duration = Duration::from_secs(5);

fn counting_table() -> (Arc<DispatchTable>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&count);
    let mut table = DispatchTable::new();
    table
        .register(
            "event.record",
            move |_: &Origin, _: Option<&Value>| -> MethodResult {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            },
        )
        .unwrap();
    table.register(SET_LOG_POSITION, SetLogPosition).unwrap();
    (Arc::new(table), count)
}

fn connect(
    identity: Option<&str>,
    transport: &Arc<FakeTransport>,
    table: &Arc<DispatchTable>,
    directory: &Arc<Directory>,
) -> Arc<PeerConnection> {
    PeerConnection::attach(
        identity.map(str::to_string),
        Arc::clone(transport) as Arc<dyn SessionTransport>,
        ConnectionRole::Acceptor,
        Arc::clone(table),
        Arc::clone(directory),
    )
}

#[tokio::test]
async fn drains_messages_buffered_before_start() {
    let (table, count) = counting_table();
    let directory = Arc::new(Directory::new("master"));
    let transport = FakeTransport::new();

    // Both messages are already buffered when the driver starts; the
    // initial drain pass must deliver them without a readiness signal.
    transport.push(Message::request("event.record", json!({})));
    transport.push(Message::request("event.record", json!({})).with_id(json!("m1")));

    let connection = connect(None, &transport, &table, &directory);
    connection.start();

    let reply = timeout(WAIT, transport.reply_with_id("m1")).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert!(reply.error.is_none());
}

#[tokio::test]
async fn stale_messages_are_dropped_before_dispatch() {
    let (table, count) = counting_table();
    let directory = Arc::new(Directory::new("master"));
    let endpoint = directory.register_endpoint("peer-a", "master");
    endpoint.advance_remote_log_position(100.0);

    let transport = FakeTransport::new();
    let connection = connect(Some("peer-a"), &transport, &table, &directory);
    connection.start();

    transport.push(Message::request("event.record", json!({})).with_ts(50.0));
    transport.push(
        Message::request("event.record", json!({}))
            .with_ts(150.0)
            .with_id(json!("m1")),
    );

    timeout(WAIT, transport.reply_with_id("m1")).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(endpoint.remote_log_position(), 150.0);
}

#[tokio::test]
async fn messages_at_the_current_position_still_dispatch() {
    let (table, count) = counting_table();
    let directory = Arc::new(Directory::new("master"));
    let endpoint = directory.register_endpoint("peer-a", "master");
    endpoint.advance_remote_log_position(100.0);

    let transport = FakeTransport::new();
    let connection = connect(Some("peer-a"), &transport, &table, &directory);
    connection.start();

    transport.push(
        Message::request("event.record", json!({}))
            .with_ts(100.0)
            .with_id(json!("m1")),
    );

    timeout(WAIT, transport.reply_with_id("m1")).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(endpoint.remote_log_position(), 100.0);
}

#[tokio::test]
async fn unknown_method_replies_with_error_and_keeps_serving() {
    let (table, count) = counting_table();
    let directory = Arc::new(Directory::new("master"));
    let transport = FakeTransport::new();
    let connection = connect(None, &transport, &table, &directory);
    connection.start();

    transport.push(Message::request("no.such.method", json!({})).with_id(json!("42")));
    let reply = timeout(WAIT, transport.reply_with_id("42")).await.unwrap();
    assert_eq!(reply.jsonrpc.as_deref(), Some("2.0"));
    assert!(!reply.error.clone().unwrap_or_default().is_empty());
    assert!(reply.result.is_none());

    // The connection keeps accepting messages afterwards.
    transport.push(Message::request("event.record", json!({})).with_id(json!("43")));
    let reply = timeout(WAIT, transport.reply_with_id("43")).await.unwrap();
    assert!(reply.error.is_none());
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(connection.state(), ConnectionState::Active);
}

#[tokio::test]
async fn heartbeats_do_not_refresh_last_seen() {
    let (table, _) = counting_table();
    let directory = Arc::new(Directory::new("master"));
    let endpoint = directory.register_endpoint("peer-a", "master");
    let transport = FakeTransport::new();
    let connection = connect(Some("peer-a"), &transport, &table, &directory);
    connection.start();

    let before = connection.last_seen();
    tokio::time::sleep(Duration::from_millis(20)).await;

    transport.push(Message::request(
        SET_LOG_POSITION,
        json!({"log_position": 5.0}),
    ));
    eventually(|| endpoint.local_log_position() == 5.0).await;
    assert_eq!(connection.last_seen(), before);

    transport.push(Message::request("event.record", json!({})).with_id(json!("m1")));
    timeout(WAIT, transport.reply_with_id("m1")).await.unwrap();
    assert!(connection.last_seen() > before);
}

#[tokio::test]
async fn heartbeat_positions_never_move_backwards() {
    let (table, _) = counting_table();
    let directory = Arc::new(Directory::new("master"));
    let endpoint = directory.register_endpoint("peer-a", "master");
    let transport = FakeTransport::new();
    let connection = connect(Some("peer-a"), &transport, &table, &directory);
    connection.start();

    for position in [50.0, 100.0, 80.0] {
        transport.push(Message::request(
            SET_LOG_POSITION,
            json!({"log_position": position}),
        ));
    }
    transport.push(Message::request("event.record", json!({})).with_id(json!("m1")));
    timeout(WAIT, transport.reply_with_id("m1")).await.unwrap();

    assert_eq!(endpoint.local_log_position(), 100.0);
}

#[tokio::test]
async fn teardown_runs_exactly_once() {
    let (table, _) = counting_table();
    let directory = Arc::new(Directory::new("master"));
    let endpoint = directory.register_endpoint("peer-a", "master");
    let transport = FakeTransport::new();
    let connection = connect(Some("peer-a"), &transport, &table, &directory);
    assert_eq!(endpoint.client_count(), 1);

    // Concurrent EOF- and overflow-style teardown converge on one pass.
    tokio::join!(connection.disconnect_now(), connection.disconnect_now());
    assert_eq!(endpoint.client_count(), 0);
    assert_eq!(transport.close_calls(), 1);
    assert_eq!(connection.state(), ConnectionState::Closed);

    connection.disconnect_now().await;
    assert_eq!(transport.close_calls(), 1);
}

#[tokio::test]
async fn peer_eof_triggers_disconnect() {
    let (table, _) = counting_table();
    let directory = Arc::new(Directory::new("master"));
    let transport = FakeTransport::new();
    let connection = connect(None, &transport, &table, &directory);
    assert_eq!(directory.anonymous_client_count(), 1);
    connection.start();

    transport.finish();
    eventually(|| connection.state() == ConnectionState::Closed).await;
    assert_eq!(transport.close_calls(), 1);
    assert_eq!(directory.anonymous_client_count(), 0);
}

#[tokio::test]
async fn queue_overflow_drops_the_connection() {
    let (table, _) = counting_table();
    let directory = Arc::new(Directory::new("master"));
    let transport = FakeTransport::stalled();
    let connection = connect(None, &transport, &table, &directory);
    connection.start();

    for sequence in 0..=(OUTBOUND_QUEUE_LIMIT + 1) {
        connection.enqueue(Message::request("event.update", json!({"sequence": sequence})));
    }

    eventually(|| connection.state() == ConnectionState::Closed).await;
    assert_eq!(transport.close_calls(), 1);
    assert_eq!(directory.anonymous_client_count(), 0);
}

#[tokio::test]
async fn enqueue_after_disconnect_is_a_no_op() {
    let (table, _) = counting_table();
    let directory = Arc::new(Directory::new("master"));
    let transport = FakeTransport::new();
    let connection = connect(None, &transport, &table, &directory);
    connection.start();

    connection.disconnect_now().await;
    connection.enqueue(Message::request("event.update", json!({})));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test]
async fn queued_messages_are_sent_in_enqueue_order() {
    let (table, _) = counting_table();
    let directory = Arc::new(Directory::new("master"));
    let transport = FakeTransport::new();
    let connection = connect(None, &transport, &table, &directory);
    connection.start();

    for sequence in 0..3 {
        connection.enqueue(Message::request("event.update", json!({"sequence": sequence})));
    }

    let sent = timeout(WAIT, transport.wait_for_sent(3)).await.unwrap();
    let sequences: Vec<i64> = sent
        .iter()
        .filter_map(|message| message.params.as_ref()?.get("sequence")?.as_i64())
        .collect();
    assert_eq!(sequences, vec![0, 1, 2]);
}

fn zone_recording_table() -> (Arc<DispatchTable>, Arc<Mutex<Vec<Option<String>>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut table = DispatchTable::new();
    table
        .register(
            "event.zone",
            move |origin: &Origin, _: Option<&Value>| -> MethodResult {
                sink.lock().unwrap().push(
                    origin
                        .from_zone
                        .as_ref()
                        .map(|zone| zone.name().to_string()),
                );
                Ok(Value::Null)
            },
        )
        .unwrap();
    (Arc::new(table), seen)
}

#[tokio::test]
async fn local_zone_peers_originate_in_the_local_zone() {
    let (table, seen) = zone_recording_table();
    let directory = Arc::new(Directory::new("master"));
    directory.register_endpoint("peer-a", "master");
    directory.register_zone("edge");

    let transport = FakeTransport::new();
    let connection = connect(Some("peer-a"), &transport, &table, &directory);
    connection.start();

    // The stamped origin zone is irrelevant for a local-zone peer.
    transport.push(
        Message::request("event.zone", json!({}))
            .with_origin_zone("edge")
            .with_id(json!("m1")),
    );
    timeout(WAIT, transport.reply_with_id("m1")).await.unwrap();
    assert_eq!(seen.lock().unwrap().as_slice(), [Some("master".to_string())]);
}

#[tokio::test]
async fn remote_zone_peers_resolve_the_stamped_origin_zone() {
    let (table, seen) = zone_recording_table();
    let directory = Arc::new(Directory::new("master"));
    directory.register_endpoint("peer-b", "satellite");
    directory.register_zone("edge");

    let transport = FakeTransport::new();
    let connection = connect(Some("peer-b"), &transport, &table, &directory);
    connection.start();

    transport.push(
        Message::request("event.zone", json!({}))
            .with_origin_zone("edge")
            .with_id(json!("m1")),
    );
    timeout(WAIT, transport.reply_with_id("m1")).await.unwrap();

    // Unstamped or unknown origin zones resolve to none.
    transport.push(Message::request("event.zone", json!({})).with_id(json!("m2")));
    timeout(WAIT, transport.reply_with_id("m2")).await.unwrap();

    assert_eq!(
        seen.lock().unwrap().as_slice(),
        [Some("edge".to_string()), None]
    );
}
