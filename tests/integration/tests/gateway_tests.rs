//! End-to-end shard scenarios against the mock gateway

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc;

use helselia_common::ClientOptions;
use helselia_core::{CacheStore, Intents, Token};
use helselia_gateway::{Event, Shard};
use integration_tests::mock_gateway::{MockGateway, MockSession};

fn spawn_shard(
    url: String,
    options: ClientOptions,
) -> (Arc<Shard>, mpsc::UnboundedReceiver<Event>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let shard = Shard::new(
        0,
        1,
        Token::bot("X"),
        url,
        Arc::new(options),
        Arc::new(CacheStore::new()),
        events_tx,
    );
    (shard, events_rx)
}

fn default_options() -> ClientOptions {
    let mut options = ClientOptions::default();
    options.intents = Intents::GUILDS | Intents::GUILD_MESSAGES;
    options
}

/// Wait for a `ShardError` whose message contains `needle`
async fn wait_for_error(events: &mut mpsc::UnboundedReceiver<Event>, needle: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .expect("timed out waiting for the error event");
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Some(Event::ShardError { message, .. })) if message.contains(needle) => return,
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => panic!("no error event containing {needle:?}"),
        }
    }
}

/// Wait for a specific lifecycle event
async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<Event>,
    matcher: impl Fn(&Event) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .expect("timed out waiting for event");
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Some(event)) if matcher(&event) => return,
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => panic!("event stream ended"),
        }
    }
}

// ── S1: Identify ─────────────────────────────────────────────

#[tokio::test]
async fn identify_follows_hello_with_heartbeat() {
    let mut gateway = MockGateway::spawn().await;
    let (shard, _events) = spawn_shard(gateway.url(), default_options());
    shard.connect();

    let mut session = gateway.next_session().await;
    let hello_at = Instant::now();
    session.send_hello(41_250);

    let identify = session.expect_op(2).await;
    assert!(
        hello_at.elapsed() < Duration::from_secs(1),
        "identify must follow HELLO promptly"
    );
    let d = &identify["d"];
    assert_eq!(d["token"], "Bot X");
    assert_eq!(d["intents"], 513);
    assert_eq!(d["large_threshold"], 250);
    assert_eq!(d["compress"], false);
    assert_eq!(d["shard"], json!([0, 1]));
    assert!(d.get("guild_subscriptions").is_none());

    // One heartbeat rides right behind Identify, with a null sequence.
    let heartbeat = session.expect_op(1).await;
    assert!(heartbeat["d"].is_null());

    shard.disconnect();
}

// ── S2: Resume ───────────────────────────────────────────────

#[tokio::test]
async fn resume_after_drop_reuses_session_and_suppresses_heartbeats() {
    let mut gateway = MockGateway::spawn().await;
    let (shard, _events) = spawn_shard(gateway.url(), default_options());
    shard.connect();

    // First connection: identify and observe sequence 42.
    let mut session = gateway.next_session().await;
    session.send_hello(100_000);
    session.expect_op(2).await;
    session.expect_op(1).await;
    session.send_heartbeat_ack();
    session.send_dispatch("READY", 1, MockSession::ready_payload("abc", json!([])));
    session.send_dispatch(
        "TYPING_START",
        42,
        json!({"channel_id": "1", "user_id": "2"}),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Unclean close that keeps the session.
    session.send_close(4000);

    // Second connection resumes immediately.
    let mut session = gateway.next_session().await;
    session.send_hello(150);

    let resume = session.expect_op(6).await;
    assert_eq!(resume["d"]["token"], "Bot X");
    assert_eq!(resume["d"]["session_id"], "abc");
    assert_eq!(resume["d"]["seq"], 42);

    // Several heartbeat intervals pass without a single op 1.
    session.expect_silence(Duration::from_millis(450)).await;

    // RESUMED lifts the suppression.
    session.send_dispatch("RESUMED", 43, json!({}));
    let heartbeat = session.recv_within(Duration::from_secs(2)).await;
    assert_eq!(heartbeat["op"], 1);
    assert_eq!(heartbeat["d"], 43);

    shard.disconnect();
}

// ── S3: Invalid session ──────────────────────────────────────

#[tokio::test]
async fn invalid_session_re_identifies_from_zero() {
    let mut gateway = MockGateway::spawn().await;
    let (shard, _events) = spawn_shard(gateway.url(), default_options());
    shard.connect();

    let mut session = gateway.next_session().await;
    session.send_hello(100_000);
    session.expect_op(2).await;
    session.expect_op(1).await;
    session.send_heartbeat_ack();
    session.send_dispatch("READY", 7, MockSession::ready_payload("abc", json!([])));
    tokio::time::sleep(Duration::from_millis(50)).await;

    session.send(json!({"op": 9, "d": false}));

    // A fresh Identify arrives on the same connection after the random
    // 1-5 s delay; the session and sequence are gone.
    let deadline = Instant::now() + Duration::from_secs(7);
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .expect("no identify after INVALID_SESSION");
        let frame = session.recv_within(remaining).await;
        if frame["op"] == 2 {
            assert_eq!(frame["d"]["token"], "Bot X");
            break;
        }
    }
    assert_eq!(shard.sequence(), 0);
    assert!(shard.session_id().is_none());

    shard.disconnect();
}

// ── Zombie detection ─────────────────────────────────────────

#[tokio::test]
async fn missing_heartbeat_ack_forces_reconnect() {
    let mut gateway = MockGateway::spawn().await;
    let (shard, mut events) = spawn_shard(gateway.url(), default_options());
    shard.connect();

    let mut session = gateway.next_session().await;
    session.send_hello(100);
    session.expect_op(2).await;
    session.expect_op(1).await;
    // Never acknowledge: the next beat declares the connection zombied.

    wait_for_error(&mut events, "acknowledge previous heartbeat").await;

    // The shard reconnects on its own.
    let _second = gateway.next_session().await;
    shard.disconnect();
}

// ── Close 4004 ───────────────────────────────────────────────

#[tokio::test]
async fn authentication_failure_is_terminal() {
    let mut gateway = MockGateway::spawn().await;
    let (shard, mut events) = spawn_shard(gateway.url(), default_options());
    shard.connect();

    let mut session = gateway.next_session().await;
    session.send_hello(100_000);
    session.expect_op(2).await;
    session.send_close(4004);

    wait_for_error(&mut events, "Authentication failed").await;
    wait_for(&mut events, |e| {
        matches!(e, Event::ShardDisconnect { .. })
    })
    .await;

    assert!(shard.session_id().is_none());
    // No further connect attempt.
    gateway.expect_no_session(Duration::from_millis(1_500)).await;
}

// ── Ready gate ───────────────────────────────────────────────

#[tokio::test]
async fn ready_waits_for_unavailable_guilds() {
    let mut gateway = MockGateway::spawn().await;
    let mut options = default_options();
    options.guild_create_timeout_ms = 300;
    let (shard, mut events) = spawn_shard(gateway.url(), options);
    shard.connect();

    let mut session = gateway.next_session().await;
    session.send_hello(100_000);
    session.expect_op(2).await;
    session.expect_op(1).await;
    session.send_heartbeat_ack();

    session.send_dispatch(
        "READY",
        1,
        MockSession::ready_payload(
            "abc",
            json!([
                {"id": "100000000000000001", "unavailable": true},
                {"id": "100000000000000002", "unavailable": true}
            ]),
        ),
    );

    wait_for(&mut events, |e| matches!(e, Event::ShardPreReady { .. })).await;

    // Both guilds arrive; ready follows without waiting for the timer.
    session.send_dispatch(
        "GUILD_CREATE",
        2,
        json!({"id": "100000000000000001", "name": "one"}),
    );
    session.send_dispatch(
        "GUILD_CREATE",
        3,
        json!({"id": "100000000000000002", "name": "two"}),
    );

    wait_for(&mut events, |e| matches!(e, Event::ShardReady { .. })).await;
    shard.disconnect();
}
