//! Full-stack client scenario: REST probe, connect queue, identify,
//! ready fan-out, disconnect.

use serde_json::json;

use helselia_client::{Client, ClientOptions, Event, Token};
use integration_tests::mock_api::{CannedResponse, MockApi};
use integration_tests::mock_gateway::{MockGateway, MockSession};

#[tokio::test]
async fn client_resolves_gateway_and_reaches_ready() {
    let mut gateway = MockGateway::spawn().await;
    let probe_body = format!(
        r#"{{
            "url": "{}",
            "shards": 1,
            "session_start_limit": {{
                "total": 1000,
                "remaining": 1000,
                "reset_after": 14400000,
                "max_concurrency": 1
            }}
        }}"#,
        gateway.url()
    );
    let api = MockApi::spawn(vec![CannedResponse::ok(&probe_body)]).await;

    let client =
        Client::with_api_url(Token::bot("X"), ClientOptions::default(), api.url()).unwrap();
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    assert_eq!(client.shards().shard_count(), 1);

    // The queued shard identifies against the mock gateway.
    let mut session = gateway.next_session().await;
    session.send_hello(100_000);
    let identify = session.expect_op(2).await;
    assert_eq!(identify["d"]["token"], "Bot X");
    assert_eq!(identify["d"]["shard"], json!([0, 1]));
    session.expect_op(1).await;
    session.send_heartbeat_ack();

    session.send_dispatch("READY", 1, MockSession::ready_payload("s1", json!([])));

    // Lifecycle events reach subscribers, pre-ready before ready.
    let mut saw_pre_ready = false;
    loop {
        match events.recv().await.expect("event stream") {
            Event::ShardPreReady { shard_id } => {
                assert_eq!(shard_id, 0);
                saw_pre_ready = true;
            }
            Event::ShardReady { shard_id } => {
                assert_eq!(shard_id, 0);
                assert!(saw_pre_ready, "pre-ready must precede ready");
                break;
            }
            _ => {}
        }
    }

    client.disconnect();
}
