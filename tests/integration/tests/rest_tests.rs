//! REST pipeline scenarios against the mock API

use std::time::{Duration, Instant};

use helselia_core::Token;
use helselia_rest::{RequestHandler, RestError};
use integration_tests::mock_api::{CannedResponse, MockApi};

fn handler(api: &MockApi) -> RequestHandler {
    RequestHandler::new(Token::bot("X"), api.url(), Duration::from_secs(15)).unwrap()
}

#[tokio::test]
async fn gateway_probe_sends_bot_token() {
    let api = MockApi::spawn(vec![CannedResponse::ok(
        r#"{
            "url": "wss://gateway.helselia.dev",
            "shards": 3,
            "session_start_limit": {
                "total": 1000,
                "remaining": 998,
                "reset_after": 14400000,
                "max_concurrency": 1
            }
        }"#,
    )])
    .await;

    let info = handler(&api).get_gateway_bot().await.unwrap();
    assert_eq!(info.url, "wss://gateway.helselia.dev");
    assert_eq!(info.shards, 3);
    assert_eq!(info.session_start_limit.remaining, 998);

    let seen = api.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].path, "/gateway/bot");
    assert_eq!(seen[0].authorization.as_deref(), Some("Bot X"));
}

// ── S6: global 429 ───────────────────────────────────────────

#[tokio::test]
async fn global_429_locks_all_routes_and_retries() {
    let api = MockApi::spawn(vec![
        CannedResponse::ratelimited(0.5, true),
        CannedResponse::ok(r#"{"ok": true}"#),
        CannedResponse::ok(r#"{"ok": true}"#),
    ])
    .await;
    let handler = std::sync::Arc::new(handler(&api));

    let started = Instant::now();
    let first = {
        let handler = std::sync::Arc::clone(&handler);
        tokio::spawn(async move {
            handler
                .request(reqwest::Method::GET, "/alpha", None)
                .await
        })
    };

    // A second request on a different route, fired mid-lockout.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second_started = Instant::now();
    let second = handler
        .request(reqwest::Method::GET, "/beta", None)
        .await
        .unwrap();

    let first = first.await.unwrap().unwrap();
    assert_eq!(first["ok"], true);
    assert_eq!(second["ok"], true);

    // The original request waited out the full lockout before retrying.
    assert!(
        started.elapsed() >= Duration::from_millis(450),
        "retry fired before the lockout released"
    );
    // The unrelated route was held by the same lockout.
    assert!(
        second_started.elapsed() >= Duration::from_millis(300),
        "global lockout must gate every route"
    );

    let seen = api.seen();
    assert_eq!(seen.len(), 3, "one 429 plus two successes");
}

#[tokio::test]
async fn route_429_blocks_only_its_bucket() {
    let api = MockApi::spawn(vec![
        CannedResponse::ratelimited(0.3, false),
        CannedResponse::ok(r#"{"done": 1}"#),
    ])
    .await;
    let handler = handler(&api);

    let started = Instant::now();
    let value = handler
        .request(reqwest::Method::GET, "/gamma", None)
        .await
        .unwrap();
    assert_eq!(value["done"], 1);
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(api.seen().len(), 2);
}

// ── Upstream retry ───────────────────────────────────────────

#[tokio::test]
async fn bad_gateway_retries_with_backoff() {
    let api = MockApi::spawn(vec![
        CannedResponse {
            status: 502,
            headers: vec![],
            body: "bad gateway".into(),
        },
        CannedResponse::ok(r#"{"alive": true}"#),
    ])
    .await;
    let handler = handler(&api);

    let started = Instant::now();
    let value = handler
        .request(reqwest::Method::GET, "/delta", None)
        .await
        .unwrap();
    assert_eq!(value["alive"], true);
    assert!(
        started.elapsed() >= Duration::from_millis(400),
        "502 retry must back off"
    );
    assert_eq!(api.seen().len(), 2);
}

#[tokio::test]
async fn persistent_502_exhausts_the_retry_budget() {
    let api = MockApi::spawn(
        (0..4)
            .map(|_| CannedResponse {
                status: 502,
                headers: vec![],
                body: "bad gateway".into(),
            })
            .collect(),
    )
    .await;
    let handler = handler(&api);

    let error = handler
        .request(reqwest::Method::GET, "/epsilon", None)
        .await
        .unwrap_err();
    assert!(matches!(error, RestError::UpstreamUnavailable { .. }));
}

#[tokio::test]
async fn unauthorized_is_surfaced_without_retry() {
    let api = MockApi::spawn(vec![CannedResponse {
        status: 401,
        headers: vec![],
        body: r#"{"message": "401"}"#.into(),
    }])
    .await;
    let handler = handler(&api);

    let error = handler
        .request(reqwest::Method::GET, "/zeta", None)
        .await
        .unwrap_err();
    assert!(matches!(error, RestError::Unauthorized));
    assert_eq!(api.seen().len(), 1);
}
