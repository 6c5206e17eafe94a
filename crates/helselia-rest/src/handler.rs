//! HTTP request pipeline
//!
//! Each request flows through a [`SequentialBucket`] keyed by method +
//! canonical route. Response `x-ratelimit-*` headers feed the bucket's
//! window; HTTP 429 with `global` set arms a process-wide lockout that
//! every route waits on before sending.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use reqwest::{Method, Response, StatusCode};
use serde_json::Value;

use helselia_common::{RateInfo, SequentialBucket};
use helselia_core::Token;

use crate::error::RestError;
use crate::gateway_info::GatewayInfo;
use crate::routes::canonical_route;
use crate::RestResult;

/// Retries for 502/504 before giving up
const MAX_UPSTREAM_RETRIES: u32 = 3;

/// Base delay for the upstream retry backoff
const UPSTREAM_BACKOFF: Duration = Duration::from_millis(500);

/// What one wire attempt produced
enum Attempt {
    Done(Value),
    /// 429: wait (handled via bucket/global state), then resend
    Ratelimited,
    /// 502/504: transient upstream failure
    Upstream(u16),
}

/// Routed, ratelimit-aware HTTP pipeline
pub struct RequestHandler {
    http: reqwest::Client,
    token: Token,
    base_url: String,
    buckets: DashMap<String, Arc<SequentialBucket>>,
    /// Until when every route must hold off; set by global 429s
    global_lockout: Mutex<Option<Instant>>,
}

impl RequestHandler {
    /// Create a handler for the given API base URL (versioned prefix
    /// included, no trailing slash).
    pub fn new(token: Token, base_url: impl Into<String>, request_timeout: Duration) -> RestResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            token,
            base_url: base_url.into(),
            buckets: DashMap::new(),
            global_lockout: Mutex::new(None),
        })
    }

    /// Fetch the gateway URL, recommended shards, and identify budget
    pub async fn get_gateway_bot(&self) -> RestResult<GatewayInfo> {
        let value = self.request(Method::GET, "/gateway/bot", None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Perform a JSON request through the route's sequential bucket
    ///
    /// Retries automatically on 429 (after the honored wait) and on
    /// 502/504 (bounded exponential backoff).
    pub async fn request(
        &self,
        method: Method,
        route: &str,
        body: Option<&Value>,
    ) -> RestResult<Value> {
        let key = format!("{method} {}", canonical_route(route));
        let bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| Arc::new(SequentialBucket::new()))
            .clone();

        let mut upstream_attempts = 0u32;
        loop {
            let outcome = bucket
                .run(|| async {
                    self.wait_global().await;
                    match self.attempt(method.clone(), route, body).await {
                        Ok((attempt, info)) => (Ok(attempt), info),
                        Err(e) => (Err(e), RateInfo::default()),
                    }
                })
                .await;

            match outcome? {
                Attempt::Done(value) => return Ok(value),
                Attempt::Ratelimited => {
                    // The wait itself lives in the bucket window or the
                    // global lockout; looping resends afterwards.
                    tracing::debug!(route = %route, "Ratelimited, requeueing request");
                }
                Attempt::Upstream(status) => {
                    upstream_attempts += 1;
                    if upstream_attempts >= MAX_UPSTREAM_RETRIES {
                        return Err(RestError::UpstreamUnavailable {
                            status,
                            attempts: upstream_attempts,
                        });
                    }
                    let wait = UPSTREAM_BACKOFF * 2u32.pow(upstream_attempts - 1);
                    tracing::warn!(
                        status = status,
                        attempt = upstream_attempts,
                        wait_ms = wait.as_millis() as u64,
                        "Upstream error, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// One wire round-trip; classifies the response and reports the
    /// route window it observed.
    async fn attempt(
        &self,
        method: Method,
        route: &str,
        body: Option<&Value>,
    ) -> RestResult<(Attempt, RateInfo)> {
        let url = format!("{}{route}", self.base_url);
        let mut request = self
            .http
            .request(method, &url)
            .header("Authorization", self.token.expose());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let info = rate_info_from_headers(&response);

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok((self.handle_ratelimit(response, info).await?, RateInfo::default()));
        }
        if status == StatusCode::BAD_GATEWAY || status == StatusCode::GATEWAY_TIMEOUT {
            return Ok((Attempt::Upstream(status.as_u16()), info));
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(RestError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let value = if status == StatusCode::NO_CONTENT {
            Value::Null
        } else {
            response.json().await?
        };
        Ok((Attempt::Done(value), info))
    }

    /// Classify a 429: global lockout vs route window exhaustion
    async fn handle_ratelimit(
        &self,
        response: Response,
        header_info: RateInfo,
    ) -> RestResult<Attempt> {
        #[derive(serde::Deserialize)]
        struct RatelimitBody {
            #[serde(default)]
            retry_after: f64,
            #[serde(default)]
            global: bool,
        }

        let body: RatelimitBody = response.json().await.unwrap_or(RatelimitBody {
            retry_after: 1.0,
            global: false,
        });
        let retry_after = Duration::from_secs_f64(body.retry_after.max(0.0));

        if body.global {
            let until = Instant::now() + retry_after;
            let mut lockout = self.global_lockout.lock().expect("lockout poisoned");
            // Never shorten an existing lockout.
            if lockout.map_or(true, |existing| until > existing) {
                *lockout = Some(until);
            }
            tracing::warn!(
                retry_after_ms = retry_after.as_millis() as u64,
                "Global ratelimit hit, locking all routes"
            );
        } else {
            tracing::debug!(
                retry_after_ms = retry_after.as_millis() as u64,
                "Route ratelimit hit"
            );
            // Route-level: exhaust the bucket window until retry_after.
            self.sleep_route(retry_after, header_info).await;
        }

        Ok(Attempt::Ratelimited)
    }

    /// Wait out a route-level 429 inside the bucket's serial section, so
    /// queued requests behind this one cannot jump the window.
    async fn sleep_route(&self, retry_after: Duration, header_info: RateInfo) {
        let wait = header_info
            .reset_at
            .and_then(|at| at.checked_duration_since(Instant::now()))
            .unwrap_or(retry_after);
        tokio::time::sleep(wait).await;
    }

    /// Block while the global lockout is armed
    async fn wait_global(&self) {
        loop {
            let until = *self.global_lockout.lock().expect("lockout poisoned");
            match until {
                Some(until) if until > Instant::now() => {
                    tokio::time::sleep_until(until.into()).await;
                }
                Some(_) => {
                    *self.global_lockout.lock().expect("lockout poisoned") = None;
                    return;
                }
                None => return,
            }
        }
    }

    /// Number of live route buckets (observability)
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("base_url", &self.base_url)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

/// Translate `x-ratelimit-*` headers into a bucket window
///
/// `x-ratelimit-reset-after` is preferred; otherwise the absolute
/// `x-ratelimit-reset` epoch is mapped through the local clock.
fn rate_info_from_headers(response: &Response) -> RateInfo {
    let headers = response.headers();
    let get_f64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
    };

    let limit = get_f64("x-ratelimit-limit").map(|v| v as u32);
    let remaining = get_f64("x-ratelimit-remaining").map(|v| v as u32);

    let reset_at = if let Some(after) = get_f64("x-ratelimit-reset-after") {
        Some(Instant::now() + Duration::from_secs_f64(after.max(0.0)))
    } else {
        get_f64("x-ratelimit-reset").and_then(|epoch| {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64();
            let offset = epoch - now;
            (offset > 0.0).then(|| Instant::now() + Duration::from_secs_f64(offset))
        })
    };

    RateInfo {
        limit,
        remaining,
        reset_at,
    }
}
