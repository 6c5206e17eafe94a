//! Minimal scripted HTTP/1.1 server for REST pipeline tests
//!
//! Serves canned responses in order and records each request line plus
//! its `Authorization` header. One response per connection
//! (`Connection: close`), which is all the pipeline needs.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// One scripted response
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CannedResponse {
    /// 200 with a JSON body
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            headers: vec![],
            body: body.to_string(),
        }
    }

    /// 429 with ratelimit fields in the body
    pub fn ratelimited(retry_after_secs: f64, global: bool) -> Self {
        Self {
            status: 429,
            headers: vec![(
                "x-ratelimit-reset-after".to_string(),
                retry_after_secs.to_string(),
            )],
            body: format!(r#"{{"retry_after": {retry_after_secs}, "global": {global}}}"#),
        }
    }
}

/// A recorded request
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

/// Scripted HTTP server on a loopback port
pub struct MockApi {
    addr: SocketAddr,
    responses: Arc<Mutex<VecDeque<CannedResponse>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockApi {
    /// Bind and start serving the scripted responses
    pub async fn spawn(script: Vec<CannedResponse>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind mock api");
        let addr = listener.local_addr().expect("local addr");
        let responses = Arc::new(Mutex::new(script.into_iter().collect::<VecDeque<_>>()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let responses_task = Arc::clone(&responses);
        let seen_task = Arc::clone(&seen);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let responses = Arc::clone(&responses_task);
                let seen = Arc::clone(&seen_task);
                tokio::spawn(async move {
                    let mut buffer = Vec::with_capacity(2048);
                    let mut chunk = [0u8; 1024];
                    // Read until the header terminator; bodies are
                    // ignored (the pipeline under test only GETs here).
                    loop {
                        let Ok(n) = stream.read(&mut chunk).await else {
                            return;
                        };
                        if n == 0 {
                            return;
                        }
                        buffer.extend_from_slice(&chunk[..n]);
                        if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }

                    let head = String::from_utf8_lossy(&buffer);
                    let mut lines = head.lines();
                    let request_line = lines.next().unwrap_or_default();
                    let mut parts = request_line.split_whitespace();
                    let method = parts.next().unwrap_or_default().to_string();
                    let path = parts.next().unwrap_or_default().to_string();
                    let authorization = lines
                        .filter_map(|l| l.split_once(": "))
                        .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
                        .map(|(_, value)| value.to_string());
                    seen.lock().expect("seen poisoned").push(SeenRequest {
                        method,
                        path,
                        authorization,
                    });

                    let response = responses
                        .lock()
                        .expect("responses poisoned")
                        .pop_front()
                        .unwrap_or_else(|| CannedResponse::ok("{}"));

                    let mut raw = format!(
                        "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n",
                        response.status,
                        response.body.len()
                    );
                    for (name, value) in &response.headers {
                        raw.push_str(&format!("{name}: {value}\r\n"));
                    }
                    raw.push_str("\r\n");
                    raw.push_str(&response.body);

                    let _ = stream.write_all(raw.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            addr,
            responses,
            seen,
        }
    }

    /// Base URL for the request handler
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests observed so far
    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().expect("seen poisoned").clone()
    }

    /// Responses not yet served
    pub fn remaining(&self) -> usize {
        self.responses.lock().expect("responses poisoned").len()
    }
}
