//! REST pipeline errors

/// Errors produced by the request pipeline
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// Transport-level failure (DNS, TLS, connect, body read)
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the expected JSON shape
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Token rejected by the API
    #[error("Authentication failed (HTTP 401)")]
    Unauthorized,

    /// Non-success status after retries were exhausted
    #[error("HTTP {status}: {body}")]
    BadStatus {
        status: u16,
        body: String,
    },

    /// 502/504 persisted past the retry budget
    #[error("Upstream unavailable after {attempts} attempts (HTTP {status})")]
    UpstreamUnavailable { status: u16, attempts: u32 },
}

impl RestError {
    /// Whether the request may be retried by a caller-level policy
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::UpstreamUnavailable { .. })
    }
}
