//! Client-level errors

/// Errors surfaced by the client façade
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Invalid configuration
    #[error(transparent)]
    Options(#[from] helselia_common::OptionsError),

    /// REST pipeline failure (includes the gateway probe)
    #[error(transparent)]
    Rest(#[from] helselia_rest::RestError),

    /// Gateway failure surfaced through the façade
    #[error(transparent)]
    Gateway(#[from] helselia_gateway::GatewayError),

    /// Voice join/switch failure
    #[error(transparent)]
    Voice(#[from] helselia_voice::VoiceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_sources_transparent() {
        let error: ClientError = helselia_voice::VoiceError::Timeout.into();
        assert_eq!(error.to_string(), "voice connection timeout");
    }
}
