//! Route canonicalization
//!
//! Ratelimit buckets are keyed by method + canonical route: snowflake path
//! parameters are stripped, except the major parameters (guild, channel,
//! webhook ids) which select distinct buckets server-side.

/// Path prefixes whose following id is a major parameter
const MAJOR_SEGMENTS: &[&str] = &["guilds", "channels", "webhooks"];

/// Reduce a concrete path to its bucket-canonical form
///
/// `/guilds/123/members/456` becomes `/guilds/123/members/:id`.
#[must_use]
pub fn canonical_route(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous = "";

    for segment in path.split('/') {
        if !out.is_empty() || path.starts_with('/') {
            out.push('/');
        }
        if is_snowflake(segment) && !MAJOR_SEGMENTS.contains(&previous) {
            out.push_str(":id");
        } else {
            out.push_str(segment);
        }
        previous = segment;
    }

    // Collapse the leading double slash produced by a rooted path.
    if let Some(stripped) = out.strip_prefix("//") {
        return format!("/{stripped}");
    }
    out
}

fn is_snowflake(segment: &str) -> bool {
    segment.len() >= 15 && segment.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_ids_retained() {
        assert_eq!(
            canonical_route("/guilds/175928847299117063"),
            "/guilds/175928847299117063"
        );
        assert_eq!(
            canonical_route("/channels/175928847299117063/messages"),
            "/channels/175928847299117063/messages"
        );
        assert_eq!(
            canonical_route("/webhooks/175928847299117063/token123"),
            "/webhooks/175928847299117063/token123"
        );
    }

    #[test]
    fn test_minor_ids_stripped() {
        assert_eq!(
            canonical_route("/channels/175928847299117063/messages/298312883932872704"),
            "/channels/175928847299117063/messages/:id"
        );
        assert_eq!(
            canonical_route("/guilds/175928847299117063/members/298312883932872704"),
            "/guilds/175928847299117063/members/:id"
        );
    }

    #[test]
    fn test_short_numbers_left_alone() {
        // API version segments and similar short numerics are not ids.
        assert_eq!(canonical_route("/v6/gateway/bot"), "/v6/gateway/bot");
    }

    #[test]
    fn test_same_route_different_minor_ids_share_key() {
        let a = canonical_route("/channels/175928847299117063/messages/111111111111111111");
        let b = canonical_route("/channels/175928847299117063/messages/222222222222222222");
        assert_eq!(a, b);
    }
}
