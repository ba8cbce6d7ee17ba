//! Shared User-Agent string for all outgoing requests.

/// Product token sent in the User-Agent header.
const PRODUCT: &str = "graph-transfer";

/// Default User-Agent (identifies the tool and its version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (resumable-upload-client)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_contains_crate_version() {
        let ua = default_user_agent();
        assert_eq!(
            Some(env!("CARGO_PKG_VERSION")),
            ua.strip_prefix("graph-transfer/")
                .and_then(|s| s.split(' ').next()),
            "unexpected UA: {ua}"
        );
    }
}
