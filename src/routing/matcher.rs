//! Path matching logic.
//!
//! # Responsibilities
//! - Match the versioned API prefix on a segment boundary
//! - Split the remainder into the service segment and the backend path
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - `/api/v1` never matches `/api/v10/...`
//! - No regex to guarantee O(n) matching

/// A request path split into its routing parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePath<'a> {
    /// Logical backend name, the first segment after the prefix.
    pub service: &'a str,
    /// Everything after the service segment; empty or starting with `/`.
    pub rest: &'a str,
}

/// Matches the gateway's versioned prefix.
#[derive(Debug, Clone)]
pub struct PrefixMatcher {
    prefix: String,
}

impl PrefixMatcher {
    /// Create a new prefix matcher. Trailing slashes are ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Split `path` into service and remainder, or `None` if it is not an
    /// API path or names no service.
    pub fn split<'a>(&self, path: &'a str) -> Option<ServicePath<'a>> {
        let after_prefix = path.strip_prefix(self.prefix.as_str())?;
        let after_slash = after_prefix.strip_prefix('/')?;
        let (service, rest) = match after_slash.find('/') {
            Some(i) => after_slash.split_at(i),
            None => (after_slash, ""),
        };
        if service.is_empty() {
            return None;
        }
        Some(ServicePath { service, rest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_service_and_rest() {
        let m = PrefixMatcher::new("/api/v1");
        assert_eq!(
            m.split("/api/v1/combat/sessions/42"),
            Some(ServicePath { service: "combat", rest: "/sessions/42" })
        );
        assert_eq!(
            m.split("/api/v1/combat"),
            Some(ServicePath { service: "combat", rest: "" })
        );
        assert_eq!(
            m.split("/api/v1/combat/"),
            Some(ServicePath { service: "combat", rest: "/" })
        );
    }

    #[test]
    fn requires_segment_boundary() {
        let m = PrefixMatcher::new("/api/v1/");
        assert_eq!(m.split("/api/v10/combat"), None);
        assert_eq!(m.split("/api/v1"), None);
        assert_eq!(m.split("/api/v1/"), None);
        assert_eq!(m.split("/health"), None);
    }
}
