//! Utility functions and helpers.

pub mod cache;
pub mod hash;
pub mod http;
pub mod time;

pub use cache::TtlCache;

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, trimmed, whitespace-collapsed form used for matching and hashing.
pub fn normalize_text(s: &str) -> String {
    collapse_whitespace(s).to_lowercase()
}

/// Return `Some(trimmed)` only for non-blank input.
pub fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \t b\n\nc  "), "a b c");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text(" Arrived  at FACILITY "), "arrived at facility");
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  x ")), Some("x"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
