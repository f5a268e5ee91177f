//! Carrier code resolution.
//!
//! Maps a free-text carrier name, or failing that the shape of a tracking
//! number, onto the provider's canonical carrier code.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{CarrierMapping, Config};
use crate::utils::normalize_text;

/// How a carrier code was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Name,
    TrackingNumber,
}

/// A resolved carrier code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub code: String,
    pub by: ResolvedBy,
}

// Most specific shapes first; the bare digit-length rules overlap between
// carriers and must stay last.
const NUMBER_RULES: &[(&str, &str)] = &[
    (r"^1Z[0-9A-Z]{16}$", "ups"),
    (r"^[A-Z]{2}\d{9}US$", "usps"),
    (r"^[A-Z]{2}\d{9}CA$", "canada-post"),
    (r"^[A-Z]{2}\d{9}GB$", "royal-mail"),
    (r"^[A-Z]{2}\d{9}AU$", "australia-post"),
    (r"^[A-Z]{2}\d{9}CN$", "china-post"),
    (r"^JJD\d{18}$", "dhl"),
    (r"^JD\d{18}$", "dhl"),
    (r"^GM\d{16,18}$", "dhlglobalmail"),
    (r"^LX\d{8}$", "lasership"),
    (r"^C\d{14}$", "ontrac"),
    (r"^420\d{5}9[1-5]\d{20}$", "usps"),
    (r"^9[1-5]\d{20}$", "usps"),
    (r"^T\d{10}$", "ups"),
    (r"^\d{12}$|^\d{15}$", "fedex"),
    (r"^\d{10}$", "dhl"),
];

static NUMBER_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    NUMBER_RULES
        .iter()
        .filter_map(|(pattern, code)| Regex::new(pattern).ok().map(|re| (re, *code)))
        .collect()
});

/// Service for resolving carrier codes.
#[derive(Debug, Clone)]
pub struct CarrierResolver {
    table: Vec<CarrierMapping>,
}

impl CarrierResolver {
    /// Create a resolver over an ordered name table.
    pub fn new(table: Vec<CarrierMapping>) -> Self {
        let table = table
            .into_iter()
            .map(|m| CarrierMapping {
                pattern: normalize_text(&m.pattern),
                code: m.code.trim().to_string(),
            })
            .filter(|m| !m.pattern.is_empty() && !m.code.is_empty())
            .collect();
        Self { table }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.carriers.clone())
    }

    /// Resolve a code from the carrier name, then from the tracking number.
    ///
    /// `None` means the shipment cannot be tracked and should be skipped.
    pub fn resolve(&self, carrier: Option<&str>, tracking_number: Option<&str>) -> Option<Resolution> {
        if let Some(code) = carrier.and_then(|name| self.resolve_name(name)) {
            return Some(Resolution {
                code: code.to_string(),
                by: ResolvedBy::Name,
            });
        }
        tracking_number
            .and_then(Self::resolve_number)
            .map(|code| Resolution {
                code: code.to_string(),
                by: ResolvedBy::TrackingNumber,
            })
    }

    /// First table entry whose fragment occurs in the normalized name.
    pub fn resolve_name(&self, name: &str) -> Option<&str> {
        let name = normalize_text(name);
        if name.is_empty() {
            return None;
        }
        self.table
            .iter()
            .find(|m| name.contains(&m.pattern))
            .map(|m| m.code.as_str())
    }

    /// First tracking-number shape the number matches.
    pub fn resolve_number(tracking_number: &str) -> Option<&'static str> {
        let compact: String = tracking_number
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect::<String>()
            .to_ascii_uppercase();
        if compact.is_empty() {
            return None;
        }
        NUMBER_PATTERNS
            .iter()
            .find(|(re, _)| re.is_match(&compact))
            .map(|(_, code)| *code)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for CarrierResolver {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
