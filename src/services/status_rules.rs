//! Terminal-status detection over provider records.
//!
//! Rules are evaluated in order and the first match wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::TrackingRecord;

/// Terminal outcome a rule can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    Delivered,
    Returned,
}

/// Which rule fired, for the result's reason text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    pub outcome: TerminalOutcome,
    pub rule: &'static str,
}

enum Predicate {
    /// Record- or scan-level status equals one of these
    Status(&'static [&'static str]),
    /// Any event text matches, after negated phrases are removed
    Text(&'static LazyLock<Option<Regex>>),
}

struct StatusRule {
    name: &'static str,
    predicate: Predicate,
    outcome: TerminalOutcome,
}

static NEGATED_DELIVERY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:undelivered|undeliverable|not\s+(?:yet\s+|been\s+)?delivered|(?:to|will|could|cannot|can't|couldn't|can\s+not|not)\s+be\s+delivered)\b",
    )
    .ok()
});

static DELIVERED_TEXT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bdelivered\b").ok());

static DELIVERY_SYNONYMS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:livr[ée]e?|zugestellt|entregad[oa]|consegnat[oa]|bezorgd|signed\s+for\s+by|proof\s+of\s+delivery|picked\s+up\s+by\s+(?:recipient|consignee)|collected\s+by\s+(?:the\s+)?(?:recipient|customer|addressee))\b",
    )
    .ok()
});

static RETURNED_TEXT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:return(?:ed|ing)?\s+to\s+(?:the\s+)?(?:sender|shipper|origin)|being\s+returned|rts)\b",
    )
    .ok()
});

const DELIVERED_STATUSES: &[&str] = &["delivered"];
const RETURNED_STATUSES: &[&str] = &["returned", "return_to_sender", "returning"];

/// Ordered (predicate, outcome) rules.
pub struct StatusRules {
    rules: Vec<StatusRule>,
}

impl StatusRules {
    /// Evaluate the rules against a record; `None` means still in flight.
    pub fn evaluate(&self, tracking: &TrackingRecord) -> Option<RuleMatch> {
        let statuses = record_statuses(tracking);
        let texts: Vec<String> = tracking
            .event_texts()
            .into_iter()
            .map(strip_negations)
            .collect();

        self.rules.iter().find_map(|rule| {
            let hit = match &rule.predicate {
                Predicate::Status(wanted) => statuses
                    .iter()
                    .any(|s| wanted.iter().any(|w| s.eq_ignore_ascii_case(w))),
                Predicate::Text(re) => Option::<Regex>::as_ref(re)
                    .is_some_and(|re| texts.iter().any(|t| re.is_match(t))),
            };
            hit.then_some(RuleMatch {
                outcome: rule.outcome,
                rule: rule.name,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for StatusRules {
    fn default() -> Self {
        let rule = |name, predicate, outcome| StatusRule {
            name,
            predicate,
            outcome,
        };
        Self {
            rules: vec![
                rule(
                    "delivered status",
                    Predicate::Status(DELIVERED_STATUSES),
                    TerminalOutcome::Delivered,
                ),
                rule(
                    "delivered event text",
                    Predicate::Text(&DELIVERED_TEXT),
                    TerminalOutcome::Delivered,
                ),
                rule(
                    "carrier delivery wording",
                    Predicate::Text(&DELIVERY_SYNONYMS),
                    TerminalOutcome::Delivered,
                ),
                rule(
                    "returned status",
                    Predicate::Status(RETURNED_STATUSES),
                    TerminalOutcome::Returned,
                ),
                rule(
                    "returned event text",
                    Predicate::Text(&RETURNED_TEXT),
                    TerminalOutcome::Returned,
                ),
            ],
        }
    }
}

fn record_statuses(tracking: &TrackingRecord) -> Vec<&str> {
    let mut statuses: Vec<&str> = [
        tracking.delivery_status.as_deref(),
        tracking.substatus.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .collect();
    statuses.extend(tracking.checkpoint_statuses());
    statuses
}

fn strip_negations(text: &str) -> String {
    match Option::<Regex>::as_ref(&NEGATED_DELIVERY) {
        Some(re) => re.replace_all(text, " ").into_owned(),
        None => text.to_string(),
    }
}
