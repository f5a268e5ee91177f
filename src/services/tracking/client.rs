//! Create-or-fetch lookup with carrier-mismatch repair.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::ProviderError;
use crate::models::TrackingRecord;
use crate::services::tracking::api::{ApiReply, CODE_ALREADY_EXISTS, CODE_NOT_FOUND, TrackingApi};
use crate::utils::TtlCache;

/// Cache key: tracking number and carrier code.
pub type LookupKey = (String, String);

/// Shared read-through cache of successful lookups.
pub type TrackingCache = TtlCache<LookupKey, TrackingRecord>;

/// Terminal state of one lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    /// Already registered under the requested carrier
    FetchedExisting(TrackingRecord),
    /// Newly registered through the paid endpoint
    CreatedNew(TrackingRecord),
    /// A stale registration under another carrier was removed and replaced
    MismatchRepaired {
        tracking: TrackingRecord,
        stale_carrier: String,
    },
    Failed(ProviderError),
}

impl LookupOutcome {
    pub fn tracking(&self) -> Option<&TrackingRecord> {
        match self {
            Self::FetchedExisting(t) | Self::CreatedNew(t) => Some(t),
            Self::MismatchRepaired { tracking, .. } => Some(tracking),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ProviderError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::FetchedExisting(_) => "fetched_existing",
            Self::CreatedNew(_) => "created_new",
            Self::MismatchRepaired { .. } => "mismatch_repaired",
            Self::Failed(_) => "failed",
        }
    }
}

/// A lookup outcome plus the number of paid calls it made.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub outcome: LookupOutcome,
    pub paid_calls: u32,
    pub from_cache: bool,
}

impl Lookup {
    pub fn paid_calls(&self) -> u32 {
        self.paid_calls
    }
}

/// Flat `{success, tracking, error}` view for collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct LookupResult {
    pub success: bool,
    pub tracking: Option<TrackingRecord>,
    pub error: Option<String>,
}

impl From<LookupOutcome> for LookupResult {
    fn from(outcome: LookupOutcome) -> Self {
        match outcome {
            LookupOutcome::Failed(e) => Self {
                success: false,
                tracking: None,
                error: Some(e.to_string()),
            },
            LookupOutcome::FetchedExisting(t)
            | LookupOutcome::CreatedNew(t)
            | LookupOutcome::MismatchRepaired { tracking: t, .. } => Self {
                success: true,
                tracking: Some(t),
                error: None,
            },
        }
    }
}

/// Tracking provider client.
pub struct TrackingClient<A> {
    api: A,
    deadline: Duration,
    cache: Arc<TrackingCache>,
}

impl<A: TrackingApi> TrackingClient<A> {
    pub fn new(api: A, deadline: Duration, cache: Arc<TrackingCache>) -> Self {
        Self {
            api,
            deadline,
            cache,
        }
    }

    pub fn cache(&self) -> &TrackingCache {
        &self.cache
    }

    /// Return the provider's record, registering it if needed.
    pub async fn lookup(&self, tracking_number: &str, courier_code: &str) -> Lookup {
        let key = (tracking_number.to_string(), courier_code.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return Lookup {
                outcome: LookupOutcome::FetchedExisting(hit),
                paid_calls: 0,
                from_cache: true,
            };
        }

        let mut paid_calls = 0;
        let outcome = self
            .resolve(tracking_number, courier_code, &mut paid_calls)
            .await;

        match &outcome {
            LookupOutcome::Failed(e) => {
                log::warn!(
                    "Lookup failed for {} ({}): {}",
                    tracking_number,
                    courier_code,
                    e
                );
            }
            ok => {
                if let Some(tracking) = ok.tracking() {
                    self.cache.insert(key, tracking.clone());
                }
                log::debug!("Lookup {} for {}", ok.label(), tracking_number);
            }
        }

        Lookup {
            outcome,
            paid_calls,
            from_cache: false,
        }
    }

    async fn resolve(&self, number: &str, code: &str, paid_calls: &mut u32) -> LookupOutcome {
        match self.guard("get", self.api.get_existing(number, Some(code))).await {
            Ok(ApiReply::Ok(records)) => {
                if let Some(found) = pick(records, code) {
                    return LookupOutcome::FetchedExisting(found);
                }
            }
            Ok(reply) if reply.is_code(CODE_NOT_FOUND) => {}
            Ok(ApiReply::Business { code, message }) => {
                return LookupOutcome::Failed(ProviderError::Business { code, message });
            }
            Err(e) => return LookupOutcome::Failed(e),
        }

        *paid_calls += 1;
        match self.guard("create", self.api.create_realtime(number, code)).await {
            Ok(ApiReply::Ok(record)) => LookupOutcome::CreatedNew(record),
            Ok(reply) if reply.is_code(CODE_ALREADY_EXISTS) => {
                self.repair(number, code, paid_calls).await
            }
            Ok(ApiReply::Business { code, message }) => {
                LookupOutcome::Failed(ProviderError::Business { code, message })
            }
            Err(e) => LookupOutcome::Failed(e),
        }
    }

    /// The number is registered, but not under `code`: drop the stale
    /// binding and create once more.
    async fn repair(&self, number: &str, code: &str, paid_calls: &mut u32) -> LookupOutcome {
        let records = match self.guard("get", self.api.get_existing(number, None)).await {
            Ok(ApiReply::Ok(records)) => records,
            Ok(ApiReply::Business { code, message }) => {
                return LookupOutcome::Failed(ProviderError::Business { code, message });
            }
            Err(e) => return LookupOutcome::Failed(e),
        };

        if let Some(same) = records
            .iter()
            .find(|r| r.courier_code.eq_ignore_ascii_case(code))
        {
            return LookupOutcome::FetchedExisting(same.clone());
        }

        let Some(stale) = records.into_iter().next() else {
            return LookupOutcome::Failed(ProviderError::Business {
                code: CODE_ALREADY_EXISTS,
                message: format!("{number} reported as registered but no record was returned"),
            });
        };

        log::info!(
            "Repairing carrier binding for {}: {} -> {}",
            number,
            stale.courier_code,
            code
        );
        match self.guard("delete", self.api.delete(&stale.id)).await {
            Ok(ApiReply::Ok(())) => {}
            Ok(reply) if reply.is_code(CODE_NOT_FOUND) => {}
            Ok(ApiReply::Business { code, message }) => {
                return LookupOutcome::Failed(ProviderError::Business { code, message });
            }
            Err(e) => return LookupOutcome::Failed(e),
        }

        *paid_calls += 1;
        match self.guard("create", self.api.create_realtime(number, code)).await {
            Ok(ApiReply::Ok(tracking)) => LookupOutcome::MismatchRepaired {
                tracking,
                stale_carrier: stale.courier_code,
            },
            Ok(ApiReply::Business { code, message }) => {
                LookupOutcome::Failed(ProviderError::Business { code, message })
            }
            Err(e) => LookupOutcome::Failed(e),
        }
    }

    async fn guard<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                operation: operation.to_string(),
                secs: self.deadline.as_secs(),
            }),
        }
    }
}

fn pick(records: Vec<TrackingRecord>, code: &str) -> Option<TrackingRecord> {
    records
        .into_iter()
        .find(|r| r.courier_code.eq_ignore_ascii_case(code))
}
