//! Tracking provider record shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Checkpoint, Leg};
use crate::utils::{non_blank, time::parse_timestamp};

/// The provider's record for one tracking number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TrackingRecord {
    /// Provider-internal id, used for deletion
    pub id: String,
    pub tracking_number: String,
    pub courier_code: String,

    /// Provider status, e.g. `transit`, `delivered`, `exception`
    #[serde(default)]
    pub delivery_status: Option<String>,
    #[serde(default)]
    pub substatus: Option<String>,
    #[serde(default)]
    pub latest_event: Option<String>,
    #[serde(default)]
    pub latest_checkpoint_time: Option<String>,
    #[serde(default)]
    pub origin_info: Option<TransitLeg>,
    #[serde(default)]
    pub destination_info: Option<TransitLeg>,
}

/// Scan history reported for one leg.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TransitLeg {
    #[serde(default)]
    pub trackinfo: Option<Vec<ProviderCheckpoint>>,
}

/// One scan as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProviderCheckpoint {
    #[serde(default)]
    pub checkpoint_date: Option<String>,
    #[serde(default)]
    pub tracking_detail: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country_iso2: Option<String>,
    #[serde(default)]
    pub checkpoint_delivery_status: Option<String>,
}

impl TrackingRecord {
    fn leg_entries(&self) -> impl Iterator<Item = (Leg, &ProviderCheckpoint)> {
        let legs = [
            (Leg::Origin, self.origin_info.as_ref()),
            (Leg::Destination, self.destination_info.as_ref()),
        ];
        legs.into_iter().flat_map(|(leg, info)| {
            info.and_then(|i| i.trackinfo.as_deref())
                .unwrap_or_default()
                .iter()
                .map(move |cp| (leg, cp))
        })
    }

    /// Checkpoints from both legs with parseable dates, in reported order.
    ///
    /// Entries without a usable date carry no inactivity signal and are dropped.
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.leg_entries()
            .filter_map(|(leg, cp)| {
                let date = parse_timestamp(cp.checkpoint_date.as_deref()?)?;
                Some(Checkpoint {
                    date,
                    raw_description: cp.tracking_detail.clone().unwrap_or_default(),
                    raw_location: cp.location.clone(),
                    city: cp.city.clone(),
                    state: cp.state.clone(),
                    country: cp.country_iso2.clone(),
                    raw_status: cp.checkpoint_delivery_status.clone(),
                    carrier: self.courier_code.clone(),
                    leg,
                })
            })
            .collect()
    }

    /// Latest scan time across both legs.
    pub fn last_checkpoint_at(&self) -> Option<DateTime<Utc>> {
        self.checkpoints().iter().map(Checkpoint::date_utc).max()
    }

    /// Free text the status rules inspect: the latest event, then every scan.
    pub fn event_texts(&self) -> Vec<&str> {
        let mut texts: Vec<&str> = non_blank(self.latest_event.as_deref()).into_iter().collect();
        texts.extend(
            self.leg_entries()
                .filter_map(|(_, cp)| non_blank(cp.tracking_detail.as_deref())),
        );
        texts
    }

    /// Scan-level statuses across both legs.
    pub fn checkpoint_statuses(&self) -> Vec<&str> {
        self.leg_entries()
            .filter_map(|(_, cp)| non_blank(cp.checkpoint_delivery_status.as_deref()))
            .collect()
    }
}
