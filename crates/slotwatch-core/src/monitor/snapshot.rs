//! Per-consulate availability snapshots and edge detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a location is a primary consulate or a satellite VAC.
/// Only main locations are eligible for notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    #[default]
    Main,
    Satellite,
}

/// One observation of a consulate's availability, produced per poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub consulate_id: String,
    pub consulate_name: String,
    pub location_kind: LocationKind,
    pub available_count: u32,
    pub observed_at: DateTime<Utc>,
}

impl SlotSnapshot {
    pub fn has_availability(&self) -> bool {
        self.available_count > 0
    }
}

/// The edge between two consecutive snapshots for the same consulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// 0 -> positive. The only edge that can fire a notification.
    Opened,
    /// positive -> 0.
    Closed,
    /// positive -> different positive. Never a new "becoming available".
    CountChanged,
    Unchanged,
}

impl Transition {
    /// Classify the edge from `previous` (None on the first observation)
    /// to `next`.
    pub fn between(previous: Option<&SlotSnapshot>, next: &SlotSnapshot) -> Transition {
        let prev_count = previous.map(|s| s.available_count).unwrap_or(0);
        match (prev_count, next.available_count) {
            (0, 0) => Transition::Unchanged,
            (0, _) => Transition::Opened,
            (_, 0) => Transition::Closed,
            (a, b) if a == b => Transition::Unchanged,
            _ => Transition::CountChanged,
        }
    }
}
