//! Per-cycle results published to the result consumer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::LastResult;

/// One item's state as of a completed cycle
///
/// `skipped: true` means the item was not read this cycle (priority
/// throttling under load); its `last_result` is whatever the previous cycle
/// left behind. This is distinct from "read and failed", which shows up as
/// `success: false` inside `last_result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    /// Item identifier
    pub id: String,

    /// True when the item was filtered out of this cycle
    #[serde(default)]
    pub skipped: bool,

    /// Last known result (unchanged for skipped items)
    #[serde(rename = "last-result", default)]
    pub last_result: Option<LastResult>,
}

/// Full merged result set for one completed cycle
///
/// Published once per cycle, and once with an empty item list on session
/// start, stop, and breaker trip so consumers never render stale data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleUpdate {
    /// Session that produced this update
    #[serde(rename = "session-id")]
    pub session_id: String,

    /// Cycle ordinal within the session (0 for the start/stop/trip clears)
    pub cycle: u64,

    /// Merged item list; empty on start/stop/trip
    pub items: Vec<ItemResult>,

    /// Shared timestamp for every item read in this cycle
    #[serde(rename = "last-read")]
    pub last_read: DateTime<Utc>,
}

impl CycleUpdate {
    /// An empty update that clears consumer state
    pub fn empty(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            cycle: 0,
            items: Vec::new(),
            last_read: Utc::now(),
        }
    }

    /// True when this update carries no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
