//! Addressable items - the values the poller samples

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Priority;

/// One value to sample from an external source
///
/// The `read_spec` payload (addressing mode, type, caching hint) is owned by
/// the reader's contract and forwarded verbatim; the scheduler never
/// interprets it. The `id` is immutable once the item enters an active
/// session; `batch_group` membership may change between sessions but not
/// mid-cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressableItem {
    /// Stable identifier, unique within a poll session
    pub id: String,

    /// Scheduling priority
    #[serde(default)]
    pub priority: Priority,

    /// Items sharing a group are always read together, in group-submission
    /// order, before ungrouped items
    #[serde(rename = "batch-group", default)]
    pub batch_group: Option<String>,

    /// Opaque read specification forwarded to the reader
    #[serde(rename = "read-spec")]
    pub read_spec: serde_json::Value,

    /// Last known read result; mutated only by the poller after a completed
    /// cycle
    #[serde(rename = "last-result", default)]
    pub last_result: Option<LastResult>,
}

impl AddressableItem {
    /// Create an item with default priority and no group
    pub fn new(id: impl Into<String>, read_spec: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            priority: Priority::default(),
            batch_group: None,
            read_spec,
            last_result: None,
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the batch group
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.batch_group = Some(group.into());
        self
    }
}

/// Last known result for an item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastResult {
    /// Value as returned by the reader (None on failure)
    pub value: Option<serde_json::Value>,

    /// Whether the read succeeded
    pub success: bool,

    /// Error message on failure
    #[serde(rename = "error-message", default)]
    pub error_message: Option<String>,

    /// When the cycle that produced this result completed
    pub timestamp: DateTime<Utc>,
}
