//! Message types for the poller task

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::metrics::MetricsSnapshot;
use crate::config::PollSettings;
use crate::domain::AddressableItem;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerState {
    /// No active session
    Idle,
    /// Session loop is cycling
    Running,
    /// Stop observed, winding down
    Stopping,
}

impl std::fmt::Display for PollerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Observable poller status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerStatus {
    /// Current state
    pub state: PollerState,

    /// Active session id, if any
    #[serde(rename = "session-id")]
    pub session_id: Option<String>,

    /// Current consecutive-failure streak
    #[serde(rename = "consecutive-failures")]
    pub consecutive_failures: u32,

    /// Total cycle failures this session; reset on start
    #[serde(rename = "total-errors")]
    pub total_errors: u64,

    /// Most recent cycle error message
    #[serde(rename = "last-error")]
    pub last_error: Option<String>,
}

/// Requests to the poller task
#[derive(Debug)]
pub enum PollerRequest {
    /// Start a poll session; a no-op if one is already running
    Start {
        interval_ms: u64,
        /// Opaque target token forwarded to the reader
        context: String,
        items: Vec<AddressableItem>,
    },

    /// Stop the active session; idempotent
    Stop,

    /// Replace the item snapshot, effective at the next cycle
    UpdateItems { items: Vec<AddressableItem> },

    /// Replace runtime settings, effective at the next cycle
    UpdateSettings { settings: PollSettings },

    /// Get current status
    GetStatus { reply_tx: oneshot::Sender<PollerStatus> },

    /// Get a metrics snapshot
    GetMetrics {
        reply_tx: oneshot::Sender<MetricsSnapshot>,
    },

    /// Stop any session and exit the poller task
    Shutdown,
}
