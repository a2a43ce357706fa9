//! PollerHandle - client interface to the poller task

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{PollerRequest, PollerStatus};
use super::metrics::MetricsSnapshot;
use crate::config::PollSettings;
use crate::domain::AddressableItem;

/// Handle for interacting with a running poller task
///
/// Cloneable; all operations are async sends on the control channel and take
/// effect at the next cycle boundary, never mid-cycle.
#[derive(Clone)]
pub struct PollerHandle {
    tx: mpsc::Sender<PollerRequest>,
}

impl PollerHandle {
    pub(crate) fn new(tx: mpsc::Sender<PollerRequest>) -> Self {
        Self { tx }
    }

    /// Start a poll session
    ///
    /// A no-op if a session is already running. The poller publishes an
    /// empty result set before the first real cycle so consumers clear
    /// stale data.
    pub async fn start(&self, interval_ms: u64, context: &str, items: Vec<AddressableItem>) -> Result<()> {
        debug!(interval_ms, %context, items = items.len(), "PollerHandle::start: called");
        self.tx
            .send(PollerRequest::Start {
                interval_ms,
                context: context.to_string(),
                items,
            })
            .await
            .map_err(|_| eyre!("Poller channel closed"))?;

        debug!("PollerHandle::start: sent");
        Ok(())
    }

    /// Stop the active session
    ///
    /// Idempotent: stopping while idle, or twice in a row, is a no-op.
    pub async fn stop(&self) -> Result<()> {
        debug!("PollerHandle::stop: called");
        self.tx
            .send(PollerRequest::Stop)
            .await
            .map_err(|_| eyre!("Poller channel closed"))?;

        debug!("PollerHandle::stop: sent");
        Ok(())
    }

    /// Replace the item snapshot, effective next cycle
    pub async fn update_items(&self, items: Vec<AddressableItem>) -> Result<()> {
        debug!(items = items.len(), "PollerHandle::update_items: called");
        self.tx
            .send(PollerRequest::UpdateItems { items })
            .await
            .map_err(|_| eyre!("Poller channel closed"))?;

        debug!("PollerHandle::update_items: sent");
        Ok(())
    }

    /// Replace runtime settings, effective next cycle
    pub async fn update_settings(&self, settings: PollSettings) -> Result<()> {
        debug!(?settings, "PollerHandle::update_settings: called");
        self.tx
            .send(PollerRequest::UpdateSettings { settings })
            .await
            .map_err(|_| eyre!("Poller channel closed"))?;

        debug!("PollerHandle::update_settings: sent");
        Ok(())
    }

    /// Get the current poller status
    pub async fn status(&self) -> Result<PollerStatus> {
        debug!("PollerHandle::status: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(PollerRequest::GetStatus { reply_tx })
            .await
            .map_err(|_| eyre!("Poller channel closed"))?;

        debug!("PollerHandle::status: waiting for reply");
        reply_rx.await.map_err(|_| eyre!("Poller shutdown before reply"))
    }

    /// Get a metrics snapshot
    pub async fn metrics(&self) -> Result<MetricsSnapshot> {
        debug!("PollerHandle::metrics: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(PollerRequest::GetMetrics { reply_tx })
            .await
            .map_err(|_| eyre!("Poller channel closed"))?;

        debug!("PollerHandle::metrics: waiting for reply");
        reply_rx.await.map_err(|_| eyre!("Poller shutdown before reply"))
    }

    /// Stop any session and shut the poller task down
    pub async fn shutdown(&self) -> Result<()> {
        debug!("PollerHandle::shutdown: called");
        self.tx
            .send(PollerRequest::Shutdown)
            .await
            .map_err(|_| eyre!("Poller channel closed"))?;

        debug!("PollerHandle::shutdown: sent");
        Ok(())
    }
}
