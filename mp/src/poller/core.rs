//! Poller task - session lifecycle, cycle loop, result merging
//!
//! One long-lived task owns the entire session state; callers interact only
//! through [`PollerHandle`](super::handle::PollerHandle) messages, which are
//! observed at cycle boundaries and during sleeps. Cycles are strictly
//! sequential: the overlap guard keeps a slow reader from ever seeing two
//! concurrent batch calls, and a cycle's merged results are published only
//! after all of its batches complete.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::batch::{self, CyclePlan};
use super::breaker::CircuitBreaker;
use super::config::PollerConfig;
use super::handle::PollerHandle;
use super::load::LoadEstimator;
use super::messages::{PollerRequest, PollerState, PollerStatus};
use super::metrics::{CycleMetrics, MetricsAggregator};
use crate::config::PollSettings;
use crate::domain::{AddressableItem, CycleUpdate, ItemResult, LastResult};
use crate::reader::{ReadContext, ReadResult, ReaderError, ValueReader};

/// Floor for the overlap-guard retry sleep
const MIN_SKIP_SLEEP: Duration = Duration::from_millis(16);
/// Fraction of the interval that must elapse between cycle starts
const MIN_SPACING_FRACTION: f64 = 0.8;

/// Cycle-level failures
#[derive(Debug, Error)]
pub enum PollError {
    /// The reader rejected an entire batch
    #[error(transparent)]
    Reader(#[from] ReaderError),

    /// The reader echoed an id the cycle never submitted
    #[error("Reader returned result for unknown id '{0}'")]
    UnknownId(String),
}

/// Everything a finished cycle hands back to the session loop
struct CycleOutcome {
    results: Result<HashMap<String, ReadResult>, PollError>,
    duration: Duration,
    batch_count: usize,
    item_count: usize,
    skipped: Vec<String>,
}

/// State for one start..stop invocation
struct Session {
    id: String,
    context: String,
    items: Vec<AddressableItem>,
    cycle: u64,
    last_cycle_start: Option<Instant>,
    /// A cycle that outlived its interval; harvested or discarded later
    in_flight: Option<JoinHandle<CycleOutcome>>,
}

/// The Poller runs poll sessions against an external reader
///
/// Construct, take a [`PollerHandle`] via [`Poller::handle`], then consume
/// the poller with `tokio::spawn(poller.run())`.
pub struct Poller {
    config: PollerConfig,
    reader: Arc<dyn ValueReader>,
    tx: mpsc::Sender<PollerRequest>,
    rx: mpsc::Receiver<PollerRequest>,
    results_tx: mpsc::Sender<CycleUpdate>,

    state: PollerState,
    settings: PollSettings,
    session: Option<Session>,
    /// Control mutations queued until the next cycle boundary
    pending_items: Option<Vec<AddressableItem>>,
    pending_settings: Option<PollSettings>,
    breaker: CircuitBreaker,
    load: LoadEstimator,
    metrics: MetricsAggregator,
    total_errors: u64,
    last_error: Option<String>,
    shutdown: bool,
}

impl Poller {
    /// Create a poller publishing cycle updates to `results_tx`
    pub fn new(config: PollerConfig, reader: Arc<dyn ValueReader>, results_tx: mpsc::Sender<CycleUpdate>) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        let breaker = CircuitBreaker::new(config.max_consecutive_errors);
        Self {
            config,
            reader,
            tx,
            rx,
            results_tx,
            state: PollerState::Idle,
            settings: PollSettings::default(),
            session: None,
            pending_items: None,
            pending_settings: None,
            breaker,
            load: LoadEstimator::new(),
            metrics: MetricsAggregator::new(),
            total_errors: 0,
            last_error: None,
            shutdown: false,
        }
    }

    /// Override the initial settings
    pub fn with_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Create a handle for sending requests to this poller
    pub fn handle(&self) -> PollerHandle {
        PollerHandle::new(self.tx.clone())
    }

    /// Run the poller task
    ///
    /// Consumes the poller and runs until shutdown is requested or every
    /// handle is dropped.
    pub async fn run(mut self) {
        info!("Poller started");

        loop {
            if self.shutdown && self.state == PollerState::Idle {
                break;
            }

            match self.state {
                PollerState::Idle => match self.rx.recv().await {
                    Some(req) => self.handle_request(req).await,
                    None => break,
                },
                PollerState::Running => self.run_session_iteration().await,
                PollerState::Stopping => self.finish_session().await,
            }
        }

        info!("Poller stopped");
    }

    /// Handle one control request
    ///
    /// Queries are answered immediately; item and settings mutations are
    /// queued and land at the next cycle boundary, never while a cycle is
    /// in flight.
    async fn handle_request(&mut self, req: PollerRequest) {
        match req {
            PollerRequest::Start {
                interval_ms,
                context,
                items,
            } => {
                if self.state != PollerState::Idle {
                    debug!(state = %self.state, "Session already active, ignoring start");
                    return;
                }
                if interval_ms == 0 {
                    warn!("Ignoring start with zero interval");
                    return;
                }

                let session_id = Uuid::now_v7().to_string();
                self.apply_pending();
                self.settings.interval_ms = interval_ms;
                self.breaker.reset();
                self.metrics.reset();
                self.load.reset();
                self.total_errors = 0;
                self.last_error = None;

                info!(
                    session_id = %session_id,
                    interval_ms,
                    items = items.len(),
                    target = %context,
                    "Poll session started"
                );

                self.session = Some(Session {
                    id: session_id.clone(),
                    context,
                    items,
                    cycle: 0,
                    last_cycle_start: None,
                    in_flight: None,
                });
                self.state = PollerState::Running;

                // Clear any stale consumer state before the first real read
                self.publish(CycleUpdate::empty(session_id)).await;
            }

            PollerRequest::Stop => {
                if self.state == PollerState::Running {
                    info!("Stop requested");
                    self.state = PollerState::Stopping;
                } else {
                    debug!(state = %self.state, "Stop with no running session, ignoring");
                }
            }

            PollerRequest::UpdateItems { items } => {
                if self.session.is_some() {
                    debug!(items = items.len(), "Item snapshot refresh queued");
                    self.pending_items = Some(items);
                } else {
                    debug!("UpdateItems with no active session, ignoring");
                }
            }

            PollerRequest::UpdateSettings { settings } => match settings.validate() {
                Ok(()) => {
                    debug!(?settings, "Settings update queued");
                    self.pending_settings = Some(settings);
                }
                Err(e) => warn!(error = %e, "Rejecting invalid settings, keeping previous"),
            },

            PollerRequest::GetStatus { reply_tx } => {
                let _ = reply_tx.send(self.status());
            }

            PollerRequest::GetMetrics { reply_tx } => {
                let _ = reply_tx.send(self.metrics.snapshot());
            }

            PollerRequest::Shutdown => {
                info!("Shutdown requested");
                self.shutdown = true;
                if self.state == PollerState::Running {
                    self.state = PollerState::Stopping;
                }
            }
        }
    }

    /// Apply queued item and settings updates
    ///
    /// Only called when no cycle is in flight, so a refreshed snapshot can
    /// never be merged against results planned from the previous one.
    fn apply_pending(&mut self) {
        if let Some(settings) = self.pending_settings.take() {
            debug!(?settings, "Settings updated");
            self.settings = settings;
        }
        if let Some(items) = self.pending_items.take()
            && let Some(session) = self.session.as_mut()
        {
            debug!(items = items.len(), "Item snapshot refreshed");
            session.items = items;
        }
    }

    fn status(&self) -> PollerStatus {
        PollerStatus {
            state: self.state,
            session_id: self.session.as_ref().map(|s| s.id.clone()),
            consecutive_failures: self.breaker.consecutive_failures(),
            total_errors: self.total_errors,
            last_error: self.last_error.clone(),
        }
    }

    /// One iteration of the session loop
    async fn run_session_iteration(&mut self) {
        // Cycle boundary: drain pending control messages
        while let Ok(req) = self.rx.try_recv() {
            self.handle_request(req).await;
        }
        if self.state != PollerState::Running {
            return;
        }

        let interval = Duration::from_millis(self.settings.interval_ms);

        // Overlap guard: never start a cycle while one is still in flight
        let unfinished = self
            .session
            .as_ref()
            .and_then(|s| s.in_flight.as_ref())
            .is_some_and(|handle| !handle.is_finished());
        if unfinished {
            self.metrics.record_skip();
            let wait = MIN_SKIP_SLEEP.max(interval / 10);
            debug!(wait_ms = wait.as_millis() as u64, "Previous cycle still in flight, skipping");
            self.idle_for(wait).await;
            return;
        }

        // Harvest a cycle that finished after its interval elapsed
        if let Some(handle) = self.session.as_mut().and_then(|s| s.in_flight.take()) {
            match handle.await {
                Ok(outcome) => self.apply_outcome(outcome).await,
                Err(e) => {
                    error!(error = %e, "Cycle task failed");
                    self.record_cycle_failure(format!("Cycle task failed: {}", e)).await;
                }
            }
            return;
        }

        // Cycle boundary proper: no cycle in flight, so queued item and
        // settings updates can land without corrupting a pending merge
        self.apply_pending();
        let interval = Duration::from_millis(self.settings.interval_ms);

        // Drift correction: let at least 80% of the interval pass between
        // cycle starts, absorbing jitter from slow reads
        if let Some(last_start) = self.session.as_ref().and_then(|s| s.last_cycle_start) {
            let min_gap = interval.mul_f64(MIN_SPACING_FRACTION);
            let elapsed = last_start.elapsed();
            if elapsed < min_gap {
                self.idle_for(min_gap - elapsed).await;
                if self.state != PollerState::Running {
                    return;
                }
            }
        }

        self.launch_cycle(interval).await;
    }

    /// Plan, dispatch, and wait out one poll cycle
    async fn launch_cycle(&mut self, interval: Duration) {
        let load = self.load.current();

        let (plan, ctx, cycle_no) = {
            let Some(session) = self.session.as_mut() else {
                warn!("Running state with no session, going idle");
                self.state = PollerState::Idle;
                return;
            };
            session.cycle += 1;
            let plan = batch::plan_cycle(&session.items, &self.settings, load, session.cycle);
            let ctx = ReadContext {
                target: session.context.clone(),
                fast_mode: self.settings.fast_mode,
            };
            session.last_cycle_start = Some(Instant::now());
            (plan, ctx, session.cycle)
        };

        debug!(
            cycle = cycle_no,
            batches = plan.batches.len(),
            skipped_items = plan.skipped.len(),
            load,
            "Starting poll cycle"
        );

        let mut cycle_task = tokio::spawn(run_cycle(Arc::clone(&self.reader), ctx, plan));
        let deadline = Instant::now() + interval;

        // Wait for the cycle up to one interval, staying responsive to
        // control messages; a slower cycle is left in flight for the
        // overlap guard
        let finished = loop {
            tokio::select! {
                res = &mut cycle_task => break Some(res),
                _ = time::sleep_until(deadline) => break None,
                req = self.rx.recv() => match req {
                    Some(req) => {
                        self.handle_request(req).await;
                        if self.state != PollerState::Running {
                            // Stop observed mid-cycle; the straggling task is
                            // dropped with the session and its result discarded
                            break None;
                        }
                    }
                    None => {
                        self.shutdown = true;
                        self.state = PollerState::Stopping;
                        break None;
                    }
                }
            }
        };

        match finished {
            Some(Ok(outcome)) => {
                self.apply_outcome(outcome).await;
                if self.state == PollerState::Running {
                    // Sleep the remainder of the interval
                    self.idle_until(deadline).await;
                }
            }
            Some(Err(e)) => {
                error!(error = %e, "Cycle task failed");
                self.record_cycle_failure(format!("Cycle task failed: {}", e)).await;
                if self.state == PollerState::Running {
                    self.idle_until(deadline).await;
                }
            }
            None => {
                if self.state == PollerState::Running
                    && let Some(session) = self.session.as_mut()
                {
                    session.in_flight = Some(cycle_task);
                }
            }
        }
    }

    /// Merge a completed cycle back into the item state and publish
    async fn apply_outcome(&mut self, outcome: CycleOutcome) {
        match outcome.results {
            Ok(results) => {
                let now = Utc::now();
                let Some(session) = self.session.as_mut() else {
                    return;
                };

                let mut merged = Vec::with_capacity(session.items.len());
                for item in &mut session.items {
                    // Throttled items keep their previous result; skipped is
                    // distinct from "read and failed"
                    if outcome.skipped.iter().any(|id| id == &item.id) {
                        merged.push(ItemResult {
                            id: item.id.clone(),
                            skipped: true,
                            last_result: item.last_result.clone(),
                        });
                        continue;
                    }

                    let last = match results.get(&item.id) {
                        Some(result) => LastResult {
                            value: result.value.clone(),
                            success: result.success,
                            error_message: result.error.clone(),
                            timestamp: now,
                        },
                        None => LastResult {
                            value: None,
                            success: false,
                            error_message: Some("Reader returned no result for item".to_string()),
                            timestamp: now,
                        },
                    };
                    item.last_result = Some(last.clone());
                    merged.push(ItemResult {
                        id: item.id.clone(),
                        skipped: false,
                        last_result: Some(last),
                    });
                }

                let update = CycleUpdate {
                    session_id: session.id.clone(),
                    cycle: session.cycle,
                    items: merged,
                    last_read: now,
                };

                self.breaker.record_success();
                self.last_error = None;
                self.metrics.record_cycle(CycleMetrics {
                    duration_ms: outcome.duration.as_millis() as u64,
                    batch_count: outcome.batch_count,
                    item_count: outcome.item_count,
                    skipped_item_count: outcome.skipped.len(),
                });
                self.load
                    .record(outcome.duration, Duration::from_millis(self.settings.interval_ms));

                self.publish(update).await;
            }
            Err(e) => {
                self.record_cycle_failure(e.to_string()).await;
            }
        }
    }

    /// Record a cycle-level failure; trips the breaker past the threshold
    async fn record_cycle_failure(&mut self, message: String) {
        self.total_errors += 1;
        self.last_error = Some(message.clone());
        warn!(error = %message, total_errors = self.total_errors, "Poll cycle failed");

        if self.breaker.record_failure() {
            error!(
                failures = self.breaker.consecutive_failures(),
                "Too many consecutive cycle failures, stopping session"
            );
            self.state = PollerState::Stopping;
        }
    }

    /// Tear down the active session, clearing published data
    async fn finish_session(&mut self) {
        // A queued snapshot belonged to this session; never leak it forward
        self.pending_items = None;

        let Some(session) = self.session.take() else {
            self.state = PollerState::Idle;
            return;
        };

        if session.in_flight.is_some() {
            // Dropping the handle detaches the straggling cycle; its result
            // is discarded, never published
            debug!("Discarding in-flight cycle result");
        }

        self.publish(CycleUpdate::empty(session.id.clone())).await;
        self.state = PollerState::Idle;
        info!(session_id = %session.id, cycles = session.cycle, "Poll session stopped");
    }

    /// Sleep until `deadline` while staying responsive to control messages
    ///
    /// Returns early when a request moves the poller out of Running.
    async fn idle_until(&mut self, deadline: Instant) {
        loop {
            tokio::select! {
                _ = time::sleep_until(deadline) => return,
                req = self.rx.recv() => match req {
                    Some(req) => {
                        self.handle_request(req).await;
                        if self.state != PollerState::Running {
                            return;
                        }
                    }
                    None => {
                        self.shutdown = true;
                        self.state = PollerState::Stopping;
                        return;
                    }
                }
            }
        }
    }

    async fn idle_for(&mut self, wait: Duration) {
        self.idle_until(Instant::now() + wait).await;
    }

    async fn publish(&self, update: CycleUpdate) {
        if self.results_tx.send(update).await.is_err() {
            debug!("Result consumer dropped, discarding update");
        }
    }
}

/// Execute one cycle: dispatch each batch in order and reconcile by id
///
/// A reader rejection for any batch fails the whole cycle; no placeholder
/// data is synthesized for the remaining batches.
async fn run_cycle(reader: Arc<dyn ValueReader>, ctx: ReadContext, plan: CyclePlan) -> CycleOutcome {
    let started = Instant::now();
    let batch_count = plan.batches.len();
    let item_count = plan.item_count();

    let known_ids: HashSet<&str> = plan
        .batches
        .iter()
        .flat_map(|b| b.requests.iter().map(|r| r.id.as_str()))
        .collect();

    let mut results: HashMap<String, ReadResult> = HashMap::with_capacity(item_count);

    for batch in &plan.batches {
        debug!(label = %batch.label, items = batch.requests.len(), "Dispatching batch");
        match reader.read_batch(&ctx, &batch.requests).await {
            Ok(batch_results) => {
                for result in batch_results {
                    if !known_ids.contains(result.id.as_str()) {
                        return CycleOutcome {
                            results: Err(PollError::UnknownId(result.id)),
                            duration: started.elapsed(),
                            batch_count,
                            item_count,
                            skipped: plan.skipped,
                        };
                    }
                    results.insert(result.id.clone(), result);
                }
            }
            Err(e) => {
                return CycleOutcome {
                    results: Err(e.into()),
                    duration: started.elapsed(),
                    batch_count,
                    item_count,
                    skipped: plan.skipped,
                };
            }
        }
    }

    CycleOutcome {
        results: Ok(results),
        duration: started.elapsed(),
        batch_count,
        item_count,
        skipped: plan.skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::mock::MockReader;
    use serde_json::json;

    fn items(ids: &[&str]) -> Vec<AddressableItem> {
        ids.iter().map(|id| AddressableItem::new(*id, json!({}))).collect()
    }

    fn spawn_poller(reader: MockReader) -> (PollerHandle, mpsc::Receiver<CycleUpdate>) {
        let (results_tx, results_rx) = mpsc::channel(64);
        let poller = Poller::new(PollerConfig::default(), Arc::new(reader), results_tx);
        let handle = poller.handle();
        tokio::spawn(poller.run());
        (handle, results_rx)
    }

    #[tokio::test]
    async fn test_start_publishes_empty_clear() {
        let (handle, mut results_rx) = spawn_poller(MockReader::new());

        handle.start(50, "pid:1", items(&["1"])).await.unwrap();

        // First update clears stale consumer state
        let first = results_rx.recv().await.unwrap();
        assert!(first.is_empty());
        assert_eq!(first.cycle, 0);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_while_running_is_noop() {
        let (handle, mut results_rx) = spawn_poller(MockReader::new());

        handle.start(50, "pid:1", items(&["1"])).await.unwrap();
        let _ = results_rx.recv().await;
        let first_session = handle.status().await.unwrap().session_id;

        // Second start is silently ignored; same session keeps running
        handle.start(10, "pid:2", items(&["2"])).await.unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, PollerState::Running);
        assert_eq!(status.session_id, first_session);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (handle, _results_rx) = spawn_poller(MockReader::new());

        // Stop before any start, and twice in a row - never an error
        handle.stop().await.unwrap();
        handle.stop().await.unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, PollerState::Idle);
        assert!(status.session_id.is_none());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cycle_merges_values_by_id() {
        let (handle, mut results_rx) = spawn_poller(MockReader::new());

        handle.start(20, "pid:1", items(&["1", "2", "3"])).await.unwrap();

        // Skip the initial clear, then take the first real cycle
        let clear = results_rx.recv().await.unwrap();
        assert!(clear.is_empty());

        let update = results_rx.recv().await.unwrap();
        assert_eq!(update.items.len(), 3);
        assert_eq!(update.cycle, 1);
        for result in &update.items {
            assert!(!result.skipped);
            let last = result.last_result.as_ref().unwrap();
            assert!(last.success);
            let expected = result.id.parse::<i64>().unwrap() * 10;
            assert_eq!(last.value, Some(json!(expected)));
            assert_eq!(last.timestamp, update.last_read);
        }

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_throttled_items_keep_previous_result() {
        let (results_tx, mut results_rx) = mpsc::channel(8);
        let mut poller = Poller::new(PollerConfig::default(), Arc::new(MockReader::new()), results_tx);
        poller.state = PollerState::Running;

        let old = LastResult {
            value: Some(json!(42)),
            success: true,
            error_message: None,
            timestamp: Utc::now(),
        };
        let mut low = AddressableItem::new("low", json!({}));
        low.last_result = Some(old.clone());
        let high = AddressableItem::new("9", json!({}));

        poller.session = Some(Session {
            id: "s".to_string(),
            context: "pid:1".to_string(),
            items: vec![low, high],
            cycle: 1,
            last_cycle_start: None,
            in_flight: None,
        });

        let mut results = HashMap::new();
        results.insert("9".to_string(), ReadResult::ok("9", json!(90)));
        let outcome = CycleOutcome {
            results: Ok(results),
            duration: Duration::from_millis(3),
            batch_count: 1,
            item_count: 1,
            skipped: vec!["low".to_string()],
        };
        poller.apply_outcome(outcome).await;

        let update = results_rx.recv().await.unwrap();
        assert_eq!(update.items.len(), 2);

        // Withheld item is flagged skipped and its previous result untouched
        let skipped = update.items.iter().find(|i| i.id == "low").unwrap();
        assert!(skipped.skipped);
        let kept = skipped.last_result.as_ref().unwrap();
        assert_eq!(kept.value, Some(json!(42)));
        assert_eq!(kept.timestamp, old.timestamp);

        let read = update.items.iter().find(|i| i.id == "9").unwrap();
        assert!(!read.skipped);
        assert_eq!(read.last_result.as_ref().unwrap().value, Some(json!(90)));
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected() {
        let (handle, _results_rx) = spawn_poller(MockReader::new());

        let bad = PollSettings {
            batch_size: 0,
            ..Default::default()
        };
        handle.update_settings(bad).await.unwrap();

        // Poller is still healthy and usable
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, PollerState::Idle);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_id_is_a_protocol_error() {
        // Reader that echoes a bogus id
        struct BadReader;

        #[async_trait::async_trait]
        impl ValueReader for BadReader {
            async fn read_batch(
                &self,
                _ctx: &ReadContext,
                _requests: &[crate::reader::ReadRequest],
            ) -> Result<Vec<ReadResult>, ReaderError> {
                Ok(vec![ReadResult::ok("intruder", json!(0))])
            }
        }

        let (results_tx, _results_rx) = mpsc::channel(64);
        let poller = Poller::new(PollerConfig::default(), Arc::new(BadReader), results_tx);
        let handle = poller.handle();
        tokio::spawn(poller.run());

        handle.start(10, "pid:1", items(&["1"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = handle.status().await.unwrap();
        assert!(status.total_errors > 0);
        assert!(status.last_error.unwrap().contains("unknown id"));

        handle.shutdown().await.unwrap();
    }
}
