//! memprobe - adaptive polling scheduler for external value sources
//!
//! memprobe repeatedly samples a mutable set of addressable items (process
//! memory values, sensor registers, ...) through an external [`ValueReader`],
//! in grouped batches at a target cadence. It adapts batch size to estimated
//! load, prioritizes items under pressure, prevents overlapping read cycles,
//! and trips a circuit breaker after repeated failures.
//!
//! # Core Concepts
//!
//! - **Single owner**: one task owns all session state; callers talk to it
//!   through a [`PollerHandle`], and every mutation lands at a cycle boundary
//! - **Batches, not items**: the reader is called once per batch; grouped
//!   items always travel together, ahead of ungrouped ones
//! - **Honest failures**: a rejected batch fails the cycle; stale values are
//!   never republished as fresh, and a tripped breaker clears consumer state
//!
//! # Modules
//!
//! - [`domain`] - addressable items, priorities, cycle results
//! - [`reader`] - the external reader contract
//! - [`poller`] - the scheduler itself
//! - [`config`] - configuration types and loading

pub mod config;
pub mod domain;
pub mod poller;
pub mod reader;

// Re-export commonly used types
pub use config::{Config, PollSettings};
pub use domain::{AddressableItem, CycleUpdate, ItemResult, LastResult, Priority};
pub use poller::{
    CircuitBreaker, CycleMetrics, LoadEstimator, MetricsAggregator, MetricsSnapshot, PollError, Poller, PollerConfig,
    PollerHandle, PollerState, PollerStatus,
};
pub use reader::{ReadContext, ReadRequest, ReadResult, ReaderError, ValueReader};
