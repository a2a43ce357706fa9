//! Adaptive polling scheduler
//!
//! A single long-lived task per poller: the session loop owns all mutable
//! state and is driven through [`PollerHandle`] messages. Components:
//!
//! - [`batch`] - deterministic batch planning with grouping and priority
//! - [`LoadEstimator`] - smoothed load signal from cycle durations
//! - [`MetricsAggregator`] - rolling cycle metrics
//! - [`CircuitBreaker`] - session termination after repeated failures
//! - [`Poller`] - the cycle loop itself

pub mod batch;
mod breaker;
mod config;
mod core;
mod handle;
mod load;
mod messages;
mod metrics;

pub use batch::{Batch, CyclePlan, effective_batch_size, plan_cycle};
pub use breaker::CircuitBreaker;
pub use config::PollerConfig;
pub use core::{PollError, Poller};
pub use handle::PollerHandle;
pub use load::LoadEstimator;
pub use messages::{PollerRequest, PollerState, PollerStatus};
pub use metrics::{CycleMetrics, MetricsAggregator, MetricsSnapshot};
