//! Domain types for the polling scheduler
//!
//! Core types: AddressableItem (one value to sample), Priority, and the
//! per-cycle result types published to the result consumer.

mod item;
mod priority;
mod result;

pub use item::{AddressableItem, LastResult};
pub use priority::Priority;
pub use result::{CycleUpdate, ItemResult};
