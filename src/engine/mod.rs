//! Drain engine: queue polling, per-row execute and delete.

pub mod drain;
pub mod store;

pub use drain::{CycleReport, DrainConfig, QueueDrain};
pub use store::{QueueSession, QueueStore};
