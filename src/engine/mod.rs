//! Engine: lifecycle, recurring timer, and the worker pool behind it.

pub mod control;
pub mod pool;
pub mod scheduler;

pub use control::{Engine, StopReport};
pub use pool::{DrainReport, PoolStats, WorkerPool};
pub use scheduler::Scheduler;
