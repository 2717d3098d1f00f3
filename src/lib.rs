//! # ticklog
//!
//! Periodic background task engine. A timer fires at a configured interval;
//! each firing produces one sequenced line that a worker pool appends to a
//! log file. Stopping disarms the timer, drains the pool and writes a
//! terminal line with the total count.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod sink;
pub mod telemetry;
