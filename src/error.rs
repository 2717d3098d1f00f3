//! Error types for ticklog.

use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::EngineState;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("engine already active (state: {state})")]
    AlreadyActive { state: EngineState },

    #[error("engine not active (state: {state})")]
    NotActive { state: EngineState },

    #[error("work item {sequence} rejected (state: {state})")]
    Rejected { sequence: u32, state: EngineState },

    #[error("append to {} failed: {source}", destination.display())]
    Sink {
        destination: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("partial write to {}: {written} of {expected} bytes", destination.display())]
    PartialWrite {
        destination: PathBuf,
        written: usize,
        expected: usize,
    },

    #[error("allocation failed: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: EngineState, to: EngineState },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
