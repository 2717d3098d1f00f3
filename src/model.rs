//! Core data model.
//!
//! A work item is one produced log line: a sequence number, the formatted
//! message and where it goes. The engine lifecycle gates whether more work
//! may be produced or accepted.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use crate::error::{Error, Result};

const TERMINAL_PREFIX: &str = "ticklog unloaded";

// ---------------------------------------------------------------------------
// Sequence Counter
// ---------------------------------------------------------------------------

/// Monotonic firing counter. Zero means "never fired"; on overflow the
/// counter wraps to 1 so zero is never issued.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    value: AtomicU32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter whose next issued value follows `value`. Mostly for tests
    /// that exercise wraparound.
    pub fn starting_at(value: u32) -> Self {
        Self {
            value: AtomicU32::new(value),
        }
    }

    /// Issue the next sequence number.
    pub fn next(&self) -> u32 {
        let previous = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(successor(v)))
            .unwrap_or_else(|v| v);
        successor(previous)
    }

    /// Last issued value, or 0 if nothing was issued.
    pub fn current(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Release);
    }
}

fn successor(v: u32) -> u32 {
    match v.wrapping_add(1) {
        0 => 1,
        n => n,
    }
}

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// One unit of work produced by a firing. Immutable once built; moved from
/// the scheduler into the queue and from the queue into exactly one worker.
#[derive(Debug, PartialEq, Eq)]
pub struct WorkItem {
    sequence: u32,
    message: String,
    destination: PathBuf,
}

impl WorkItem {
    /// Format `"<template> (<sequence>)\n"` into a freshly reserved buffer.
    ///
    /// Allocation failure is reported instead of aborting, so the caller can
    /// skip the firing and keep the schedule alive.
    pub fn build(sequence: u32, template: &str, destination: &Path) -> Result<Self> {
        let mut message = String::new();
        // template + " (" + up to 10 digits + ")\n"
        message.try_reserve_exact(template.len() + 14)?;
        writeln!(message, "{template} ({sequence})")
            .map_err(|e| Error::Other(format!("format work item {sequence}: {e}")))?;
        Self::owned(sequence, message, destination)
    }

    /// The line written on shutdown: `"ticklog unloaded (total: <n>)\n"`.
    /// Its sequence is the total, not a freshly issued number.
    pub fn terminal(total: u32, destination: &Path) -> Result<Self> {
        let mut message = String::new();
        message.try_reserve_exact(TERMINAL_PREFIX.len() + 22)?;
        writeln!(message, "{TERMINAL_PREFIX} (total: {total})")
            .map_err(|e| Error::Other(format!("format terminal line: {e}")))?;
        Self::owned(total, message, destination)
    }

    fn owned(sequence: u32, message: String, destination: &Path) -> Result<Self> {
        let mut path = PathBuf::new();
        path.try_reserve_exact(destination.as_os_str().len())?;
        path.push(destination);
        Ok(Self {
            sequence,
            message,
            destination: path,
        })
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

// ---------------------------------------------------------------------------
// Engine State
// ---------------------------------------------------------------------------

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Not running. The only state `start` accepts.
    Inactive,
    /// Timer armed, pool accepting work.
    Active,
    /// Stop requested; timer being disarmed and pool drained.
    Deactivating,
}

impl EngineState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, to),
            (Inactive, Active) | (Active, Deactivating) | (Deactivating, Inactive)
        )
    }

    fn as_u8(self) -> u8 {
        match self {
            EngineState::Inactive => 0,
            EngineState::Active => 1,
            EngineState::Deactivating => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => EngineState::Active,
            2 => EngineState::Deactivating,
            _ => EngineState::Inactive,
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineState::Inactive => "inactive",
            EngineState::Active => "active",
            EngineState::Deactivating => "deactivating",
        };
        write!(f, "{s}")
    }
}

/// Shared, atomically updated [`EngineState`]. The scheduler and the pool
/// read it; only the engine moves it.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(EngineState::Inactive.as_u8()),
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.get() == EngineState::Active
    }

    /// Move `from -> to` atomically. Fails if the transition is illegal or
    /// the current state is not `from`.
    pub fn transition(&self, from: EngineState, to: EngineState) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { from, to });
        }
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| Error::InvalidTransition {
                from: EngineState::from_u8(actual),
                to,
            })
    }

    /// `Inactive -> Active`, or `AlreadyActive`.
    pub fn activate(&self) -> Result<()> {
        self.transition(EngineState::Inactive, EngineState::Active)
            .map_err(|_| Error::AlreadyActive { state: self.get() })
    }

    /// `Active -> Deactivating`, or `NotActive`.
    pub fn begin_deactivation(&self) -> Result<()> {
        self.transition(EngineState::Active, EngineState::Deactivating)
            .map_err(|_| Error::NotActive { state: self.get() })
    }

    /// `Deactivating -> Inactive`.
    pub fn finish_deactivation(&self) -> Result<()> {
        self.transition(EngineState::Deactivating, EngineState::Inactive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_at_zero_and_issues_one_first() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.current(), 2);
    }

    #[test]
    fn counter_wraps_to_one_not_zero() {
        let counter = SequenceCounter::starting_at(u32::MAX - 1);
        assert_eq!(counter.next(), u32::MAX);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.current(), 1);
        assert_eq!(counter.next(), 2);
    }

    #[test]
    fn counter_reset_returns_to_never_fired() {
        let counter = SequenceCounter::new();
        counter.next();
        counter.reset();
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.next(), 1);
    }

    #[test]
    fn work_item_formats_line() {
        let item = WorkItem::build(7, "Hello", Path::new("/tmp/log")).unwrap();
        assert_eq!(item.sequence(), 7);
        assert_eq!(item.message(), "Hello (7)\n");
        assert_eq!(item.destination(), Path::new("/tmp/log"));
    }

    #[test]
    fn terminal_item_reports_total() {
        let item = WorkItem::terminal(3, Path::new("/tmp/log")).unwrap();
        assert_eq!(item.sequence(), 3);
        assert_eq!(item.message(), "ticklog unloaded (total: 3)\n");
    }

    #[test]
    fn work_item_fits_largest_sequence() {
        let item = WorkItem::build(u32::MAX, "x", Path::new("/tmp/log")).unwrap();
        assert_eq!(item.message(), format!("x ({})\n", u32::MAX));
    }

    #[test]
    fn only_the_lifecycle_cycle_is_legal() {
        use EngineState::*;
        let all = [Inactive, Active, Deactivating];
        for from in all {
            for to in all {
                let expected = matches!(
                    (from, to),
                    (Inactive, Active) | (Active, Deactivating) | (Deactivating, Inactive)
                );
                assert_eq!(from.can_transition_to(to), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn activate_fails_unless_inactive() {
        let lifecycle = Lifecycle::new();
        lifecycle.activate().unwrap();
        assert!(matches!(
            lifecycle.activate(),
            Err(Error::AlreadyActive {
                state: EngineState::Active
            })
        ));

        lifecycle.begin_deactivation().unwrap();
        assert!(matches!(
            lifecycle.activate(),
            Err(Error::AlreadyActive {
                state: EngineState::Deactivating
            })
        ));
    }

    #[test]
    fn begin_deactivation_fails_when_inactive() {
        let lifecycle = Lifecycle::new();
        assert!(matches!(
            lifecycle.begin_deactivation(),
            Err(Error::NotActive {
                state: EngineState::Inactive
            })
        ));
    }

    #[test]
    fn full_cycle_returns_to_inactive() {
        let lifecycle = Lifecycle::new();
        lifecycle.activate().unwrap();
        assert!(lifecycle.is_active());
        lifecycle.begin_deactivation().unwrap();
        lifecycle.finish_deactivation().unwrap();
        assert_eq!(lifecycle.get(), EngineState::Inactive);
    }

    #[test]
    fn illegal_transition_leaves_state_untouched() {
        let lifecycle = Lifecycle::new();
        let err = lifecycle
            .transition(EngineState::Inactive, EngineState::Deactivating)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(lifecycle.get(), EngineState::Inactive);
    }
}
