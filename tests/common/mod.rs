//! Shared test doubles.

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use ticklog::sink::Sink;

/// Records every append in memory. Can be told to fail, to write short, or
/// to stall each append.
#[derive(Default)]
pub struct RecordingSink {
    appends: Mutex<Vec<(PathBuf, String)>>,
    fail: AtomicBool,
    short_by: AtomicUsize,
    delay_ms: AtomicU64,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn short_by(bytes: usize) -> Self {
        let sink = Self::default();
        sink.short_by.store(bytes, Ordering::SeqCst);
        sink
    }

    pub fn slow(delay: Duration) -> Self {
        let sink = Self::default();
        sink.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
        sink
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every recorded line, in append order.
    pub fn lines(&self) -> Vec<String> {
        self.appends
            .lock()
            .unwrap()
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Lines recorded for one destination.
    pub fn lines_for(&self, destination: &Path) -> Vec<String> {
        self.appends
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path == destination)
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Sequence numbers of the regular (non-terminal) lines, in append order.
    pub fn sequences(&self) -> Vec<u32> {
        self.lines().iter().filter_map(|l| parse_sequence(l)).collect()
    }

    pub fn terminal_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.starts_with("ticklog unloaded"))
            .collect()
    }
}

impl Sink for RecordingSink {
    fn append(&self, destination: &Path, payload: &[u8]) -> io::Result<usize> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected failure"));
        }
        let line = String::from_utf8_lossy(payload).into_owned();
        self.appends
            .lock()
            .unwrap()
            .push((destination.to_path_buf(), line));
        Ok(payload.len().saturating_sub(self.short_by.load(Ordering::SeqCst)))
    }
}

/// Parse `"<text> (<n>)\n"`; terminal lines yield `None`.
pub fn parse_sequence(line: &str) -> Option<u32> {
    if line.starts_with("ticklog unloaded") {
        return None;
    }
    let open = line.rfind('(')?;
    let close = line.rfind(')')?;
    line[open + 1..close].parse().ok()
}

/// Poll `check` every 10ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
