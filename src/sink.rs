//! Append-only destinations for produced lines.
//!
//! The engine only needs "append one buffer, report bytes written". It calls
//! [`Sink::append`] from tokio's blocking pool, never from the timer task.

use std::fs::OpenOptions;
use std::io::{self, Write as _};
use std::path::Path;
use tracing::{error, warn};

/// An append-only destination.
pub trait Sink: Send + Sync + 'static {
    /// Append `payload` to `destination`, creating it if absent.
    ///
    /// Returns the number of bytes written. A short count is a partial write;
    /// the caller reports it as a failure and does not retry.
    fn append(&self, destination: &Path, payload: &[u8]) -> io::Result<usize>;
}

/// Appends to regular files: open with create+append, one write, close.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSink;

impl FileSink {
    pub fn new() -> Self {
        Self
    }
}

impl Sink for FileSink {
    fn append(&self, destination: &Path, payload: &[u8]) -> io::Result<usize> {
        if payload.is_empty() {
            warn!(destination = %destination.display(), "empty payload, skipping write");
            return Ok(0);
        }

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt as _;
            options.mode(0o644);
        }

        let mut file = options.open(destination).inspect_err(|e| {
            error!(
                destination = %destination.display(),
                error = %e,
                hint = open_hint(e.kind()),
                "failed to open destination"
            );
        })?;

        file.write(payload)
    }
}

fn open_hint(kind: io::ErrorKind) -> &'static str {
    match kind {
        io::ErrorKind::NotFound => "check that the parent directory exists",
        io::ErrorKind::PermissionDenied => "permission denied",
        io::ErrorKind::StorageFull => "no space left on device",
        _ => "unknown error",
    }
}
