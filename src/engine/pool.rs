//! Worker pool: takes work items off the timer's hands and runs the
//! (possibly slow) sink appends out of band.
//!
//! Items flow through an unbounded queue, so [`WorkerPool::submit`] never
//! blocks. Each worker dequeues one item, appends it on the blocking pool,
//! and only then dequeues the next. With a single worker, lines land in the
//! order their sequence numbers were issued. With several workers, each
//! item is appended at most once but ordering across items is not
//! guaranteed.

use crate::error::{Error, Result};
use crate::event::{EventBus, EventKind};
use crate::model::{EngineState, Lifecycle, WorkItem};
use crate::sink::Sink;
use crate::telemetry::metrics;
use crate::telemetry::work::start_append_span;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

type Queue = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<WorkItem>>>;

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Items accepted by `submit`.
    pub accepted: u64,
    /// Items fully appended.
    pub appended: u64,
    /// Items whose append failed or was partial.
    pub failed: u64,
}

impl PoolStats {
    /// Accepted items not yet appended or failed.
    pub fn pending(&self) -> u64 {
        self.accepted.saturating_sub(self.appended + self.failed)
    }
}

/// Outcome of [`WorkerPool::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Items that finished, successfully or not, over the pool's lifetime.
    pub processed: u64,
    /// Of those, how many failed.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    appended: AtomicU64,
    failed: AtomicU64,
}

/// A fixed set of workers fed by one queue.
pub struct WorkerPool {
    lifecycle: Arc<Lifecycle>,
    tx: Mutex<Option<mpsc::UnboundedSender<WorkItem>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    events: EventBus,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) on the current tokio runtime.
    pub fn spawn(
        size: usize,
        sink: Arc<dyn Sink>,
        lifecycle: Arc<Lifecycle>,
        events: EventBus,
    ) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let queue: Queue = Arc::new(tokio::sync::Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let workers = (0..size)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&sink),
                    Arc::clone(&counters),
                    events.clone(),
                ))
            })
            .collect();

        debug!(workers = size, "worker pool started");

        Self {
            lifecycle,
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            counters,
            events,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Enqueue `item` for a worker. Never blocks.
    ///
    /// Fails with [`Error::Rejected`] unless the engine is active and the
    /// queue is still open; the item is dropped in that case.
    pub fn submit(&self, item: WorkItem) -> Result<()> {
        let sequence = item.sequence();
        let state = self.lifecycle.get();
        if state != EngineState::Active {
            metrics::submissions().add(1, &metrics::result("rejected"));
            return Err(Error::Rejected { sequence, state });
        }

        // Counted before the send: a worker may finish the item first.
        self.counters.accepted.fetch_add(1, Ordering::AcqRel);
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let sent = match tx.as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        };
        drop(tx);

        if sent {
            metrics::submissions().add(1, &metrics::result("accepted"));
            Ok(())
        } else {
            self.counters.accepted.fetch_sub(1, Ordering::AcqRel);
            metrics::submissions().add(1, &metrics::result("rejected"));
            Err(Error::Rejected {
                sequence,
                state: self.lifecycle.get(),
            })
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            accepted: self.counters.accepted.load(Ordering::Acquire),
            appended: self.counters.appended.load(Ordering::Acquire),
            failed: self.counters.failed.load(Ordering::Acquire),
        }
    }

    /// Close the queue and wait until every accepted item has been processed
    /// and every worker has exited.
    ///
    /// There is no timeout: a sink that never returns stalls the drain.
    pub async fn drain(&self) -> DrainReport {
        let started = Instant::now();
        let pending = self.stats().pending();

        // Dropping the sender closes the queue once it is empty.
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let workers =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));

        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }

        let stats = self.stats();
        let report = DrainReport {
            processed: stats.appended + stats.failed,
            failed: stats.failed,
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::drain_duration_ms().record(elapsed_ms, &[]);
        self.events.publish(EventKind::Drained {
            processed: report.processed,
            failed: report.failed,
        });
        info!(
            pending_at_start = pending,
            processed = report.processed,
            failed = report.failed,
            duration_ms = elapsed_ms,
            "worker pool drained"
        );
        report
    }
}

async fn run_worker(
    id: usize,
    queue: Queue,
    sink: Arc<dyn Sink>,
    counters: Arc<Counters>,
    events: EventBus,
) {
    loop {
        // Hold the queue lock only while waiting for the next item.
        let next = queue.lock().await.recv().await;
        let Some(item) = next else {
            break;
        };

        let span = start_append_span(item.sequence(), item.destination());
        let sequence = item.sequence();
        match execute(item, &sink).instrument(span.clone()).await {
            Ok(bytes) => {
                span.record("work.outcome", "ok");
                counters.appended.fetch_add(1, Ordering::AcqRel);
                metrics::appends().add(1, &metrics::result("ok"));
                events.publish(EventKind::Appended { sequence, bytes });
            }
            Err(e) => {
                span.record("work.outcome", "failed");
                counters.failed.fetch_add(1, Ordering::AcqRel);
                metrics::appends().add(1, &metrics::result("failed"));
                span.in_scope(|| {
                    warn!(worker = id, sequence, error = %e, "append failed, dropping line");
                });
                events.publish(EventKind::AppendFailed {
                    sequence,
                    error: e.to_string(),
                });
            }
        }
    }
    debug!(worker = id, "worker exiting");
}

/// Append one item on the blocking pool. The item is moved into the
/// blocking task and dropped there once the append returns.
async fn execute(item: WorkItem, sink: &Arc<dyn Sink>) -> Result<usize> {
    let sink = Arc::clone(sink);
    let sequence = item.sequence();
    tokio::task::spawn_blocking(move || append_all(sink.as_ref(), &item))
        .await
        .map_err(|e| Error::Other(format!("append task for {sequence} failed: {e}")))?
}

/// Single append with partial writes reported as failures, never retried.
pub(crate) fn append_all(sink: &dyn Sink, item: &WorkItem) -> Result<usize> {
    let payload = item.message().as_bytes();
    let destination = item.destination();
    match sink.append(destination, payload) {
        Ok(written) if written == payload.len() => Ok(written),
        Ok(written) => Err(Error::PartialWrite {
            destination: destination.to_path_buf(),
            written,
            expected: payload.len(),
        }),
        Err(source) => Err(Error::Sink {
            destination: destination.to_path_buf(),
            source,
        }),
    }
}
