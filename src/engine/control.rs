//! The engine: owns lifecycle state, the sequence counter, the timer and
//! the worker pool, and sequences start and stop.

use crate::config::{EngineConfig, validate_destination};
use crate::error::{Error, Result};
use crate::event::{Event, EventBus, EventKind};
use crate::model::{EngineState, Lifecycle, SequenceCounter, WorkItem};
use crate::sink::{FileSink, Sink};
use crate::telemetry::work::record_state_transition;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast, watch};
use tracing::{Instrument, Span, error, info, warn};

use super::pool::{WorkerPool, append_all};
use super::scheduler::Scheduler;

/// Summary returned by [`Engine::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    /// Last issued sequence number.
    pub total_produced: u32,
    /// Lines the pool appended while the engine ran.
    pub appended: u64,
    /// Lines the pool failed to append.
    pub failed: u64,
    /// Whether the terminal line was written.
    pub terminal_written: bool,
}

struct Running {
    scheduler: Scheduler,
    pool: Arc<WorkerPool>,
}

/// Periodic background task engine.
///
/// Call [`start`](Self::start) and [`stop`](Self::stop) from inside a tokio
/// runtime. Dropping an active engine aborts the timer and closes the queue:
/// workers append what was already queued, then exit. No terminal line is
/// written in that case.
pub struct Engine {
    sink: Arc<dyn Sink>,
    lifecycle: Arc<Lifecycle>,
    counter: Arc<SequenceCounter>,
    events: EventBus,
    settings: Arc<watch::Sender<EngineConfig>>,
    running: Arc<Mutex<Option<Running>>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Arc::new(FileSink::new()))
    }
}

impl Engine {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        let (settings, _) = watch::channel(EngineConfig::default());
        Self {
            sink,
            lifecycle: Arc::new(Lifecycle::new()),
            counter: Arc::new(SequenceCounter::new()),
            events: EventBus::new(),
            settings: Arc::new(settings),
            running: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.get()
    }

    /// Last issued sequence number, or 0 if nothing fired since start.
    pub fn produced(&self) -> u32 {
        self.counter.current()
    }

    /// Settings the timer currently reads.
    pub fn settings(&self) -> EngineConfig {
        self.settings.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Validate `config`, then go `Inactive -> Active`, reset the counter,
    /// spawn the worker pool and arm the timer.
    ///
    /// Fails with [`Error::Config`] on invalid settings and with
    /// [`Error::AlreadyActive`] unless the engine is inactive, including
    /// while a stop is still in progress.
    pub async fn start(&self, config: EngineConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            error!(error = %e, "refusing to start");
            return Err(e);
        }

        let mut running = match self.running.try_lock() {
            Ok(running) => running,
            Err(_) => match self.lifecycle.get() {
                // A stop that already reached Inactive releases the lock next.
                EngineState::Inactive => self.running.lock().await,
                state => return Err(Error::AlreadyActive { state }),
            },
        };
        self.lifecycle.activate()?;
        transitioned(&self.events, EngineState::Inactive, EngineState::Active);

        self.counter.reset();
        self.settings.send_replace(config.clone());

        let pool = Arc::new(WorkerPool::spawn(
            config.workers,
            Arc::clone(&self.sink),
            Arc::clone(&self.lifecycle),
            self.events.clone(),
        ));
        let mut scheduler = Scheduler::new(
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.counter),
            Arc::clone(&pool),
            self.events.clone(),
        );

        if let Err(e) = scheduler.arm(self.settings.subscribe()) {
            error!(error = %e, "failed to arm timer, rolling back");
            self.lifecycle.begin_deactivation()?;
            transitioned(&self.events, EngineState::Active, EngineState::Deactivating);
            pool.drain().await;
            self.lifecycle.finish_deactivation()?;
            transitioned(&self.events, EngineState::Deactivating, EngineState::Inactive);
            return Err(e);
        }

        info!(
            destination = %config.destination.display(),
            interval_secs = config.interval_secs,
            workers = config.workers,
            "engine started"
        );
        *running = Some(Running { scheduler, pool });
        Ok(())
    }

    /// Replace destination, interval and message while active.
    ///
    /// A new destination or message applies to the next firing, a new
    /// interval to the next rearm. The worker count is fixed until the next
    /// start.
    pub fn reconfigure(&self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        let state = self.lifecycle.get();
        if state != EngineState::Active {
            return Err(Error::NotActive { state });
        }

        let previous = self.settings.send_replace(config.clone());
        if previous.workers != config.workers {
            warn!(
                current = previous.workers,
                requested = config.workers,
                "worker count changes apply on next start"
            );
        }
        info!(
            destination = %config.destination.display(),
            interval_secs = config.interval_secs,
            "engine reconfigured"
        );
        Ok(())
    }

    /// Disarm the timer, drain the pool, write the terminal line and go
    /// back to `Inactive`.
    ///
    /// Fails with [`Error::NotActive`] when there is nothing to stop. A stop
    /// issued while another is in progress waits for it, then fails the same
    /// way. The terminal write is best-effort: its failure is logged and
    /// reported in [`StopReport::terminal_written`], never returned.
    ///
    /// Once the engine is `Deactivating` the teardown runs on its own task,
    /// so dropping this future still brings the engine back to `Inactive`.
    pub async fn stop(&self) -> Result<StopReport> {
        let mut running = Arc::clone(&self.running).lock_owned().await;
        self.lifecycle.begin_deactivation()?;
        transitioned(&self.events, EngineState::Active, EngineState::Deactivating);

        let teardown = Teardown {
            sink: Arc::clone(&self.sink),
            lifecycle: Arc::clone(&self.lifecycle),
            counter: Arc::clone(&self.counter),
            events: self.events.clone(),
            settings: Arc::clone(&self.settings),
        };
        tokio::spawn(teardown.run(running.take(), running).instrument(Span::current()))
            .await
            .map_err(|e| Error::Other(format!("stop task failed: {e}")))?
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.lifecycle.is_active() {
            warn!(
                produced = self.counter.current(),
                "engine dropped while active, timer aborted and no terminal line written"
            );
        }
    }
}

/// Everything the second half of a stop needs, detached from the engine.
struct Teardown {
    sink: Arc<dyn Sink>,
    lifecycle: Arc<Lifecycle>,
    counter: Arc<SequenceCounter>,
    events: EventBus,
    settings: Arc<watch::Sender<EngineConfig>>,
}

impl Teardown {
    /// `_guard` keeps other starts and stops out until the engine is back
    /// to `Inactive`.
    async fn run(
        self,
        running: Option<Running>,
        _guard: OwnedMutexGuard<Option<Running>>,
    ) -> Result<StopReport> {
        let (appended, failed) = match running {
            Some(Running {
                mut scheduler,
                pool,
            }) => {
                scheduler.disarm().await;
                let report = pool.drain().await;
                (report.processed - report.failed, report.failed)
            }
            None => (0, 0),
        };

        let total_produced = self.counter.current();
        let terminal_written = self.write_terminal(total_produced).await;

        self.lifecycle.finish_deactivation()?;
        transitioned(&self.events, EngineState::Deactivating, EngineState::Inactive);

        info!(total_produced, appended, failed, terminal_written, "engine stopped");
        Ok(StopReport {
            total_produced,
            appended,
            failed,
            terminal_written,
        })
    }

    /// Append the terminal line directly, bypassing the (drained) pool.
    async fn write_terminal(&self, total: u32) -> bool {
        let destination = self.settings.borrow().destination.clone();
        let written = match self.append_terminal(total, destination).await {
            Ok(bytes) => {
                info!(total, bytes, "terminal line written");
                true
            }
            Err(e) => {
                warn!(total, error = %e, "terminal line not written");
                false
            }
        };
        self.events.publish(EventKind::Terminal { total, written });
        written
    }

    async fn append_terminal(&self, total: u32, destination: PathBuf) -> Result<usize> {
        validate_destination(&destination)?;
        let item = WorkItem::terminal(total, &destination)?;
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || append_all(sink.as_ref(), &item))
            .await
            .map_err(|e| Error::Other(format!("terminal append task failed: {e}")))?
    }
}

fn transitioned(events: &EventBus, from: EngineState, to: EngineState) {
    record_state_transition(&Span::current(), &from.to_string(), &to.to_string());
    events.publish(EventKind::StateTransition { from, to });
}