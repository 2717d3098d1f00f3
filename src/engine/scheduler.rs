//! Recurring timer: one work item per firing, handed to the pool.

use crate::config::{EngineConfig, validate_interval};
use crate::error::{Error, Result};
use crate::event::{EventBus, EventKind};
use crate::model::{Lifecycle, SequenceCounter, WorkItem};
use crate::telemetry::metrics;
use crate::telemetry::work::start_firing_span;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::pool::WorkerPool;

/// Owns the timer task. Arm once; disarm waits until no firing can follow.
pub struct Scheduler {
    lifecycle: Arc<Lifecycle>,
    counter: Arc<SequenceCounter>,
    pool: Arc<WorkerPool>,
    events: EventBus,
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(
        lifecycle: Arc<Lifecycle>,
        counter: Arc<SequenceCounter>,
        pool: Arc<WorkerPool>,
        events: EventBus,
    ) -> Self {
        Self {
            lifecycle,
            counter,
            pool,
            events,
            shutdown: Arc::new(Notify::new()),
            task: None,
        }
    }

    /// Schedule the first firing one interval from now.
    ///
    /// `settings` is read again on every firing, so a new destination or
    /// message applies to the next item and a new interval to the next
    /// rearm. Fails with [`Error::Config`] if the current interval is out of
    /// range.
    pub fn arm(&mut self, settings: watch::Receiver<EngineConfig>) -> Result<()> {
        let interval_secs = settings.borrow().interval_secs;
        validate_interval(interval_secs)?;
        if self.task.is_some() {
            return Err(Error::Other("scheduler already armed".to_string()));
        }

        let interval = Duration::from_secs(u64::from(interval_secs));
        let timer = Timer {
            lifecycle: Arc::clone(&self.lifecycle),
            counter: Arc::clone(&self.counter),
            pool: Arc::clone(&self.pool),
            events: self.events.clone(),
            settings,
            interval,
        };
        self.task = Some(tokio::spawn(timer.run(Arc::clone(&self.shutdown))));
        info!(interval_secs, "timer armed");
        Ok(())
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Cancel the pending firing and wait for the timer task to exit.
    ///
    /// A firing already in progress runs to completion first. Once this
    /// returns, no further work item will be submitted.
    pub async fn disarm(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.shutdown.notify_one();
        if let Err(e) = task.await {
            error!(error = %e, "timer task ended abnormally");
        }
        debug!("timer disarmed");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Timer {
    lifecycle: Arc<Lifecycle>,
    counter: Arc<SequenceCounter>,
    pool: Arc<WorkerPool>,
    events: EventBus,
    settings: watch::Receiver<EngineConfig>,
    /// Last interval that passed validation.
    interval: Duration,
}

impl Timer {
    async fn run(mut self, shutdown: Arc<Notify>) {
        let mut deadline = Instant::now() + self.interval;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => return,
                _ = tokio::time::sleep_until(deadline) => {}
            }

            if !self.fire() {
                debug!("engine no longer active, timer not rearmed");
                return;
            }
            deadline = Instant::now() + self.interval;
        }
    }

    /// Handle one firing. Returns whether to rearm.
    fn fire(&mut self) -> bool {
        // A stop may have begun while we slept.
        if !self.lifecycle.is_active() {
            return false;
        }

        let settings = self.settings.borrow_and_update().clone();
        match settings.validate() {
            Ok(()) => {
                self.interval = Duration::from_secs(u64::from(settings.interval_secs));
                self.produce(&settings);
            }
            Err(e) => {
                error!(error = %e, "current settings are invalid, skipping firing");
            }
        }

        // Checked again: a stop that began mid-firing must not see the timer
        // come back.
        self.lifecycle.is_active()
    }

    fn produce(&self, settings: &EngineConfig) {
        let sequence = self.counter.next();
        let span = start_firing_span(sequence);
        let _entered = span.enter();

        metrics::firings().add(1, &[]);
        self.events.publish(EventKind::Fired { sequence });

        let item = match WorkItem::build(sequence, &settings.message, &settings.destination) {
            Ok(item) => item,
            Err(e) => {
                metrics::submissions().add(1, &metrics::result("allocation"));
                error!(sequence, error = %e, "could not build work item, skipping firing");
                self.events.publish(EventKind::Dropped {
                    sequence,
                    reason: e.to_string(),
                });
                return;
            }
        };

        match self.pool.submit(item) {
            Ok(()) => {
                debug!(sequence, destination = %settings.destination.display(), "work item submitted");
                self.events.publish(EventKind::Submitted { sequence });
            }
            Err(e) => {
                warn!(sequence, error = %e, "work item not accepted, dropping");
                self.events.publish(EventKind::Dropped {
                    sequence,
                    reason: e.to_string(),
                });
            }
        }
    }
}
