//! Periodic refresh driver.
//!
//! States are `Idle` and `Running`. A trigger that arrives while a cycle is
//! running is dropped, never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::engine::AggregationEngine;
use crate::store::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug)]
pub enum Trigger {
    /// A cycle was started; the handle resolves once it has been published
    /// or discarded.
    Started(JoinHandle<()>),
    /// A cycle was already running.
    Skipped,
}

#[derive(Clone)]
pub struct Scheduler {
    engine: Arc<AggregationEngine>,
    store: Arc<SnapshotStore>,
    running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(engine: Arc<AggregationEngine>, store: Arc<SnapshotStore>) -> Self {
        Self {
            engine,
            store,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Starts a cycle unless one is running.
    pub fn trigger(&self) -> Trigger {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("refresh cycle still running; trigger dropped");
            return Trigger::Skipped;
        }

        let guard = RunningGuard(Arc::clone(&self.running));
        let engine = Arc::clone(&self.engine);
        let store = Arc::clone(&self.store);
        Trigger::Started(tokio::spawn(async move {
            let _guard = guard;
            match engine.run_cycle().await {
                Ok(out) => store.publish(out.snapshot, out.report),
                Err(e) => error!(error = %e, "refresh cycle failed; keeping previous snapshot"),
            }
        }))
    }
}

// Returns the scheduler to Idle even if the cycle task panics.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Triggers a cycle immediately and then every `every`.
pub fn spawn_scheduler(scheduler: Scheduler, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = every.as_secs(), "starting refresh scheduler");
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            if let Trigger::Skipped = scheduler.trigger() {
                info!("previous refresh cycle still running; skipping this tick");
            }
        }
    })
}
