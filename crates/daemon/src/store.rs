use std::sync::Arc;

use arc_swap::ArcSwap;
use feedrank_core::model::{CycleReport, Snapshot};

/// What readers see: a snapshot and the report of the cycle that built it.
#[derive(Debug, Clone, Default)]
pub struct Published {
    pub snapshot: Arc<Snapshot>,
    /// `None` until the first cycle has been published.
    pub report: Option<CycleReport>,
}

/// Single-writer, many-reader holder of the latest snapshot.
///
/// Publishing swaps one pointer; a reader holding an earlier `Arc` keeps a
/// complete view of the earlier snapshot.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: ArcSwap<Published>,
}

impl SnapshotStore {
    /// Starts with an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.load().snapshot)
    }

    pub fn published(&self) -> Arc<Published> {
        self.current.load_full()
    }

    pub fn publish(&self, snapshot: Snapshot, report: CycleReport) {
        self.current.store(Arc::new(Published {
            snapshot: Arc::new(snapshot),
            report: Some(report),
        }));
    }
}
