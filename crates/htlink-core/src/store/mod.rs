// ── Snapshot store ──
//
// Holds the latest published snapshot. Readers get it lock-free through
// `ArcSwap`; subscribers are woken through a `watch` channel. Publishing
// replaces the whole `Arc`, so nobody ever observes a half-built mapping.

mod snapshot;

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

pub use snapshot::{ParameterSnapshot, SnapshotEntry, Validity};
pub(crate) use snapshot::SnapshotBuilder;

use crate::stream::SnapshotStream;

pub struct SnapshotStore {
    current: ArcSwap<ParameterSnapshot>,
    tx: watch::Sender<Arc<ParameterSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let initial = Arc::new(ParameterSnapshot::default());
        let (tx, _) = watch::channel(Arc::clone(&initial));
        Self {
            current: ArcSwap::new(initial),
            tx,
        }
    }

    /// Latest published snapshot. Never blocks.
    pub fn load(&self) -> Arc<ParameterSnapshot> {
        self.current.load_full()
    }

    pub fn publish(&self, snapshot: ParameterSnapshot) -> Arc<ParameterSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.current.store(Arc::clone(&snapshot));
        self.tx.send_replace(Arc::clone(&snapshot));
        snapshot
    }

    pub fn subscribe(&self) -> SnapshotStream {
        SnapshotStream::new(self.tx.subscribe())
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
