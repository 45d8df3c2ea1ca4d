// ── Snapshot subscriptions ──

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::ParameterSnapshot;

/// A subscription to published snapshots.
///
/// Provides point-in-time access plus change notification via
/// [`changed`](Self::changed) or by converting into a `Stream`.
pub struct SnapshotStream {
    current: Arc<ParameterSnapshot>,
    receiver: watch::Receiver<Arc<ParameterSnapshot>>,
}

impl SnapshotStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<ParameterSnapshot>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot as of creation or the last `changed()`.
    pub fn current(&self) -> &Arc<ParameterSnapshot> {
        &self.current
    }

    pub fn latest(&self) -> Arc<ParameterSnapshot> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next publication. Returns `None` once the
    /// coordinator has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<ParameterSnapshot>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Yields the current snapshot first, then every publication.
    pub fn into_stream(self) -> SnapshotWatchStream {
        SnapshotWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

pub struct SnapshotWatchStream {
    inner: WatchStream<Arc<ParameterSnapshot>>,
}

impl Stream for SnapshotWatchStream {
    type Item = Arc<ParameterSnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
