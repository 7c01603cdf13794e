use std::sync::{Arc, Mutex};

use uuid::Uuid;

/// A server-side change happened somewhere in the pipeline.
#[derive(Debug, Clone)]
pub struct ChangeNotice {
    pub pipeline_id: Uuid,
}

/// A broadcast-style change-notification hub built on flume channels.
///
/// Each call to [`subscribe`] creates a new receiver scoped to one pipeline.
/// The feed is thread-safe and can be cloned cheaply (it wraps its internals
/// in an `Arc`). Dropping a [`ChangeSubscription`] unsubscribes it; dead
/// receivers are pruned on the next publish.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    inner: Arc<Mutex<Vec<(Uuid, flume::Sender<ChangeNotice>)>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for one pipeline's changes.
    pub fn subscribe(&self, pipeline_id: Uuid) -> ChangeSubscription {
        let (tx, rx) = flume::unbounded();
        let mut senders = self.inner.lock().expect("ChangeFeed lock poisoned");
        senders.push((pipeline_id, tx));
        ChangeSubscription { rx }
    }

    /// Publish a change notice to every subscriber of `pipeline_id`.
    pub fn publish(&self, pipeline_id: Uuid) {
        let mut senders = self.inner.lock().expect("ChangeFeed lock poisoned");
        senders.retain(|(scope, tx)| {
            *scope != pipeline_id || tx.send(ChangeNotice { pipeline_id }).is_ok()
        });
    }

    /// Number of live subscribers across all pipelines.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("ChangeFeed lock poisoned").len()
    }
}

/// Receiving end of a pipeline change subscription.
pub struct ChangeSubscription {
    rx: flume::Receiver<ChangeNotice>,
}

impl ChangeSubscription {
    /// Non-blocking poll for the next pending notice.
    pub fn try_recv(&self) -> Option<ChangeNotice> {
        self.rx.try_recv().ok()
    }

    /// Drain all pending notices, returning how many were queued. Coalescing
    /// them is the caller's concern; one refetch covers any number.
    pub fn drain(&self) -> usize {
        let mut n = 0;
        while self.rx.try_recv().is_ok() {
            n += 1;
        }
        n
    }

    /// True when the publishing side has gone away (SubscriptionGap). The
    /// engine treats this as a silent degradation, never a user-facing error.
    pub fn is_disconnected(&self) -> bool {
        self.rx.is_disconnected()
    }
}
