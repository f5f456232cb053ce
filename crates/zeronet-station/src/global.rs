use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

struct Counter {
    count: AtomicUsize,
    drained: Notify,
}

/// Counter of outstanding global resource references.
///
/// Shutdown waits for it to drain before tearing stations down.
#[derive(Clone)]
pub struct GlobalRefs {
    inner: Arc<Counter>,
}

impl GlobalRefs {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Counter {
                count: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
        }
    }

    /// Takes a reference, released when the guard drops.
    pub fn acquire(&self) -> GlobalRef {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
        GlobalRef {
            inner: self.inner.clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Waits until no reference is outstanding.
    pub async fn wait_drained(&self) {
        loop {
            let drained = self.inner.drained.notified();
            if self.count() == 0 {
                return;
            }
            drained.await;
        }
    }
}

impl Default for GlobalRefs {
    fn default() -> Self {
        Self::new()
    }
}

/// One outstanding reference.
pub struct GlobalRef {
    inner: Arc<Counter>,
}

impl Drop for GlobalRef {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}
