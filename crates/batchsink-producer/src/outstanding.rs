// Outstanding-record accounting
//
// Counts accepted `add` calls whose batch has not resolved yet.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub(crate) struct OutstandingRecords {
    count: AtomicUsize,
    released: Notify,
}

impl OutstandingRecords {
    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn acquire(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Take one slot only if the count is below `limit`.
    pub fn try_acquire(&self, limit: usize) -> Result<(), usize> {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < limit).then_some(current + 1)
            })
            .map(|_| ())
    }

    pub fn release(&self, records: usize) {
        let previous = self.count.fetch_sub(records, Ordering::AcqRel);
        debug_assert!(previous >= records, "outstanding count underflow");
        self.released.notify_waiters();
    }

    /// Wait until the count drops below `limit`.
    pub async fn wait_below(&self, limit: usize) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.get() < limit {
                return;
            }
            notified.await;
        }
    }
}
