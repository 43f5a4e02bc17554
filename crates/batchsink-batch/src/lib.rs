// batchsink-batch - Pending groups and batch building
//
// Accumulates requests per destination, deduplicates them by an optional key
// and closes a group into a Batch once it reaches the configured size.
// Each destination has its own lock so unrelated destinations never contend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use batchsink_core::{Batch, BatchId, CompletionHandle, KeyExtractor, WriteRequest};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

mod pending_group;

use pending_group::{Insert, PendingGroup};

type Slot<R> = Arc<Mutex<PendingGroup<R>>>;

/// Thread-safe set of open groups, one per destination.
///
/// Closed batches are handed to the caller's `on_close` sink while the
/// destination's lock is still held, so batches of one destination reach the
/// sink in the order they were closed.
pub struct PendingGroups<R> {
    batch_size: usize,
    key_extractor: Option<KeyExtractor<R>>,
    slots: RwLock<HashMap<Arc<str>, Slot<R>>>,
    next_batch_id: AtomicU64,
}

impl<R> PendingGroups<R> {
    /// `batch_size` must be positive; callers validate configuration first.
    pub fn new(batch_size: usize, key_extractor: Option<KeyExtractor<R>>) -> Self {
        Self {
            batch_size: batch_size.max(1),
            key_extractor,
            slots: RwLock::new(HashMap::new()),
            next_batch_id: AtomicU64::new(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Insert a request and return the handle of the batch it will ship in.
    ///
    /// Closes at most one batch, passed to `on_close` before returning.
    pub fn add<F>(&self, request: WriteRequest<R>, mut on_close: F) -> CompletionHandle
    where
        F: FnMut(Batch<R>),
    {
        let (destination, payload) = request.into_parts();
        let key = self
            .key_extractor
            .as_ref()
            .and_then(|extract| extract(&payload))
            .filter(|key| !key.is_empty());

        let slot = self.slot(&destination);
        let mut group = slot.lock();

        let payload = match group.insert(key, payload) {
            Insert::Appended | Insert::Replaced => None,
            Insert::Collided { key, payload } => Some((key, payload)),
        };

        if let Some((key, payload)) = payload {
            // Ship what is already pending so one batch never carries two
            // writes for the same key, then start over with the newest write.
            let rest = std::mem::replace(&mut *group, PendingGroup::new());
            let batch = self.close(rest, &destination);
            debug!(
                batch_id = %batch.id(),
                destination = %destination,
                size = batch.len(),
                key = %key,
                "Closed group on duplicate key"
            );
            on_close(batch);
            group.insert(Some(key), payload);
        }

        let handle = group.handle().clone();

        if group.len() >= self.batch_size {
            let full = std::mem::replace(&mut *group, PendingGroup::new());
            let batch = self.close(full, &destination);
            debug!(
                batch_id = %batch.id(),
                destination = %destination,
                size = batch.len(),
                "Closed full group"
            );
            on_close(batch);
        }

        handle
    }

    /// Force-close every non-empty group regardless of size.
    pub fn flush<F>(&self, on_close: F) -> usize
    where
        F: FnMut(Batch<R>),
    {
        self.close_where(|_| true, on_close)
    }

    /// Close groups whose first entry is at least `max_age` old.
    pub fn flush_expired<F>(&self, max_age: Duration, on_close: F) -> usize
    where
        F: FnMut(Batch<R>),
    {
        self.close_where(|group| group.is_expired(max_age), on_close)
    }

    /// Pending request count per destination. Each destination is read under
    /// its own lock.
    pub fn under_construction(&self) -> HashMap<String, usize> {
        let slots = self.slots.read();
        slots
            .iter()
            .map(|(destination, slot)| (destination.to_string(), slot.lock().len()))
            .collect()
    }

    pub fn pending_records(&self) -> usize {
        let slots = self.slots.read();
        slots.values().map(|slot| slot.lock().len()).sum()
    }

    fn close_where<P, F>(&self, mut predicate: P, mut on_close: F) -> usize
    where
        P: FnMut(&PendingGroup<R>) -> bool,
        F: FnMut(Batch<R>),
    {
        let slots = self.slots.read();
        let mut closed = 0;
        for (destination, slot) in slots.iter() {
            let mut group = slot.lock();
            if group.is_empty() || !predicate(&group) {
                continue;
            }
            let taken = std::mem::replace(&mut *group, PendingGroup::new());
            let batch = self.close(taken, destination);
            debug!(
                batch_id = %batch.id(),
                destination = %destination,
                size = batch.len(),
                "Force-closed group"
            );
            on_close(batch);
            closed += 1;
        }
        closed
    }

    fn slot(&self, destination: &Arc<str>) -> Slot<R> {
        if let Some(slot) = self.slots.read().get(destination) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(
            slots
                .entry(Arc::clone(destination))
                .or_insert_with(|| Arc::new(Mutex::new(PendingGroup::new()))),
        )
    }

    fn close(&self, group: PendingGroup<R>, destination: &Arc<str>) -> Batch<R> {
        let id = BatchId::new(self.next_batch_id.fetch_add(1, Ordering::Relaxed));
        group.close(id, Arc::clone(destination))
    }
}
