// Pending group accumulation logic
//
// Holds the not-yet-dispatched requests of one destination together with the
// completion handle they will share once the group closes into a Batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use batchsink_core::{Batch, BatchError, BatchId, CompletionHandle};

/// Result of inserting one request into an open group.
#[derive(Debug)]
pub(crate) enum Insert<R> {
    /// New entry appended.
    Appended,
    /// The group's only entry had the same key; its payload was swapped.
    Replaced,
    /// The key matched one of several entries. The superseded entry has been
    /// dropped and the caller must close this group before placing `payload`
    /// in a fresh one.
    Collided { key: String, payload: R },
}

/// Open group of requests for a single destination.
#[derive(Debug)]
pub(crate) struct PendingGroup<R> {
    entries: Vec<(Option<String>, R)>,
    positions: HashMap<String, usize>,
    handle: CompletionHandle,
    accepted: usize,
    opened_at: Option<Instant>,
}

impl<R> PendingGroup<R> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
            handle: CompletionHandle::new(),
            accepted: 0,
            opened_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handle(&self) -> &CompletionHandle {
        &self.handle
    }

    /// Age is measured from the first entry, not from group creation.
    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.opened_at
            .is_some_and(|opened| opened.elapsed() >= max_age)
    }

    pub fn insert(&mut self, key: Option<String>, payload: R) -> Insert<R> {
        let Some(key) = key else {
            self.append(None, payload);
            return Insert::Appended;
        };

        match self.positions.get(&key).copied() {
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.append(Some(key), payload);
                Insert::Appended
            }
            Some(position) if self.entries.len() == 1 => {
                self.entries[position].1 = payload;
                self.accepted += 1;
                Insert::Replaced
            }
            Some(position) => {
                // The superseded call stays counted in `accepted`; it is
                // acknowledged by this group's batch.
                self.entries.remove(position);
                self.positions.remove(&key);
                for slot in self.positions.values_mut() {
                    if *slot > position {
                        *slot -= 1;
                    }
                }
                Insert::Collided { key, payload }
            }
        }
    }

    fn append(&mut self, key: Option<String>, payload: R) {
        if self.entries.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        self.entries.push((key, payload));
        self.accepted += 1;
    }

    pub fn close(mut self, id: BatchId, destination: Arc<str>) -> Batch<R> {
        debug_assert!(!self.entries.is_empty(), "closing an empty group");
        let requests = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(_, payload)| payload)
            .collect();
        let handle = std::mem::take(&mut self.handle);
        Batch::new(id, destination, requests, self.accepted, handle)
    }
}

impl<R> Drop for PendingGroup<R> {
    fn drop(&mut self) {
        // Entries never closed into a batch will not be delivered.
        if !self.entries.is_empty() {
            self.handle.resolve_if_pending(Err(BatchError::Shutdown));
        }
    }
}
