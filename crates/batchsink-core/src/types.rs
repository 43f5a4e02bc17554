// Requests, batches and outcomes
//
// A request targets one destination; requests for the same destination are
// grouped and shipped together as a Batch.

use std::fmt;
use std::sync::Arc;

use crate::error::BatchError;
use crate::handle::CompletionHandle;

/// Derives the dedup key of a payload. `None` or an empty key opts the
/// payload out of dedup.
pub type KeyExtractor<R> = Arc<dyn Fn(&R) -> Option<String> + Send + Sync>;

/// Outcome delivered to every waiter on a batch's handle.
pub type BatchOutcome = Result<BatchResponse, BatchError>;

/// Unique identifier assigned to a batch when its group closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(u64);

impl BatchId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single write addressed to a destination (table, stream, ...).
#[derive(Debug, Clone)]
pub struct WriteRequest<R> {
    destination: Arc<str>,
    payload: R,
}

impl<R> WriteRequest<R> {
    pub fn new(destination: impl Into<Arc<str>>, payload: R) -> Self {
        Self {
            destination: destination.into(),
            payload,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn payload(&self) -> &R {
        &self.payload
    }

    pub fn into_parts(self) -> (Arc<str>, R) {
        (self.destination, self.payload)
    }
}

/// Successful delivery of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchResponse {
    pub batch_id: BatchId,
    /// Number of payloads shipped (after dedup).
    pub batch_size: usize,
}

/// Closed, immutable set of payloads for one destination.
///
/// `accepted` counts the `add` calls this batch acknowledges, which exceeds
/// `len()` when dedup dropped superseded payloads.
///
/// A batch dropped before its handle is resolved fails the handle with
/// [`BatchError::Shutdown`].
pub struct Batch<R> {
    id: BatchId,
    destination: Arc<str>,
    requests: Vec<R>,
    accepted: usize,
    handle: CompletionHandle,
}

impl<R> Batch<R> {
    pub fn new(
        id: BatchId,
        destination: Arc<str>,
        requests: Vec<R>,
        accepted: usize,
        handle: CompletionHandle,
    ) -> Self {
        Self {
            id,
            destination,
            requests,
            accepted,
            handle,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn requests(&self) -> &[R] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn handle(&self) -> &CompletionHandle {
        &self.handle
    }

    pub fn response(&self) -> BatchResponse {
        BatchResponse {
            batch_id: self.id,
            batch_size: self.requests.len(),
        }
    }
}

impl<R> Drop for Batch<R> {
    fn drop(&mut self) {
        self.handle.resolve_if_pending(Err(BatchError::Shutdown));
    }
}

impl<R> fmt::Debug for Batch<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("id", &self.id)
            .field("destination", &self.destination)
            .field("len", &self.requests.len())
            .field("accepted", &self.accepted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(handle: CompletionHandle) -> Batch<&'static str> {
        Batch::new(BatchId::new(1), Arc::from("orders"), vec!["a"], 1, handle)
    }

    #[test]
    fn test_unsettled_batch_fails_handle_on_drop() {
        let handle = CompletionHandle::new();
        drop(batch(handle.clone()));
        assert!(matches!(handle.try_outcome(), Some(Err(BatchError::Shutdown))));
    }

    #[test]
    fn test_settled_batch_keeps_outcome_on_drop() {
        let handle = CompletionHandle::new();
        let settled = batch(handle.clone());
        handle.resolve(Ok(settled.response())).unwrap();
        drop(settled);

        let response = handle.try_outcome().unwrap().unwrap();
        assert_eq!(response.batch_size, 1);
    }
}
