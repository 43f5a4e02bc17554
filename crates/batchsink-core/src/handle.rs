// Write-once completion cell shared by every request of a batch
//
// State machine: Pending -> Resolved(outcome). Supports blocking waits,
// async waits, polling and callbacks. Waiters registered after resolution
// observe the terminal outcome immediately.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::error::BatchError;
use crate::types::BatchOutcome;

type Callback = Box<dyn FnOnce(&BatchOutcome) + Send + 'static>;

enum State {
    Pending { callbacks: Vec<Callback> },
    Resolved(BatchOutcome),
}

struct Shared {
    state: Mutex<State>,
    // Blocking waiters
    resolved: Condvar,
    // Async waiters
    notify: Notify,
}

/// Handle returned by `add`; resolves once the batch holding the request
/// completes. Clones share the same cell, and equality is identity.
#[derive(Clone)]
pub struct CompletionHandle {
    shared: Arc<Shared>,
}

impl CompletionHandle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Pending {
                    callbacks: Vec::new(),
                }),
                resolved: Condvar::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// A handle that is already terminal, e.g. for requests refused after shutdown.
    pub fn resolved(outcome: BatchOutcome) -> Self {
        let handle = Self::new();
        *handle.shared.state.lock() = State::Resolved(outcome);
        handle
    }

    /// Transition Pending -> Resolved and wake every waiter.
    ///
    /// Resolving twice is a contract violation and leaves the first outcome
    /// in place.
    pub fn resolve(&self, outcome: BatchOutcome) -> Result<(), BatchError> {
        let callbacks = {
            let mut state = self.shared.state.lock();
            if let State::Resolved(previous) = &*state {
                return Err(BatchError::contract_violation(format!(
                    "completion handle resolved twice (first outcome: {})",
                    describe(previous)
                )));
            }
            match std::mem::replace(&mut *state, State::Resolved(outcome.clone())) {
                State::Pending { callbacks } => callbacks,
                State::Resolved(_) => Vec::new(),
            }
        };
        self.wake(callbacks, &outcome);
        Ok(())
    }

    /// Resolve only if still pending. Returns whether this call resolved it.
    pub fn resolve_if_pending(&self, outcome: BatchOutcome) -> bool {
        let callbacks = {
            let mut state = self.shared.state.lock();
            if matches!(&*state, State::Resolved(_)) {
                return false;
            }
            match std::mem::replace(&mut *state, State::Resolved(outcome.clone())) {
                State::Pending { callbacks } => callbacks,
                State::Resolved(_) => Vec::new(),
            }
        };
        self.wake(callbacks, &outcome);
        true
    }

    fn wake(&self, callbacks: Vec<Callback>, outcome: &BatchOutcome) {
        self.shared.resolved.notify_all();
        self.shared.notify.notify_waiters();
        for callback in callbacks {
            callback(outcome);
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(&*self.shared.state.lock(), State::Resolved(_))
    }

    /// Non-blocking poll.
    pub fn try_outcome(&self) -> Option<BatchOutcome> {
        match &*self.shared.state.lock() {
            State::Resolved(outcome) => Some(outcome.clone()),
            State::Pending { .. } => None,
        }
    }

    /// Block the current thread until resolved.
    ///
    /// Do not call from an async context; use [`CompletionHandle::done`].
    pub fn wait(&self) -> BatchOutcome {
        let mut state = self.shared.state.lock();
        loop {
            if let State::Resolved(outcome) = &*state {
                return outcome.clone();
            }
            self.shared.resolved.wait(&mut state);
        }
    }

    /// Block until resolved or until `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<BatchOutcome> {
        // No representable deadline means no practical bound.
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait());
        };
        let mut state = self.shared.state.lock();
        loop {
            if let State::Resolved(outcome) = &*state {
                return Some(outcome.clone());
            }
            if self
                .shared
                .resolved
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return match &*state {
                    State::Resolved(outcome) => Some(outcome.clone()),
                    State::Pending { .. } => None,
                };
            }
        }
    }

    /// Wait asynchronously until resolved.
    pub async fn done(&self) -> BatchOutcome {
        loop {
            // Register interest before checking state so a resolution in
            // between is not missed.
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.try_outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Run `callback` on resolution; runs immediately if already resolved.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&BatchOutcome) + Send + 'static,
    {
        let outcome = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Pending { callbacks } => {
                    callbacks.push(Box::new(callback));
                    return;
                }
                State::Resolved(outcome) => outcome.clone(),
            }
        };
        callback(&outcome);
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Default for CompletionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CompletionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for CompletionHandle {}

impl fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.shared.state.lock() {
            State::Pending { .. } => "pending".to_string(),
            State::Resolved(outcome) => describe(outcome),
        };
        f.debug_struct("CompletionHandle")
            .field("id", &Arc::as_ptr(&self.shared))
            .field("state", &state)
            .finish()
    }
}

fn describe(outcome: &BatchOutcome) -> String {
    match outcome {
        Ok(response) => format!(
            "success(batch {}, {} records)",
            response.batch_id, response.batch_size
        ),
        Err(err) => format!("failure({})", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BatchId, BatchResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn success(id: u64, size: usize) -> BatchOutcome {
        Ok(BatchResponse {
            batch_id: BatchId::new(id),
            batch_size: size,
        })
    }

    #[test]
    fn test_resolve_once_then_terminal() {
        let handle = CompletionHandle::new();
        assert!(!handle.is_done());
        assert!(handle.try_outcome().is_none());

        handle.resolve(success(1, 3)).unwrap();
        assert!(handle.is_done());
        let response = handle.try_outcome().unwrap().unwrap();
        assert_eq!(response.batch_id, BatchId::new(1));
        assert_eq!(response.batch_size, 3);
    }

    #[test]
    fn test_double_resolution_is_contract_violation() {
        let handle = CompletionHandle::new();
        handle.resolve(success(7, 1)).unwrap();

        let err = handle.resolve(Err(BatchError::Shutdown)).unwrap_err();
        assert!(matches!(err, BatchError::ContractViolation { .. }));

        // First outcome wins
        assert!(handle.wait().is_ok());
    }

    #[test]
    fn test_blocking_waiters_on_other_threads() {
        let handle = CompletionHandle::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let h = handle.clone();
                thread::spawn(move || h.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        handle.resolve(success(2, 25)).unwrap();

        for waiter in waiters {
            let outcome = waiter.join().unwrap();
            assert_eq!(outcome.unwrap().batch_size, 25);
        }
    }

    #[test]
    fn test_wait_timeout_expires_while_pending() {
        let handle = CompletionHandle::new();
        assert!(handle.wait_timeout(Duration::from_millis(10)).is_none());

        handle.resolve(Err(BatchError::Shutdown)).unwrap();
        let outcome = handle.wait_timeout(Duration::from_millis(10)).unwrap();
        assert!(matches!(outcome, Err(BatchError::Shutdown)));
    }

    #[test]
    fn test_wait_timeout_with_unbounded_duration() {
        let handle = CompletionHandle::new();
        let waiter = {
            let h = handle.clone();
            thread::spawn(move || h.wait_timeout(Duration::MAX))
        };

        thread::sleep(Duration::from_millis(20));
        handle.resolve(success(5, 1)).unwrap();

        let outcome = waiter.join().unwrap().unwrap();
        assert_eq!(outcome.unwrap().batch_id, BatchId::new(5));
    }

    #[test]
    fn test_resolve_if_pending_keeps_first_outcome() {
        let handle = CompletionHandle::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        handle.on_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.resolve_if_pending(Err(BatchError::Shutdown)));
        assert!(!handle.resolve_if_pending(success(6, 1)));
        assert!(matches!(handle.try_outcome(), Some(Err(BatchError::Shutdown))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callbacks_before_and_after_resolution() {
        let handle = CompletionHandle::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let early = Arc::clone(&calls);
        handle.on_complete(move |outcome| {
            assert!(outcome.is_ok());
            early.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        handle.resolve(success(3, 1)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let late = Arc::clone(&calls);
        handle.on_complete(move |_| {
            late.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_identity_equality() {
        let a = CompletionHandle::new();
        let b = a.clone();
        let c = CompletionHandle::new();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_async_waiters() {
        let handle = CompletionHandle::new();
        let waiter = {
            let h = handle.clone();
            tokio::spawn(async move { h.done().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.resolve(success(4, 2)).unwrap();

        let outcome = waiter.await.unwrap();
        assert_eq!(outcome.unwrap().batch_id, BatchId::new(4));

        // Late async waiter sees the terminal value immediately
        assert!(handle.done().await.is_ok());
    }
}
