// Producer orchestration
//
// Public entry point: owns the pending groups, the dispatch queue, the
// outstanding-record counter and the background tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use batchsink_batch::PendingGroups;
use batchsink_config::{ProducerConfig, ShutdownMode};
use batchsink_core::{
    Batch, BatchError, BatchExecutor, BatchId, CompletionHandle, KeyExtractor, ProducerError,
    WriteRequest,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dispatcher::{abort, Dispatcher};
use crate::outstanding::OutstandingRecords;
use crate::queue::DispatchQueue;

struct BackgroundTasks {
    workers: Vec<JoinHandle<Result<(), ProducerError>>>,
    linger: Option<(Arc<Notify>, JoinHandle<()>)>,
}

/// Builder for [`Producer`]. The key extractor is code, so it is supplied
/// here rather than through [`ProducerConfig`].
pub struct ProducerBuilder<R> {
    config: ProducerConfig,
    key_extractor: Option<KeyExtractor<R>>,
}

impl<R: Send + Sync + 'static> ProducerBuilder<R> {
    pub fn new(batch_size: usize) -> Self {
        Self::from_config(ProducerConfig {
            batch_size,
            ..ProducerConfig::default()
        })
    }

    pub fn from_config(config: ProducerConfig) -> Self {
        Self {
            config,
            key_extractor: None,
        }
    }

    /// Enable last-write-wins dedup on the derived key.
    pub fn key_extractor<F>(mut self, extract: F) -> Self
    where
        F: Fn(&R) -> Option<String> + Send + Sync + 'static,
    {
        self.key_extractor = Some(Arc::new(extract));
        self
    }

    pub fn shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.config.shutdown_mode = mode;
        self
    }

    pub fn dispatch_workers(mut self, workers: usize) -> Self {
        self.config.dispatch_workers = workers;
        self
    }

    pub fn max_batch_age(mut self, age: Duration) -> Self {
        self.config.max_batch_age_ms = Some(u64::try_from(age.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn max_outstanding_records(mut self, limit: usize) -> Self {
        self.config.max_outstanding_records = Some(limit);
        self
    }

    /// Validate the configuration and start the dispatcher on the current
    /// tokio runtime.
    pub fn build<E>(self, executor: E) -> Result<Producer<R>, ProducerError>
    where
        E: BatchExecutor<R>,
    {
        self.config
            .validate()
            .map_err(|e| ProducerError::invalid_config(format!("{:#}", e)))?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ProducerError::Runtime {
                message: e.to_string(),
            }
        })?;

        let executor: Arc<dyn BatchExecutor<R>> = Arc::new(executor);
        let groups = Arc::new(PendingGroups::new(
            self.config.batch_size,
            self.key_extractor,
        ));
        let queue = Arc::new(DispatchQueue::new());
        let outstanding = Arc::new(OutstandingRecords::default());

        let workers = (0..self.config.dispatch_workers)
            .map(|worker| {
                let dispatcher = Dispatcher {
                    queue: Arc::clone(&queue),
                    executor: Arc::clone(&executor),
                    outstanding: Arc::clone(&outstanding),
                };
                runtime.spawn(dispatcher.run(worker))
            })
            .collect();

        let linger = self.config.max_batch_age().map(|max_age| {
            let stop = Arc::new(Notify::new());
            let task = runtime.spawn(run_linger(
                max_age,
                Arc::clone(&groups),
                Arc::clone(&queue),
                Arc::clone(&outstanding),
                Arc::clone(&stop),
            ));
            (stop, task)
        });

        info!(
            batch_size = self.config.batch_size,
            dispatch_workers = self.config.dispatch_workers,
            shutdown_mode = %self.config.shutdown_mode,
            max_batch_age_ms = self.config.max_batch_age_ms,
            "Producer started"
        );

        Ok(Producer {
            config: self.config,
            groups,
            queue,
            outstanding,
            accepting: RwLock::new(true),
            tasks: Mutex::new(Some(BackgroundTasks { workers, linger })),
        })
    }
}

/// Batching producer shared by concurrent callers.
///
/// `add` groups requests per destination, closes a group into a batch when
/// it reaches the batch size, and hands back the handle of that batch.
/// Batches are delivered by background workers through the injected
/// [`BatchExecutor`].
pub struct Producer<R: Send + Sync + 'static> {
    config: ProducerConfig,
    groups: Arc<PendingGroups<R>>,
    queue: Arc<DispatchQueue<R>>,
    outstanding: Arc<OutstandingRecords>,
    // Held for reading by every add; shutdown takes it for writing so no add
    // can land in a group after the final sweep.
    accepting: RwLock<bool>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl<R: Send + Sync + 'static> Producer<R> {
    pub fn builder(batch_size: usize) -> ProducerBuilder<R> {
        ProducerBuilder::new(batch_size)
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// Accept a request and return the handle of the batch it will ship in.
    ///
    /// Never rejects; after shutdown the returned handle is already failed
    /// with [`BatchError::Shutdown`].
    pub fn add(&self, request: WriteRequest<R>) -> CompletionHandle {
        let accepting = self.accepting.read();
        if !*accepting {
            debug!(
                destination = request.destination(),
                "Refusing request after shutdown"
            );
            return CompletionHandle::resolved(Err(BatchError::Shutdown));
        }
        self.outstanding.acquire();
        self.insert(request)
    }

    /// Like [`Producer::add`], but enforces `max_outstanding_records`.
    pub fn try_add(&self, request: WriteRequest<R>) -> Result<CompletionHandle, ProducerError> {
        let accepting = self.accepting.read();
        if !*accepting {
            return Err(ProducerError::ShutDown);
        }
        match self.config.max_outstanding_records {
            Some(limit) => self
                .outstanding
                .try_acquire(limit)
                .map_err(|outstanding| ProducerError::Backpressure { outstanding, limit })?,
            None => self.outstanding.acquire(),
        }
        Ok(self.insert(request))
    }

    fn insert(&self, request: WriteRequest<R>) -> CompletionHandle {
        self.groups
            .add(request, |batch| enqueue(&self.queue, &self.outstanding, batch))
    }

    /// Close every non-empty group, full or not, and queue the batches.
    /// Does not wait for delivery.
    pub fn flush(&self) -> usize {
        let closed = self
            .groups
            .flush(|batch| enqueue(&self.queue, &self.outstanding, batch));
        if closed > 0 {
            debug!(closed, "Flushed pending groups");
        }
        closed
    }

    /// Close groups whose first request is at least `max_age` old.
    pub fn flush_expired(&self, max_age: Duration) -> usize {
        self.groups
            .flush_expired(max_age, |batch| enqueue(&self.queue, &self.outstanding, batch))
    }

    /// Wait until fewer than `limit` records are outstanding.
    pub async fn wait_for_capacity(&self, limit: usize) {
        self.outstanding.wait_below(limit).await
    }

    /// Stop accepting requests and stop the workers according to the
    /// configured [`ShutdownMode`]. Every handle is resolved once this
    /// returns. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<(), ProducerError> {
        *self.accepting.write() = false;
        let Some(tasks) = self.tasks.lock().take() else {
            return Ok(());
        };

        if let Some((stop, linger)) = tasks.linger {
            stop.notify_one();
            if let Err(err) = linger.await {
                warn!(error = %err, "Batch expiry task failed");
            }
        }

        let mut result = self.stop_intake();
        for (worker, handle) in tasks.workers.into_iter().enumerate() {
            let joined = match handle.await {
                Ok(joined) => joined,
                Err(err) => Err(ProducerError::Worker {
                    worker,
                    source: BatchError::contract_violation(format!(
                        "dispatcher worker did not complete: {}",
                        err
                    )),
                }),
            };
            if let Err(err) = joined {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        // A worker that stopped early leaves its share of the queue behind.
        for batch in self.queue.drain() {
            let aborted = abort(batch, &self.outstanding);
            if result.is_ok() {
                result = aborted;
            }
        }

        info!(
            outstanding = self.outstanding.get(),
            "Producer shut down"
        );
        result
    }

    /// Returns the first contract violation hit while failing undelivered
    /// batches; the remaining batches are still failed.
    fn stop_intake(&self) -> Result<(), ProducerError> {
        let mut result = Ok(());
        let mut fail = |batch: Batch<R>| {
            let aborted = abort(batch, &self.outstanding);
            if result.is_ok() {
                result = aborted;
            }
        };

        match self.config.shutdown_mode {
            ShutdownMode::Drain => {
                self.flush();
                self.queue.close();
            }
            ShutdownMode::Immediate => {
                self.queue.close();
                let aborted = self.groups.flush(&mut fail);
                let queued = self.queue.drain();
                warn!(
                    pending_groups = aborted,
                    queued_batches = queued.len(),
                    "Immediate shutdown; failing undelivered batches"
                );
                queued.into_iter().for_each(&mut fail);
            }
        }
        result
    }

    pub fn is_shut_down(&self) -> bool {
        !*self.accepting.read()
    }

    /// Accepted `add` calls whose batch has not resolved.
    pub fn outstanding_records(&self) -> usize {
        self.outstanding.get()
    }

    /// Pending request count per destination.
    pub fn under_construction(&self) -> HashMap<String, usize> {
        self.groups.under_construction()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queued_batch_ids(&self) -> Vec<BatchId> {
        self.queue.batch_ids()
    }
}

impl<R: Send + Sync + 'static> Drop for Producer<R> {
    fn drop(&mut self) {
        let Some(tasks) = self.tasks.get_mut().take() else {
            return;
        };
        // Without an explicit shutdown the workers are detached: they finish
        // (or fail) the remaining work and exit once the queue is closed.
        *self.accepting.get_mut() = false;
        if let Some((stop, _)) = tasks.linger {
            stop.notify_one();
        }
        if let Err(err) = self.stop_intake() {
            warn!(error = %err, "Producer dropped with a batch it could not settle");
        }
        debug!("Producer dropped without shutdown; dispatcher detached");
    }
}

fn enqueue<R>(queue: &DispatchQueue<R>, outstanding: &OutstandingRecords, batch: Batch<R>) {
    if let Err(batch) = queue.push(batch) {
        // Logged by `complete`; `add` has no error channel.
        abort(batch, outstanding).ok();
    }
}

async fn run_linger<R: Send + Sync + 'static>(
    max_age: Duration,
    groups: Arc<PendingGroups<R>>,
    queue: Arc<DispatchQueue<R>>,
    outstanding: Arc<OutstandingRecords>,
    stop: Arc<Notify>,
) {
    let period = (max_age / 2).max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.notified() => break,
            _ = ticker.tick() => {
                let closed = groups
                    .flush_expired(max_age, |batch| enqueue(&queue, &outstanding, batch));
                if closed > 0 {
                    debug!(closed, "Closed expired groups");
                }
            }
        }
    }
}
