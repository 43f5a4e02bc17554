// Dispatcher workers
//
// Each worker pulls batches off the shared queue in FIFO order, runs the
// executor on one batch at a time and resolves the batch's handle. With more
// than one worker, ordering is FIFO per worker only.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use batchsink_core::{Batch, BatchError, BatchExecutor, BatchOutcome, ProducerError};
use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::outstanding::OutstandingRecords;
use crate::queue::DispatchQueue;

pub(crate) struct Dispatcher<R: Send + Sync + 'static> {
    pub queue: Arc<DispatchQueue<R>>,
    pub executor: Arc<dyn BatchExecutor<R>>,
    pub outstanding: Arc<OutstandingRecords>,
}

impl<R: Send + Sync + 'static> Dispatcher<R> {
    /// Run until the queue is closed and empty.
    ///
    /// Stops early with an error if a handle was already resolved, which
    /// means the engine itself is broken.
    pub async fn run(self, worker: usize) -> Result<(), ProducerError> {
        debug!(worker, "Dispatcher worker started");
        while let Some(batch) = self.queue.next().await {
            let outcome = self.execute(&batch).await;
            if let Err(source) = complete(batch, outcome, &self.outstanding) {
                error!(worker, error = %source, "Dispatcher worker stopping");
                return Err(ProducerError::Worker { worker, source });
            }
        }
        debug!(worker, "Dispatcher worker finished");
        Ok(())
    }

    async fn execute(&self, batch: &Batch<R>) -> BatchOutcome {
        debug!(
            batch_id = %batch.id(),
            destination = batch.destination(),
            size = batch.len(),
            "Dispatching batch"
        );

        match AssertUnwindSafe(self.executor.execute(batch))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Ok(batch.response()),
            Ok(Err(err)) => {
                warn!(
                    batch_id = %batch.id(),
                    destination = batch.destination(),
                    error = %format!("{:#}", err),
                    "Batch executor failed"
                );
                Err(BatchError::executor(err))
            }
            Err(_) => {
                warn!(
                    batch_id = %batch.id(),
                    destination = batch.destination(),
                    "Batch executor panicked"
                );
                Err(BatchError::executor(anyhow::anyhow!(
                    "batch executor panicked while writing batch {}",
                    batch.id()
                )))
            }
        }
    }
}

/// Settle a batch: release its outstanding records, then resolve its handle,
/// so a woken waiter already sees the lower count.
pub(crate) fn complete<R>(
    batch: Batch<R>,
    outcome: BatchOutcome,
    outstanding: &OutstandingRecords,
) -> Result<(), BatchError> {
    outstanding.release(batch.accepted());
    batch.handle().resolve(outcome).inspect_err(|err| {
        error!(batch_id = %batch.id(), error = %err, "Completion handle resolved twice");
    })
}

/// Fail a batch that will never be dispatched.
pub(crate) fn abort<R>(
    batch: Batch<R>,
    outstanding: &OutstandingRecords,
) -> Result<(), ProducerError> {
    warn!(
        batch_id = %batch.id(),
        destination = batch.destination(),
        size = batch.len(),
        "Aborting undelivered batch on shutdown"
    );
    let batch_id = batch.id().get();
    complete(batch, Err(BatchError::Shutdown), outstanding)
        .map_err(|source| ProducerError::Abort { batch_id, source })
}
