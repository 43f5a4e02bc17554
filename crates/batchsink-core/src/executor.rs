// Batch executor capability
//
// Implementations deliver one closed batch to the remote store. Retry and
// backoff belong here, not in the dispatcher.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::Batch;

/// Delivers closed batches to a remote store.
#[async_trait]
pub trait BatchExecutor<R>: Send + Sync + 'static
where
    R: Send + Sync + 'static,
{
    /// Write every payload of `batch`. An error fails the whole batch.
    async fn execute(&self, batch: &Batch<R>) -> Result<()>;
}

#[async_trait]
impl<R, E> BatchExecutor<R> for Arc<E>
where
    R: Send + Sync + 'static,
    E: BatchExecutor<R> + ?Sized,
{
    async fn execute(&self, batch: &Batch<R>) -> Result<()> {
        (**self).execute(batch).await
    }
}
