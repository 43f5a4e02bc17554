// Shared test doubles for producer integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use batchsink::{Batch, BatchExecutor, BatchId, CompletionHandle};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};

/// Payload used across tests: a logical item key plus a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: String,
    pub version: u32,
}

pub fn item(key: &str, version: u32) -> Item {
    Item {
        key: key.to_string(),
        version,
    }
}

#[derive(Debug, Clone)]
pub struct Delivered {
    pub id: BatchId,
    pub destination: String,
    pub items: Vec<Item>,
}

/// Records every batch it is asked to write and always succeeds.
#[derive(Default)]
pub struct RecordingExecutor {
    delivered: Mutex<Vec<Delivered>>,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().clone()
    }

    pub fn delivered_items(&self) -> usize {
        self.delivered.lock().iter().map(|d| d.items.len()).sum()
    }
}

#[async_trait]
impl BatchExecutor<Item> for RecordingExecutor {
    async fn execute(&self, batch: &Batch<Item>) -> Result<()> {
        self.delivered.lock().push(Delivered {
            id: batch.id(),
            destination: batch.destination().to_string(),
            items: batch.requests().to_vec(),
        });
        Ok(())
    }
}

/// Fails every batch for the given destination.
pub struct FailingExecutor {
    pub destination: &'static str,
}

#[async_trait]
impl BatchExecutor<Item> for FailingExecutor {
    async fn execute(&self, batch: &Batch<Item>) -> Result<()> {
        if batch.destination() == self.destination {
            bail!("ProvisionedThroughputExceeded on {}", batch.destination());
        }
        Ok(())
    }
}

/// Holds each batch inside `execute` until a permit is released, reporting
/// the batch id as soon as execution starts.
pub struct GatedExecutor {
    gate: Semaphore,
    started: mpsc::UnboundedSender<BatchId>,
}

impl GatedExecutor {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<BatchId>) {
        let (started, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                gate: Semaphore::new(0),
                started,
            }),
            rx,
        )
    }

    pub fn release(&self, batches: usize) {
        self.gate.add_permits(batches);
    }
}

#[async_trait]
impl BatchExecutor<Item> for GatedExecutor {
    async fn execute(&self, batch: &Batch<Item>) -> Result<()> {
        let _ = self.started.send(batch.id());
        self.gate.acquire().await?.forget();
        Ok(())
    }
}

pub fn by_key(item: &Item) -> Option<String> {
    Some(item.key.clone())
}

/// Await a handle with a generous upper bound so a bug fails instead of hanging.
pub async fn settle(handle: &CompletionHandle) -> batchsink::BatchOutcome {
    tokio::time::timeout(Duration::from_secs(5), handle.done())
        .await
        .expect("handle did not resolve in time")
}
