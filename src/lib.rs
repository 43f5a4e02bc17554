// batchsink - Request batching engine for remote-store sinks
//
// Accumulates individual writes into bounded per-destination batches,
// deduplicates them by an optional key, and delivers each batch through an
// injected executor. Every caller gets a handle that resolves when the batch
// holding its request completes.
//
// Crates:
// - batchsink-core: requests, batches, completion handles, errors
// - batchsink-batch: pending groups and batch building
// - batchsink-config: configuration sources and validation
// - batchsink-producer: producer, dispatch queue, dispatcher workers

mod init;

pub use init::init_tracing;

pub use batchsink_batch::PendingGroups;
pub use batchsink_config::{LogFormat, LoggingConfig, ProducerConfig, ShutdownMode, SinkConfig};
pub use batchsink_core::{
    Batch, BatchError, BatchExecutor, BatchId, BatchOutcome, BatchResponse, CompletionHandle,
    ErrorCode, KeyExtractor, ProducerError, WriteRequest,
};
pub use batchsink_producer::{DispatchQueue, Producer, ProducerBuilder};
