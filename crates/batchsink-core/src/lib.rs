// batchsink-core - Shared data model for the batching engine
//
// Requests, batches, completion handles, the executor capability and the
// error taxonomy. No batching policy lives here.

pub mod error;
pub mod executor;
pub mod handle;
pub mod types;

pub use error::{BatchError, ErrorCode, ProducerError};
pub use executor::BatchExecutor;
pub use handle::CompletionHandle;
pub use types::{Batch, BatchId, BatchOutcome, BatchResponse, KeyExtractor, WriteRequest};
