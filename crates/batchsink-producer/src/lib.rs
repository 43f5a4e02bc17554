// batchsink-producer - Batching producer with background dispatch
//
// caller -> Producer::add -> PendingGroups (dedup/append, close when full)
//        -> DispatchQueue -> Dispatcher workers -> BatchExecutor
//        -> CompletionHandle resolved, outstanding count released

mod dispatcher;
mod outstanding;
mod producer;
mod queue;

pub use batchsink_config::{ProducerConfig, ShutdownMode};
pub use producer::{Producer, ProducerBuilder};
pub use queue::DispatchQueue;
