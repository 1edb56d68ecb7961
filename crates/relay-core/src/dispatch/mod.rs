//! Batching queue and the worker pool that executes flushed batches.

pub mod batch;
pub mod pool;

pub use batch::{BatchProcessor, BatchQueue};
pub use pool::WorkerPool;
