//! Background processing of accepted events.
//!
//! # Architecture
//!
//! - The [`Dispatcher`] runs on the request path. It deduplicates, writes the
//!   journal record and pushes a [`Job`] onto a bounded queue.
//! - The [`WorkerPool`] runs a fixed number of tasks that take jobs off the
//!   queue, run the review pipeline and complete the journal record.
//!
//! Different events are processed concurrently with no ordering guarantee.
//! A single idempotency key produces at most one job.
//!
//! # Module Structure
//!
//! - [`dispatch`]: submission path and acknowledgments
//! - [`message`]: the job type passed through the queue
//! - [`pool`]: worker tasks and shutdown

pub mod dispatch;
pub mod message;
pub mod pool;

pub use dispatch::{Acknowledgment, DispatchError, Dispatcher};
pub use message::Job;
pub use pool::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS, ShutdownOutcome, WorkerPool};
