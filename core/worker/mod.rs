//! # Parallel worker pools
//!
//! A [WorkerPool] spins up a fixed number of [Worker]s that share a [Context]. Each worker pulls
//! nodes from the shared ready set until every node of the plan has reached a terminal state.
//!

mod error;
pub mod local;
mod pool;
mod task_queue;
mod task_results;

pub use error::*;
pub use pool::*;
pub use task_queue::*;
pub use task_results::*;

use crate::sync::*;
use async_trait::async_trait;

/// State shared by every worker of a pool. The pool hands each worker its own clone and reads the
/// per-node reports back out of it once all of them have stopped.
///
pub trait Context: Sync + Send + Clone + Sized {
    fn results(&self) -> Arc<TaskResults>;
}

/// One of the workers of a [WorkerPool].
///
/// `run` returns once the plan has no more nodes to hand out, or with an error that stops the
/// whole pool. Workers are pinned to a single pool thread so `run` need not be `Send`.
///
#[async_trait(?Send)]
pub trait Worker {
    type Context: Context;

    fn new(id: usize, ctx: Self::Context) -> Result<Self, WorkerError>
    where
        Self: Sized;

    async fn run(&mut self) -> Result<(), WorkerError>;
}
