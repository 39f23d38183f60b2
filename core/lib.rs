//! # Kiln
//!
//! An incremental execution engine. Callers describe their units of work through the
//! [UnitOfWork] trait, wire them into an [ExecutionPlan], and hand the plan to [Kiln::execute]
//! together with a [Config].
//!
//! For every node the engine fingerprints the declared inputs, compares them with the history
//! recorded by the previous run, and then either skips the node, restores its outputs from the
//! build cache, or runs it. The per-node decisions come back as an [ExecutionResult].
//!
//! Units of work are supplied by the caller through the [UnitOfWork] trait. The engine only
//! sees their declared input and output properties and their execution entry point.
//!

pub mod cache;
pub(crate) mod config;
pub(crate) mod drive;
pub mod events;
pub(crate) mod executor;
pub mod fingerprint;
pub mod history;
pub(crate) mod model;
pub mod plan;
pub(crate) mod snapshot;
pub(crate) mod sync;
pub(crate) mod util;
pub(crate) mod worker;

pub use config::*;
pub use drive::*;
pub use executor::{Decision, ExecutionReason, ExecutorError};
pub use model::*;
pub use plan::{ExecutionPlan, NodeId, PlanError};
pub use worker::{ExecutionResult, NodeReport, TaskQueueError, WorkerError, WorkerPoolError};

#[macro_use]
extern crate derive_builder;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;
