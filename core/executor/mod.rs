//! # Incremental Work Execution
//!
//! For every unit of work the [WorkExecutor] first asks the [UpToDateChecker] for a [Decision],
//! then acts on it: nothing for up-to-date work, unpacking a cache entry for cached work, or
//! running the unit and recording its new state otherwise.
//!
mod context;
mod decision;
mod error;

pub use context::*;
pub use decision::*;
pub use error::*;

use crate::cache::{EntryPacker, LoadedOutputs};
use crate::events::event::CacheEvent;
use crate::fingerprint::PropertyFingerprints;
use crate::history::{ExecutionHistoryEntry, ExecutionStatus};
use crate::model::{OriginMetadata, Outcome, UnitOfWork, WorkContext, WorkResult};
use crate::snapshot::OutputSnapshotter;
use async_trait::async_trait;
use std::time::Instant;
use tracing::*;

/// The terminal outcome of a unit of work, and why it had to run if it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkOutcome {
    pub outcome: Outcome,
    pub reason: Option<ExecutionReason>,
}

impl WorkOutcome {
    fn new(outcome: Outcome, reason: Option<ExecutionReason>) -> Self {
        Self { outcome, reason }
    }
}

#[async_trait]
pub trait Executor {
    type Context: Sync + Send + Clone + Sized;

    fn new(ctx: Self::Context) -> Result<Self, ExecutorError>
    where
        Self: Sized;

    async fn execute(&self, work: &dyn UnitOfWork) -> WorkOutcome;
}

pub struct WorkExecutor {
    ctx: ExecutorContext,
}

#[async_trait]
impl Executor for WorkExecutor {
    type Context = ExecutorContext;

    fn new(ctx: ExecutorContext) -> Result<Self, ExecutorError> {
        Ok(Self { ctx })
    }

    #[tracing::instrument(name = "WorkExecutor::execute", skip(self, work), fields(work_id = %work.id()))]
    async fn execute(&self, work: &dyn UnitOfWork) -> WorkOutcome {
        let evaluation = UpToDateChecker::new(&self.ctx).decide(work).await;
        self.run(work, evaluation).await
    }
}

impl WorkExecutor {
    /// Act on a decision taken by the [UpToDateChecker].
    pub async fn run(&self, work: &dyn UnitOfWork, evaluation: Evaluation) -> WorkOutcome {
        let Evaluation { decision, state } = evaluation;

        match decision {
            Decision::Fail { error } => WorkOutcome::new(Outcome::Failed { error }, None),
            Decision::UpToDate => WorkOutcome::new(Outcome::UpToDate, None),
            Decision::FromCache { loaded, reason } => match state {
                Some(state) => self.load_from_cache(work, state, loaded, reason).await,
                None => Self::missing_state(work),
            },
            Decision::Execute(reason) => match state {
                Some(state) => self.execute_work(work, state, reason).await,
                None => Self::missing_state(work),
            },
        }
    }

    fn missing_state(work: &dyn UnitOfWork) -> WorkOutcome {
        WorkOutcome::new(
            Outcome::Failed {
                error: format!("{} was evaluated without any state", work.id()),
            },
            None,
        )
    }

    async fn load_from_cache(
        &self,
        work: &dyn UnitOfWork,
        state: WorkState,
        loaded: LoadedOutputs,
        reason: ExecutionReason,
    ) -> WorkOutcome {
        let unpacked =
            match EntryPacker::unpack(&self.ctx.workspace_root, &state.outputs, &loaded.payload) {
                Ok(unpacked) => unpacked,
                Err(err) => {
                    warn!(
                        "Could not unpack {} for {}, executing it instead: {}",
                        loaded.key, state.work_id, err
                    );
                    self.ctx.cache.evict(&loaded.key).await;
                    return self.execute_work(work, state, reason).await;
                }
            };

        self.ctx.event_channel.send(CacheEvent::Unpacked {
            key: loaded.key.to_string(),
            entries: unpacked.entries,
        });

        let origin = unpacked.origin;
        info!(
            "Loaded {} from the {:?} build cache: key {} was created by {} at {} in build {}, taking {:?}",
            state.work_id,
            loaded.source,
            origin.cache_key,
            origin.created_by,
            origin.created_at.to_rfc3339(),
            origin.build_invocation_id,
            origin.execution_time,
        );

        let outputs = self.snapshot_outputs(&state);
        self.record(&state, outputs, ExecutionStatus::FromCache, Some(origin));

        WorkOutcome::new(Outcome::FromCache, Some(reason))
    }

    async fn execute_work(
        &self,
        work: &dyn UnitOfWork,
        state: WorkState,
        reason: ExecutionReason,
    ) -> WorkOutcome {
        debug!("Executing {} because {}", state.work_id, reason);

        let ctx = WorkContext {
            work_id: state.work_id.clone(),
            workspace_root: self.ctx.workspace_root.clone(),
            build_invocation_id: self.ctx.build_invocation_id,
        };

        let created_at = chrono::Utc::now();
        let started_at = Instant::now();
        let result = work.execute(&ctx).await.map_err(ExecutorError::WorkFailed);
        let execution_time = started_at.elapsed();

        let outputs = self.snapshot_outputs(&state);

        let result = match result {
            Ok(result) => result,
            Err(err) => {
                self.record(&state, outputs, ExecutionStatus::Failed, None);
                return WorkOutcome::new(
                    Outcome::Failed {
                        error: err.to_string(),
                    },
                    Some(reason),
                );
            }
        };

        let origin = OriginMetadata {
            build_invocation_id: self.ctx.build_invocation_id,
            work_id: state.work_id.clone(),
            cache_key: state.cache_key.to_string(),
            created_by: self.ctx.current_user.clone(),
            created_at,
            execution_time,
        };
        self.record(&state, outputs, ExecutionStatus::Success, Some(origin.clone()));

        match result {
            WorkResult::DidWork => {
                if state.cacheable {
                    self.store(&state, &origin).await;
                }
                WorkOutcome::new(Outcome::Executed, Some(reason))
            }
            WorkResult::DidNoWork => WorkOutcome::new(Outcome::UpToDate, Some(reason)),
        }
    }

    async fn store(&self, state: &WorkState, origin: &OriginMetadata) {
        let packed = match EntryPacker::pack(&self.ctx.workspace_root, &state.outputs, origin) {
            Ok(packed) => packed,
            Err(err) => {
                warn!("Could not pack the outputs of {}: {}", state.work_id, err);
                return;
            }
        };

        self.ctx.event_channel.send(CacheEvent::Packed {
            key: state.cache_key.to_string(),
            entries: packed.entries,
            size: packed.payload.len() as u64,
        });

        match self
            .ctx
            .cache
            .maybe_store(&state.cache_key, packed.payload)
            .await
        {
            Ok(true) => debug!("Stored {} as {}", state.work_id, state.cache_key),
            Ok(false) => debug!("{} was not stored in any build cache", state.work_id),
            Err(err) => warn!("Could not store {}: {}", state.work_id, err),
        }
    }

    fn snapshot_outputs(&self, state: &WorkState) -> PropertyFingerprints {
        OutputSnapshotter::snapshot_outputs(&self.ctx.workspace_root, &state.outputs)
            .unwrap_or_else(|err| {
                warn!("Could not snapshot the outputs of {}: {}", state.work_id, err);
                PropertyFingerprints::default()
            })
    }

    fn record(
        &self,
        state: &WorkState,
        outputs: PropertyFingerprints,
        status: ExecutionStatus,
        origin: Option<OriginMetadata>,
    ) {
        let entry = ExecutionHistoryEntry {
            work_id: state.work_id.clone(),
            implementation: state.implementation.clone(),
            cache_key: state.cache_key.clone(),
            inputs: state.inputs.clone(),
            outputs,
            status,
            origin,
        };
        if let Err(err) = self.ctx.history.record(&entry) {
            warn!("Could not record the execution of {}: {}", state.work_id, err);
        }
    }
}
