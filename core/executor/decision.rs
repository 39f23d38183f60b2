use super::{ExecutorContext, ExecutorError};
use crate::cache::LoadedOutputs;
use crate::fingerprint::{Fingerprinter, PropertyFingerprints};
use crate::history::{ExecutionHistoryEntry, WorkIdentity};
use crate::model::{
    ImplementationIdentity, InputDeclarations, OutputDeclarations, UnitOfWork, WorkId,
};
use crate::snapshot::OutputSnapshotter;
use serde::{Deserialize, Serialize};
use tracing::*;

/// Why a unit of work could not be considered up to date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionReason {
    NoHistory,
    NoOutputsDeclared,
    ImplementationChanged,
    InputsChanged { properties: Vec<String> },
    InputsUntracked { properties: Vec<String> },
    OutputsChanged { properties: Vec<String> },
    PreviousExecutionFailed,
    Forced,
}

impl std::fmt::Display for ExecutionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionReason::NoHistory => write!(f, "no history is available"),
            ExecutionReason::NoOutputsDeclared => write!(f, "no outputs are declared"),
            ExecutionReason::ImplementationChanged => write!(f, "the implementation has changed"),
            ExecutionReason::InputsChanged { properties } => {
                write!(f, "inputs have changed: {}", properties.join(", "))
            }
            ExecutionReason::InputsUntracked { properties } => {
                write!(f, "inputs are not tracked: {}", properties.join(", "))
            }
            ExecutionReason::OutputsChanged { properties } => {
                write!(f, "outputs have been changed: {}", properties.join(", "))
            }
            ExecutionReason::PreviousExecutionFailed => {
                write!(f, "the previous execution failed")
            }
            ExecutionReason::Forced => write!(f, "a rerun was requested"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Decision {
    UpToDate,
    FromCache {
        loaded: LoadedOutputs,
        reason: ExecutionReason,
    },
    Execute(ExecutionReason),
    Fail {
        error: String,
    },
}

impl Decision {
    pub fn reason(&self) -> Option<&ExecutionReason> {
        match self {
            Decision::FromCache { reason, .. } | Decision::Execute(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Everything learned about a unit of work while deciding what to do with it.
#[derive(Debug, Clone)]
pub struct WorkState {
    pub work_id: WorkId,
    pub implementation: ImplementationIdentity,
    pub inputs: PropertyFingerprints,
    pub outputs: OutputDeclarations,
    pub cache_key: WorkIdentity,
    pub cacheable: bool,
    pub previous: Option<ExecutionHistoryEntry>,
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: Decision,
    pub state: Option<WorkState>,
}

impl Evaluation {
    fn failed(err: ExecutorError) -> Self {
        Self {
            decision: Decision::Fail {
                error: err.to_string(),
            },
            state: None,
        }
    }
}

/// Decides whether a unit of work is up to date, can be loaded from the build cache, or has to
/// execute.
///
/// Inputs are compared before outputs, and outputs before the cache is consulted. Outputs that
/// were changed outside of the build always lead to an execution, never to a cache load, so a
/// stale entry can't silently overwrite them.
///
pub struct UpToDateChecker<'a> {
    ctx: &'a ExecutorContext,
}

impl<'a> UpToDateChecker<'a> {
    pub fn new(ctx: &'a ExecutorContext) -> Self {
        Self { ctx }
    }

    #[tracing::instrument(name = "UpToDateChecker::decide", skip(self, work), fields(work_id = %work.id()))]
    pub async fn decide(&self, work: &dyn UnitOfWork) -> Evaluation {
        let work_id = work.id();
        let implementation = work.implementation();

        let mut input_decls = InputDeclarations::new();
        work.visit_inputs(&mut input_decls);
        let mut outputs = OutputDeclarations::new();
        work.visit_outputs(&mut outputs);

        if let Err(err) = outputs.validate() {
            return Evaluation::failed(err.into());
        }

        let inputs = match Fingerprinter::fingerprint_inputs(&self.ctx.workspace_root, &input_decls)
        {
            Ok(inputs) => inputs,
            Err(err) => return Evaluation::failed(err.into()),
        };

        let cache_key = WorkIdentity::compute(&implementation, &inputs, &outputs);
        let cacheable = self.ctx.cache.is_enabled()
            && work.cacheable()
            && !inputs.has_untracked()
            && !outputs.properties().is_empty()
            && outputs.properties().iter().all(|p| p.is_tracked());

        let previous = if self.ctx.rerun_all {
            None
        } else {
            self.ctx.history.load(&work_id)
        };

        let state = WorkState {
            work_id,
            implementation,
            inputs,
            outputs,
            cache_key,
            cacheable,
            previous,
        };

        if self.ctx.rerun_all {
            return Evaluation {
                decision: Decision::Execute(ExecutionReason::Forced),
                state: Some(state),
            };
        }

        let reason = match self.compare_with_history(&state) {
            Ok(Some(reason)) => reason,
            Ok(None) => {
                debug!("{} is up to date", state.work_id);
                return Evaluation {
                    decision: Decision::UpToDate,
                    state: Some(state),
                };
            }
            Err(err) => return Evaluation::failed(err),
        };

        if matches!(reason, ExecutionReason::OutputsChanged { .. }) || !state.cacheable {
            debug!("{} must execute: {}", state.work_id, reason);
            return Evaluation {
                decision: Decision::Execute(reason),
                state: Some(state),
            };
        }

        let decision = match self.ctx.cache.maybe_load(&state.cache_key).await {
            Ok(Some(loaded)) => {
                debug!("{} can be loaded from the build cache", state.work_id);
                Decision::FromCache { loaded, reason }
            }
            Ok(None) => {
                debug!("{} must execute: {}", state.work_id, reason);
                Decision::Execute(reason)
            }
            Err(err) => Decision::Fail {
                error: err.to_string(),
            },
        };

        Evaluation {
            decision,
            state: Some(state),
        }
    }

    /// Returns `None` when nothing changed since the last successful execution.
    fn compare_with_history(
        &self,
        state: &WorkState,
    ) -> Result<Option<ExecutionReason>, ExecutorError> {
        // nothing to compare against, so it can never be up to date
        if state.outputs.properties().is_empty() {
            return Ok(Some(ExecutionReason::NoOutputsDeclared));
        }

        let previous = match &state.previous {
            None => return Ok(Some(ExecutionReason::NoHistory)),
            Some(previous) => previous,
        };

        if previous.implementation != state.implementation {
            return Ok(Some(ExecutionReason::ImplementationChanged));
        }

        if state.inputs.has_untracked() {
            return Ok(Some(ExecutionReason::InputsUntracked {
                properties: state.inputs.untracked().iter().cloned().collect(),
            }));
        }

        let changed = state.inputs.changed_since(&previous.inputs);
        if !changed.is_empty() {
            return Ok(Some(ExecutionReason::InputsChanged {
                properties: changed,
            }));
        }

        if !previous.status.is_successful() {
            return Ok(Some(ExecutionReason::PreviousExecutionFailed));
        }

        let current =
            OutputSnapshotter::snapshot_outputs(&self.ctx.workspace_root, &state.outputs)?;
        let changed = current.changed_since(&previous.outputs);
        if !changed.is_empty() {
            return Ok(Some(ExecutionReason::OutputsChanged {
                properties: changed,
            }));
        }

        Ok(None)
    }
}
