use super::*;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// What a unit of work reports back after running.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkResult {
    DidWork,
    DidNoWork,
}

/// Handed to a unit of work when it executes.
#[derive(Clone, Debug)]
pub struct WorkContext {
    pub work_id: WorkId,
    pub workspace_root: PathBuf,
    pub build_invocation_id: Uuid,
}

impl WorkContext {
    /// Resolve a declared path against the workspace root.
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.workspace_root.join(path)
    }
}

/// A schedulable piece of build logic with declared inputs and outputs.
///
/// The engine never looks inside a unit of work: it only sees the properties declared through
/// `visit_inputs` and `visit_outputs`, and calls `execute` when the outputs can be neither
/// considered up to date nor loaded from the build cache.
///
/// Both visitors must be deterministic: they are called several times per build.
///
#[async_trait]
pub trait UnitOfWork: Send + Sync + std::fmt::Debug {
    /// The stable identifier of this unit of work.
    fn id(&self) -> WorkId;

    fn implementation(&self) -> ImplementationIdentity;

    fn visit_inputs(&self, inputs: &mut InputDeclarations);

    fn visit_outputs(&self, outputs: &mut OutputDeclarations);

    /// Whether the outputs of this unit may be stored in and loaded from the build cache.
    fn cacheable(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &WorkContext) -> anyhow::Result<WorkResult>;
}
