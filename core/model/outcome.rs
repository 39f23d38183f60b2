use serde::{Deserialize, Serialize};

/// The terminal state of a node in an execution plan. Every node ends up in exactly one.
///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The unit of work ran.
    Executed,

    /// Nothing changed since the last recorded run, or the unit reported it had nothing to do.
    UpToDate,

    /// Outputs were unpacked from a build cache entry.
    FromCache,

    /// The unit of work, or the checks before it, failed.
    Failed { error: String },

    /// The node was never attempted.
    Skipped(SkipReason),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// One of the node's dependencies failed or was itself skipped.
    DependencyFailed,

    /// Another node failed and the build stopped scheduling new work.
    BuildFailed,

    /// The build was cancelled before this node started.
    Cancelled,
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }

    /// Whether dependents of a node with this outcome may run.
    pub fn allows_dependents(&self) -> bool {
        !matches!(self, Outcome::Failed { .. } | Outcome::Skipped(_))
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Executed => "EXECUTED".fmt(f),
            Outcome::UpToDate => "UP-TO-DATE".fmt(f),
            Outcome::FromCache => "FROM-CACHE".fmt(f),
            Outcome::Failed { .. } => "FAILED".fmt(f),
            Outcome::Skipped(SkipReason::DependencyFailed) => "SKIPPED (dependency failed)".fmt(f),
            Outcome::Skipped(SkipReason::BuildFailed) => "SKIPPED (build failed)".fmt(f),
            Outcome::Skipped(SkipReason::Cancelled) => "SKIPPED (cancelled)".fmt(f),
        }
    }
}
