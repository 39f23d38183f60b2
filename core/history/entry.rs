use super::WorkIdentity;
use crate::fingerprint::PropertyFingerprints;
use crate::model::{ImplementationIdentity, OriginMetadata, WorkId};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Success,
    Failed,
    FromCache,
}

impl ExecutionStatus {
    /// Whether the outputs recorded with this status can be trusted as the result of the
    /// recorded inputs.
    pub fn is_successful(&self) -> bool {
        !matches!(self, ExecutionStatus::Failed)
    }
}

/// What we remember about the last execution of a unit of work.
///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHistoryEntry {
    pub work_id: WorkId,
    pub implementation: ImplementationIdentity,
    pub cache_key: WorkIdentity,
    pub inputs: PropertyFingerprints,
    pub outputs: PropertyFingerprints,
    pub status: ExecutionStatus,
    pub origin: Option<OriginMetadata>,
}
