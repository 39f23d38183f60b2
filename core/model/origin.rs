use super::WorkId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Where a set of outputs came from: which build produced them, for which unit of work, by whom,
/// and how long it took to produce them.
///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginMetadata {
    pub build_invocation_id: Uuid,
    pub work_id: WorkId,
    pub cache_key: String,
    pub created_by: String,
    #[serde(with = "crate::util::serde::iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::util::serde::millis")]
    pub execution_time: Duration,
}
