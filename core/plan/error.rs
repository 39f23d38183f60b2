use super::NodeId;
use crate::model::WorkId;
use thiserror::*;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("{work_id} was already added to this plan")]
    DuplicateWork { work_id: WorkId },

    #[error("Node {0} is not part of this plan")]
    UnknownNode(NodeId),

    #[error("Making {node} wait for {after} would introduce a cycle")]
    Cycle { node: String, after: String },
}
