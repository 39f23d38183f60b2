//! # Execution Plans
//!
//! An [ExecutionPlan] is a directed acyclic graph of nodes. Most nodes wrap a [UnitOfWork], but
//! plans may also contain barriers: named nodes with no work of their own that are only used to
//! group or order other nodes.
//!
//! Two kinds of edges are supported:
//!
//! * `add_dependency(node, dependency)`: `node` waits for `dependency` to reach a terminal state,
//!   and is skipped if `dependency` did not succeed.
//!
//! * `must_run_after(node, other)`: `node` waits for `other` to reach a terminal state, whatever
//!   that state is.
//!
//! Cycles are rejected as soon as the offending edge is added.
//!
mod error;

pub use error::*;

use crate::model::{UnitOfWork, WorkId};
use daggy::{Dag, NodeIndex, Walker};
use fxhash::FxHashMap;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }

    fn node_index(&self) -> NodeIndex {
        NodeIndex::new(self.0)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// The target node needs the source node to have succeeded.
    Dependency,

    /// The target node only needs the source node to have finished.
    MustRunAfter,
}

impl EdgeKind {
    pub fn propagates_failure(&self) -> bool {
        matches!(self, EdgeKind::Dependency)
    }
}

#[derive(Clone, Debug)]
pub enum PlanNode {
    Work(Arc<dyn UnitOfWork>),
    Barrier { name: String },
}

impl PlanNode {
    pub fn name(&self) -> String {
        match self {
            PlanNode::Work(work) => work.id().to_string(),
            PlanNode::Barrier { name } => name.clone(),
        }
    }

    pub fn work(&self) -> Option<&Arc<dyn UnitOfWork>> {
        match self {
            PlanNode::Work(work) => Some(work),
            PlanNode::Barrier { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct ExecutionPlan {
    dag: Dag<PlanNode, EdgeKind>,
    work_ids: FxHashMap<WorkId, NodeId>,
}

impl Default for ExecutionPlan {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self {
            dag: Dag::new(),
            work_ids: FxHashMap::default(),
        }
    }

    #[tracing::instrument(name = "ExecutionPlan::add_work", skip(self, work), fields(work_id = %work.id()))]
    pub fn add_work(&mut self, work: Arc<dyn UnitOfWork>) -> Result<NodeId, PlanError> {
        let work_id = work.id();
        if self.work_ids.contains_key(&work_id) {
            return Err(PlanError::DuplicateWork { work_id });
        }
        let node = NodeId(self.dag.add_node(PlanNode::Work(work)).index());
        self.work_ids.insert(work_id, node);
        Ok(node)
    }

    pub fn add_barrier<N: Into<String>>(&mut self, name: N) -> NodeId {
        NodeId(
            self.dag
                .add_node(PlanNode::Barrier { name: name.into() })
                .index(),
        )
    }

    /// Make `node` depend on `dependency`.
    pub fn add_dependency(&mut self, node: NodeId, dependency: NodeId) -> Result<(), PlanError> {
        self.add_edge(dependency, node, EdgeKind::Dependency)
    }

    /// Make `node` wait for `other` to finish, without depending on its outcome.
    pub fn must_run_after(&mut self, node: NodeId, other: NodeId) -> Result<(), PlanError> {
        self.add_edge(other, node, EdgeKind::MustRunAfter)
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> Result<(), PlanError> {
        self.check(from)?;
        self.check(to)?;
        self.dag
            .add_edge(from.node_index(), to.node_index(), kind)
            .map_err(|_| PlanError::Cycle {
                node: self.dag[to.node_index()].name(),
                after: self.dag[from.node_index()].name(),
            })?;
        Ok(())
    }

    fn check(&self, node: NodeId) -> Result<(), PlanError> {
        if node.index() < self.dag.node_count() {
            Ok(())
        } else {
            Err(PlanError::UnknownNode(node))
        }
    }

    pub fn len(&self) -> usize {
        self.dag.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.dag.node_count() == 0
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.dag.node_count()).map(NodeId)
    }

    pub fn node(&self, node: NodeId) -> Option<&PlanNode> {
        self.dag.node_weight(node.node_index())
    }

    pub fn find(&self, work_id: &WorkId) -> Option<NodeId> {
        self.work_ids.get(work_id).copied()
    }

    /// The nodes that `node` waits for, with the kind of edge between them.
    pub fn upstream(&self, node: NodeId) -> Vec<(NodeId, EdgeKind)> {
        self.dag
            .parents(node.node_index())
            .iter(&self.dag)
            .map(|(edge, parent)| (NodeId(parent.index()), self.dag[edge]))
            .collect()
    }

    /// The nodes waiting for `node`, with the kind of edge between them.
    pub fn downstream(&self, node: NodeId) -> Vec<(NodeId, EdgeKind)> {
        self.dag
            .children(node.node_index())
            .iter(&self.dag)
            .map(|(edge, child)| (NodeId(child.index()), self.dag[edge]))
            .collect()
    }
}
