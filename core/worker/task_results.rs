use crate::executor::ExecutionReason;
use crate::model::Outcome;
use crate::plan::NodeId;
use dashmap::DashMap;
use std::time::Duration;

/// What happened to a single node of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub node: NodeId,
    pub name: String,
    pub outcome: Outcome,
    pub reason: Option<ExecutionReason>,
    pub elapsed: Duration,
}

impl NodeReport {
    pub(crate) fn skipped(node: NodeId, name: String, outcome: Outcome) -> Self {
        Self {
            node,
            name,
            outcome,
            reason: None,
            elapsed: Duration::ZERO,
        }
    }
}

/// The reports collected by the workers while a plan is executing.
///
#[derive(Debug, Default)]
pub struct TaskResults {
    reports: DashMap<NodeId, NodeReport>,
}

impl TaskResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn add_report(&self, report: NodeReport) {
        self.reports.insert(report.node, report);
    }

    pub fn get(&self, node: NodeId) -> Option<NodeReport> {
        self.reports.get(&node).map(|r| r.value().clone())
    }

    pub fn has_report(&self, node: NodeId) -> bool {
        self.reports.contains_key(&node)
    }

    /// Collect every report, in plan order.
    pub fn finish(&self, cancelled: bool, elapsed: Duration) -> ExecutionResult {
        let mut reports: Vec<NodeReport> = self.reports.iter().map(|r| r.value().clone()).collect();
        reports.sort_by_key(|r| r.node);
        ExecutionResult {
            reports,
            cancelled,
            elapsed,
        }
    }
}

/// The result of executing a whole plan: one report per node.
///
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    reports: Vec<NodeReport>,
    cancelled: bool,
    elapsed: Duration,
}

impl ExecutionResult {
    pub fn reports(&self) -> &[NodeReport] {
        &self.reports
    }

    pub fn report(&self, name: &str) -> Option<&NodeReport> {
        self.reports.iter().find(|r| r.name == name)
    }

    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.report(name).map(|r| &r.outcome)
    }

    pub fn failures(&self) -> Vec<&NodeReport> {
        self.reports
            .iter()
            .filter(|r| r.outcome.is_failed())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.reports.iter().all(|r| !r.outcome.is_failed())
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Wall-clock time spent executing the plan.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
