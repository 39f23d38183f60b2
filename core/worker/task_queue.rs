use super::*;
use crate::config::FailurePolicy;
use crate::model::{Outcome, SkipReason};
use crate::plan::{ExecutionPlan, NodeId};
use crate::sync::{Mutex, MutexGuard};
use std::collections::VecDeque;
use thiserror::*;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{instrument, *};

#[derive(Error, Debug)]
pub enum TaskQueueError {
    #[error("Node {0} is not part of the plan being executed")]
    UnknownNode(NodeId),

    #[error("Node {0} was completed but it was never started")]
    NotRunning(NodeId),

    #[error("The task queue was poisoned by a panicking worker")]
    Poisoned,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum NodeState {
    Waiting,
    Ready,
    Running,
    Done,
}

#[derive(Debug)]
struct QueueState {
    ready: VecDeque<NodeId>,
    nodes: Vec<NodeState>,

    /// How many upstream nodes each node is still waiting for.
    pending: Vec<usize>,

    /// Set when an upstream dependency (not a must-run-after) did not succeed.
    dependency_failed: Vec<bool>,

    running: usize,
    remaining: usize,

    /// Once set, no new nodes are handed out and everything not yet started is skipped.
    stopping: Option<SkipReason>,
    cancelled: bool,
}

/// The shared ready set of a plan being executed.
///
/// A node is handed out by `next` only once every node it waits for has been reported through
/// `complete`. Reporting a failure marks every dependent (transitively) as skipped, and in
/// fail-fast mode stops handing out new nodes altogether.
///
/// Workers wait on `notified` whenever `next` has nothing for them.
///
#[derive(Debug)]
pub struct TaskQueue {
    plan: Arc<ExecutionPlan>,
    task_results: Arc<TaskResults>,
    failure_policy: FailurePolicy,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl TaskQueue {
    #[instrument(name = "TaskQueue::new", skip(plan, task_results))]
    pub fn new(
        plan: Arc<ExecutionPlan>,
        task_results: Arc<TaskResults>,
        failure_policy: FailurePolicy,
    ) -> Self {
        let len = plan.len();
        let pending: Vec<usize> = plan.node_ids().map(|n| plan.upstream(n).len()).collect();

        let mut nodes = vec![NodeState::Waiting; len];
        let mut ready = VecDeque::new();
        for node in plan.node_ids() {
            if pending[node.index()] == 0 {
                nodes[node.index()] = NodeState::Ready;
                ready.push_back(node);
            }
        }

        let state = QueueState {
            ready,
            nodes,
            pending,
            dependency_failed: vec![false; len],
            running: 0,
            remaining: len,
            stopping: None,
            cancelled: false,
        };

        Self {
            plan,
            task_results,
            failure_policy,
            state: Mutex::new(state),
            notify: Notify::new(),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, QueueState>, TaskQueueError> {
        self.state.lock().map_err(|_| TaskQueueError::Poisoned)
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    /// Take the next eligible node, if any.
    #[instrument(name = "TaskQueue::next", skip(self))]
    pub fn next(&self) -> Result<Option<NodeId>, TaskQueueError> {
        let mut state = self.state()?;
        if state.stopping.is_some() {
            return Ok(None);
        }
        let node = match state.ready.pop_front() {
            Some(node) => node,
            None => return Ok(None),
        };
        state.nodes[node.index()] = NodeState::Running;
        state.running += 1;
        Ok(Some(node))
    }

    /// Report the terminal state of a node handed out by `next`, and release the nodes waiting
    /// on it.
    #[instrument(name = "TaskQueue::complete", skip(self, report), fields(node = %report.node))]
    pub fn complete(&self, report: NodeReport) -> Result<(), TaskQueueError> {
        let node = report.node;
        let mut state = self.state()?;
        match state.nodes.get(node.index()) {
            None => return Err(TaskQueueError::UnknownNode(node)),
            Some(NodeState::Running) => (),
            Some(_) => return Err(TaskQueueError::NotRunning(node)),
        }

        state.nodes[node.index()] = NodeState::Done;
        state.running -= 1;
        state.remaining -= 1;

        let succeeded = report.outcome.allows_dependents();
        if report.outcome.is_failed()
            && self.failure_policy == FailurePolicy::FailFast
            && state.stopping.is_none()
        {
            warn!("{} failed, no new work will be started", report.name);
            state.stopping = Some(SkipReason::BuildFailed);
        }
        self.task_results.add_report(report);

        self.release(&mut state, node, succeeded);
        self.drain_if_stopped(&mut state);
        drop(state);

        self.notify.notify_waiters();
        Ok(())
    }

    /// Stop handing out nodes. Nodes already running finish normally, everything else is
    /// reported as cancelled.
    #[instrument(name = "TaskQueue::cancel", skip(self))]
    pub fn cancel(&self) {
        match self.state() {
            Ok(mut state) => {
                if state.remaining > 0 {
                    state.cancelled = true;
                    if state.stopping.is_none() {
                        state.stopping = Some(SkipReason::Cancelled);
                    }
                    self.drain_if_stopped(&mut state);
                }
            }
            Err(err) => warn!("Could not cancel the build: {}", err),
        }
        self.notify.notify_waiters();
    }

    /// Whether every node has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state().map(|s| s.remaining == 0).unwrap_or(true)
    }

    pub fn was_cancelled(&self) -> bool {
        self.state().map(|s| s.cancelled).unwrap_or(false)
    }

    /// A future that resolves the next time a node completes or the build is cancelled. It
    /// must be created before checking `next`, so no wakeup is lost in between.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    fn release(&self, state: &mut QueueState, node: NodeId, succeeded: bool) {
        let mut done = vec![(node, succeeded)];
        while let Some((node, succeeded)) = done.pop() {
            for (downstream, edge) in self.plan.downstream(node) {
                let idx = downstream.index();
                if !succeeded && edge.propagates_failure() {
                    state.dependency_failed[idx] = true;
                }
                state.pending[idx] -= 1;
                if state.pending[idx] > 0 || state.nodes[idx] != NodeState::Waiting {
                    continue;
                }

                if state.dependency_failed[idx] {
                    debug!("Skipping {} since a dependency failed", downstream);
                    state.nodes[idx] = NodeState::Done;
                    state.remaining -= 1;
                    self.task_results.add_report(NodeReport::skipped(
                        downstream,
                        self.name(downstream),
                        Outcome::Skipped(SkipReason::DependencyFailed),
                    ));
                    done.push((downstream, false));
                } else {
                    state.nodes[idx] = NodeState::Ready;
                    state.ready.push_back(downstream);
                }
            }
        }
    }

    fn drain_if_stopped(&self, state: &mut QueueState) {
        let reason = match state.stopping {
            Some(reason) if state.running == 0 => reason,
            _ => return,
        };

        state.ready.clear();
        for node in self.plan.node_ids() {
            if state.nodes[node.index()] == NodeState::Done {
                continue;
            }
            state.nodes[node.index()] = NodeState::Done;
            self.task_results.add_report(NodeReport::skipped(
                node,
                self.name(node),
                Outcome::Skipped(reason),
            ));
        }
        state.remaining = 0;
    }

    fn name(&self, node: NodeId) -> String {
        self.plan
            .node(node)
            .map(|n| n.name())
            .unwrap_or_else(|| node.to_string())
    }
}
