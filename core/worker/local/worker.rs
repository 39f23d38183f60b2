use super::LocalSharedContext;
use crate::events::event::WorkerEvent;
use crate::executor::{Executor, WorkOutcome};
use crate::model::Outcome;
use crate::plan::NodeId;
use crate::worker::{NodeReport, TaskQueueError, Worker, WorkerError};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::*;

#[cfg_attr(doc, aquamarine::aquamarine)]
/// A Local build execution worker.
///
/// The `LocalWorker` takes care of running one node at a time out of the `TaskQueue` that lives in
/// the `LocalSharedContext`, handing units of work to its `Executor`.
///
/// It's flow goes:
///
/// ```mermaid
/// graph TD
///   Idle -->|run| loop
///   loop -->|queue finished| stop
///   loop -->|cancellation requested| cancel_queue --> loop
///   loop -->|has next node| execute
///
///   execute
///   --> report_started
///   --> decide_and_run
///   --> report_completed
///   --> complete_node
///   --> loop
///
///   loop -->|no next node| wait
///   wait -->|a node completed| loop
///   wait -->|cancelled| cancel_queue
/// ```
///
pub struct LocalWorker<E: Executor> {
    id: usize,
    ctx: LocalSharedContext,
    executor: E,
    saw_cancellation: bool,
}

#[async_trait(?Send)]
impl<E, ECtx> Worker for LocalWorker<E>
where
    E: Executor<Context = ECtx>,
    ECtx: From<LocalSharedContext>,
{
    type Context = LocalSharedContext;

    fn new(id: usize, ctx: Self::Context) -> Result<Self, WorkerError> {
        let executor = E::new(ctx.clone().into())?;
        Ok(Self {
            id,
            ctx,
            executor,
            saw_cancellation: false,
        })
    }

    async fn run(&mut self) -> Result<(), WorkerError> {
        if let Err(err) = self.poll_until_finished().await {
            // NOTE(@ostera): other workers would otherwise wait for nodes that will never be
            // handed out.
            self.ctx.task_queue.cancel();
            return Err(err);
        }
        Ok(())
    }
}

impl<E: Executor> LocalWorker<E> {
    async fn poll_until_finished(&mut self) -> Result<(), WorkerError> {
        let queue = self.ctx.task_queue.clone();
        let cancellation = self.ctx.cancellation.clone();
        loop {
            let notified = queue.notified();

            if queue.is_finished() {
                debug!("Worker {} is done", self.id);
                return Ok(());
            }

            if !self.saw_cancellation && cancellation.is_cancelled() {
                self.cancel();
                continue;
            }

            match queue.next()? {
                Some(node) => self.handle_node(node).await?,
                None => {
                    let watching = !self.saw_cancellation;
                    tokio::select! {
                        _ = notified => (),
                        _ = cancellation.cancelled(), if watching => self.cancel(),
                    }
                }
            }
        }
    }

    fn cancel(&mut self) {
        info!("Build cancelled, waiting for running work to finish");
        self.saw_cancellation = true;
        self.ctx.task_queue.cancel();
    }

    #[tracing::instrument(name = "LocalWorker::handle_node", skip(self))]
    async fn handle_node(&self, node: NodeId) -> Result<(), WorkerError> {
        let plan_node = self
            .ctx
            .task_queue
            .plan()
            .node(node)
            .ok_or(TaskQueueError::UnknownNode(node))?;
        let name = plan_node.name();

        self.ctx.event_channel.send(WorkerEvent::NodeStarted {
            node: name.clone(),
        });

        let started_at = Instant::now();
        let WorkOutcome { outcome, reason } = match plan_node.work() {
            None => WorkOutcome {
                outcome: Outcome::UpToDate,
                reason: None,
            },
            Some(work) => {
                match AssertUnwindSafe(self.executor.execute(work.as_ref()))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => WorkOutcome {
                        outcome: Outcome::Failed {
                            error: format!("{} panicked", name),
                        },
                        reason: None,
                    },
                }
            }
        };
        let elapsed = started_at.elapsed();

        match &outcome {
            Outcome::Failed { error } => error!("{} failed: {}", name, error),
            outcome => debug!("{} finished: {}", name, outcome),
        }

        self.ctx.event_channel.send(WorkerEvent::NodeCompleted {
            node: name.clone(),
            outcome: outcome.clone(),
            reason: reason.as_ref().map(|r| r.to_string()),
        });

        self.ctx.task_queue.complete(NodeReport {
            node,
            name,
            outcome,
            reason,
            elapsed,
        })?;

        Ok(())
    }
}
