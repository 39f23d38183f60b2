use crate::config::Config;
use crate::events::EventChannel;
use crate::executor::ExecutorContext;
use crate::sync::Arc;
use crate::worker::{Context, TaskQueue, TaskResults};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Everything a [super::LocalWorker] reaches for while walking a plan. Cloning is cheap, all the
/// fields are shared handles.
///
#[derive(Clone)]
pub struct LocalSharedContext {
    pub(crate) task_queue: Arc<TaskQueue>,
    pub(crate) task_results: Arc<TaskResults>,
    pub(crate) executor_context: ExecutorContext,
    pub(crate) cancellation: CancellationToken,
    pub(crate) event_channel: Arc<EventChannel>,
}

impl LocalSharedContext {
    #[instrument(
        name = "LocalSharedContext::new",
        skip(config, task_queue, task_results, executor_context, cancellation)
    )]
    pub fn new(
        config: &Config,
        task_queue: Arc<TaskQueue>,
        task_results: Arc<TaskResults>,
        executor_context: ExecutorContext,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            task_queue,
            task_results,
            executor_context,
            cancellation,
            event_channel: config.event_channel(),
        }
    }
}

impl Context for LocalSharedContext {
    fn results(&self) -> Arc<TaskResults> {
        self.task_results.clone()
    }
}

impl From<LocalSharedContext> for ExecutorContext {
    fn from(ctx: LocalSharedContext) -> Self {
        ctx.executor_context
    }
}
