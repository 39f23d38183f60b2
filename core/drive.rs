use super::*;
use crate::cache::{
    BuildCacheController, DirectoryLocalStore, HttpRemoteStore, LocalStore, RemoteStore,
};
use crate::events::event::WorkflowEvent;
use crate::executor::{ExecutorContext, WorkExecutor};
use crate::history::{HistoryError, HistoryStore};
use crate::plan::ExecutionPlan;
use crate::worker::local::{LocalSharedContext, LocalWorker};
use crate::worker::{ExecutionResult, TaskQueue, TaskResults, WorkerPool, WorkerPoolError};
use std::sync::Arc;
use std::time::Instant;
use thiserror::*;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, *};

type DefaultWorker = LocalWorker<WorkExecutor>;

/// # Kiln
///
/// This struct orchestrates a single build: it opens the execution history, sets up the build
/// cache stores, and walks an [ExecutionPlan] with a [WorkerPool].
///
/// A `Kiln` is consumed by `execute`. Every build gets a fresh one, so history and cache
/// interactions are never shared across builds.
///
pub struct Kiln {
    config: Config,
    history: Arc<HistoryStore>,
    cache: Arc<BuildCacheController>,
    worker_pool: WorkerPool<DefaultWorker>,
    cancellation: CancellationToken,
}

impl Kiln {
    #[instrument(name = "Kiln::new", skip(config))]
    pub fn new(config: Config) -> Result<Self, KilnError> {
        let cache = Self::default_cache(&config);
        Self::with_cache(config, cache)
    }

    /// Start a build that uses an already configured build cache.
    #[instrument(name = "Kiln::with_cache", skip(config, cache))]
    pub fn with_cache(config: Config, cache: BuildCacheController) -> Result<Self, KilnError> {
        let history = Arc::new(HistoryStore::open(config.history_path())?);
        let worker_pool = WorkerPool::new(&config);

        Ok(Self {
            config,
            history,
            cache: Arc::new(cache),
            worker_pool,
            cancellation: CancellationToken::new(),
        })
    }

    fn default_cache(config: &Config) -> BuildCacheController {
        if !config.build_cache_enabled() {
            return BuildCacheController::disabled(config.event_channel());
        }

        let local: Arc<dyn LocalStore> =
            Arc::new(DirectoryLocalStore::new(config.local_cache_root().clone()));

        let remote: Option<Arc<dyn RemoteStore>> = match config.remote_cache_url() {
            Some(url) if config.offline() => {
                debug!("Running offline, the remote cache at {} will not be used", url);
                None
            }
            Some(url) => Some(Arc::new(HttpRemoteStore::new(
                config.http_client().clone(),
                url.clone(),
                true,
                config.remote_push(),
            ))),
            None => None,
        };

        BuildCacheController::new(
            true,
            Some(local),
            remote,
            config.remote_max_failures(),
            config.remote_fail_fast(),
            config.event_channel(),
        )
    }

    /// A token that cancels this build. Nodes already running finish, every other node is
    /// reported as skipped.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute every node in the `plan`, respecting its dependencies.
    ///
    #[instrument(name = "Kiln::execute", skip(self, plan), fields(nodes = plan.len()))]
    pub async fn execute(self, plan: ExecutionPlan) -> Result<ExecutionResult, KilnError> {
        let event_channel = self.config.event_channel();
        event_channel.send(WorkflowEvent::build_started());
        let started_at = Instant::now();

        let task_results = Arc::new(TaskResults::new());
        let task_queue = Arc::new(TaskQueue::new(
            Arc::new(plan),
            task_results.clone(),
            self.config.failure_policy(),
        ));

        let executor_context =
            ExecutorContext::new(&self.config, self.history.clone(), self.cache.clone());

        let shared_ctx = LocalSharedContext::new(
            &self.config,
            task_queue.clone(),
            task_results,
            executor_context,
            self.cancellation.clone(),
        );

        let results = self.worker_pool.execute(shared_ctx).await;
        self.cache.close().await;
        let results = results?;

        let cancelled = task_queue.was_cancelled();
        let result = results.finish(cancelled, started_at.elapsed());

        if cancelled {
            event_channel.send(WorkflowEvent::build_cancelled());
        } else {
            event_channel.send(WorkflowEvent::build_completed());
        }

        info!(
            "Build {} finished in {:?}: {} nodes, {} failed{}",
            self.config.build_invocation_id(),
            self.config.created_at().elapsed(),
            result.reports().len(),
            result.failures().len(),
            if cancelled { " (cancelled)" } else { "" },
        );

        Ok(result)
    }
}

#[derive(Error, Debug)]
pub enum KilnError {
    #[error(transparent)]
    HistoryError(HistoryError),

    #[error(transparent)]
    WorkerPoolError(WorkerPoolError),
}

impl From<HistoryError> for KilnError {
    fn from(err: HistoryError) -> Self {
        Self::HistoryError(err)
    }
}

impl From<WorkerPoolError> for KilnError {
    fn from(err: WorkerPoolError) -> Self {
        Self::WorkerPoolError(err)
    }
}
