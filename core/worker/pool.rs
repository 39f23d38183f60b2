use super::*;
use crate::Config;
use std::marker::PhantomData;
use tokio_util::task::LocalPoolHandle;
use tracing::*;

/// The WorkerPool spins up a pool of workers that can execute work.
///
/// This pool is _lazy_ and will only spin up workers at execution time. However, at that time it
/// is _eager_, and will spin up as many workers as allowed in `Config.max_workers`.
///
#[derive(Debug)]
pub struct WorkerPool<W: Worker> {
    worker_pool: LocalPoolHandle,
    _worker: PhantomData<W>,
}

impl<W> WorkerPool<W>
where
    W: Worker + 'static,
{
    #[tracing::instrument(name = "WorkerPool::new", skip(config))]
    pub fn new(config: &Config) -> Self {
        Self {
            worker_pool: LocalPoolHandle::new(config.max_workers()),
            _worker: PhantomData::default(),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.worker_pool.num_threads()
    }

    /// Run one worker per thread until they all return, and collect their results.
    ///
    #[tracing::instrument(name = "WorkerPool::execute", skip(self, ctx))]
    pub async fn execute(&self, ctx: W::Context) -> Result<Arc<TaskResults>, WorkerPoolError> {
        let workers: Vec<_> = (0..self.num_workers())
            .map(|id| self.spawn_worker(id, ctx.clone()))
            .collect();

        for result in futures::future::join_all(workers).await {
            result??;
        }

        debug!("All {} workers finished", self.num_workers());
        Ok(ctx.results())
    }

    fn spawn_worker(
        &self,
        id: usize,
        ctx: W::Context,
    ) -> tokio::task::JoinHandle<Result<(), WorkerPoolError>> {
        self.worker_pool.spawn_pinned(move || async move {
            let mut worker = W::new(id, ctx)?;
            worker.run().await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct CountingContext {
        started: Arc<AtomicUsize>,
        results: Arc<TaskResults>,
    }

    impl Context for CountingContext {
        fn results(&self) -> Arc<TaskResults> {
            self.results.clone()
        }
    }

    struct CountingWorker(CountingContext);

    #[async_trait(?Send)]
    impl Worker for CountingWorker {
        type Context = CountingContext;

        fn new(_id: usize, ctx: CountingContext) -> Result<Self, WorkerError> {
            Ok(Self(ctx))
        }

        async fn run(&mut self) -> Result<(), WorkerError> {
            self.0.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenWorker;

    #[async_trait(?Send)]
    impl Worker for BrokenWorker {
        type Context = CountingContext;

        fn new(_id: usize, _ctx: CountingContext) -> Result<Self, WorkerError> {
            Ok(Self)
        }

        async fn run(&mut self) -> Result<(), WorkerError> {
            Err(TaskQueueError::Poisoned.into())
        }
    }

    fn ctx() -> CountingContext {
        CountingContext {
            started: Arc::new(AtomicUsize::new(0)),
            results: Arc::new(TaskResults::new()),
        }
    }

    #[tokio::test]
    async fn one_worker_runs_per_configured_slot() {
        let config = Config::builder().max_workers(3).build().unwrap();
        let pool: WorkerPool<CountingWorker> = WorkerPool::new(&config);
        let ctx = ctx();
        pool.execute(ctx.clone()).await.unwrap();
        assert_eq!(ctx.started.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn worker_errors_are_returned() {
        let config = Config::builder().max_workers(2).build().unwrap();
        let pool: WorkerPool<BrokenWorker> = WorkerPool::new(&config);
        assert_matches!(
            pool.execute(ctx()).await,
            Err(WorkerPoolError::WorkerError(WorkerError::TaskQueueError(_)))
        );
    }
}
