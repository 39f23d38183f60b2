use super::TaskQueueError;
use crate::executor::ExecutorError;
use thiserror::*;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    ExecutorError(ExecutorError),

    #[error(transparent)]
    TaskQueueError(TaskQueueError),
}

impl From<ExecutorError> for WorkerError {
    fn from(err: ExecutorError) -> Self {
        Self::ExecutorError(err)
    }
}

impl From<TaskQueueError> for WorkerError {
    fn from(err: TaskQueueError) -> Self {
        Self::TaskQueueError(err)
    }
}

#[derive(Error, Debug)]
pub enum WorkerPoolError {
    #[error(transparent)]
    WorkerError(WorkerError),

    #[error("A worker stopped unexpectedly: {0}")]
    WorkerStopped(tokio::task::JoinError),
}

impl From<WorkerError> for WorkerPoolError {
    fn from(err: WorkerError) -> Self {
        Self::WorkerError(err)
    }
}

impl From<tokio::task::JoinError> for WorkerPoolError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::WorkerStopped(err)
    }
}
