use crate::cache::{CacheError, PackerError};
use crate::fingerprint::FingerprintError;
use crate::history::HistoryError;
use crate::model::PropertyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error(transparent)]
    FingerprintError(FingerprintError),

    #[error(transparent)]
    PropertyError(PropertyError),

    #[error(transparent)]
    CacheError(CacheError),

    #[error(transparent)]
    PackerError(PackerError),

    #[error(transparent)]
    HistoryError(HistoryError),

    #[error("{0:#}")]
    WorkFailed(anyhow::Error),
}

impl From<FingerprintError> for ExecutorError {
    fn from(value: FingerprintError) -> Self {
        ExecutorError::FingerprintError(value)
    }
}

impl From<PropertyError> for ExecutorError {
    fn from(value: PropertyError) -> Self {
        ExecutorError::PropertyError(value)
    }
}

impl From<CacheError> for ExecutorError {
    fn from(value: CacheError) -> Self {
        ExecutorError::CacheError(value)
    }
}

impl From<PackerError> for ExecutorError {
    fn from(value: PackerError) -> Self {
        ExecutorError::PackerError(value)
    }
}

impl From<HistoryError> for ExecutorError {
    fn from(value: HistoryError) -> Self {
        ExecutorError::HistoryError(value)
    }
}
