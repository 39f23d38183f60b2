use std::path::PathBuf;
use thiserror::*;
use url::Url;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    IoError(std::io::Error),

    #[error(transparent)]
    RequestError(reqwest::Error),

    #[error("Remote cache answered {status} for {url}")]
    UnexpectedStatus { url: Url, status: u16 },

    #[error("Could not build a remote cache URL for key {key} due to {err:?}")]
    InvalidUrl { key: String, err: url::ParseError },

    #[error("Remote cache failed for key {key}: {error}")]
    RemoteFailed { key: String, error: String },

    #[error(transparent)]
    PackerError(PackerError),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        Self::RequestError(err)
    }
}

impl From<PackerError> for CacheError {
    fn from(err: PackerError) -> Self {
        Self::PackerError(err)
    }
}

#[derive(Error, Debug)]
pub enum PackerError {
    #[error(transparent)]
    IoError(std::io::Error),

    #[error("Cache entry has no METADATA record")]
    MissingMetadata,

    #[error("Cache entry METADATA could not be read: {0:?}")]
    InvalidMetadata(serde_json::Error),

    #[error("Cache entry contains unexpected path {path:?}")]
    InvalidEntry { path: PathBuf },

    #[error("Cache entry contains outputs for undeclared property {name:?}")]
    UnknownProperty { name: String },

    #[error("Cache entry has no outputs for declared property {name:?}")]
    MissingProperty { name: String },

    #[error("Could not clean output {path:?} before unpacking due to {err:?}")]
    CouldNotCleanOutput { path: PathBuf, err: std::io::Error },
}

impl From<std::io::Error> for PackerError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}

impl From<serde_json::Error> for PackerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err)
    }
}
