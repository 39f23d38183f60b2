use crate::model::PropertyError;
use std::path::PathBuf;
use thiserror::*;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Could not find {path:?} to fingerprint it")]
    MissingRoot { path: PathBuf },

    #[error("Could not read {path:?} due to {err:?}")]
    Unreadable { path: PathBuf, err: std::io::Error },

    #[error("Input property {property:?} points to {path:?}, which does not exist")]
    MissingRequiredInput { property: String, path: PathBuf },

    #[error(transparent)]
    InvalidProperty(PropertyError),
}

impl From<PropertyError> for FingerprintError {
    fn from(err: PropertyError) -> Self {
        Self::InvalidProperty(err)
    }
}
