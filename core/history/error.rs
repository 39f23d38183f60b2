use std::path::PathBuf;
use thiserror::*;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Could not create the history directory at {path:?} due to {err:?}")]
    CouldNotCreateDir { path: PathBuf, err: std::io::Error },

    #[error("Could not move the corrupted history at {path:?} out of the way due to {err:?}")]
    CouldNotMoveCorruptedStore { path: PathBuf, err: std::io::Error },

    #[error(transparent)]
    DatabaseError(rusqlite::Error),

    #[error("Could not serialize history entry: {0:?}")]
    SerializationError(serde_json::Error),

    #[error("History for {work_id} was already recorded in this build")]
    AlreadyRecorded { work_id: String },

    #[error("The history store lock was poisoned")]
    LockPoisoned,
}

impl From<rusqlite::Error> for HistoryError {
    fn from(err: rusqlite::Error) -> Self {
        Self::DatabaseError(err)
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err)
    }
}
