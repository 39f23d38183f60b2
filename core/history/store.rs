use super::{ExecutionHistoryEntry, HistoryError};
use crate::model::WorkId;
use crate::sync::{Arc, KeyedLocks, Mutex};
use dashmap::DashSet;
use rusqlite::OptionalExtension;
use std::path::{Path, PathBuf};
use tracing::*;

const CREATE_HISTORY_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS history (
        work_id TEXT PRIMARY KEY,
        entry TEXT NOT NULL
    );
";

/// The on-disk record of the last execution of every unit of work, keyed by work id.
///
/// Reads never fail: anything that can't be read back is reported as missing history, which
/// forces the unit of work to execute. Writes to the same work id are serialized, and each work
/// id is recorded at most once per build.
///
#[derive(Debug)]
pub struct HistoryStore {
    sql: Arc<Mutex<rusqlite::Connection>>,
    locks: KeyedLocks<WorkId>,
    recorded: DashSet<WorkId>,
}

impl HistoryStore {
    #[tracing::instrument(name = "HistoryStore::open")]
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| HistoryError::CouldNotCreateDir {
                path: parent.to_path_buf(),
                err,
            })?;
        }

        let sql = match Self::connect(path) {
            Ok(sql) => sql,
            Err(err) => {
                let corrupt = corrupt_path(path);
                warn!(
                    "Could not open execution history at {:?} ({}), moving it to {:?} and starting over",
                    path, err, corrupt
                );
                std::fs::rename(path, &corrupt).map_err(|err| {
                    HistoryError::CouldNotMoveCorruptedStore {
                        path: path.to_path_buf(),
                        err,
                    }
                })?;
                Self::connect(path)?
            }
        };

        Ok(Self::from_connection(sql))
    }

    pub fn in_memory() -> Result<Self, HistoryError> {
        let sql = rusqlite::Connection::open_in_memory()?;
        sql.execute(CREATE_HISTORY_TABLE, ())?;
        Ok(Self::from_connection(sql))
    }

    fn connect(path: &Path) -> Result<rusqlite::Connection, rusqlite::Error> {
        let sql = rusqlite::Connection::open(path)?;
        sql.execute(CREATE_HISTORY_TABLE, ())?;
        Ok(sql)
    }

    fn from_connection(sql: rusqlite::Connection) -> Self {
        Self {
            sql: Arc::new(Mutex::new(sql)),
            locks: KeyedLocks::new(),
            recorded: DashSet::new(),
        }
    }

    #[tracing::instrument(name = "HistoryStore::load", skip(self))]
    pub fn load(&self, work_id: &WorkId) -> Option<ExecutionHistoryEntry> {
        match self.try_load(work_id) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    "Ignoring unreadable execution history for {}: {}",
                    work_id, err
                );
                None
            }
        }
    }

    fn try_load(&self, work_id: &WorkId) -> Result<Option<ExecutionHistoryEntry>, HistoryError> {
        let json: Option<String> = {
            let sql = self.sql.lock().map_err(|_| HistoryError::LockPoisoned)?;
            sql.query_row(
                "SELECT entry FROM history WHERE work_id = ?1",
                rusqlite::params![work_id.as_str()],
                |row| row.get(0),
            )
            .optional()?
        };

        match json {
            None => Ok(None),
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        }
    }

    /// Replace whatever was recorded for the entry's work id.
    #[tracing::instrument(name = "HistoryStore::record", skip(self, entry), fields(work_id = %entry.work_id))]
    pub fn record(&self, entry: &ExecutionHistoryEntry) -> Result<(), HistoryError> {
        let lock = self.locks.lock_for(&entry.work_id);
        let _held = lock.lock().map_err(|_| HistoryError::LockPoisoned)?;

        if self.recorded.contains(&entry.work_id) {
            return Err(HistoryError::AlreadyRecorded {
                work_id: entry.work_id.to_string(),
            });
        }

        let json = serde_json::to_string(entry)?;
        {
            let sql = self.sql.lock().map_err(|_| HistoryError::LockPoisoned)?;
            sql.execute(
                "INSERT OR REPLACE INTO history (work_id, entry) VALUES (?1, ?2)",
                rusqlite::params![entry.work_id.as_str(), json],
            )?;
        }

        self.recorded.insert(entry.work_id.clone());
        debug!("Recorded {:?} for {}", entry.status, entry.work_id);
        Ok(())
    }

    #[cfg(test)]
    fn write_raw(&self, work_id: &str, json: &str) {
        let sql = self.sql.lock().unwrap();
        sql.execute(
            "INSERT OR REPLACE INTO history (work_id, entry) VALUES (?1, ?2)",
            rusqlite::params![work_id, json],
        )
        .unwrap();
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    path.with_file_name(name)
}
