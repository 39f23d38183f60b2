use super::CacheError;
use crate::history::WorkIdentity;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::*;

/// A build cache store on the local machine. Keys map to immutable blobs, and storing a key
/// that is already present leaves the existing blob untouched. An entry that turned out to be
/// unusable is dropped with `remove`, after which the key can be stored again.
///
#[async_trait]
pub trait LocalStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &WorkIdentity) -> Result<Option<Vec<u8>>, CacheError>;

    async fn put(&self, key: &WorkIdentity, payload: &[u8]) -> Result<(), CacheError>;

    async fn remove(&self, key: &WorkIdentity) -> Result<(), CacheError>;

    async fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Keeps one file per cache key in a directory.
///
#[derive(Debug, Clone)]
pub struct DirectoryLocalStore {
    root: PathBuf,
}

impl DirectoryLocalStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, key: &WorkIdentity) -> PathBuf {
        self.root.join(key.as_str())
    }
}

#[async_trait]
impl LocalStore for DirectoryLocalStore {
    #[tracing::instrument(name = "DirectoryLocalStore::get", skip(self))]
    async fn get(&self, key: &WorkIdentity) -> Result<Option<Vec<u8>>, CacheError> {
        match fs::read(self.entry_path(key)).await {
            Ok(payload) => Ok(Some(payload)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(name = "DirectoryLocalStore::put", skip(self, payload))]
    async fn put(&self, key: &WorkIdentity, payload: &[u8]) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        if fs::metadata(&path).await.is_ok() {
            debug!("{} is already in the local cache", key);
            return Ok(());
        }

        let tmp_root = self.root.join("_tmp");
        fs::create_dir_all(&tmp_root).await?;

        let tempfile = tempfile::NamedTempFile::new_in(&tmp_root)?;
        let mut outfile = fs::File::from_std(tempfile.reopen()?);
        outfile.write_all(payload).await?;
        outfile.flush().await?;
        outfile.sync_all().await?;

        tempfile.persist(&path).map_err(|err| err.error)?;
        Ok(())
    }

    #[tracing::instrument(name = "DirectoryLocalStore::remove", skip(self))]
    async fn remove(&self, key: &WorkIdentity) -> Result<(), CacheError> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_keys_are_misses() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let store = DirectoryLocalStore::new(tmp.path());
        assert!(store.get(&"abc".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stores_and_loads_payloads() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let store = DirectoryLocalStore::new(tmp.path().join("cache"));
        store.put(&"abc".into(), b"payload").await.unwrap();
        assert_eq!(
            store.get(&"abc".into()).await.unwrap(),
            Some(b"payload".to_vec())
        );
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let store = DirectoryLocalStore::new(tmp.path());
        store.put(&"abc".into(), b"first").await.unwrap();
        store.put(&"abc".into(), b"second").await.unwrap();
        assert_eq!(
            store.get(&"abc".into()).await.unwrap(),
            Some(b"first".to_vec())
        );
    }

    #[tokio::test]
    async fn removed_entries_can_be_stored_again() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let store = DirectoryLocalStore::new(tmp.path());
        store.put(&"abc".into(), b"garbage").await.unwrap();

        store.remove(&"abc".into()).await.unwrap();
        assert!(store.get(&"abc".into()).await.unwrap().is_none());
        // removing twice is fine
        store.remove(&"abc".into()).await.unwrap();

        store.put(&"abc".into(), b"payload").await.unwrap();
        assert_eq!(
            store.get(&"abc".into()).await.unwrap(),
            Some(b"payload".to_vec())
        );
    }
}
