use super::*;
use crate::events::event::{CacheEvent, RemoteLoadOutcome, RemoteStoreOutcome};
use crate::events::EventChannel;
use crate::history::WorkIdentity;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;
use tracing::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CacheSource {
    Local,
    Remote,
}

#[derive(Debug, Clone)]
pub struct LoadedOutputs {
    pub key: WorkIdentity,
    pub payload: Arc<Vec<u8>>,
    pub source: CacheSource,
}

/// What the first load of a key found. A hit only keeps a weak handle on the payload, so the
/// memo never holds on to outputs nobody is unpacking anymore.
#[derive(Debug, Clone)]
enum LoadMemo {
    Miss,
    Hit {
        source: CacheSource,
        payload: Weak<Vec<u8>>,
    },
}

type LoadDecision = Result<LoadMemo, String>;
type StoreDecision = Result<bool, String>;

/// Loads and stores unit of work outputs through a local and an optional remote build cache.
///
/// The first request for a key decides the outcome for that key for the rest of the build:
/// later requests for the same key wait for it and reuse it without asking any store again.
/// Requests for different keys never wait on each other.
///
/// Only the outcome is remembered. A later request for a hit whose payload has already been
/// dropped reads it back from the local store, which every hit has been written to.
///
#[derive(Debug)]
pub struct BuildCacheController {
    enabled: bool,
    local: Option<Arc<dyn LocalStore>>,
    remote: Option<Arc<dyn RemoteStore>>,
    breaker: DisableOnErrorBreaker,
    remote_fail_fast: bool,
    event_channel: Arc<EventChannel>,
    loads: DashMap<WorkIdentity, Arc<OnceCell<LoadDecision>>>,
    stores: DashMap<WorkIdentity, Arc<OnceCell<StoreDecision>>>,
}

impl BuildCacheController {
    pub fn new(
        enabled: bool,
        local: Option<Arc<dyn LocalStore>>,
        remote: Option<Arc<dyn RemoteStore>>,
        remote_max_failures: usize,
        remote_fail_fast: bool,
        event_channel: Arc<EventChannel>,
    ) -> Self {
        Self {
            enabled,
            local,
            remote,
            breaker: DisableOnErrorBreaker::new(remote_max_failures),
            remote_fail_fast,
            event_channel,
            loads: DashMap::new(),
            stores: DashMap::new(),
        }
    }

    /// A controller that never loads nor stores anything.
    pub fn disabled(event_channel: Arc<EventChannel>) -> Self {
        Self::new(false, None, None, 1, false, event_channel)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && (self.local.is_some() || self.remote.is_some())
    }

    pub fn is_remote_disabled(&self) -> bool {
        self.breaker.is_disabled()
    }

    #[tracing::instrument(name = "BuildCacheController::maybe_load", skip(self))]
    pub async fn maybe_load(&self, key: &WorkIdentity) -> Result<Option<LoadedOutputs>, CacheError> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let cell = self.loads.entry(key.clone()).or_default().value().clone();
        let mut fresh = None;
        let slot = &mut fresh;
        let memo = cell
            .get_or_init(move || async move {
                let loaded = self.load(key).await?;
                let memo = match &loaded {
                    None => LoadMemo::Miss,
                    Some(loaded) => LoadMemo::Hit {
                        source: loaded.source,
                        payload: Arc::downgrade(&loaded.payload),
                    },
                };
                *slot = loaded;
                Ok(memo)
            })
            .await
            .clone()
            .map_err(|error| CacheError::RemoteFailed {
                key: key.to_string(),
                error,
            })?;

        if fresh.is_some() {
            return Ok(fresh);
        }

        match memo {
            LoadMemo::Miss => Ok(None),
            LoadMemo::Hit { source, payload } => Ok(self.reuse(key, source, payload).await),
        }
    }

    /// Forget a loaded entry that could not be used, and drop it from the local store so the
    /// next store of `key` replaces it.
    #[tracing::instrument(name = "BuildCacheController::evict", skip(self))]
    pub async fn evict(&self, key: &WorkIdentity) {
        self.loads.remove(key);
        if let Some(local) = &self.local {
            match local.remove(key).await {
                Ok(()) => debug!("Evicted {} from the local build cache", key),
                Err(err) => warn!("Could not evict {} from the local build cache: {}", key, err),
            }
        }
    }

    #[tracing::instrument(name = "BuildCacheController::maybe_store", skip(self, payload))]
    pub async fn maybe_store(&self, key: &WorkIdentity, payload: Vec<u8>) -> Result<bool, CacheError> {
        if !self.is_enabled() {
            return Ok(false);
        }

        let cell = self.stores.entry(key.clone()).or_default().value().clone();
        cell.get_or_init(|| self.store(key, payload))
            .await
            .clone()
            .map_err(|error| CacheError::RemoteFailed {
                key: key.to_string(),
                error,
            })
    }

    pub async fn close(&self) {
        if let Some(local) = &self.local {
            if let Err(err) = local.close().await {
                warn!("Could not close the local build cache: {}", err);
            }
        }
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.close().await {
                warn!("Could not close the remote build cache: {}", err);
            }
        }
    }

    async fn reuse(
        &self,
        key: &WorkIdentity,
        source: CacheSource,
        payload: Weak<Vec<u8>>,
    ) -> Option<LoadedOutputs> {
        if let Some(payload) = payload.upgrade() {
            return Some(LoadedOutputs {
                key: key.clone(),
                payload,
                source,
            });
        }

        let local = self.local.as_ref()?;
        match local.get(key).await {
            Ok(Some(payload)) => Some(LoadedOutputs {
                key: key.clone(),
                payload: Arc::new(payload),
                source: CacheSource::Local,
            }),
            Ok(None) => {
                debug!("{} is no longer in the local build cache", key);
                None
            }
            Err(err) => {
                warn!("Could not reload {} from the local build cache: {}", key, err);
                None
            }
        }
    }

    async fn load(&self, key: &WorkIdentity) -> Result<Option<LoadedOutputs>, String> {
        if let Some(local) = &self.local {
            match local.get(key).await {
                Ok(Some(payload)) => {
                    self.event_channel.send(CacheEvent::LocalLoad {
                        key: key.to_string(),
                        hit: true,
                    });
                    return Ok(Some(LoadedOutputs {
                        key: key.clone(),
                        payload: Arc::new(payload),
                        source: CacheSource::Local,
                    }));
                }
                Ok(None) => self.event_channel.send(CacheEvent::LocalLoad {
                    key: key.to_string(),
                    hit: false,
                }),
                Err(err) => warn!("Could not load {} from the local build cache: {}", key, err),
            }
        }

        let remote = match &self.remote {
            Some(remote) if remote.pull_enabled() && !self.breaker.is_disabled() => remote,
            _ => return Ok(None),
        };

        match remote.get(key).await {
            Ok(Some(payload)) => {
                self.event_channel.send(CacheEvent::RemoteLoad {
                    key: key.to_string(),
                    outcome: RemoteLoadOutcome::Hit,
                });
                if let Some(local) = &self.local {
                    match local.put(key, &payload).await {
                        Ok(()) => self.event_channel.send(CacheEvent::LocalStore {
                            key: key.to_string(),
                            size: payload.len() as u64,
                        }),
                        Err(err) => warn!(
                            "Could not copy {} from the remote into the local build cache: {}",
                            key, err
                        ),
                    }
                }
                Ok(Some(LoadedOutputs {
                    key: key.clone(),
                    payload: Arc::new(payload),
                    source: CacheSource::Remote,
                }))
            }
            Ok(None) => {
                self.event_channel.send(CacheEvent::RemoteLoad {
                    key: key.to_string(),
                    outcome: RemoteLoadOutcome::Miss,
                });
                Ok(None)
            }
            Err(err) => {
                self.event_channel.send(CacheEvent::RemoteLoad {
                    key: key.to_string(),
                    outcome: RemoteLoadOutcome::Failed {
                        error: err.to_string(),
                    },
                });
                self.remote_failed("load", key, &err)?;
                Ok(None)
            }
        }
    }

    async fn store(&self, key: &WorkIdentity, payload: Vec<u8>) -> StoreDecision {
        let mut stored = false;

        if let Some(local) = &self.local {
            match local.put(key, &payload).await {
                Ok(()) => {
                    stored = true;
                    self.event_channel.send(CacheEvent::LocalStore {
                        key: key.to_string(),
                        size: payload.len() as u64,
                    });
                }
                Err(err) => warn!("Could not store {} in the local build cache: {}", key, err),
            }
        }

        let remote = match &self.remote {
            Some(remote) if remote.push_enabled() && !self.breaker.is_disabled() => remote,
            _ => return Ok(stored),
        };

        match remote.put(key, payload).await {
            Ok(()) => {
                self.event_channel.send(CacheEvent::RemoteStore {
                    key: key.to_string(),
                    outcome: RemoteStoreOutcome::Stored,
                });
                Ok(true)
            }
            Err(err) => {
                self.event_channel.send(CacheEvent::RemoteStore {
                    key: key.to_string(),
                    outcome: RemoteStoreOutcome::Failed {
                        error: err.to_string(),
                    },
                });
                self.remote_failed("store", key, &err)?;
                Ok(stored)
            }
        }
    }

    fn remote_failed(&self, op: &str, key: &WorkIdentity, err: &CacheError) -> Result<(), String> {
        warn!("Could not {} {} with the remote build cache: {}", op, key, err);

        if self.breaker.record_failure() {
            let failures = self.breaker.failures();
            warn!(
                "The remote build cache failed {} times and is disabled for the rest of this build",
                failures
            );
            self.event_channel
                .send(CacheEvent::RemoteDisabled { failures });
        }

        if self.remote_fail_fast {
            return Err(err.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::Event;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<WorkIdentity, Vec<u8>>>,
        gets: AtomicUsize,
        puts: AtomicUsize,
        failing: bool,
    }

    impl MemoryStore {
        fn failing() -> Self {
            Self {
                failing: true,
                ..Default::default()
            }
        }

        fn with(key: &str, payload: &[u8]) -> Self {
            let store = Self::default();
            store
                .entries
                .lock()
                .unwrap()
                .insert(key.into(), payload.to_vec());
            store
        }

        fn contains(&self, key: &str) -> bool {
            self.entries.lock().unwrap().contains_key(&key.into())
        }
    }

    #[async_trait]
    impl LocalStore for MemoryStore {
        async fn get(&self, key: &WorkIdentity) -> Result<Option<Vec<u8>>, CacheError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.failing {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "boom").into());
            }
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn put(&self, key: &WorkIdentity, payload: &[u8]) -> Result<(), CacheError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self.failing {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "boom").into());
            }
            self.entries
                .lock()
                .unwrap()
                .insert(key.clone(), payload.to_vec());
            Ok(())
        }

        async fn remove(&self, key: &WorkIdentity) -> Result<(), CacheError> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteStore for MemoryStore {
        fn pull_enabled(&self) -> bool {
            true
        }

        fn push_enabled(&self) -> bool {
            true
        }

        async fn get(&self, key: &WorkIdentity) -> Result<Option<Vec<u8>>, CacheError> {
            LocalStore::get(self, key).await
        }

        async fn put(&self, key: &WorkIdentity, payload: Vec<u8>) -> Result<(), CacheError> {
            LocalStore::put(self, key, &payload).await
        }
    }

    fn controller(
        local: Arc<MemoryStore>,
        remote: Option<Arc<MemoryStore>>,
        max_failures: usize,
        fail_fast: bool,
    ) -> (BuildCacheController, Arc<EventChannel>) {
        let ec = Arc::new(EventChannel::new());
        let remote = remote.map(|r| r as Arc<dyn RemoteStore>);
        let ctrl = BuildCacheController::new(
            true,
            Some(local as Arc<dyn LocalStore>),
            remote,
            max_failures,
            fail_fast,
            ec.clone(),
        );
        (ctrl, ec)
    }

    #[tokio::test]
    async fn repeated_loads_ask_the_stores_only_once() {
        let local = Arc::new(MemoryStore::default());
        let remote = Arc::new(MemoryStore::default());
        let (ctrl, _) = controller(local.clone(), Some(remote.clone()), 3, false);

        let key: WorkIdentity = "abc".into();
        assert!(ctrl.maybe_load(&key).await.unwrap().is_none());
        assert!(ctrl.maybe_load(&key).await.unwrap().is_none());

        assert_eq!(local.gets.load(Ordering::SeqCst), 1);
        assert_eq!(remote.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_loads_of_one_key_ask_the_stores_only_once() {
        let local = Arc::new(MemoryStore::with("abc", b"payload"));
        let (ctrl, _) = controller(local.clone(), None, 3, false);
        let ctrl = Arc::new(ctrl);

        let key: WorkIdentity = "abc".into();
        let loads = (0..8).map(|_| {
            let ctrl = ctrl.clone();
            let key = key.clone();
            async move { ctrl.maybe_load(&key).await.unwrap() }
        });
        let results = futures::future::join_all(loads).await;

        assert!(results.iter().all(|r| r.is_some()));
        assert_eq!(local.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_stores_write_only_once() {
        let local = Arc::new(MemoryStore::default());
        let remote = Arc::new(MemoryStore::default());
        let (ctrl, _) = controller(local.clone(), Some(remote.clone()), 3, false);

        let key: WorkIdentity = "abc".into();
        assert!(ctrl.maybe_store(&key, b"one".to_vec()).await.unwrap());
        assert!(ctrl.maybe_store(&key, b"two".to_vec()).await.unwrap());

        assert_eq!(local.puts.load(Ordering::SeqCst), 1);
        assert_eq!(remote.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn local_hits_never_reach_the_remote() {
        let local = Arc::new(MemoryStore::with("abc", b"payload"));
        let remote = Arc::new(MemoryStore::default());
        let (ctrl, _) = controller(local, Some(remote.clone()), 3, false);

        let loaded = ctrl.maybe_load(&"abc".into()).await.unwrap().unwrap();
        assert_eq!(loaded.source, CacheSource::Local);
        assert_eq!(remote.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn remote_hits_are_written_through_to_the_local_store() {
        let local = Arc::new(MemoryStore::default());
        let remote = Arc::new(MemoryStore::with("abc", b"payload"));
        let (ctrl, _) = controller(local.clone(), Some(remote), 3, false);

        let loaded = ctrl.maybe_load(&"abc".into()).await.unwrap().unwrap();
        assert_eq!(loaded.source, CacheSource::Remote);
        assert_eq!(*loaded.payload, b"payload".to_vec());
        assert!(local.contains("abc"));
    }

    #[tokio::test]
    async fn loaded_payloads_are_released_once_dropped() {
        let local = Arc::new(MemoryStore::with("abc", b"payload"));
        let (ctrl, _) = controller(local.clone(), None, 3, false);

        let loaded = ctrl.maybe_load(&"abc".into()).await.unwrap().unwrap();
        let weak = Arc::downgrade(&loaded.payload);
        drop(loaded);
        assert!(weak.upgrade().is_none());

        let again = ctrl.maybe_load(&"abc".into()).await.unwrap().unwrap();
        assert_eq!(*again.payload, b"payload".to_vec());
    }

    #[tokio::test]
    async fn dropped_remote_hits_are_read_back_from_the_local_store() {
        let local = Arc::new(MemoryStore::default());
        let remote = Arc::new(MemoryStore::with("abc", b"payload"));
        let (ctrl, _) = controller(local.clone(), Some(remote.clone()), 3, false);

        let first = ctrl.maybe_load(&"abc".into()).await.unwrap().unwrap();
        assert_eq!(first.source, CacheSource::Remote);
        drop(first);

        let second = ctrl.maybe_load(&"abc".into()).await.unwrap().unwrap();
        assert_eq!(second.source, CacheSource::Local);
        assert_eq!(*second.payload, b"payload".to_vec());
        assert_eq!(remote.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn evicted_entries_can_be_replaced() {
        let local = Arc::new(MemoryStore::with("abc", b"garbage"));
        let (ctrl, _) = controller(local.clone(), None, 3, false);
        let key: WorkIdentity = "abc".into();

        assert!(ctrl.maybe_load(&key).await.unwrap().is_some());
        ctrl.evict(&key).await;
        assert!(!local.contains("abc"));

        assert!(ctrl.maybe_store(&key, b"payload".to_vec()).await.unwrap());
        let loaded = ctrl.maybe_load(&key).await.unwrap().unwrap();
        assert_eq!(*loaded.payload, b"payload".to_vec());
    }

    #[tokio::test]
    async fn remote_failures_disable_the_remote() {
        let local = Arc::new(MemoryStore::default());
        let remote = Arc::new(MemoryStore::failing());
        let (ctrl, ec) = controller(local, Some(remote.clone()), 2, false);
        let consumer = ec.consumer();

        for key in ["a", "b", "c", "d"] {
            assert!(ctrl.maybe_load(&key.into()).await.unwrap().is_none());
        }

        assert!(ctrl.is_remote_disabled());
        assert_eq!(remote.gets.load(Ordering::SeqCst), 2);
        // the local store still takes it
        assert!(ctrl.maybe_store(&"e".into(), vec![]).await.unwrap());
        assert_eq!(remote.puts.load(Ordering::SeqCst), 0);

        let disabled: Vec<Event> = consumer
            .drain()
            .into_iter()
            .filter(|e| matches!(e, Event::CacheEvent(CacheEvent::RemoteDisabled { .. })))
            .collect();
        assert_eq!(
            disabled,
            vec![Event::CacheEvent(CacheEvent::RemoteDisabled { failures: 2 })]
        );
    }

    #[tokio::test]
    async fn remote_failures_are_errors_when_failing_fast() {
        let local = Arc::new(MemoryStore::default());
        let remote = Arc::new(MemoryStore::failing());
        let (ctrl, _) = controller(local, Some(remote.clone()), 3, true);

        let key: WorkIdentity = "abc".into();
        assert_matches!(
            ctrl.maybe_load(&key).await,
            Err(CacheError::RemoteFailed { .. })
        );
        assert_matches!(
            ctrl.maybe_load(&key).await,
            Err(CacheError::RemoteFailed { .. })
        );
        assert_eq!(remote.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_remote_stores_still_keep_the_local_copy_when_failing_fast() {
        let local = Arc::new(MemoryStore::default());
        let remote = Arc::new(MemoryStore::failing());
        let (ctrl, _) = controller(local.clone(), Some(remote.clone()), 3, true);

        assert_matches!(
            ctrl.maybe_store(&"abc".into(), b"payload".to_vec()).await,
            Err(CacheError::RemoteFailed { .. })
        );
        assert!(local.contains("abc"));
        assert_eq!(remote.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn local_failures_are_misses() {
        let local = Arc::new(MemoryStore::failing());
        let (ctrl, _) = controller(local, None, 3, false);
        assert!(ctrl.maybe_load(&"abc".into()).await.unwrap().is_none());
        assert!(!ctrl.maybe_store(&"abc".into(), vec![]).await.unwrap());
    }

    #[tokio::test]
    async fn a_disabled_controller_does_nothing() {
        let ctrl = BuildCacheController::disabled(Arc::new(EventChannel::new()));
        assert!(!ctrl.is_enabled());
        assert!(ctrl.maybe_load(&"abc".into()).await.unwrap().is_none());
        assert!(!ctrl.maybe_store(&"abc".into(), vec![]).await.unwrap());
    }
}
