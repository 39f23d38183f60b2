#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use kiln_core::cache::{BuildCacheController, CacheError, LocalStore, RemoteStore};
use kiln_core::events::EventChannel;
use kiln_core::history::WorkIdentity;
use kiln_core::{
    Config, ImplementationIdentity, InputDeclarations, OutputDeclarations, UnitOfWork, WorkContext,
    WorkId, WorkResult,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A configuration rooted at `workspace` that keeps the local cache in `cache_root`.
pub fn config(workspace: &Path, cache_root: &Path) -> Config {
    Config::builder()
        .workspace_root(workspace)
        .local_cache_root(cache_root)
        .max_workers(4)
        .build()
        .unwrap()
}

/// A cache store that lives in memory and counts how often it is used. It can play the local or
/// the remote role.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<WorkIdentity, Vec<u8>>,
    gets: AtomicUsize,
    puts: AtomicUsize,
    failing: bool,
    failing_puts: bool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A store whose every call fails.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            failing: true,
            ..Self::default()
        })
    }

    /// A store that serves reads but refuses every write.
    pub fn read_only() -> Arc<Self> {
        Arc::new(Self {
            failing_puts: true,
            ..Self::default()
        })
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn fetch(&self, key: &WorkIdentity) -> Result<Option<Vec<u8>>, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(CacheError::RemoteFailed {
                key: key.to_string(),
                error: "connection refused".to_string(),
            });
        }
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    fn save(&self, key: &WorkIdentity, payload: Vec<u8>) -> Result<(), CacheError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.failing || self.failing_puts {
            return Err(CacheError::RemoteFailed {
                key: key.to_string(),
                error: "connection refused".to_string(),
            });
        }
        self.entries.entry(key.clone()).or_insert(payload);
        Ok(())
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, key: &WorkIdentity) -> Result<Option<Vec<u8>>, CacheError> {
        self.fetch(key)
    }

    async fn put(&self, key: &WorkIdentity, payload: &[u8]) -> Result<(), CacheError> {
        self.save(key, payload.to_vec())
    }

    async fn remove(&self, key: &WorkIdentity) -> Result<(), CacheError> {
        self.entries.remove(key);
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
        self.fetch(key)
    }

    async fn put(&self, key: &WorkIdentity, payload: Vec<u8>) -> Result<(), CacheError> {
        self.save(key, payload)
    }
}

pub fn cache_with(
    local: Option<Arc<MemoryStore>>,
    remote: Option<Arc<MemoryStore>>,
    event_channel: Arc<EventChannel>,
) -> BuildCacheController {
    let local = local.map(|s| s as Arc<dyn LocalStore>);
    let remote = remote.map(|s| s as Arc<dyn RemoteStore>);
    BuildCacheController::new(true, local, remote, 2, false, event_channel)
}

/// Copies a single input file into an output directory, prefixing its contents.
#[derive(Debug, Clone)]
pub struct CopyFile {
    id: String,
    input: String,
    output: String,
    fail: bool,
    calls: Arc<AtomicUsize>,
    log: Option<Arc<Mutex<Vec<String>>>>,
    cancel: Option<CancellationToken>,
}

impl CopyFile {
    pub fn new(id: &str, input: &str, output: &str) -> Self {
        Self {
            id: id.to_string(),
            input: input.to_string(),
            output: output.to_string(),
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
            log: None,
            cancel: None,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Append the work id to `log` when executing.
    pub fn logging(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Some(log);
        self
    }

    /// Cancel the build while executing.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn arc(&self) -> Arc<dyn UnitOfWork> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl UnitOfWork for CopyFile {
    fn id(&self) -> WorkId {
        WorkId::new(self.id.clone())
    }

    fn implementation(&self) -> ImplementationIdentity {
        ImplementationIdentity::new("CopyFile", "1")
    }

    fn visit_inputs(&self, inputs: &mut InputDeclarations) {
        inputs.files("source", self.input.clone());
    }

    fn visit_outputs(&self, outputs: &mut OutputDeclarations) {
        outputs.directory("out", self.output.clone());
    }

    async fn execute(&self, ctx: &WorkContext) -> anyhow::Result<WorkResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.id.clone());
        }
        if let Some(token) = &self.cancel {
            token.cancel();
        }
        if self.fail {
            anyhow::bail!("{} could not copy {}", self.id, self.input);
        }

        let source = ctx.resolve(&self.input);
        let contents = tokio::fs::read_to_string(&source).await?;
        let out = ctx.resolve(&self.output);
        tokio::fs::create_dir_all(&out).await?;
        let name = source
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("{} has no file name", self.input))?;
        tokio::fs::write(out.join(name), format!("copied: {}", contents)).await?;
        Ok(WorkResult::DidWork)
    }
}
