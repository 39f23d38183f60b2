use crate::events::EventChannel;
use crate::sync::Arc;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::*;
use url::Url;
use uuid::Uuid;

/// What to do with the rest of the plan once a node fails.
///
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop scheduling new nodes as soon as one fails. Nodes already running finish normally.
    #[default]
    FailFast,

    /// Keep executing every branch that does not depend on a failed node.
    Continue,
}

/// A collection of flags and options that affect how Kiln runs a single build.
///
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(error = "ConfigError"))]
pub struct Config {
    /// The root against which relative input and output paths are resolved.
    #[builder(setter(into), default = "self.default_workspace_root()")]
    workspace_root: PathBuf,

    /// The root of kiln's operating directory. By default this is `<workspace_root>/.kiln`
    #[builder(setter(into), default = "self.default_kiln_root()")]
    kiln_root: PathBuf,

    /// The location of the execution history database.
    #[builder(setter(into), default = "self.default_history_path()")]
    history_path: PathBuf,

    /// The location of the local build cache.
    #[builder(setter(into), default = "self.default_local_cache_root()")]
    local_cache_root: PathBuf,

    /// The maximum number of local workers to spawn in the local worker pool.
    #[builder(default = "self.default_max_workers()")]
    max_workers: usize,

    #[builder(default)]
    failure_policy: FailurePolicy,

    /// Master switch for loading from and storing to the build cache.
    #[builder(default = "true")]
    build_cache_enabled: bool,

    /// The base URL of an HTTP remote build cache.
    #[builder(setter(into, strip_option), default = "None")]
    remote_cache_url: Option<Url>,

    /// Whether results are pushed to the remote build cache.
    #[builder(default = "false")]
    remote_push: bool,

    /// How many remote cache errors we tolerate before disabling it for the rest of the build.
    #[builder(default = "self.default_remote_max_failures()")]
    remote_max_failures: usize,

    /// Fail the node instead of treating remote cache load errors as misses.
    ///
    /// Storing stays best effort: a remote store error is only logged and the node keeps its
    /// outcome.
    #[builder(default = "false")]
    remote_fail_fast: bool,

    /// Never access the network, but continue working if possible.
    #[builder(default = "false")]
    offline: bool,

    /// Execute every unit of work regardless of its history, without loading from the cache.
    #[builder(default = "false")]
    rerun_all: bool,

    /// Identifies this build in the origin metadata of the cache entries it creates.
    #[builder(default = "self.default_build_invocation_id()")]
    build_invocation_id: Uuid,

    /// The current user executing kiln
    #[builder(setter(into), default = "self.default_current_user()")]
    current_user: String,

    /// The time at which this configuration was created. We will use this to compute the total
    /// build time.
    #[builder(default = "self.default_created_at()")]
    created_at: Instant,

    /// The HTTP Client to be used across the application.
    /// NOTE(@ostera): this is safe to clone since it is really an [Arc] to a client pool.
    #[builder(default = "self.default_http_client()")]
    http_client: reqwest::Client,

    /// The Event Channel be used across the application.
    #[builder(default = "self.default_event_channel()")]
    event_channel: Arc<EventChannel>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    pub fn kiln_root(&self) -> &PathBuf {
        &self.kiln_root
    }

    pub fn history_path(&self) -> &PathBuf {
        &self.history_path
    }

    pub fn local_cache_root(&self) -> &PathBuf {
        &self.local_cache_root
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers.max(1)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub fn build_cache_enabled(&self) -> bool {
        self.build_cache_enabled
    }

    pub fn remote_cache_url(&self) -> Option<&Url> {
        self.remote_cache_url.as_ref()
    }

    pub fn remote_push(&self) -> bool {
        self.remote_push
    }

    pub fn remote_max_failures(&self) -> usize {
        self.remote_max_failures
    }

    pub fn remote_fail_fast(&self) -> bool {
        self.remote_fail_fast
    }

    pub fn offline(&self) -> bool {
        self.offline
    }

    pub fn rerun_all(&self) -> bool {
        self.rerun_all
    }

    pub fn build_invocation_id(&self) -> Uuid {
        self.build_invocation_id
    }

    pub fn current_user(&self) -> &str {
        self.current_user.as_ref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    pub fn event_channel(&self) -> Arc<EventChannel> {
        self.event_channel.clone()
    }
}

impl ConfigBuilder {
    fn _workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| self.default_workspace_root())
    }

    fn _kiln_root(&self) -> PathBuf {
        self.kiln_root
            .clone()
            .unwrap_or_else(|| self.default_kiln_root())
    }

    fn default_workspace_root(&self) -> PathBuf {
        PathBuf::from(".")
    }

    fn default_kiln_root(&self) -> PathBuf {
        self._workspace_root().join(".kiln")
    }

    fn default_history_path(&self) -> PathBuf {
        self._kiln_root().join("history.db")
    }

    fn default_local_cache_root(&self) -> PathBuf {
        self._kiln_root().join("cache")
    }

    fn default_max_workers(&self) -> usize {
        num_cpus::get()
    }

    fn default_remote_max_failures(&self) -> usize {
        3
    }

    fn default_build_invocation_id(&self) -> Uuid {
        Uuid::new_v4()
    }

    fn default_current_user(&self) -> String {
        whoami::username()
    }

    fn default_created_at(&self) -> Instant {
        Instant::now()
    }

    fn default_http_client(&self) -> reqwest::Client {
        reqwest::Client::new()
    }

    fn default_event_channel(&self) -> Arc<EventChannel> {
        EventChannel::new().into()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Attempted to build a Config struct while missing fields: {0:?}")]
    BuilderError(derive_builder::UninitializedFieldError),
}

impl From<derive_builder::UninitializedFieldError> for ConfigError {
    fn from(err: derive_builder::UninitializedFieldError) -> Self {
        Self::BuilderError(err)
    }
}
