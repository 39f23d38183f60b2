use crate::cache::BuildCacheController;
use crate::events::EventChannel;
use crate::history::HistoryStore;
use crate::Config;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ExecutorContext {
    pub(crate) workspace_root: PathBuf,
    pub(crate) build_invocation_id: Uuid,
    pub(crate) current_user: String,
    pub(crate) rerun_all: bool,
    pub(crate) history: Arc<HistoryStore>,
    pub(crate) cache: Arc<BuildCacheController>,
    pub(crate) event_channel: Arc<EventChannel>,
}

impl ExecutorContext {
    pub fn new(
        config: &Config,
        history: Arc<HistoryStore>,
        cache: Arc<BuildCacheController>,
    ) -> Self {
        Self {
            workspace_root: config.workspace_root().clone(),
            build_invocation_id: config.build_invocation_id(),
            current_user: config.current_user().to_string(),
            rerun_all: config.rerun_all(),
            history,
            cache,
            event_channel: config.event_channel(),
        }
    }
}
