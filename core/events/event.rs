use crate::model::Outcome;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteLoadOutcome {
    Hit,
    Miss,
    Failed { error: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteStoreOutcome {
    Stored,
    Failed { error: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEvent {
    LocalLoad {
        key: String,
        hit: bool,
    },
    RemoteLoad {
        key: String,
        outcome: RemoteLoadOutcome,
    },
    LocalStore {
        key: String,
        size: u64,
    },
    RemoteStore {
        key: String,
        outcome: RemoteStoreOutcome,
    },
    RemoteDisabled {
        failures: usize,
    },
    Unpacked {
        key: String,
        entries: usize,
    },
    Packed {
        key: String,
        entries: usize,
        size: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerEvent {
    NodeStarted {
        node: String,
    },
    NodeCompleted {
        node: String,
        outcome: Outcome,
        reason: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkflowEvent {
    BuildStarted(std::time::Instant),
    BuildCompleted(std::time::Instant),
    BuildCancelled(std::time::Instant),
}

impl WorkflowEvent {
    pub(crate) fn build_completed() -> Self {
        Self::BuildCompleted(std::time::Instant::now())
    }
    pub(crate) fn build_started() -> Self {
        Self::BuildStarted(std::time::Instant::now())
    }
    pub(crate) fn build_cancelled() -> Self {
        Self::BuildCancelled(std::time::Instant::now())
    }
}

#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The "nothing happened" event.
    #[default]
    Noop,
    CacheEvent(CacheEvent),
    WorkerEvent(WorkerEvent),
    WorkflowEvent(WorkflowEvent),
}

impl From<CacheEvent> for Event {
    fn from(value: CacheEvent) -> Self {
        Event::CacheEvent(value)
    }
}

impl From<WorkerEvent> for Event {
    fn from(value: WorkerEvent) -> Self {
        Event::WorkerEvent(value)
    }
}

impl From<WorkflowEvent> for Event {
    fn from(value: WorkflowEvent) -> Self {
        Event::WorkflowEvent(value)
    }
}
