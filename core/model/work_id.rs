use serde::{Deserialize, Serialize};

/// The stable, build-wide unique name of a unit of work, such as `:app:compileJava`.
///
/// Work ids are what the execution history is keyed on, so they must be the same across
/// invocations for the same piece of work.
///
#[derive(Default, Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(String);

impl WorkId {
    pub fn new<I: Into<String>>(id: I) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for WorkId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for WorkId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
