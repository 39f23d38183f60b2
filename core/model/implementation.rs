use serde::{Deserialize, Serialize};

/// Identifies the logic behind a unit of work: a type name plus a version token.
///
/// Bumping the version invalidates the execution history and the cache entries of every unit
/// implemented by this type, even when none of their declared inputs changed.
///
#[derive(Default, Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ImplementationIdentity {
    type_name: String,
    version: String,
}

impl ImplementationIdentity {
    pub fn new<T, V>(type_name: T, version: V) -> Self
    where
        T: Into<String>,
        V: Into<String>,
    {
        Self {
            type_name: type_name.into(),
            version: version.into(),
        }
    }

    pub fn type_name(&self) -> &str {
        self.type_name.as_ref()
    }

    pub fn version(&self) -> &str {
        self.version.as_ref()
    }
}

impl std::fmt::Display for ImplementationIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.type_name, self.version)
    }
}
