use crate::fingerprint::{ContentHasher, PropertyFingerprints};
use crate::model::{ImplementationIdentity, OutputDeclarations, OutputType};
use serde::{Deserialize, Serialize};

/// The cache key of a unit of work: a digest of its implementation identity, of the
/// fingerprints of all of its inputs, and of the names and types of its declared outputs.
///
/// Identical inputs, outputs and implementation always yield the same identity, which is what
/// the build cache addresses entries by. Two units that declare different outputs never share an
/// entry.
///
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkIdentity(String);

impl WorkIdentity {
    /// Inputs and outputs are hashed sorted by property name, so the order in which they were
    /// declared does not matter.
    pub fn compute(
        implementation: &ImplementationIdentity,
        inputs: &PropertyFingerprints,
        outputs: &OutputDeclarations,
    ) -> Self {
        let mut buf = format!(
            "implementation:{}:{}\n",
            implementation.type_name(),
            implementation.version()
        );
        for (name, fingerprint) in inputs.iter() {
            buf.push_str(&format!("input:{}:{}\n", name, fingerprint));
        }
        for name in inputs.untracked() {
            buf.push_str(&format!("untracked:{}\n", name));
        }
        let mut declared: Vec<(&str, OutputType)> = outputs
            .properties()
            .iter()
            .map(|p| (p.name(), p.output_type()))
            .collect();
        declared.sort();
        for (name, output_type) in declared {
            let kind = match output_type {
                OutputType::File => "file",
                OutputType::Directory => "dir",
            };
            buf.push_str(&format!("output:{}:{}\n", name, kind));
        }
        Self(ContentHasher::hash_bytes(buf))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for WorkIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
