//! # Fingerprinting
//!
//! Content digests of file trees and values. Everything in the engine that decides whether work
//! is up to date ends up comparing [Fingerprint]s computed here.
//!
mod error;
mod hasher;
mod tree;
mod value;

pub use error::*;
pub use hasher::*;
pub use tree::*;
pub use value::*;

use crate::model::{InputDeclarations, InputKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::*;

/// A hex-encoded SHA-256 digest of a value or a file tree.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new<S: Into<String>>(hash: S) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Fingerprints of a set of named properties, plus the names of the properties that could not
/// be fingerprinted or were excluded from tracking.
///
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFingerprints {
    fingerprints: BTreeMap<String, Fingerprint>,
    untracked: BTreeSet<String>,
}

impl PropertyFingerprints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<N: Into<String>>(&mut self, name: N, fingerprint: Fingerprint) {
        self.fingerprints.insert(name.into(), fingerprint);
    }

    pub fn mark_untracked<N: Into<String>>(&mut self, name: N) {
        self.untracked.insert(name.into());
    }

    pub fn get(&self, name: &str) -> Option<&Fingerprint> {
        self.fingerprints.get(name)
    }

    /// Fingerprints sorted by property name.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Fingerprint)> {
        self.fingerprints.iter()
    }

    pub fn untracked(&self) -> &BTreeSet<String> {
        &self.untracked
    }

    pub fn has_untracked(&self) -> bool {
        !self.untracked.is_empty()
    }

    /// Names of the properties whose fingerprints differ between `self` and `previous`,
    /// including properties present in only one of them.
    pub fn changed_since(&self, previous: &PropertyFingerprints) -> Vec<String> {
        let names: BTreeSet<&String> = self
            .fingerprints
            .keys()
            .chain(previous.fingerprints.keys())
            .collect();
        names
            .into_iter()
            .filter(|name| self.fingerprints.get(*name) != previous.fingerprints.get(*name))
            .cloned()
            .collect()
    }
}

pub struct Fingerprinter;

impl Fingerprinter {
    /// Fingerprint every declared input property.
    ///
    /// Unreadable file inputs do not fail the pass: they are logged and left out as untracked.
    /// A required file input whose root does not exist is an error, while an optional one
    /// fingerprints as an empty tree.
    ///
    #[tracing::instrument(name = "Fingerprinter::fingerprint_inputs", skip(inputs))]
    pub fn fingerprint_inputs(
        workspace_root: &Path,
        inputs: &InputDeclarations,
    ) -> Result<PropertyFingerprints, FingerprintError> {
        inputs.validate()?;

        let mut fingerprints = PropertyFingerprints::new();
        for property in inputs.properties() {
            match property.kind() {
                InputKind::Value(value) => {
                    fingerprints.insert(property.name(), fingerprint_value(value));
                }
                InputKind::Files {
                    root,
                    normalization,
                } => {
                    let path = workspace_root.join(root);
                    match TreeFingerprint::snapshot(&path, *normalization) {
                        Ok(tree) => fingerprints.insert(property.name(), tree.fingerprint()),
                        Err(FingerprintError::MissingRoot { .. }) if property.is_optional() => {
                            fingerprints
                                .insert(property.name(), TreeFingerprint::empty().fingerprint())
                        }
                        Err(FingerprintError::MissingRoot { path }) => {
                            return Err(FingerprintError::MissingRequiredInput {
                                property: property.name().to_string(),
                                path,
                            })
                        }
                        Err(err) => {
                            warn!(
                                "Input property {:?} will not be tracked in this build: {}",
                                property.name(),
                                err
                            );
                            fingerprints.mark_untracked(property.name());
                        }
                    }
                }
            }
        }

        Ok(fingerprints)
    }
}
