use crate::fingerprint::{FingerprintError, PropertyFingerprints, TreeFingerprint};
use crate::model::{Normalization, OutputDeclarations};
use std::path::Path;
use tracing::*;

/// Captures the current state of the outputs a unit of work declares.
///
/// Taking a snapshot never touches the file system beyond reading it. An output root that does
/// not exist yet is an empty tree, and outputs declared as untracked are only listed by name.
///
pub struct OutputSnapshotter;

impl OutputSnapshotter {
    #[tracing::instrument(name = "OutputSnapshotter::snapshot_outputs", skip(outputs))]
    pub fn snapshot_outputs(
        workspace_root: &Path,
        outputs: &OutputDeclarations,
    ) -> Result<PropertyFingerprints, FingerprintError> {
        outputs.validate()?;

        let mut snapshot = PropertyFingerprints::new();
        for property in outputs.properties() {
            if !property.is_tracked() {
                snapshot.mark_untracked(property.name());
                continue;
            }

            let root = workspace_root.join(property.root());
            match TreeFingerprint::snapshot(&root, Normalization::Relative) {
                Ok(tree) => snapshot.insert(property.name(), tree.fingerprint()),
                Err(FingerprintError::MissingRoot { .. }) => {
                    snapshot.insert(property.name(), TreeFingerprint::empty().fingerprint())
                }
                Err(err) => {
                    warn!(
                        "Output property {:?} will not be tracked in this build: {}",
                        property.name(),
                        err
                    );
                    snapshot.mark_untracked(property.name());
                }
            }
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn missing_outputs_are_empty_trees() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let mut outputs = OutputDeclarations::new();
        outputs.directory("classes", "out");
        outputs.file("jar", "build/app.jar");

        let snapshot = OutputSnapshotter::snapshot_outputs(tmp.path(), &outputs).unwrap();
        let empty = TreeFingerprint::empty().fingerprint();
        assert_eq!(snapshot.get("classes"), Some(&empty));
        assert_eq!(snapshot.get("jar"), Some(&empty));
    }

    #[test]
    fn untracked_outputs_are_listed_but_not_fingerprinted() {
        let tmp = assert_fs::TempDir::new().unwrap();
        tmp.child("out/Foo.class").write_str("bytecode").unwrap();
        let mut outputs = OutputDeclarations::new();
        outputs.directory("classes", "out").untracked();

        let snapshot = OutputSnapshotter::snapshot_outputs(tmp.path(), &outputs).unwrap();
        assert!(snapshot.get("classes").is_none());
        assert!(snapshot.untracked().contains("classes"));
    }

    #[test]
    fn deleting_an_output_file_changes_the_snapshot() {
        let tmp = assert_fs::TempDir::new().unwrap();
        tmp.child("out/Foo.class").write_str("bytecode").unwrap();
        let mut outputs = OutputDeclarations::new();
        outputs.directory("classes", "out");

        let before = OutputSnapshotter::snapshot_outputs(tmp.path(), &outputs).unwrap();
        std::fs::remove_file(tmp.path().join("out/Foo.class")).unwrap();
        let after = OutputSnapshotter::snapshot_outputs(tmp.path(), &outputs).unwrap();

        assert_eq!(after.changed_since(&before), vec!["classes".to_string()]);
    }

    #[test]
    fn snapshots_do_not_create_anything() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let mut outputs = OutputDeclarations::new();
        outputs.directory("classes", "out");
        OutputSnapshotter::snapshot_outputs(tmp.path(), &outputs).unwrap();
        assert!(!tmp.path().join("out").exists());
    }
}
