use super::{ContentHasher, Fingerprint, FingerprintError};
use crate::model::Normalization;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryKind {
    Directory,
    File { content_hash: String },
}

/// A single normalized entry of a file tree.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn file<P: Into<String>, H: Into<String>>(path: P, content_hash: H) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File {
                content_hash: content_hash.into(),
            },
        }
    }

    pub fn directory<P: Into<String>>(path: P) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
        }
    }
}

/// The content snapshot of a file or directory tree.
///
/// Entries are kept sorted by normalized path, so the tree fingerprint does not depend on the
/// order in which the file system listed them.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeFingerprint {
    entries: Vec<TreeEntry>,
}

impl TreeFingerprint {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = TreeEntry>,
    {
        let mut entries: Vec<TreeEntry> = entries.into_iter().collect();
        entries.sort();
        Self { entries }
    }

    /// Walk `root` and snapshot everything under it.
    ///
    /// A root that is a single file yields a single entry. Symbolic links are followed.
    ///
    pub fn snapshot(root: &Path, normalization: Normalization) -> Result<Self, FingerprintError> {
        if !root.exists() {
            return Err(FingerprintError::MissingRoot {
                path: root.to_path_buf(),
            });
        }

        let absolute_root = match normalization {
            Normalization::Absolute => {
                std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
            }
            _ => root.to_path_buf(),
        };

        let mut entries = vec![];
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|err| FingerprintError::Unreadable {
                path: err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf()),
                err: err.into(),
            })?;

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let is_root = relative.as_os_str().is_empty();

            if entry.file_type().is_dir() {
                if is_root {
                    continue;
                }
                if let Some(key) = normalize(&absolute_root, relative, normalization, true) {
                    entries.push(TreeEntry::directory(key));
                }
                continue;
            }

            let content_hash = ContentHasher::hash_file(path)?;
            let relative = if is_root {
                PathBuf::from(path.file_name().unwrap_or_default())
            } else {
                relative.to_path_buf()
            };
            let absolute = if is_root {
                absolute_root.clone()
            } else {
                absolute_root.join(&relative)
            };
            let key = match normalization {
                Normalization::Absolute => absolute.to_string_lossy().to_string(),
                _ => normalize(&absolute_root, &relative, normalization, false).unwrap_or_default(),
            };
            entries.push(TreeEntry::file(key, content_hash));
        }

        Ok(Self::from_entries(entries))
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        // every field is length-prefixed, so no path can pass for another entry
        let mut buf = String::from("tree\n");
        for entry in &self.entries {
            match &entry.kind {
                EntryKind::Directory => {
                    buf.push_str(&format!("d{}:{}\n", entry.path.len(), entry.path))
                }
                EntryKind::File { content_hash } => buf.push_str(&format!(
                    "f{}:{}{}:{}\n",
                    entry.path.len(),
                    entry.path,
                    content_hash.len(),
                    content_hash
                )),
            }
        }
        Fingerprint::new(ContentHasher::hash_bytes(buf))
    }
}

/// Turn a path relative to the root into the key used for hashing. Returns `None` when the
/// normalization does not keep this kind of entry at all.
fn normalize(
    absolute_root: &Path,
    relative: &Path,
    normalization: Normalization,
    is_dir: bool,
) -> Option<String> {
    match normalization {
        Normalization::Absolute => Some(absolute_root.join(relative).to_string_lossy().to_string()),
        Normalization::Relative => Some(
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
        ),
        Normalization::NameOnly if is_dir => None,
        Normalization::NameOnly => relative
            .file_name()
            .map(|name| name.to_string_lossy().to_string()),
        Normalization::ContentOnly if is_dir => None,
        Normalization::ContentOnly => Some(String::new()),
    }
}
