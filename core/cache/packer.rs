use super::PackerError;
use crate::model::{OriginMetadata, OutputDeclarations, OutputProperty};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::*;
use walkdir::WalkDir;

const METADATA: &str = "METADATA";
const TREE_PREFIX: &str = "tree-";
const MISSING_TREE_PREFIX: &str = "missing-tree-";

/// The packed form of a unit of work's outputs.
#[derive(Debug, Clone)]
pub struct PackedOutputs {
    pub payload: Vec<u8>,
    pub entries: usize,
}

#[derive(Debug, Clone)]
pub struct UnpackedOutputs {
    pub origin: OriginMetadata,
    pub entries: usize,
}

/// Packs output trees into gzipped tarballs and back.
///
/// The first entry of an archive is always `METADATA`, a JSON record of the entry's origin. It is
/// followed, for every output property, by either a `missing-tree-<name>` marker when the output
/// did not exist, a single `tree-<name>` entry for a file output, or a `tree-<name>` directory
/// entry and its contents under `tree-<name>/` for a directory output.
///
pub struct EntryPacker;

impl EntryPacker {
    #[tracing::instrument(name = "EntryPacker::pack", skip(outputs, origin))]
    pub fn pack(
        workspace_root: &Path,
        outputs: &OutputDeclarations,
        origin: &OriginMetadata,
    ) -> Result<PackedOutputs, PackerError> {
        let encoder = GzEncoder::new(vec![], Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(true);

        let metadata = serde_json::to_vec(origin)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(metadata.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, METADATA, metadata.as_slice())?;

        let mut entries = 0;
        for property in outputs.properties() {
            entries += pack_property(&mut builder, workspace_root, property)?;
        }

        let payload = builder.into_inner()?.finish()?;
        Ok(PackedOutputs { payload, entries })
    }

    /// Replace the declared outputs in the workspace with the contents of `payload`.
    ///
    /// Every declared output root is removed first, so files that are not part of the entry do
    /// not survive unpacking. An entry must account for every declared output, either with its
    /// tree or with a missing-tree marker.
    ///
    #[tracing::instrument(name = "EntryPacker::unpack", skip(outputs, payload))]
    pub fn unpack(
        workspace_root: &Path,
        outputs: &OutputDeclarations,
        payload: &[u8],
    ) -> Result<UnpackedOutputs, PackerError> {
        for property in outputs.properties() {
            clean_output(&workspace_root.join(property.root()))?;
        }

        let mut archive = tar::Archive::new(GzDecoder::new(payload));
        archive.set_preserve_permissions(true);
        archive.set_preserve_mtime(true);

        let mut origin = None;
        let mut entries = 0;
        let mut seen = BTreeSet::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().trim_end_matches('/').to_string();

            if path == METADATA {
                origin = Some(serde_json::from_reader(&mut entry)?);
                continue;
            }

            entries += 1;

            if let Some(name) = path.strip_prefix(MISSING_TREE_PREFIX) {
                seen.insert(find_property(outputs, name)?.name().to_string());
                continue;
            }

            let (name, relative) = match path.strip_prefix(TREE_PREFIX) {
                Some(rest) => match rest.split_once('/') {
                    Some((name, relative)) => (name, Some(relative)),
                    None => (rest, None),
                },
                None => {
                    return Err(PackerError::InvalidEntry {
                        path: PathBuf::from(path),
                    })
                }
            };

            let property = find_property(outputs, name)?;
            seen.insert(property.name().to_string());
            let root = workspace_root.join(property.root());
            let dst = match relative {
                None => root,
                Some(relative) => {
                    let relative = Path::new(relative);
                    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
                        return Err(PackerError::InvalidEntry {
                            path: PathBuf::from(&path),
                        });
                    }
                    root.join(relative)
                }
            };

            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            trace!("Unpacking {} into {:?}", path, dst);
            entry.unpack(&dst)?;
        }

        if let Some(missing) = outputs
            .properties()
            .iter()
            .find(|p| !seen.contains(p.name()))
        {
            return Err(PackerError::MissingProperty {
                name: missing.name().to_string(),
            });
        }

        let origin = origin.ok_or(PackerError::MissingMetadata)?;
        Ok(UnpackedOutputs { origin, entries })
    }
}

fn pack_property<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    workspace_root: &Path,
    property: &OutputProperty,
) -> Result<usize, PackerError> {
    let root = workspace_root.join(property.root());
    let tree_name = format!("{}{}", TREE_PREFIX, property.name());

    let metadata = match std::fs::metadata(&root) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let mut header = tar::Header::new_gnu();
            header.set_size(0);
            header.set_mode(0o644);
            header.set_cksum();
            let name = format!("{}{}", MISSING_TREE_PREFIX, property.name());
            builder.append_data(&mut header, name, std::io::empty())?;
            return Ok(1);
        }
        Err(err) => return Err(err.into()),
    };

    if metadata.is_file() {
        builder.append_path_with_name(&root, &tree_name)?;
        return Ok(1);
    }

    let mut entries = 0;
    for entry in WalkDir::new(&root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|err| PackerError::IoError(err.into()))?;
        let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
        let name = if relative.as_os_str().is_empty() {
            PathBuf::from(&tree_name)
        } else {
            Path::new(&tree_name).join(relative)
        };

        if entry.file_type().is_dir() {
            builder.append_dir(&name, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), &name)?;
        }
        entries += 1;
    }

    Ok(entries)
}

fn find_property<'a>(
    outputs: &'a OutputDeclarations,
    name: &str,
) -> Result<&'a OutputProperty, PackerError> {
    outputs
        .properties()
        .iter()
        .find(|p| p.name() == name)
        .ok_or_else(|| PackerError::UnknownProperty {
            name: name.to_string(),
        })
}

fn clean_output(path: &Path) -> Result<(), PackerError> {
    let result = match std::fs::symlink_metadata(path) {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => Err(err),
        Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
    };
    result.map_err(|err| PackerError::CouldNotCleanOutput {
        path: path.to_path_buf(),
        err,
    })
}
