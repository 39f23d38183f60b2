use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How file paths take part in a file-tree fingerprint.
///
/// This decides whether moving a file around without changing its contents counts as a change.
///
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalization {
    /// The absolute path of every file is hashed along with its contents.
    Absolute,

    /// Paths are hashed relative to the root of the property.
    #[default]
    Relative,

    /// Only the file name of every file is hashed along with its contents.
    NameOnly,

    /// Only file contents matter.
    ContentOnly,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// A file or directory tree, resolved against the workspace root when relative.
    Files {
        root: PathBuf,
        normalization: Normalization,
    },

    /// A scalar or structured value.
    Value(serde_json::Value),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputProperty {
    name: String,
    kind: InputKind,
    optional: bool,
}

impl InputProperty {
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    pub fn kind(&self) -> &InputKind {
        &self.kind
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Mark this input as optional. A missing optional file input fingerprints as an empty tree.
    pub fn optional(&mut self) -> &mut Self {
        self.optional = true;
        self
    }

    /// Change the path normalization of a file input. Has no effect on value inputs.
    pub fn normalize(&mut self, strategy: Normalization) -> &mut Self {
        if let InputKind::Files { normalization, .. } = &mut self.kind {
            *normalization = strategy;
        }
        self
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputType {
    File,
    Directory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputProperty {
    name: String,
    root: PathBuf,
    output_type: OutputType,
    tracked: bool,
}

impl OutputProperty {
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    pub fn is_tracked(&self) -> bool {
        self.tracked
    }

    /// Exclude this output from content comparison. Units with untracked outputs are never
    /// cached.
    pub fn untracked(&mut self) -> &mut Self {
        self.tracked = false;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    #[error("Property name {name:?} must be non-empty and only use [A-Za-z0-9_.-]")]
    InvalidName { name: String },

    #[error("Property {name:?} was declared more than once")]
    DuplicateName { name: String },
}

/// Validate that a property name can be embedded in cache archive paths as is.
pub fn validate_property_name(name: &str) -> Result<(), PropertyError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PropertyError::InvalidName {
            name: name.to_string(),
        })
    }
}

fn validate_names<'a, I: Iterator<Item = &'a str>>(names: I) -> Result<(), PropertyError> {
    let mut seen = std::collections::BTreeSet::new();
    for name in names {
        validate_property_name(name)?;
        if !seen.insert(name) {
            return Err(PropertyError::DuplicateName {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Collects the inputs a unit of work declares while being visited.
///
#[derive(Clone, Debug, Default)]
pub struct InputDeclarations {
    properties: Vec<InputProperty>,
}

impl InputDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a file or directory input. Relative roots resolve against the workspace root.
    pub fn files<N, P>(&mut self, name: N, root: P) -> &mut InputProperty
    where
        N: Into<String>,
        P: Into<PathBuf>,
    {
        self.push(InputProperty {
            name: name.into(),
            kind: InputKind::Files {
                root: root.into(),
                normalization: Normalization::default(),
            },
            optional: false,
        })
    }

    pub fn value<N, V>(&mut self, name: N, value: V) -> &mut InputProperty
    where
        N: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.push(InputProperty {
            name: name.into(),
            kind: InputKind::Value(value.into()),
            optional: false,
        })
    }

    fn push(&mut self, property: InputProperty) -> &mut InputProperty {
        let idx = self.properties.len();
        self.properties.push(property);
        &mut self.properties[idx]
    }

    pub fn properties(&self) -> &[InputProperty] {
        &self.properties
    }

    pub fn validate(&self) -> Result<(), PropertyError> {
        validate_names(self.properties.iter().map(|p| p.name()))
    }
}

/// Collects the outputs a unit of work declares while being visited.
///
#[derive(Clone, Debug, Default)]
pub struct OutputDeclarations {
    properties: Vec<OutputProperty>,
}

impl OutputDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file<N, P>(&mut self, name: N, root: P) -> &mut OutputProperty
    where
        N: Into<String>,
        P: Into<PathBuf>,
    {
        self.push(name.into(), root.into(), OutputType::File)
    }

    pub fn directory<N, P>(&mut self, name: N, root: P) -> &mut OutputProperty
    where
        N: Into<String>,
        P: Into<PathBuf>,
    {
        self.push(name.into(), root.into(), OutputType::Directory)
    }

    fn push(&mut self, name: String, root: PathBuf, output_type: OutputType) -> &mut OutputProperty {
        let idx = self.properties.len();
        self.properties.push(OutputProperty {
            name,
            root,
            output_type,
            tracked: true,
        });
        &mut self.properties[idx]
    }

    pub fn properties(&self) -> &[OutputProperty] {
        &self.properties
    }

    pub fn validate(&self) -> Result<(), PropertyError> {
        validate_names(self.properties.iter().map(|p| p.name()))
    }
}
