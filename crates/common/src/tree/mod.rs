mod files;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::CacheError;

pub use files::DirectoryTree;

/// Shape of the data behind an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureFamily {
    /// A container of other entries. Never exported directly.
    Node,
    Array,
    DataFrame,
    Dataset,
}

impl StructureFamily {
    pub const EXPORTABLE: [StructureFamily; 3] = [
        StructureFamily::Array,
        StructureFamily::DataFrame,
        StructureFamily::Dataset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StructureFamily::Node => "node",
            StructureFamily::Array => "array",
            StructureFamily::DataFrame => "dataframe",
            StructureFamily::Dataset => "dataset",
        }
    }

    pub fn is_exportable(&self) -> bool {
        !matches!(self, StructureFamily::Node)
    }
}

impl fmt::Display for StructureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown structure family: {0}")]
pub struct UnknownStructureFamily(pub String);

impl FromStr for StructureFamily {
    type Err = UnknownStructureFamily;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(StructureFamily::Node),
            "array" => Ok(StructureFamily::Array),
            "dataframe" => Ok(StructureFamily::DataFrame),
            "dataset" => Ok(StructureFamily::Dataset),
            other => Err(UnknownStructureFamily(other.to_string())),
        }
    }
}

/// One item in a tree, as seen by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub structure_family: StructureFamily,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Entry {
    pub fn node(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            structure_family: StructureFamily::Node,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("no entry at {0}")]
    NotFound(String),
    #[error("{0} is not a container")]
    NotAContainer(String),
    #[error("{0} is a container and has no data to read")]
    NotReadable(String),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// A mountable hierarchy of entries.
///
/// Paths are relative to the tree's own root; an empty path is the root
/// container itself.
#[async_trait]
pub trait Tree: Send + Sync + fmt::Debug {
    async fn lookup(&self, path: &[String]) -> Result<Entry, TreeError>;

    async fn list(&self, path: &[String]) -> Result<Vec<Entry>, TreeError>;

    async fn read(&self, path: &[String]) -> Result<Bytes, TreeError>;
}

pub(crate) fn display_path(path: &[String]) -> String {
    format!("/{}", path.join("/"))
}
