use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::{display_path, Entry, StructureFamily, Tree, TreeError};
use crate::cache::{CacheKey, ObjectCache};

/// A tree backed by a directory on the local filesystem.
///
/// Sub-directories are containers. Files are exposed under their name with
/// every suffix stripped (`scan.tiff` is served as `scan`) and classified by
/// their last extension; hidden files and files of an unknown kind are not
/// listed. File reads go through the shared object cache.
#[derive(Debug)]
pub struct DirectoryTree {
    root: PathBuf,
    cache: ObjectCache,
}

struct Child {
    path: PathBuf,
    key: String,
    family: StructureFamily,
    entry: Entry,
    modified_nanos: u128,
    len: u64,
}

impl DirectoryTree {
    pub const IDENTIFIER: &'static str = "canopy.trees.files:DirectoryTree.from_directory";

    pub fn from_directory(
        directory: impl AsRef<Path>,
        cache: ObjectCache,
    ) -> Result<Self, TreeError> {
        let directory = directory.as_ref();
        let root = directory.canonicalize().map_err(|source| TreeError::Io {
            path: directory.display().to_string(),
            source,
        })?;
        if !root.is_dir() {
            return Err(TreeError::NotAContainer(root.display().to_string()));
        }
        tracing::debug!(root = %root.display(), "serving directory");
        Ok(Self { root, cache })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a file extension to the family it is served as.
    pub fn classify(extension: &str) -> Option<StructureFamily> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" | "tsv" | "parquet" | "xlsx" => Some(StructureFamily::DataFrame),
            "tif" | "tiff" | "npy" | "png" | "jpg" | "jpeg" => Some(StructureFamily::Array),
            "h5" | "hdf5" | "nc" | "zarr" => Some(StructureFamily::Dataset),
            _ => None,
        }
    }

    async fn children(&self, dir: &Path) -> Result<Vec<Child>, TreeError> {
        let io_err = |source| TreeError::Io {
            path: dir.display().to_string(),
            source,
        };
        let mut read_dir = tokio::fs::read_dir(dir).await.map_err(io_err)?;

        let mut found = Vec::new();
        while let Some(dir_entry) = read_dir.next_entry().await.map_err(io_err)? {
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let path = dir_entry.path();
            // follow symlinks, skip dangling ones
            let Ok(metadata) = tokio::fs::metadata(&path).await else {
                continue;
            };

            let (key, family) = if metadata.is_dir() {
                (name.clone(), StructureFamily::Node)
            } else {
                let Some(family) = name.rsplit_once('.').and_then(|(_, ext)| Self::classify(ext))
                else {
                    continue;
                };
                let stem = name.split('.').next().unwrap_or(&name).to_string();
                (stem, family)
            };

            let modified = metadata.modified().ok();
            let modified_nanos = modified
                .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
                .map(|elapsed| elapsed.as_nanos())
                .unwrap_or_default();

            let mut entry = Entry {
                key: key.clone(),
                structure_family: family,
                metadata: Default::default(),
            }
            .with_metadata("filename", name.clone());
            if !metadata.is_dir() {
                entry = entry.with_metadata("size", metadata.len());
            }
            if let Some(modified) = modified {
                let modified: DateTime<Utc> = modified.into();
                entry = entry.with_metadata("modified", modified.to_rfc3339());
            }

            found.push((
                name,
                Child {
                    path,
                    key,
                    family,
                    entry,
                    modified_nanos,
                    len: metadata.len(),
                },
            ));
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));

        let mut seen = HashSet::new();
        let mut children = Vec::with_capacity(found.len());
        for (name, child) in found {
            if !seen.insert(child.key.clone()) {
                tracing::warn!(
                    dir = %dir.display(),
                    file = %name,
                    key = %child.key,
                    "another file already uses this key; skipping"
                );
                continue;
            }
            children.push(child);
        }
        Ok(children)
    }

    /// Walk `path` from the root. `None` means the root itself.
    async fn locate(&self, path: &[String]) -> Result<Option<Child>, TreeError> {
        let mut current: Option<Child> = None;
        for (depth, segment) in path.iter().enumerate() {
            let dir = match &current {
                None => self.root.clone(),
                Some(child) if child.family == StructureFamily::Node => child.path.clone(),
                Some(_) => return Err(TreeError::NotFound(display_path(&path[..=depth]))),
            };
            let next = self
                .children(&dir)
                .await?
                .into_iter()
                .find(|child| &child.key == segment)
                .ok_or_else(|| TreeError::NotFound(display_path(&path[..=depth])))?;
            current = Some(next);
        }
        Ok(current)
    }
}

#[async_trait]
impl Tree for DirectoryTree {
    async fn lookup(&self, path: &[String]) -> Result<Entry, TreeError> {
        Ok(match self.locate(path).await? {
            Some(child) => child.entry,
            None => Entry::node(""),
        })
    }

    async fn list(&self, path: &[String]) -> Result<Vec<Entry>, TreeError> {
        let dir = match self.locate(path).await? {
            None => self.root.clone(),
            Some(child) if child.family == StructureFamily::Node => child.path,
            Some(_) => return Err(TreeError::NotAContainer(display_path(path))),
        };
        Ok(self
            .children(&dir)
            .await?
            .into_iter()
            .map(|child| child.entry)
            .collect())
    }

    async fn read(&self, path: &[String]) -> Result<Bytes, TreeError> {
        let child = match self.locate(path).await? {
            Some(child) if child.family != StructureFamily::Node => child,
            _ => return Err(TreeError::NotReadable(display_path(path))),
        };

        // keyed on modification time and length so an edited file is re-read
        let key = CacheKey::new([
            "files".to_string(),
            child.path.display().to_string(),
            child.modified_nanos.to_string(),
            child.len.to_string(),
        ]);
        let file = child.path;
        let data = self
            .cache
            .get_or_compute(key, move || async move {
                tokio::fs::read(&file).await.map(Bytes::from)
            })
            .await?;
        Ok(Bytes::clone(&data))
    }
}
