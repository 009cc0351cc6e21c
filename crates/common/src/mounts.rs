use std::collections::BTreeSet;
use std::sync::Arc;

use crate::access::AccessGate;
use crate::tree::Tree;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no entry at {0}")]
pub struct NotFoundError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MountError {
    #[error("tree path {0:?} must begin with '/'")]
    NotAbsolute(String),
    #[error("tree path {0:?} may not contain '.' or '..' segments")]
    RelativeSegment(String),
    #[error("tree path {0:?} is mounted more than once")]
    Duplicate(String),
    #[error("tree paths {outer:?} and {inner:?} overlap; one cannot be mounted inside another")]
    Nested { outer: String, inner: String },
}

/// Split a URL path into its non-empty segments.
pub fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// A tree mounted at a URL subpath.
#[derive(Debug, Clone)]
pub struct Mount {
    pub segments: Vec<String>,
    pub tree: Arc<dyn Tree>,
    /// Per-mount override of the process-wide access policy
    pub gate: Option<AccessGate>,
}

impl Mount {
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

/// Routes URL paths to mounted trees.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    // longest first so dispatch can take the first match
    mounts: Vec<Mount>,
}

impl MountTable {
    pub fn builder() -> MountTableBuilder {
        MountTableBuilder::default()
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Find the mount with the longest path that is a prefix of `path`,
    /// returning it with the segments that remain below it.
    pub fn dispatch<'a>(&self, path: &'a [String]) -> Result<(&Mount, &'a [String]), NotFoundError> {
        self.mounts
            .iter()
            .find(|mount| path.starts_with(&mount.segments))
            .map(|mount| (mount, &path[mount.segments.len()..]))
            .ok_or_else(|| NotFoundError(format!("/{}", path.join("/"))))
    }

    /// Names directly below `path` that lead to a mount, when `path` itself
    /// lies above every mount it could reach. Returns `None` once `path`
    /// falls inside a mount.
    pub fn children(&self, path: &[String]) -> Option<BTreeSet<String>> {
        if self
            .mounts
            .iter()
            .any(|mount| path.starts_with(&mount.segments) && !mount.segments.is_empty())
        {
            return None;
        }
        let children: BTreeSet<String> = self
            .mounts
            .iter()
            .filter(|mount| mount.segments.len() > path.len() && mount.segments.starts_with(path))
            .map(|mount| mount.segments[path.len()].clone())
            .collect();
        (!children.is_empty()).then_some(children)
    }
}

#[derive(Debug, Default)]
pub struct MountTableBuilder {
    mounts: Vec<(String, Mount)>,
}

impl MountTableBuilder {
    pub fn mount(
        mut self,
        path: &str,
        tree: Arc<dyn Tree>,
        gate: Option<AccessGate>,
    ) -> Result<Self, MountError> {
        if !path.starts_with('/') {
            return Err(MountError::NotAbsolute(path.to_string()));
        }
        let segments = segments(path);
        if segments.iter().any(|s| s == "." || s == "..") {
            return Err(MountError::RelativeSegment(path.to_string()));
        }

        for (existing, mount) in &self.mounts {
            if mount.segments == segments {
                return Err(MountError::Duplicate(path.to_string()));
            }
            // the root mount may sit above anything
            if mount.segments.is_empty() || segments.is_empty() {
                continue;
            }
            if segments.starts_with(&mount.segments) {
                return Err(MountError::Nested {
                    outer: existing.clone(),
                    inner: path.to_string(),
                });
            }
            if mount.segments.starts_with(&segments) {
                return Err(MountError::Nested {
                    outer: path.to_string(),
                    inner: existing.clone(),
                });
            }
        }

        self.mounts.push((
            path.to_string(),
            Mount {
                segments,
                tree,
                gate,
            },
        ));
        Ok(self)
    }

    pub fn build(self) -> MountTable {
        let mut mounts: Vec<Mount> = self.mounts.into_iter().map(|(_, mount)| mount).collect();
        mounts.sort_by(|a, b| b.segments.len().cmp(&a.segments.len()));
        MountTable { mounts }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::tree::{Entry, TreeError};

    #[derive(Debug)]
    struct Named(&'static str);

    #[async_trait]
    impl Tree for Named {
        async fn lookup(&self, _path: &[String]) -> Result<Entry, TreeError> {
            Ok(Entry::node(self.0))
        }
        async fn list(&self, _path: &[String]) -> Result<Vec<Entry>, TreeError> {
            Ok(vec![])
        }
        async fn read(&self, _path: &[String]) -> Result<Bytes, TreeError> {
            Ok(Bytes::new())
        }
    }

    fn tree(name: &'static str) -> Arc<dyn Tree> {
        Arc::new(Named(name))
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = MountTable::builder()
            .mount("/", tree("root"), None)
            .unwrap()
            .mount("/raw/data", tree("data"), None)
            .unwrap()
            .build();

        let path = segments("/raw/data/a/b");
        let (mount, rest) = table.dispatch(&path).unwrap();
        assert_eq!(mount.path(), "/raw/data");
        assert_eq!(rest, ["a".to_string(), "b".to_string()]);

        let path = segments("/other");
        let (mount, rest) = table.dispatch(&path).unwrap();
        assert_eq!(mount.path(), "/");
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn test_unmatched_path_is_not_found() {
        let table = MountTable::builder()
            .mount("/a", tree("a"), None)
            .unwrap()
            .build();
        assert!(table.dispatch(&segments("/b")).is_err());
        // a prefix of a segment is not a match
        assert!(table.dispatch(&segments("/ab")).is_err());
    }

    #[test]
    fn test_validation() {
        let builder = || MountTable::builder().mount("/a", tree("a"), None).unwrap();

        assert_eq!(
            MountTable::builder().mount("a", tree("a"), None).unwrap_err(),
            MountError::NotAbsolute("a".into())
        );
        assert!(matches!(
            builder().mount("/a/../b", tree("b"), None),
            Err(MountError::RelativeSegment(_))
        ));
        assert!(matches!(
            builder().mount("//a/", tree("b"), None),
            Err(MountError::Duplicate(_))
        ));
        assert!(matches!(
            builder().mount("/a/b", tree("b"), None),
            Err(MountError::Nested { .. })
        ));
        assert!(builder().mount("/", tree("root"), None).is_ok());
        assert!(builder().mount("/ab", tree("ab"), None).is_ok());
    }

    #[test]
    fn test_synthetic_children() {
        let table = MountTable::builder()
            .mount("/raw/x", tree("x"), None)
            .unwrap()
            .mount("/raw/y", tree("y"), None)
            .unwrap()
            .mount("/processed", tree("p"), None)
            .unwrap()
            .build();

        let top = table.children(&[]).unwrap();
        assert_eq!(top.into_iter().collect::<Vec<_>>(), vec!["processed", "raw"]);
        let raw = table.children(&segments("/raw")).unwrap();
        assert_eq!(raw.len(), 2);
        assert!(table.children(&segments("/raw/x")).is_none());
        assert!(table.children(&segments("/nowhere")).is_none());
    }
}
