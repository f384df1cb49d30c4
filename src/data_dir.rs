use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Project-local storage layout.
///
/// Indexes live under `{root}/colbert/indexes/{index_name}`.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn indexes_dir(&self) -> PathBuf {
        self.root.join("colbert").join("indexes")
    }

    /// Canonical location of the index called `name`.
    ///
    /// Names must be a single, non-empty path component.
    pub fn index_path(&self, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {
                Ok(self.indexes_dir().join(name))
            }
            _ => Err(Error::Config(format!("invalid index name: '{name}'"))),
        }
    }

    /// Create the directory that holds every index.
    pub fn ensure_indexes_dir(&self) -> Result<PathBuf> {
        let path = self.indexes_dir();
        std::fs::create_dir_all(&path)
            .map_err(|_| Error::DataDir(path.clone()))?;
        Ok(path)
    }

    /// Resolve an index reference that is either a path to an existing
    /// index directory or the name of an index under this root.
    pub fn resolve_index(&self, reference: &str) -> Result<PathBuf> {
        let as_path = Path::new(reference);
        if as_path.is_dir() {
            return Ok(as_path.to_path_buf());
        }

        let path = self.index_path(reference)?;
        if path.is_dir() {
            Ok(path)
        } else {
            Err(Error::NotFound {
                kind: "index",
                name: reference.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_path_layout() {
        let dir = DataDir::new("/project/.ragbert");
        assert_eq!(
            dir.index_path("papers").unwrap(),
            PathBuf::from("/project/.ragbert/colbert/indexes/papers")
        );
    }

    #[test]
    fn index_path_rejects_bad_names() {
        let dir = DataDir::new("/project/.ragbert");
        for name in ["", "..", "a/b", "/abs", "."] {
            assert!(dir.index_path(name).is_err(), "{name:?} should fail");
        }
    }

    #[test]
    fn indexes_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::new(tmp.path());
        let indexes = dir.ensure_indexes_dir().unwrap();

        assert!(indexes.is_dir());
        assert_eq!(indexes, tmp.path().join("colbert").join("indexes"));
    }

    #[test]
    fn resolve_index_by_name_and_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::new(tmp.path());
        let path = dir.index_path("notes").unwrap();
        std::fs::create_dir_all(&path).unwrap();

        assert_eq!(dir.resolve_index("notes").unwrap(), path);
        assert_eq!(dir.resolve_index(path.to_str().unwrap()).unwrap(), path);
    }

    #[test]
    fn resolve_missing_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::new(tmp.path());
        let err = dir.resolve_index("ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "index", .. }));
    }
}
