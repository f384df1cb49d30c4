use std::{
    fs::ReadDir,
    io,
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::error::{Error, Result};

/// A file found under the ingestion root.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the ingestion root.
    pub relative_path: PathBuf,
    /// Path as handed to the normalizer (root joined with the relative path).
    pub path: PathBuf,
}

impl DiscoveredFile {
    /// Lower-cased extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.path)
    }
}

pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Recursively list every regular file under `root`.
///
/// Symlinked files are included; symlinked directories are not followed.
/// Results are sorted by relative path. Fails if `root` is missing or
/// unreadable. Subdirectories and entries that cannot be read are logged
/// and skipped.
pub fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    discover_files_with(root, &|dir: &Path| std::fs::read_dir(dir))
}

type ListDir<'a> = &'a dyn Fn(&Path) -> io::Result<ReadDir>;

fn discover_files_with(
    root: &Path,
    list_dir: ListDir<'_>,
) -> Result<Vec<DiscoveredFile>> {
    let input_dir_error = |source| Error::InputDir {
        path: root.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(root).map_err(input_dir_error)?;
    if !metadata.is_dir() {
        return Err(input_dir_error(io::Error::new(
            io::ErrorKind::NotADirectory,
            "not a directory",
        )));
    }

    let entries = list_dir(root).map_err(input_dir_error)?;
    let mut results = Vec::new();
    walk_entries(root, entries, list_dir, &mut results);
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_entries(
    root: &Path,
    entries: ReadDir,
    list_dir: ListDir<'_>,
    results: &mut Vec<DiscoveredFile>,
) {
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable directory entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                continue;
            }
        };

        if file_type.is_dir() {
            match list_dir(&path) {
                Ok(children) => walk_entries(root, children, list_dir, results),
                Err(e) => {
                    warn!("Skipping unreadable directory {}: {e}", path.display());
                }
            }
        } else if file_type.is_file()
            || (file_type.is_symlink() && path.is_file())
        {
            let relative_path =
                path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            results.push(DiscoveredFile {
                relative_path,
                path,
            });
        }
    }
}
