use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// One filesystem node seen during the walk, relative to the walked root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub relative_path: PathBuf,
    pub is_dir: bool,
}

/// Source files partitioned by what happens to them on a rebuild.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Static assets copied verbatim into the output tree.
    pub to_copy: Vec<PathBuf>,
    /// Files left to the compiler.
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("source directory {0} does not exist or is not a directory")]
    MissingRoot(PathBuf),
}

/// Routes source entries into copy/compile buckets.
#[derive(Debug, Clone)]
pub struct Classifier {
    ignored: Vec<String>,
    compiled_extensions: Vec<String>,
}

impl Classifier {
    pub fn new(ignored: Vec<String>, compiled_extensions: Vec<String>) -> Self {
        Self {
            ignored,
            compiled_extensions,
        }
    }

    /// Returns true if `relative` contains any ignored substring.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        let path_str = relative.to_string_lossy();
        self.ignored
            .iter()
            .any(|needle| path_str.contains(needle.as_str()))
    }

    /// Walk `root` and classify everything under it.
    pub fn classify(&self, root: &Path) -> Result<Classification, WalkError> {
        let entries = walk_source(root)?;
        Ok(self.partition(root, &entries))
    }

    /// Partition already-walked entries. Paths in the result are `root` joined with
    /// each entry's relative path, in walk order.
    pub fn partition(&self, root: &Path, entries: &[SourceEntry]) -> Classification {
        let mut result = Classification::default();

        for entry in entries {
            if entry.is_dir || self.is_ignored(&entry.relative_path) {
                continue;
            }
            let ext = extension_of(&entry.relative_path);
            let path = root.join(&entry.relative_path);
            if self.compiled_extensions.iter().any(|c| c == ext) {
                result.skipped.push(path);
            } else {
                result.to_copy.push(path);
            }
        }

        result
    }
}

/// Everything after the last `.` of the file name, or the whole name when it has none.
pub fn extension_of(path: &Path) -> &str {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.rsplit('.').next().unwrap_or(name)
}

/// Recursively list every entry under `root`, depth-first, siblings sorted by name.
///
/// The root itself is not included. No ignore files are consulted; exclusion is the
/// classifier's job.
pub fn walk_source(root: &Path) -> Result<Vec<SourceEntry>, WalkError> {
    if !root.is_dir() {
        return Err(WalkError::MissingRoot(root.to_path_buf()));
    }

    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut entries = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!("skipping unreadable entry: {err}");
                continue;
            }
        };

        if entry.depth() == 0 {
            continue;
        }

        let relative_path = match entry.path().strip_prefix(root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };

        entries.push(SourceEntry {
            relative_path,
            is_dir: entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false),
        });
    }

    Ok(entries)
}
