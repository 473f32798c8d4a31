use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;

/// Why a single file could not be copied. Never fatal to the rebuild.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("{0} is not a regular file")]
    NotRegularFile(PathBuf),
    #[error("unable to create folder {path}: {source}")]
    DirCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("copy failed: {0}")]
    CopyIo(#[from] io::Error),
}

/// Result of copying one file.
#[derive(Debug)]
pub struct CopyOutcome {
    pub source_path: PathBuf,
    pub bytes_copied: u64,
    pub error: Option<CopyError>,
}

impl CopyOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Copy every path into `dest_root`, preserving its location relative to `source_root`.
///
/// Returns one outcome per input, in input order. A failure on one file is recorded
/// in its outcome and does not stop the others.
pub fn copy_files(source_root: &Path, dest_root: &Path, paths: &[PathBuf]) -> Vec<CopyOutcome> {
    paths
        .par_iter()
        .map(|path| match copy_file(source_root, dest_root, path) {
            Ok(bytes_copied) => CopyOutcome {
                source_path: path.clone(),
                bytes_copied,
                error: None,
            },
            Err(err) => CopyOutcome {
                source_path: path.clone(),
                bytes_copied: 0,
                error: Some(err),
            },
        })
        .collect()
}

/// Copy one file, returning the number of bytes written.
pub fn copy_file(source_root: &Path, dest_root: &Path, src: &Path) -> Result<u64, CopyError> {
    let metadata = std::fs::metadata(src)?;
    if !metadata.is_file() {
        return Err(CopyError::NotRegularFile(src.to_path_buf()));
    }

    let mut reader = File::open(src)?;

    let dest = dest_root.join(relative_to_root(source_root, src));
    if let Some(parent) = dest.parent() {
        create_dir_tree(parent).map_err(|source| CopyError::DirCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut writer = File::create(&dest)?;
    let bytes = io::copy(&mut reader, &mut writer)?;
    Ok(bytes)
}

/// `src` relative to `source_root`. Paths outside the root drop their first segment
/// instead, which is the source directory itself for root-relative inputs.
fn relative_to_root(source_root: &Path, src: &Path) -> PathBuf {
    if let Ok(rel) = src.strip_prefix(source_root) {
        return rel.to_path_buf();
    }
    src.components()
        .skip_while(|c| matches!(c, Component::RootDir | Component::CurDir | Component::Prefix(_)))
        .skip(1)
        .collect()
}

#[cfg(unix)]
fn create_dir_tree(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
}

#[cfg(not(unix))]
fn create_dir_tree(path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(path)
}
