use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputResetError {
    #[error("unable to remove output directory {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to create output directory {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Delete `dest_root` if present, then recreate it empty.
///
/// A file or symlink sitting at `dest_root` is removed rather than traversed.
pub fn reset(dest_root: &Path) -> Result<(), OutputResetError> {
    let removed = match std::fs::symlink_metadata(dest_root) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(dest_root),
        Ok(_) => std::fs::remove_file(dest_root),
        Err(err) => Err(err),
    };
    match removed {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(OutputResetError::Remove {
                path: dest_root.to_path_buf(),
                source,
            });
        }
    }

    create_output_dir(dest_root).map_err(|source| OutputResetError::Create {
        path: dest_root.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn create_output_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o770)
        .create(path)
}

#[cfg(not(unix))]
fn create_output_dir(path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_reset_removes_stale_artifacts() {
        let dir = TempDir::new().unwrap();
        let dist = dir.path().join("dist");
        fs::create_dir_all(dist.join("old")).unwrap();
        fs::write(dist.join("old").join("stale.js"), "old").unwrap();

        reset(&dist).unwrap();

        assert!(dist.is_dir());
        assert_eq!(fs::read_dir(&dist).unwrap().count(), 0);
    }

    #[test]
    fn test_reset_creates_missing_dir() {
        let dir = TempDir::new().unwrap();
        let dist = dir.path().join("dist");
        reset(&dist).unwrap();
        assert!(dist.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_reset_uses_fixed_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let dist = dir.path().join("dist");
        reset(&dist).unwrap();
        let mode = fs::metadata(&dist).unwrap().permissions().mode() & 0o777;
        // umask may only clear bits
        assert_eq!(mode & !0o770, 0);
    }

    #[test]
    fn test_reset_replaces_file_at_output_root() {
        let dir = TempDir::new().unwrap();
        let dist = dir.path().join("dist");
        fs::write(&dist, "not a directory").unwrap();

        reset(&dist).unwrap();

        assert!(dist.is_dir());
        assert_eq!(fs::read_dir(&dist).unwrap().count(), 0);
    }

    #[test]
    fn test_reset_fails_when_parent_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file").unwrap();

        let err = reset(&blocker.join("dist")).unwrap_err();
        assert!(matches!(
            err,
            OutputResetError::Remove { .. } | OutputResetError::Create { .. }
        ));
    }
}
