//! Advisory write lock held next to a document.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};

/// RAII guard holding an exclusive lock on `<document>.lock`.
///
/// The lock file is left in place on drop; removing it would let a waiting
/// writer lock an unlinked inode while a third writer creates a fresh one.
pub(crate) struct WriteLock {
    file: File,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = <File as fs2::FileExt>::unlock(&self.file);
    }
}

/// Path of the lock file guarding `document`.
fn lock_path(document: &Path) -> PathBuf {
    let mut name = document
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".lock");
    document.with_file_name(name)
}

/// Block until an exclusive lock on the document's lock file is held.
pub(crate) fn acquire(document: &Path) -> StoreResult<WriteLock> {
    use fs2::FileExt;

    let path = lock_path(document);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
    file.lock_exclusive().map_err(|e| StoreError::Lock {
        path: document.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(WriteLock { file })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_appends_suffix() {
        assert_eq!(
            lock_path(Path::new("/var/lib/chefdeck/state.json")),
            PathBuf::from("/var/lib/chefdeck/state.json.lock")
        );
    }

    #[test]
    fn test_lock_is_reacquirable_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("state.json");

        let first = acquire(&doc).unwrap();
        drop(first);
        let second = acquire(&doc);
        assert!(second.is_ok());
        assert!(dir.path().join("state.json.lock").exists());
    }
}
