use crate::error::{Result, WatchError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = ".contribwatch.lock";

/// Exclusive lock on the clone directory, released on drop. Two runs
/// sharing a clone directory would otherwise race on the working copies.
pub struct RunLock {
    _file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(repos_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(repos_dir)?;
        let path = repos_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| WatchError::Lock(format!("cannot open {}: {e}", path.display())))?;

        file.try_lock_exclusive().map_err(|_| {
            WatchError::Lock(format!(
                "another run holds {}; concurrent runs on one clone directory are not supported",
                path.display()
            ))
        })?;

        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
