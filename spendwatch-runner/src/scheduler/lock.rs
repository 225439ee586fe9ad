//! Single-writer lock for the dataset.
//!
//! The lock is a file created with `create_new`, so two processes can never
//! both hold it. It is removed when the guard drops. A lock older than the
//! configured age is treated as left behind by a crashed run and broken.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("{path} is locked by another run")]
    Held { path: PathBuf },

    #[error("lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Held lock; dropping it releases the dataset.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Lock file guarding `dataset`: the same path with `.lock` appended.
    pub fn path_for(dataset: &Path) -> PathBuf {
        let mut name = dataset.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    pub fn acquire(path: impl Into<PathBuf>, stale_after: Duration) -> Result<Self, LockError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| LockError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
        }

        match Self::create(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !is_stale(&path, stale_after) {
                    return Err(LockError::Held { path });
                }
                log::warn!("breaking stale lock {}", path.display());
                // Losing the race to another breaker surfaces as Held below
                let _ = fs::remove_file(&path);
                Self::create(&path).map_err(|e| match e.kind() {
                    io::ErrorKind::AlreadyExists => LockError::Held { path: path.clone() },
                    _ => LockError::Io {
                        path: path.clone(),
                        source: e,
                    },
                })
            }
            Err(source) => Err(LockError::Io { path, source }),
        }
    }

    fn create(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(
            file,
            "pid={} at={}",
            std::process::id(),
            chrono::Local::now().to_rfc3339()
        )?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("failed to release lock {}: {e}", self.path.display());
        }
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        // Vanished between create_new and here: let the retry decide
        Err(_) => return true,
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age >= stale_after)
        .unwrap_or(false)
}
