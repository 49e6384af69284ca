//! Single-run guard: a lock file created exclusively, removed on drop.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Takes the lock at `path`. An existing lock older than `max_age` is
    /// treated as left behind by a dead run and replaced.
    pub fn acquire(path: &Path, max_age: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::util::ensure_directory(parent)?;
        }

        match Self::create(path) {
            Ok(lock) => return Ok(lock),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to create lock file {}", path.display()));
            }
        }

        let age = lock_age(path)?;
        if age < max_age {
            bail!(
                "another run is already active (lock {} is {}s old)",
                path.display(),
                age.as_secs()
            );
        }

        warn!(path = %path.display(), age_secs = age.as_secs(), "removing stale run lock");
        fs::remove_file(path)
            .with_context(|| format!("failed to remove stale lock {}", path.display()))?;

        Self::create(path).with_context(|| format!("failed to re-create lock {}", path.display()))
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{}", std::process::id())?;
        info!(path = %path.display(), "run lock acquired");
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
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to release run lock");
        }
    }
}

fn lock_age(path: &Path) -> Result<Duration> {
    let modified = fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .with_context(|| format!("failed to read lock metadata {}", path.display()))?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("runner.lock");

        let first = RunLock::acquire(&path, Duration::from_secs(1800)).expect("first lock");
        assert!(first.path().exists());
        assert!(RunLock::acquire(&path, Duration::from_secs(1800)).is_err());

        drop(first);
        assert!(!path.exists());
        let _again = RunLock::acquire(&path, Duration::from_secs(1800)).expect("lock after release");
    }

    #[test]
    fn stale_lock_is_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("runner.lock");
        fs::write(&path, "12345\n").expect("seed stale lock");

        let lock = RunLock::acquire(&path, Duration::ZERO).expect("stale lock replaced");
        let owner = fs::read_to_string(lock.path()).expect("read lock");
        assert_eq!(owner.trim(), std::process::id().to_string());
    }
}
