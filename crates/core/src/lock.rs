//! Cross-process exclusive file locks.

use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::{Error, Result};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An exclusive advisory lock on a file, released on drop.
///
/// Locks are visible to other processes and to other handles in the same
/// process, so two workers (or two tasks) using the same lock path never
/// hold it at the same time.
#[derive(Debug)]
pub struct FileLock {
	file: File,
	path: PathBuf,
}

impl FileLock {
	/// Waits up to `timeout` for the lock at `path`, creating the file if needed.
	///
	/// # Errors
	///
	/// Returns [`Error::LockTimeout`] if another holder keeps the lock for
	/// longer than `timeout`.
	pub async fn acquire(path: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
		let path = path.into();
		let deadline = Instant::now() + timeout;
		loop {
			if let Some(lock) = Self::try_acquire(&path)? {
				return Ok(lock);
			}
			if Instant::now() >= deadline {
				return Err(Error::LockTimeout {
					path,
					timeout_ms: timeout.as_millis() as u64,
				});
			}
			trace!(target = "uitest", path = %path.display(), "Lock busy; waiting");
			sleep(LOCK_POLL_INTERVAL).await;
		}
	}

	/// Takes the lock if it is free right now.
	pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(false)
			.open(path)?;
		match file.try_lock() {
			Ok(()) => {
				debug!(target = "uitest", path = %path.display(), "Lock acquired");
				Ok(Some(Self {
					file,
					path: path.to_path_buf(),
				}))
			}
			Err(TryLockError::WouldBlock) => Ok(None),
			Err(TryLockError::Error(e)) => Err(Error::Io(e)),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl Drop for FileLock {
	fn drop(&mut self) {
		if let Err(e) = self.file.unlock() {
			debug!(target = "uitest", path = %self.path.display(), error = %e, "Failed to unlock");
		}
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[tokio::test]
	async fn second_holder_times_out() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("nested").join("gw0.lock");

		let held = FileLock::acquire(&path, Duration::from_secs(1)).await.unwrap();
		let err = FileLock::acquire(&path, Duration::from_millis(150))
			.await
			.unwrap_err();
		match err {
			Error::LockTimeout { path: p, timeout_ms } => {
				assert_eq!(p, path);
				assert_eq!(timeout_ms, 150);
			}
			other => panic!("expected LockTimeout, got {other:?}"),
		}
		drop(held);
	}

	#[tokio::test]
	async fn released_on_drop() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("gw0.lock");

		let first = FileLock::acquire(&path, Duration::from_secs(1)).await.unwrap();
		assert!(FileLock::try_acquire(&path).unwrap().is_none());
		drop(first);
		assert!(FileLock::try_acquire(&path).unwrap().is_some());
	}

	#[tokio::test]
	async fn waiter_gets_lock_after_release() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("gw0.lock");

		let held = FileLock::acquire(&path, Duration::from_secs(1)).await.unwrap();
		let waiter = tokio::spawn({
			let path = path.clone();
			async move { FileLock::acquire(path, Duration::from_secs(5)).await }
		});
		sleep(Duration::from_millis(120)).await;
		drop(held);
		assert!(waiter.await.unwrap().is_ok());
	}
}
