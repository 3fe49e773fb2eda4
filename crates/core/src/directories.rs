//! Lock-guarded creation and cleaning of worker directories.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::layout::{ResourceLayout, ResourcePurpose};
use crate::lock::FileLock;
use crate::{Error, Result};

/// What session start does with the browser profile directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserDataPolicy {
	/// Create the profile once and keep it warm across runs.
	#[default]
	Preserve,
	/// Wipe the profile at every session start.
	Wipe,
}

/// Empties `dir` (creating it if missing) while holding the lock at `lock_path`.
///
/// Entries that disappear concurrently are ignored; other deletion
/// failures are logged and skipped. Only a lock timeout or a failure to
/// recreate the directory is returned as an error.
pub async fn ensure_clean_directory(dir: &Path, lock_path: &Path, timeout: Duration) -> Result<()> {
	let _lock = FileLock::acquire(lock_path, timeout).await?;
	let target = dir.to_path_buf();
	let removed = blocking(move || {
		let removed = remove_contents(&target);
		std::fs::create_dir_all(&target)?;
		Ok(removed)
	})
	.await?;
	info!(
		target = "uitest",
		path = %dir.display(),
		removed,
		"Directory cleaned and recreated"
	);
	Ok(())
}

/// Creates `dir` under its lock without touching existing contents.
pub async fn ensure_directory(dir: &Path, lock_path: &Path, timeout: Duration) -> Result<()> {
	let _lock = FileLock::acquire(lock_path, timeout).await?;
	tokio::fs::create_dir_all(dir).await?;
	Ok(())
}

/// Cleans one of the worker's directories under its own lock.
pub async fn clean_purpose(layout: &ResourceLayout, purpose: ResourcePurpose, timeout: Duration) -> Result<()> {
	ensure_clean_directory(&layout.dir(purpose), &layout.lock_path(purpose), timeout).await
}

/// Session-start preparation of every worker directory.
///
/// Screenshots, recordings and downloads are always emptied. The
/// user-data directory follows `policy`.
pub async fn prepare_worker_directories(
	layout: &ResourceLayout,
	policy: UserDataPolicy,
	timeout: Duration,
) -> Result<()> {
	for purpose in [
		ResourcePurpose::Screenshots,
		ResourcePurpose::Recordings,
		ResourcePurpose::Downloads,
	] {
		clean_purpose(layout, purpose, timeout).await?;
	}

	let user_data = layout.user_data_dir();
	let lock = layout.lock_path(ResourcePurpose::UserData);
	match policy {
		UserDataPolicy::Wipe => ensure_clean_directory(&user_data, &lock, timeout).await,
		UserDataPolicy::Preserve => ensure_directory(&user_data, &lock, timeout).await,
	}
}

async fn blocking<T, F>(f: F) -> Result<T>
where
	F: FnOnce() -> io::Result<T> + Send + 'static,
	T: Send + 'static,
{
	tokio::task::spawn_blocking(f)
		.await
		.map_err(|e| Error::Io(io::Error::other(e)))?
		.map_err(Error::Io)
}

fn remove_contents(dir: &Path) -> usize {
	let entries = match std::fs::read_dir(dir) {
		Ok(entries) => entries,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
		Err(e) => {
			warn!(target = "uitest", path = %dir.display(), error = %e, "Cannot list directory");
			return 0;
		}
	};

	let mut removed = 0;
	for entry in entries.flatten() {
		let path: PathBuf = entry.path();
		let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
		let result = if is_dir {
			std::fs::remove_dir_all(&path)
		} else {
			std::fs::remove_file(&path)
		};
		match result {
			Ok(()) => removed += 1,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {}
			Err(e) => warn!(target = "uitest", path = %path.display(), error = %e, "Failed to delete"),
		}
	}
	removed
}
