//! Browser driver binary resolution.
//!
//! Handles locating chromedriver and geckodriver. Resolution never touches
//! the network: CI images usually ship the driver on `PATH`, and a local
//! cache can be seeded explicitly with [`DriverResolver::install_into_cache`].

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};
use uitest_protocol::BrowserKind;

use crate::error::{Error, Result};

/// Number of days a cached driver binary stays valid.
pub const DEFAULT_CACHE_VALID_DAYS: u64 = 30;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Where a resolved driver binary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverSource {
	/// `CHROMEDRIVER_PATH` / `GECKODRIVER_PATH`
	EnvOverride,
	/// Found on the execution `PATH`
	Path,
	/// The local driver cache
	Cache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDriver {
	pub path: PathBuf,
	pub source: DriverSource,
}

/// Locates the driver executable for one browser kind.
///
/// Resolution order:
/// 1. The browser's override environment variable, if it names a runnable binary
/// 2. The execution `PATH`
/// 3. The local cache, if the cached binary is younger than the validity window
///
/// Returns [`Error::DriverUnavailable`] naming every source that was tried
/// when all of them fail.
#[derive(Debug, Clone)]
pub struct DriverResolver {
	browser: BrowserKind,
	cache_root: Option<PathBuf>,
	cache_valid_for: Duration,
}

impl DriverResolver {
	pub fn new(browser: BrowserKind) -> Self {
		Self {
			browser,
			cache_root: default_cache_root(),
			cache_valid_for: Duration::from_secs(DEFAULT_CACHE_VALID_DAYS * SECS_PER_DAY),
		}
	}

	pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
		self.cache_root = Some(root.into());
		self
	}

	pub fn with_cache_validity_days(mut self, days: u64) -> Self {
		self.cache_valid_for = Duration::from_secs(days.saturating_mul(SECS_PER_DAY));
		self
	}

	pub fn browser(&self) -> BrowserKind {
		self.browser
	}

	/// Executable file name including the platform suffix.
	pub fn binary_name(&self) -> String {
		format!("{}{}", self.browser.driver_name(), std::env::consts::EXE_SUFFIX)
	}

	/// Location the cached binary would have, if a cache root is known.
	pub fn cached_binary(&self) -> Option<PathBuf> {
		self.cache_root.as_ref().map(|root| {
			root.join(self.browser.driver_name())
				.join(self.binary_name())
		})
	}

	/// Resolves the driver against the process environment and `PATH`.
	pub fn resolve(&self) -> Result<ResolvedDriver> {
		self.resolve_with(
			|key| std::env::var_os(key).map(PathBuf::from),
			|name| which::which(name).ok(),
		)
	}

	fn resolve_with<E, W>(&self, env: E, on_path: W) -> Result<ResolvedDriver>
	where
		E: Fn(&str) -> Option<PathBuf>,
		W: Fn(&str) -> Option<PathBuf>,
	{
		let driver = self.browser.driver_name();
		let mut searched = Vec::new();

		let env_var = self.browser.driver_env_var();
		if let Some(candidate) = env(env_var) {
			if binary_is_usable(&candidate) {
				debug!(target = "uitest", driver, path = %candidate.display(), "Using driver from {env_var}");
				return Ok(ResolvedDriver {
					path: candidate,
					source: DriverSource::EnvOverride,
				});
			}
			warn!(
				target = "uitest",
				driver,
				path = %candidate.display(),
				"{env_var} does not point at a runnable driver; trying PATH"
			);
			searched.push(format!("{env_var}={}", candidate.display()));
		}

		searched.push("PATH".to_string());
		if let Some(candidate) = on_path(&self.binary_name()) {
			if binary_is_usable(&candidate) {
				debug!(target = "uitest", driver, path = %candidate.display(), "Using driver from PATH");
				return Ok(ResolvedDriver {
					path: candidate,
					source: DriverSource::Path,
				});
			}
			warn!(
				target = "uitest",
				driver,
				path = %candidate.display(),
				"Driver on PATH is not runnable; trying cache"
			);
		}

		match self.cached_binary() {
			Some(cached) => {
				searched.push(format!("cache {}", cached.display()));
				if cached.exists() {
					if !cache_is_fresh(&cached, self.cache_valid_for) {
						warn!(target = "uitest", driver, path = %cached.display(), "Cached driver expired");
					} else if binary_is_usable(&cached) {
						debug!(target = "uitest", driver, path = %cached.display(), "Using cached driver");
						return Ok(ResolvedDriver {
							path: cached,
							source: DriverSource::Cache,
						});
					}
				}
			}
			None => searched.push("cache (no cache directory)".to_string()),
		}

		Err(Error::DriverUnavailable {
			driver: driver.to_string(),
			searched,
		})
	}

	/// Copies `source` into the cache and stamps it as freshly installed.
	pub fn install_into_cache(&self, source: &Path) -> Result<PathBuf> {
		let target = self.cached_binary().ok_or_else(|| {
			Error::InvalidConfig("no cache directory available on this platform".to_string())
		})?;
		if let Some(parent) = target.parent() {
			fs::create_dir_all(parent)?;
		}
		fs::copy(source, &target)?;

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			let mut perms = fs::metadata(&target)?.permissions();
			perms.set_mode(0o755);
			fs::set_permissions(&target, perms)?;
		}

		fs::File::options()
			.write(true)
			.open(&target)?
			.set_modified(SystemTime::now())?;

		debug!(target = "uitest", path = %target.display(), "Installed driver into cache");
		Ok(target)
	}
}

/// Default cache root: `<platform cache dir>/uitest/drivers`.
pub fn default_cache_root() -> Option<PathBuf> {
	dirs::cache_dir().map(|dir| dir.join("uitest").join("drivers"))
}

/// Returns true if `path` runs and exits successfully with `--version`.
pub fn binary_is_usable(path: &Path) -> bool {
	Command::new(path)
		.arg("--version")
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.status()
		.map(|status| status.success())
		.unwrap_or(false)
}

fn cache_is_fresh(path: &Path, valid_for: Duration) -> bool {
	let Ok(modified) = fs::metadata(path).and_then(|meta| meta.modified()) else {
		return false;
	};
	match SystemTime::now().duration_since(modified) {
		Ok(age) => age <= valid_for,
		// Modified in the future: clock skew, treat as fresh.
		Err(_) => true,
	}
}

#[cfg(test)]
mod tests {
	use std::fs;
	#[cfg(unix)]
	use std::os::unix::fs::PermissionsExt;
	use std::path::Path;

	use tempfile::TempDir;

	use super::*;

	#[cfg(unix)]
	fn write_mock_driver(path: &Path, exit_code: i32) {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).unwrap();
		}
		let script = format!(
			"#!/bin/sh\n[ \"$1\" = \"--version\" ]\nexit {}\n",
			exit_code
		);
		fs::write(path, script).unwrap();
		let mut perms = fs::metadata(path).unwrap().permissions();
		perms.set_mode(0o755);
		fs::set_permissions(path, perms).unwrap();
	}

	fn no_env(_: &str) -> Option<PathBuf> {
		None
	}

	fn not_on_path(_: &str) -> Option<PathBuf> {
		None
	}

	#[cfg(unix)]
	#[test]
	fn path_binary_wins_over_cache() {
		let temp = TempDir::new().unwrap();
		let on_path = temp.path().join("bin").join("chromedriver");
		write_mock_driver(&on_path, 0);

		let resolver = DriverResolver::new(BrowserKind::Chrome).with_cache_root(temp.path().join("cache"));
		write_mock_driver(&resolver.cached_binary().unwrap(), 0);

		let resolved = resolver
			.resolve_with(no_env, |_| Some(on_path.clone()))
			.unwrap();
		assert_eq!(resolved.source, DriverSource::Path);
		assert_eq!(resolved.path, on_path);
	}

	#[cfg(unix)]
	#[test]
	fn falls_back_to_fresh_cache() {
		let temp = TempDir::new().unwrap();
		let resolver = DriverResolver::new(BrowserKind::Firefox).with_cache_root(temp.path());
		let cached = resolver.cached_binary().unwrap();
		write_mock_driver(&cached, 0);

		let resolved = resolver.resolve_with(no_env, not_on_path).unwrap();
		assert_eq!(resolved.source, DriverSource::Cache);
		assert_eq!(resolved.path, cached);
	}

	#[cfg(unix)]
	#[test]
	fn expired_cache_is_not_used() {
		let temp = TempDir::new().unwrap();
		let resolver = DriverResolver::new(BrowserKind::Chrome)
			.with_cache_root(temp.path())
			.with_cache_validity_days(30);
		let cached = resolver.cached_binary().unwrap();
		write_mock_driver(&cached, 0);
		let old = SystemTime::now() - Duration::from_secs(40 * SECS_PER_DAY);
		fs::File::options()
			.write(true)
			.open(&cached)
			.unwrap()
			.set_modified(old)
			.unwrap();

		let err = resolver.resolve_with(no_env, not_on_path).unwrap_err();
		assert!(matches!(err, Error::DriverUnavailable { .. }));
	}

	#[cfg(unix)]
	#[test]
	fn unusable_override_falls_through_to_path() {
		let temp = TempDir::new().unwrap();
		let broken = temp.path().join("broken-driver");
		let on_path = temp.path().join("chromedriver");
		write_mock_driver(&broken, 1);
		write_mock_driver(&on_path, 0);

		let resolver = DriverResolver::new(BrowserKind::Chrome).with_cache_root(temp.path().join("cache"));
		let resolved = resolver
			.resolve_with(
				|key| (key == "CHROMEDRIVER_PATH").then(|| broken.clone()),
				|_| Some(on_path.clone()),
			)
			.unwrap();
		assert_eq!(resolved.source, DriverSource::Path);
	}

	#[cfg(unix)]
	#[test]
	fn usable_override_is_preferred() {
		let temp = TempDir::new().unwrap();
		let pinned = temp.path().join("pinned-geckodriver");
		write_mock_driver(&pinned, 0);

		let resolver = DriverResolver::new(BrowserKind::Firefox).with_cache_root(temp.path().join("cache"));
		let resolved = resolver
			.resolve_with(
				|key| (key == "GECKODRIVER_PATH").then(|| pinned.clone()),
				|_| panic!("PATH should not be consulted when the override is usable"),
			)
			.unwrap();
		assert_eq!(resolved, ResolvedDriver {
			path: pinned,
			source: DriverSource::EnvOverride,
		});
	}

	#[test]
	fn missing_everywhere_names_path_and_cache() {
		let temp = TempDir::new().unwrap();
		let resolver = DriverResolver::new(BrowserKind::Chrome).with_cache_root(temp.path());

		match resolver.resolve_with(no_env, not_on_path) {
			Err(Error::DriverUnavailable { driver, searched }) => {
				assert_eq!(driver, "chromedriver");
				assert_eq!(searched.len(), 2);
				assert_eq!(searched[0], "PATH");
				assert!(searched[1].starts_with("cache "));
			}
			other => panic!("expected DriverUnavailable, got {other:?}"),
		}
	}

	#[cfg(unix)]
	#[test]
	fn install_into_cache_makes_binary_resolvable() {
		let temp = TempDir::new().unwrap();
		let downloaded = temp.path().join("download").join("chromedriver");
		write_mock_driver(&downloaded, 0);

		let resolver = DriverResolver::new(BrowserKind::Chrome).with_cache_root(temp.path().join("cache"));
		let installed = resolver.install_into_cache(&downloaded).unwrap();
		assert_eq!(Some(installed.clone()), resolver.cached_binary());

		let resolved = resolver.resolve_with(no_env, not_on_path).unwrap();
		assert_eq!(resolved.path, installed);
		assert_eq!(resolved.source, DriverSource::Cache);
	}

	#[test]
	fn missing_binary_is_not_usable() {
		assert!(!binary_is_usable(Path::new("/definitely/not/a/driver")));
	}
}
