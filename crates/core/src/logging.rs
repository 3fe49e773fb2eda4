use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::Result;

/// Default filter for a verbosity level.
pub fn default_filter(verbosity: u8) -> &'static str {
	// 0 = warnings only
	// 1 (-v) = harness info, dependencies at warn
	// 2+ (-vv) = debug for everything
	match verbosity {
		0 => "warn",
		1 => "warn,uitest=info,uitest_runtime=info",
		_ => "debug",
	}
}

/// Installs the global subscriber: compact stderr plus an optional plain
/// text file. `RUST_LOG` overrides the verbosity-derived filter.
///
/// Returns `Ok(false)` when a subscriber was already installed. If the log
/// file cannot be opened, stderr logging is still installed and the open
/// error is returned.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>) -> Result<bool> {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);
	let (file, file_error) = match log_file.map(open_log_file).transpose() {
		Ok(file) => (file, None),
		Err(e) => (None, Some(e)),
	};
	let file_layer = file.map(|file| {
		tracing_subscriber::fmt::layer()
			.with_writer(Arc::new(file))
			.with_ansi(false)
			.with_target(true)
	});

	let installed = tracing_subscriber::registry()
		.with(env_filter)
		.with(
			tracing_subscriber::fmt::layer()
				.with_writer(stderr)
				.with_target(true)
				.with_level(true)
				.compact(),
		)
		.with(file_layer)
		.try_init()
		.is_ok();

	match file_error {
		Some(e) => Err(e),
		None => Ok(installed),
	}
}

fn open_log_file(path: &Path) -> Result<File> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		std::fs::create_dir_all(parent)?;
	}
	Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn verbosity_widens_the_filter() {
		assert_eq!(default_filter(0), "warn");
		assert!(default_filter(1).contains("uitest=info"));
		assert_eq!(default_filter(5), "debug");
	}

	#[test]
	fn unwritable_log_file_is_reported() {
		let dir = tempfile::tempdir().unwrap();
		let blocker = dir.path().join("not_a_dir");
		std::fs::write(&blocker, b"file").unwrap();
		assert!(open_log_file(&blocker.join("test_logs.log")).is_err());
		assert!(init_logging(0, Some(&blocker.join("test_logs.log"))).is_err());
		// stderr logging is in place either way
		assert!(!init_logging(0, None).unwrap());
	}

	#[test]
	fn second_init_is_harmless() {
		let dir = tempfile::tempdir().unwrap();
		let log = dir.path().join("logs").join("test_logs.log");
		let _ = init_logging(0, Some(&log)).unwrap();
		assert!(!init_logging(0, None).unwrap());
		assert!(log.exists());
	}
}
