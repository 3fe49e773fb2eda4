//! Driver service process management.
//!
//! Launches chromedriver or geckodriver as a child process on a free HTTP
//! port and waits until its `/status` endpoint reports ready.

use std::fs::OpenOptions;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use uitest_protocol::BrowserKind;
use url::Url;

use crate::connection::WebDriverClient;
use crate::error::{Error, Result};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How to start a driver service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
	pub browser: BrowserKind,
	pub binary: PathBuf,
	/// HTTP port for the WebDriver API; a free port is picked when unset.
	pub port: Option<u16>,
	/// Browser debug port (Marionette port for Firefox).
	pub debug_port: u16,
	/// Driver stdout/stderr are appended here when set, discarded otherwise.
	pub log_file: Option<PathBuf>,
	pub startup_timeout: Duration,
}

impl ServiceConfig {
	pub fn new(browser: BrowserKind, binary: impl Into<PathBuf>, debug_port: u16) -> Self {
		Self {
			browser,
			binary: binary.into(),
			port: None,
			debug_port,
			log_file: None,
			startup_timeout: Duration::from_secs(20),
		}
	}
}

/// Command-line arguments for the driver executable.
pub fn service_args(browser: BrowserKind, port: u16, debug_port: u16) -> Vec<String> {
	match browser {
		BrowserKind::Chrome => vec![format!("--port={port}")],
		BrowserKind::Firefox => vec![
			"--port".to_string(),
			port.to_string(),
			"--marionette-port".to_string(),
			debug_port.to_string(),
		],
	}
}

/// Asks the OS for a currently unused local TCP port.
pub fn free_port() -> Result<u16> {
	let listener = TcpListener::bind(("127.0.0.1", 0))?;
	Ok(listener.local_addr()?.port())
}

/// A running driver service.
///
/// The child process is spawned with `kill_on_drop`, so dropping a service
/// without [`DriverService::shutdown`] still terminates the driver.
#[derive(Debug)]
pub struct DriverService {
	process: Child,
	port: u16,
	client: WebDriverClient,
}

impl DriverService {
	/// Launches the driver and waits for it to accept sessions.
	///
	/// # Errors
	///
	/// Returns `Error::LaunchFailed` if the process cannot be spawned, exits
	/// early, or does not report ready within `startup_timeout`.
	pub async fn start(config: &ServiceConfig) -> Result<Self> {
		let port = match config.port {
			Some(port) => port,
			None => free_port()?,
		};

		let mut cmd = Command::new(&config.binary);
		cmd.args(service_args(config.browser, port, config.debug_port))
			.stdin(Stdio::null())
			.kill_on_drop(true);

		match &config.log_file {
			Some(path) => {
				let log = OpenOptions::new().create(true).append(true).open(path)?;
				cmd.stdout(Stdio::from(log.try_clone()?)).stderr(Stdio::from(log));
			}
			None => {
				cmd.stdout(Stdio::null()).stderr(Stdio::null());
			}
		}

		let process = cmd.spawn().map_err(|e| {
			Error::LaunchFailed(format!(
				"failed to spawn {}: {e}",
				config.binary.display()
			))
		})?;

		let base = Url::parse(&format!("http://127.0.0.1:{port}/"))
			.map_err(|e| Error::LaunchFailed(format!("bad service url: {e}")))?;
		let client = WebDriverClient::new(base)?;

		let mut service = Self {
			process,
			port,
			client,
		};
		service.wait_until_ready(config.startup_timeout).await?;

		info!(
			target = "uitest",
			browser = %config.browser,
			port,
			pid = service.pid().unwrap_or_default(),
			"Driver service ready"
		);
		Ok(service)
	}

	async fn wait_until_ready(&mut self, timeout: Duration) -> Result<()> {
		let deadline = Instant::now() + timeout;
		loop {
			match self.process.try_wait() {
				Ok(Some(status)) => {
					return Err(Error::LaunchFailed(format!(
						"driver exited during startup with status: {status}"
					)));
				}
				Ok(None) => {}
				Err(e) => {
					return Err(Error::LaunchFailed(format!(
						"failed to check driver status: {e}"
					)));
				}
			}

			match self.client.status().await {
				Ok(status) if status.ready => return Ok(()),
				Ok(status) => debug!(target = "uitest", message = %status.message, "Driver not ready yet"),
				Err(e) => debug!(target = "uitest", error = %e, "Driver status probe failed"),
			}

			if Instant::now() >= deadline {
				let _ = self.process.start_kill();
				return Err(Error::LaunchFailed(format!(
					"driver did not become ready within {}ms",
					timeout.as_millis()
				)));
			}
			sleep(READY_POLL_INTERVAL).await;
		}
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn client(&self) -> &WebDriverClient {
		&self.client
	}

	pub fn pid(&self) -> Option<u32> {
		self.process.id()
	}

	/// Kills the driver process and waits for it to exit.
	pub async fn shutdown(mut self) -> Result<()> {
		if let Ok(Some(_)) = self.process.try_wait() {
			return Ok(());
		}
		self.process.start_kill()?;
		match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.process.wait()).await {
			Ok(Ok(_)) => Ok(()),
			Ok(Err(e)) => Err(Error::Io(e)),
			Err(_) => {
				warn!(target = "uitest", port = self.port, "Driver did not exit after kill");
				Err(Error::LaunchFailed(format!(
					"driver shutdown timeout after {}s",
					SHUTDOWN_TIMEOUT.as_secs()
				)))
			}
		}
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
	fn write_script(path: &Path, body: &str) {
		fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
		let mut perms = fs::metadata(path).unwrap().permissions();
		perms.set_mode(0o755);
		fs::set_permissions(path, perms).unwrap();
	}

	#[test]
	fn chrome_args_only_set_http_port() {
		assert_eq!(service_args(BrowserKind::Chrome, 4444, 9223), vec!["--port=4444"]);
	}

	#[test]
	fn firefox_args_bind_marionette_to_debug_port() {
		assert_eq!(
			service_args(BrowserKind::Firefox, 4444, 9223),
			vec!["--port", "4444", "--marionette-port", "9223"]
		);
	}

	#[test]
	fn free_port_is_bindable() {
		let port = free_port().unwrap();
		assert_ne!(port, 0);
		TcpListener::bind(("127.0.0.1", port)).unwrap();
	}

	#[tokio::test]
	async fn missing_binary_fails_to_launch() {
		let config = ServiceConfig::new(BrowserKind::Chrome, "/definitely/not/chromedriver", 9222);
		let err = DriverService::start(&config).await.unwrap_err();
		assert!(matches!(err, Error::LaunchFailed(_)), "got {err:?}");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn early_exit_is_reported() {
		let temp = TempDir::new().unwrap();
		let script = temp.path().join("chromedriver");
		write_script(&script, "exit 3");

		let config = ServiceConfig::new(BrowserKind::Chrome, &script, 9222);
		match DriverService::start(&config).await {
			Err(Error::LaunchFailed(message)) => assert!(message.contains("exited"), "{message}"),
			other => panic!("expected LaunchFailed, got {other:?}"),
		}
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn silent_driver_times_out() {
		let temp = TempDir::new().unwrap();
		let script = temp.path().join("geckodriver");
		write_script(&script, "sleep 30");

		let mut config = ServiceConfig::new(BrowserKind::Firefox, &script, 9222);
		config.startup_timeout = Duration::from_millis(300);
		match DriverService::start(&config).await {
			Err(Error::LaunchFailed(message)) => assert!(message.contains("ready"), "{message}"),
			other => panic!("expected LaunchFailed, got {other:?}"),
		}
	}
}
