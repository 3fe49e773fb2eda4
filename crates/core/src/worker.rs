//! Worker identity.
//!
//! A worker is one parallel execution unit (normally one process). Its id
//! is only ever used as a path segment or a port offset.

use std::fmt;
use std::sync::OnceLock;

use tracing::warn;

use crate::{Error, Result};

/// Environment variable a distributed runner sets to the worker's id.
pub const WORKER_ENV: &str = "UITEST_WORKER";

/// First browser debug port handed out to workers.
pub const DEBUG_PORT_BASE: u16 = 9222;

/// Number of distinct debug ports workers are spread over.
pub const DEBUG_PORT_WINDOW: u16 = 1000;

/// Stable identifier of the current worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId {
	token: String,
	distributed: bool,
}

impl WorkerId {
	/// The id of this process, resolved once from the environment.
	pub fn current() -> &'static WorkerId {
		static CURRENT: OnceLock<WorkerId> = OnceLock::new();
		CURRENT.get_or_init(|| Self::from_lookup(|key| std::env::var(key).ok(), std::process::id()))
	}

	/// Resolves the id from `lookup`, falling back to `local_<pid>`.
	///
	/// A runner id that is not a plain path segment is ignored with a
	/// warning rather than rewritten, so two distinct ids never share
	/// directories.
	pub fn from_lookup<F>(lookup: F, pid: u32) -> Self
	where
		F: Fn(&str) -> Option<String>,
	{
		let Some(raw) = lookup(WORKER_ENV) else {
			return Self::local(pid);
		};
		if raw.trim().is_empty() {
			return Self::local(pid);
		}
		match Self::distributed(&raw) {
			Ok(id) => id,
			Err(e) => {
				warn!(target = "uitest", error = %e, pid, "Ignoring worker id");
				Self::local(pid)
			}
		}
	}

	/// Id of a worker scheduled by a distributed runner, e.g. `gw0`.
	///
	/// # Errors
	///
	/// [`Error::InvalidConfig`] unless `token` (trimmed) is non-empty and
	/// made only of ASCII letters, digits, `-` and `_`.
	pub fn distributed(token: &str) -> Result<Self> {
		let token = token.trim();
		if !is_path_safe(token) {
			return Err(Error::InvalidConfig(format!(
				"{WORKER_ENV}='{token}': expected ASCII letters, digits, '-' or '_'"
			)));
		}
		Ok(Self {
			token: token.to_string(),
			distributed: true,
		})
	}

	pub fn local(pid: u32) -> Self {
		Self {
			token: format!("local_{pid}"),
			distributed: false,
		}
	}

	pub fn as_str(&self) -> &str {
		&self.token
	}

	/// True when the id came from a distributed runner rather than the pid.
	pub fn is_distributed(&self) -> bool {
		self.distributed
	}

	/// Debug port for this worker with the default base and window.
	pub fn debug_port(&self) -> u16 {
		self.debug_port_in(DEBUG_PORT_BASE, DEBUG_PORT_WINDOW)
	}

	pub fn debug_port_in(&self, base: u16, window: u16) -> u16 {
		base.saturating_add(port_suffix(&self.token, std::process::id(), window))
	}
}

impl fmt::Display for WorkerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.token)
	}
}

/// Offset derived from the token's digits, or from `pid` when it has none.
///
/// `gw12` and `local_12` map to the same offset; the window keeps the
/// resulting port inside a fixed range.
pub fn port_suffix(token: &str, pid: u32, window: u16) -> u16 {
	let window = u64::from(window.max(1));
	let mut digits = token.chars().filter_map(|c| c.to_digit(10)).peekable();
	let value = if digits.peek().is_some() {
		digits.fold(0u64, |acc, d| (acc * 10 + u64::from(d)) % window)
	} else {
		u64::from(pid) % window
	};
	// value < window <= u16::MAX
	value as u16
}

fn is_path_safe(token: &str) -> bool {
	!token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
