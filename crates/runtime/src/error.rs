//! Error types for the harness runtime.
//!
//! One enum covers driver resolution, process launch, file locking, the
//! WebDriver wire and artifact encoding, so that a failure raised deep in a
//! page interaction reaches the test unmodified.

use std::path::PathBuf;

use thiserror::Error;
use uitest_protocol::{UnknownBrowserKind, WireError};

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while provisioning or driving a browser.
#[derive(Debug, Error)]
pub enum Error {
	/// No driver binary was found by any resolution step.
	#[error("{driver} not found (searched: {})", searched.join(", "))]
	DriverUnavailable {
		driver: String,
		/// Human-readable description of every place that was tried.
		searched: Vec<String>,
	},

	/// Configuration named a browser the harness cannot drive.
	#[error(transparent)]
	UnsupportedBrowserKind(#[from] UnknownBrowserKind),

	/// The browser or its driver never reached a usable state.
	#[error("Failed to launch browser: {0}")]
	LaunchFailed(String),

	/// An exclusive file lock could not be taken in time.
	#[error("Timed out after {timeout_ms}ms waiting for lock {}", path.display())]
	LockTimeout { path: PathBuf, timeout_ms: u64 },

	/// The element is not part of the document.
	#[error("No such element: {0}")]
	NoSuchElement(String),

	#[error("Invalid selector: {0}")]
	InvalidSelector(String),

	/// The element was detached from the document after it was found.
	#[error("Stale element reference: {0}")]
	StaleElement(String),

	/// Another element would receive the click.
	#[error("Element click intercepted: {0}")]
	ClickIntercepted(String),

	/// The session is gone, usually because the browser was quit.
	#[error("Invalid session: {0}")]
	InvalidSession(String),

	/// A harness-side wait expired.
	#[error("Timeout after {ms}ms waiting for {condition}")]
	Timeout { ms: u64, condition: String },

	/// The driver reported a timeout (page load, script, implicit wait).
	#[error("Driver timeout: {0}")]
	DriverTimeout(String),

	#[error("JavaScript error: {0}")]
	JavaScript(String),

	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// A configuration value could not be parsed.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	/// The operation is not available for this browser.
	#[error("Unsupported operation: {0}")]
	Unsupported(String),

	/// The video encoder failed or could not be started.
	#[error("Encoder failed: {0}")]
	Encoder(String),

	/// Any other W3C error code.
	#[error("WebDriver error '{code}': {message}")]
	WebDriver { code: String, message: String },

	/// HTTP transport error talking to the driver service.
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

/// Payload-free classification of [`Error`], used by retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	DriverUnavailable,
	UnsupportedBrowserKind,
	LaunchFailed,
	LockTimeout,
	NoSuchElement,
	InvalidSelector,
	StaleElement,
	ClickIntercepted,
	InvalidSession,
	Timeout,
	JavaScript,
	InvalidArgument,
	InvalidConfig,
	Unsupported,
	Encoder,
	WebDriver,
	Http,
	Io,
	Json,
}

impl Error {
	/// Maps a W3C error payload onto the taxonomy.
	pub fn from_wire(wire: WireError) -> Self {
		let WireError { error, message, .. } = wire;
		match error.as_str() {
			"no such element" => Error::NoSuchElement(message),
			"invalid selector" => Error::InvalidSelector(message),
			"stale element reference" => Error::StaleElement(message),
			"element click intercepted" => Error::ClickIntercepted(message),
			"invalid session id" => Error::InvalidSession(message),
			"timeout" | "script timeout" => Error::DriverTimeout(message),
			"javascript error" => Error::JavaScript(message),
			"invalid argument" => Error::InvalidArgument(message),
			"unsupported operation" | "unknown command" => Error::Unsupported(message),
			_ => Error::WebDriver {
				code: error,
				message,
			},
		}
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::DriverUnavailable { .. } => ErrorKind::DriverUnavailable,
			Error::UnsupportedBrowserKind(_) => ErrorKind::UnsupportedBrowserKind,
			Error::LaunchFailed(_) => ErrorKind::LaunchFailed,
			Error::LockTimeout { .. } => ErrorKind::LockTimeout,
			Error::NoSuchElement(_) => ErrorKind::NoSuchElement,
			Error::InvalidSelector(_) => ErrorKind::InvalidSelector,
			Error::StaleElement(_) => ErrorKind::StaleElement,
			Error::ClickIntercepted(_) => ErrorKind::ClickIntercepted,
			Error::InvalidSession(_) => ErrorKind::InvalidSession,
			Error::Timeout { .. } | Error::DriverTimeout(_) => ErrorKind::Timeout,
			Error::JavaScript(_) => ErrorKind::JavaScript,
			Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
			Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
			Error::Unsupported(_) => ErrorKind::Unsupported,
			Error::Encoder(_) => ErrorKind::Encoder,
			Error::WebDriver { .. } => ErrorKind::WebDriver,
			Error::Http(_) => ErrorKind::Http,
			Error::Io(_) => ErrorKind::Io,
			Error::Json(_) => ErrorKind::Json,
		}
	}

	/// Returns true for element states that usually resolve on their own.
	pub fn is_transient(&self) -> bool {
		matches!(
			self.kind(),
			ErrorKind::StaleElement | ErrorKind::ClickIntercepted
		)
	}

	/// Returns true if the error means the browser session no longer exists.
	pub fn is_session_gone(&self) -> bool {
		matches!(self, Error::InvalidSession(_))
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		self.kind() == ErrorKind::Timeout
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn wire(code: &str) -> WireError {
		WireError {
			error: code.to_string(),
			message: format!("{code} happened"),
			stacktrace: String::new(),
		}
	}

	#[test]
	fn wire_codes_map_to_taxonomy() {
		assert_eq!(Error::from_wire(wire("no such element")).kind(), ErrorKind::NoSuchElement);
		assert_eq!(
			Error::from_wire(wire("stale element reference")).kind(),
			ErrorKind::StaleElement
		);
		assert_eq!(
			Error::from_wire(wire("element click intercepted")).kind(),
			ErrorKind::ClickIntercepted
		);
		assert_eq!(Error::from_wire(wire("invalid session id")).kind(), ErrorKind::InvalidSession);
		assert_eq!(Error::from_wire(wire("script timeout")).kind(), ErrorKind::Timeout);
	}

	#[test]
	fn unknown_codes_keep_code_and_message() {
		match Error::from_wire(wire("no such window")) {
			Error::WebDriver { code, message } => {
				assert_eq!(code, "no such window");
				assert_eq!(message, "no such window happened");
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn only_staleness_and_interception_are_transient() {
		assert!(Error::StaleElement(String::new()).is_transient());
		assert!(Error::ClickIntercepted(String::new()).is_transient());
		assert!(!Error::NoSuchElement(String::new()).is_transient());
		assert!(
			!Error::Timeout {
				ms: 10,
				condition: "x".into()
			}
			.is_transient()
		);
	}

	#[test]
	fn driver_unavailable_names_every_source() {
		let err = Error::DriverUnavailable {
			driver: "chromedriver".into(),
			searched: vec!["PATH".into(), "cache /tmp/c".into()],
		};
		assert_eq!(
			err.to_string(),
			"chromedriver not found (searched: PATH, cache /tmp/c)"
		);
	}
}
