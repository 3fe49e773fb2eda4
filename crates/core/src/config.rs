//! Harness configuration.
//!
//! Values come from the environment with the defaults below; the CLI
//! overrides individual fields from its flags.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uitest_protocol::{BrowserKind, Geolocation};

use crate::directories::UserDataPolicy;
use crate::recorder::DEFAULT_FPS;
use crate::worker::{DEBUG_PORT_BASE, DEBUG_PORT_WINDOW};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://the-internet.herokuapp.com/";

/// Coordinates injected when geolocation override is enabled.
pub const DEFAULT_GEOLOCATION: Geolocation = Geolocation {
	latitude: 32.0853,
	longitude: 34.7818,
	accuracy: 100.0,
};

/// How long one browser lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverScope {
	/// One browser for the whole session.
	#[default]
	Session,
	/// A fresh browser per test.
	Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
	pub width: u32,
	pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
	pub base_url: String,
	pub browser: BrowserKind,
	pub short_timeout: Duration,
	pub long_timeout: Duration,
	pub video_recording: bool,
	pub recording_fps: u32,
	pub headless: bool,
	pub maximized: bool,
	pub window: WindowSize,
	pub username: String,
	#[serde(skip_serializing, default)]
	pub password: String,
	pub driver_scope: DriverScope,
	pub user_data_policy: UserDataPolicy,
	pub capture_on_teardown_failure: bool,
	pub geolocation: Option<Geolocation>,
	pub driver_cache_days: u64,
	/// Root under which the per-worker directories are laid out.
	pub artifacts_root: PathBuf,
	/// Allure results directory; `None` disables the report sink.
	pub allure_dir: Option<PathBuf>,
	pub lock_timeout: Duration,
	pub log_file: Option<PathBuf>,
	pub debug_port_base: u16,
	pub debug_port_window: u16,
}

impl Default for HarnessConfig {
	fn default() -> Self {
		Self {
			base_url: DEFAULT_BASE_URL.to_string(),
			browser: BrowserKind::Chrome,
			short_timeout: Duration::from_secs(3),
			long_timeout: Duration::from_secs(10),
			video_recording: false,
			recording_fps: DEFAULT_FPS,
			headless: true,
			maximized: false,
			window: WindowSize {
				width: 1920,
				height: 1080,
			},
			username: "tomsmith".to_string(),
			password: "SuperSecretPassword!".to_string(),
			driver_scope: DriverScope::Session,
			user_data_policy: UserDataPolicy::Preserve,
			capture_on_teardown_failure: true,
			geolocation: Some(DEFAULT_GEOLOCATION),
			driver_cache_days: 30,
			artifacts_root: PathBuf::from("."),
			allure_dir: Some(PathBuf::from("reports").join("allure-results")),
			lock_timeout: Duration::from_secs(30),
			log_file: Some(PathBuf::from("test_logs.log")),
			debug_port_base: DEBUG_PORT_BASE,
			debug_port_window: DEBUG_PORT_WINDOW,
		}
	}
}

impl HarnessConfig {
	/// Reads the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Builds a configuration from `lookup`, starting from the defaults.
	///
	/// # Errors
	///
	/// Returns [`Error::UnsupportedBrowserKind`] for an unknown `BROWSER` and
	/// [`Error::InvalidConfig`] for any other unparsable value.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
		let mut config = Self::default();

		if let Some(v) = get("BASE_URL") {
			config.base_url = v;
		}
		if let Some(v) = get("BROWSER") {
			config.browser = v.parse()?;
		}
		if let Some(v) = get("SHORT_TIMEOUT") {
			config.short_timeout = parse_secs("SHORT_TIMEOUT", &v)?;
		}
		if let Some(v) = get("LONG_TIMEOUT") {
			config.long_timeout = parse_secs("LONG_TIMEOUT", &v)?;
		}
		if let Some(v) = get("VIDEO_RECORDING") {
			config.video_recording = parse_bool("VIDEO_RECORDING", &v)?;
		}
		if let Some(v) = get("HEADLESS") {
			config.headless = parse_bool("HEADLESS", &v)?;
		}
		if let Some(v) = get("MAXIMIZED") {
			config.maximized = parse_bool("MAXIMIZED", &v)?;
		}
		if let Some(v) = get("USERNAME") {
			config.username = v;
		}
		if let Some(v) = lookup("PASSWORD") {
			config.password = v;
		}
		if let Some(v) = get("UITEST_DRIVER_SCOPE") {
			config.driver_scope = match v.to_ascii_lowercase().as_str() {
				"session" => DriverScope::Session,
				"test" | "function" => DriverScope::Test,
				_ => return Err(invalid("UITEST_DRIVER_SCOPE", &v, "expected session or test")),
			};
		}
		if let Some(v) = get("UITEST_WIPE_USER_DATA") {
			config.user_data_policy = if parse_bool("UITEST_WIPE_USER_DATA", &v)? {
				UserDataPolicy::Wipe
			} else {
				UserDataPolicy::Preserve
			};
		}
		if let Some(v) = get("UITEST_CAPTURE_ON_TEARDOWN_FAILURE") {
			config.capture_on_teardown_failure = parse_bool("UITEST_CAPTURE_ON_TEARDOWN_FAILURE", &v)?;
		}
		if let Some(v) = get("UITEST_GEOLOCATION") {
			config.geolocation = parse_geolocation(&v)?;
		}
		if let Some(v) = get("UITEST_RECORDING_FPS") {
			config.recording_fps = match v.parse::<u32>() {
				Ok(fps) if fps > 0 => fps,
				_ => return Err(invalid("UITEST_RECORDING_FPS", &v, "expected a positive integer")),
			};
		}
		if let Some(v) = get("UITEST_DRIVER_CACHE_DAYS") {
			config.driver_cache_days = v
				.parse()
				.map_err(|_| invalid("UITEST_DRIVER_CACHE_DAYS", &v, "expected a whole number of days"))?;
		}
		if let Some(v) = get("UITEST_ARTIFACTS_ROOT") {
			config.artifacts_root = PathBuf::from(v);
		}
		if let Some(v) = get("UITEST_ALLURE_DIR") {
			config.allure_dir = optional_path(&v);
		}
		if let Some(v) = get("UITEST_LOG_FILE") {
			config.log_file = optional_path(&v);
		}
		if let Some(v) = get("UITEST_LOCK_TIMEOUT") {
			config.lock_timeout = parse_secs("UITEST_LOCK_TIMEOUT", &v)?;
		}
		if let Some(v) = get("UITEST_DEBUG_PORT_BASE") {
			config.debug_port_base = v
				.parse()
				.map_err(|_| invalid("UITEST_DEBUG_PORT_BASE", &v, "expected a port number"))?;
		}

		Ok(config)
	}
}

fn invalid(key: &str, value: &str, expected: &str) -> Error {
	Error::InvalidConfig(format!("{key}='{value}': {expected}"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
	match value.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(invalid(key, value, "expected true or false")),
	}
}

/// Upper bound for any configured timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
	let expected = "expected a number of seconds up to 86400";
	let secs = value.parse::<f64>().map_err(|_| invalid(key, value, expected))?;
	match Duration::try_from_secs_f64(secs) {
		Ok(duration) if duration <= MAX_TIMEOUT => Ok(duration),
		_ => Err(invalid(key, value, expected)),
	}
}

fn optional_path(value: &str) -> Option<PathBuf> {
	match value.to_ascii_lowercase().as_str() {
		"off" | "none" | "false" => None,
		_ => Some(PathBuf::from(value)),
	}
}

/// `off`, or `lat,lon` with an optional third accuracy field.
fn parse_geolocation(value: &str) -> Result<Option<Geolocation>> {
	if matches!(value.to_ascii_lowercase().as_str(), "off" | "none" | "false") {
		return Ok(None);
	}
	let parts: Vec<f64> = value
		.split(',')
		.map(|p| p.trim().parse::<f64>())
		.collect::<std::result::Result<_, _>>()
		.map_err(|_| invalid("UITEST_GEOLOCATION", value, "expected lat,lon[,accuracy] or off"))?;
	match parts.as_slice() {
		[latitude, longitude] => Ok(Some(Geolocation {
			latitude: *latitude,
			longitude: *longitude,
			accuracy: DEFAULT_GEOLOCATION.accuracy,
		})),
		[latitude, longitude, accuracy] => Ok(Some(Geolocation {
			latitude: *latitude,
			longitude: *longitude,
			accuracy: *accuracy,
		})),
		_ => Err(invalid("UITEST_GEOLOCATION", value, "expected lat,lon[,accuracy] or off")),
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn config_from(pairs: &[(&str, &str)]) -> Result<HarnessConfig> {
		let env: HashMap<String, String> = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		HarnessConfig::from_lookup(|key| env.get(key).cloned())
	}

	#[test]
	fn defaults_match_documented_values() {
		let config = config_from(&[]).unwrap();
		assert_eq!(config.base_url, DEFAULT_BASE_URL);
		assert_eq!(config.browser, BrowserKind::Chrome);
		assert_eq!(config.short_timeout, Duration::from_secs(3));
		assert_eq!(config.long_timeout, Duration::from_secs(10));
		assert!(!config.video_recording);
		assert!(config.headless);
		assert!(!config.maximized);
		assert_eq!(config.window, WindowSize { width: 1920, height: 1080 });
		assert_eq!(config.username, "tomsmith");
		assert_eq!(config.user_data_policy, UserDataPolicy::Preserve);
		assert!(config.capture_on_teardown_failure);
		assert_eq!(config.driver_scope, DriverScope::Session);
	}

	#[test]
	fn reads_overrides() {
		let config = config_from(&[
			("BROWSER", "Firefox"),
			("SHORT_TIMEOUT", "1.5"),
			("VIDEO_RECORDING", "true"),
			("HEADLESS", "0"),
			("UITEST_DRIVER_SCOPE", "test"),
			("UITEST_WIPE_USER_DATA", "yes"),
			("UITEST_CAPTURE_ON_TEARDOWN_FAILURE", "false"),
			("UITEST_GEOLOCATION", "51.5, -0.12"),
			("UITEST_ALLURE_DIR", "off"),
		])
		.unwrap();
		assert_eq!(config.browser, BrowserKind::Firefox);
		assert_eq!(config.short_timeout, Duration::from_millis(1500));
		assert!(config.video_recording);
		assert!(!config.headless);
		assert_eq!(config.driver_scope, DriverScope::Test);
		assert_eq!(config.user_data_policy, UserDataPolicy::Wipe);
		assert!(!config.capture_on_teardown_failure);
		let geo = config.geolocation.unwrap();
		assert_eq!((geo.latitude, geo.longitude, geo.accuracy), (51.5, -0.12, 100.0));
		assert!(config.allure_dir.is_none());
	}

	#[test]
	fn unknown_browser_is_rejected() {
		let err = config_from(&[("BROWSER", "netscape")]).unwrap_err();
		assert!(matches!(err, Error::UnsupportedBrowserKind(_)), "got {err:?}");
	}

	#[test]
	fn malformed_values_are_invalid_config() {
		for (key, value) in [
			("HEADLESS", "maybe"),
			("LONG_TIMEOUT", "-1"),
			("SHORT_TIMEOUT", "1e20"),
			("SHORT_TIMEOUT", "NaN"),
			("UITEST_LOCK_TIMEOUT", "86401"),
			("UITEST_DRIVER_SCOPE", "module"),
			("UITEST_GEOLOCATION", "north"),
			("UITEST_RECORDING_FPS", "0"),
		] {
			let err = config_from(&[(key, value)]).unwrap_err();
			assert!(matches!(err, Error::InvalidConfig(_)), "{key}: got {err:?}");
			assert!(err.to_string().contains(key));
		}
	}

	#[test]
	fn timeout_ceiling_is_inclusive() {
		let config = config_from(&[("LONG_TIMEOUT", "86400")]).unwrap();
		assert_eq!(config.long_timeout, MAX_TIMEOUT);
	}

	#[test]
	fn password_is_not_serialized() {
		let json = serde_json::to_value(HarnessConfig::default()).unwrap();
		assert!(json.get("password").is_none());
		assert_eq!(json["browser"], "chrome");
	}
}
