//! Core value types shared by the driver layer and the harness.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Browser families the harness can provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
	/// Chromium-based Chrome, driven by chromedriver
	#[default]
	Chrome,
	/// Mozilla Firefox, driven by geckodriver
	Firefox,
}

impl BrowserKind {
	/// Lowercase name as accepted in configuration.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Chrome => "chrome",
			Self::Firefox => "firefox",
		}
	}

	/// Name of the driver executable for this browser, without platform suffix.
	pub fn driver_name(self) -> &'static str {
		match self {
			Self::Chrome => "chromedriver",
			Self::Firefox => "geckodriver",
		}
	}

	/// Environment variable that may point at an explicit driver binary.
	pub fn driver_env_var(self) -> &'static str {
		match self {
			Self::Chrome => "CHROMEDRIVER_PATH",
			Self::Firefox => "GECKODRIVER_PATH",
		}
	}

	/// Capitalized display name (`Chrome`, `Firefox`).
	pub fn display_name(self) -> &'static str {
		match self {
			Self::Chrome => "Chrome",
			Self::Firefox => "Firefox",
		}
	}
}

impl fmt::Display for BrowserKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Returned when a configuration value names a browser that is not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBrowserKind(pub String);

impl fmt::Display for UnknownBrowserKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "unsupported browser '{}' (expected chrome or firefox)", self.0)
	}
}

impl std::error::Error for UnknownBrowserKind {}

impl FromStr for BrowserKind {
	type Err = UnknownBrowserKind;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"chrome" => Ok(Self::Chrome),
			"firefox" => Ok(Self::Firefox),
			_ => Err(UnknownBrowserKind(s.to_string())),
		}
	}
}

/// Element location strategy, serialized with the W3C `using` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
	#[serde(rename = "css selector")]
	Css,
	#[serde(rename = "xpath")]
	XPath,
	#[serde(rename = "link text")]
	LinkText,
	#[serde(rename = "partial link text")]
	PartialLinkText,
	#[serde(rename = "tag name")]
	TagName,
}

impl Strategy {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Css => "css selector",
			Self::XPath => "xpath",
			Self::LinkText => "link text",
			Self::PartialLinkText => "partial link text",
			Self::TagName => "tag name",
		}
	}
}

/// A strategy plus the query it is applied with.
///
/// Locators are cheap to construct and usually live as `const`-like
/// functions on page objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
	pub using: Strategy,
	pub value: String,
}

impl Locator {
	pub fn new(using: Strategy, value: impl Into<String>) -> Self {
		Self {
			using,
			value: value.into(),
		}
	}

	pub fn css(value: impl Into<String>) -> Self {
		Self::new(Strategy::Css, value)
	}

	pub fn xpath(value: impl Into<String>) -> Self {
		Self::new(Strategy::XPath, value)
	}

	pub fn link_text(value: impl Into<String>) -> Self {
		Self::new(Strategy::LinkText, value)
	}

	pub fn partial_link_text(value: impl Into<String>) -> Self {
		Self::new(Strategy::PartialLinkText, value)
	}

	pub fn tag_name(value: impl Into<String>) -> Self {
		Self::new(Strategy::TagName, value)
	}
}

impl fmt::Display for Locator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}={}", self.using.as_str(), self.value)
	}
}

/// Screenshot image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
	/// PNG format (lossless, the only format plain WebDriver returns)
	#[default]
	Png,
	/// JPEG format (lossy, available through the Chrome DevTools protocol)
	Jpeg,
}

impl ImageFormat {
	/// File extension without the leading dot.
	pub fn extension(self) -> &'static str {
		match self {
			Self::Png => "png",
			Self::Jpeg => "jpg",
		}
	}

	pub fn mime_type(self) -> &'static str {
		match self {
			Self::Png => "image/png",
			Self::Jpeg => "image/jpeg",
		}
	}
}

/// Window position and size as reported by `GET /window/rect`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowRect {
	pub x: i64,
	pub y: i64,
	pub width: u32,
	pub height: u32,
}

/// Fixed coordinates injected as the browser's geolocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
	pub latitude: f64,
	pub longitude: f64,
	pub accuracy: f64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn browser_kind_parses_case_insensitively() {
		assert_eq!("Chrome".parse::<BrowserKind>(), Ok(BrowserKind::Chrome));
		assert_eq!(" firefox ".parse::<BrowserKind>(), Ok(BrowserKind::Firefox));
		let err = "safari".parse::<BrowserKind>().unwrap_err();
		assert_eq!(err, UnknownBrowserKind("safari".to_string()));
		assert!(err.to_string().contains("safari"));
	}

	#[test]
	fn locator_serializes_with_w3c_strategy_names() {
		let json = serde_json::to_value(Locator::link_text("Checkboxes")).unwrap();
		assert_eq!(json["using"], "link text");
		assert_eq!(json["value"], "Checkboxes");
		assert_eq!(Locator::css("#finish h4").to_string(), "css selector=#finish h4");
	}
}
