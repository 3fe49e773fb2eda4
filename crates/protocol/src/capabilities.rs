//! New-session capability payloads for Chrome and Firefox.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::BrowserKind;

/// Body of `POST /session`.
#[derive(Debug, Clone, Serialize)]
pub struct NewSessionRequest {
	pub capabilities: CapabilityRequest,
}

impl NewSessionRequest {
	pub fn new(always_match: Capabilities) -> Self {
		Self {
			capabilities: CapabilityRequest { always_match },
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityRequest {
	pub always_match: Capabilities,
}

/// The subset of W3C and vendor capabilities the harness sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
	pub browser_name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub accept_insecure_certs: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub page_load_strategy: Option<String>,
	#[serde(rename = "goog:chromeOptions", skip_serializing_if = "Option::is_none")]
	pub chrome_options: Option<ChromeOptions>,
	#[serde(rename = "moz:firefoxOptions", skip_serializing_if = "Option::is_none")]
	pub firefox_options: Option<FirefoxOptions>,
}

impl Capabilities {
	pub fn chrome(options: ChromeOptions) -> Self {
		Self {
			browser_name: BrowserKind::Chrome.as_str().to_string(),
			chrome_options: Some(options),
			..Default::default()
		}
	}

	pub fn firefox(options: FirefoxOptions) -> Self {
		Self {
			browser_name: BrowserKind::Firefox.as_str().to_string(),
			firefox_options: Some(options),
			..Default::default()
		}
	}
}

/// `goog:chromeOptions`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChromeOptions {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Vec<String>,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub prefs: Map<String, Value>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub exclude_switches: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub use_automation_extension: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub binary: Option<String>,
}

/// `moz:firefoxOptions`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirefoxOptions {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Vec<String>,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub prefs: Map<String, Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub binary: Option<String>,
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn chrome_request_nests_vendor_options() {
		let mut options = ChromeOptions::default();
		options.args.push("--headless=new".into());
		options.exclude_switches.push("enable-automation".into());
		let body = serde_json::to_value(NewSessionRequest::new(Capabilities::chrome(options))).unwrap();

		let always = &body["capabilities"]["alwaysMatch"];
		assert_eq!(always["browserName"], "chrome");
		assert_eq!(always["goog:chromeOptions"]["args"], json!(["--headless=new"]));
		assert_eq!(
			always["goog:chromeOptions"]["excludeSwitches"],
			json!(["enable-automation"])
		);
		assert!(always.get("moz:firefoxOptions").is_none());
		assert!(always["goog:chromeOptions"].get("prefs").is_none());
	}

	#[test]
	fn firefox_request_carries_prefs() {
		let mut options = FirefoxOptions::default();
		options.prefs.insert("geo.enabled".into(), json!(true));
		let body = serde_json::to_value(NewSessionRequest::new(Capabilities::firefox(options))).unwrap();

		let always = &body["capabilities"]["alwaysMatch"];
		assert_eq!(always["browserName"], "firefox");
		assert_eq!(always["moz:firefoxOptions"]["prefs"]["geo.enabled"], true);
	}
}
