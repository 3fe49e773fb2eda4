//! W3C WebDriver request and response bodies.
//!
//! Every driver response is wrapped in a `{"value": ...}` envelope; errors
//! carry an `error` code string inside that envelope.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which a web element reference is serialized.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// The `{"value": ...}` envelope around every WebDriver response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
	pub value: T,
}

/// Error payload returned with a non-2xx status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
	/// W3C error code, e.g. `no such element`
	pub error: String,
	#[serde(default)]
	pub message: String,
	#[serde(default)]
	pub stacktrace: String,
}

/// Opaque reference to an element inside a live session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef {
	#[serde(rename = "element-6066-11e4-a52e-4f735466cecf")]
	pub id: String,
}

impl ElementRef {
	pub fn new(id: impl Into<String>) -> Self {
		Self { id: id.into() }
	}

	/// JSON form suitable for passing as a script argument.
	pub fn to_value(&self) -> Value {
		serde_json::json!({ ELEMENT_KEY: self.id })
	}
}

/// `GET /status`
#[derive(Debug, Clone, Deserialize)]
pub struct DriverStatus {
	#[serde(default)]
	pub ready: bool,
	#[serde(default)]
	pub message: String,
}

/// Response body of `POST /session`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResponse {
	pub session_id: String,
	#[serde(default)]
	pub capabilities: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavigateRequest<'a> {
	pub url: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindRequest<'a> {
	pub using: &'a str,
	pub value: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteScriptRequest<'a> {
	pub script: &'a str,
	pub args: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendKeysRequest<'a> {
	pub text: &'a str,
}

/// `POST /window/rect`; unset fields are left untouched by the driver.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SetRectRequest {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub x: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub y: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub width: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub height: Option<u32>,
}

/// Chromium vendor endpoint `POST /goog/cdp/execute`.
#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest<'a> {
	pub cmd: &'a str,
	pub params: Value,
}

/// Decodes a base64 screenshot payload as returned by `GET /screenshot`
/// or `Page.captureScreenshot`.
pub fn decode_image(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
	STANDARD.decode(data.trim())
}
