//! The browser capability consumed by the harness.
//!
//! Everything above this trait (recorder, hooks, page objects, waits) is
//! written against [`Driver`], so it can be exercised with
//! [`MockDriver`](crate::testing::MockDriver) as well as a live
//! [`WebDriverSession`](crate::webdriver::WebDriverSession).

use async_trait::async_trait;
use serde_json::Value;
use uitest_protocol::{BrowserKind, ElementRef, ImageFormat, Locator};

use crate::{Error, Result};

/// Requested screenshot encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenshotOptions {
	pub format: ImageFormat,
	/// JPEG quality (0-100); ignored for PNG.
	pub quality: Option<u8>,
}

impl ScreenshotOptions {
	pub fn png() -> Self {
		Self::default()
	}

	pub fn jpeg(quality: u8) -> Self {
		Self {
			format: ImageFormat::Jpeg,
			quality: Some(quality.min(100)),
		}
	}
}

/// Decoded screenshot bytes.
///
/// `format` is what the browser actually produced, which may differ from
/// the request when the browser only supports PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
	pub format: ImageFormat,
	pub data: Vec<u8>,
}

impl Screenshot {
	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

/// A live browser session.
///
/// `session_id` returns `None` once the session has been quit or was
/// found to be invalid; callers treat that as "browser gone".
#[async_trait]
pub trait Driver: Send + Sync {
	fn session_id(&self) -> Option<String>;

	fn browser(&self) -> BrowserKind;

	async fn navigate(&self, url: &str) -> Result<()>;

	async fn current_url(&self) -> Result<String>;

	async fn title(&self) -> Result<String>;

	async fn refresh(&self) -> Result<()>;

	/// Finds the first match, searching inside `scope` when given.
	///
	/// Fails with [`Error::NoSuchElement`] when nothing matches right now.
	async fn find(&self, locator: &Locator, scope: Option<&ElementRef>) -> Result<ElementRef>;

	/// Finds every current match; an empty list is not an error.
	async fn find_all(&self, locator: &Locator, scope: Option<&ElementRef>) -> Result<Vec<ElementRef>>;

	async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value>;

	async fn capture_screenshot(&self, options: ScreenshotOptions) -> Result<Screenshot>;

	async fn click(&self, element: &ElementRef) -> Result<()>;

	async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()>;

	async fn clear(&self, element: &ElementRef) -> Result<()>;

	async fn text(&self, element: &ElementRef) -> Result<String>;

	async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>>;

	async fn is_displayed(&self, element: &ElementRef) -> Result<bool>;

	async fn is_enabled(&self, element: &ElementRef) -> Result<bool>;

	async fn is_selected(&self, element: &ElementRef) -> Result<bool>;

	async fn set_window_size(&self, width: u32, height: u32) -> Result<()>;

	async fn maximize(&self) -> Result<()>;

	/// Runs a Chrome DevTools protocol command.
	async fn execute_cdp(&self, command: &str, _params: Value) -> Result<Value> {
		Err(Error::Unsupported(format!(
			"{command}: DevTools commands are not available for {}",
			self.browser()
		)))
	}

	/// Ends the session. Calling it again is a no-op.
	async fn quit(&self) -> Result<()>;
}
