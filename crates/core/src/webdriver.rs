//! [`Driver`] implementation over the W3C WebDriver HTTP protocol.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uitest_protocol::{
	BrowserKind, CdpRequest, ElementRef, ExecuteScriptRequest, FindRequest, ImageFormat, Locator,
	NavigateRequest, NewSessionRequest, NewSessionResponse, SendKeysRequest, SetRectRequest,
	decode_image,
};
use uitest_runtime::{DriverService, WebDriverClient};

use crate::driver::{Driver, Screenshot, ScreenshotOptions};
use crate::{Error, Result};

/// One browser session behind a driver service the session owns.
///
/// Quitting deletes the session and shuts the service down. If the value
/// is dropped without [`Driver::quit`], the service process is still killed.
#[derive(Debug)]
pub struct WebDriverSession {
	client: WebDriverClient,
	browser: BrowserKind,
	session_id: RwLock<Option<String>>,
	service: Mutex<Option<DriverService>>,
}

impl WebDriverSession {
	/// Opens a session on `service`, shutting the service down on failure.
	pub async fn start(service: DriverService, browser: BrowserKind, request: &NewSessionRequest) -> Result<Self> {
		let client = service.client().clone();
		match client.post::<_, NewSessionResponse>("session", request).await {
			Ok(created) => {
				info!(target = "uitest", %browser, session = %created.session_id, "Browser session created");
				Ok(Self {
					client,
					browser,
					session_id: RwLock::new(Some(created.session_id)),
					service: Mutex::new(Some(service)),
				})
			}
			Err(e) => {
				if let Err(shutdown) = service.shutdown().await {
					debug!(target = "uitest", error = %shutdown, "Driver shutdown after failed session");
				}
				Err(Error::LaunchFailed(format!("{browser} session was not created: {e}")))
			}
		}
	}

	fn path(&self, suffix: &str) -> Result<String> {
		match self.session_id.read().as_deref() {
			Some(id) => Ok(format!("session/{id}/{suffix}")),
			None => Err(Error::InvalidSession("session has been quit".to_string())),
		}
	}

	/// Forgets the session id when the driver reports it gone.
	fn observe<T>(&self, result: Result<T>) -> Result<T> {
		if let Err(e) = &result {
			if e.is_session_gone() {
				self.session_id.write().take();
			}
		}
		result
	}

	async fn get<T: DeserializeOwned>(&self, suffix: &str) -> Result<T> {
		let path = self.path(suffix)?;
		let result = self.client.get(&path).await;
		self.observe(result)
	}

	async fn post<B, T>(&self, suffix: &str, body: &B) -> Result<T>
	where
		B: Serialize + Sync + ?Sized,
		T: DeserializeOwned,
	{
		let path = self.path(suffix)?;
		let result = self.client.post(&path, body).await;
		self.observe(result)
	}

	async fn post_unit<B: Serialize + Sync + ?Sized>(&self, suffix: &str, body: &B) -> Result<()> {
		let _: Value = self.post(suffix, body).await?;
		Ok(())
	}
}

fn decode(data: &str) -> Result<Vec<u8>> {
	decode_image(data).map_err(|e| Error::WebDriver {
		code: "invalid screenshot data".to_string(),
		message: e.to_string(),
	})
}

fn element_path(element: &ElementRef, action: &str) -> String {
	format!("element/{}/{action}", element.id)
}

#[async_trait]
impl Driver for WebDriverSession {
	fn session_id(&self) -> Option<String> {
		self.session_id.read().clone()
	}

	fn browser(&self) -> BrowserKind {
		self.browser
	}

	async fn navigate(&self, url: &str) -> Result<()> {
		debug!(target = "uitest", url, "Navigating");
		self.post_unit("url", &NavigateRequest { url }).await
	}

	async fn current_url(&self) -> Result<String> {
		self.get("url").await
	}

	async fn title(&self) -> Result<String> {
		self.get("title").await
	}

	async fn refresh(&self) -> Result<()> {
		self.post_unit("refresh", &json!({})).await
	}

	async fn find(&self, locator: &Locator, scope: Option<&ElementRef>) -> Result<ElementRef> {
		let suffix = match scope {
			Some(parent) => element_path(parent, "element"),
			None => "element".to_string(),
		};
		let request = FindRequest {
			using: locator.using.as_str(),
			value: &locator.value,
		};
		match self.post(&suffix, &request).await {
			Err(Error::NoSuchElement(message)) => Err(Error::NoSuchElement(format!("{locator}: {message}"))),
			other => other,
		}
	}

	async fn find_all(&self, locator: &Locator, scope: Option<&ElementRef>) -> Result<Vec<ElementRef>> {
		let suffix = match scope {
			Some(parent) => element_path(parent, "elements"),
			None => "elements".to_string(),
		};
		let request = FindRequest {
			using: locator.using.as_str(),
			value: &locator.value,
		};
		self.post(&suffix, &request).await
	}

	async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value> {
		self.post("execute/sync", &ExecuteScriptRequest { script, args })
			.await
	}

	async fn capture_screenshot(&self, options: ScreenshotOptions) -> Result<Screenshot> {
		if self.browser == BrowserKind::Chrome {
			let mut params = json!({ "format": options.format, "fromSurface": true });
			if let (ImageFormat::Jpeg, Some(quality)) = (options.format, options.quality) {
				params["quality"] = json!(quality);
			}
			let result = self.execute_cdp("Page.captureScreenshot", params).await?;
			let data = result
				.get("data")
				.and_then(Value::as_str)
				.ok_or_else(|| Error::WebDriver {
					code: "invalid screenshot data".to_string(),
					message: "Page.captureScreenshot returned no data".to_string(),
				})?;
			return Ok(Screenshot {
				format: options.format,
				data: decode(data)?,
			});
		}

		let data: String = self.get("screenshot").await?;
		Ok(Screenshot {
			format: ImageFormat::Png,
			data: decode(&data)?,
		})
	}

	async fn click(&self, element: &ElementRef) -> Result<()> {
		self.post_unit(&element_path(element, "click"), &json!({})).await
	}

	async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()> {
		self.post_unit(&element_path(element, "value"), &SendKeysRequest { text })
			.await
	}

	async fn clear(&self, element: &ElementRef) -> Result<()> {
		self.post_unit(&element_path(element, "clear"), &json!({})).await
	}

	async fn text(&self, element: &ElementRef) -> Result<String> {
		self.get(&element_path(element, "text")).await
	}

	async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
		self.get(&element_path(element, &format!("attribute/{name}")))
			.await
	}

	async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
		self.get(&element_path(element, "displayed")).await
	}

	async fn is_enabled(&self, element: &ElementRef) -> Result<bool> {
		self.get(&element_path(element, "enabled")).await
	}

	async fn is_selected(&self, element: &ElementRef) -> Result<bool> {
		self.get(&element_path(element, "selected")).await
	}

	async fn set_window_size(&self, width: u32, height: u32) -> Result<()> {
		let rect = SetRectRequest {
			width: Some(width),
			height: Some(height),
			..Default::default()
		};
		self.post_unit("window/rect", &rect).await
	}

	async fn maximize(&self) -> Result<()> {
		self.post_unit("window/maximize", &json!({})).await
	}

	async fn execute_cdp(&self, command: &str, params: Value) -> Result<Value> {
		if self.browser != BrowserKind::Chrome {
			return Err(Error::Unsupported(format!(
				"{command}: DevTools commands are not available for {}",
				self.browser
			)));
		}
		self.post("goog/cdp/execute", &CdpRequest { cmd: command, params })
			.await
	}

	async fn quit(&self) -> Result<()> {
		let session = self.session_id.write().take();
		let mut first_error = None;

		if let Some(id) = session {
			if let Err(e) = self.client.delete(&format!("session/{id}")).await {
				first_error = Some(e);
			}
		}
		if let Some(service) = self.service.lock().await.take() {
			if let Err(e) = service.shutdown().await {
				first_error.get_or_insert(e);
			}
		}

		match first_error {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}
}
