//! HTTP connection to a running WebDriver service.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;
use uitest_protocol::{DriverStatus, Envelope, WireError};
use url::Url;

use crate::error::{Error, Result};

/// Upper bound for a single WebDriver command, page loads included.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Thin JSON client for the W3C WebDriver HTTP API.
///
/// Every response is unwrapped from its `{"value": ...}` envelope; error
/// payloads are converted with [`Error::from_wire`] so callers see the
/// original failure kind.
#[derive(Debug, Clone)]
pub struct WebDriverClient {
	http: reqwest::Client,
	base: Url,
}

impl WebDriverClient {
	pub fn new(base: Url) -> Result<Self> {
		Self::with_timeout(base, DEFAULT_COMMAND_TIMEOUT)
	}

	pub fn with_timeout(mut base: Url, timeout: Duration) -> Result<Self> {
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());
			base.set_path(&path);
		}
		let http = reqwest::Client::builder().timeout(timeout).build()?;
		Ok(Self { http, base })
	}

	pub fn base_url(&self) -> &Url {
		&self.base
	}

	fn endpoint(&self, path: &str) -> Result<Url> {
		self.base
			.join(path.trim_start_matches('/'))
			.map_err(|e| Error::InvalidArgument(format!("bad endpoint '{path}': {e}")))
	}

	/// `GET /status`
	pub async fn status(&self) -> Result<DriverStatus> {
		self.get("status").await
	}

	pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
		self.send(Method::GET, path, None::<&()>).await
	}

	pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
	where
		B: Serialize + ?Sized,
		T: DeserializeOwned,
	{
		self.send(Method::POST, path, Some(body)).await
	}

	pub async fn delete(&self, path: &str) -> Result<()> {
		let _: serde_json::Value = self.send(Method::DELETE, path, None::<&()>).await?;
		Ok(())
	}

	async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
	where
		B: Serialize + ?Sized,
		T: DeserializeOwned,
	{
		let url = self.endpoint(path)?;
		trace!(target = "uitest", %method, %url, "WebDriver command");

		let mut request = self.http.request(method, url);
		if let Some(body) = body {
			request = request.json(body);
		}
		let response = request.send().await?;
		let status = response.status();
		let bytes = response.bytes().await?;

		if status.is_success() {
			let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
			return Ok(envelope.value);
		}
		Err(error_from_body(status, &bytes))
	}
}

fn error_from_body(status: StatusCode, body: &[u8]) -> Error {
	match serde_json::from_slice::<Envelope<WireError>>(body) {
		Ok(envelope) => Error::from_wire(envelope.value),
		Err(_) => Error::WebDriver {
			code: status.as_str().to_string(),
			message: String::from_utf8_lossy(body).into_owned(),
		},
	}
}
