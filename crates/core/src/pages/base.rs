//! Shared page-object behaviour.
//!
//! Waits default to the short timeout, page loads and loaders to the long
//! one. Clicks, typing and state reads retry transient errors; text reads
//! retry stale references only.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};
use uitest_protocol::{ElementRef, Locator};

use crate::config::HarnessConfig;
use crate::driver::Driver;
use crate::wait::{self, RetryPolicy};
use crate::{Error, ErrorKind, Result};

/// A driver handle plus the configured timeouts.
#[derive(Clone)]
pub struct BasePage {
	driver: Arc<dyn Driver>,
	short_timeout: Duration,
	long_timeout: Duration,
	base_url: String,
}

impl BasePage {
	pub fn new(driver: Arc<dyn Driver>, config: &HarnessConfig) -> Self {
		Self::with_timeouts(driver, config.short_timeout, config.long_timeout, &config.base_url)
	}

	pub fn with_timeouts(driver: Arc<dyn Driver>, short_timeout: Duration, long_timeout: Duration, base_url: &str) -> Self {
		Self {
			driver,
			short_timeout,
			long_timeout,
			base_url: base_url.to_string(),
		}
	}

	pub fn driver(&self) -> &Arc<dyn Driver> {
		&self.driver
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	pub fn short_timeout(&self) -> Duration {
		self.short_timeout
	}

	pub fn long_timeout(&self) -> Duration {
		self.long_timeout
	}

	pub async fn navigate_to(&self, url: &str) -> Result<()> {
		info!(target = "uitest", url, "Navigating to URL");
		self.driver.navigate(url).await?;
		debug!(target = "uitest", url, "Navigation completed");
		Ok(())
	}

	/// Waits for `indicator` to become visible.
	pub async fn wait_for_page_to_load(&self, indicator: &Locator, timeout: Option<Duration>) -> Result<()> {
		let timeout = timeout.unwrap_or(self.long_timeout);
		info!(target = "uitest", %indicator, timeout_ms = timeout.as_millis() as u64, "Waiting for page to load");
		match wait::visible(self.driver.as_ref(), indicator, timeout).await {
			Ok(_) => {
				info!(target = "uitest", %indicator, "Page loaded");
				Ok(())
			}
			Err(e) => {
				error!(target = "uitest", %indicator, error = %e, "Page load failed");
				Err(e)
			}
		}
	}

	pub async fn wait_for_visibility(&self, locator: &Locator, timeout: Option<Duration>) -> Result<ElementRef> {
		let timeout = timeout.unwrap_or(self.short_timeout);
		wait::visible(self.driver.as_ref(), locator, timeout)
			.await
			.inspect_err(|e| error!(target = "uitest", %locator, error = %e, "Element not visible"))
	}

	/// Waits for `locator` to be shown and then hidden again.
	pub async fn wait_for_invisibility(&self, locator: &Locator, timeout: Option<Duration>) -> Result<()> {
		let timeout = timeout.unwrap_or(self.short_timeout);
		self.wait_for_visibility(locator, Some(timeout)).await?;
		wait::invisible(self.driver.as_ref(), locator, timeout).await
	}

	/// Waits for a loading indicator to appear and disappear.
	///
	/// Each half gets half of `timeout` (at least one second). Returns
	/// `false` instead of an error when either half times out.
	pub async fn wait_for_loader(&self, locator: &Locator, timeout: Option<Duration>) -> Result<bool> {
		let timeout = timeout.unwrap_or(self.long_timeout);
		let half = (timeout / 2).max(Duration::from_secs(1));
		info!(target = "uitest", %locator, "Waiting for loader to disappear");
		match self.wait_for_invisibility(locator, Some(half)).await {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == ErrorKind::Timeout => {
				warn!(target = "uitest", %locator, error = %e, "Loader timed out");
				Ok(false)
			}
			Err(e) => Err(e),
		}
	}

	pub async fn click_element(&self, locator: &Locator) -> Result<()> {
		RetryPolicy::transient().run(|| self.click_once(locator)).await
	}

	async fn click_once(&self, locator: &Locator) -> Result<()> {
		let element = self.wait_for_visibility(locator, None).await?;
		wait::clickable(self.driver.as_ref(), locator, self.short_timeout).await?;
		self.driver.click(&element).await?;
		debug!(target = "uitest", %locator, "Clicked element");
		Ok(())
	}

	/// Visible text of `locator`, re-finding the element if it goes stale.
	pub async fn get_dynamic_element_text(&self, locator: &Locator, timeout: Option<Duration>) -> Result<String> {
		let timeout = timeout.unwrap_or(self.long_timeout);
		let result = RetryPolicy::stale_only().run(|| self.text_once(locator, timeout)).await;
		if let Err(e) = &result {
			error!(target = "uitest", %locator, error = %e, "Failed to get element text");
		}
		result
	}

	async fn text_once(&self, locator: &Locator, timeout: Duration) -> Result<String> {
		let element = self.wait_for_visibility(locator, Some(timeout)).await?;
		let text = self.driver.text(&element).await?;
		debug!(target = "uitest", %locator, text = %text, "Retrieved text");
		Ok(text)
	}

	pub async fn send_keys_to_element(&self, locator: &Locator, text: &str) -> Result<()> {
		info!(target = "uitest", %locator, "Sending keys to element");
		RetryPolicy::transient().run(|| self.send_keys_once(locator, text)).await
	}

	async fn send_keys_once(&self, locator: &Locator, text: &str) -> Result<()> {
		let element = self.wait_for_visibility(locator, None).await?;
		self.driver.send_keys(&element, text).await
	}

	pub async fn is_element_selected(&self, locator: &Locator, timeout: Option<Duration>) -> Result<bool> {
		RetryPolicy::transient()
			.run(|| async {
				let element = self.wait_for_visibility(locator, timeout).await?;
				self.driver.is_selected(&element).await
			})
			.await
	}

	pub async fn is_element_enabled(&self, locator: &Locator, timeout: Option<Duration>) -> Result<bool> {
		RetryPolicy::transient()
			.run(|| async {
				let element = self.wait_for_visibility(locator, timeout).await?;
				self.driver.is_enabled(&element).await
			})
			.await
	}

	/// Whether `locator` becomes visible within the timeout.
	pub async fn is_element_visible(&self, locator: &Locator, timeout: Option<Duration>) -> Result<bool> {
		let timeout = timeout.unwrap_or(self.short_timeout);
		match wait::visible(self.driver.as_ref(), locator, timeout).await {
			Ok(_) => Ok(true),
			Err(e) if e.kind() == ErrorKind::Timeout => Ok(false),
			Err(e) => Err(e),
		}
	}

	/// Elements matching `locator`, or none if nothing shows up in time.
	pub async fn all_elements(&self, locator: &Locator) -> Result<Vec<ElementRef>> {
		match wait::all_present(self.driver.as_ref(), locator, self.short_timeout).await {
			Ok(found) => Ok(found),
			Err(e) if e.kind() == ErrorKind::Timeout => {
				debug!(target = "uitest", %locator, "No elements found");
				Ok(Vec::new())
			}
			Err(e) => Err(e),
		}
	}

	pub async fn count_elements(&self, locator: &Locator) -> Result<usize> {
		let count = self.all_elements(locator).await?.len();
		debug!(target = "uitest", %locator, count, "Counted elements");
		Ok(count)
	}

	/// Reads a DOM property through JavaScript; script errors yield `None`.
	pub async fn element_property(&self, element: &ElementRef, property: &str) -> Result<Option<Value>> {
		let script = format!("return arguments[0].{property};");
		match self.driver.execute_script(&script, vec![element.to_value()]).await {
			Ok(value) => Ok(Some(value)),
			Err(Error::JavaScript(message)) => {
				error!(target = "uitest", property, error = %message, "Failed to read property");
				Ok(None)
			}
			Err(e) => Err(e),
		}
	}

	pub async fn current_url(&self) -> Result<String> {
		self.driver.current_url().await
	}

	pub async fn refresh(&self) -> Result<()> {
		self.driver.refresh().await
	}

	/// Regular files directly inside `dir`.
	pub fn files_in_directory(&self, dir: &Path) -> Result<Vec<PathBuf>> {
		let mut files = Vec::new();
		for entry in std::fs::read_dir(dir)? {
			let entry = entry?;
			if entry.file_type()?.is_file() {
				files.push(entry.path());
			}
		}
		files.sort();
		Ok(files)
	}
}
