//! Waiting and retrying around page interactions.
//!
//! [`wait_until`] polls a condition: `Ok(None)` means "not yet", a stale
//! element means "not yet" too, and every other error propagates at once.
//! [`retry`] re-runs an action only for errors its predicate accepts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, trace, warn};
use uitest_protocol::{ElementRef, Locator};

use crate::driver::Driver;
use crate::{Error, ErrorKind, Result};

/// Default pause between condition checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Polls `condition` until it yields a value or `timeout` expires.
///
/// # Errors
///
/// [`Error::Timeout`] naming `description` on expiry, or the first
/// non-stale error raised by `condition`.
pub async fn wait_until<T, F, Fut>(description: &str, timeout: Duration, condition: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<Option<T>>>,
{
	wait_until_with(description, timeout, POLL_INTERVAL, condition).await
}

pub async fn wait_until_with<T, F, Fut>(description: &str, timeout: Duration, poll: Duration, mut condition: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<Option<T>>>,
{
	let deadline = Instant::now() + timeout;
	loop {
		match condition().await {
			Ok(Some(value)) => return Ok(value),
			Ok(None) => {}
			Err(e) if e.kind() == ErrorKind::StaleElement => {
				trace!(target = "uitest", condition = description, "Element went stale while waiting");
			}
			Err(e) => return Err(e),
		}
		let now = Instant::now();
		if now >= deadline {
			debug!(target = "uitest", condition = description, timeout_ms = timeout.as_millis() as u64, "Wait timed out");
			return Err(Error::Timeout {
				ms: timeout.as_millis() as u64,
				condition: description.to_string(),
			});
		}
		sleep(poll.min(deadline - now)).await;
	}
}

/// Runs `action` up to `attempts` times, retrying only errors accepted by
/// `is_retryable`. The last error is returned once attempts run out.
pub async fn retry<T, E, F, Fut, P>(attempts: usize, is_retryable: P, mut action: F) -> std::result::Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = std::result::Result<T, E>>,
	P: Fn(&E) -> bool,
	E: Display,
{
	let attempts = attempts.max(1);
	let mut attempt = 1;
	loop {
		match action().await {
			Ok(value) => return Ok(value),
			Err(e) if attempt < attempts && is_retryable(&e) => {
				warn!(target = "uitest", attempt, attempts, error = %e, "Transient failure; retrying");
				attempt += 1;
			}
			Err(e) => return Err(e),
		}
	}
}

/// A retry budget over a fixed set of error kinds.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub attempts: usize,
	pub retryable: &'static [ErrorKind],
}

impl RetryPolicy {
	/// Stale references and intercepted clicks, two attempts.
	pub const fn transient() -> Self {
		Self {
			attempts: 2,
			retryable: &[ErrorKind::StaleElement, ErrorKind::ClickIntercepted],
		}
	}

	/// Stale references only, two attempts.
	pub const fn stale_only() -> Self {
		Self {
			attempts: 2,
			retryable: &[ErrorKind::StaleElement],
		}
	}

	pub fn retries(&self, error: &Error) -> bool {
		self.retryable.contains(&error.kind())
	}

	pub async fn run<T, F, Fut>(&self, action: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		retry(self.attempts, |e| self.retries(e), action).await
	}
}

/// First displayed match of `locator`, if any.
pub async fn visible_now(driver: &dyn Driver, locator: &Locator) -> Result<Option<ElementRef>> {
	for element in driver.find_all(locator, None).await? {
		if driver.is_displayed(&element).await? {
			return Ok(Some(element));
		}
	}
	Ok(None)
}

/// `Some(())` when no match of `locator` is displayed.
pub async fn invisible_now(driver: &dyn Driver, locator: &Locator) -> Result<Option<()>> {
	for element in driver.find_all(locator, None).await? {
		match driver.is_displayed(&element).await {
			Ok(true) => return Ok(None),
			Ok(false) => {}
			Err(e) if e.kind() == ErrorKind::StaleElement => {}
			Err(e) => return Err(e),
		}
	}
	Ok(Some(()))
}

pub async fn present_now(driver: &dyn Driver, locator: &Locator) -> Result<Option<ElementRef>> {
	Ok(driver.find_all(locator, None).await?.into_iter().next())
}

async fn all_present_now(driver: &dyn Driver, locator: &Locator) -> Result<Option<Vec<ElementRef>>> {
	let found = driver.find_all(locator, None).await?;
	Ok((!found.is_empty()).then_some(found))
}

/// First displayed and enabled match of `locator`.
pub async fn clickable_now(driver: &dyn Driver, locator: &Locator) -> Result<Option<ElementRef>> {
	for element in driver.find_all(locator, None).await? {
		if driver.is_displayed(&element).await? && driver.is_enabled(&element).await? {
			return Ok(Some(element));
		}
	}
	Ok(None)
}

pub async fn visible(driver: &dyn Driver, locator: &Locator, timeout: Duration) -> Result<ElementRef> {
	let description = format!("visibility of {locator}");
	wait_until(&description, timeout, || visible_now(driver, locator)).await
}

pub async fn invisible(driver: &dyn Driver, locator: &Locator, timeout: Duration) -> Result<()> {
	let description = format!("invisibility of {locator}");
	wait_until(&description, timeout, || invisible_now(driver, locator)).await
}

pub async fn present(driver: &dyn Driver, locator: &Locator, timeout: Duration) -> Result<ElementRef> {
	let description = format!("presence of {locator}");
	wait_until(&description, timeout, || present_now(driver, locator)).await
}

/// Every current match of `locator` once at least one is present.
pub async fn all_present(driver: &dyn Driver, locator: &Locator, timeout: Duration) -> Result<Vec<ElementRef>> {
	let description = format!("presence of all {locator}");
	wait_until(&description, timeout, || all_present_now(driver, locator)).await
}

pub async fn clickable(driver: &dyn Driver, locator: &Locator, timeout: Duration) -> Result<ElementRef> {
	let description = format!("{locator} to be clickable");
	wait_until(&description, timeout, || clickable_now(driver, locator)).await
}
