//! Page objects for the application under test.
//!
//! [`PageManager`] is the entry point handed to tests: one method per
//! feature page, each returning a typed page bound to the shared driver.

pub mod base;
pub mod checkboxes;
pub mod digest_auth;
pub mod dynamic_loading;
pub mod form_auth;
pub mod main_page;

use std::sync::Arc;

use tracing::info;
use url::Url;

pub use self::base::BasePage;
pub use self::checkboxes::CheckboxesPage;
pub use self::digest_auth::DigestAuthPage;
pub use self::dynamic_loading::{DynamicLoadingPage, LoadingExample, LoadingExamplePage};
pub use self::form_auth::{FormAuthenticationPage, SecureAreaPage};
pub use self::main_page::MainPage;
use crate::config::HarnessConfig;
use crate::driver::Driver;
use crate::{Error, Result};

#[derive(Clone)]
pub struct PageManager {
	main: MainPage,
}

impl PageManager {
	pub fn new(driver: Arc<dyn Driver>, config: &HarnessConfig) -> Self {
		Self::from_base(BasePage::new(driver, config))
	}

	pub fn from_base(base: BasePage) -> Self {
		Self {
			main: MainPage::new(base),
		}
	}

	pub fn main_page(&self) -> &MainPage {
		&self.main
	}

	/// Opens `url` and waits for the index page heading.
	pub async fn navigate_to_base_url(&self, url: &str) -> Result<MainPage> {
		info!(target = "uitest", url, "Navigating to base URL");
		let base = self.main.base();
		base.navigate_to(url).await?;
		base.wait_for_page_to_load(&main_page::page_loaded_indicator(), None)
			.await?;
		Ok(self.main.clone())
	}

	pub async fn checkboxes_page(&self) -> Result<CheckboxesPage> {
		self.main.click_checkboxes().await
	}

	pub async fn form_authentication_page(&self) -> Result<FormAuthenticationPage> {
		self.main.click_form_authentication().await
	}

	pub async fn dynamic_loading_page(&self) -> Result<DynamicLoadingPage> {
		self.main.click_dynamic_loading().await
	}

	/// Opens the digest-auth page with the credentials embedded in the URL.
	pub async fn digest_auth_page(&self, username: &str, password: &str) -> Result<DigestAuthPage> {
		let url = digest_auth_url(self.main.base().base_url(), username, password)?;
		self.main.open_digest_auth(&url).await
	}
}

/// `<base>/digest_auth` with `username:password@` in the authority.
///
/// # Errors
///
/// [`Error::InvalidArgument`] when either credential is empty.
pub fn digest_auth_url(base_url: &str, username: &str, password: &str) -> Result<String> {
	if username.is_empty() || password.is_empty() {
		let shown = if password.is_empty() { "" } else { "***" };
		return Err(Error::InvalidArgument(format!(
			"Invalid credentials: username='{username}', password='{shown}'"
		)));
	}
	let base = Url::parse(base_url).map_err(|e| Error::InvalidConfig(format!("BASE_URL '{base_url}': {e}")))?;
	let mut url = base
		.join("digest_auth")
		.map_err(|e| Error::InvalidConfig(format!("BASE_URL '{base_url}': {e}")))?;
	url.set_username(username)
		.and_then(|()| url.set_password(Some(password)))
		.map_err(|()| Error::InvalidArgument(format!("cannot embed credentials in '{base_url}'")))?;
	Ok(url.into())
}
