use uitest_protocol::Locator;

use super::base::BasePage;
use crate::Result;

pub fn page_loaded_indicator() -> Locator {
	Locator::css(".example h2")
}

pub fn username_field() -> Locator {
	Locator::css("#username")
}

pub fn password_field() -> Locator {
	Locator::css("#password")
}

pub fn login_button() -> Locator {
	Locator::css("button[type='submit']")
}

pub fn logout_button() -> Locator {
	Locator::css("a[href='/logout']")
}

pub fn flash_message() -> Locator {
	Locator::css("#flash")
}

/// The login form.
#[derive(Clone)]
pub struct FormAuthenticationPage {
	base: BasePage,
}

impl FormAuthenticationPage {
	pub async fn load(base: BasePage) -> Result<Self> {
		base.wait_for_page_to_load(&page_loaded_indicator(), None).await?;
		Ok(Self { base })
	}

	pub async fn enter_username(&self, username: &str) -> Result<()> {
		self.base.send_keys_to_element(&username_field(), username).await
	}

	pub async fn enter_password(&self, password: &str) -> Result<()> {
		self.base.send_keys_to_element(&password_field(), password).await
	}

	/// Submits credentials that are expected to be accepted.
	pub async fn click_login_correct(&self) -> Result<SecureAreaPage> {
		self.base.click_element(&login_button()).await?;
		SecureAreaPage::load(self.base.clone()).await
	}

	/// Submits credentials that are expected to be rejected; stays on the form.
	pub async fn click_login_invalid(&self) -> Result<()> {
		self.base.click_element(&login_button()).await
	}

	pub async fn flash_message(&self) -> Result<String> {
		self.base.get_dynamic_element_text(&flash_message(), None).await
	}
}

/// The page behind a successful login.
#[derive(Clone)]
pub struct SecureAreaPage {
	base: BasePage,
}

impl SecureAreaPage {
	pub async fn load(base: BasePage) -> Result<Self> {
		base.wait_for_page_to_load(&page_loaded_indicator(), None).await?;
		Ok(Self { base })
	}

	pub async fn flash_message(&self) -> Result<String> {
		self.base.get_dynamic_element_text(&flash_message(), None).await
	}

	pub async fn click_logout(&self) -> Result<FormAuthenticationPage> {
		self.base.click_element(&logout_button()).await?;
		FormAuthenticationPage::load(self.base.clone()).await
	}
}
