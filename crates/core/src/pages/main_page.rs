use uitest_protocol::Locator;

use super::base::BasePage;
use super::checkboxes::CheckboxesPage;
use super::digest_auth::DigestAuthPage;
use super::dynamic_loading::DynamicLoadingPage;
use super::form_auth::FormAuthenticationPage;
use crate::Result;

pub fn page_loaded_indicator() -> Locator {
	Locator::css("h1.heading")
}

pub fn checkboxes_link() -> Locator {
	Locator::link_text("Checkboxes")
}

pub fn dynamic_loading_link() -> Locator {
	Locator::link_text("Dynamic Loading")
}

pub fn form_authentication_link() -> Locator {
	Locator::link_text("Form Authentication")
}

/// The index page listing every example.
#[derive(Clone)]
pub struct MainPage {
	base: BasePage,
}

impl MainPage {
	pub fn new(base: BasePage) -> Self {
		Self { base }
	}

	pub fn base(&self) -> &BasePage {
		&self.base
	}

	pub async fn heading(&self) -> Result<String> {
		self.base.get_dynamic_element_text(&page_loaded_indicator(), None).await
	}

	pub async fn click_checkboxes(&self) -> Result<CheckboxesPage> {
		self.base.click_element(&checkboxes_link()).await?;
		CheckboxesPage::load(self.base.clone()).await
	}

	pub async fn click_dynamic_loading(&self) -> Result<DynamicLoadingPage> {
		self.base.click_element(&dynamic_loading_link()).await?;
		DynamicLoadingPage::load(self.base.clone()).await
	}

	pub async fn click_form_authentication(&self) -> Result<FormAuthenticationPage> {
		self.base.click_element(&form_authentication_link()).await?;
		FormAuthenticationPage::load(self.base.clone()).await
	}

	/// Opens the digest-auth page at `url`, which carries the credentials.
	pub async fn open_digest_auth(&self, url: &str) -> Result<DigestAuthPage> {
		self.base.navigate_to(url).await?;
		Ok(DigestAuthPage::new(self.base.clone()))
	}
}
