use tracing::info;
use uitest_protocol::Locator;

use super::base::BasePage;
use crate::Result;

const CHECKBOXES: &str = "form#checkboxes input[type='checkbox']";

pub fn page_loaded_indicator() -> Locator {
	Locator::css("div.example h3")
}

/// Locator of the checkbox at zero-based `index`.
pub fn checkbox(index: usize) -> Locator {
	Locator::css(format!("{CHECKBOXES}:nth-of-type({})", index + 1))
}

#[derive(Clone)]
pub struct CheckboxesPage {
	base: BasePage,
}

impl CheckboxesPage {
	pub async fn load(base: BasePage) -> Result<Self> {
		base.wait_for_page_to_load(&page_loaded_indicator(), None).await?;
		Ok(Self { base })
	}

	pub fn base(&self) -> &BasePage {
		&self.base
	}

	pub async fn set_checkbox(&self, index: usize, checked: bool) -> Result<()> {
		info!(target = "uitest", index, checked, "Setting checkbox");
		if self.is_checkbox_checked(index).await? != checked {
			self.click_checkbox(index).await?;
		}
		Ok(())
	}

	pub async fn is_checkbox_checked(&self, index: usize) -> Result<bool> {
		self.base.is_element_selected(&checkbox(index), None).await
	}

	pub async fn click_checkbox(&self, index: usize) -> Result<()> {
		self.base.click_element(&checkbox(index)).await
	}

	pub async fn count(&self) -> Result<usize> {
		self.base.count_elements(&Locator::css(CHECKBOXES)).await
	}
}
