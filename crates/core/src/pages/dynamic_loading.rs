use tracing::info;
use uitest_protocol::Locator;

use super::base::BasePage;
use crate::Result;

pub fn page_loaded_indicator() -> Locator {
	Locator::css(".example h3")
}

pub fn example_link(example: LoadingExample) -> Locator {
	Locator::link_text(example.title())
}

pub fn example_loaded_indicator() -> Locator {
	Locator::css(".example h4")
}

pub fn start_button() -> Locator {
	Locator::css("div#start >button")
}

pub fn loader() -> Locator {
	Locator::css("div#loading")
}

pub fn success_message() -> Locator {
	Locator::css("div#finish > h4")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingExample {
	/// The result is on the page but hidden.
	HiddenElement,
	/// The result is added to the page after loading.
	RenderedAfter,
}

impl LoadingExample {
	pub fn title(self) -> &'static str {
		match self {
			Self::HiddenElement => "Example 1: Element on page that is hidden",
			Self::RenderedAfter => "Example 2: Element rendered after the fact",
		}
	}
}

/// The index of the two loading examples.
#[derive(Clone)]
pub struct DynamicLoadingPage {
	base: BasePage,
}

impl DynamicLoadingPage {
	pub async fn load(base: BasePage) -> Result<Self> {
		base.wait_for_page_to_load(&page_loaded_indicator(), None).await?;
		Ok(Self { base })
	}

	pub async fn click_example(&self, example: LoadingExample) -> Result<LoadingExamplePage> {
		info!(target = "uitest", page = example.title(), "Navigating to example");
		self.base.click_element(&example_link(example)).await?;
		LoadingExamplePage::load(self.base.clone(), example).await
	}
}

/// One loading example: a start button, a loader, then a message.
#[derive(Clone)]
pub struct LoadingExamplePage {
	base: BasePage,
	example: LoadingExample,
}

impl LoadingExamplePage {
	pub async fn load(base: BasePage, example: LoadingExample) -> Result<Self> {
		base.wait_for_page_to_load(&example_loaded_indicator(), None).await?;
		Ok(Self { base, example })
	}

	pub fn example(&self) -> LoadingExample {
		self.example
	}

	/// Starts loading and waits for the loader to finish.
	///
	/// Returns whether the loader completed in time.
	pub async fn click_start_button(&self) -> Result<bool> {
		self.base.click_element(&start_button()).await?;
		self.base.wait_for_loader(&loader(), None).await
	}

	pub async fn success_message(&self) -> Result<String> {
		self.base.get_dynamic_element_text(&success_message(), None).await
	}
}
