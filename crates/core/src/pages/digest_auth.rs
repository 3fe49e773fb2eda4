use uitest_protocol::Locator;

use super::base::BasePage;
use crate::{Error, ErrorKind, Result};

pub fn authorized_indicator() -> Locator {
	Locator::css("div#content p")
}

const SOURCE_SNIPPET_CHARS: usize = 500;

#[derive(Clone)]
pub struct DigestAuthPage {
	base: BasePage,
}

impl DigestAuthPage {
	pub fn new(base: BasePage) -> Self {
		Self { base }
	}

	/// Whether the authorized message appeared.
	///
	/// A timeout or an open authentication prompt counts as a failed login.
	pub async fn is_login_successful(&self) -> Result<bool> {
		match self.base.get_dynamic_element_text(&authorized_indicator(), None).await {
			Ok(_) => Ok(true),
			Err(e) if e.kind() == ErrorKind::Timeout => Ok(false),
			Err(Error::WebDriver { code, .. }) if code == "unexpected alert open" => Ok(false),
			Err(e) => Err(e),
		}
	}

	pub async fn page_source_snippet(&self) -> Result<String> {
		let source = self
			.base
			.driver()
			.execute_script("return document.documentElement.outerHTML;", Vec::new())
			.await?;
		let source = source.as_str().unwrap_or_default();
		Ok(source.chars().take(SOURCE_SNIPPET_CHARS).collect())
	}
}
