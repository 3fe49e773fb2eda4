use std::path::Path;

use anyhow::Context;
use uitest::{HarnessConfig, WebDriverLauncher};

pub fn which(config: &HarnessConfig) -> anyhow::Result<()> {
	let driver = WebDriverLauncher::new(config.driver_cache_days)
		.resolver(config.browser)
		.resolve()?;
	println!("{}", driver.path.display());
	tracing::info!(target = "uitest", source = ?driver.source, "Driver resolved");
	Ok(())
}

pub fn cache(config: &HarnessConfig, path: &Path) -> anyhow::Result<()> {
	anyhow::ensure!(path.is_file(), "{} is not a file", path.display());
	let target = WebDriverLauncher::new(config.driver_cache_days)
		.resolver(config.browser)
		.install_into_cache(path)
		.with_context(|| format!("failed to cache {}", path.display()))?;
	println!("{}", target.display());
	Ok(())
}
