use uitest::encoder::FfmpegEncoder;
use uitest::{HarnessConfig, ResourcePurpose, WebDriverLauncher};

use super::current_layout;

pub fn execute(config: &HarnessConfig) -> anyhow::Result<()> {
	let layout = current_layout(config);
	let worker = layout.worker();
	println!("worker:      {worker}");
	println!(
		"debug port:  {}",
		worker.debug_port_in(config.debug_port_base, config.debug_port_window)
	);
	for purpose in ResourcePurpose::ALL {
		println!("{:<12} {}", format!("{}:", purpose.as_str()), layout.dir(purpose).display());
	}

	let resolved = WebDriverLauncher::new(config.driver_cache_days)
		.resolver(config.browser)
		.resolve();
	match &resolved {
		Ok(driver) => println!("driver:      {} ({:?})", driver.path.display(), driver.source),
		Err(e) => println!("driver:      missing ({e})"),
	}

	let encoder = FfmpegEncoder::new();
	if encoder.is_available() {
		println!("encoder:     {}", encoder.binary().display());
	} else {
		println!("encoder:     missing (video recording will be skipped)");
	}

	resolved?;
	Ok(())
}
