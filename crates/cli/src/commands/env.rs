use anyhow::Context;
use uitest::HarnessConfig;
use uitest::report::{CiProvider, EnvironmentInfo, prepare_results_dir, write_environment_file};

pub fn execute(config: &HarnessConfig) -> anyhow::Result<()> {
	let dir = config
		.allure_dir
		.as_deref()
		.context("reporting is disabled (UITEST_ALLURE_DIR=off)")?;
	prepare_results_dir(dir, false)?;
	let env = EnvironmentInfo::from_config(config, CiProvider::detect());
	let path = write_environment_file(dir, &env)?;
	println!("{}", path.display());
	Ok(())
}
