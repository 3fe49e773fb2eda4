mod clean;
mod doctor;
mod driver;
mod env;
mod smoke;

use uitest::{HarnessConfig, ResourceLayout, WorkerId};

use crate::cli::{Commands, DriverAction};

pub async fn dispatch(command: Commands, config: HarnessConfig) -> anyhow::Result<()> {
	match command {
		Commands::Doctor => doctor::execute(&config),
		Commands::Clean { user_data } => clean::execute(&config, user_data).await,
		Commands::Driver { action } => match action {
			DriverAction::Which => driver::which(&config),
			DriverAction::Cache { path } => driver::cache(&config, &path),
		},
		Commands::Env => env::execute(&config),
		Commands::Smoke => smoke::execute(config).await,
	}
}

/// Directories of the worker this process runs as.
fn current_layout(config: &HarnessConfig) -> ResourceLayout {
	ResourceLayout::new(&config.artifacts_root, WorkerId::current().clone())
}
