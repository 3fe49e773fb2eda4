use clap::Parser;
use uitest::logging;
use uitest_cli::cli::{Cli, Commands};
use uitest_cli::commands;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();

	let config = match cli.harness_config() {
		Ok(config) => config,
		Err(err) => {
			eprintln!("error: {err:#}");
			std::process::exit(2);
		}
	};

	// Only the smoke run produces a log worth keeping on disk.
	let log_file = match cli.command {
		Commands::Smoke => config.log_file.clone(),
		_ => None,
	};
	if let Err(err) = logging::init_logging(cli.verbose, log_file.as_deref()) {
		eprintln!("warning: file logging disabled: {err}");
	}

	if let Err(err) = commands::dispatch(cli.command, config).await {
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}
