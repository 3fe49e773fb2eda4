use std::path::PathBuf;

use anyhow::Context;
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Parser, Subcommand};
use uitest::{BrowserKind, HarnessConfig};

fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Yellow.on_default().bold())
		.usage(AnsiColor::Yellow.on_default().bold())
		.literal(AnsiColor::Green.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Parser, Debug)]
#[command(name = "uitest")]
#[command(about = "Browser UI test harness: driver checks, worker cleanup and a smoke run")]
#[command(version)]
#[command(styles = styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Browser to use (overrides BROWSER)
	#[arg(short, long, global = true, value_name = "KIND")]
	pub browser: Option<BrowserKind>,

	/// Application under test (overrides BASE_URL)
	#[arg(long, global = true, value_name = "URL")]
	pub base_url: Option<String>,

	/// Show the browser window
	#[arg(long, global = true)]
	pub headed: bool,

	/// Record a video of each test
	#[arg(long, global = true)]
	pub record: bool,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Check the driver, the video encoder and this worker's directories
	Doctor,

	/// Empty this worker's artifact directories
	Clean {
		/// Also wipe the browser profile
		#[arg(long)]
		user_data: bool,
	},

	/// Inspect or seed driver resolution
	Driver {
		#[command(subcommand)]
		action: DriverAction,
	},

	/// Write environment.properties into the report results directory
	Env,

	/// Open the base URL through the harness and check the page heading
	Smoke,
}

#[derive(Subcommand, Debug)]
pub enum DriverAction {
	/// Show which driver binary would be used
	Which,

	/// Copy a driver binary into the local cache
	Cache {
		/// Driver executable to install
		path: PathBuf,
	},
}

impl Cli {
	/// Environment configuration with the global flags applied on top.
	pub fn harness_config(&self) -> anyhow::Result<HarnessConfig> {
		let config = HarnessConfig::from_env().context("invalid harness configuration")?;
		Ok(self.apply(config))
	}

	pub fn apply(&self, mut config: HarnessConfig) -> HarnessConfig {
		if let Some(browser) = self.browser {
			config.browser = browser;
		}
		if let Some(url) = &self.base_url {
			config.base_url = url.clone();
		}
		if self.headed {
			config.headless = false;
		}
		if self.record {
			config.video_recording = true;
		}
		config
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn global_flags_override_the_environment() {
		let cli = Cli::try_parse_from(["uitest", "smoke", "--browser", "firefox", "--headed", "--record"]).unwrap();
		let config = cli.apply(HarnessConfig::default());
		assert_eq!(config.browser, BrowserKind::Firefox);
		assert!(!config.headless);
		assert!(config.video_recording);
		assert_eq!(config.base_url, HarnessConfig::default().base_url);
	}

	#[test]
	fn unknown_browser_is_rejected_by_the_parser() {
		let err = Cli::try_parse_from(["uitest", "-b", "safari", "doctor"]).unwrap_err();
		assert!(err.to_string().contains("safari"));
	}

	#[test]
	fn driver_cache_takes_a_path() {
		let cli = Cli::try_parse_from(["uitest", "driver", "cache", "/opt/chromedriver"]).unwrap();
		match cli.command {
			Commands::Driver {
				action: DriverAction::Cache { path },
			} => assert_eq!(path, PathBuf::from("/opt/chromedriver")),
			other => panic!("unexpected command {other:?}"),
		}
	}

	#[test]
	fn verbosity_counts() {
		let cli = Cli::try_parse_from(["uitest", "-vv", "clean", "--user-data"]).unwrap();
		assert_eq!(cli.verbose, 2);
		assert!(matches!(cli.command, Commands::Clean { user_data: true }));
	}
}
