use uitest::directories::prepare_worker_directories;
use uitest::{HarnessConfig, UserDataPolicy};

use super::current_layout;

pub async fn execute(config: &HarnessConfig, user_data: bool) -> anyhow::Result<()> {
	let layout = current_layout(config);
	let policy = if user_data {
		UserDataPolicy::Wipe
	} else {
		config.user_data_policy
	};
	prepare_worker_directories(&layout, policy, config.lock_timeout).await?;
	println!("cleaned directories for worker {}", layout.worker());
	Ok(())
}
