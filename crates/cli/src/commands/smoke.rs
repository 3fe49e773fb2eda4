use uitest::{CaptureResult, Harness, HarnessConfig, TestCase};

pub async fn execute(config: HarnessConfig) -> anyhow::Result<()> {
	let mut harness = Harness::start(config).await?;
	let report = harness
		.run(TestCase::new("smoke_base_url_heading").ui(), |fixtures| async move {
			let heading = fixtures.pages()?.main_page().heading().await?;
			anyhow::ensure!(!heading.trim().is_empty(), "page heading is empty");
			Ok(())
		})
		.await;
	let summary = harness.finish().await;

	println!(
		"{}: {} in {:.2}s",
		report.name,
		report.outcome,
		report.duration.as_secs_f64()
	);
	if let Some(message) = &report.message {
		println!("  {message}");
	}
	for capture in &report.captures {
		if let CaptureResult::Saved { path, .. } = capture {
			println!("  screenshot: {}", path.display());
		}
	}
	if let Some(video) = report.recording.as_ref().and_then(|r| r.video()) {
		println!("  video: {}", video.display());
	}
	println!("{summary}");

	anyhow::ensure!(report.passed(), "smoke test {}", report.outcome.as_str().to_lowercase());
	Ok(())
}
