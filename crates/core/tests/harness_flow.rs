//! End-to-end runs of the harness against the in-memory browser.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use uitest::encoder::VideoEncoder;
use uitest::testing::{MockDriver, MockElement, MockLauncher, MockOp, RecordingReport};
use uitest::{
	BrowserKind, CaptureResult, DriverScope, Error, Harness, HarnessConfig, Locator, Outcome, Phase, RecordingOutcome,
	ResourceLayout, Result, Skip, TestCase, WorkerId,
};

const BASE_URL: &str = "https://app.example.test/";

struct FileEncoder;

#[async_trait]
impl VideoEncoder for FileEncoder {
	async fn encode(&self, frames: &[PathBuf], _fps: u32, output: &Path) -> Result<()> {
		assert!(!frames.is_empty());
		tokio::fs::write(output, b"mp4").await?;
		Ok(())
	}
}

fn config(root: &Path, scope: DriverScope) -> HarnessConfig {
	HarnessConfig {
		base_url: BASE_URL.to_string(),
		short_timeout: Duration::from_millis(300),
		long_timeout: Duration::from_millis(600),
		driver_scope: scope,
		artifacts_root: root.to_path_buf(),
		allure_dir: None,
		log_file: None,
		lock_timeout: Duration::from_secs(2),
		recording_fps: 20,
		..HarnessConfig::default()
	}
}

fn index_page() -> Arc<MockDriver> {
	let driver = Arc::new(MockDriver::new(BrowserKind::Chrome));
	driver.add_element(
		Locator::css("h1.heading"),
		MockElement::new().text("Welcome to the-internet"),
	);
	driver
}

struct Fixture {
	_root: TempDir,
	layout: ResourceLayout,
	driver: Arc<MockDriver>,
	launcher: Arc<MockLauncher>,
	report: Arc<RecordingReport>,
	harness: Harness,
}

async fn fixture_with(scope: DriverScope, report: RecordingReport) -> Fixture {
	let root = tempfile::tempdir().unwrap();
	let layout = ResourceLayout::new(root.path(), WorkerId::distributed("gw0").unwrap());
	let driver = index_page();
	let launcher = Arc::new(MockLauncher::returning(driver.clone()));
	let report = Arc::new(report);
	let harness = Harness::with_parts(
		config(root.path(), scope),
		layout.clone(),
		launcher.clone(),
		report.clone(),
		Arc::new(FileEncoder),
	)
	.await
	.unwrap();
	Fixture {
		_root: root,
		layout,
		driver,
		launcher,
		report,
		harness,
	}
}

async fn fixture(scope: DriverScope) -> Fixture {
	fixture_with(scope, RecordingReport::new()).await
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
	match std::fs::read_dir(dir) {
		Ok(entries) => entries.map(|e| e.unwrap().path()).filter(|p| p.is_file()).collect(),
		Err(_) => Vec::new(),
	}
}

fn saved(captures: &[CaptureResult]) -> Vec<&CaptureResult> {
	captures
		.iter()
		.filter(|c| matches!(c, CaptureResult::Saved { .. }))
		.collect()
}

#[tokio::test]
async fn ui_test_opens_the_base_url_and_passes() {
	let mut fx = fixture(DriverScope::Session).await;
	let report = fx
		.harness
		.run(TestCase::new("heading_is_shown").ui(), |fixtures| async move {
			let heading = fixtures.pages()?.main_page().heading().await?;
			anyhow::ensure!(heading == "Welcome to the-internet", "unexpected heading {heading}");
			Ok(())
		})
		.await;

	assert!(report.passed(), "{:?}", report.message);
	assert_eq!(fx.driver.visited(), vec![BASE_URL.to_string()]);
	assert!(saved(&report.captures).is_empty());
	assert_eq!(report.phases.len(), 3);
	assert_eq!(fx.report.started(), vec!["heading_is_shown".to_string()]);
	assert_eq!(
		fx.report.finished(),
		vec![("heading_is_shown".to_string(), Outcome::Passed, None)]
	);
	assert!(files_in(&fx.layout.screenshots_dir()).is_empty());
}

#[tokio::test]
async fn failing_call_saves_exactly_one_screenshot() {
	let mut fx = fixture(DriverScope::Session).await;
	let report = fx
		.harness
		.run(TestCase::new("login_fails"), |fixtures| async move {
			fixtures.driver()?.find(&Locator::css("#missing"), None).await?;
			Ok(())
		})
		.await;

	assert_eq!(report.outcome, Outcome::Failed);
	assert!(report.message.as_deref().unwrap().contains("#missing"));
	assert_eq!(saved(&report.captures).len(), 1);
	assert_eq!(files_in(&fx.layout.screenshots_dir()).len(), 1);
	let attachments = fx.report.attachments();
	assert_eq!(attachments.len(), 1);
	assert_eq!(attachments[0].name, "Failed_Screenshot_login_fails");
}

#[tokio::test]
async fn repeated_test_name_gets_a_screenshot_each_time() {
	let mut fx = fixture(DriverScope::Session).await;
	let first = fx
		.harness
		.run(TestCase::new("test_param"), |_| async { anyhow::bail!("case 1 failed") })
		.await;
	let second = fx
		.harness
		.run(TestCase::new("test_param"), |_| async { anyhow::bail!("case 2 failed") })
		.await;

	assert_eq!(saved(&first.captures).len(), 1);
	assert_eq!(saved(&second.captures).len(), 1);
	assert_eq!(files_in(&fx.layout.screenshots_dir()).len(), 2);
	assert_eq!(fx.report.attachments().len(), 2);
}

#[tokio::test]
async fn failing_teardown_gets_its_own_screenshot() {
	let mut fx = fixture(DriverScope::Session).await;
	let report = fx
		.harness
		.run_with_teardown(
			TestCase::new("both_fail"),
			|_| async { anyhow::bail!("assertion failed") },
			|_| async { anyhow::bail!("cleanup failed") },
		)
		.await;

	assert_eq!(report.outcome, Outcome::Failed);
	assert_eq!(report.message.as_deref(), Some("assertion failed"));
	assert_eq!(report.phase(Phase::Teardown).unwrap().outcome, Outcome::Failed);
	assert_eq!(saved(&report.captures).len(), 2);
	let files = files_in(&fx.layout.screenshots_dir());
	assert_eq!(files.len(), 2);
	assert!(files.iter().any(|p| p.to_string_lossy().ends_with("_teardown.png")));
}

#[tokio::test]
async fn passing_test_with_failing_teardown_is_failed() {
	let mut fx = fixture(DriverScope::Session).await;
	let report = fx
		.harness
		.run_with_teardown(
			TestCase::new("teardown_only"),
			|_| async { Ok(()) },
			|_| async { anyhow::bail!("could not log out") },
		)
		.await;

	assert_eq!(report.outcome, Outcome::Failed);
	assert_eq!(report.phase(Phase::Call).unwrap().outcome, Outcome::Passed);
	assert_eq!(saved(&report.captures).len(), 1);
}

#[tokio::test]
async fn failing_report_backend_never_changes_outcomes() {
	let mut fx = fixture_with(DriverScope::Session, RecordingReport::failing()).await;

	let failed = fx
		.harness
		.run(TestCase::new("broken"), |_| async { anyhow::bail!("expected 2 rows") })
		.await;
	assert_eq!(failed.outcome, Outcome::Failed);
	assert_eq!(failed.message.as_deref(), Some("expected 2 rows"));
	assert!(matches!(
		saved(&failed.captures)[..],
		[CaptureResult::Saved { attached: false, .. }]
	));

	let passed = fx.harness.run(TestCase::new("fine"), |_| async { Ok(()) }).await;
	assert!(passed.passed());
}

#[tokio::test]
async fn screenshot_failure_is_logged_not_raised() {
	let mut fx = fixture(DriverScope::Session).await;
	fx.driver.fail_screenshots_with(|| Error::DriverTimeout("screenshot took too long".into()));
	let report = fx
		.harness
		.run(TestCase::new("slow_capture"), |_| async { anyhow::bail!("original failure") })
		.await;

	assert_eq!(report.message.as_deref(), Some("original failure"));
	assert!(
		report
			.captures
			.iter()
			.any(|c| matches!(c, CaptureResult::Failed { .. }))
	);
	assert!(fx.report.attachments().is_empty());
}

#[tokio::test]
async fn skip_is_reported_without_artifacts() {
	let mut fx = fixture(DriverScope::Session).await;
	let report = fx
		.harness
		.run(TestCase::new("firefox_only"), |_| async {
			Err(Skip::new("needs firefox").into())
		})
		.await;

	assert_eq!(report.outcome, Outcome::Skipped);
	assert_eq!(report.message.as_deref(), Some("needs firefox"));
	assert!(saved(&report.captures).is_empty());
	assert_eq!(fx.driver.screenshots_taken(), 0);
}

#[tokio::test]
async fn panicking_body_fails_and_the_session_continues() {
	let mut fx = fixture(DriverScope::Session).await;
	let report = fx
		.harness
		.run(TestCase::new("panics"), |_| async {
			assert_eq!(1 + 1, 3, "arithmetic is broken");
			Ok(())
		})
		.await;
	assert_eq!(report.outcome, Outcome::Failed);
	assert!(report.message.as_deref().unwrap().contains("arithmetic is broken"));

	let next = fx.harness.run(TestCase::new("after_panic"), |_| async { Ok(()) }).await;
	assert!(next.passed());

	let summary = fx.harness.finish().await;
	assert_eq!((summary.total, summary.passed, summary.failed, summary.skipped), (2, 1, 1, 0));
}

#[tokio::test]
async fn session_browser_is_quit_once_at_finish() {
	let fx = fixture(DriverScope::Session).await;
	let Fixture {
		mut harness,
		driver,
		launcher,
		..
	} = fx;
	for name in ["first", "second", "third"] {
		harness.run(TestCase::new(name), |_| async { Ok(()) }).await;
	}
	assert_eq!(launcher.launch_count(), 1);
	assert_eq!(driver.quit_calls(), 0);

	harness.finish().await;
	assert_eq!(driver.quit_calls(), 1);
}

#[tokio::test]
async fn test_scope_launches_and_quits_per_test() {
	let mut fx = fixture(DriverScope::Test).await;
	assert_eq!(fx.launcher.launch_count(), 0);

	fx.harness.run(TestCase::new("one"), |_| async { Ok(()) }).await;
	fx.harness
		.run(TestCase::new("two"), |_| async { anyhow::bail!("fails") })
		.await;
	fx.harness
		.run(TestCase::new("no_browser").without_browser(), |fixtures| async move {
			anyhow::ensure!(fixtures.driver.is_none());
			Ok(())
		})
		.await;

	assert_eq!(fx.launcher.launch_count(), 2);
	assert_eq!(fx.driver.quit_calls(), 2);
	fx.harness.finish().await;
	assert_eq!(fx.driver.quit_calls(), 2);
}

#[tokio::test]
async fn failed_launch_fails_setup_and_skips_the_body() {
	let root = tempfile::tempdir().unwrap();
	let layout = ResourceLayout::new(root.path(), WorkerId::distributed("gw3").unwrap());
	let launcher = Arc::new(MockLauncher::failing(|| Error::LaunchFailed("chrome exited".into())));
	let mut harness = Harness::with_parts(
		config(root.path(), DriverScope::Test),
		layout,
		launcher.clone(),
		Arc::new(RecordingReport::new()),
		Arc::new(FileEncoder),
	)
	.await
	.unwrap();

	let report = harness
		.run(TestCase::new("never_runs"), |_| async { anyhow::bail!("body must not run") })
		.await;
	assert_eq!(report.outcome, Outcome::Failed);
	assert_eq!(report.phase(Phase::Setup).unwrap().outcome, Outcome::Failed);
	assert!(report.phase(Phase::Call).is_none());
	assert!(report.message.as_deref().unwrap().contains("chrome exited"));
	assert_eq!(launcher.launch_count(), 1);
}

#[tokio::test]
async fn post_launch_failure_quits_the_browser_once() {
	let root = tempfile::tempdir().unwrap();
	let layout = ResourceLayout::new(root.path(), WorkerId::distributed("gw4").unwrap());
	let driver = index_page();
	driver.fail_cdp_with(|| Error::WebDriver {
		code: "unknown command".into(),
		message: "Browser.grantPermissions".into(),
	});
	let result = Harness::with_parts(
		config(root.path(), DriverScope::Session),
		layout,
		Arc::new(MockLauncher::returning(driver.clone())),
		Arc::new(RecordingReport::new()),
		Arc::new(FileEncoder),
	)
	.await;

	assert!(matches!(result, Err(Error::LaunchFailed(_))));
	assert_eq!(driver.quit_calls(), 1);
}

#[tokio::test]
async fn missing_driver_aborts_the_session() {
	let root = tempfile::tempdir().unwrap();
	let layout = ResourceLayout::new(root.path(), WorkerId::distributed("gw5").unwrap());
	let launcher = Arc::new(MockLauncher::without_driver());
	let result = Harness::with_parts(
		config(root.path(), DriverScope::Session),
		layout,
		launcher.clone(),
		Arc::new(RecordingReport::new()),
		Arc::new(FileEncoder),
	)
	.await;

	assert!(matches!(result, Err(Error::DriverUnavailable { .. })));
	assert_eq!(launcher.launch_count(), 0);
}

#[tokio::test]
async fn downloads_are_cleaned_before_and_after() {
	let mut fx = fixture(DriverScope::Session).await;
	let downloads = fx.layout.downloads_dir();
	std::fs::write(downloads.join("stale.csv"), b"old").unwrap();

	let report = fx
		.harness
		.run(TestCase::new("download_report").clean_downloads(), |fixtures| async move {
			anyhow::ensure!(std::fs::read_dir(&fixtures.downloads_dir)?.next().is_none());
			std::fs::write(fixtures.downloads_dir.join("report.pdf"), b"%PDF")?;
			Ok(())
		})
		.await;

	assert!(report.passed(), "{:?}", report.message);
	assert!(files_in(&downloads).is_empty());
}

#[tokio::test]
async fn recorded_test_attaches_its_video() {
	let mut fx = fixture(DriverScope::Session).await;
	let report = fx
		.harness
		.run(TestCase::new("recorded").record(true), |_| async {
			tokio::time::sleep(Duration::from_millis(400)).await;
			Ok(())
		})
		.await;

	assert!(report.passed());
	match report.recording.as_ref().unwrap() {
		RecordingOutcome::Done { video, frames } => {
			assert!(*frames > 0);
			assert!(video.exists());
		}
		other => panic!("expected a video, got {other:?}"),
	}
	assert!(report.video_attached);
	assert!(fx.report.attachments().iter().any(|a| a.name == "Test Recording"));
}

#[tokio::test]
async fn recording_is_off_unless_enabled() {
	let mut fx = fixture(DriverScope::Session).await;
	let report = fx.harness.run(TestCase::new("plain"), |_| async { Ok(()) }).await;
	assert!(report.recording.is_none());
	assert!(!report.video_attached);
}

#[tokio::test]
async fn stale_clicks_are_retried_inside_page_objects() {
	let mut fx = fixture(DriverScope::Session).await;
	fx.driver.add_element(
		Locator::link_text("Checkboxes"),
		MockElement::new().text("Checkboxes"),
	);
	fx.driver.add_element(Locator::css("div.example h3"), MockElement::new().text("Checkboxes"));
	fx.driver
		.fail_times(MockOp::Click, 1, || Error::StaleElement("re-rendered".into()));

	let report = fx
		.harness
		.run(TestCase::new("open_checkboxes").ui(), |fixtures| async move {
			fixtures.pages()?.checkboxes_page().await?;
			Ok(())
		})
		.await;

	assert!(report.passed(), "{:?}", report.message);
	assert_eq!(fx.driver.clicks(), vec![Locator::link_text("Checkboxes")]);
}
