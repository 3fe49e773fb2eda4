//! Session and per-test fixtures.
//!
//! A [`Harness`] owns one worker's session: its cleaned directories, the
//! report sink and (for session scope) the browser. [`Harness::run`] takes
//! one test through setup, call and teardown, reporting each phase to the
//! [`HookCoordinator`]. Artifact problems are logged and never change a
//! test's outcome.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use crate::config::{DriverScope, HarnessConfig};
use crate::context::TestContext;
use crate::directories::{clean_purpose, prepare_worker_directories};
use crate::driver::Driver;
use crate::encoder::{FfmpegEncoder, VideoEncoder};
use crate::hooks::{CaptureResult, HookCoordinator, HookPolicy, Outcome, Phase, PhaseReport};
use crate::layout::{ResourceLayout, ResourcePurpose, timestamp};
use crate::lock::FileLock;
use crate::pages::PageManager;
use crate::provision::{BrowserSession, Launcher, Provisioner, WebDriverLauncher};
use crate::recorder::{CaptureJob, RecorderSettings, RecordingOutcome, VideoRecorder};
use crate::report::{
	AllureReporter, CiProvider, ContentType, EnvironmentInfo, NullReport, ReportSink, attach_best_effort,
};
use crate::worker::WorkerId;
use crate::{Error, Result};

/// Returned from a test body to mark the test as skipped.
#[derive(Debug, Clone, thiserror::Error)]
#[error("skipped: {reason}")]
pub struct Skip {
	pub reason: String,
}

impl Skip {
	pub fn new(reason: impl Into<String>) -> Self {
		Self { reason: reason.into() }
	}
}

/// Per-test switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestMarkers {
	/// Navigate to the base URL before the body runs.
	pub ui: bool,
	/// Clean the downloads directory before and after the test.
	pub clean_downloads: bool,
	/// Overrides the configured video recording switch.
	pub record: Option<bool>,
	/// Whether the test gets a browser at all.
	pub browser: bool,
}

impl Default for TestMarkers {
	fn default() -> Self {
		Self {
			ui: false,
			clean_downloads: false,
			record: None,
			browser: true,
		}
	}
}

#[derive(Debug, Clone)]
pub struct TestCase {
	pub name: String,
	pub markers: TestMarkers,
}

impl TestCase {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			markers: TestMarkers::default(),
		}
	}

	pub fn ui(mut self) -> Self {
		self.markers.ui = true;
		self
	}

	pub fn clean_downloads(mut self) -> Self {
		self.markers.clean_downloads = true;
		self
	}

	pub fn record(mut self, record: bool) -> Self {
		self.markers.record = Some(record);
		self
	}

	pub fn without_browser(mut self) -> Self {
		self.markers.browser = false;
		self
	}
}

/// What a test body and its teardown receive.
#[derive(Clone)]
pub struct TestFixtures {
	pub name: String,
	pub driver: Option<Arc<dyn Driver>>,
	pub pages: Option<PageManager>,
	pub downloads_dir: PathBuf,
	pub config: Arc<HarnessConfig>,
}

impl TestFixtures {
	pub fn driver(&self) -> Result<&Arc<dyn Driver>> {
		self.driver
			.as_ref()
			.ok_or_else(|| Error::InvalidArgument(format!("{} has no browser", self.name)))
	}

	pub fn pages(&self) -> Result<&PageManager> {
		self.pages
			.as_ref()
			.ok_or_else(|| Error::InvalidArgument(format!("{} has no browser", self.name)))
	}
}

/// Outcome of one test.
#[derive(Debug, Clone)]
pub struct TestReport {
	pub name: String,
	pub outcome: Outcome,
	/// First failure (or the skip reason).
	pub message: Option<String>,
	pub phases: Vec<PhaseReport>,
	pub captures: Vec<CaptureResult>,
	pub recording: Option<RecordingOutcome>,
	pub video_attached: bool,
	pub duration: Duration,
}

impl TestReport {
	pub fn phase(&self, phase: Phase) -> Option<&PhaseReport> {
		self.phases.iter().find(|p| p.phase == phase)
	}

	pub fn passed(&self) -> bool {
		self.outcome == Outcome::Passed
	}
}

/// Totals for a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
	pub total: usize,
	pub passed: usize,
	pub failed: usize,
	pub skipped: usize,
}

impl SessionSummary {
	fn record(&mut self, outcome: Outcome) {
		self.total += 1;
		match outcome {
			Outcome::Passed => self.passed += 1,
			Outcome::Failed => self.failed += 1,
			Outcome::Skipped => self.skipped += 1,
		}
	}
}

impl fmt::Display for SessionSummary {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"Total: {}, Passed: {}, Failed: {}, Skipped: {}",
			self.total, self.passed, self.failed, self.skipped
		)
	}
}

/// Resources acquired for one test, released in teardown.
#[derive(Default)]
struct TestState {
	driver: Option<Arc<dyn Driver>>,
	browser: Option<BrowserSession>,
	capture: Option<CaptureJob>,
}

pub struct Harness {
	config: Arc<HarnessConfig>,
	layout: ResourceLayout,
	provisioner: Provisioner,
	hooks: HookCoordinator,
	report: Arc<dyn ReportSink>,
	recorder: VideoRecorder,
	session: Option<BrowserSession>,
	summary: SessionSummary,
}

impl Harness {
	/// Session setup with real browsers, the Allure sink and ffmpeg.
	pub async fn start(config: HarnessConfig) -> Result<Self> {
		let layout = ResourceLayout::new(&config.artifacts_root, WorkerId::current().clone());
		let launcher = Arc::new(WebDriverLauncher::new(config.driver_cache_days));
		let report = open_report(&config, layout.worker());
		Self::with_parts(config, layout, launcher, report, Arc::new(FfmpegEncoder::new())).await
	}

	/// Session setup with explicit collaborators.
	///
	/// # Errors
	///
	/// Directory lock timeouts and browser acquisition failures abort the
	/// session.
	pub async fn with_parts(
		config: HarnessConfig,
		layout: ResourceLayout,
		launcher: Arc<dyn Launcher>,
		report: Arc<dyn ReportSink>,
		encoder: Arc<dyn VideoEncoder>,
	) -> Result<Self> {
		info!(
			target = "uitest",
			worker = %layout.worker(),
			root = %layout.root().display(),
			browser = %config.browser,
			"Starting test session"
		);
		prepare_worker_directories(&layout, config.user_data_policy, config.lock_timeout).await?;

		let provisioner = Provisioner::new(launcher, config.lock_timeout);
		let session = match config.driver_scope {
			DriverScope::Session => Some(provisioner.acquire(config.browser, &layout, &config).await?),
			DriverScope::Test => None,
		};

		let hooks = HookCoordinator::new(
			layout.clone(),
			report.clone(),
			HookPolicy {
				capture_on_teardown_failure: config.capture_on_teardown_failure,
			},
			config.lock_timeout,
		);
		let recorder = VideoRecorder::new(RecorderSettings::with_fps(config.recording_fps), encoder);

		Ok(Self {
			config: Arc::new(config),
			layout,
			provisioner,
			hooks,
			report,
			recorder,
			session,
			summary: SessionSummary::default(),
		})
	}

	pub fn config(&self) -> &HarnessConfig {
		&self.config
	}

	pub fn layout(&self) -> &ResourceLayout {
		&self.layout
	}

	pub fn summary(&self) -> SessionSummary {
		self.summary
	}

	/// The session-scoped browser, if one is running.
	pub fn session_driver(&self) -> Option<&Arc<dyn Driver>> {
		self.session.as_ref().map(BrowserSession::driver)
	}

	pub async fn run<F, Fut>(&mut self, case: TestCase, body: F) -> TestReport
	where
		F: FnOnce(TestFixtures) -> Fut,
		Fut: Future<Output = anyhow::Result<()>>,
	{
		self.run_with_teardown(case, body, no_teardown).await
	}

	/// Runs one test with a teardown step that runs after the body.
	pub async fn run_with_teardown<F, Fut, T, TFut>(&mut self, case: TestCase, body: F, teardown: T) -> TestReport
	where
		F: FnOnce(TestFixtures) -> Fut,
		Fut: Future<Output = anyhow::Result<()>>,
		T: FnOnce(TestFixtures) -> TFut,
		TFut: Future<Output = anyhow::Result<()>>,
	{
		let ctx = TestContext::new(case.name.as_str(), self.layout.worker().clone());
		let report = ctx.scope(self.run_phases(&case, body, teardown)).await;
		debug!(target = "uitest", test = %case.name, "Test context cleared");
		self.summary.record(report.outcome);
		report
	}

	async fn run_phases<F, Fut, T, TFut>(&mut self, case: &TestCase, body: F, teardown: T) -> TestReport
	where
		F: FnOnce(TestFixtures) -> Fut,
		Fut: Future<Output = anyhow::Result<()>>,
		T: FnOnce(TestFixtures) -> TFut,
		TFut: Future<Output = anyhow::Result<()>>,
	{
		let started = Instant::now();
		let name = case.name.clone();
		let run = self.hooks.begin_test();
		info!(target = "uitest", test = %name, run, "Starting test");
		self.report.test_started(&name);

		let mut phases = Vec::new();
		let mut captures = Vec::new();
		let mut state = TestState::default();

		let phase_start = Instant::now();
		let setup = self.setup(case, &mut state).await;
		let setup_ok = setup.is_ok();
		let report = phase_report(&name, run, Phase::Setup, phase_start, setup.err().map(|e| (Outcome::Failed, e.to_string())));
		captures.push(self.hooks.on_phase_complete(&report, state.driver.as_ref()).await);
		phases.push(report);

		let fixtures = self.fixtures(&name, &state);
		if setup_ok {
			let phase_start = Instant::now();
			let result = AssertUnwindSafe(body(fixtures.clone())).catch_unwind().await;
			let report = phase_report(&name, run, Phase::Call, phase_start, classify(result));
			captures.push(self.hooks.on_phase_complete(&report, state.driver.as_ref()).await);
			phases.push(report);
		}

		let phase_start = Instant::now();
		let mut teardown_failure = None;
		if setup_ok {
			let result = AssertUnwindSafe(teardown(fixtures)).catch_unwind().await;
			teardown_failure = classify(result).filter(|(outcome, _)| *outcome == Outcome::Failed);
		}
		let (recording, video_attached) = match state.capture.take() {
			Some(job) => {
				info!(target = "uitest", "Stopping video recording");
				let outcome = job.stop().await;
				let attached = self.attach_recording(&outcome).await;
				(Some(outcome), attached)
			}
			None => (None, false),
		};
		if case.markers.clean_downloads {
			if let Err(e) = clean_purpose(&self.layout, ResourcePurpose::Downloads, self.config.lock_timeout).await {
				warn!(target = "uitest", error = %e, "Failed to clean downloads after test");
			}
		}
		let report = phase_report(&name, run, Phase::Teardown, phase_start, teardown_failure);
		captures.push(self.hooks.on_phase_complete(&report, state.driver.as_ref()).await);
		phases.push(report);

		if let Some(browser) = state.browser.take() {
			browser.release().await;
		}

		let (outcome, message) = overall(&phases);
		self.report.test_finished(&name, outcome, message.as_deref());
		TestReport {
			name,
			outcome,
			message,
			phases,
			captures,
			recording,
			video_attached,
			duration: started.elapsed(),
		}
	}

	async fn setup(&self, case: &TestCase, state: &mut TestState) -> Result<()> {
		if case.markers.browser {
			match (&self.session, self.config.driver_scope) {
				(Some(session), _) => state.driver = Some(session.driver().clone()),
				(None, DriverScope::Test) => {
					let browser = self
						.provisioner
						.acquire(self.config.browser, &self.layout, &self.config)
						.await?;
					state.driver = Some(browser.driver().clone());
					state.browser = Some(browser);
				}
				(None, DriverScope::Session) => {
					return Err(Error::InvalidArgument("session browser is not running".to_string()));
				}
			}
		}

		if case.markers.clean_downloads {
			clean_purpose(&self.layout, ResourcePurpose::Downloads, self.config.lock_timeout).await?;
		}

		let record = case.markers.record.unwrap_or(self.config.video_recording);
		match (&state.driver, record) {
			(Some(driver), true) => {
				let paths = self.layout.recording(&case.name, &timestamp());
				match self.recorder.start(driver.clone(), paths).await {
					Ok(job) => state.capture = Some(job),
					Err(e) => warn!(target = "uitest", error = %e, "Failed to start video recording"),
				}
			}
			(None, true) => debug!(target = "uitest", "No browser; not recording"),
			_ => {}
		}

		if case.markers.ui {
			let driver = state
				.driver
				.clone()
				.ok_or_else(|| Error::InvalidArgument(format!("{} is marked ui but has no browser", case.name)))?;
			PageManager::new(driver, &self.config)
				.navigate_to_base_url(&self.config.base_url)
				.await?;
		}
		Ok(())
	}

	fn fixtures(&self, name: &str, state: &TestState) -> TestFixtures {
		TestFixtures {
			name: name.to_string(),
			pages: state.driver.clone().map(|driver| PageManager::new(driver, &self.config)),
			driver: state.driver.clone(),
			downloads_dir: self.layout.downloads_dir(),
			config: self.config.clone(),
		}
	}

	/// Attaches a produced video under the worker's recordings lock.
	async fn attach_recording(&self, outcome: &RecordingOutcome) -> bool {
		let Some(video) = outcome.video() else {
			return false;
		};
		match tokio::fs::metadata(video).await {
			Ok(meta) if meta.len() > 0 => {}
			_ => {
				warn!(target = "uitest", path = %video.display(), "Video file not found or empty");
				return false;
			}
		}
		let lock = match FileLock::acquire(self.layout.lock_path(ResourcePurpose::Recordings), self.config.lock_timeout).await {
			Ok(lock) => lock,
			Err(e) => {
				error!(target = "uitest", path = %video.display(), error = %e, "Failed to attach video");
				return false;
			}
		};
		let attached = attach_best_effort(self.report.as_ref(), video, "Test Recording", ContentType::Mp4);
		drop(lock);
		attached
	}

	/// Releases the session browser and returns the totals.
	pub async fn finish(mut self) -> SessionSummary {
		if let Some(session) = self.session.take() {
			session.release().await;
		}
		info!(target = "uitest", "Test session finished. {}", self.summary);
		self.summary
	}
}

/// The Allure sink when configured, otherwise a no-op sink.
fn open_report(config: &HarnessConfig, worker: &WorkerId) -> Arc<dyn ReportSink> {
	let Some(dir) = &config.allure_dir else {
		return Arc::new(NullReport);
	};
	let ci = CiProvider::detect();
	let reporter = match AllureReporter::open(dir, worker, ci.as_ref()) {
		Ok(reporter) => reporter,
		Err(e) => {
			warn!(target = "uitest", path = %dir.display(), error = %e, "Report directory unavailable; reporting disabled");
			return Arc::new(NullReport);
		}
	};
	if let Err(e) = reporter.write_environment(&EnvironmentInfo::from_config(config, ci)) {
		warn!(target = "uitest", error = %e, "Failed to write report environment");
	}
	Arc::new(reporter)
}

async fn no_teardown(_: TestFixtures) -> anyhow::Result<()> {
	Ok(())
}

fn phase_report(test: &str, run: u64, phase: Phase, started: Instant, failure: Option<(Outcome, String)>) -> PhaseReport {
	let (outcome, message) = match failure {
		Some((outcome, message)) => (outcome, Some(message)),
		None => (Outcome::Passed, None),
	};
	PhaseReport {
		test: test.to_string(),
		run,
		phase,
		outcome,
		duration: started.elapsed(),
		message,
	}
}

/// `None` for success, otherwise the outcome and its message.
fn classify(result: std::result::Result<anyhow::Result<()>, Box<dyn Any + Send>>) -> Option<(Outcome, String)> {
	match result {
		Ok(Ok(())) => None,
		Ok(Err(e)) => match e.downcast_ref::<Skip>() {
			Some(skip) => Some((Outcome::Skipped, skip.reason.clone())),
			None => Some((Outcome::Failed, format!("{e:#}"))),
		},
		Err(panic) => Some((Outcome::Failed, panic_message(panic.as_ref()))),
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"test panicked".to_string()
	}
}

/// Failed if any phase failed, skipped if the call was skipped.
fn overall(phases: &[PhaseReport]) -> (Outcome, Option<String>) {
	if let Some(failed) = phases.iter().find(|p| p.outcome == Outcome::Failed) {
		return (Outcome::Failed, failed.message.clone());
	}
	if let Some(skipped) = phases.iter().find(|p| p.outcome == Outcome::Skipped) {
		return (Outcome::Skipped, skipped.message.clone());
	}
	(Outcome::Passed, None)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn skip_is_recognised_through_anyhow() {
		let result: std::result::Result<anyhow::Result<()>, Box<dyn Any + Send>> =
			Ok(Err(anyhow::Error::new(Skip::new("needs firefox"))));
		assert_eq!(classify(result), Some((Outcome::Skipped, "needs firefox".to_string())));
	}

	#[test]
	fn panics_become_failures() {
		let result: std::result::Result<anyhow::Result<()>, Box<dyn Any + Send>> =
			Err(Box::new("assertion failed: visible"));
		assert_eq!(
			classify(result),
			Some((Outcome::Failed, "assertion failed: visible".to_string()))
		);
	}

	#[test]
	fn teardown_failure_fails_a_passed_test() {
		let phases = vec![
			phase_report("t", 1, Phase::Setup, Instant::now(), None),
			phase_report("t", 1, Phase::Call, Instant::now(), None),
			phase_report("t", 1, Phase::Teardown, Instant::now(), Some((Outcome::Failed, "cleanup".into()))),
		];
		assert_eq!(overall(&phases), (Outcome::Failed, Some("cleanup".to_string())));
	}

	#[test]
	fn summary_counts_outcomes() {
		let mut summary = SessionSummary::default();
		for outcome in [Outcome::Passed, Outcome::Failed, Outcome::Skipped, Outcome::Passed] {
			summary.record(outcome);
		}
		assert_eq!(summary.to_string(), "Total: 4, Passed: 2, Failed: 1, Skipped: 1");
	}
}
