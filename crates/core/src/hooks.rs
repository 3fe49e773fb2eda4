//! Per-phase outcome logging and failure screenshots.
//!
//! The coordinator is a dead end for artifact errors: nothing it does can
//! change a test's outcome or raise into the test.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::driver::{Driver, ScreenshotOptions};
use crate::layout::{ResourceLayout, ResourcePurpose, sanitize_name, timestamp};
use crate::lock::FileLock;
use crate::report::{ContentType, ReportSink, attach_best_effort};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
	Setup,
	Call,
	Teardown,
}

impl Phase {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Setup => "setup",
			Self::Call => "call",
			Self::Teardown => "teardown",
		}
	}
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
	Passed,
	Failed,
	Skipped,
}

impl Outcome {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Passed => "PASSED",
			Self::Failed => "FAILED",
			Self::Skipped => "SKIPPED",
		}
	}
}

impl fmt::Display for Outcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// How one phase of one test ended.
#[derive(Debug, Clone)]
pub struct PhaseReport {
	pub test: String,
	/// Identifies one execution of `test`, from [`HookCoordinator::begin_test`].
	pub run: u64,
	pub phase: Phase,
	pub outcome: Outcome,
	pub duration: Duration,
	/// Error text for failed or skipped phases.
	pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookPolicy {
	pub capture_on_teardown_failure: bool,
}

impl Default for HookPolicy {
	fn default() -> Self {
		Self {
			capture_on_teardown_failure: true,
		}
	}
}

/// What happened when a failure screenshot was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureResult {
	/// The phase did not call for a screenshot.
	NotNeeded,
	/// No live browser was available.
	NoDriver,
	/// This phase of this test already has its screenshot.
	AlreadyCaptured,
	Saved { path: PathBuf, attached: bool },
	Failed { error: String },
}

/// Reacts to phase completions for one worker.
pub struct HookCoordinator {
	layout: ResourceLayout,
	report: Arc<dyn ReportSink>,
	policy: HookPolicy,
	lock_timeout: Duration,
	next_run: AtomicU64,
	captured: Mutex<HashSet<(u64, Phase)>>,
}

impl HookCoordinator {
	pub fn new(layout: ResourceLayout, report: Arc<dyn ReportSink>, policy: HookPolicy, lock_timeout: Duration) -> Self {
		Self {
			layout,
			report,
			policy,
			lock_timeout,
			next_run: AtomicU64::new(1),
			captured: Mutex::new(HashSet::new()),
		}
	}

	pub fn policy(&self) -> HookPolicy {
		self.policy
	}

	/// Starts a new test execution and returns its run id.
	///
	/// Tests in a worker run one at a time, so captures of earlier runs are
	/// forgotten here.
	pub fn begin_test(&self) -> u64 {
		self.captured.lock().clear();
		self.next_run.fetch_add(1, Ordering::Relaxed)
	}

	/// Logs the phase and captures a screenshot if it failed.
	pub async fn on_phase_complete(&self, report: &PhaseReport, driver: Option<&Arc<dyn Driver>>) -> CaptureResult {
		log_phase(report);
		if report.outcome != Outcome::Failed {
			return CaptureResult::NotNeeded;
		}
		let wanted = match report.phase {
			Phase::Setup => false,
			Phase::Call => true,
			Phase::Teardown => self.policy.capture_on_teardown_failure,
		};
		if !wanted {
			return CaptureResult::NotNeeded;
		}
		self.capture_failure(&report.test, report.run, report.phase, driver).await
	}

	/// Saves and attaches one screenshot for the failing `phase` of run `run`.
	///
	/// At most one capture is attempted per run and phase, whatever its result.
	pub async fn capture_failure(
		&self,
		test: &str,
		run: u64,
		phase: Phase,
		driver: Option<&Arc<dyn Driver>>,
	) -> CaptureResult {
		if !self.captured.lock().insert((run, phase)) {
			debug!(target = "uitest", test, run, %phase, "Failure screenshot already taken");
			return CaptureResult::AlreadyCaptured;
		}
		let Some(driver) = driver.filter(|d| d.session_id().is_some()) else {
			debug!(target = "uitest", test, %phase, "No live driver; skipping failure screenshot");
			return CaptureResult::NoDriver;
		};

		let path = match self.save_screenshot(test, run, phase, driver.as_ref()).await {
			Ok(path) => path,
			Err(e) => {
				error!(target = "uitest", test, %phase, error = %e, "Failed to take screenshot");
				return CaptureResult::Failed { error: e.to_string() };
			}
		};
		info!(target = "uitest", test, path = %path.display(), "Screenshot saved");

		let name = format!("Failed_Screenshot_{test}");
		let attached = attach_best_effort(self.report.as_ref(), &path, &name, ContentType::Png);
		CaptureResult::Saved { path, attached }
	}

	async fn save_screenshot(&self, test: &str, run: u64, phase: Phase, driver: &dyn Driver) -> crate::Result<PathBuf> {
		let shot = driver.capture_screenshot(ScreenshotOptions::png()).await?;
		let dir = self.layout.screenshots_dir();
		tokio::fs::create_dir_all(&dir).await?;

		let suffix = if phase == Phase::Teardown { "_teardown" } else { "" };
		let path = dir.join(format!(
			"{}_{}_r{run}{suffix}.{}",
			timestamp(),
			sanitize_name(test),
			shot.format.extension()
		));

		let lock = FileLock::acquire(self.layout.lock_path(ResourcePurpose::Screenshots), self.lock_timeout).await?;
		let written = tokio::fs::write(&path, &shot.data).await;
		drop(lock);
		written?;
		Ok(path)
	}
}

fn log_phase(report: &PhaseReport) {
	let test = report.test.as_str();
	let duration = format!("{:.2}s", report.duration.as_secs_f64());
	match (report.phase, report.outcome) {
		(Phase::Call, Outcome::Passed) => {
			info!(target = "uitest", test, "Test PASSED: {test} (Duration: {duration})");
		}
		(Phase::Call, Outcome::Skipped) | (Phase::Setup, Outcome::Skipped) => {
			info!(
				target = "uitest",
				test,
				reason = report.message.as_deref().unwrap_or(""),
				"Test SKIPPED: {test}"
			);
		}
		(Phase::Call, Outcome::Failed) => {
			error!(
				target = "uitest",
				test,
				error = report.message.as_deref().unwrap_or(""),
				"Test FAILED: {test} (Duration: {duration})"
			);
		}
		(phase, Outcome::Failed) => {
			error!(
				target = "uitest",
				test,
				%phase,
				error = report.message.as_deref().unwrap_or(""),
				"Test {phase} FAILED: {test}"
			);
		}
		(phase, outcome) => {
			debug!(target = "uitest", test, %phase, %outcome, "Phase finished in {duration}");
		}
	}
	if report.outcome == Outcome::Failed && report.message.is_none() {
		warn!(target = "uitest", test, phase = %report.phase, "Failure reported without a message");
	}
}
