//! Report sinks: where failure artifacts end up.
//!
//! Attachment is best-effort everywhere. [`attach_best_effort`] is the only
//! way harness code attaches, and it never returns an error.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{info, warn};
use uitest_protocol::{
	AllureAttachment, AllureLabel, AllureResult, AllureStage, AllureStatus, BrowserKind, ImageFormat,
	StatusDetails,
};
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::hooks::Outcome;
use crate::worker::WorkerId;
use crate::{Error, Result};

/// Content type of an attached file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
	Png,
	Jpeg,
	Mp4,
	Text,
	Json,
}

impl ContentType {
	pub fn mime_type(self) -> &'static str {
		match self {
			Self::Png => "image/png",
			Self::Jpeg => "image/jpeg",
			Self::Mp4 => "video/mp4",
			Self::Text => "text/plain",
			Self::Json => "application/json",
		}
	}

	pub fn extension(self) -> &'static str {
		match self {
			Self::Png => "png",
			Self::Jpeg => "jpg",
			Self::Mp4 => "mp4",
			Self::Text => "txt",
			Self::Json => "json",
		}
	}
}

impl From<ImageFormat> for ContentType {
	fn from(format: ImageFormat) -> Self {
		match format {
			ImageFormat::Png => Self::Png,
			ImageFormat::Jpeg => Self::Jpeg,
		}
	}
}

/// Receives test lifecycle events and attachments.
pub trait ReportSink: Send + Sync {
	fn test_started(&self, _name: &str) {}

	/// Attaches `source` to the test currently in progress.
	fn attach(&self, source: &Path, name: &str, content_type: ContentType) -> Result<()>;

	fn test_finished(&self, _name: &str, _outcome: Outcome, _message: Option<&str>) {}
}

/// Attaches and logs; returns whether the attachment was recorded.
pub fn attach_best_effort(sink: &dyn ReportSink, source: &Path, name: &str, content_type: ContentType) -> bool {
	match sink.attach(source, name, content_type) {
		Ok(()) => {
			info!(target = "uitest", name, path = %source.display(), "Attached to report");
			true
		}
		Err(e) => {
			warn!(target = "uitest", name, path = %source.display(), error = %e, "Failed to attach to report");
			false
		}
	}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReport;

impl ReportSink for NullReport {
	fn attach(&self, _source: &Path, _name: &str, _content_type: ContentType) -> Result<()> {
		Ok(())
	}
}

/// CI system the run is executing under, for the environment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiProvider {
	GithubActions { run_id: String, workflow: String },
	Jenkins { build_number: String, job_name: String },
}

impl CiProvider {
	pub fn detect() -> Option<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	pub fn from_lookup<F>(lookup: F) -> Option<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let or_na = |key: &str| lookup(key).unwrap_or_else(|| "N/A".to_string());
		if lookup("GITHUB_ACTIONS").is_some() {
			Some(Self::GithubActions {
				run_id: or_na("GITHUB_RUN_ID"),
				workflow: or_na("GITHUB_WORKFLOW"),
			})
		} else if lookup("JENKINS_HOME").is_some() {
			Some(Self::Jenkins {
				build_number: or_na("BUILD_NUMBER"),
				job_name: or_na("JOB_NAME"),
			})
		} else {
			None
		}
	}
}

/// Contents of `environment.properties`.
#[derive(Debug, Clone)]
pub struct EnvironmentInfo {
	pub browser: BrowserKind,
	pub headless: bool,
	pub maximized: bool,
	pub base_url: String,
	pub window: (u32, u32),
	pub ci: Option<CiProvider>,
}

impl EnvironmentInfo {
	pub fn from_config(config: &HarnessConfig, ci: Option<CiProvider>) -> Self {
		Self {
			browser: config.browser,
			headless: config.headless,
			maximized: config.maximized,
			base_url: config.base_url.clone(),
			window: (config.window.width, config.window.height),
			ci,
		}
	}

	pub fn to_properties(&self) -> String {
		let mut out = format!(
			"Browser={}\nHeadless={}\nMaximized={}\nBase.URL={}\nWindow.Size={}x{}\n",
			self.browser.display_name(),
			self.headless,
			self.maximized,
			self.base_url,
			self.window.0,
			self.window.1,
		);
		match &self.ci {
			Some(CiProvider::GithubActions { run_id, workflow }) => {
				out.push_str(&format!("Run.ID={run_id}\nWorkflow={workflow}\n"));
			}
			Some(CiProvider::Jenkins {
				build_number,
				job_name,
			}) => {
				out.push_str(&format!("Build.Number={build_number}\nJob.Name={job_name}\n"));
			}
			None => {}
		}
		out
	}
}

/// Ensures the results directory exists, wiping it first when `fresh`.
///
/// Runs that share the directory (distributed workers, CI) must pass
/// `fresh = false`.
pub fn prepare_results_dir(dir: &Path, fresh: bool) -> Result<()> {
	if fresh && dir.exists() {
		info!(target = "uitest", path = %dir.display(), "Cleaning report results directory");
		if let Err(e) = fs::remove_dir_all(dir) {
			warn!(target = "uitest", path = %dir.display(), error = %e, "Failed to clean results directory");
		}
	}
	fs::create_dir_all(dir)?;
	Ok(())
}

/// Writes `environment.properties` into an existing results directory.
pub fn write_environment_file(dir: &Path, env: &EnvironmentInfo) -> Result<PathBuf> {
	let path = dir.join("environment.properties");
	fs::write(&path, env.to_properties())?;
	Ok(path)
}

struct PendingResult {
	uuid: Uuid,
	name: String,
	start: i64,
	attachments: Vec<AllureAttachment>,
}

/// Writes Allure result files into a results directory.
pub struct AllureReporter {
	dir: PathBuf,
	worker: String,
	current: Mutex<Option<PendingResult>>,
}

impl AllureReporter {
	/// Prepares `dir` and returns a reporter writing into it.
	///
	/// The directory is wiped only for a local, non-distributed run.
	pub fn open(dir: impl Into<PathBuf>, worker: &WorkerId, ci: Option<&CiProvider>) -> Result<Self> {
		let dir = dir.into();
		let fresh = !worker.is_distributed() && ci.is_none();
		prepare_results_dir(&dir, fresh)?;
		Ok(Self {
			dir,
			worker: worker.to_string(),
			current: Mutex::new(None),
		})
	}

	pub fn results_dir(&self) -> &Path {
		&self.dir
	}

	pub fn write_environment(&self, env: &EnvironmentInfo) -> Result<PathBuf> {
		write_environment_file(&self.dir, env)
	}

	fn write_result(&self, pending: PendingResult, outcome: Outcome, message: Option<&str>) -> Result<PathBuf> {
		let status = match outcome {
			Outcome::Passed => AllureStatus::Passed,
			Outcome::Failed => AllureStatus::Failed,
			Outcome::Skipped => AllureStatus::Skipped,
		};
		let result = AllureResult {
			uuid: pending.uuid.to_string(),
			history_id: pending.name.clone(),
			full_name: pending.name.clone(),
			name: pending.name,
			status,
			status_details: StatusDetails {
				message: message.map(str::to_string),
				trace: None,
			},
			stage: AllureStage::Finished,
			start: pending.start,
			stop: now_millis(),
			labels: vec![
				AllureLabel::new("framework", "uitest"),
				AllureLabel::new("thread", &self.worker),
			],
			attachments: pending.attachments,
		};
		let path = self.dir.join(format!("{}-result.json", result.uuid));
		fs::write(&path, serde_json::to_vec_pretty(&result)?)?;
		Ok(path)
	}
}

impl ReportSink for AllureReporter {
	fn test_started(&self, name: &str) {
		*self.current.lock() = Some(PendingResult {
			uuid: Uuid::new_v4(),
			name: name.to_string(),
			start: now_millis(),
			attachments: Vec::new(),
		});
	}

	fn attach(&self, source: &Path, name: &str, content_type: ContentType) -> Result<()> {
		let mut current = self.current.lock();
		let pending = current
			.as_mut()
			.ok_or_else(|| Error::InvalidArgument("no test in progress to attach to".to_string()))?;

		let file_name = format!("{}-attachment.{}", Uuid::new_v4(), content_type.extension());
		fs::copy(source, self.dir.join(&file_name))?;
		pending.attachments.push(AllureAttachment {
			name: name.to_string(),
			source: file_name,
			mime_type: content_type.mime_type().to_string(),
		});
		Ok(())
	}

	fn test_finished(&self, name: &str, outcome: Outcome, message: Option<&str>) {
		let Some(pending) = self.current.lock().take() else {
			warn!(target = "uitest", name, "Report finished for a test that never started");
			return;
		};
		if let Err(e) = self.write_result(pending, outcome, message) {
			warn!(target = "uitest", name, error = %e, "Failed to write report result");
		}
	}
}

fn now_millis() -> i64 {
	chrono::Utc::now().timestamp_millis()
}
