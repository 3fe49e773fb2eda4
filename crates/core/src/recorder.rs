//! Frame-capture video recording.
//!
//! A [`CaptureJob`] polls screenshots from the live session on a fixed
//! interval and writes them as numbered frames. [`CaptureJob::stop`]
//! signals the task, joins it with a bound, and hands the surviving frames
//! to a [`VideoEncoder`].
//!
//! The capture task only reads from the session. It exits on its own when
//! the session disappears, so a task abandoned after a join timeout never
//! outlives the browser by more than one tick.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::context;
use crate::driver::{Driver, ScreenshotOptions};
use crate::encoder::VideoEncoder;
use crate::layout::RecordingPaths;
use crate::Result;

pub const DEFAULT_FPS: u32 = 15;
/// Frames at or below this many bytes are blank or truncated.
pub const MIN_FRAME_SIZE: usize = 512;
pub const MAX_FRAMES: usize = 2000;
pub const JPEG_QUALITY: u8 = 80;
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RecorderSettings {
	pub fps: u32,
	pub screenshot: ScreenshotOptions,
	pub min_frame_size: usize,
	pub max_frames: usize,
	pub join_timeout: Duration,
}

impl Default for RecorderSettings {
	fn default() -> Self {
		Self {
			fps: DEFAULT_FPS,
			screenshot: ScreenshotOptions::jpeg(JPEG_QUALITY),
			min_frame_size: MIN_FRAME_SIZE,
			max_frames: MAX_FRAMES,
			join_timeout: JOIN_TIMEOUT,
		}
	}
}

impl RecorderSettings {
	pub fn with_fps(fps: u32) -> Self {
		Self {
			fps,
			..Self::default()
		}
	}

	/// Time between captures; one frame per tick.
	pub fn interval(&self) -> Duration {
		Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
	}
}

/// Lifecycle of one recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
	Capturing,
	StopRequested,
	Assembling,
	Done,
	SkippedNoFrames,
}

impl fmt::Display for CaptureState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Capturing => "capturing",
			Self::StopRequested => "stop-requested",
			Self::Assembling => "assembling",
			Self::Done => "done",
			Self::SkippedNoFrames => "skipped-no-frames",
		};
		f.write_str(s)
	}
}

/// Why the capture loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
	Stopped,
	SessionEnded,
	FrameCap,
}

#[derive(Debug, Clone, Copy)]
struct LoopSummary {
	written: usize,
	discarded: usize,
	exit: LoopExit,
}

/// Result of stopping a recording. Never an error: recording is diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
	Done { video: PathBuf, frames: usize },
	SkippedNoFrames,
	EncoderFailed { error: String },
}

impl RecordingOutcome {
	pub fn video(&self) -> Option<&Path> {
		match self {
			Self::Done { video, .. } => Some(video),
			_ => None,
		}
	}
}

/// Starts recordings with shared settings and encoder.
#[derive(Clone)]
pub struct VideoRecorder {
	settings: RecorderSettings,
	encoder: Arc<dyn VideoEncoder>,
}

impl VideoRecorder {
	pub fn new(settings: RecorderSettings, encoder: Arc<dyn VideoEncoder>) -> Self {
		Self { settings, encoder }
	}

	pub fn settings(&self) -> &RecorderSettings {
		&self.settings
	}

	/// Creates the frame directory and starts capturing from `driver`.
	///
	/// Returns as soon as the capture task is spawned.
	pub async fn start(&self, driver: Arc<dyn Driver>, paths: RecordingPaths) -> Result<CaptureJob> {
		tokio::fs::create_dir_all(&paths.frames_dir).await?;
		let (stop_tx, stop_rx) = watch::channel(false);
		let handle = context::spawn(capture_loop(
			driver,
			paths.frames_dir.clone(),
			self.settings.clone(),
			stop_rx,
		));
		info!(
			target = "uitest",
			video = %paths.video.display(),
			fps = self.settings.fps,
			"Recording started"
		);
		Ok(CaptureJob {
			paths,
			settings: self.settings.clone(),
			encoder: self.encoder.clone(),
			stop_tx,
			handle,
			state: CaptureState::Capturing,
			started: Instant::now(),
		})
	}
}

/// A running recording. Stopping consumes it.
pub struct CaptureJob {
	paths: RecordingPaths,
	settings: RecorderSettings,
	encoder: Arc<dyn VideoEncoder>,
	stop_tx: watch::Sender<bool>,
	handle: JoinHandle<LoopSummary>,
	state: CaptureState,
	started: Instant,
}

impl fmt::Debug for CaptureJob {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CaptureJob")
			.field("paths", &self.paths)
			.field("state", &self.state)
			.field("task_running", &!self.handle.is_finished())
			.finish()
	}
}

impl CaptureJob {
	pub fn paths(&self) -> &RecordingPaths {
		&self.paths
	}

	pub fn state(&self) -> CaptureState {
		self.state
	}

	/// Whether the capture task is still polling.
	pub fn is_capturing(&self) -> bool {
		!self.handle.is_finished()
	}

	fn transition(&mut self, next: CaptureState) {
		debug!(target = "uitest", from = %self.state, to = %next, "Recording state");
		self.state = next;
	}

	/// Stops capturing and assembles the video.
	///
	/// Waits at most the join timeout for the capture task; a task that
	/// does not stop in time is left to exit on its own.
	pub async fn stop(mut self) -> RecordingOutcome {
		self.transition(CaptureState::StopRequested);
		let _ = self.stop_tx.send(true);

		match timeout(self.settings.join_timeout, &mut self.handle).await {
			Ok(Ok(summary)) => debug!(
				target = "uitest",
				written = summary.written,
				discarded = summary.discarded,
				exit = ?summary.exit,
				elapsed_ms = self.started.elapsed().as_millis() as u64,
				"Capture task finished"
			),
			Ok(Err(e)) => error!(target = "uitest", error = %e, "Capture task failed"),
			Err(_) => warn!(
				target = "uitest",
				timeout_ms = self.settings.join_timeout.as_millis() as u64,
				"Capture task did not stop in time; abandoning it"
			),
		}

		let frames = valid_frames(&self.paths.frames_dir, self.settings.min_frame_size).await;
		if frames.is_empty() {
			info!(target = "uitest", video = %self.paths.video.display(), "No valid frames captured; skipping video");
			self.transition(CaptureState::SkippedNoFrames);
			return RecordingOutcome::SkippedNoFrames;
		}

		self.transition(CaptureState::Assembling);
		let outcome = match self.encoder.encode(&frames, self.settings.fps, &self.paths.video).await {
			Ok(()) => RecordingOutcome::Done {
				video: self.paths.video.clone(),
				frames: frames.len(),
			},
			Err(e) => {
				error!(target = "uitest", video = %self.paths.video.display(), error = %e, "Failed to assemble video");
				RecordingOutcome::EncoderFailed { error: e.to_string() }
			}
		};
		self.transition(CaptureState::Done);
		outcome
	}
}

pub fn frame_file_name(index: usize, extension: &str) -> String {
	format!("frame_{index:06}.{extension}")
}

async fn capture_loop(
	driver: Arc<dyn Driver>,
	frames_dir: PathBuf,
	settings: RecorderSettings,
	mut stop: watch::Receiver<bool>,
) -> LoopSummary {
	let mut ticker = interval(settings.interval());
	ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
	let mut written = 0;
	let mut discarded = 0;

	let exit = loop {
		tokio::select! {
			biased;
			_ = stop.changed() => break LoopExit::Stopped,
			_ = ticker.tick() => {}
		}
		if driver.session_id().is_none() {
			debug!(target = "uitest", "Session ended; stopping capture");
			break LoopExit::SessionEnded;
		}
		if written >= settings.max_frames {
			warn!(target = "uitest", max_frames = settings.max_frames, "Frame limit reached; stopping capture");
			break LoopExit::FrameCap;
		}

		match driver.capture_screenshot(settings.screenshot).await {
			Ok(shot) if shot.len() > settings.min_frame_size => {
				let path = frames_dir.join(frame_file_name(written, shot.format.extension()));
				match tokio::fs::write(&path, &shot.data).await {
					Ok(()) => written += 1,
					Err(e) => warn!(target = "uitest", path = %path.display(), error = %e, "Failed to write frame"),
				}
			}
			Ok(shot) => {
				discarded += 1;
				trace!(target = "uitest", bytes = shot.len(), "Discarding undersized frame");
			}
			Err(e) if e.is_session_gone() => {
				debug!(target = "uitest", error = %e, "Session ended; stopping capture");
				break LoopExit::SessionEnded;
			}
			Err(e) => warn!(target = "uitest", error = %e, "Frame capture failed"),
		}
	};

	LoopSummary {
		written,
		discarded,
		exit,
	}
}

/// Frame files in `dir` larger than `min_size`, in capture order.
async fn valid_frames(dir: &Path, min_size: usize) -> Vec<PathBuf> {
	let mut frames = Vec::new();
	let mut entries = match tokio::fs::read_dir(dir).await {
		Ok(entries) => entries,
		Err(e) => {
			debug!(target = "uitest", path = %dir.display(), error = %e, "No frame directory");
			return frames;
		}
	};
	while let Ok(Some(entry)) = entries.next_entry().await {
		let name = entry.file_name();
		if !name.to_string_lossy().starts_with("frame_") {
			continue;
		}
		match entry.metadata().await {
			Ok(meta) if meta.is_file() && meta.len() > min_size as u64 => frames.push(entry.path()),
			_ => {}
		}
	}
	frames.sort();
	frames
}

#[cfg(test)]
mod tests {
	use std::fs;

	use async_trait::async_trait;
	use parking_lot::Mutex;
	use tempfile::TempDir;
	use uitest_protocol::BrowserKind;

	use super::*;
	use crate::Error;
	use crate::layout::ResourceLayout;
	use crate::testing::MockDriver;
	use crate::worker::WorkerId;

	#[derive(Default)]
	struct StubEncoder {
		calls: Mutex<Vec<(usize, u32)>>,
		fail: bool,
	}

	#[async_trait]
	impl VideoEncoder for StubEncoder {
		async fn encode(&self, frames: &[PathBuf], fps: u32, output: &Path) -> Result<()> {
			self.calls.lock().push((frames.len(), fps));
			if self.fail {
				return Err(Error::Encoder("libx264 not found".into()));
			}
			tokio::fs::write(output, b"mp4").await?;
			Ok(())
		}
	}

	fn fast_settings() -> RecorderSettings {
		RecorderSettings {
			fps: 50,
			join_timeout: Duration::from_secs(1),
			..RecorderSettings::default()
		}
	}

	fn paths(temp: &TempDir) -> RecordingPaths {
		ResourceLayout::new(temp.path(), WorkerId::distributed("gw0").unwrap()).recording("test_rec", "20240101_000000")
	}

	fn frame_sizes(dir: &Path) -> Vec<u64> {
		fs::read_dir(dir)
			.unwrap()
			.map(|e| e.unwrap().metadata().unwrap().len())
			.collect()
	}

	#[test]
	fn frame_names_are_zero_padded() {
		assert_eq!(frame_file_name(7, "jpg"), "frame_000007.jpg");
		assert_eq!(RecorderSettings::with_fps(10).interval(), Duration::from_millis(100));
	}

	#[tokio::test]
	async fn undersized_frames_are_never_written() {
		let temp = TempDir::new().unwrap();
		let driver = Arc::new(MockDriver::new(BrowserKind::Chrome));
		driver.queue_screenshot_sizes([100, 2048, 512, 4096, 10]);
		driver.die_after_screenshots(5);
		let encoder = Arc::new(StubEncoder::default());
		let recorder = VideoRecorder::new(fast_settings(), encoder.clone());

		let job = recorder.start(driver.clone(), paths(&temp)).await.unwrap();
		let frames_dir = job.paths().frames_dir.clone();
		tokio::time::sleep(Duration::from_millis(300)).await;
		let outcome = job.stop().await;

		let sizes = frame_sizes(&frames_dir);
		assert_eq!(sizes.len(), 2);
		assert!(sizes.iter().all(|&s| s > MIN_FRAME_SIZE as u64));
		assert!(matches!(outcome, RecordingOutcome::Done { frames: 2, .. }));
		assert_eq!(*encoder.calls.lock(), vec![(2, 50)]);
	}

	#[tokio::test]
	async fn session_death_ends_capture_within_an_interval() {
		let temp = TempDir::new().unwrap();
		let driver = Arc::new(MockDriver::new(BrowserKind::Chrome));
		driver.die_after_screenshots(3);
		let recorder = VideoRecorder::new(fast_settings(), Arc::new(StubEncoder::default()));

		let job = recorder.start(driver.clone(), paths(&temp)).await.unwrap();
		tokio::time::sleep(Duration::from_millis(250)).await;
		assert!(!job.is_capturing());
		assert_eq!(driver.screenshots_taken(), 3);

		let outcome = job.stop().await;
		assert!(matches!(outcome, RecordingOutcome::Done { frames: 3, .. }));
	}

	#[tokio::test]
	async fn no_frames_means_no_video() {
		let temp = TempDir::new().unwrap();
		let driver = Arc::new(MockDriver::new(BrowserKind::Chrome));
		driver.kill();
		let encoder = Arc::new(StubEncoder::default());
		let recorder = VideoRecorder::new(fast_settings(), encoder.clone());
		let paths = paths(&temp);

		let job = recorder.start(driver, paths.clone()).await.unwrap();
		let outcome = job.stop().await;

		assert_eq!(outcome, RecordingOutcome::SkippedNoFrames);
		assert!(!paths.video.exists());
		assert!(encoder.calls.lock().is_empty());
	}

	#[tokio::test]
	async fn encoder_failure_is_an_outcome() {
		let temp = TempDir::new().unwrap();
		let driver = Arc::new(MockDriver::new(BrowserKind::Chrome));
		let encoder = Arc::new(StubEncoder {
			fail: true,
			..StubEncoder::default()
		});
		let recorder = VideoRecorder::new(fast_settings(), encoder);

		let job = recorder.start(driver, paths(&temp)).await.unwrap();
		tokio::time::sleep(Duration::from_millis(100)).await;
		let outcome = job.stop().await;
		assert!(matches!(outcome, RecordingOutcome::EncoderFailed { ref error } if error.contains("libx264")));
	}

	#[tokio::test]
	async fn transient_capture_errors_do_not_end_the_loop() {
		let temp = TempDir::new().unwrap();
		let driver = Arc::new(MockDriver::new(BrowserKind::Chrome));
		driver.fail_times(crate::testing::MockOp::Screenshot, 2, || Error::JavaScript("renderer busy".into()));
		let recorder = VideoRecorder::new(fast_settings(), Arc::new(StubEncoder::default()));

		let job = recorder.start(driver.clone(), paths(&temp)).await.unwrap();
		tokio::time::sleep(Duration::from_millis(200)).await;
		assert!(job.is_capturing());
		let outcome = job.stop().await;
		assert!(matches!(outcome, RecordingOutcome::Done { frames, .. } if frames > 0));
	}

	#[tokio::test]
	async fn frame_cap_limits_disk_usage() {
		let temp = TempDir::new().unwrap();
		let driver = Arc::new(MockDriver::new(BrowserKind::Chrome));
		let settings = RecorderSettings {
			max_frames: 3,
			..fast_settings()
		};
		let recorder = VideoRecorder::new(settings, Arc::new(StubEncoder::default()));

		let job = recorder.start(driver.clone(), paths(&temp)).await.unwrap();
		let frames_dir = job.paths().frames_dir.clone();
		tokio::time::sleep(Duration::from_millis(300)).await;
		assert!(!job.is_capturing());
		let _ = job.stop().await;
		assert_eq!(frame_sizes(&frames_dir).len(), 3);
	}
}
