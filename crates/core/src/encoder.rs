//! Video assembly from captured frames.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{Error, Result};

/// Even dimensions and a widely supported pixel format; libx264 rejects odd sizes.
pub const SCALE_FILTER: &str = "scale=trunc(iw/2)*2:trunc(ih/2)*2,format=yuv420p";

const STDERR_TAIL_LINES: usize = 20;

/// Turns an ordered list of frame files into one video.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
	async fn encode(&self, frames: &[PathBuf], fps: u32, output: &Path) -> Result<()>;
}

/// Encodes with an `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
	binary: PathBuf,
}

impl Default for FfmpegEncoder {
	fn default() -> Self {
		Self::new()
	}
}

impl FfmpegEncoder {
	/// Uses `ffmpeg` from `PATH`.
	pub fn new() -> Self {
		Self::with_binary("ffmpeg")
	}

	pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
		Self { binary: binary.into() }
	}

	pub fn binary(&self) -> &Path {
		&self.binary
	}

	pub fn is_available(&self) -> bool {
		uitest_runtime::binary_is_usable(&self.binary)
	}
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
	async fn encode(&self, frames: &[PathBuf], fps: u32, output: &Path) -> Result<()> {
		if frames.is_empty() {
			return Err(Error::Encoder("no frames to encode".to_string()));
		}
		let list = output.with_extension("ffconcat");
		tokio::fs::write(&list, concat_list(frames, fps)).await?;

		let args = ffmpeg_args(&list, fps, output);
		debug!(target = "uitest", binary = %self.binary.display(), ?args, "Running encoder");
		let result = Command::new(&self.binary)
			.args(&args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.output()
			.await;
		let _ = tokio::fs::remove_file(&list).await;

		let out = result.map_err(|e| Error::Encoder(format!("failed to run {}: {e}", self.binary.display())))?;
		if !out.status.success() {
			return Err(Error::Encoder(format!(
				"{} exited with {}: {}",
				self.binary.display(),
				out.status,
				stderr_tail(&out.stderr)
			)));
		}
		info!(target = "uitest", path = %output.display(), frames = frames.len(), fps, "Video assembled");
		Ok(())
	}
}

/// Arguments for encoding the concat list at `list` into `output`.
pub fn ffmpeg_args(list: &Path, fps: u32, output: &Path) -> Vec<String> {
	vec![
		"-y".to_string(),
		"-f".to_string(),
		"concat".to_string(),
		"-safe".to_string(),
		"0".to_string(),
		"-i".to_string(),
		list.display().to_string(),
		"-vf".to_string(),
		SCALE_FILTER.to_string(),
		"-r".to_string(),
		fps.to_string(),
		"-c:v".to_string(),
		"libx264".to_string(),
		"-pix_fmt".to_string(),
		"yuv420p".to_string(),
		output.display().to_string(),
	]
}

/// An ffconcat script showing each frame for `1 / fps` seconds.
///
/// The last frame is listed twice so that its duration is honoured.
pub fn concat_list(frames: &[PathBuf], fps: u32) -> String {
	let duration = 1.0 / f64::from(fps.max(1));
	let mut out = String::from("ffconcat version 1.0\n");
	for frame in frames {
		out.push_str(&format!("file '{}'\nduration {duration:.6}\n", quote(frame)));
	}
	if let Some(last) = frames.last() {
		out.push_str(&format!("file '{}'\n", quote(last)));
	}
	out
}

fn quote(path: &Path) -> String {
	let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
	path.display().to_string().replace('\'', "'\\''")
}

fn stderr_tail(stderr: &[u8]) -> String {
	let text = String::from_utf8_lossy(stderr);
	let lines: Vec<&str> = text.lines().collect();
	lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n")
}
