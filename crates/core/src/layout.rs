//! Per-worker filesystem layout.
//!
//! ```text
//! <root>/tests_screenshots/<worker>/        <root>/tests_screenshots/<worker>.lock
//! <root>/tests_recordings/<worker>/<test>_<ts>/frames/
//! <root>/tests_recordings/<worker>/<test>_<ts>/<test>_<ts>.mp4
//! <root>/downloads/<worker>/                 <root>/downloads/<worker>.lock
//! <root>/temp/user_data_<worker>/            <root>/temp/user_data_<worker>.lock
//! ```
//!
//! Lock files sit next to the directory they guard so that cleaning a
//! directory never deletes its own lock.

use std::path::{Path, PathBuf};

use crate::worker::WorkerId;

/// What a worker directory is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourcePurpose {
	UserData,
	Downloads,
	Screenshots,
	Recordings,
}

impl ResourcePurpose {
	pub const ALL: [ResourcePurpose; 4] = [
		ResourcePurpose::UserData,
		ResourcePurpose::Downloads,
		ResourcePurpose::Screenshots,
		ResourcePurpose::Recordings,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::UserData => "user-data",
			Self::Downloads => "downloads",
			Self::Screenshots => "screenshots",
			Self::Recordings => "recordings",
		}
	}
}

/// Paths of one test's recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingPaths {
	pub dir: PathBuf,
	pub frames_dir: PathBuf,
	pub video: PathBuf,
}

/// Maps a worker onto its isolated directories under `root`.
#[derive(Debug, Clone)]
pub struct ResourceLayout {
	root: PathBuf,
	worker: WorkerId,
}

impl ResourceLayout {
	pub fn new(root: impl Into<PathBuf>, worker: WorkerId) -> Self {
		Self {
			root: root.into(),
			worker,
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn worker(&self) -> &WorkerId {
		&self.worker
	}

	pub fn dir(&self, purpose: ResourcePurpose) -> PathBuf {
		let worker = self.worker.as_str();
		match purpose {
			ResourcePurpose::UserData => self.root.join("temp").join(format!("user_data_{worker}")),
			ResourcePurpose::Downloads => self.root.join("downloads").join(worker),
			ResourcePurpose::Screenshots => self.root.join("tests_screenshots").join(worker),
			ResourcePurpose::Recordings => self.root.join("tests_recordings").join(worker),
		}
	}

	/// Lock file guarding `dir(purpose)`.
	pub fn lock_path(&self, purpose: ResourcePurpose) -> PathBuf {
		lock_path_for(&self.dir(purpose))
	}

	pub fn screenshots_dir(&self) -> PathBuf {
		self.dir(ResourcePurpose::Screenshots)
	}

	pub fn recordings_dir(&self) -> PathBuf {
		self.dir(ResourcePurpose::Recordings)
	}

	pub fn downloads_dir(&self) -> PathBuf {
		self.dir(ResourcePurpose::Downloads)
	}

	pub fn user_data_dir(&self) -> PathBuf {
		self.dir(ResourcePurpose::UserData)
	}

	/// Directory, frame directory and video file for one recorded test.
	pub fn recording(&self, test_name: &str, timestamp: &str) -> RecordingPaths {
		let stem = format!("{}_{timestamp}", sanitize_name(test_name));
		let dir = self.recordings_dir().join(&stem);
		RecordingPaths {
			frames_dir: dir.join("frames"),
			video: dir.join(format!("{stem}.mp4")),
			dir,
		}
	}
}

/// `<parent>/<name>.lock` for a directory `<parent>/<name>`.
pub fn lock_path_for(dir: &Path) -> PathBuf {
	let name = dir
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| "dir".to_string());
	dir.with_file_name(format!("{name}.lock"))
}

/// Makes a test name usable as a file name.
pub fn sanitize_name(name: &str) -> String {
	name.chars()
		.map(|c| match c {
			':' | '/' | '\\' | '<' | '>' | '"' | '|' | '?' | '*' => '_',
			c if c.is_whitespace() => '_',
			c => c,
		})
		.collect()
}

/// Local timestamp used in artifact names, e.g. `20240131_142501`.
pub fn timestamp() -> String {
	chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::*;

	#[test]
	fn distinct_workers_never_share_a_directory() {
		let gw0 = ResourceLayout::new("/work", WorkerId::distributed("gw0").unwrap());
		let gw1 = ResourceLayout::new("/work", WorkerId::distributed("gw1").unwrap());

		let mut seen = HashSet::new();
		for layout in [&gw0, &gw1] {
			for purpose in ResourcePurpose::ALL {
				assert!(seen.insert(layout.dir(purpose)), "duplicate {purpose:?}");
				assert!(seen.insert(layout.lock_path(purpose)));
			}
		}
		for purpose in ResourcePurpose::ALL {
			let a = gw0.dir(purpose);
			let b = gw1.dir(purpose);
			assert!(!a.starts_with(&b) && !b.starts_with(&a));
		}
	}

	#[test]
	fn follows_documented_layout() {
		let layout = ResourceLayout::new("/work", WorkerId::distributed("gw0").unwrap());
		assert_eq!(layout.screenshots_dir(), Path::new("/work/tests_screenshots/gw0"));
		assert_eq!(layout.downloads_dir(), Path::new("/work/downloads/gw0"));
		assert_eq!(layout.user_data_dir(), Path::new("/work/temp/user_data_gw0"));
		assert_eq!(
			layout.lock_path(ResourcePurpose::Screenshots),
			Path::new("/work/tests_screenshots/gw0.lock")
		);

		let rec = layout.recording("test_login[chrome]", "20240101_120000");
		assert_eq!(
			rec.frames_dir,
			Path::new("/work/tests_recordings/gw0/test_login[chrome]_20240101_120000/frames")
		);
		assert_eq!(
			rec.video,
			Path::new(
				"/work/tests_recordings/gw0/test_login[chrome]_20240101_120000/test_login[chrome]_20240101_120000.mp4"
			)
		);
	}

	#[test]
	fn sanitize_replaces_path_separators() {
		assert_eq!(sanitize_name("suite/test::case one"), "suite_test__case_one");
	}

	#[test]
	fn timestamp_has_fixed_shape() {
		let ts = timestamp();
		assert_eq!(ts.len(), 15);
		assert_eq!(ts.as_bytes()[8], b'_');
	}
}
