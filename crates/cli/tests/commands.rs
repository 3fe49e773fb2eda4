//! Runs the `uitest` binary against temporary directories.

use std::path::Path;
use std::process::{Command, Output};

fn uitest(root: &Path, args: &[&str]) -> Output {
	Command::new(env!("CARGO_BIN_EXE_uitest"))
		.args(args)
		.env("UITEST_WORKER", "gw7")
		.env("UITEST_ARTIFACTS_ROOT", root)
		.env("UITEST_ALLURE_DIR", root.join("allure-results"))
		.env_remove("BROWSER")
		.env_remove("CHROMEDRIVER_PATH")
		.env_remove("GECKODRIVER_PATH")
		.env_remove("GITHUB_ACTIONS")
		.env_remove("JENKINS_HOME")
		.output()
		.expect("failed to execute uitest")
}

fn stdout(output: &Output) -> String {
	String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn clean_empties_the_worker_directories() {
	let root = tempfile::tempdir().unwrap();
	let shots = root.path().join("tests_screenshots").join("gw7");
	std::fs::create_dir_all(&shots).unwrap();
	std::fs::write(shots.join("old.png"), b"png").unwrap();
	let other = root.path().join("tests_screenshots").join("gw8");
	std::fs::create_dir_all(&other).unwrap();
	std::fs::write(other.join("keep.png"), b"png").unwrap();

	let output = uitest(root.path(), &["clean"]);
	assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
	assert!(shots.is_dir());
	assert_eq!(std::fs::read_dir(&shots).unwrap().count(), 0);
	assert!(other.join("keep.png").exists());
	assert!(root.path().join("downloads").join("gw7").is_dir());
}

#[test]
fn env_writes_report_environment() {
	let root = tempfile::tempdir().unwrap();
	let output = uitest(
		root.path(),
		&["--browser", "firefox", "--base-url", "https://staging.example.test/", "env"],
	);
	assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

	let props = std::fs::read_to_string(root.path().join("allure-results").join("environment.properties")).unwrap();
	assert!(props.contains("Browser=Firefox"));
	assert!(props.contains("Base.URL=https://staging.example.test/"));
	assert!(props.contains("Window.Size=1920x1080"));
	assert!(!props.contains("Run.ID"));
}

#[test]
fn invalid_environment_exits_before_running() {
	let root = tempfile::tempdir().unwrap();
	let output = Command::new(env!("CARGO_BIN_EXE_uitest"))
		.arg("doctor")
		.env("UITEST_ARTIFACTS_ROOT", root.path())
		.env("BROWSER", "safari")
		.output()
		.unwrap();
	assert_eq!(output.status.code(), Some(2));
	assert!(String::from_utf8_lossy(&output.stderr).contains("safari"));
}

#[cfg(unix)]
#[test]
fn driver_which_prefers_the_env_override() {
	use std::os::unix::fs::PermissionsExt;

	let root = tempfile::tempdir().unwrap();
	let driver = root.path().join("chromedriver");
	std::fs::write(&driver, "#!/bin/sh\necho 'ChromeDriver 131.0'\n").unwrap();
	std::fs::set_permissions(&driver, std::fs::Permissions::from_mode(0o755)).unwrap();

	let output = Command::new(env!("CARGO_BIN_EXE_uitest"))
		.args(["driver", "which"])
		.env("UITEST_ARTIFACTS_ROOT", root.path())
		.env_remove("BROWSER")
		.env("CHROMEDRIVER_PATH", &driver)
		.output()
		.unwrap();
	assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
	assert_eq!(stdout(&output).trim(), driver.display().to_string());
}
