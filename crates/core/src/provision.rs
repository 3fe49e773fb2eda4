//! Browser provisioning and guaranteed teardown.
//!
//! [`Provisioner::acquire`] resolves the driver, computes the worker's
//! debug port, builds capabilities, takes the profile lock, launches, and
//! applies post-launch overrides. A [`BrowserSession`] is released exactly
//! once by consuming it in [`BrowserSession::release`].

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};
use uitest_protocol::{BrowserKind, Capabilities, ChromeOptions, FirefoxOptions, Geolocation, NewSessionRequest};
use uitest_runtime::{DriverResolver, DriverService, ResolvedDriver, ServiceConfig};
use url::Url;

use crate::config::{HarnessConfig, WindowSize};
use crate::driver::Driver;
use crate::layout::{ResourceLayout, ResourcePurpose};
use crate::lock::FileLock;
use crate::webdriver::WebDriverSession;
use crate::{Error, Result};

/// Browser-level settings derived from configuration and the worker layout.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
	pub headless: bool,
	pub maximized: bool,
	pub window: Option<WindowSize>,
	pub user_data_dir: PathBuf,
	pub download_dir: PathBuf,
	pub debug_port: u16,
	pub geolocation: Option<Geolocation>,
}

/// Everything a [`Launcher`] needs to start one browser.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
	pub browser: BrowserKind,
	pub driver: ResolvedDriver,
	pub options: BrowserOptions,
	pub capabilities: Capabilities,
	/// Where the driver process writes its own log, if anywhere.
	pub driver_log: Option<PathBuf>,
}

/// Starts browsers. The seam between provisioning policy and processes.
#[async_trait]
pub trait Launcher: Send + Sync {
	/// Locates the driver binary for `browser`.
	fn resolve(&self, browser: BrowserKind) -> Result<ResolvedDriver>;

	/// Starts the browser described by `plan`.
	///
	/// On error nothing is left running.
	async fn launch(&self, plan: &LaunchPlan) -> Result<Arc<dyn Driver>>;
}

/// Launches real browsers through chromedriver or geckodriver.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
	cache_root: Option<PathBuf>,
	cache_valid_days: u64,
	startup_timeout: Duration,
}

impl WebDriverLauncher {
	pub fn new(cache_valid_days: u64) -> Self {
		Self {
			cache_root: None,
			cache_valid_days,
			startup_timeout: Duration::from_secs(20),
		}
	}

	pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
		self.cache_root = Some(root.into());
		self
	}

	pub fn resolver(&self, browser: BrowserKind) -> DriverResolver {
		let resolver = DriverResolver::new(browser).with_cache_validity_days(self.cache_valid_days);
		match &self.cache_root {
			Some(root) => resolver.with_cache_root(root),
			None => resolver,
		}
	}
}

#[async_trait]
impl Launcher for WebDriverLauncher {
	fn resolve(&self, browser: BrowserKind) -> Result<ResolvedDriver> {
		self.resolver(browser).resolve()
	}

	async fn launch(&self, plan: &LaunchPlan) -> Result<Arc<dyn Driver>> {
		let mut service = ServiceConfig::new(plan.browser, &plan.driver.path, plan.options.debug_port);
		service.log_file = plan.driver_log.clone();
		service.startup_timeout = self.startup_timeout;

		let service = DriverService::start(&service).await?;
		let request = NewSessionRequest::new(plan.capabilities.clone());
		let session = WebDriverSession::start(service, plan.browser, &request).await?;
		Ok(Arc::new(session))
	}
}

/// A provisioned browser bound to its worker's profile directory.
///
/// Holds the profile lock for its whole life, so a second session cannot
/// share the profile. Dropping without [`release`](Self::release) still
/// kills the driver process, but skips the orderly session shutdown.
pub struct BrowserSession {
	driver: Arc<dyn Driver>,
	browser: BrowserKind,
	debug_port: u16,
	user_data_dir: PathBuf,
	_profile_lock: FileLock,
}

impl std::fmt::Debug for BrowserSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BrowserSession")
			.field("browser", &self.browser)
			.field("session_id", &self.driver.session_id())
			.field("debug_port", &self.debug_port)
			.field("user_data_dir", &self.user_data_dir)
			.finish()
	}
}

impl BrowserSession {
	pub fn driver(&self) -> &Arc<dyn Driver> {
		&self.driver
	}

	pub fn browser(&self) -> BrowserKind {
		self.browser
	}

	pub fn debug_port(&self) -> u16 {
		self.debug_port
	}

	pub fn user_data_dir(&self) -> &Path {
		&self.user_data_dir
	}

	/// Quits the browser. Failures are logged, never returned.
	pub async fn release(self) {
		info!(target = "uitest", browser = %self.browser, "Quitting driver");
		if let Err(e) = self.driver.quit().await {
			warn!(target = "uitest", browser = %self.browser, error = %e, "Failed to quit driver");
		}
	}
}

/// Provisions browsers for one worker.
#[derive(Clone)]
pub struct Provisioner {
	launcher: Arc<dyn Launcher>,
	lock_timeout: Duration,
}

impl Provisioner {
	pub fn new(launcher: Arc<dyn Launcher>, lock_timeout: Duration) -> Self {
		Self {
			launcher,
			lock_timeout,
		}
	}

	/// Builds the launch plan for `browser` without starting anything.
	pub fn plan(&self, browser: BrowserKind, layout: &ResourceLayout, config: &HarnessConfig) -> Result<LaunchPlan> {
		let driver = self.launcher.resolve(browser)?;
		Ok(launch_plan(browser, driver, layout, config))
	}

	/// Resolves the driver on the blocking pool, since resolution stats
	/// files and runs candidate binaries with `--version`.
	async fn resolve_driver(&self, browser: BrowserKind) -> Result<ResolvedDriver> {
		let launcher = Arc::clone(&self.launcher);
		tokio::task::spawn_blocking(move || launcher.resolve(browser))
			.await
			.map_err(|e| Error::Io(io::Error::other(e)))?
	}

	/// Starts a browser for the worker described by `layout`.
	///
	/// # Errors
	///
	/// - [`Error::DriverUnavailable`] when no driver binary is found
	/// - [`Error::LockTimeout`] when another session holds the profile
	/// - [`Error::LaunchFailed`] when the browser never became usable; if a
	///   browser was started, it has already been quit
	pub async fn acquire(&self, browser: BrowserKind, layout: &ResourceLayout, config: &HarnessConfig) -> Result<BrowserSession> {
		let driver = self.resolve_driver(browser).await?;
		let plan = launch_plan(browser, driver, layout, config);
		info!(
			target = "uitest",
			%browser,
			driver = %plan.driver.path.display(),
			debug_port = plan.options.debug_port,
			"Initializing driver"
		);

		let profile_lock = FileLock::acquire(layout.lock_path(ResourcePurpose::UserData), self.lock_timeout).await?;
		tokio::fs::create_dir_all(&plan.options.user_data_dir).await?;
		tokio::fs::create_dir_all(&plan.options.download_dir).await?;

		let driver = match self.launcher.launch(&plan).await {
			Ok(driver) => driver,
			Err(e) => {
				error!(target = "uitest", %browser, error = %e, "Failed to initialize driver");
				return Err(e);
			}
		};

		if let Err(e) = apply_post_launch(driver.as_ref(), &plan.options, &config.base_url).await {
			error!(target = "uitest", %browser, error = %e, "Post-launch setup failed");
			if let Err(quit) = driver.quit().await {
				warn!(target = "uitest", error = %quit, "Failed to quit driver after setup failure");
			}
			return Err(Error::LaunchFailed(format!("post-launch setup failed: {e}")));
		}

		Ok(BrowserSession {
			driver,
			browser,
			debug_port: plan.options.debug_port,
			user_data_dir: plan.options.user_data_dir,
			_profile_lock: profile_lock,
		})
	}
}

fn launch_plan(browser: BrowserKind, driver: ResolvedDriver, layout: &ResourceLayout, config: &HarnessConfig) -> LaunchPlan {
	let debug_port = layout
		.worker()
		.debug_port_in(config.debug_port_base, config.debug_port_window);
	let options = BrowserOptions {
		headless: config.headless,
		maximized: config.maximized,
		window: Some(config.window),
		user_data_dir: layout.user_data_dir(),
		download_dir: layout.downloads_dir(),
		debug_port,
		geolocation: config.geolocation,
	};
	let capabilities = capabilities(browser, &options);
	LaunchPlan {
		browser,
		driver,
		options,
		capabilities,
		driver_log: None,
	}
}

/// Window sizing (best-effort) then geolocation override (required).
async fn apply_post_launch(driver: &dyn Driver, options: &BrowserOptions, base_url: &str) -> Result<()> {
	if options.maximized {
		if let Err(e) = driver.maximize().await {
			warn!(target = "uitest", error = %e, "Failed to maximize window");
		}
	} else if let Some(window) = options.window {
		if let Err(e) = driver.set_window_size(window.width, window.height).await {
			warn!(target = "uitest", error = %e, "Failed to set window size");
		}
	}

	if let (BrowserKind::Chrome, Some(geo)) = (driver.browser(), options.geolocation) {
		let origin = origin_of(base_url)?;
		driver
			.execute_cdp(
				"Browser.grantPermissions",
				json!({ "origin": origin, "permissions": ["geolocation"] }),
			)
			.await?;
		driver
			.execute_cdp(
				"Emulation.setGeolocationOverride",
				json!({
					"latitude": geo.latitude,
					"longitude": geo.longitude,
					"accuracy": geo.accuracy,
				}),
			)
			.await?;
	}
	Ok(())
}

fn origin_of(base_url: &str) -> Result<String> {
	let url = Url::parse(base_url).map_err(|e| Error::InvalidConfig(format!("BASE_URL '{base_url}': {e}")))?;
	Ok(url.origin().ascii_serialization())
}

/// New-session capabilities for `browser`.
pub fn capabilities(browser: BrowserKind, options: &BrowserOptions) -> Capabilities {
	let mut caps = match browser {
		BrowserKind::Chrome => Capabilities::chrome(chrome_options(options)),
		BrowserKind::Firefox => Capabilities::firefox(firefox_options(options)),
	};
	caps.accept_insecure_certs = Some(true);
	caps
}

pub fn chrome_options(options: &BrowserOptions) -> ChromeOptions {
	let mut args = vec![
		format!("--user-data-dir={}", options.user_data_dir.display()),
		"--profile-directory=Default".to_string(),
		format!("--remote-debugging-port={}", options.debug_port),
		"--disable-features=TriggeredProfileReset,ProfileResetPrompt".to_string(),
		"--no-first-run".to_string(),
		"--no-default-browser-check".to_string(),
		"--use-fake-ui-for-media-stream".to_string(),
		"--use-fake-device-for-media-stream".to_string(),
		"--disable-popup-blocking".to_string(),
		"--disable-notifications".to_string(),
		"--disable-gpu".to_string(),
		"--no-sandbox".to_string(),
		"--disable-dev-shm-usage".to_string(),
		"--disable-blink-features=AutomationControlled".to_string(),
	];
	if options.maximized {
		args.push("--start-maximized".to_string());
	} else if let Some(window) = options.window {
		args.push(format!("--window-size={},{}", window.width, window.height));
	}
	if options.headless {
		args.push("--headless=new".to_string());
	}

	let mut prefs = Map::new();
	let download_dir = options.download_dir.display().to_string();
	for (key, value) in [
		("download.default_directory", json!(download_dir)),
		("download.prompt_for_download", json!(false)),
		("download.directory_upgrade", json!(true)),
		("profile.default_content_setting_values.notifications", json!(2)),
		("profile.default_content_setting_values.geolocation", json!(1)),
		("credentials_enable_service", json!(false)),
		("profile.password_manager_enabled", json!(false)),
		("profile.password_manager_leak_detection", json!(false)),
		("autofill.profile_enabled", json!(false)),
		("profile.exit_type", json!("Normal")),
		("profile.exited_cleanly", json!(true)),
		("profile.default_content_settings.popups", json!(0)),
		("profile.reset_prompt_enabled", json!(false)),
	] {
		prefs.insert(key.to_string(), value);
	}

	ChromeOptions {
		args,
		prefs,
		exclude_switches: vec!["enable-automation".to_string(), "enable-logging".to_string()],
		use_automation_extension: Some(false),
		binary: None,
	}
}

pub fn firefox_options(options: &BrowserOptions) -> FirefoxOptions {
	let mut args = vec![
		"-profile".to_string(),
		options.user_data_dir.display().to_string(),
	];
	if options.headless {
		args.push("-headless".to_string());
	}
	if let Some(window) = options.window {
		args.push("-width".to_string());
		args.push(window.width.to_string());
		args.push("-height".to_string());
		args.push(window.height.to_string());
	}

	let mut prefs = Map::new();
	let download_dir = options.download_dir.display().to_string();
	for (key, value) in [
		("marionette.port", json!(options.debug_port)),
		("browser.cache.disk.enable", json!(false)),
		("browser.cache.memory.enable", json!(false)),
		("browser.cache.offline.enable", json!(false)),
		("browser.download.dir", json!(download_dir)),
		("browser.download.folderList", json!(2)),
		("browser.download.manager.showWhenStarting", json!(false)),
		("browser.download.manager.closeWhenDone", json!(true)),
		(
			"browser.helperApps.neverAsk.saveToDisk",
			json!("application/octet-stream,text/plain,application/pdf"),
		),
		("browser.download.manager.alertOnEXEOpen", json!(false)),
		("browser.download.manager.focusWhenStarting", json!(false)),
		("browser.download.manager.useWindow", json!(false)),
		("browser.download.manager.showAlertOnComplete", json!(false)),
		("signon.rememberSignons", json!(false)),
		("signon.autofillForms", json!(false)),
		("signon.management.page.breach-alerts.enabled", json!(false)),
		("dom.webnotifications.enabled", json!(false)),
	] {
		prefs.insert(key.to_string(), value);
	}

	if let Some(geo) = options.geolocation {
		insert_geolocation_prefs(&mut prefs, geo);
	}

	FirefoxOptions {
		args,
		prefs,
		binary: None,
	}
}

/// Firefox has no post-launch override, so the position is served from a data URI.
fn insert_geolocation_prefs(prefs: &mut Map<String, Value>, geo: Geolocation) {
	let location = json!({
		"location": { "lat": geo.latitude, "lng": geo.longitude },
		"accuracy": geo.accuracy,
	});
	for (key, value) in [
		("geo.enabled", json!(true)),
		("geo.prompt.testing", json!(true)),
		("geo.prompt.testing.allow", json!(true)),
		("geo.provider.use_corelocation", json!(false)),
		("geo.provider.use_gpsd", json!(false)),
		("geo.provider.use_geoclue", json!(false)),
		("geo.provider.testing", json!(false)),
		("permissions.default.geo", json!(1)),
		(
			"geo.provider.network.url",
			json!(format!("data:application/json,{location}")),
		),
	] {
		prefs.insert(key.to_string(), value);
	}
}
