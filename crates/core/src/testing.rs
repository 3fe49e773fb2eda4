//! In-memory test doubles for the [`Driver`], [`Launcher`] and
//! [`ReportSink`] seams.
//!
//! [`MockDriver`] models a page as a flat list of elements keyed by the
//! locator that finds them. Elements can appear, disappear or be
//! re-rendered (leaving stale references behind) while a test runs, and
//! any operation can be made to fail a fixed number of times.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use uitest_protocol::{BrowserKind, ElementRef, Locator};
use uitest_runtime::{DriverSource, ResolvedDriver};

use crate::driver::{Driver, Screenshot, ScreenshotOptions};
use crate::hooks::Outcome;
use crate::provision::{LaunchPlan, Launcher};
use crate::report::{ContentType, ReportSink};
use crate::{Error, Result};

type ErrorFactory = Arc<dyn Fn() -> Error + Send + Sync>;

/// Screenshot payload size used when no sizes are queued.
pub const DEFAULT_SCREENSHOT_SIZE: usize = 4096;

/// Operations that can be made to fail with [`MockDriver::fail_times`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
	Navigate,
	Find,
	Click,
	SendKeys,
	Text,
	Script,
	Screenshot,
	Cdp,
	Quit,
}

/// State of one element on the mock page.
#[derive(Debug, Clone)]
pub struct MockElement {
	pub text: String,
	pub displayed: bool,
	pub enabled: bool,
	pub selected: bool,
	pub attributes: HashMap<String, String>,
}

impl Default for MockElement {
	fn default() -> Self {
		Self {
			text: String::new(),
			displayed: true,
			enabled: true,
			selected: false,
			attributes: HashMap::new(),
		}
	}
}

impl MockElement {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn text(mut self, text: impl Into<String>) -> Self {
		self.text = text.into();
		self
	}

	pub fn hidden(mut self) -> Self {
		self.displayed = false;
		self
	}

	pub fn disabled(mut self) -> Self {
		self.enabled = false;
		self
	}

	pub fn selected(mut self) -> Self {
		self.selected = true;
		self
	}

	pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.insert(name.into(), value.into());
		self
	}

	pub fn checkbox(self) -> Self {
		self.attr("type", "checkbox")
	}
}

struct Node {
	id: String,
	locator: Locator,
	scope: Option<String>,
	element: MockElement,
	attached: bool,
}

struct Failure {
	op: MockOp,
	remaining: usize,
	make: ErrorFactory,
}

struct State {
	session_id: Option<String>,
	generation: u64,
	url: String,
	title: String,
	nodes: Vec<Node>,
	next_id: u64,
	failures: Vec<Failure>,
	screenshot_sizes: Vec<usize>,
	screenshots: usize,
	die_after_screenshots: Option<usize>,
	visited: Vec<String>,
	scripts: Vec<String>,
	script_result: Value,
	clicks: Vec<Locator>,
	refreshes: usize,
	cdp: Vec<String>,
	window: Option<(u32, u32)>,
	maximized: bool,
	quit_calls: usize,
}

impl State {
	fn take_failure(&mut self, op: MockOp) -> Option<Error> {
		let failure = self.failures.iter_mut().find(|f| f.op == op && f.remaining > 0)?;
		failure.remaining -= 1;
		Some((failure.make)())
	}

	fn alive(&self) -> Result<()> {
		match self.session_id {
			Some(_) => Ok(()),
			None => Err(Error::InvalidSession("session deleted".to_string())),
		}
	}

	fn push(&mut self, locator: Locator, scope: Option<String>, element: MockElement) -> String {
		self.next_id += 1;
		let id = format!("mock-{}", self.next_id);
		self.nodes.push(Node {
			id: id.clone(),
			locator,
			scope,
			element,
			attached: true,
		});
		id
	}

	fn matches(&self, locator: &Locator, scope: Option<&ElementRef>) -> Vec<ElementRef> {
		self.nodes
			.iter()
			.filter(|n| n.attached && &n.locator == locator)
			.filter(|n| match scope {
				Some(parent) => n.scope.as_deref() == Some(parent.id.as_str()),
				None => true,
			})
			.map(|n| ElementRef::new(&n.id))
			.collect()
	}

	fn node(&mut self, element: &ElementRef) -> Result<&mut Node> {
		let node = self
			.nodes
			.iter_mut()
			.find(|n| n.id == element.id)
			.ok_or_else(|| Error::NoSuchElement(format!("unknown element {}", element.id)))?;
		if node.attached {
			Ok(node)
		} else {
			Err(Error::StaleElement(format!("element {} is no longer attached", element.id)))
		}
	}
}

/// Scriptable in-memory browser.
pub struct MockDriver {
	browser: BrowserKind,
	state: Mutex<State>,
}

impl MockDriver {
	pub fn new(browser: BrowserKind) -> Self {
		Self {
			browser,
			state: Mutex::new(State {
				session_id: Some("mock-session-0".to_string()),
				generation: 0,
				url: "about:blank".to_string(),
				title: String::new(),
				nodes: Vec::new(),
				next_id: 0,
				failures: Vec::new(),
				screenshot_sizes: Vec::new(),
				screenshots: 0,
				die_after_screenshots: None,
				visited: Vec::new(),
				scripts: Vec::new(),
				script_result: json!("complete"),
				clicks: Vec::new(),
				refreshes: 0,
				cdp: Vec::new(),
				window: None,
				maximized: false,
				quit_calls: 0,
			}),
		}
	}

	/// Starts a fresh session, as a relaunch would.
	pub fn revive(&self) {
		let mut state = self.state.lock();
		state.generation += 1;
		state.session_id = Some(format!("mock-session-{}", state.generation));
		state.screenshots = 0;
		state.die_after_screenshots = None;
	}

	/// Ends the session without a quit call, as a crashed browser would.
	pub fn kill(&self) {
		self.state.lock().session_id = None;
	}

	pub fn add_element(&self, locator: Locator, element: MockElement) -> ElementRef {
		ElementRef::new(self.state.lock().push(locator, None, element))
	}

	/// Adds an element found only when searching inside `parent`.
	pub fn add_child(&self, parent: &ElementRef, locator: Locator, element: MockElement) -> ElementRef {
		ElementRef::new(self.state.lock().push(locator, Some(parent.id.clone()), element))
	}

	/// Replaces every element matched by `locator`.
	pub fn set_elements(&self, locator: Locator, elements: Vec<MockElement>) {
		self.remove_elements(&locator);
		let mut state = self.state.lock();
		for element in elements {
			state.push(locator.clone(), None, element);
		}
	}

	/// Detaches every element matched by `locator`; old references go stale.
	pub fn remove_elements(&self, locator: &Locator) {
		for node in self.state.lock().nodes.iter_mut().filter(|n| &n.locator == locator) {
			node.attached = false;
		}
	}

	pub fn update_element(&self, locator: &Locator, update: impl Fn(&mut MockElement)) {
		for node in self
			.state
			.lock()
			.nodes
			.iter_mut()
			.filter(|n| n.attached && &n.locator == locator)
		{
			update(&mut node.element);
		}
	}

	/// Re-renders the elements matched by `locator` under new references.
	pub fn mark_stale(&self, locator: &Locator) {
		let mut state = self.state.lock();
		let mut fresh = Vec::new();
		for node in state.nodes.iter_mut().filter(|n| n.attached && &n.locator == locator) {
			node.attached = false;
			fresh.push((node.scope.clone(), node.element.clone()));
		}
		for (scope, element) in fresh {
			state.push(locator.clone(), scope, element);
		}
	}

	/// Makes the next `times` calls of `op` fail with `make()`.
	pub fn fail_times(&self, op: MockOp, times: usize, make: impl Fn() -> Error + Send + Sync + 'static) {
		self.state.lock().failures.push(Failure {
			op,
			remaining: times,
			make: Arc::new(make),
		});
	}

	pub fn fail_cdp_with(&self, make: impl Fn() -> Error + Send + Sync + 'static) {
		self.fail_times(MockOp::Cdp, usize::MAX, make);
	}

	pub fn fail_quit_with(&self, make: impl Fn() -> Error + Send + Sync + 'static) {
		self.fail_times(MockOp::Quit, usize::MAX, make);
	}

	pub fn fail_screenshots_with(&self, make: impl Fn() -> Error + Send + Sync + 'static) {
		self.fail_times(MockOp::Screenshot, usize::MAX, make);
	}

	/// Sizes of upcoming screenshots, consumed in order.
	pub fn queue_screenshot_sizes(&self, sizes: impl IntoIterator<Item = usize>) {
		self.state.lock().screenshot_sizes.extend(sizes);
	}

	/// The session dies once `count` screenshots have been taken.
	pub fn die_after_screenshots(&self, count: usize) {
		self.state.lock().die_after_screenshots = Some(count);
	}

	pub fn set_title(&self, title: impl Into<String>) {
		self.state.lock().title = title.into();
	}

	pub fn set_script_result(&self, value: Value) {
		self.state.lock().script_result = value;
	}

	pub fn screenshots_taken(&self) -> usize {
		self.state.lock().screenshots
	}

	pub fn visited(&self) -> Vec<String> {
		self.state.lock().visited.clone()
	}

	pub fn scripts(&self) -> Vec<String> {
		self.state.lock().scripts.clone()
	}

	/// Locators of every clicked element, in order.
	pub fn clicks(&self) -> Vec<Locator> {
		self.state.lock().clicks.clone()
	}

	pub fn refreshes(&self) -> usize {
		self.state.lock().refreshes
	}

	pub fn cdp_commands(&self) -> Vec<String> {
		self.state.lock().cdp.clone()
	}

	pub fn window_size(&self) -> Option<(u32, u32)> {
		self.state.lock().window
	}

	pub fn is_maximized(&self) -> bool {
		self.state.lock().maximized
	}

	pub fn quit_calls(&self) -> usize {
		self.state.lock().quit_calls
	}

	/// Current state of the first attached element matched by `locator`.
	pub fn element(&self, locator: &Locator) -> Option<MockElement> {
		self.state
			.lock()
			.nodes
			.iter()
			.find(|n| n.attached && &n.locator == locator)
			.map(|n| n.element.clone())
	}
}

#[async_trait]
impl Driver for MockDriver {
	fn session_id(&self) -> Option<String> {
		self.state.lock().session_id.clone()
	}

	fn browser(&self) -> BrowserKind {
		self.browser
	}

	async fn navigate(&self, url: &str) -> Result<()> {
		let mut state = self.state.lock();
		state.alive()?;
		if let Some(e) = state.take_failure(MockOp::Navigate) {
			return Err(e);
		}
		state.url = url.to_string();
		state.visited.push(url.to_string());
		Ok(())
	}

	async fn current_url(&self) -> Result<String> {
		let state = self.state.lock();
		state.alive()?;
		Ok(state.url.clone())
	}

	async fn title(&self) -> Result<String> {
		let state = self.state.lock();
		state.alive()?;
		Ok(state.title.clone())
	}

	async fn refresh(&self) -> Result<()> {
		let mut state = self.state.lock();
		state.alive()?;
		state.refreshes += 1;
		Ok(())
	}

	async fn find(&self, locator: &Locator, scope: Option<&ElementRef>) -> Result<ElementRef> {
		let mut state = self.state.lock();
		state.alive()?;
		if let Some(e) = state.take_failure(MockOp::Find) {
			return Err(e);
		}
		state
			.matches(locator, scope)
			.into_iter()
			.next()
			.ok_or_else(|| Error::NoSuchElement(locator.to_string()))
	}

	async fn find_all(&self, locator: &Locator, scope: Option<&ElementRef>) -> Result<Vec<ElementRef>> {
		let mut state = self.state.lock();
		state.alive()?;
		if let Some(e) = state.take_failure(MockOp::Find) {
			return Err(e);
		}
		Ok(state.matches(locator, scope))
	}

	async fn execute_script(&self, script: &str, _args: Vec<Value>) -> Result<Value> {
		let mut state = self.state.lock();
		state.alive()?;
		if let Some(e) = state.take_failure(MockOp::Script) {
			return Err(e);
		}
		state.scripts.push(script.to_string());
		Ok(state.script_result.clone())
	}

	async fn capture_screenshot(&self, options: ScreenshotOptions) -> Result<Screenshot> {
		let mut state = self.state.lock();
		state.alive()?;
		if let Some(e) = state.take_failure(MockOp::Screenshot) {
			return Err(e);
		}
		if state.die_after_screenshots.is_some_and(|limit| state.screenshots >= limit) {
			state.session_id = None;
			return Err(Error::InvalidSession("browser has closed".to_string()));
		}
		state.screenshots += 1;
		let size = if state.screenshot_sizes.is_empty() {
			DEFAULT_SCREENSHOT_SIZE
		} else {
			state.screenshot_sizes.remove(0)
		};
		Ok(Screenshot {
			format: options.format,
			data: vec![0x5a; size],
		})
	}

	async fn click(&self, element: &ElementRef) -> Result<()> {
		let mut state = self.state.lock();
		state.alive()?;
		if let Some(e) = state.take_failure(MockOp::Click) {
			return Err(e);
		}
		let node = state.node(element)?;
		if !node.element.displayed {
			return Err(Error::WebDriver {
				code: "element not interactable".to_string(),
				message: format!("{} is not visible", node.locator),
			});
		}
		if node.element.attributes.get("type").map(String::as_str) == Some("checkbox") {
			node.element.selected = !node.element.selected;
		}
		let locator = node.locator.clone();
		state.clicks.push(locator);
		Ok(())
	}

	async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()> {
		let mut state = self.state.lock();
		state.alive()?;
		if let Some(e) = state.take_failure(MockOp::SendKeys) {
			return Err(e);
		}
		let node = state.node(element)?;
		node.element
			.attributes
			.entry("value".to_string())
			.or_default()
			.push_str(text);
		Ok(())
	}

	async fn clear(&self, element: &ElementRef) -> Result<()> {
		let mut state = self.state.lock();
		state.alive()?;
		state.node(element)?.element.attributes.insert("value".to_string(), String::new());
		Ok(())
	}

	async fn text(&self, element: &ElementRef) -> Result<String> {
		let mut state = self.state.lock();
		state.alive()?;
		if let Some(e) = state.take_failure(MockOp::Text) {
			return Err(e);
		}
		Ok(state.node(element)?.element.text.clone())
	}

	async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
		let mut state = self.state.lock();
		state.alive()?;
		Ok(state.node(element)?.element.attributes.get(name).cloned())
	}

	async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
		let mut state = self.state.lock();
		state.alive()?;
		Ok(state.node(element)?.element.displayed)
	}

	async fn is_enabled(&self, element: &ElementRef) -> Result<bool> {
		let mut state = self.state.lock();
		state.alive()?;
		Ok(state.node(element)?.element.enabled)
	}

	async fn is_selected(&self, element: &ElementRef) -> Result<bool> {
		let mut state = self.state.lock();
		state.alive()?;
		Ok(state.node(element)?.element.selected)
	}

	async fn set_window_size(&self, width: u32, height: u32) -> Result<()> {
		let mut state = self.state.lock();
		state.alive()?;
		state.window = Some((width, height));
		Ok(())
	}

	async fn maximize(&self) -> Result<()> {
		let mut state = self.state.lock();
		state.alive()?;
		state.maximized = true;
		Ok(())
	}

	async fn execute_cdp(&self, command: &str, _params: Value) -> Result<Value> {
		if self.browser != BrowserKind::Chrome {
			return Err(Error::Unsupported(format!("{command}: not available for {}", self.browser)));
		}
		let mut state = self.state.lock();
		state.alive()?;
		if let Some(e) = state.take_failure(MockOp::Cdp) {
			return Err(e);
		}
		state.cdp.push(command.to_string());
		Ok(json!({}))
	}

	async fn quit(&self) -> Result<()> {
		let mut state = self.state.lock();
		state.quit_calls += 1;
		let failure = state.take_failure(MockOp::Quit);
		state.session_id = None;
		match failure {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}
}

enum LaunchMode {
	Returning(Arc<MockDriver>),
	Failing(ErrorFactory),
	NoDriver,
}

/// A [`Launcher`] that hands out a [`MockDriver`] instead of a browser.
pub struct MockLauncher {
	mode: LaunchMode,
	pub launches: AtomicUsize,
	plans: Mutex<Vec<LaunchPlan>>,
}

impl MockLauncher {
	fn with_mode(mode: LaunchMode) -> Self {
		Self {
			mode,
			launches: AtomicUsize::new(0),
			plans: Mutex::new(Vec::new()),
		}
	}

	/// Every launch revives and returns `driver`.
	pub fn returning(driver: Arc<MockDriver>) -> Self {
		Self::with_mode(LaunchMode::Returning(driver))
	}

	pub fn failing(make: impl Fn() -> Error + Send + Sync + 'static) -> Self {
		Self::with_mode(LaunchMode::Failing(Arc::new(make)))
	}

	/// Driver resolution fails, so nothing is ever launched.
	pub fn without_driver() -> Self {
		Self::with_mode(LaunchMode::NoDriver)
	}

	pub fn launch_count(&self) -> usize {
		self.launches.load(Ordering::SeqCst)
	}

	pub fn last_plan(&self) -> Option<LaunchPlan> {
		self.plans.lock().last().cloned()
	}
}

#[async_trait]
impl Launcher for MockLauncher {
	fn resolve(&self, browser: BrowserKind) -> Result<ResolvedDriver> {
		match self.mode {
			LaunchMode::NoDriver => Err(Error::DriverUnavailable {
				driver: browser.driver_name().to_string(),
				searched: vec!["mock launcher".to_string()],
			}),
			_ => Ok(ResolvedDriver {
				path: PathBuf::from("/mock/bin").join(browser.driver_name()),
				source: DriverSource::Path,
			}),
		}
	}

	async fn launch(&self, plan: &LaunchPlan) -> Result<Arc<dyn Driver>> {
		self.launches.fetch_add(1, Ordering::SeqCst);
		self.plans.lock().push(plan.clone());
		match &self.mode {
			LaunchMode::Returning(driver) => {
				driver.revive();
				Ok(driver.clone())
			}
			LaunchMode::Failing(make) => Err(make()),
			LaunchMode::NoDriver => Err(Error::LaunchFailed("no driver".to_string())),
		}
	}
}

/// An attachment recorded by [`RecordingReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAttachment {
	pub name: String,
	pub path: PathBuf,
	pub content_type: ContentType,
}

/// A [`ReportSink`] that remembers everything it was given.
#[derive(Default)]
pub struct RecordingReport {
	fail_attach: bool,
	started: Mutex<Vec<String>>,
	attachments: Mutex<Vec<RecordedAttachment>>,
	finished: Mutex<Vec<(String, Outcome, Option<String>)>>,
}

impl RecordingReport {
	pub fn new() -> Self {
		Self::default()
	}

	/// Every attach call fails.
	pub fn failing() -> Self {
		Self {
			fail_attach: true,
			..Self::default()
		}
	}

	pub fn started(&self) -> Vec<String> {
		self.started.lock().clone()
	}

	pub fn attachments(&self) -> Vec<RecordedAttachment> {
		self.attachments.lock().clone()
	}

	pub fn finished(&self) -> Vec<(String, Outcome, Option<String>)> {
		self.finished.lock().clone()
	}
}

impl ReportSink for RecordingReport {
	fn test_started(&self, name: &str) {
		self.started.lock().push(name.to_string());
	}

	fn attach(&self, source: &Path, name: &str, content_type: ContentType) -> Result<()> {
		if self.fail_attach {
			return Err(Error::Io(std::io::Error::other("report backend unavailable")));
		}
		self.attachments.lock().push(RecordedAttachment {
			name: name.to_string(),
			path: source.to_path_buf(),
			content_type,
		});
		Ok(())
	}

	fn test_finished(&self, name: &str, outcome: Outcome, message: Option<&str>) {
		self.finished
			.lock()
			.push((name.to_string(), outcome, message.map(str::to_string)));
	}
}
