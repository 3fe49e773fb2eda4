//! uitest: the core of a browser UI test harness.
//!
//! The harness gives every parallel worker its own directories and debug
//! port, provisions a Chrome or Firefox session per worker (or per test),
//! records failure screenshots and optional frame-capture videos, and
//! attaches them to an Allure results directory.
//!
//! ```ignore
//! use uitest::{Harness, HarnessConfig, TestCase};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut harness = Harness::start(HarnessConfig::from_env()?).await?;
//!     let report = harness
//!         .run(TestCase::new("heading_is_visible").ui(), |fx| async move {
//!             let main = fx.pages()?.main_page();
//!             anyhow::ensure!(main.heading().await? == "Welcome to the-internet");
//!             Ok(())
//!         })
//!         .await;
//!     println!("{}: {}", report.name, report.outcome);
//!     println!("{}", harness.finish().await);
//!     Ok(())
//! }
//! ```
//!
//! Everything that talks to a browser goes through the [`Driver`] trait, so
//! [`testing`] can stand in for a real browser in tests.

pub mod config;
pub mod context;
pub mod directories;
pub mod driver;
pub mod encoder;
pub mod harness;
pub mod hooks;
pub mod layout;
pub mod lock;
pub mod logging;
pub mod pages;
pub mod provision;
pub mod recorder;
pub mod report;
pub mod testing;
pub mod wait;
pub mod webdriver;
pub mod worker;

pub use config::{DriverScope, HarnessConfig, WindowSize};
pub use context::TestContext;
pub use directories::UserDataPolicy;
pub use driver::Driver;
pub use harness::{Harness, SessionSummary, Skip, TestCase, TestFixtures, TestMarkers, TestReport};
pub use hooks::{CaptureResult, HookCoordinator, HookPolicy, Outcome, Phase, PhaseReport};
pub use layout::{ResourceLayout, ResourcePurpose};
pub use lock::FileLock;
pub use pages::PageManager;
pub use provision::{BrowserSession, Launcher, Provisioner, WebDriverLauncher};
pub use recorder::{CaptureJob, RecordingOutcome, VideoRecorder};
pub use report::{AllureReporter, ReportSink};
pub use uitest_protocol as protocol;
pub use uitest_protocol::{BrowserKind, Locator};
pub use uitest_runtime::{Error, ErrorKind, Result};
pub use worker::WorkerId;
