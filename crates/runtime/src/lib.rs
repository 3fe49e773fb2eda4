//! Driver plumbing for the UI test harness.
//!
//! This crate locates browser driver binaries (chromedriver, geckodriver),
//! runs them as child processes, and speaks the W3C WebDriver HTTP protocol
//! to them. It knows nothing about tests, workers or artifacts.

pub mod connection;
pub mod driver;
pub mod error;
pub mod service;

pub use connection::WebDriverClient;
pub use driver::{DriverResolver, DriverSource, ResolvedDriver, binary_is_usable};
pub use error::{Error, ErrorKind, Result};
pub use service::{DriverService, ServiceConfig, free_port};
