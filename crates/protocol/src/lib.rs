//! Wire types for the W3C WebDriver protocol.
//!
//! This crate contains the serde-serializable shapes exchanged with a
//! browser driver (chromedriver, geckodriver) over HTTP, plus the on-disk
//! format of Allure result files.
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization and small conversions
//! - **1:1 with the wire**: Field names match the W3C WebDriver specification
//!
//! The session, element and capture logic is built on top of these types in `uitest`.

pub mod allure;
pub mod capabilities;
pub mod types;
pub mod webdriver;

pub use allure::*;
pub use capabilities::*;
pub use types::*;
pub use webdriver::*;
