//! Operator commands for the uitest harness.

pub mod cli;
pub mod commands;
