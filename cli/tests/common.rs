//! # Sierra CLI Integration Test Common Helpers
//!
//! File: cli/tests/common.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Shared helpers for the integration test crates in `cli/tests/`. Each test
//! file declares `mod common;` and runs the compiled `sierra` binary through
//! `sierra_cmd()`.
//!

// Not every test file uses every helper.
#![allow(dead_code)]

pub use assert_cmd::Command;

/// # Get Sierra Command (`sierra_cmd`)
///
/// An `assert_cmd::Command` pointing at the `sierra` binary built for this
/// test run.
///
/// ## Panics
/// Panics if the `sierra` binary cannot be found via `Command::cargo_bin`.
pub fn sierra_cmd() -> Command {
    Command::cargo_bin("sierra").expect("Failed to find sierra binary for testing")
}

/// The built-in greeting, shown when an interactive chat opens.
pub const GREETING: &str = "Hello! Welcome to Sierra Springs Hotels. How can I help you today?";
