//! # Sierra Core Infrastructure
//!
//! File: cli/src/core/mod.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Cross-cutting infrastructure used by every command. Currently this is the
//! error module: the application error enum, the crate-wide `Result` alias,
//! and the HTTP access outcomes of the site server.
//!
pub mod error;
