//! # Sierra Command Modules
//!
//! File: cli/src/commands/mod.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! The top-level commands of the `sierra` binary. Each module defines its own
//! argument struct and handler, which `main.rs` routes to.
//!
//! - `chat`: the hotel chat assistant in the terminal
//! - `serve`: the login-gated site server
//!

/// Canned-response chat assistant (`sierra chat`).
pub mod chat;
/// Site server with session-based login (`sierra serve`).
pub mod serve;
