//! # Sierra Common Modules
//!
//! File: cli/src/common/mod.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Domain logic shared by the commands, kept free of CLI concerns:
//!
//! - `auth`: credentials, sessions and the session store
//! - `chat`: response rules and the chat widget session
//!
pub mod auth;
pub mod chat;
