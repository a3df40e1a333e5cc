//! # Sierra Authentication Primitives
//!
//! File: cli/src/common/auth/mod.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Building blocks used by the `serve` command's middleware chain:
//! - `credentials`: the fixed demo login pair
//! - `session`: session records, the `SessionStore` trait and its in-memory
//!   implementation, plus the session cookie helpers
//!
pub mod credentials;
pub mod session;

pub use credentials::Credentials;
pub use session::{MemorySessionStore, Session, SessionId, SessionStore};
