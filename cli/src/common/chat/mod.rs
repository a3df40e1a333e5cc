//! # Sierra Chat Assistant
//!
//! File: cli/src/common/chat/mod.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! The canned-response chat assistant:
//! - `rules`: the ordered keyword table and the `ResponseMatcher` that walks it
//! - `session`: the open/closed widget state machine with delayed bot replies
//!
pub mod rules;
pub mod session;

pub use rules::ResponseMatcher;
pub use session::{ChatMessage, ChatSession, Sender, DEFAULT_REPLY_DELAY};
