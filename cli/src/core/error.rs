//! # Sierra Error Types
//!
//! File: cli/src/core/error.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! This module defines the error types used throughout the Sierra application.
//! There are two families:
//!
//! - `SierraError`: application errors raised while starting up (bad
//!   configuration, unreadable site directory, invalid chat rule table).
//!   These propagate through `Result<T>` (an `anyhow::Result`) up to `main`.
//! - `AccessError`: per-request outcomes of the auth middleware chain. These
//!   never crash anything; each one renders directly into an HTTP response.
//!
//! ## Examples
//!
//! ```rust
//! // Application error with context
//! let content = fs::read_to_string(&path)
//!     .with_context(|| format!("Failed to read rules file: {}", path.display()))?;
//!
//! // Request outcome inside a handler
//! return Err(AccessError::NotFound);
//! ```
//!
use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

/// Custom error type for the Sierra application.
#[derive(Error, Debug)]
pub enum SierraError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Filesystem error: {0}")]
    FileSystem(String),

    #[error("Invalid chat rules: {0}")]
    Rules(String),
}

/// Type alias for Result using anyhow::Error for broad compatibility.
pub type Result<T> = anyhow::Result<T>;

/// # Access Outcomes (`AccessError`)
///
/// The three ways a request can be turned away by the middleware chain.
/// None of them is surfaced as a hard failure:
///
/// * `AuthFailure`: bad credentials on `POST /login`. Rendered inline with a
///   retry link. The status is `200 OK` unless strict status reporting is
///   enabled, in which case it is `401 Unauthorized`.
/// * `Unauthorized`: no valid session for a protected page. Recovered by a
///   `302 Found` redirect to the login page.
/// * `NotFound`: no route and no static file matched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Invalid credentials")]
    AuthFailure { status: StatusCode, login_page: String },

    #[error("Authentication required")]
    Unauthorized { login_page: String },

    #[error("Not found")]
    NotFound,
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        match self {
            AccessError::AuthFailure { status, login_page } => (
                status,
                Html(format!(
                    "<h3>Invalid credentials. <a href=\"{}\">Try again</a></h3>",
                    login_page
                )),
            )
                .into_response(),
            AccessError::Unauthorized { login_page } => found(&login_page),
            AccessError::NotFound => {
                (StatusCode::NOT_FOUND, Html("<h1>404 Not Found</h1>")).into_response()
            }
        }
    }
}

/// Builds a `302 Found` redirect to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
