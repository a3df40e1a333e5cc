//! # Sierra Site Server
//!
//! File: cli/src/commands/serve/mod.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Serves the hotel site from a directory with every page behind a login:
//! - Anonymous visitors only ever see the login page (plus non-page assets)
//! - `POST /login` checks one configured credential pair and starts a session
//! - `GET /logout` ends it
//! - `GET /session-info` tells page scripts who is logged in
//!
//! ## Architecture
//!
//! - `config.rs`: Arguments, `.sierra.toml`, validation
//! - `middleware.rs`: Session resolution, request logging, the auth gate
//! - `routes.rs`: The explicit login/logout/session routes
//! - `server_logic.rs`: Router assembly and the server loop
//! - `utils.rs`: Startup page listing
//!
//! ## Examples
//!
//! ```bash
//! # Serve ./site on the default port with the default credentials
//! sierra serve ./site
//!
//! # Custom credentials from the environment, shorter sessions
//! SIERRA_USERNAME=frontdesk SIERRA_PASSWORD=change-me sierra serve --session-ttl 900 ./site
//! ```
//!
use crate::core::error::Result;
use tracing::info;

pub use config::ServeArgs;

/// Configuration loading and merging for the site server.
pub mod config;

/// Session resolution, request logging and the auth gate.
pub mod middleware;

/// Handlers for `/`, `/login`, `/logout` and `/session-info`.
pub mod routes;

/// Router assembly and the Axum server loop.
pub mod server_logic;

/// Startup diagnostics.
pub mod utils;

/// # Handle Serve Command (`handle_serve`)
///
/// Entry point for `sierra serve`: resolves the effective configuration and
/// runs the server until shutdown.
///
/// ## Errors
///
/// Propagates configuration errors (bad directory, bad page paths, unreadable
/// `.sierra.toml`) and server startup failures.
pub async fn handle_serve(args: ServeArgs) -> Result<()> {
    info!("Handling serve command for {}", args.directory.display());

    let config = config::load_and_merge_config(args).await?;
    info!("Effective server config: {:?}", config);

    server_logic::run_server(config).await?;
    Ok(())
}
