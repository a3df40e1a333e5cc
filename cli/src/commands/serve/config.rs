//! # Sierra Site Server Configuration
//!
//! File: cli/src/commands/serve/config.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! This module handles configuration loading, merging, and validation for
//! the site server. It combines settings from:
//! 1. Command-line arguments and their environment fallbacks (highest priority)
//! 2. Local configuration file `.sierra.toml` in the site directory (if present)
//! 3. Default values (lowest priority)
//!
//! ## Examples
//!
//! Configuration file format:
//!
//! ```toml
//! port = 9000
//! host = "0.0.0.0"
//! directory = "public"
//! index_page = "/index.html"
//! login_page = "/login.html"
//! session_ttl_secs = 1800
//! username = "frontdesk"
//! password = "change-me"
//! strict_auth_status = true
//! ```
//!
//! The module ensures that the served directory resolves to an absolute path
//! that exists, and that the page paths are absolute `.html` paths.
//!
use super::middleware::is_hidden_name;
use crate::common::auth::credentials::{DEFAULT_PASSWORD, DEFAULT_USERNAME};
use crate::common::auth::Credentials;
use crate::core::error::{Result, SierraError};
use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::net::IpAddr;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// The expected name for the site configuration file.
const CONFIG_FILE_NAME: &str = ".sierra.toml";

/// One hour, the default session lifetime.
const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

/// Upper bound on the session lifetime (about ten years).
const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// # Serve Command Arguments (`ServeArgs`)
///
/// Command-line arguments accepted by `sierra serve`. Any of them can
/// override the matching setting in `.sierra.toml`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Directory containing the site's pages and assets.
    #[arg(default_value = ".")]
    pub directory: PathBuf,

    /// Port to listen on. If it is taken, the next free port is used.
    #[arg(long, short, default_value_t = 8080)]
    pub port: u16,

    /// Address to bind. Use `0.0.0.0` to accept connections from the network.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Username accepted by the login form.
    #[arg(long, env = "SIERRA_USERNAME", default_value = DEFAULT_USERNAME)]
    pub username: String,

    /// Password accepted by the login form.
    #[arg(long, env = "SIERRA_PASSWORD", default_value = DEFAULT_PASSWORD, hide_env_values = true)]
    pub password: String,

    /// Session lifetime in seconds, fixed from login.
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL_SECS)]
    pub session_ttl: u64,

    /// Answer failed logins with `401 Unauthorized` instead of `200 OK`.
    #[arg(long)]
    pub strict_auth_status: bool,
}

/// # Effective Server Configuration (`ServerConfig`)
///
/// The final settings after merging defaults, `.sierra.toml` and CLI
/// arguments. `directory` is absolute and canonical once
/// `load_and_merge_config` returns.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: IpAddr,
    pub directory: PathBuf,
    /// Page users land on after logging in.
    pub index_page: String,
    /// The one page reachable without a session.
    pub login_page: String,
    pub session_ttl_secs: u64,
    pub credentials: Credentials,
    pub strict_auth_status: bool,
}

/// Shape of `.sierra.toml`. Every field is optional.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    port: Option<u16>,
    host: Option<String>,
    directory: Option<String>,
    index_page: Option<String>,
    login_page: Option<String>,
    session_ttl_secs: Option<u64>,
    username: Option<String>,
    password: Option<String>,
    strict_auth_status: Option<bool>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            directory: PathBuf::from("."),
            index_page: "/index.html".to_string(),
            login_page: "/login.html".to_string(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            credentials: Credentials::default(),
            strict_auth_status: false,
        }
    }
}

/// # Load and Merge Server Configuration (`load_and_merge_config`)
///
/// Starts from the arguments, then for every setting the user left at its
/// default, takes the value from `.sierra.toml` in the target directory if
/// the file sets it. The served directory is finally resolved and validated.
///
/// ## Errors
///
/// Returns an error if:
/// - The current working directory cannot be determined.
/// - The configuration file exists but cannot be read or parsed.
/// - A page path is not an absolute `.html` path.
/// - The final directory does not exist or is not a directory.
pub async fn load_and_merge_config(args: ServeArgs) -> Result<ServerConfig> {
    let mut effective_config = ServerConfig::from_args(&args);
    let defaults = ServerConfig::default();

    let config_search_dir = if args.directory.is_absolute() {
        args.directory.clone()
    } else {
        env::current_dir()
            .context("Failed to get current working directory")?
            .join(&args.directory)
    };
    debug!("Looking for config file in: {}", config_search_dir.display());

    if let Some(file_config) = load_config_from_dir(&config_search_dir)? {
        let config_path = config_search_dir.join(CONFIG_FILE_NAME);
        info!("Loaded settings from {}", config_path.display());

        if args.port == defaults.port {
            if let Some(port) = file_config.port {
                effective_config.port = port;
            }
        }
        if args.host == defaults.host {
            if let Some(host_str) = &file_config.host {
                match host_str.parse() {
                    Ok(host) => effective_config.host = host,
                    Err(e) => warn!(
                        "Invalid host IP '{}' in config file ({}), using {}",
                        host_str, e, effective_config.host
                    ),
                }
            }
        }
        if args.session_ttl == defaults.session_ttl_secs {
            if let Some(ttl) = file_config.session_ttl_secs {
                effective_config.session_ttl_secs = ttl;
            }
        }
        if args.username == defaults.credentials.username {
            if let Some(username) = file_config.username {
                effective_config.credentials.username = username;
            }
        }
        if args.password == defaults.credentials.password {
            if let Some(password) = file_config.password {
                effective_config.credentials.password = password;
            }
        }
        if !args.strict_auth_status {
            if let Some(strict) = file_config.strict_auth_status {
                effective_config.strict_auth_status = strict;
            }
        }
        if let Some(index_page) = file_config.index_page {
            effective_config.index_page = index_page;
        }
        if let Some(login_page) = file_config.login_page {
            effective_config.login_page = login_page;
        }

        // A relative directory in the file is relative to the file itself.
        if let Some(dir) = file_config.directory {
            let dir = PathBuf::from(dir);
            effective_config.directory = if dir.is_relative() {
                config_search_dir.join(dir)
            } else {
                dir
            };
        }
    } else {
        debug!("No config file found. Using arguments.");
    }

    effective_config.validate_pages()?;
    effective_config.resolve_directory().await?;

    Ok(effective_config)
}

/// Reads `.sierra.toml` from `search_dir`. `Ok(None)` if there is no file.
fn load_config_from_dir(search_dir: &Path) -> Result<Option<FileConfig>> {
    let config_path = search_dir.join(CONFIG_FILE_NAME);
    if !config_path.is_file() {
        debug!("No config file found at {}", config_path.display());
        return Ok(None);
    }

    info!("Loading configuration from {}", config_path.display());
    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
    let file_config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

    Ok(Some(file_config))
}

impl ServerConfig {
    fn from_args(args: &ServeArgs) -> Self {
        Self {
            port: args.port,
            host: args.host,
            directory: args.directory.clone(),
            credentials: Credentials::new(args.username.clone(), args.password.clone()),
            session_ttl_secs: args.session_ttl,
            strict_auth_status: args.strict_auth_status,
            ..Self::default()
        }
    }

    /// Session lifetime as a `chrono::Duration`, for the session store and cookie.
    pub fn session_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs.min(MAX_SESSION_TTL_SECS) as i64)
    }

    /// Page paths must be absolute and name an `.html` page so the gate
    /// recognises them. The session lifetime must be positive and bounded.
    fn validate_pages(&self) -> Result<()> {
        for (name, page) in [("index_page", &self.index_page), ("login_page", &self.login_page)] {
            if !page.starts_with('/') || !page.to_ascii_lowercase().ends_with(".html") {
                return Err(SierraError::Config(format!(
                    "{} must be an absolute .html path, got '{}'",
                    name, page
                ))
                .into());
            }
            if page.split('/').any(is_hidden_name) {
                return Err(SierraError::Config(format!(
                    "{} must not be inside a hidden path, got '{}'",
                    name, page
                ))
                .into());
            }
        }
        if self.index_page == self.login_page {
            return Err(SierraError::Config(
                "index_page and login_page must differ".to_string(),
            )
            .into());
        }
        if self.session_ttl_secs == 0 || self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(SierraError::Config(format!(
                "session_ttl_secs must be between 1 and {}, got {}",
                MAX_SESSION_TTL_SECS, self.session_ttl_secs
            ))
            .into());
        }
        Ok(())
    }

    /// # Resolve and Validate Directory Path (`resolve_directory`)
    ///
    /// Makes `directory` absolute and canonical, and checks it is a directory.
    async fn resolve_directory(&mut self) -> Result<()> {
        let absolute_path = if self.directory.is_absolute() {
            self.directory.clone()
        } else {
            env::current_dir()
                .context("Failed to get current working directory")?
                .join(&self.directory)
        };

        let canonical_path = tokio::fs::canonicalize(&absolute_path)
            .await
            .map_err(|e| {
                SierraError::FileSystem(format!(
                    "Directory '{}' could not be found or accessed: {}",
                    absolute_path.display(),
                    e
                ))
            })?;

        let metadata = tokio::fs::metadata(&canonical_path).await.map_err(|e| {
            SierraError::FileSystem(format!(
                "Failed to get metadata for path '{}': {}",
                canonical_path.display(),
                e
            ))
        })?;
        if !metadata.is_dir() {
            return Err(SierraError::FileSystem(format!(
                "Path is not a directory: {}",
                canonical_path.display()
            ))
            .into());
        }

        self.directory = canonical_path;
        debug!("Resolved site directory to: {}", self.directory.display());
        Ok(())
    }
}
