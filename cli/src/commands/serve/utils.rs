//! # Sierra Site Server Utilities
//!
//! File: cli/src/commands/serve/utils.rs
//! Author: Christi Mahu
//!
//! Startup diagnostics for the site server: which pages exist in the site
//! directory and which of them the gate protects.
//!
use super::middleware::is_hidden_name;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

/// # Collect Site Pages (`site_pages`)
///
/// Walks `root` and returns every `.html` file as a URL path (`/rooms/suite.html`),
/// sorted. Hidden entries (leading `.`) are skipped.
pub fn site_pages(root: &Path) -> Vec<String> {
    let mut pages: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !is_hidden_name(&entry.file_name().to_string_lossy())
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable site entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("html"))
        })
        .filter_map(|entry| {
            entry.path().strip_prefix(root).ok().map(|relative| {
                let segments: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                format!("/{}", segments.join("/"))
            })
        })
        .collect();
    pages.sort();
    pages
}

/// # Log Site Pages (`log_site_pages`)
///
/// Logs each page under `root` and whether it needs a session, and warns if
/// the configured index or login page is missing.
pub fn log_site_pages(root: &Path, index_page: &str, login_page: &str) {
    let pages = site_pages(root);
    info!("Site pages under {}:", root.display());
    if pages.is_empty() {
        info!("  (No .html pages found)");
    }
    for page in &pages {
        let access = if page == login_page { "public" } else { "login required" };
        info!("  - {} ({})", page, access);
    }

    for (name, page) in [("Index", index_page), ("Login", login_page)] {
        if !pages.iter().any(|p| p == page) {
            warn!("{} page {} does not exist in {}", name, page, root.display());
        }
    }
}
