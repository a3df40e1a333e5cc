//! # Sierra HTTP Server Implementation
//!
//! File: cli/src/commands/serve/server_logic.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! This module assembles and runs the site server for `sierra serve`:
//! - Port availability checking with automatic fallback
//! - The auth middleware chain in front of the site directory
//! - Graceful shutdown on Ctrl+C / SIGTERM
//!
//! ## Architecture
//!
//! Requests pass through these layers, outermost first:
//! 1. `TraceLayer`: request/response spans
//! 2. Logging step: identity + path, session resolved once
//! 3. Gate step: redirects for protected pages and the login page
//! 4. Router: `/`, `/login`, `/logout`, `/session-info`
//! 5. `ServeDir` over the site directory
//! 6. Not-found page
//!
//! ```rust
//! let config = config::load_and_merge_config(args).await?;
//! server_logic::run_server(config).await?;
//! ```
//!
use super::config::ServerConfig;
use super::middleware::{gate, log_request, SiteState};
use super::routes;
use super::utils;
use crate::common::auth::MemorySessionStore;
use crate::core::error::Result;
use anyhow::Context;
use axum::{
    handler::HandlerWithoutStateExt,
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Level};

/// # Run HTTP Server (`run_server`)
///
/// Initializes and starts the site server according to the provided configuration.
///
/// ## Process:
/// 1. Finds an available address, retrying on the following ports if the
///    configured one is occupied.
/// 2. Logs the site's pages and which of them are protected.
/// 3. Builds the application with an in-memory session store.
/// 4. Prints the server details and serves until a shutdown signal arrives.
///
/// ## Errors
///
/// - No available port within the allowed attempts.
/// - The listener cannot be bound.
/// - The server fails while running.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let max_port_attempts = 10;
    let addr = find_available_port(config.host, config.port, max_port_attempts).await?;

    utils::log_site_pages(&config.directory, &config.index_page, &config.login_page);

    println!("\n=================================================================");
    println!("🏨 Serving site from:  {}", config.directory.display());
    println!("🌐 Local URL:          http://localhost:{}/", addr.port());
    println!("⚙️  Binding to address: {}", addr);
    println!("🔑 Login page:         {}", config.login_page);
    println!("🏠 Index page:         {}", config.index_page);
    println!("⏳ Session lifetime:   {}s", config.session_ttl_secs);
    println!("=================================================================\n");

    let state = SiteState::new(config, Arc::new(MemorySessionStore::new()));
    let app = create_app(state);

    info!("Starting server on {}", addr);
    println!("Server starting! Press Ctrl+C to stop.");

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener to address {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    println!("\nServer shutdown complete.");
    Ok(())
}

/// # Handle Shutdown Signal (`shutdown_signal`)
///
/// Resolves when Ctrl+C or (on Unix) SIGTERM is received, letting in-flight
/// requests finish before the server exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown..."),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
            Err(e) => {
                error!(
                    "Failed to install SIGTERM handler: {}. Shutdown on SIGTERM might not work.",
                    e
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// # Find Available Port (`find_available_port`)
///
/// Tries `start_port` and then each following port, up to `max_attempts`
/// ports in total, returning the first address that can be bound.
async fn find_available_port(
    req_host: std::net::IpAddr,
    start_port: u16,
    max_attempts: u8,
) -> Result<SocketAddr> {
    let mut current_port = start_port;

    for attempt in 0..max_attempts {
        let addr = SocketAddr::new(req_host, current_port);

        match TcpListener::bind(addr).await {
            Ok(listener) => {
                drop(listener);
                if attempt > 0 {
                    info!(
                        "Port {} was unavailable, successfully bound to available port {}.",
                        start_port, current_port
                    );
                }
                return Ok(addr);
            }
            Err(e) => {
                warn!(
                    "Attempt {}: Port {} on host {} is unavailable (Error: {}). Trying next port...",
                    attempt + 1,
                    current_port,
                    req_host,
                    e
                );
                current_port = match current_port.checked_add(1) {
                    Some(next) => next,
                    None => break,
                };
            }
        }
    }

    anyhow::bail!(
        "Could not find an available port on host {} starting from port {} after trying {} ports.",
        req_host,
        start_port,
        max_attempts
    )
}

/// # Create Axum Application (`create_app`)
///
/// Wires the middleware chain, the explicit routes and the site directory.
/// Directory requests never fall back to an implicit `index.html`, and any
/// method the file service does not handle ends on the not-found page.
pub fn create_app(state: SiteState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::default().include_headers(false))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let site_files = ServeDir::new(&state.config.directory)
        .append_index_html_on_directories(false)
        .call_fallback_on_method_not_allowed(true)
        .not_found_service(routes::not_found.into_service());

    Router::new()
        .route("/", get(routes::root).fallback(routes::not_found))
        .route("/login", post(routes::login).fallback(routes::not_found))
        .route("/logout", get(routes::logout).fallback(routes::not_found))
        .route(
            "/session-info",
            get(routes::session_info).fallback(routes::not_found),
        )
        .fallback_service(site_files)
        .layer(
            ServiceBuilder::new()
                .layer(trace_layer)
                .layer(middleware::from_fn_with_state(state.clone(), log_request))
                .layer(middleware::from_fn_with_state(state.clone(), gate)),
        )
        .with_state(state)
}

// --- Unit Tests ---

/// # Unit Tests for Server Logic
///
/// Port finding plus end-to-end checks of the middleware chain, driving the
/// router directly with `oneshot`.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::auth::session::{
        Session, SessionId, SessionStore, SESSION_COOKIE,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use chrono::{Duration, Utc};
    use std::net::Ipv4Addr;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Site {
        _dir: TempDir,
        store: Arc<MemorySessionStore>,
        app: Router,
    }

    fn site_with(strict_auth_status: bool) -> Site {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Welcome</h1>").unwrap();
        std::fs::write(dir.path().join("login.html"), "<form>login</form>").unwrap();
        std::fs::write(dir.path().join("rooms.html"), "<h1>Rooms</h1>").unwrap();
        std::fs::write(dir.path().join("style.css"), "body { color: navy; }").unwrap();
        std::fs::create_dir(dir.path().join("gallery")).unwrap();
        std::fs::write(dir.path().join("gallery").join("index.html"), "gallery").unwrap();
        std::fs::write(
            dir.path().join(".sierra.toml"),
            "username = \"frontdesk\"\npassword = \"s3cret\"\n",
        )
        .unwrap();

        let config = ServerConfig {
            directory: dir.path().to_path_buf(),
            strict_auth_status,
            ..ServerConfig::default()
        };
        let store = Arc::new(MemorySessionStore::new());
        let app = create_app(SiteState::new(config, store.clone()));
        Site {
            _dir: dir,
            store,
            app,
        }
    }

    fn site() -> Site {
        site_with(false)
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    fn get_page(path: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn login_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Logs in with the default pair and returns the `name=value` cookie pair.
    async fn log_in(app: &Router) -> String {
        let response = send(app, login_request("username=admin&password=password123")).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_find_available_port_start_is_free() -> Result<()> {
        let host = Ipv4Addr::LOCALHOST.into();
        let start_port = 50000;
        let addr = find_available_port(host, start_port, 5).await?;
        assert_eq!(addr.port(), start_port);
        assert_eq!(addr.ip(), host);
        Ok(())
    }

    #[tokio::test]
    async fn test_find_available_port_start_occupied() -> Result<()> {
        let host = Ipv4Addr::LOCALHOST.into();
        let start_port = 51000;
        let _listener = TcpListener::bind(SocketAddr::new(host, start_port)).await?;

        let addr = find_available_port(host, start_port, 5).await?;
        assert!(addr.port() > start_port);
        assert!(addr.port() < start_port + 5);
        Ok(())
    }

    #[tokio::test]
    async fn root_redirects_to_login() {
        let site = site();
        let response = send(&site.app, get_page("/", None)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login.html");
    }

    #[tokio::test]
    async fn anonymous_page_request_redirects_without_content() {
        let site = site();
        for path in ["/index.html", "/rooms.html", "/index%2Ehtml", "/index.html/"] {
            let response = send(&site.app, get_page(path, None)).await;
            assert_eq!(response.status(), StatusCode::FOUND, "{path}");
            assert_eq!(location(&response), "/login.html");
            assert!(!body_text(response).await.contains("Welcome"));
        }
    }

    #[tokio::test]
    async fn anonymous_can_reach_login_page_and_assets() {
        let site = site();
        let response = send(&site.app, get_page("/login.html", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("login"));

        let response = send(&site.app, get_page("/style.css", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn directory_requests_do_not_serve_index() {
        let site = site();
        let response = send(&site.app, get_page("/gallery/", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn login_then_pages_are_served() {
        let site = site();
        let cookie = log_in(&site.app).await;
        assert!(cookie.starts_with(SESSION_COOKIE));
        assert_eq!(site.store.len(), 1);

        let response = send(&site.app, get_page("/index.html", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Welcome"));
    }

    #[tokio::test]
    async fn login_sets_cookie_and_redirects_to_index() {
        let site = site();
        let response = send(
            &site.app,
            login_request("username=admin&password=password123"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/index.html");
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.contains("Max-Age=3600"));
        assert!(set_cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn login_accepts_json_body() {
        let site = site();
        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"username":"admin","password":"password123"}"#))
            .unwrap();
        let response = send(&site.app, request).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/index.html");
    }

    #[tokio::test]
    async fn bad_credentials_render_inline_with_ok_status() {
        let site = site();
        let response = send(&site.app, login_request("username=admin&password=nope")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body = body_text(response).await;
        assert!(body.contains("Invalid credentials"));
        assert!(body.contains("href=\"/login.html\""));
        assert_eq!(site.store.len(), 0);
    }

    #[tokio::test]
    async fn bad_credentials_with_strict_status_are_401() {
        let site = site_with(true);
        let response = send(&site.app, login_request("username=admin")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authenticated_login_page_redirects_to_index() {
        let site = site();
        let cookie = log_in(&site.app).await;
        let response = send(&site.app, get_page("/login.html", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/index.html");
    }

    #[tokio::test]
    async fn second_login_keeps_identity() {
        let site = site();
        let cookie = log_in(&site.app).await;

        let mut request = login_request("username=admin&password=password123");
        request
            .headers_mut()
            .insert(header::COOKIE, cookie.parse().unwrap());
        let response = send(&site.app, request).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(site.store.len(), 1);
    }

    #[tokio::test]
    async fn logout_invalidates_session() {
        let site = site();
        let cookie = log_in(&site.app).await;

        let response = send(&site.app, get_page("/logout", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login.html");
        assert!(response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));
        assert_eq!(site.store.len(), 0);

        // The old cookie no longer opens anything.
        let response = send(&site.app, get_page("/index.html", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login.html");
    }

    #[tokio::test]
    async fn expired_session_is_treated_as_anonymous() {
        let site = site();
        let id = SessionId::generate();
        site.store.insert(
            id,
            Session::authenticated("admin", Utc::now() - Duration::hours(2), Duration::hours(1)),
        );
        let cookie = format!("{}={}", SESSION_COOKIE, id);

        let response = send(&site.app, get_page("/index.html", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login.html");
        assert_eq!(site.store.len(), 0);
    }

    #[tokio::test]
    async fn session_info_reports_username() {
        let site = site();
        let response = send(&site.app, get_page("/session-info", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let anonymous: serde_json::Value =
            serde_json::from_str(&body_text(response).await).unwrap();
        assert!(anonymous["username"].is_null());

        let cookie = log_in(&site.app).await;
        let response = send(&site.app, get_page("/session-info", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let info: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(info["username"], "admin");
    }

    #[tokio::test]
    async fn site_config_file_is_never_served() {
        let site = site();
        let cookie = log_in(&site.app).await;
        for path in ["/.sierra.toml", "/%2Esierra.toml", "/gallery/../.sierra.toml"] {
            for cookie in [None, Some(cookie.as_str())] {
                let response = send(&site.app, get_page(path, cookie)).await;
                assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
                assert!(!body_text(response).await.contains("s3cret"), "{path}");
            }
        }
    }

    #[tokio::test]
    async fn unmatched_requests_are_not_found() {
        let site = site();
        let response = send(&site.app, get_page("/missing.png", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("404 Not Found"));

        let request = Request::builder()
            .method("DELETE")
            .uri("/style.css")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&site.app, request).await.status(), StatusCode::NOT_FOUND);

        let request = Request::builder()
            .method("POST")
            .uri("/logout")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&site.app, request).await.status(), StatusCode::NOT_FOUND);
    }
}
