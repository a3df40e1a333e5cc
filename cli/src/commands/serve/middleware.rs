//! # Sierra Request Middleware
//!
//! File: cli/src/commands/serve/middleware.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! The two request-wide steps of the auth middleware chain:
//!
//! 1. **Logging step** (`log_request`): resolves the caller's session once,
//!    logs who accessed which path, and stashes the resolved `CurrentSession`
//!    in the request extensions for everything downstream. It never fails.
//! 2. **Gate step** (`gate`): keeps anonymous callers off every page except the
//!    login page, and keeps logged-in callers off the login page.
//!
//! The route handlers and the static file service sit behind both steps.
//! Hidden paths (any segment starting with `.`, such as `/.sierra.toml`) are
//! answered with the not-found page for everyone, so the site's own
//! configuration is never served.
//!
//! ## Path Handling
//!
//! The gate decides on the percent-decoded, normalized path, because that is
//! the path the file service will actually open. `/index%2Ehtml`,
//! `/INDEX.HTML` and `/index.html/` are all treated as the page they name.
//!
use super::config::ServerConfig;
use crate::common::auth::session::session_id_from_cookies;
use crate::common::auth::{Session, SessionId, SessionStore};
use crate::core::error::{found, AccessError};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info};

/// # Shared Site State (`SiteState`)
///
/// Injected into every handler and middleware step. The session store is a
/// trait object so tests (or a future persistent store) can swap it.
#[derive(Clone)]
pub struct SiteState {
    pub config: Arc<ServerConfig>,
    pub sessions: Arc<dyn SessionStore>,
}

impl SiteState {
    pub fn new(config: ServerConfig, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
        }
    }
}

/// The caller's session as resolved for this request.
///
/// `id` is whatever valid session id the cookie carried; `session` is only
/// present if that id names a live (unexpired) session.
#[derive(Debug, Clone, Default)]
pub struct CurrentSession {
    pub id: Option<SessionId>,
    pub session: Option<Session>,
}

impl CurrentSession {
    /// Looks up the session named by the request's cookies.
    pub fn resolve(headers: &HeaderMap, sessions: &dyn SessionStore) -> Self {
        let id = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(session_id_from_cookies);
        let session = id.as_ref().and_then(|id| sessions.get(id));
        Self { id, session }
    }

    pub fn username(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.username.as_deref())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_authenticated)
    }
}

impl FromRequestParts<SiteState> for CurrentSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SiteState,
    ) -> Result<Self, Self::Rejection> {
        // Reuse the logging step's lookup when it ran; resolve directly otherwise.
        if let Some(current) = parts.extensions.get::<CurrentSession>() {
            return Ok(current.clone());
        }
        Ok(Self::resolve(&parts.headers, state.sessions.as_ref()))
    }
}

/// # Logging Step (`log_request`)
///
/// Records the caller's identity (username or `guest`) and the requested
/// path, then hands the request on. The event timestamp comes from the
/// subscriber.
pub async fn log_request(
    State(state): State<SiteState>,
    mut request: Request,
    next: Next,
) -> Response {
    let current = CurrentSession::resolve(request.headers(), state.sessions.as_ref());
    let identity = current.username().unwrap_or("guest").to_string();

    info!(
        user = %identity,
        method = %request.method(),
        path = %request.uri().path(),
        "{} accessed {}",
        identity,
        request.uri()
    );

    request.extensions_mut().insert(current);
    next.run(request).await
}

/// What the gate does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Not a gated page, or the caller may see it.
    Pass,
    /// Anonymous caller asked for a protected page.
    RequireLogin,
    /// Logged-in caller asked for the login page.
    AlreadyLoggedIn,
    /// A dot-prefixed path; never served.
    Hidden,
}

/// Dot-prefixed names (`.sierra.toml`, `.git`) are not part of the site.
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Percent-decodes `path` and drops empty and `.` segments, giving the path
/// the file service resolves (`/a//b/./c.html/` becomes `/a/b/c.html`).
pub fn normalize_path(path: &str) -> String {
    let decoded = urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string());
    let segments: Vec<&str> = decoded
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    format!("/{}", segments.join("/"))
}

/// # Gate Decision (`gate_decision`)
///
/// Pure decision behind the gate step. Hidden paths are refused before the
/// session is considered. A "page" is any path whose normalized form ends in
/// `.html` (case-insensitive).
pub fn gate_decision(path: &str, authenticated: bool, login_page: &str) -> GateDecision {
    let normalized = normalize_path(path);
    if normalized.split('/').any(is_hidden_name) {
        return GateDecision::Hidden;
    }
    let is_page = normalized.to_ascii_lowercase().ends_with(".html");
    let is_login_page = normalized == login_page;

    if is_page && !is_login_page && !authenticated {
        GateDecision::RequireLogin
    } else if is_login_page && authenticated {
        GateDecision::AlreadyLoggedIn
    } else {
        GateDecision::Pass
    }
}

/// # Gate Step (`gate`)
///
/// Redirects before any protected content is produced; the inner service is
/// not called at all for a turned-away request.
pub async fn gate(
    State(state): State<SiteState>,
    current: CurrentSession,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    match gate_decision(&path, current.is_authenticated(), &state.config.login_page) {
        GateDecision::Pass => next.run(request).await,
        GateDecision::RequireLogin => {
            debug!("Gate: anonymous request for {} sent to login", path);
            AccessError::Unauthorized {
                login_page: state.config.login_page.clone(),
            }
            .into_response()
        }
        GateDecision::Hidden => {
            debug!("Gate: refused hidden path {}", path);
            AccessError::NotFound.into_response()
        }
        GateDecision::AlreadyLoggedIn => {
            debug!("Gate: logged-in request for {} sent to index", path);
            found(&state.config.index_page)
        }
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::auth::session::{MemorySessionStore, SESSION_COOKIE};
    use axum::body::{to_bytes, Body};
    use axum::http::HeaderValue;
    use axum::routing::get;
    use axum::Router;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use tower::ServiceExt;

    const LOGIN: &str = "/login.html";

    #[test]
    fn anonymous_pages_require_login() {
        assert_eq!(gate_decision("/index.html", false, LOGIN), GateDecision::RequireLogin);
        assert_eq!(gate_decision("/rooms/suite.html", false, LOGIN), GateDecision::RequireLogin);
        assert_eq!(gate_decision(LOGIN, false, LOGIN), GateDecision::Pass);
    }

    #[test]
    fn assets_and_routes_pass() {
        assert_eq!(gate_decision("/style.css", false, LOGIN), GateDecision::Pass);
        assert_eq!(gate_decision("/login", false, LOGIN), GateDecision::Pass);
        assert_eq!(gate_decision("/", false, LOGIN), GateDecision::Pass);
    }

    #[test]
    fn logged_in_callers_skip_login_page() {
        assert_eq!(gate_decision(LOGIN, true, LOGIN), GateDecision::AlreadyLoggedIn);
        assert_eq!(gate_decision("/index.html", true, LOGIN), GateDecision::Pass);
    }

    #[test]
    fn alternate_spellings_are_still_gated() {
        for path in ["/index%2Ehtml", "/INDEX.HTML", "/index.html/", "//index.html", "/./index.html"] {
            assert_eq!(
                gate_decision(path, false, LOGIN),
                GateDecision::RequireLogin,
                "path {path} slipped past the gate"
            );
        }
        assert_eq!(gate_decision("/login%2Ehtml", true, LOGIN), GateDecision::AlreadyLoggedIn);
    }

    #[test]
    fn hidden_paths_are_refused_for_everyone() {
        for path in [
            "/.sierra.toml",
            "/%2Esierra.toml",
            "/%2esierra.toml",
            "/.git/config",
            "/assets/.env",
            "/../secret.html",
        ] {
            assert_eq!(gate_decision(path, false, LOGIN), GateDecision::Hidden, "{path}");
            assert_eq!(gate_decision(path, true, LOGIN), GateDecision::Hidden, "{path}");
        }
        assert_eq!(gate_decision("/./style.css", false, LOGIN), GateDecision::Pass);
    }

    #[test]
    fn normalize_path_examples() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/a//b/./c.html/"), "/a/b/c.html");
        assert_eq!(normalize_path("/caf%C3%A9.html"), "/café.html");
    }

    #[test]
    fn resolve_reads_cookie_and_skips_expired() {
        let store = MemorySessionStore::new();
        let live = SessionId::generate();
        let stale = SessionId::generate();
        store.insert(live, Session::authenticated("admin", Utc::now(), Duration::hours(1)));
        store.insert(
            stale,
            Session::authenticated("admin", Utc::now() - Duration::hours(2), Duration::hours(1)),
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{}={}", SESSION_COOKIE, live)).unwrap(),
        );
        let current = CurrentSession::resolve(&headers, &store);
        assert!(current.is_authenticated());
        assert_eq!(current.username(), Some("admin"));

        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{}={}", SESSION_COOKIE, stale)).unwrap(),
        );
        let current = CurrentSession::resolve(&headers, &store);
        assert_eq!(current.id, Some(stale));
        assert!(!current.is_authenticated());

        let current = CurrentSession::resolve(&HeaderMap::new(), &store);
        assert!(current.id.is_none());
        assert_eq!(current.username(), None);
    }

    /// Reports what the logging step left in the request extensions.
    async fn resolved_identity(request: Request) -> String {
        match request.extensions().get::<CurrentSession>() {
            Some(current) => current.username().unwrap_or("guest").to_string(),
            None => "unresolved".to_string(),
        }
    }

    async fn identity_seen(app: &Router, cookie: Option<String>) -> String {
        let mut builder = axum::http::Request::builder().uri("/whoami");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let response = app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn logging_step_resolves_session_for_downstream() {
        let store = Arc::new(MemorySessionStore::new());
        let state = SiteState::new(ServerConfig::default(), store.clone());
        let app = Router::new()
            .route("/whoami", get(resolved_identity))
            .layer(axum::middleware::from_fn_with_state(state.clone(), log_request))
            .with_state(state);

        assert_eq!(identity_seen(&app, None).await, "guest");

        let id = SessionId::generate();
        store.insert(id, Session::authenticated("admin", Utc::now(), Duration::hours(1)));
        let cookie = format!("{}={}", SESSION_COOKIE, id);
        assert_eq!(identity_seen(&app, Some(cookie)).await, "admin");
    }
}
