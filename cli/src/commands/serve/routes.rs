//! # Sierra Route Handlers
//!
//! File: cli/src/commands/serve/routes.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! The explicit routes of the site server:
//!
//! | Method | Path            | Behavior                                        |
//! |--------|-----------------|-------------------------------------------------|
//! | GET    | `/`             | redirect to the login page                      |
//! | POST   | `/login`        | check credentials, start a session, redirect    |
//! | GET    | `/logout`       | destroy the session, redirect to login          |
//! | GET    | `/session-info` | `{"username": ...}` for the page header         |
//!
//! Everything else falls through to the site directory, and from there to
//! `not_found`.
//!
use super::middleware::{CurrentSession, SiteState};
use crate::common::auth::session::{expired_session_cookie, session_cookie};
use crate::common::auth::{Session, SessionId};
use crate::core::error::{found, AccessError};
use axum::{
    extract::{FromRequest, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

/// Body of `POST /login`, sent as a form or as JSON. Missing fields are
/// empty strings, which simply fail the credential check.
#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl LoginForm {
    /// Reads the body as JSON when the request says so, as a form otherwise.
    /// An unreadable body yields an empty form.
    async fn from_body(request: Request) -> Self {
        let is_json = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));

        let parsed = if is_json {
            Json::<LoginForm>::from_request(request, &())
                .await
                .map(|Json(form)| form)
                .map_err(|e| e.body_text())
        } else {
            Form::<LoginForm>::from_request(request, &())
                .await
                .map(|Form(form)| form)
                .map_err(|e| e.body_text())
        };

        parsed.unwrap_or_else(|reason| {
            debug!("Unreadable login body ({}); treating as empty", reason);
            LoginForm::default()
        })
    }
}

/// `GET /`: always the login page.
pub async fn root(State(state): State<SiteState>) -> Response {
    found(&state.config.login_page)
}

/// # Login (`login`)
///
/// Checks the submitted pair against the configured credentials.
///
/// * Valid: any previous session id is discarded, a fresh session is stored,
///   its cookie is set, and the caller is redirected to the index page.
/// * Invalid: an inline error with a retry link. The status is `200 OK`
///   unless strict auth status is configured (`401 Unauthorized`).
/// * Already logged in: redirected to the index page; the identity of an
///   authenticated session never changes.
pub async fn login(
    State(state): State<SiteState>,
    current: CurrentSession,
    request: Request,
) -> Response {
    let config = &state.config;

    if current.is_authenticated() {
        debug!("Login attempt from an authenticated session; identity unchanged");
        return found(&config.index_page);
    }

    let form = LoginForm::from_body(request).await;
    if !config.credentials.verify(&form.username, &form.password) {
        warn!(user = %form.username, "Rejected login attempt");
        let status = if config.strict_auth_status {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::OK
        };
        return AccessError::AuthFailure {
            status,
            login_page: config.login_page.clone(),
        }
        .into_response();
    }

    if let Some(stale) = current.id {
        state.sessions.remove(&stale);
    }

    let lifetime = config.session_lifetime();
    let id = SessionId::generate();
    state
        .sessions
        .insert(id, Session::authenticated(&form.username, Utc::now(), lifetime));
    info!(user = %form.username, "User logged in");

    (
        StatusCode::FOUND,
        [
            (header::LOCATION, config.index_page.clone()),
            (header::SET_COOKIE, session_cookie(&id, lifetime)),
        ],
    )
        .into_response()
}

/// `GET /logout`: removes the session from the store (not just marking it
/// stale), clears the cookie and redirects to login.
pub async fn logout(State(state): State<SiteState>, current: CurrentSession) -> Response {
    if let Some(id) = current.id {
        if let Some(session) = state.sessions.remove(&id) {
            info!(
                user = %session.username.as_deref().unwrap_or("guest"),
                "User logged out"
            );
        }
    }

    (
        StatusCode::FOUND,
        [
            (header::LOCATION, state.config.login_page.clone()),
            (header::SET_COOKIE, expired_session_cookie()),
        ],
    )
        .into_response()
}

/// `GET /session-info`: the logged-in username, or `null` with
/// `401 Unauthorized` for anonymous callers.
pub async fn session_info(current: CurrentSession) -> Response {
    match current.username() {
        Some(username) => Json(json!({ "username": username })).into_response(),
        None => (StatusCode::UNAUTHORIZED, Json(json!({ "username": null }))).into_response(),
    }
}

/// Terminal fallback for anything no route or file matched.
pub async fn not_found() -> AccessError {
    AccessError::NotFound
}
