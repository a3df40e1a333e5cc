//! # Sierra Session Store
//!
//! File: cli/src/common/auth/session.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Server-side login sessions. A session is created on a successful login,
//! lives for a fixed lifetime measured from its creation (activity never
//! extends it), and is destroyed on logout. An expired session is simply
//! absent: `SessionStore::get` evicts it and returns `None`, so callers never
//! see a "stale" record.
//!
//! The store is an injected trait object rather than a process-wide global,
//! which keeps the gate step testable with a store of the test's choosing.
//! Every operation touches exactly one key.
//!
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "sierra_session";

/// Opaque session identifier (a random v4 UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A server-side session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The authenticated user, if any.
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// An authenticated session for `username` starting at `now`.
    pub fn authenticated(username: &str, now: DateTime<Utc>, lifetime: Duration) -> Self {
        Self {
            username: Some(username.to_string()),
            created_at: now,
            expires_at: now + lifetime,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// # Session Store (`SessionStore`)
///
/// Mapping from session id to session record. Implementations must make each
/// call atomic for its key; no cross-key locking is expected.
pub trait SessionStore: Send + Sync {
    fn insert(&self, id: SessionId, session: Session);

    /// Returns the live session for `id`. Expired records are removed and
    /// reported as absent.
    fn get(&self, id: &SessionId) -> Option<Session>;

    fn remove(&self, id: &SessionId) -> Option<Session>;
}

/// In-memory `SessionStore` backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionId, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Drops every record expired at `now`. Runs on each insert, so sessions
    /// whose clients never come back do not accumulate.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            debug!("Purged {} expired sessions", purged);
        }
        purged
    }
}

impl SessionStore for MemorySessionStore {
    fn insert(&self, id: SessionId, session: Session) {
        self.purge_expired(Utc::now());
        self.sessions.insert(id, session);
    }

    fn get(&self, id: &SessionId) -> Option<Session> {
        let now = Utc::now();
        // remove_if holds the shard lock, so a concurrent insert under the same
        // id cannot be lost between the expiry check and the removal.
        if self
            .sessions
            .remove_if(id, |_, session| session.is_expired_at(now))
            .is_some()
        {
            debug!("Session {} expired and was evicted", id);
            return None;
        }
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    fn remove(&self, id: &SessionId) -> Option<Session> {
        self.sessions.remove(id).map(|(_, session)| session)
    }
}

/// # Read Session Cookie (`session_id_from_cookies`)
///
/// Extracts the session id from a `Cookie` header value such as
/// `theme=dark; sierra_session=<uuid>`. Malformed ids are treated as absent.
pub fn session_id_from_cookies(cookie_header: &str) -> Option<SessionId> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| value.trim().trim_matches('"').parse().ok())
}

/// `Set-Cookie` value that installs `id` for `lifetime`.
pub fn session_cookie(id: &SessionId, lifetime: Duration) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        id,
        lifetime.num_seconds()
    )
}

/// `Set-Cookie` value that makes the browser drop the session cookie.
pub fn expired_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}
