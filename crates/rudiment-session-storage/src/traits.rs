//! Session Model and Storage Trait
//!
//! This module provides the session type shared by the request pipeline and the
//! `SessionStore` trait abstraction implemented by storage backends.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::{CsrfToken, Identity};

/// Session attribute holding the URI to return to after authentication
pub const DEEP_LINK_URI: &str = "deepLinkURI";

/// Server-side state of one client session
#[derive(Debug, Clone)]
pub struct Session {
    /// Random 256-bit identifier carried in the session cookie
    rsid: String,
    /// Clock reading at creation (millis)
    creation_time: u64,
    /// Wall-clock creation timestamp, for diagnostics
    created_at: DateTime<Utc>,
    /// Clock reading of the last authorized access (millis)
    last_accessed_time: u64,
    attributes: HashMap<String, Value>,
    identity: Option<Identity>,
    /// Bound token, session-bound CSRF mode only
    csrf_token: Option<CsrfToken>,
    invalidated: bool,
}

impl Session {
    pub fn new(rsid: impl Into<String>, now: u64) -> Self {
        Self {
            rsid: rsid.into(),
            creation_time: now,
            created_at: Utc::now(),
            last_accessed_time: now,
            attributes: HashMap::new(),
            identity: None,
            csrf_token: None,
            invalidated: false,
        }
    }

    /// Check if the session has been idle for longer than `threshold_secs`
    ///
    /// Idle time is truncated to whole seconds before comparing.
    pub fn is_expired(&self, now: u64, threshold_secs: u64) -> bool {
        now.saturating_sub(self.last_accessed_time) / 1_000 > threshold_secs
    }
}

/// Shared handle to a stored [`Session`]
///
/// Cloning the handle does not copy the session. Each session carries its own
/// lock, so unrelated sessions never contend.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<RwLock<Session>>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(session)),
        }
    }

    /// Session identifier, `None` once invalidated
    pub fn rsid(&self) -> Option<String> {
        let session = self.inner.read();
        (!session.invalidated).then(|| session.rsid.clone())
    }

    pub fn is_valid(&self) -> bool {
        !self.inner.read().invalidated
    }

    pub fn creation_time(&self) -> u64 {
        self.inner.read().creation_time
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.read().created_at
    }

    pub fn last_accessed_time(&self) -> u64 {
        self.inner.read().last_accessed_time
    }

    /// Record an access at `now`, returning the previous access time
    pub fn touch(&self, now: u64) -> u64 {
        let mut session = self.inner.write();
        std::mem::replace(&mut session.last_accessed_time, now)
    }

    pub fn is_expired(&self, now: u64, threshold_secs: u64) -> bool {
        self.inner.read().is_expired(now, threshold_secs)
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.inner.read().attributes.get(name).cloned()
    }

    /// Ignored once the session has been invalidated
    pub fn set_attribute(&self, name: impl Into<String>, value: Value) {
        let mut session = self.inner.write();
        if !session.invalidated {
            session.attributes.insert(name.into(), value);
        }
    }

    pub fn remove_attribute(&self, name: &str) -> Option<Value> {
        self.inner.write().attributes.remove(name)
    }

    /// Snapshot of all attributes
    pub fn attributes(&self) -> HashMap<String, Value> {
        self.inner.read().attributes.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.read().identity.clone()
    }

    /// Attach an authenticated identity, replacing any previous one
    pub fn set_identity<D: Serialize>(
        &self,
        identity: &Identity<D>,
    ) -> Result<(), SessionStoreError> {
        let erased = identity.erase()?;
        let mut session = self.inner.write();
        if !session.invalidated {
            session.identity = Some(erased);
        }
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().identity.is_some()
    }

    pub fn csrf_token(&self) -> Option<CsrfToken> {
        self.inner.read().csrf_token.clone()
    }

    pub fn set_csrf_token(&self, token: CsrfToken) {
        let mut session = self.inner.write();
        if !session.invalidated {
            session.csrf_token = Some(token);
        }
    }

    /// Return the bound token, binding the one built by `mint` if there is none
    ///
    /// Check and bind happen under one lock, so concurrent callers agree on a
    /// single token. `None` once the session has been invalidated.
    pub fn csrf_token_or_insert_with(&self, mint: impl FnOnce() -> CsrfToken) -> Option<CsrfToken> {
        let mut session = self.inner.write();
        if session.invalidated {
            return None;
        }
        Some(session.csrf_token.get_or_insert_with(mint).clone())
    }

    /// Copy attributes, identity and bound token from `previous`
    ///
    /// Used when a session is reissued under a new identifier. Fields already
    /// set on this session are overwritten.
    pub fn take_over(&self, previous: &SessionHandle) {
        let (attributes, identity, csrf_token) = {
            let source = previous.inner.read();
            (
                source.attributes.clone(),
                source.identity.clone(),
                source.csrf_token.clone(),
            )
        };
        let mut session = self.inner.write();
        if session.invalidated {
            return;
        }
        session.attributes.extend(attributes);
        session.identity = identity;
        session.csrf_token = csrf_token;
    }

    /// Clear every field; returns `false` if the session was already cleared
    pub fn clear(&self) -> bool {
        let mut session = self.inner.write();
        if session.invalidated {
            return false;
        }
        session.invalidated = true;
        session.rsid.clear();
        session.attributes.clear();
        session.identity = None;
        session.csrf_token = None;
        true
    }

    /// Whether both handles refer to the same stored session
    pub fn ptr_eq(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Result of an atomic get-or-create
#[derive(Debug, Clone)]
pub struct GetOrCreate {
    pub session: SessionHandle,
    /// `true` only for the caller whose insertion won
    pub created: bool,
}

/// Core trait for session storage backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Error type for storage operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Get the backend name for logging and debugging
    fn backend_name(&self) -> &'static str;

    // ============================================================================
    // Session Management
    // ============================================================================

    /// Create and store a new session with a freshly generated rsid
    async fn create_session(&self) -> Result<SessionHandle, Self::Error>;

    /// Atomically return the session bound to `correlation_key`, creating it
    /// if none exists
    ///
    /// Concurrent callers with the same key all receive the same session;
    /// exactly one of them observes `created == true`.
    async fn get_or_create(&self, correlation_key: &str) -> Result<GetOrCreate, Self::Error>;

    /// Get session by rsid
    async fn get_session(&self, rsid: &str) -> Result<Option<SessionHandle>, Self::Error>;

    /// Remove the session from the store and clear all of its fields
    ///
    /// Returns `false` when the session was already invalidated.
    async fn invalidate(&self, session: &SessionHandle) -> Result<bool, Self::Error>;

    /// Remove and clear the session stored under `rsid`
    async fn delete_session(&self, rsid: &str) -> Result<bool, Self::Error>;

    /// List all session ids
    async fn list_sessions(&self) -> Result<Vec<String>, Self::Error>;

    // ============================================================================
    // Monitoring
    // ============================================================================

    /// Get session count for monitoring
    async fn session_count(&self) -> Result<usize, Self::Error>;
}

/// Unified error type for session storage backends
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Maximum sessions limit reached: {0}")]
    MaxSessionsReached(usize),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Generic storage error: {0}")]
    Generic(String),
}

impl From<serde_json::Error> for SessionStoreError {
    fn from(err: serde_json::Error) -> Self {
        SessionStoreError::SerializationError(err.to_string())
    }
}

/// Type alias for session store trait objects with the unified error type
pub type BoxedSessionStore = dyn SessionStore<Error = SessionStoreError>;
