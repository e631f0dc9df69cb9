//! # Session Storage Prelude
//!
//! This module provides convenient re-exports of the most commonly used types
//! from the session storage library.
//!
//! ```rust
//! use rudiment_session_storage::prelude::*;
//! ```

// Core trait and types
pub use crate::traits::{
    BoxedSessionStore, DEEP_LINK_URI, GetOrCreate, Session, SessionHandle, SessionStore,
    SessionStoreError,
};

pub use crate::{Clock, CsrfToken, Identity, MonotonicClock};

// In-memory implementation (always available)
pub use crate::in_memory::{InMemoryConfig, InMemorySessionStore, InMemoryStats};

// Convenience functions
pub use crate::{create_default_store, create_memory_store};
