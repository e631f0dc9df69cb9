//! # Session Storage
//!
//! **Session model and concurrent session storage for rudiment servers.**
//!
//! Provides the [`Session`] model shared by the request pipeline, the
//! [`SessionStore`] trait and an in-memory implementation with an atomic
//! get-or-create primitive, plus the identity and CSRF token types carried on a
//! session.
//!
//! ```toml
//! [dependencies]
//! rudiment-session-storage = "0.1"
//! ```

// Core trait and types
mod traits;
/// Core session types and the storage trait
pub use traits::*;

mod clock;
mod identity;
mod token;

// Implementations
pub mod in_memory;
pub mod prelude;

pub use clock::{Clock, MonotonicClock};
#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
pub use identity::Identity;
pub use token::{CsrfToken, constant_time_eq, generate_token};

// Re-export for convenience
/// In-memory session storage implementation
pub use in_memory::{InMemoryConfig, InMemorySessionStore, InMemoryStats};

/// Create a default in-memory session store
pub fn create_default_store() -> InMemorySessionStore {
    InMemorySessionStore::new()
}

/// Create an in-memory session store with custom limits and clock
pub fn create_memory_store(
    config: InMemoryConfig,
    clock: std::sync::Arc<dyn Clock>,
) -> InMemorySessionStore {
    InMemorySessionStore::with_config(config, clock)
}

#[cfg(test)]
mod integration_tests {
    use crate::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_store_trait_compliance() {
        let store: Arc<BoxedSessionStore> = Arc::new(create_default_store());
        assert_eq!(store.backend_name(), "InMemory");

        // Session operations
        let session = store.create_session().await.unwrap();
        let rsid = session.rsid().unwrap();
        assert!(store.get_session(&rsid).await.unwrap().is_some());
        assert_eq!(store.session_count().await.unwrap(), 1);
        assert_eq!(store.list_sessions().await.unwrap(), vec![rsid.clone()]);

        // State is shared through the handle
        session.set_attribute("theme", json!("dark"));
        let fetched = store.get_session(&rsid).await.unwrap().unwrap();
        assert_eq!(fetched.attribute("theme"), Some(json!("dark")));

        // Cleanup
        assert!(store.invalidate(&fetched).await.unwrap());
        assert_eq!(store.session_count().await.unwrap(), 0);
        assert!(!session.is_valid());
    }

    #[tokio::test]
    async fn test_memory_store_with_limits() {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let store = create_memory_store(
            InMemoryConfig {
                max_sessions: 1,
                ..Default::default()
            },
            clock,
        );

        store.create_session().await.unwrap();
        assert!(matches!(
            store.create_session().await,
            Err(SessionStoreError::MaxSessionsReached(1))
        ));
    }
}
