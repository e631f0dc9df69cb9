//! Registry error types

/// Startup-time resolution errors
///
/// All variants are fatal: boot is aborted and nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Ambiguous component {identity}: {primaries} of {} candidates marked primary ({})", .candidates.len(), .candidates.join(", "))]
    AmbiguousComponent {
        identity: String,
        candidates: Vec<String>,
        primaries: usize,
    },

    #[error("Missing dependency: {component} depends on unregistered {dependency}")]
    MissingDependency {
        component: String,
        dependency: String,
    },

    #[error("Cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Unresolved component: {0}")]
    UnresolvedComponent(String),

    #[error("Failed to initialize {component}: {source}")]
    Initialization {
        component: String,
        #[source]
        source: ComponentError,
    },
}

/// Errors raised by component factories and lifecycle hooks
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("Dependency lookup failed: {0}")]
    Lookup(#[source] Box<RegistryError>),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ComponentError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<RegistryError> for ComponentError {
    fn from(err: RegistryError) -> Self {
        Self::Lookup(Box::new(err))
    }
}
