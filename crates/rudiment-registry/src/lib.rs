//! # Component Registry
//!
//! **Process-wide registry of singleton application components.**
//!
//! Components are declared up front as [`ComponentDescriptor`]s. Resolving the
//! registry builds the dependency graph, selects primary implementations,
//! sorts the graph topologically and initializes every component exactly once,
//! dependencies first. The result is an immutable [`Components`] set that can be
//! shared between request-handling tasks without further synchronization.
//!
//! ## Resolution rules
//!
//! - Several candidates for one identity: exactly one must be marked primary
//! - Every `depends_on` identity must be registered
//! - The graph must be acyclic; ties are broken by declaration order
//! - Any failure is fatal and reported before a single request is served
//!
//! ```rust
//! use std::sync::Arc;
//! use rudiment_registry::{Component, ComponentDescriptor, ComponentRegistry};
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//! impl Component for English {}
//! impl Greeter for English {
//!     fn greet(&self) -> String {
//!         "hello".to_string()
//!     }
//! }
//!
//! let components = ComponentRegistry::new()
//!     .with(ComponentDescriptor::provides::<dyn Greeter, _, _>(
//!         |_| Ok(English),
//!         |c| c as Arc<dyn Greeter>,
//!     ))
//!     .resolve()
//!     .unwrap();
//!
//! assert_eq!(components.of::<dyn Greeter>().unwrap().greet(), "hello");
//! ```

mod component;
mod descriptor;
mod error;
mod graph;
mod registry;

pub use component::{Component, ComponentId};
pub use descriptor::ComponentDescriptor;
pub use error::{ComponentError, RegistryError};
pub use graph::DependencyGraph;
pub use registry::{ComponentInfo, ComponentRegistry, Components, resolve};

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
