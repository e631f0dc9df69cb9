//! Filter chain assembly and execution

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use rudiment_registry::{Components, RegistryError};
use tracing::{debug, error, info};

use super::{FilterAction, HttpFilter};
use crate::{Config, HttpExchange};

type Activation = Arc<dyn Fn(&Config) -> bool + Send + Sync>;
type Resolver = Box<dyn FnOnce(&Components) -> Result<Arc<dyn HttpFilter>, RegistryError> + Send>;

enum FilterSource {
    Instance(Arc<dyn HttpFilter>),
    Component(Resolver),
}

/// Declaration of one filter: where it sits in the chain and when it is active
///
/// The activation predicate is evaluated once, when the chain is assembled.
/// Filters at equal positions keep their declaration order.
pub struct FilterDescriptor {
    name: String,
    position: i32,
    activation: Activation,
    source: FilterSource,
}

impl FilterDescriptor {
    /// Filter instance built by the caller, always active
    pub fn new(name: impl Into<String>, position: i32, filter: Arc<dyn HttpFilter>) -> Self {
        Self {
            name: name.into(),
            position,
            activation: Arc::new(|_: &Config| true),
            source: FilterSource::Instance(filter),
        }
    }

    /// Filter looked up in the resolved components under identity `F`
    pub fn component<F>(name: impl Into<String>, position: i32) -> Self
    where
        F: HttpFilter + 'static,
    {
        let resolver: Resolver = Box::new(|components: &Components| {
            Ok(components.of::<F>()? as Arc<dyn HttpFilter>)
        });
        Self {
            name: name.into(),
            position,
            activation: Arc::new(|_: &Config| true),
            source: FilterSource::Component(resolver),
        }
    }

    /// Only include the filter when `predicate` holds for the configuration
    pub fn activation<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Config) -> bool + Send + Sync + 'static,
    {
        self.activation = Arc::new(predicate);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn is_active(&self, config: &Config) -> bool {
        (self.activation)(config)
    }
}

impl fmt::Debug for FilterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterDescriptor")
            .field("name", &self.name)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

/// Collects filter descriptors and assembles the chain
#[derive(Default)]
pub struct FilterChainBuilder {
    descriptors: Vec<FilterDescriptor>,
}

impl FilterChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor after those already declared
    pub fn filter(mut self, descriptor: FilterDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn push(&mut self, descriptor: FilterDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Evaluate activation against `config` and order the active filters
    ///
    /// Inactive component filters are never looked up, so they need not be
    /// registered.
    pub fn build(
        self,
        components: &Components,
        config: &Config,
    ) -> Result<FilterChain, RegistryError> {
        let mut links = Vec::with_capacity(self.descriptors.len());

        for descriptor in self.descriptors {
            if !descriptor.is_active(config) {
                debug!("Filter {} inactive, skipping", descriptor.name);
                continue;
            }

            let filter = match descriptor.source {
                FilterSource::Instance(filter) => filter,
                FilterSource::Component(resolve) => resolve(components)?,
            };
            links.push(ChainLink {
                name: descriptor.name,
                position: descriptor.position,
                filter,
            });
        }

        // Stable: equal positions keep declaration order
        links.sort_by_key(|link| link.position);

        let chain = FilterChain { links };
        info!("Filter chain assembled: [{}]", chain.names().join(", "));
        Ok(chain)
    }
}

#[derive(Clone)]
struct ChainLink {
    name: String,
    position: i32,
    filter: Arc<dyn HttpFilter>,
}

/// How a request left the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Every filter forwarded; the request goes on to the dispatcher
    Completed,
    /// A filter answered the request
    Terminated { filter: String, status: StatusCode },
}

impl ChainOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ChainOutcome::Completed)
    }
}

/// Active filters in execution order
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use http::{Method, StatusCode};
/// use rudiment_http_server::filter::{FilterAction, FilterChainBuilder, FilterDescriptor, FilterError, HttpFilter};
/// use rudiment_http_server::{Config, HttpExchange};
/// use rudiment_registry::ComponentRegistry;
///
/// struct Deny;
///
/// #[async_trait]
/// impl HttpFilter for Deny {
///     async fn do_filter(&self, _exchange: &mut HttpExchange) -> Result<FilterAction, FilterError> {
///         Ok(FilterAction::Terminate(StatusCode::FORBIDDEN))
///     }
/// }
///
/// # async fn example() {
/// let components = ComponentRegistry::new().resolve().unwrap();
/// let chain = FilterChainBuilder::new()
///     .filter(FilterDescriptor::new("deny", 10, Arc::new(Deny)))
///     .build(&components, &Config::new())
///     .unwrap();
///
/// let mut exchange = HttpExchange::request(Method::GET, "/");
/// assert!(!chain.apply(&mut exchange).await.is_completed());
/// assert_eq!(exchange.status(), StatusCode::FORBIDDEN);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct FilterChain {
    links: Vec<ChainLink>,
}

impl FilterChain {
    /// Chain without filters; every request completes
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Names of the active filters in execution order
    pub fn names(&self) -> Vec<&str> {
        self.links.iter().map(|link| link.name.as_str()).collect()
    }

    /// Run the exchange through every filter until one terminates
    ///
    /// A filter error terminates the chain with the error's status.
    pub async fn apply(&self, exchange: &mut HttpExchange) -> ChainOutcome {
        for link in &self.links {
            let status = match link.filter.do_filter(exchange).await {
                Ok(FilterAction::Forward) => continue,
                Ok(FilterAction::Terminate(status)) => {
                    debug!("Filter {} terminated request with {}", link.name, status);
                    status
                }
                Err(err) => {
                    error!("Filter {} failed: {}", link.name, err);
                    err.status()
                }
            };

            exchange.set_status(status);
            return ChainOutcome::Terminated {
                filter: link.name.clone(),
                status,
            };
        }

        ChainOutcome::Completed
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
