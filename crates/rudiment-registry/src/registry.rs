//! Registry resolution and the resolved component set

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info};

use crate::descriptor::Instance;
use crate::{ComponentDescriptor, ComponentId, DependencyGraph, RegistryError, Result};

/// Ordered list of component declarations awaiting resolution
#[derive(Default)]
pub struct ComponentRegistry {
    descriptors: Vec<ComponentDescriptor>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor; declaration order is the initialization tie-break
    pub fn register(&mut self, descriptor: ComponentDescriptor) -> &mut Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, descriptor: ComponentDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Resolve and initialize every registered component
    pub fn resolve(self) -> Result<Components> {
        resolve(self.descriptors)
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("descriptors", &self.descriptors)
            .finish()
    }
}

/// Resolve descriptors into an initialized, immutable component set
///
/// Graph validation (ambiguity, missing dependencies, cycles) completes before
/// any factory runs, so a rejected graph initializes nothing. If a factory or
/// `initialize` hook fails, the components already initialized are destroyed
/// in reverse order before the error is returned.
pub fn resolve(descriptors: Vec<ComponentDescriptor>) -> Result<Components> {
    let declared = descriptors.len();
    let ordered = DependencyGraph::build(descriptors)?.into_ordered()?;
    debug!(
        "Resolved {} of {} declared components into initialization order",
        ordered.len(),
        declared
    );

    let mut components = Components::with_capacity(ordered.len());
    for descriptor in ordered {
        let (id, implementation, description, factory) = descriptor.into_parts();

        let instance = factory(&components).and_then(|instance| {
            instance.lifecycle.initialize(&components)?;
            Ok(instance)
        });

        match instance {
            Ok(instance) => {
                info!("Initialized component {} as {}", implementation, id);
                components.insert(
                    ComponentInfo {
                        id,
                        implementation,
                        description,
                    },
                    instance,
                );
            }
            Err(source) => {
                error!("Component {} failed to initialize: {}", implementation, source);
                components.shutdown();
                return Err(RegistryError::Initialization {
                    component: implementation.to_string(),
                    source,
                });
            }
        }
    }

    Ok(components)
}

/// Metadata of a resolved component
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub id: ComponentId,
    pub implementation: &'static str,
    pub description: Option<String>,
}

/// The resolved, initialized set of singletons
///
/// Immutable once [`resolve`] returns; share it behind an `Arc` and call
/// [`of`](Self::of) from any task.
pub struct Components {
    instances: HashMap<ComponentId, Instance>,
    order: Vec<ComponentInfo>,
    shut_down: AtomicBool,
}

impl Components {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            instances: HashMap::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
            shut_down: AtomicBool::new(false),
        }
    }

    fn insert(&mut self, info: ComponentInfo, instance: Instance) {
        self.instances.insert(info.id, instance);
        self.order.push(info);
    }

    /// Look up the singleton registered under identity `T`
    ///
    /// Never constructs or initializes anything.
    pub fn of<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let id = ComponentId::of::<T>();
        self.instances
            .get(&id)
            .and_then(|instance| instance.value.downcast_ref::<Arc<T>>())
            .cloned()
            .ok_or_else(|| RegistryError::UnresolvedComponent(id.name().to_string()))
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.instances.contains_key(&ComponentId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Resolved components in the order they were initialized
    pub fn initialization_order(&self) -> &[ComponentInfo] {
        &self.order
    }

    /// Run every `destroy` hook once, in reverse initialization order
    ///
    /// Subsequent calls are no-ops.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        for info in self.order.iter().rev() {
            if let Some(instance) = self.instances.get(&info.id) {
                debug!("Destroying component {}", info.implementation);
                instance.lifecycle.destroy();
            }
        }
    }
}

impl fmt::Debug for Components {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Components")
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}
