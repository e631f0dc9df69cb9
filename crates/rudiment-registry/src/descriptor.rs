//! Component descriptors

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::{Component, ComponentError, ComponentId, Components};

/// A constructed singleton: the value exposed under its identity plus the
/// lifecycle handle of the concrete implementation
pub(crate) struct Instance {
    pub(crate) value: Arc<dyn Any + Send + Sync>,
    pub(crate) lifecycle: Arc<dyn Component>,
}

impl Instance {
    fn expose<I, C>(component: Arc<C>, upcast: fn(Arc<C>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Component,
    {
        let lifecycle: Arc<dyn Component> = component.clone();
        let exposed: Arc<I> = upcast(component);
        Self {
            value: Arc::new(exposed),
            lifecycle,
        }
    }
}

pub(crate) type Factory =
    Box<dyn FnOnce(&Components) -> Result<Instance, ComponentError> + Send + 'static>;

type Condition = Box<dyn FnOnce() -> bool + Send + 'static>;

/// Declaration of one candidate implementation for an identity
///
/// The factory receives the components resolved so far, so dependencies
/// declared with [`depends_on`](Self::depends_on) can be looked up and
/// captured at construction time.
///
/// ```rust
/// use std::sync::Arc;
/// use rudiment_registry::{Component, ComponentDescriptor};
///
/// struct Clock;
/// impl Component for Clock {}
///
/// struct Scheduler {
///     clock: Arc<Clock>,
/// }
/// impl Component for Scheduler {}
///
/// let descriptor = ComponentDescriptor::new(|components| {
///     Ok(Scheduler { clock: components.of::<Clock>()? })
/// })
/// .depends_on::<Clock>()
/// .description("Runs jobs on time");
///
/// assert_eq!(descriptor.dependencies().len(), 1);
/// ```
pub struct ComponentDescriptor {
    id: ComponentId,
    implementation: &'static str,
    primary: bool,
    depends_on: Vec<ComponentId>,
    description: Option<String>,
    condition: Option<Condition>,
    factory: Factory,
}

impl ComponentDescriptor {
    /// Register `C` under its own type as identity
    pub fn new<C, F>(factory: F) -> Self
    where
        C: Component,
        F: FnOnce(&Components) -> Result<C, ComponentError> + Send + 'static,
    {
        Self::provides::<C, C, F>(factory, |component| component)
    }

    /// Register `C` as an implementation of identity `I`
    ///
    /// `upcast` performs the unsizing coercion, usually `|c| c as Arc<dyn Trait>`.
    pub fn provides<I, C, F>(factory: F, upcast: fn(Arc<C>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Component,
        F: FnOnce(&Components) -> Result<C, ComponentError> + Send + 'static,
    {
        let factory: Factory = Box::new(move |components| {
            let component = Arc::new(factory(components)?);
            Ok(Instance::expose(component, upcast))
        });

        Self::with_factory::<I, C>(factory)
    }

    /// Register an instance that was built outside the registry
    ///
    /// The registry still runs its lifecycle hooks. Callers keep their own
    /// handle, which is how tests drive shared fixtures such as clocks.
    pub fn instance<I, C>(component: Arc<C>, upcast: fn(Arc<C>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Component,
    {
        let factory: Factory = Box::new(move |_| Ok(Instance::expose(component, upcast)));
        Self::with_factory::<I, C>(factory)
    }

    fn with_factory<I, C>(factory: Factory) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Component,
    {
        Self {
            id: ComponentId::of::<I>(),
            implementation: std::any::type_name::<C>(),
            primary: false,
            depends_on: Vec::new(),
            description: None,
            condition: None,
            factory,
        }
    }

    /// Mark this candidate as the primary implementation of its identity
    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    /// Declare a dependency on identity `T`
    pub fn depends_on<T: ?Sized + 'static>(self) -> Self {
        self.depends_on_id(ComponentId::of::<T>())
    }

    /// Declare a dependency by identity token
    pub fn depends_on_id(mut self, id: ComponentId) -> Self {
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Only register this candidate if `condition` holds at resolve time
    pub fn condition<F>(mut self, condition: F) -> Self
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        self.condition = Some(Box::new(condition));
        self
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn implementation(&self) -> &'static str {
        self.implementation
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn dependencies(&self) -> &[ComponentId] {
        &self.depends_on
    }

    pub fn describe(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Evaluate and consume the activation condition
    pub(crate) fn take_condition(&mut self) -> bool {
        self.condition.take().is_none_or(|condition| condition())
    }

    pub(crate) fn into_parts(self) -> (ComponentId, &'static str, Option<String>, Factory) {
        (self.id, self.implementation, self.description, self.factory)
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("id", &self.id)
            .field("implementation", &self.implementation)
            .field("primary", &self.primary)
            .field("depends_on", &self.depends_on)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
