//! Component lifecycle trait and identity tokens

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::{ComponentError, Components};

/// Identity under which a component is registered and looked up
///
/// Identities are derived from Rust types. A trait object such as
/// `dyn SessionStore` is a valid identity, which is how several
/// implementations compete for one slot.
#[derive(Clone, Copy)]
pub struct ComponentId {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentId {
    /// Identity token for type `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Fully qualified type name of the identity
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ComponentId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentId {}

impl Hash for ComponentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComponentId").field(&self.name).finish()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Lifecycle hooks of a registry-managed singleton
///
/// Both hooks are optional. `initialize` runs exactly once, after every
/// dependency of the component has finished its own `initialize`.
/// `destroy` runs once on [`Components::shutdown`], in reverse
/// initialization order.
pub trait Component: Send + Sync + 'static {
    /// Called once after construction, with all dependencies already initialized
    #[allow(unused_variables)]
    fn initialize(&self, components: &Components) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Called once when the resolved set is shut down
    fn destroy(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Marker: Send + Sync {}
    struct Concrete;

    #[test]
    fn test_identity_equality() {
        assert_eq!(ComponentId::of::<Concrete>(), ComponentId::of::<Concrete>());
        assert_ne!(ComponentId::of::<Concrete>(), ComponentId::of::<dyn Marker>());
    }

    #[test]
    fn test_trait_object_identity_name() {
        let id = ComponentId::of::<dyn Marker>();
        assert!(id.name().contains("Marker"));
        assert!(id.to_string().starts_with("dyn "));
    }
}
