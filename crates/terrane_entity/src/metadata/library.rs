//! Component copy capability.

use std::any::TypeId;
use std::collections::HashMap;

use parking_lot::RwLock;

use crate::ecs::{Component, EntityInfo};

/// Supplies deep copies of components.
pub trait ComponentLibrary: Send + Sync {
    /// Returns a deep copy of `component`, or `None` if the type is unknown.
    fn copy(&self, component: &dyn Component) -> Option<Box<dyn Component>>;
}

type CopyFn = fn(&dyn Component) -> Option<Box<dyn Component>>;

fn copy_component<T: Component + Clone>(component: &dyn Component) -> Option<Box<dyn Component>> {
    component
        .downcast_ref::<T>()
        .map(|value| Box::new(value.clone()) as Box<dyn Component>)
}

/// Registry of copy functions keyed by component type.
///
/// Registration goes through `&self`, so a registry shared as
/// `Arc<dyn ComponentLibrary>` can still learn new types.
pub struct ComponentRegistry {
    copy_fns: RwLock<HashMap<TypeId, CopyFn>>,
}

impl ComponentRegistry {
    /// Creates a registry that already knows [`EntityInfo`].
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            copy_fns: RwLock::new(HashMap::new()),
        };
        registry.register::<EntityInfo>();
        registry
    }

    /// Registers `T` as copyable through `Clone`.
    pub fn register<T: Component + Clone>(&self) {
        self.copy_fns
            .write()
            .insert(TypeId::of::<T>(), copy_component::<T>);
    }

    /// Whether `T` has been registered.
    #[must_use]
    pub fn is_registered<T: Component>(&self) -> bool {
        self.copy_fns.read().contains_key(&TypeId::of::<T>())
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.copy_fns.read().len()
    }

    /// Whether no types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.copy_fns.read().is_empty()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentLibrary for ComponentRegistry {
    fn copy(&self, component: &dyn Component) -> Option<Box<dyn Component>> {
        let copy_fn = *self.copy_fns.read().get(&component.component_type_id())?;
        copy_fn(component)
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("registered", &self.len())
            .finish()
    }
}
