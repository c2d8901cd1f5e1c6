//! Lifecycle event vocabulary.

use std::sync::Arc;

use crate::ecs::{Component, ComponentType, EntityManager, EntityRef};
use crate::metadata::Prefab;

/// Per-component lifecycle event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// A component type was added to the entity.
    OnAddedComponent(ComponentType),
    /// A newly added component became active.
    OnActivatedComponent(ComponentType),
    /// An existing component was replaced.
    OnChangedComponent(ComponentType),
    /// A component is about to be deactivated. Still present in storage.
    BeforeDeactivateComponent(ComponentType),
    /// A component is about to be removed. Still present in storage.
    BeforeRemoveComponent(ComponentType),
}

impl LifecycleEvent {
    /// The component type the event concerns.
    #[inline]
    #[must_use]
    pub const fn component_type(self) -> ComponentType {
        match self {
            Self::OnAddedComponent(t)
            | Self::OnActivatedComponent(t)
            | Self::OnChangedComponent(t)
            | Self::BeforeDeactivateComponent(t)
            | Self::BeforeRemoveComponent(t) => t,
        }
    }

    /// Event name, for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OnAddedComponent(_) => "OnAddedComponent",
            Self::OnActivatedComponent(_) => "OnActivatedComponent",
            Self::OnChangedComponent(_) => "OnChangedComponent",
            Self::BeforeDeactivateComponent(_) => "BeforeDeactivateComponent",
            Self::BeforeRemoveComponent(_) => "BeforeRemoveComponent",
        }
    }
}

/// Raised before a new entity's components are stored.
///
/// Handlers may edit or replace the component set; whatever the event holds
/// afterwards is stored verbatim.
#[derive(Debug)]
pub struct BeforeEntityCreated {
    prefab: Option<Arc<dyn Prefab>>,
    original_types: Vec<ComponentType>,
    components: Vec<Box<dyn Component>>,
}

impl BeforeEntityCreated {
    pub(crate) fn new(prefab: Option<Arc<dyn Prefab>>, components: Vec<Box<dyn Component>>) -> Self {
        let original_types = components.iter().map(|c| c.component_type()).collect();
        Self {
            prefab,
            original_types,
            components,
        }
    }

    /// The prefab named by the incoming `EntityInfo`, if any.
    #[must_use]
    pub fn prefab(&self) -> Option<&Arc<dyn Prefab>> {
        self.prefab.as_ref()
    }

    /// Component types the caller originally supplied.
    #[must_use]
    pub fn original_types(&self) -> &[ComponentType] {
        &self.original_types
    }

    /// The component set as it stands.
    #[must_use]
    pub fn components(&self) -> &[Box<dyn Component>] {
        &self.components
    }

    /// Whether the set holds a `T`.
    #[must_use]
    pub fn has_component<T: Component>(&self) -> bool {
        self.components.iter().any(|c| (**c).is::<T>())
    }

    /// Adds a component, replacing one of the same type.
    pub fn add_component(&mut self, component: Box<dyn Component>) {
        let component_type = component.component_type();
        self.components.retain(|c| c.component_type() != component_type);
        self.components.push(component);
    }

    /// Removes the component of the given type.
    pub fn remove_component(&mut self, component_type: ComponentType) -> Option<Box<dyn Component>> {
        let index = self
            .components
            .iter()
            .position(|c| c.component_type() == component_type)?;
        Some(self.components.remove(index))
    }

    /// Replaces the whole component set.
    pub fn replace_components(&mut self, components: Vec<Box<dyn Component>>) {
        self.components = components;
    }

    /// Consumes the event, yielding the final component set.
    #[must_use]
    pub fn into_components(self) -> Vec<Box<dyn Component>> {
        self.components
    }
}

/// External dispatcher for lifecycle events.
///
/// Optional: the manager works without one. Callbacks run synchronously
/// inside the manager operation that raised them.
pub trait LifecycleEventSystem: Send + Sync {
    /// Called once per new entity before its components are stored.
    fn before_entity_created(
        &self,
        _manager: &mut EntityManager,
        _entity: EntityRef,
        _event: &mut BeforeEntityCreated,
    ) {
    }

    /// Delivers a per-component lifecycle event.
    fn send(&self, manager: &mut EntityManager, entity: EntityRef, event: LifecycleEvent);
}
