//! # Entity Builder
//!
//! Collects components and identity flags, then creates the entity in one
//! step so observers only ever see the finished component set.
//!
//! ```rust,ignore
//! let goblin = manager
//!     .new_builder()
//!     .with_component(Health(30))
//!     .with_component(Position(4, 2))
//!     .persistent(false)
//!     .build()?;
//! ```

use std::collections::BTreeMap;

use super::cache::CacheId;
use super::component::{Component, ComponentType, EntityInfo, Scope};
use super::entity::EntityRef;
use super::manager::EntityManager;
use crate::error::EntityResult;

/// Builder for a single entity.
pub struct EntityBuilder<'m> {
    manager: &'m mut EntityManager,
    target: CacheId,
    components: BTreeMap<ComponentType, Box<dyn Component>>,
    info: Option<EntityInfo>,
}

impl<'m> EntityBuilder<'m> {
    pub(crate) fn new(manager: &'m mut EntityManager, target: CacheId) -> Self {
        Self {
            manager,
            target,
            components: BTreeMap::new(),
            info: None,
        }
    }

    pub(crate) fn with_components(
        manager: &'m mut EntityManager,
        target: CacheId,
        components: Vec<Box<dyn Component>>,
    ) -> Self {
        let mut builder = Self::new(manager, target);
        for component in components {
            builder.add_boxed(component);
        }
        builder
    }

    /// Adds a component, replacing one of the same type.
    #[must_use]
    pub fn with_component<T: Component>(mut self, component: T) -> Self {
        self.add_component(component);
        self
    }

    /// Adds a component in place, returning the one it replaced.
    pub fn add_component<T: Component>(&mut self, component: T) -> Option<T> {
        self.add_boxed(Box::new(component))
            .and_then(|previous| previous.downcast::<T>().ok())
    }

    /// Adds a type-erased component, returning the one it replaced.
    ///
    /// An [`EntityInfo`] replaces the builder's identity flags.
    pub fn add_boxed(&mut self, component: Box<dyn Component>) -> Option<Box<dyn Component>> {
        match component.downcast::<EntityInfo>() {
            Ok(info) => self
                .info
                .replace(info)
                .map(|previous| Box::new(previous) as Box<dyn Component>),
            Err(component) => self.components.insert(component.component_type(), component),
        }
    }

    /// Removes the component of type `T`.
    pub fn remove_component<T: Component>(&mut self) -> Option<T> {
        if ComponentType::of::<T>() == ComponentType::of::<EntityInfo>() {
            return self.info.take().and_then(|info| {
                let boxed: Box<dyn Component> = Box::new(info);
                boxed.downcast::<T>().ok()
            });
        }
        self.components
            .remove(&ComponentType::of::<T>())
            .and_then(|removed| removed.downcast::<T>().ok())
    }

    /// Whether the builder holds a `T`.
    #[must_use]
    pub fn has_component<T: Component>(&self) -> bool {
        if ComponentType::of::<T>() == ComponentType::of::<EntityInfo>() {
            return self.info.is_some();
        }
        self.components.contains_key(&ComponentType::of::<T>())
    }

    /// The builder's `T`, if any.
    #[must_use]
    pub fn get_component<T: Component>(&self) -> Option<&T> {
        self.components
            .get(&ComponentType::of::<T>())
            .and_then(|c| (**c).downcast_ref::<T>())
    }

    /// Number of components collected, [`EntityInfo`] included.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len() + usize::from(self.info.is_some())
    }

    /// Sets whether the entity is persisted.
    #[must_use]
    pub fn persistent(mut self, persisted: bool) -> Self {
        self.info_mut().persisted = persisted;
        self
    }

    /// Sets whether the entity is always relevant.
    #[must_use]
    pub fn always_relevant(mut self, always_relevant: bool) -> Self {
        self.info_mut().always_relevant = always_relevant;
        self
    }

    /// Sets the owning entity.
    #[must_use]
    pub fn owner(mut self, owner: EntityRef) -> Self {
        self.info_mut().owner = owner;
        self
    }

    /// Sets the scope, which also picks the partition the entity is built in.
    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.target = match scope {
            Scope::Global => CacheId::Global,
            Scope::Sector if self.target.is_sector() => self.target,
            Scope::Sector => CacheId::DEFAULT_SECTOR,
        };
        self.info_mut().scope = scope;
        self
    }

    /// The partition the entity will be built in.
    #[inline]
    #[must_use]
    pub const fn target(&self) -> CacheId {
        self.target
    }

    /// Creates the entity with lifecycle events.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn build(self) -> EntityResult<EntityRef> {
        self.finish(true)
    }

    /// Creates the entity without `OnAdded`/`OnActivated` events.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn build_without_lifecycle_events(self) -> EntityResult<EntityRef> {
        self.finish(false)
    }

    fn finish(self, send_lifecycle_events: bool) -> EntityResult<EntityRef> {
        let Self {
            manager,
            target,
            components,
            info,
        } = self;
        let mut components: Vec<Box<dyn Component>> = components.into_values().collect();
        if let Some(mut info) = info {
            info.scope = target.scope();
            components.push(Box::new(info));
        }
        manager.create_in(target, components, send_lifecycle_events)
    }

    fn info_mut(&mut self) -> &mut EntityInfo {
        let scope = self.target.scope();
        self.info.get_or_insert_with(|| EntityInfo::with_scope(scope))
    }
}
