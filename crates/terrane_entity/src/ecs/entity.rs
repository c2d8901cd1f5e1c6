//! # Entity Identity
//!
//! Entities are bare identifiers:
//! - [`EntityId`]: a strictly positive 64-bit integer, never reused while the
//!   manager lives. Zero is reserved for "no entity".
//! - [`EntityRef`]: a copyable handle carrying an id. It holds no pointer into
//!   storage; every access resolves the id against the [`EntityManager`], so a
//!   handle to a destroyed or unloaded entity simply stops resolving.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::component::{Component, EntityInfo, Scope};
use super::manager::EntityManager;
use crate::error::EntityResult;
use crate::metadata::Prefab;

/// Unique identifier for an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// The reserved "no entity" id.
    pub const NULL: Self = Self(0);

    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Checks if this is the reserved null id.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for EntityId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to an entity, resolved against an [`EntityManager`].
///
/// Reads on a handle that does not resolve return nothing; writes on a handle
/// whose entity is not active are ignored. [`EntityRef::NULL`] never resolves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityRef {
    id: EntityId,
}

impl EntityRef {
    /// The null handle.
    pub const NULL: Self = Self { id: EntityId::NULL };

    /// Creates a handle for the given id.
    #[inline]
    #[must_use]
    pub const fn new(id: EntityId) -> Self {
        Self { id }
    }

    /// The id this handle refers to.
    #[inline]
    #[must_use]
    pub const fn id(self) -> EntityId {
        self.id
    }

    /// Checks if this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.id.is_null()
    }

    /// Whether the handle currently resolves to an entity in some cache.
    #[must_use]
    pub fn exists(self, manager: &EntityManager) -> bool {
        !self.is_null() && manager.get_existing_entity(self.id) == self
    }

    /// Whether the entity is loaded.
    #[must_use]
    pub fn is_active(self, manager: &EntityManager) -> bool {
        !self.is_null() && manager.is_active_entity(self.id)
    }

    /// Returns the component of type `T`, if the entity has one.
    #[must_use]
    pub fn get_component<T: Component>(self, manager: &EntityManager) -> Option<&T> {
        if !self.exists(manager) {
            return None;
        }
        manager.get_component::<T>(self.id)
    }

    /// Whether the entity has a component of type `T`.
    #[must_use]
    pub fn has_component<T: Component>(self, manager: &EntityManager) -> bool {
        self.exists(manager) && manager.has_component::<T>(self.id)
    }

    /// Adds or replaces a component. Returns the replaced value.
    pub fn add_component<T: Component>(self, manager: &mut EntityManager, component: T) -> Option<T> {
        if !self.is_active(manager) {
            return None;
        }
        manager.add_component(self.id, component)
    }

    /// Stores a modified component and announces the change.
    pub fn save_component<T: Component>(self, manager: &mut EntityManager, component: T) -> Option<T> {
        if !self.is_active(manager) {
            return None;
        }
        manager.save_component(self.id, component)
    }

    /// Removes the component of type `T`.
    pub fn remove_component<T: Component>(self, manager: &mut EntityManager) -> Option<T> {
        if !self.is_active(manager) {
            return None;
        }
        manager.remove_component::<T>(self.id)
    }

    /// Iterates the entity's components. Empty if the handle does not resolve.
    pub fn iterate_components(self, manager: &EntityManager) -> impl Iterator<Item = &dyn Component> {
        self.exists(manager)
            .then(|| manager.iterate_components(self.id))
            .into_iter()
            .flatten()
    }

    /// Destroys the entity, raising lifecycle events.
    pub fn destroy(self, manager: &mut EntityManager) {
        if self.is_active(manager) {
            manager.destroy(self.id);
        }
    }

    /// Deep-copies the entity into a new global entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn copy(self, manager: &mut EntityManager) -> EntityResult<EntityRef> {
        manager.copy(self)
    }

    /// The partition scope recorded for the entity.
    #[must_use]
    pub fn scope(self, manager: &EntityManager) -> Scope {
        manager.scope_of(self.id)
    }

    /// Moves the entity into the partition for `scope`.
    pub fn set_scope(self, manager: &mut EntityManager, scope: Scope) -> bool {
        manager.set_scope(self, scope)
    }

    /// Whether the entity is written to storage. Handles that do not resolve
    /// and entities without [`EntityInfo`] count as persistent.
    #[must_use]
    pub fn is_persistent(self, manager: &EntityManager) -> bool {
        !self.exists(manager)
            || manager
                .get_component::<EntityInfo>(self.id)
                .map_or(true, |info| info.persisted)
    }

    /// Whether the entity stays relevant regardless of distance.
    #[must_use]
    pub fn is_always_relevant(self, manager: &EntityManager) -> bool {
        self.get_component::<EntityInfo>(manager)
            .is_some_and(|info| info.always_relevant)
    }

    /// The owning entity, or the null handle.
    #[must_use]
    pub fn owner(self, manager: &EntityManager) -> EntityRef {
        self.get_component::<EntityInfo>(manager)
            .map_or(EntityRef::NULL, |info| info.owner)
    }

    /// Records `owner` in the entity's [`EntityInfo`].
    pub fn set_owner(self, manager: &mut EntityManager, owner: EntityRef) {
        if !self.is_active(manager) {
            return;
        }
        match manager.get_component::<EntityInfo>(self.id) {
            Some(info) if info.owner == owner => {}
            Some(info) => {
                let mut info = info.clone();
                info.owner = owner;
                manager.save_component(self.id, info);
            }
            None => {
                manager.add_component(
                    self.id,
                    EntityInfo {
                        owner,
                        ..EntityInfo::default()
                    },
                );
            }
        }
    }

    /// The prefab the entity was instantiated from.
    #[must_use]
    pub fn parent_prefab(self, manager: &EntityManager) -> Option<Arc<dyn Prefab>> {
        self.get_component::<EntityInfo>(manager)
            .and_then(|info| info.parent_prefab.clone())
    }
}

impl From<EntityId> for EntityRef {
    fn from(id: EntityId) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "EntityRef{{NULL}}")
        } else {
            write!(f, "EntityRef{{id = {}}}", self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    #[test]
    fn test_null_id() {
        assert!(EntityId::NULL.is_null());
        assert_eq!(EntityId::default(), EntityId::NULL);
        assert!(!EntityId::new(1).is_null());
        assert_eq!(EntityId::from(7).raw(), 7);
    }

    #[test]
    fn test_null_ref_is_inert() {
        let mut manager = EntityManager::new();
        let null = EntityRef::NULL;

        assert!(!null.exists(&manager));
        assert!(!null.is_active(&manager));
        assert!(null.add_component(&mut manager, Health(5)).is_none());
        assert!(null.get_component::<Health>(&manager).is_none());
        assert_eq!(null.iterate_components(&manager).count(), 0);
        null.destroy(&mut manager);
        assert_eq!(manager.get_active_entity_count(), 0);
        assert_eq!(null.to_string(), "EntityRef{NULL}");
    }

    #[test]
    fn test_ref_resolves_through_manager() {
        let mut manager = EntityManager::new();
        let entity = manager.create(vec![Box::new(Health(10))]).unwrap();

        assert!(entity.exists(&manager));
        assert!(entity.is_active(&manager));
        assert_eq!(entity.get_component::<Health>(&manager), Some(&Health(10)));
        assert_eq!(entity.to_string(), format!("EntityRef{{id = {}}}", entity.id()));

        assert_eq!(entity.add_component(&mut manager, Health(3)), Some(Health(10)));
        assert_eq!(entity.remove_component::<Health>(&mut manager), Some(Health(3)));
        assert!(!entity.has_component::<Health>(&manager));
    }

    #[test]
    fn test_stale_ref_after_destroy() {
        let mut manager = EntityManager::new();
        let entity = manager.create(vec![Box::new(Health(10))]).unwrap();
        entity.destroy(&mut manager);

        assert!(!entity.exists(&manager));
        assert!(entity.get_component::<Health>(&manager).is_none());
        assert!(entity.add_component(&mut manager, Health(1)).is_none());
        assert!(!manager.has_component::<Health>(entity.id()));
    }

    #[test]
    fn test_owner_and_persistence_flags() {
        let mut manager = EntityManager::new();
        let owner = manager.create(Vec::new()).unwrap();
        let entity = manager.create(Vec::new()).unwrap();

        assert!(entity.is_persistent(&manager));
        assert!(!entity.is_always_relevant(&manager));
        assert_eq!(entity.owner(&manager), EntityRef::NULL);

        entity.set_owner(&mut manager, owner);
        assert_eq!(entity.owner(&manager), owner);
        assert!(entity.parent_prefab(&manager).is_none());
    }
}
