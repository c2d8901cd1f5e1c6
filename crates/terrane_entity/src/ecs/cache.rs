//! # Entity Caches
//!
//! An [`EntityCache`] is one storage partition: a [`ComponentTable`] plus the
//! set of entities currently active in it. The manager owns a global cache
//! and a [`SectorManager`] holding one or more sector caches.
//!
//! ```text
//! EntityManager
//!   global_cache       CacheId::Global
//!   sector_manager
//!     caches[0]        CacheId::Sector(0)   (default sector)
//!     caches[1]        CacheId::Sector(1)
//! ```
//!
//! Caches are plain storage. Everything that must raise notifications goes
//! through the manager, or through [`CacheMut`] for partition-scoped calls.

use std::collections::BTreeSet;

use super::builder::EntityBuilder;
use super::component::{Component, ComponentType, Scope};
use super::entity::{EntityId, EntityRef};
use super::manager::EntityManager;
use super::storage::ComponentTable;
use crate::error::EntityResult;

/// Names a cache partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheId {
    /// The global cache.
    Global,
    /// A sector cache, by index.
    Sector(u32),
}

impl CacheId {
    /// The sector cache that sector-scoped entities use by default.
    pub const DEFAULT_SECTOR: Self = Self::Sector(0);

    /// The scope recorded for entities in this partition.
    #[inline]
    #[must_use]
    pub const fn scope(self) -> Scope {
        match self {
            Self::Global => Scope::Global,
            Self::Sector(_) => Scope::Sector,
        }
    }

    /// Whether this names a sector cache.
    #[inline]
    #[must_use]
    pub const fn is_sector(self) -> bool {
        matches!(self, Self::Sector(_))
    }
}

/// One storage partition.
#[derive(Debug)]
pub struct EntityCache {
    id: CacheId,
    table: ComponentTable,
    entities: BTreeSet<EntityId>,
}

impl EntityCache {
    pub(crate) fn new(id: CacheId) -> Self {
        Self {
            id,
            table: ComponentTable::new(),
            entities: BTreeSet::new(),
        }
    }

    /// The partition this cache implements.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> CacheId {
        self.id
    }

    /// Read access to the partition's component table.
    #[inline]
    #[must_use]
    pub const fn component_store(&self) -> &ComponentTable {
        &self.table
    }

    pub(crate) fn component_store_mut(&mut self) -> &mut ComponentTable {
        &mut self.table
    }

    /// Whether the entity is active in this partition.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains(&id)
    }

    /// Handle for the entity if it is active here, else the null handle.
    #[must_use]
    pub fn get_existing_entity(&self, id: EntityId) -> EntityRef {
        if self.contains(id) {
            EntityRef::new(id)
        } else {
            EntityRef::NULL
        }
    }

    /// Every active entity, ascending by id.
    pub fn get_all_entities(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.entities.iter().copied().map(EntityRef::new)
    }

    /// Active entities holding every listed type, ascending by id.
    ///
    /// An empty type list matches every active entity.
    #[must_use]
    pub fn get_entities_with(&self, component_types: &[ComponentType]) -> Vec<EntityRef> {
        if component_types.is_empty() {
            return self.get_all_entities().collect();
        }
        self.table
            .entities_with(component_types)
            .into_iter()
            .filter(|id| self.contains(*id))
            .map(EntityRef::new)
            .collect()
    }

    /// Number of active entities.
    #[inline]
    #[must_use]
    pub fn get_active_entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of active entities holding every listed type.
    #[must_use]
    pub fn get_count_of_entities_with(&self, component_types: &[ComponentType]) -> usize {
        self.get_entities_with(component_types).len()
    }

    /// Whether the entity holds a component of the given type here.
    #[must_use]
    pub fn has_component_dyn(&self, id: EntityId, component_type: ComponentType) -> bool {
        self.table.contains(id, component_type)
    }

    /// Whether the entity holds a `T` here.
    #[must_use]
    pub fn has_component<T: Component>(&self, id: EntityId) -> bool {
        self.has_component_dyn(id, ComponentType::of::<T>())
    }

    /// The entity's `T`, if stored here.
    #[must_use]
    pub fn get_component<T: Component>(&self, id: EntityId) -> Option<&T> {
        self.table.get::<T>(id)
    }

    /// Every `T` stored here, with its entity.
    pub fn list_components<T: Component>(&self) -> impl Iterator<Item = (EntityRef, &T)> + '_ {
        self.table
            .iter::<T>()
            .map(|(id, component)| (EntityRef::new(id), component))
    }

    pub(crate) fn insert_entity(&mut self, id: EntityId) -> bool {
        self.entities.insert(id)
    }

    pub(crate) fn remove_entity(&mut self, id: EntityId) -> bool {
        self.entities.remove(&id)
    }

    pub(crate) fn clear(&mut self) {
        self.table.clear();
        self.entities.clear();
    }
}

/// Owner of the sector caches.
#[derive(Debug)]
pub struct SectorManager {
    caches: Vec<EntityCache>,
}

impl SectorManager {
    /// Creates `count` sector caches, at least one.
    pub(crate) fn new(count: usize) -> Self {
        let mut manager = Self {
            caches: Vec::with_capacity(count.max(1)),
        };
        while manager.caches.len() < count.max(1) {
            manager.add_cache();
        }
        manager
    }

    /// Appends a sector cache and returns its id.
    pub(crate) fn add_cache(&mut self) -> CacheId {
        let index = u32::try_from(self.caches.len()).unwrap_or(u32::MAX);
        let id = CacheId::Sector(index);
        self.caches.push(EntityCache::new(id));
        id
    }

    /// The sector cache with the given id.
    #[must_use]
    pub fn get(&self, id: CacheId) -> Option<&EntityCache> {
        match id {
            CacheId::Sector(index) => self.caches.get(usize::try_from(index).ok()?),
            CacheId::Global => None,
        }
    }

    pub(crate) fn get_mut(&mut self, id: CacheId) -> Option<&mut EntityCache> {
        match id {
            CacheId::Sector(index) => self.caches.get_mut(usize::try_from(index).ok()?),
            CacheId::Global => None,
        }
    }

    /// Every sector cache, by index.
    pub fn caches(&self) -> impl Iterator<Item = &EntityCache> + '_ {
        self.caches.iter()
    }

    /// Number of sector caches.
    #[inline]
    #[must_use]
    pub fn cache_count(&self) -> usize {
        self.caches.len()
    }

    /// Every active sector entity, cache by cache.
    pub fn get_all_entities(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.caches.iter().flat_map(|cache| cache.get_all_entities())
    }

    /// Handle for the entity if some sector cache holds it.
    #[must_use]
    pub fn get_existing_entity(&self, id: EntityId) -> EntityRef {
        self.caches
            .iter()
            .map(|cache| cache.get_existing_entity(id))
            .find(|entity| !entity.is_null())
            .unwrap_or(EntityRef::NULL)
    }

    /// Sector entities holding every listed type, cache by cache.
    #[must_use]
    pub fn get_entities_with(&self, component_types: &[ComponentType]) -> Vec<EntityRef> {
        self.caches
            .iter()
            .flat_map(|cache| cache.get_entities_with(component_types))
            .collect()
    }

    /// Number of active sector entities.
    #[must_use]
    pub fn get_active_entity_count(&self) -> usize {
        self.caches.iter().map(EntityCache::get_active_entity_count).sum()
    }

    /// Number of sector entities holding every listed type.
    #[must_use]
    pub fn get_count_of_entities_with(&self, component_types: &[ComponentType]) -> usize {
        self.caches
            .iter()
            .map(|cache| cache.get_count_of_entities_with(component_types))
            .sum()
    }

    /// Whether any sector cache stores the component for the entity.
    #[must_use]
    pub fn has_component_dyn(&self, id: EntityId, component_type: ComponentType) -> bool {
        self.caches
            .iter()
            .any(|cache| cache.has_component_dyn(id, component_type))
    }

    pub(crate) fn clear(&mut self) {
        for cache in &mut self.caches {
            cache.clear();
        }
    }
}

/// Partition-scoped access to the manager.
///
/// Obtained from [`EntityManager::cache_mut`]. Entities created here live in
/// this partition; notifications still flow through the manager.
pub struct CacheMut<'m> {
    manager: &'m mut EntityManager,
    target: CacheId,
}

impl<'m> CacheMut<'m> {
    pub(crate) fn new(manager: &'m mut EntityManager, target: CacheId) -> Self {
        Self { manager, target }
    }

    /// The partition this handle targets.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> CacheId {
        self.target
    }

    /// Read access to the partition.
    #[must_use]
    pub fn cache(&self) -> &EntityCache {
        self.manager.partition(self.target)
    }

    /// Creates an entity in this partition with lifecycle events.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn create(&mut self, components: Vec<Box<dyn Component>>) -> EntityResult<EntityRef> {
        self.manager.create_in(self.target, components, true)
    }

    /// Creates an entity in this partition without lifecycle events.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn create_without_lifecycle_events(
        &mut self,
        components: Vec<Box<dyn Component>>,
    ) -> EntityResult<EntityRef> {
        self.manager.create_in(self.target, components, false)
    }

    /// Restores a previously allocated entity into this partition.
    pub fn create_with_id(&mut self, id: EntityId, components: Vec<Box<dyn Component>>) -> EntityRef {
        self.manager.restore_in(self.target, id, components)
    }

    /// Destroys the entity if this partition owns it.
    pub fn destroy(&mut self, id: EntityId) {
        if self.owns(id) {
            self.manager.destroy(id);
        }
    }

    /// Destroys the entity without notifications if this partition owns it.
    pub fn destroy_without_events(&mut self, entity: EntityRef) {
        if self.owns(entity.id()) {
            self.manager.destroy_without_events(entity);
        }
    }

    /// Starts building an entity in this partition.
    #[must_use]
    pub fn new_builder(&mut self) -> EntityBuilder<'_> {
        EntityBuilder::new(self.manager, self.target)
    }

    /// Handle for the entity if it is active here.
    #[must_use]
    pub fn get_existing_entity(&self, id: EntityId) -> EntityRef {
        self.cache().get_existing_entity(id)
    }

    /// Every active entity in this partition.
    #[must_use]
    pub fn get_all_entities(&self) -> Vec<EntityRef> {
        self.cache().get_all_entities().collect()
    }

    /// Entities in this partition holding every listed type.
    #[must_use]
    pub fn get_entities_with(&self, component_types: &[ComponentType]) -> Vec<EntityRef> {
        self.cache().get_entities_with(component_types)
    }

    /// Number of active entities in this partition.
    #[must_use]
    pub fn get_active_entity_count(&self) -> usize {
        self.cache().get_active_entity_count()
    }

    fn owns(&self, id: EntityId) -> bool {
        self.manager.owning_cache(id) == Some(self.target)
    }
}
