//! # Entity Manager
//!
//! The single entry point for entity mutation. The manager owns:
//!
//! - the id counter and the loaded-id set,
//! - the global cache and the sector caches,
//! - the id→cache map routing every active entity to its partition,
//! - the change/destroy subscribers and the optional event system.
//!
//! ## Threading
//!
//! No internal locking. One thread owns the manager and serializes every
//! mutating call; read-only queries may interleave with each other.
//!
//! ## Reentrancy
//!
//! Subscribers and the event system are called with `&mut EntityManager` and
//! may create, mutate or destroy entities (including the one being processed)
//! or (un)subscribe. Subscriber lists and component type lists are snapshotted
//! before any fan-out.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use super::builder::EntityBuilder;
use super::cache::{CacheId, CacheMut, EntityCache, SectorManager};
use super::component::{find_entity_info, tag_scope, Component, ComponentType, EntityInfo, Scope};
use super::entity::{EntityId, EntityRef};
use super::storage::ComponentTable;
use crate::config::EntityManagerConfig;
use crate::error::{EntityError, EntityResult};
use crate::lifecycle::{
    BeforeEntityCreated, EntityChangeSubscriber, EntityDestroySubscriber, LifecycleEvent,
    LifecycleEventSystem, SubscriberSet,
};
use crate::metadata::{ComponentLibrary, ComponentRegistry, Prefab, PrefabManager};

/// Top-level coordinator of entities, caches and notifications.
pub struct EntityManager {
    config: EntityManagerConfig,
    next_entity_id: u64,
    loaded_ids: HashSet<EntityId>,
    global_cache: EntityCache,
    sector_manager: SectorManager,
    cache_map: HashMap<EntityId, CacheId>,
    change_subscribers: SubscriberSet<dyn EntityChangeSubscriber>,
    destroy_subscribers: SubscriberSet<dyn EntityDestroySubscriber>,
    event_system: Option<Arc<dyn LifecycleEventSystem>>,
    prefab_manager: Option<Arc<dyn PrefabManager>>,
    component_library: Arc<dyn ComponentLibrary>,
}

impl EntityManager {
    /// Creates a manager with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EntityManagerConfig::default())
    }

    /// Creates a manager with the given configuration.
    #[must_use]
    pub fn with_config(config: EntityManagerConfig) -> Self {
        let capacity = config.initial_capacity;
        Self {
            next_entity_id: 1,
            loaded_ids: HashSet::with_capacity(capacity),
            global_cache: EntityCache::new(CacheId::Global),
            sector_manager: SectorManager::new(config.sector_cache_count()),
            cache_map: HashMap::with_capacity(capacity),
            change_subscribers: SubscriberSet::new(),
            destroy_subscribers: SubscriberSet::new(),
            event_system: None,
            prefab_manager: None,
            component_library: Arc::new(ComponentRegistry::new()),
            config,
        }
    }

    /// The active configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &EntityManagerConfig {
        &self.config
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// Attaches the event system that receives lifecycle events.
    pub fn set_event_system(&mut self, event_system: Arc<dyn LifecycleEventSystem>) {
        self.event_system = Some(event_system);
    }

    /// Detaches the event system, returning it.
    pub fn clear_event_system(&mut self) -> Option<Arc<dyn LifecycleEventSystem>> {
        self.event_system.take()
    }

    /// The attached event system.
    #[must_use]
    pub fn event_system(&self) -> Option<&Arc<dyn LifecycleEventSystem>> {
        self.event_system.as_ref()
    }

    /// Attaches the prefab manager used by name-based construction.
    pub fn set_prefab_manager(&mut self, prefab_manager: Arc<dyn PrefabManager>) {
        self.prefab_manager = Some(prefab_manager);
    }

    /// The attached prefab manager.
    #[must_use]
    pub fn prefab_manager(&self) -> Option<&Arc<dyn PrefabManager>> {
        self.prefab_manager.as_ref()
    }

    /// Replaces the component library used for deep copies.
    pub fn set_component_library(&mut self, component_library: Arc<dyn ComponentLibrary>) {
        self.component_library = component_library;
    }

    /// The component library used for deep copies.
    #[must_use]
    pub fn component_library(&self) -> &Arc<dyn ComponentLibrary> {
        &self.component_library
    }

    // =========================================================================
    // Caches
    // =========================================================================

    /// The global cache.
    #[inline]
    #[must_use]
    pub const fn global_cache(&self) -> &EntityCache {
        &self.global_cache
    }

    /// The sector caches.
    #[inline]
    #[must_use]
    pub const fn sector_manager(&self) -> &SectorManager {
        &self.sector_manager
    }

    /// The global cache's component table.
    #[inline]
    #[must_use]
    pub const fn component_store(&self) -> &ComponentTable {
        self.global_cache.component_store()
    }

    /// Creates another sector cache.
    pub fn add_sector_cache(&mut self) -> CacheId {
        let id = self.sector_manager.add_cache();
        tracing::debug!("Added sector cache {:?}", id);
        id
    }

    /// Read access to a partition.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::UnknownCache`] for a sector this manager never
    /// created.
    pub fn cache(&self, id: CacheId) -> EntityResult<&EntityCache> {
        match id {
            CacheId::Global => Ok(&self.global_cache),
            CacheId::Sector(_) => self
                .sector_manager
                .get(id)
                .ok_or(EntityError::UnknownCache(id)),
        }
    }

    /// Partition-scoped mutable access.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::UnknownCache`] for a sector this manager never
    /// created.
    pub fn cache_mut(&mut self, id: CacheId) -> EntityResult<CacheMut<'_>> {
        self.cache(id)?;
        Ok(CacheMut::new(self, id))
    }

    /// The partition that owns the entity, if it has been assigned one.
    #[inline]
    #[must_use]
    pub fn owning_cache(&self, id: EntityId) -> Option<CacheId> {
        self.cache_map.get(&id).copied()
    }

    pub(crate) fn partition(&self, id: CacheId) -> &EntityCache {
        self.sector_manager.get(id).unwrap_or(&self.global_cache)
    }

    fn partition_mut(&mut self, id: CacheId) -> &mut EntityCache {
        match self.sector_manager.get_mut(id) {
            Some(cache) => cache,
            None => &mut self.global_cache,
        }
    }

    fn known_or_global(&self, id: CacheId) -> CacheId {
        if self.cache(id).is_ok() {
            id
        } else {
            tracing::warn!("Unknown cache {:?}, using the global cache", id);
            CacheId::Global
        }
    }

    fn owning_or_global(&self, id: EntityId) -> CacheId {
        self.owning_cache(id).unwrap_or(CacheId::Global)
    }

    fn route_for_write(&self, id: EntityId, operation: &str) -> CacheId {
        if let Some(cache) = self.owning_cache(id) {
            cache
        } else {
            tracing::warn!(
                "Entity {} doesn't have an assigned cache, {} uses the global cache",
                id,
                operation
            );
            CacheId::Global
        }
    }

    fn table_for_read(&self, id: EntityId) -> &ComponentTable {
        if let Some(cache) = self.owning_cache(id) {
            self.partition(cache).component_store()
        } else {
            tracing::trace!("Entity {} doesn't have an assigned cache, reading global", id);
            self.global_cache.component_store()
        }
    }

    // =========================================================================
    // Ids
    // =========================================================================

    /// Reserves the next id and marks it loaded.
    ///
    /// Callers normally go through [`EntityManager::create`]; a bare id has
    /// no cache until components are stored for it.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::IdSpaceExhausted`] when the counter would
    /// overflow.
    pub fn allocate_id(&mut self) -> EntityResult<EntityId> {
        if self.next_entity_id == EntityId::NULL.raw() {
            self.next_entity_id += 1;
        }
        let id = EntityId::new(self.next_entity_id);
        self.next_entity_id = self
            .next_entity_id
            .checked_add(1)
            .ok_or(EntityError::IdSpaceExhausted)?;
        self.loaded_ids.insert(id);
        Ok(id)
    }

    /// The id the next allocation will return.
    #[inline]
    #[must_use]
    pub const fn get_next_id(&self) -> u64 {
        self.next_entity_id
    }

    /// Restores the id counter, e.g. after loading a save.
    ///
    /// The counter never moves backwards; a lower value is ignored.
    pub fn set_next_id(&mut self, next_id: u64) {
        if next_id < self.next_entity_id {
            tracing::warn!(
                "Ignoring attempt to move the id counter back from {} to {}",
                self.next_entity_id,
                next_id
            );
            return;
        }
        self.next_entity_id = next_id;
    }

    /// Whether the id was ever allocated (`id < next id`), active or not.
    #[inline]
    #[must_use]
    pub fn is_existing_entity(&self, id: EntityId) -> bool {
        id.raw() < self.next_entity_id
    }

    /// Whether the id is loaded.
    #[inline]
    #[must_use]
    pub fn is_active_entity(&self, id: EntityId) -> bool {
        self.loaded_ids.contains(&id)
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Creates a global entity with lifecycle events.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn create(&mut self, components: Vec<Box<dyn Component>>) -> EntityResult<EntityRef> {
        self.create_in(CacheId::Global, components, true)
    }

    /// Creates a global entity with no components.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn create_empty(&mut self) -> EntityResult<EntityRef> {
        self.create(Vec::new())
    }

    /// Creates a global entity without `OnAdded`/`OnActivated` events.
    /// `BeforeEntityCreated` is still raised and subscribers are still told.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn create_without_lifecycle_events(
        &mut self,
        components: Vec<Box<dyn Component>>,
    ) -> EntityResult<EntityRef> {
        self.create_in(CacheId::Global, components, false)
    }

    /// Creates an empty entity in the default sector cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn create_sector_entity(&mut self) -> EntityResult<EntityRef> {
        self.create_sector_entity_with(Vec::new())
    }

    /// Creates an entity in the default sector cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn create_sector_entity_with(
        &mut self,
        components: Vec<Box<dyn Component>>,
    ) -> EntityResult<EntityRef> {
        self.create_in(CacheId::DEFAULT_SECTOR, components, true)
    }

    /// Creates a global entity from a prefab.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn create_from_prefab(&mut self, prefab: &Arc<dyn Prefab>) -> EntityResult<EntityRef> {
        let components = self.prefab_components(prefab);
        self.create_in(CacheId::Global, components, true)
    }

    /// Creates a global entity from a named prefab. Unknown names yield the
    /// null handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn create_from_prefab_name(&mut self, name: &str) -> EntityResult<EntityRef> {
        match self.find_prefab(name) {
            Some(prefab) => self.create_from_prefab(&prefab),
            None => Ok(EntityRef::NULL),
        }
    }

    /// Creates a global entity from a prefab without lifecycle events.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn create_entity_without_lifecycle_events_from_prefab(
        &mut self,
        prefab: &Arc<dyn Prefab>,
    ) -> EntityResult<EntityRef> {
        let components = self.prefab_components(prefab);
        self.create_in(CacheId::Global, components, false)
    }

    /// Starts building a global entity.
    #[must_use]
    pub fn new_builder(&mut self) -> EntityBuilder<'_> {
        EntityBuilder::new(self, CacheId::Global)
    }

    /// Starts building a global entity seeded from a prefab.
    #[must_use]
    pub fn new_builder_from_prefab(&mut self, prefab: &Arc<dyn Prefab>) -> EntityBuilder<'_> {
        let components = self.prefab_components(prefab);
        EntityBuilder::with_components(self, CacheId::Global, components)
    }

    /// Starts building from a named prefab; an unknown name gives an empty
    /// builder.
    #[must_use]
    pub fn new_builder_from_prefab_name(&mut self, name: &str) -> EntityBuilder<'_> {
        match self.find_prefab(name) {
            Some(prefab) => self.new_builder_from_prefab(&prefab),
            None => self.new_builder(),
        }
    }

    pub(crate) fn create_in(
        &mut self,
        target: CacheId,
        mut components: Vec<Box<dyn Component>>,
        send_lifecycle_events: bool,
    ) -> EntityResult<EntityRef> {
        let target = self.known_or_global(target);
        if target.is_sector() {
            tag_scope(&mut components, Scope::Sector);
        }

        let id = self.allocate_id()?;
        let entity = EntityRef::new(id);
        self.cache_map.insert(id, target);
        self.partition_mut(target).insert_entity(id);

        let mut components = match self.event_system.clone() {
            Some(event_system) => {
                let prefab = find_entity_info(&components).and_then(|info| info.parent_prefab.clone());
                let mut event = BeforeEntityCreated::new(prefab, components);
                event_system.before_entity_created(self, entity, &mut event);
                if !self.is_active_entity(id) {
                    tracing::debug!("{} was destroyed by BeforeEntityCreated", entity);
                    return Ok(EntityRef::NULL);
                }
                event.into_components()
            }
            None => components,
        };
        if target.is_sector() {
            tag_scope(&mut components, Scope::Sector);
        }

        let target = self.owning_or_global(id);
        let added = self.store_components(target, id, components);
        tracing::trace!("Created {} in {:?} with {} components", entity, target, added.len());

        for component_type in added {
            if !self.is_active_entity(id) {
                break;
            }
            self.notify_component_added(entity, component_type);
            if send_lifecycle_events {
                self.send_event(entity, LifecycleEvent::OnAddedComponent(component_type));
                self.send_event(entity, LifecycleEvent::OnActivatedComponent(component_type));
            }
        }
        Ok(entity)
    }

    fn store_components(
        &mut self,
        target: CacheId,
        id: EntityId,
        components: Vec<Box<dyn Component>>,
    ) -> Vec<ComponentType> {
        let table = self.partition_mut(target).component_store_mut();
        let mut stored = Vec::with_capacity(components.len());
        for component in components {
            let component_type = component.component_type();
            if table.put(id, component).is_none() {
                stored.push(component_type);
            }
        }
        stored
    }

    fn find_prefab(&self, name: &str) -> Option<Arc<dyn Prefab>> {
        let Some(prefab_manager) = &self.prefab_manager else {
            tracing::warn!("No prefab manager attached, cannot resolve prefab '{}'", name);
            return None;
        };
        let prefab = prefab_manager.get_prefab(name);
        if prefab.is_none() {
            tracing::warn!("Unable to instantiate unknown prefab: '{}'", name);
        }
        prefab
    }

    fn prefab_components(&self, prefab: &Arc<dyn Prefab>) -> Vec<Box<dyn Component>> {
        let mut components: Vec<Box<dyn Component>> = prefab
            .components()
            .iter()
            .filter(|c| !(***c).is::<EntityInfo>())
            .filter_map(|c| self.copy_component(&**c))
            .collect();
        components.push(Box::new(EntityInfo::from_prefab(prefab)));
        components
    }

    fn copy_component(&self, component: &dyn Component) -> Option<Box<dyn Component>> {
        let copy = self.component_library.copy(component);
        if copy.is_none() {
            tracing::warn!(
                "Component library cannot copy {}, component skipped",
                component.component_type()
            );
        }
        copy
    }

    // =========================================================================
    // Restore / deactivation
    // =========================================================================

    /// Restores a previously allocated entity, routing by the scope of its
    /// [`EntityInfo`].
    ///
    /// Sector-scoped entities return to the sector cache they were
    /// deactivated from, or the default sector. Ids that were never
    /// allocated are rejected with the null handle.
    pub fn create_entity_with_id(
        &mut self,
        id: EntityId,
        components: Vec<Box<dyn Component>>,
    ) -> EntityRef {
        let target = match find_entity_info(&components).map(|info| info.scope) {
            Some(Scope::Sector) => self
                .owning_cache(id)
                .filter(|cache| cache.is_sector())
                .unwrap_or(CacheId::DEFAULT_SECTOR),
            _ => CacheId::Global,
        };
        self.restore_in(target, id, components)
    }

    pub(crate) fn restore_in(
        &mut self,
        target: CacheId,
        id: EntityId,
        components: Vec<Box<dyn Component>>,
    ) -> EntityRef {
        if id.is_null() || !self.is_existing_entity(id) {
            tracing::error!("Prevented attempt to create entity with an invalid id {}", id);
            return EntityRef::NULL;
        }
        let target = self.known_or_global(target);
        if !self.loaded_ids.insert(id) {
            tracing::warn!("Restoring entity {} which is already active", id);
        }

        if let Some(previous) = self.owning_cache(id) {
            let cache = self.partition_mut(previous);
            cache.remove_entity(id);
            cache.component_store_mut().remove_all(id);
        }
        self.cache_map.insert(id, target);
        self.partition_mut(target).insert_entity(id);
        self.store_components(target, id, components);

        let entity = EntityRef::new(id);
        let restored = self.partition(target).component_store().component_types_of(id);
        tracing::debug!("Restored {} into {:?} with {} components", entity, target, restored.len());
        for subscriber in self.change_subscribers.snapshot() {
            subscriber.on_reactivation(self, entity, &restored);
        }
        entity
    }

    /// Unloads an entity for storage and hands back its components.
    ///
    /// Raises `BeforeDeactivateComponent` per component, then tells change
    /// subscribers which types are about to go while the entity is still
    /// stored and active. Only then are the components removed and the id
    /// marked inactive. The id stays allocated and keeps its cache
    /// assignment, so [`EntityManager::create_entity_with_id`] can bring it
    /// back.
    pub fn deactivate_for_storage(&mut self, entity: EntityRef) -> Vec<Box<dyn Component>> {
        let id = entity.id();
        if !entity.exists(self) || !self.is_active_entity(id) {
            return Vec::new();
        }

        let types = self.table_for_read(id).component_types_of(id);
        for component_type in types {
            self.send_event(entity, LifecycleEvent::BeforeDeactivateComponent(component_type));
        }
        if !self.is_active_entity(id) {
            return Vec::new();
        }

        let types = self.table_for_read(id).component_types_of(id);
        for subscriber in self.change_subscribers.snapshot() {
            subscriber.on_before_deactivation(self, entity, &types);
        }
        if !self.is_active_entity(id) {
            return Vec::new();
        }

        let owner = self.owning_or_global(id);
        let cache = self.partition_mut(owner);
        let components = cache.component_store_mut().remove_all(id);
        cache.remove_entity(id);
        self.loaded_ids.remove(&id);
        tracing::debug!("Deactivated {} with {} components", entity, components.len());
        components
    }

    // =========================================================================
    // Destruction
    // =========================================================================

    /// Destroys an entity.
    ///
    /// `BeforeDeactivateComponent` then `BeforeRemoveComponent` are raised for
    /// every component while it is still stored; then change subscribers hear
    /// each removal and destroy subscribers hear the destruction, once.
    pub fn destroy(&mut self, id: EntityId) {
        if !self.is_active_entity(id) {
            tracing::debug!("Ignoring destroy of inactive entity {}", id);
            return;
        }
        let entity = EntityRef::new(id);

        let types = self.table_for_read(id).component_types_of(id);
        for &component_type in &types {
            self.send_event(entity, LifecycleEvent::BeforeDeactivateComponent(component_type));
        }
        if !self.is_active_entity(id) {
            return;
        }
        for &component_type in &types {
            self.send_event(entity, LifecycleEvent::BeforeRemoveComponent(component_type));
        }
        if !self.is_active_entity(id) {
            return;
        }
        self.loaded_ids.remove(&id);

        for component_type in self.table_for_read(id).component_types_of(id) {
            self.notify_component_removed(entity, component_type);
        }
        for subscriber in self.destroy_subscribers.snapshot() {
            subscriber.on_entity_destroyed(self, entity);
        }

        self.purge(id);
        tracing::trace!("Destroyed {}", entity);
    }

    /// Destroys an entity without raising events or notifying subscribers.
    pub fn destroy_without_events(&mut self, entity: EntityRef) {
        if self.is_active_entity(entity.id()) {
            self.purge(entity.id());
            tracing::trace!("Destroyed {} without events", entity);
        }
    }

    fn purge(&mut self, id: EntityId) {
        let owner = self.cache_map.remove(&id).unwrap_or(CacheId::Global);
        let cache = self.partition_mut(owner);
        cache.component_store_mut().remove_all(id);
        cache.remove_entity(id);
        self.loaded_ids.remove(&id);
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// The entity's `T`.
    #[must_use]
    pub fn get_component<T: Component>(&self, id: EntityId) -> Option<&T> {
        self.table_for_read(id).get::<T>(id)
    }

    /// The entity's component of the given type.
    #[must_use]
    pub fn get_component_dyn(&self, id: EntityId, component_type: ComponentType) -> Option<&dyn Component> {
        self.table_for_read(id).get_dyn(id, component_type)
    }

    /// Mutable access to the entity's `T`, without notifications.
    ///
    /// Announce the edit with [`EntityManager::save_component`] when
    /// observers need to hear about it.
    pub fn get_component_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        let owner = self.owning_or_global(id);
        self.partition_mut(owner).component_store_mut().get_mut::<T>(id)
    }

    /// Whether the entity has a `T` in any partition.
    #[must_use]
    pub fn has_component<T: Component>(&self, id: EntityId) -> bool {
        self.has_component_dyn(id, ComponentType::of::<T>())
    }

    /// Whether the entity has a component of the given type in any partition.
    #[must_use]
    pub fn has_component_dyn(&self, id: EntityId, component_type: ComponentType) -> bool {
        self.global_cache.has_component_dyn(id, component_type)
            || self.sector_manager.has_component_dyn(id, component_type)
    }

    /// Iterates the entity's components in its owning partition.
    pub fn iterate_components(&self, id: EntityId) -> impl Iterator<Item = &dyn Component> + '_ {
        self.table_for_read(id).iterate_components(id)
    }

    /// Adds or replaces a component, returning the replaced value.
    ///
    /// A new type notifies subscribers (added) then raises `OnAddedComponent`
    /// and `OnActivatedComponent`; a replacement notifies subscribers
    /// (changed) then raises `OnChangedComponent`.
    pub fn add_component<T: Component>(&mut self, id: EntityId, component: T) -> Option<T> {
        self.add_component_boxed(id, Box::new(component))
            .and_then(|previous| previous.downcast::<T>().ok())
    }

    /// Type-erased [`EntityManager::add_component`].
    pub fn add_component_boxed(
        &mut self,
        id: EntityId,
        component: Box<dyn Component>,
    ) -> Option<Box<dyn Component>> {
        if id.is_null() {
            tracing::warn!("Ignoring {} added to the null entity", component.component_type());
            return None;
        }
        let component_type = component.component_type();
        let owner = self.route_for_write(id, "add_component");
        let previous = self.partition_mut(owner).component_store_mut().put(id, component);
        if previous.is_some() && self.config.warn_on_component_overwrite {
            tracing::warn!(
                "Adding a component ({}) over an existing component for entity {}",
                component_type,
                id
            );
        }
        self.announce_write(EntityRef::new(id), component_type, previous.is_none());
        previous
    }

    /// Stores a modified component, returning the previous value.
    ///
    /// Same notifications as [`EntityManager::add_component`]; saving a type
    /// the entity did not have is logged.
    pub fn save_component<T: Component>(&mut self, id: EntityId, component: T) -> Option<T> {
        self.save_component_boxed(id, Box::new(component))
            .and_then(|previous| previous.downcast::<T>().ok())
    }

    /// Type-erased [`EntityManager::save_component`].
    pub fn save_component_boxed(
        &mut self,
        id: EntityId,
        component: Box<dyn Component>,
    ) -> Option<Box<dyn Component>> {
        if id.is_null() {
            tracing::warn!("Ignoring {} saved to the null entity", component.component_type());
            return None;
        }
        let component_type = component.component_type();
        let owner = self.route_for_write(id, "save_component");
        let previous = self.partition_mut(owner).component_store_mut().put(id, component);
        if previous.is_none() {
            tracing::warn!(
                "Saving a component ({}) that doesn't belong to entity {}",
                component_type,
                id
            );
        }
        self.announce_write(EntityRef::new(id), component_type, previous.is_none());
        previous
    }

    /// Removes the entity's `T` from the global cache.
    ///
    /// Raises `BeforeDeactivateComponent` and `BeforeRemoveComponent` while
    /// the component is still stored, removes it, then notifies subscribers.
    /// Sector entities are not consulted.
    pub fn remove_component<T: Component>(&mut self, id: EntityId) -> Option<T> {
        self.remove_component_dyn(id, ComponentType::of::<T>())
            .and_then(|removed| removed.downcast::<T>().ok())
    }

    /// Type-erased [`EntityManager::remove_component`].
    pub fn remove_component_dyn(
        &mut self,
        id: EntityId,
        component_type: ComponentType,
    ) -> Option<Box<dyn Component>> {
        if !self.global_cache.has_component_dyn(id, component_type) {
            return None;
        }
        let entity = EntityRef::new(id);
        self.send_event(entity, LifecycleEvent::BeforeDeactivateComponent(component_type));
        self.send_event(entity, LifecycleEvent::BeforeRemoveComponent(component_type));

        let removed = self
            .global_cache
            .component_store_mut()
            .remove(id, component_type);
        if removed.is_some() {
            self.notify_component_removed(entity, component_type);
        }
        removed
    }

    fn announce_write(&mut self, entity: EntityRef, component_type: ComponentType, added: bool) {
        if added {
            self.notify_component_added(entity, component_type);
            self.send_event(entity, LifecycleEvent::OnAddedComponent(component_type));
            self.send_event(entity, LifecycleEvent::OnActivatedComponent(component_type));
        } else {
            self.notify_component_changed(entity, component_type);
            self.send_event(entity, LifecycleEvent::OnChangedComponent(component_type));
        }
    }

    // =========================================================================
    // Copying
    // =========================================================================

    /// Deep-copies every component of `entity` into a new global entity.
    ///
    /// Returns the null handle if `entity` does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted.
    pub fn copy(&mut self, entity: EntityRef) -> EntityResult<EntityRef> {
        if !entity.exists(self) {
            return Ok(EntityRef::NULL);
        }
        let mut components: Vec<Box<dyn Component>> = self.copy_components(entity).into_values().collect();
        if find_entity_info(&components).is_some() {
            tag_scope(&mut components, Scope::Global);
        }
        self.create_in(CacheId::Global, components, true)
    }

    /// Deep copies of every component of `entity`, keyed by type.
    #[must_use]
    pub fn copy_components(&self, entity: EntityRef) -> BTreeMap<ComponentType, Box<dyn Component>> {
        if entity.is_null() {
            return BTreeMap::new();
        }
        self.iterate_components(entity.id())
            .filter_map(|component| self.copy_component(component))
            .map(|copy| (copy.component_type(), copy))
            .collect()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Handle for the entity if a partition holds it, else the null handle.
    #[must_use]
    pub fn get_existing_entity(&self, id: EntityId) -> EntityRef {
        let entity = self.global_cache.get_existing_entity(id);
        if entity.is_null() {
            self.sector_manager.get_existing_entity(id)
        } else {
            entity
        }
    }

    /// Handle for an allocated id; the null handle for id 0 or ids never
    /// allocated.
    #[must_use]
    pub fn get_entity(&self, id: EntityId) -> EntityRef {
        if id.is_null() || !self.is_existing_entity(id) {
            EntityRef::NULL
        } else {
            EntityRef::new(id)
        }
    }

    /// Every active entity: global cache first, then each sector cache.
    pub fn get_all_entities(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.global_cache
            .get_all_entities()
            .chain(self.sector_manager.get_all_entities())
    }

    /// Entities holding every listed type: global cache first, then each
    /// sector cache. The sequence is materialized up front, so it stays
    /// stable while the caller mutates the manager.
    #[must_use]
    pub fn get_entities_with(&self, component_types: &[ComponentType]) -> Vec<EntityRef> {
        let mut entities = self.global_cache.get_entities_with(component_types);
        entities.extend(self.sector_manager.get_entities_with(component_types));
        entities
    }

    /// Number of active entities across every partition.
    #[must_use]
    pub fn get_active_entity_count(&self) -> usize {
        self.global_cache.get_active_entity_count() + self.sector_manager.get_active_entity_count()
    }

    /// Number of entities holding every listed type, across every partition.
    #[must_use]
    pub fn get_count_of_entities_with(&self, component_types: &[ComponentType]) -> usize {
        self.global_cache.get_count_of_entities_with(component_types)
            + self.sector_manager.get_count_of_entities_with(component_types)
    }

    /// Every `T` in the global cache, by entity id.
    pub fn list_components<T: Component>(&self) -> impl Iterator<Item = (EntityRef, &T)> + '_ {
        self.global_cache.list_components::<T>()
    }

    // =========================================================================
    // Scope
    // =========================================================================

    /// Scope recorded in the entity's [`EntityInfo`], else that of its cache.
    #[must_use]
    pub fn scope_of(&self, id: EntityId) -> Scope {
        match self.get_component::<EntityInfo>(id) {
            Some(info) => info.scope,
            None => self.owning_or_global(id).scope(),
        }
    }

    /// Moves an active entity into the partition for `scope` and records the
    /// scope in its [`EntityInfo`].
    ///
    /// Components move without notifications; only the `EntityInfo` write is
    /// announced. Returns `false` if the entity is not active.
    pub fn set_scope(&mut self, entity: EntityRef, scope: Scope) -> bool {
        let id = entity.id();
        if entity.is_null() || !self.is_active_entity(id) {
            return false;
        }
        let from = self.owning_or_global(id);
        let to = match scope {
            Scope::Global => CacheId::Global,
            Scope::Sector if from.is_sector() => from,
            Scope::Sector => CacheId::DEFAULT_SECTOR,
        };

        if from != to {
            let source = self.partition_mut(from);
            source.remove_entity(id);
            let components = source.component_store_mut().remove_all(id);
            self.cache_map.insert(id, to);
            let destination = self.partition_mut(to);
            destination.insert_entity(id);
            for component in components {
                destination.component_store_mut().put(id, component);
            }
            tracing::debug!("Moved {} from {:?} to {:?}", entity, from, to);
        }

        match self.get_component::<EntityInfo>(id) {
            Some(info) if info.scope == scope => {}
            Some(info) => {
                let mut info = info.clone();
                info.scope = scope;
                self.save_component(id, info);
            }
            None => {
                self.add_component(id, EntityInfo::with_scope(scope));
            }
        }
        true
    }

    // =========================================================================
    // Subscribers
    // =========================================================================

    /// Registers a change subscriber. The manager holds it weakly; returns
    /// `false` if it was already registered.
    pub fn subscribe_for_changes<S: EntityChangeSubscriber + 'static>(&mut self, subscriber: &Arc<S>) -> bool {
        let weak: Weak<S> = Arc::downgrade(subscriber);
        self.change_subscribers.insert(weak)
    }

    /// Unregisters a change subscriber.
    pub fn unsubscribe<S: EntityChangeSubscriber + 'static>(&mut self, subscriber: &Arc<S>) -> bool {
        let weak: Weak<S> = Arc::downgrade(subscriber);
        let weak: Weak<dyn EntityChangeSubscriber> = weak;
        self.change_subscribers.remove(&weak)
    }

    /// Registers a destroy subscriber. The manager holds it weakly; returns
    /// `false` if it was already registered.
    pub fn subscribe_for_destruction<S: EntityDestroySubscriber + 'static>(&mut self, subscriber: &Arc<S>) -> bool {
        let weak: Weak<S> = Arc::downgrade(subscriber);
        self.destroy_subscribers.insert(weak)
    }

    /// Unregisters a destroy subscriber.
    pub fn unsubscribe_from_destruction<S: EntityDestroySubscriber + 'static>(
        &mut self,
        subscriber: &Arc<S>,
    ) -> bool {
        let weak: Weak<S> = Arc::downgrade(subscriber);
        let weak: Weak<dyn EntityDestroySubscriber> = weak;
        self.destroy_subscribers.remove(&weak)
    }

    /// Number of live change subscribers.
    #[must_use]
    pub fn change_subscriber_count(&self) -> usize {
        self.change_subscribers.len()
    }

    /// Number of live destroy subscribers.
    #[must_use]
    pub fn destroy_subscriber_count(&self) -> usize {
        self.destroy_subscribers.len()
    }

    fn notify_component_added(&mut self, entity: EntityRef, component_type: ComponentType) {
        for subscriber in self.change_subscribers.snapshot() {
            subscriber.on_entity_component_added(self, entity, component_type);
        }
    }

    fn notify_component_removed(&mut self, entity: EntityRef, component_type: ComponentType) {
        for subscriber in self.change_subscribers.snapshot() {
            subscriber.on_entity_component_removed(self, entity, component_type);
        }
    }

    fn notify_component_changed(&mut self, entity: EntityRef, component_type: ComponentType) {
        for subscriber in self.change_subscribers.snapshot() {
            subscriber.on_entity_component_change(self, entity, component_type);
        }
    }

    fn send_event(&mut self, entity: EntityRef, event: LifecycleEvent) {
        if let Some(event_system) = self.event_system.clone() {
            event_system.send(self, entity, event);
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Discards every entity and resets the id counter to 1.
    ///
    /// Subscribers, collaborators and the sector caches themselves are kept.
    pub fn clear(&mut self) {
        self.global_cache.clear();
        self.sector_manager.clear();
        self.cache_map.clear();
        self.next_entity_id = 1;
        self.loaded_ids.clear();
        tracing::debug!("Entity manager cleared");
    }
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityManager")
            .field("next_entity_id", &self.next_entity_id)
            .field("loaded", &self.loaded_ids.len())
            .field("global", &self.global_cache.get_active_entity_count())
            .field("sector_caches", &self.sector_manager.cache_count())
            .field("change_subscribers", &self.change_subscribers.len())
            .field("destroy_subscribers", &self.destroy_subscribers.len())
            .field("event_system", &self.event_system.is_some())
            .finish_non_exhaustive()
    }
}
