//! # Sector Partition Tests
//!
//! Ownership of entities across the global cache and sector caches: routing,
//! scope migration, partition-scoped handles, and the deactivate/restore
//! round trip through storage.
//!
//! Run with: cargo test -p terrane_entity --test sector_partition_test

mod common;

use std::sync::Arc;

use common::{health_type, position, position_type, Health, Note, Position, Recorder, Tag};
use parking_lot::Mutex;
use terrane_entity::{
    BeforeEntityCreated, CacheId, ComponentType, EntityChangeSubscriber, EntityError, EntityId,
    EntityInfo, EntityManager, EntityManagerConfig, EntityRef, LifecycleEvent, LifecycleEventSystem,
    Scope,
};

fn owners(manager: &EntityManager, entity: EntityRef) -> usize {
    let global = usize::from(manager.global_cache().contains(entity.id()));
    let sectors = manager
        .sector_manager()
        .caches()
        .filter(|cache| cache.contains(entity.id()))
        .count();
    global + sectors
}

// ============================================================================
// OWNERSHIP
// ============================================================================

#[test]
fn test_every_active_entity_has_one_owner() {
    let mut manager = EntityManager::with_config(EntityManagerConfig {
        sector_caches: 3,
        ..EntityManagerConfig::default()
    });
    assert_eq!(manager.sector_manager().cache_count(), 3);

    let mut entities = Vec::new();
    entities.push(manager.create(vec![Box::new(Health(1))]).unwrap());
    entities.push(manager.create_sector_entity_with(vec![Box::new(Health(2))]).unwrap());
    entities.push(
        manager
            .cache_mut(CacheId::Sector(2))
            .unwrap()
            .create(vec![Box::new(Health(3))])
            .unwrap(),
    );

    for &entity in &entities {
        assert_eq!(owners(&manager, entity), 1, "{entity} owned once");
        assert!(manager.has_component::<Health>(entity.id()));
    }
    assert_eq!(manager.owning_cache(entities[0].id()), Some(CacheId::Global));
    assert_eq!(manager.owning_cache(entities[1].id()), Some(CacheId::DEFAULT_SECTOR));
    assert_eq!(manager.owning_cache(entities[2].id()), Some(CacheId::Sector(2)));

    assert_eq!(manager.get_active_entity_count(), 3);
    assert_eq!(manager.get_count_of_entities_with(&[health_type()]), 3);
    assert_eq!(manager.get_entities_with(&[health_type()]), entities);
    assert_eq!(manager.get_all_entities().collect::<Vec<_>>(), entities);
}

#[test]
fn test_sector_entities_carry_sector_scope() {
    let mut manager = EntityManager::new();
    let global = manager.create(vec![Box::new(Health(1))]).unwrap();
    let sector = manager.create_sector_entity().unwrap();

    assert_eq!(global.scope(&manager), Scope::Global);
    assert!(!global.has_component::<EntityInfo>(&manager));
    assert_eq!(sector.scope(&manager), Scope::Sector);
    assert!(sector.has_component::<EntityInfo>(&manager));
}

#[test]
fn test_global_and_sector_sets_are_disjoint() {
    let mut manager = EntityManager::new();
    let global = manager.create(vec![Box::new(Tag("g"))]).unwrap();
    let sector = manager.create_sector_entity_with(vec![Box::new(Tag("s"))]).unwrap();

    let global_ids: Vec<_> = manager.global_cache().get_all_entities().collect();
    let sector_ids: Vec<_> = manager.sector_manager().get_all_entities().collect();
    assert_eq!(global_ids, vec![global]);
    assert_eq!(sector_ids, vec![sector]);

    assert_eq!(manager.list_components::<Tag>().count(), 1);
    assert_eq!(manager.get_existing_entity(sector.id()), sector);
    assert_eq!(manager.global_cache().get_existing_entity(sector.id()), EntityRef::NULL);
}

#[test]
fn test_remove_component_ignores_sector_entities() {
    let mut manager = EntityManager::new();
    let sector = manager.create_sector_entity_with(vec![Box::new(Health(4))]).unwrap();

    assert!(manager.remove_component::<Health>(sector.id()).is_none());
    assert_eq!(sector.get_component::<Health>(&manager), Some(&Health(4)));

    sector.destroy(&mut manager);
    assert!(!sector.exists(&manager));
    assert_eq!(manager.sector_manager().get_active_entity_count(), 0);
}

// ============================================================================
// SCOPE MIGRATION
// ============================================================================

#[test]
fn test_set_scope_moves_components() {
    let mut manager = EntityManager::new();
    let recorder = Recorder::new();
    let entity = manager
        .create(vec![Box::new(Health(9)), Box::new(position(1, 2))])
        .unwrap();
    recorder.attach_all(&mut manager);

    assert!(entity.set_scope(&mut manager, Scope::Sector));
    assert_eq!(manager.owning_cache(entity.id()), Some(CacheId::DEFAULT_SECTOR));
    assert_eq!(owners(&manager, entity), 1);
    assert_eq!(entity.get_component::<Health>(&manager), Some(&Health(9)));
    assert_eq!(entity.get_component::<Position>(&manager), Some(&position(1, 2)));
    assert_eq!(entity.scope(&manager), Scope::Sector);
    assert!(manager.global_cache().component_store().is_empty());

    // Only the EntityInfo write is announced.
    assert_eq!(recorder.count(|n| matches!(n, Note::Added(..))), 1);
    assert_eq!(recorder.count(|n| matches!(n, Note::Removed(..))), 0);
    recorder.take();

    assert!(entity.set_scope(&mut manager, Scope::Global));
    assert_eq!(manager.owning_cache(entity.id()), Some(CacheId::Global));
    assert_eq!(entity.scope(&manager), Scope::Global);
    assert_eq!(recorder.count(|n| matches!(n, Note::Changed(..))), 1);
    assert_eq!(manager.sector_manager().get_active_entity_count(), 0);
}

#[test]
fn test_set_scope_on_inactive_entity_fails() {
    let mut manager = EntityManager::new();
    let entity = manager.create_empty().unwrap();
    entity.destroy(&mut manager);

    assert!(!entity.set_scope(&mut manager, Scope::Sector));
    assert!(!EntityRef::NULL.set_scope(&mut manager, Scope::Sector));
}

#[test]
fn test_set_scope_keeps_sector_index() {
    let mut manager = EntityManager::new();
    let extra = manager.add_sector_cache();
    assert_eq!(extra, CacheId::Sector(1));

    let entity = manager.cache_mut(extra).unwrap().create(Vec::new()).unwrap();
    assert!(entity.set_scope(&mut manager, Scope::Sector));
    assert_eq!(manager.owning_cache(entity.id()), Some(extra));
}

// ============================================================================
// PARTITION HANDLES
// ============================================================================

#[test]
fn test_cache_mut_unknown_sector() {
    let mut manager = EntityManager::new();
    assert_eq!(
        manager.cache_mut(CacheId::Sector(7)).err(),
        Some(EntityError::UnknownCache(CacheId::Sector(7)))
    );
    assert!(manager.cache(CacheId::Sector(7)).is_err());
    assert!(manager.cache(CacheId::Global).is_ok());
}

#[test]
fn test_cache_mut_only_destroys_own_entities() {
    let mut manager = EntityManager::new();
    let global = manager.create_empty().unwrap();
    let sector = manager.create_sector_entity().unwrap();

    {
        let mut cache = manager.cache_mut(CacheId::DEFAULT_SECTOR).unwrap();
        assert_eq!(cache.id(), CacheId::DEFAULT_SECTOR);
        assert_eq!(cache.get_all_entities(), vec![sector]);
        assert_eq!(cache.get_existing_entity(global.id()), EntityRef::NULL);

        cache.destroy(global.id());
        cache.destroy_without_events(global);
    }
    assert!(global.exists(&manager));

    let mut cache = manager.cache_mut(CacheId::DEFAULT_SECTOR).unwrap();
    cache.destroy(sector.id());
    assert_eq!(cache.get_active_entity_count(), 0);
}

#[test]
fn test_cache_mut_builder_and_queries() {
    let mut manager = EntityManager::new();
    let sector = manager.add_sector_cache();

    let mut cache = manager.cache_mut(sector).unwrap();
    let built = cache
        .new_builder()
        .with_component(Health(5))
        .build()
        .unwrap();
    let plain = cache
        .create_without_lifecycle_events(vec![Box::new(position(0, 0))])
        .unwrap();

    assert_eq!(cache.get_entities_with(&[health_type()]), vec![built]);
    assert_eq!(cache.get_entities_with(&[position_type()]), vec![plain]);
    assert_eq!(cache.get_entities_with(&[]).len(), 2);
    assert_eq!(cache.cache().get_count_of_entities_with(&[health_type()]), 1);

    assert_eq!(built.scope(&manager), Scope::Sector);
    assert_eq!(manager.global_cache().get_active_entity_count(), 0);
}

// ============================================================================
// DEACTIVATE / RESTORE
// ============================================================================

#[test]
fn test_deactivate_and_restore_global_entity() {
    let mut manager = EntityManager::new();
    let recorder = Recorder::new();
    let entity = manager
        .create(vec![Box::new(Health(3)), Box::new(Tag("stored"))])
        .unwrap();
    recorder.attach_all(&mut manager);

    let stored = manager.deactivate_for_storage(entity);
    assert_eq!(stored.len(), 2);
    assert!(!entity.is_active(&manager));
    assert!(!entity.exists(&manager));
    assert!(manager.is_existing_entity(entity.id()));
    assert_eq!(recorder.count(|n| matches!(n, Note::Event(..))), 2);
    assert_eq!(recorder.count(|n| *n == Note::BeforeDeactivation(entity, 2)), 1);
    assert_eq!(recorder.count(|n| matches!(n, Note::Destroyed(_))), 0);

    let restored = manager.create_entity_with_id(entity.id(), stored);
    assert_eq!(restored, entity);
    assert!(entity.is_active(&manager));
    assert_eq!(entity.get_component::<Health>(&manager), Some(&Health(3)));
    assert_eq!(manager.owning_cache(entity.id()), Some(CacheId::Global));
    assert_eq!(
        recorder.count(|n| matches!(n, Note::Reactivated(e, types) if *e == entity && types.len() == 2)),
        1
    );
}

/// Reads the entity back through the manager while it is being deactivated.
#[derive(Default)]
struct DeactivationWitness {
    seen: Mutex<Vec<(bool, bool, bool)>>,
}

impl EntityChangeSubscriber for DeactivationWitness {
    fn on_before_deactivation(&self, manager: &mut EntityManager, entity: EntityRef, components: &[ComponentType]) {
        assert!(components.contains(&health_type()));
        self.seen.lock().push((
            entity.is_active(manager),
            entity.has_component::<Health>(manager),
            entity.is_persistent(manager),
        ));
    }
}

#[test]
fn test_deactivation_subscriber_sees_stored_entity() {
    let mut manager = EntityManager::new();
    let witness = Arc::new(DeactivationWitness::default());
    let entity = manager
        .new_builder()
        .with_component(Health(1))
        .persistent(false)
        .build()
        .unwrap();
    manager.subscribe_for_changes(&witness);

    let stored = manager.deactivate_for_storage(entity);
    assert_eq!(*witness.seen.lock(), vec![(true, true, false)]);
    assert_eq!(stored.len(), 2);
    assert!(!entity.is_active(&manager));
    assert!(manager.global_cache().component_store().is_empty());
}

/// Swaps every new entity's components for a fresh set.
struct Replacer;

impl LifecycleEventSystem for Replacer {
    fn before_entity_created(&self, _manager: &mut EntityManager, _entity: EntityRef, event: &mut BeforeEntityCreated) {
        event.replace_components(vec![Box::new(Health(7))]);
    }

    fn send(&self, _manager: &mut EntityManager, _entity: EntityRef, _event: LifecycleEvent) {}
}

#[test]
fn test_sector_scope_survives_replaced_components() {
    let mut manager = EntityManager::new();
    manager.set_event_system(Arc::new(Replacer));

    let entity = manager.create_sector_entity().unwrap();
    assert_eq!(entity.get_component::<Health>(&manager), Some(&Health(7)));
    assert_eq!(entity.scope(&manager), Scope::Sector);
    assert!(entity.has_component::<EntityInfo>(&manager));

    let stored = manager.deactivate_for_storage(entity);
    manager.create_entity_with_id(entity.id(), stored);
    assert_eq!(manager.owning_cache(entity.id()), Some(CacheId::DEFAULT_SECTOR));
    assert_eq!(owners(&manager, entity), 1);
}

#[test]
fn test_restore_returns_to_previous_sector() {
    let mut manager = EntityManager::new();
    let sector = manager.add_sector_cache();
    let entity = manager
        .cache_mut(sector)
        .unwrap()
        .create(vec![Box::new(Health(8))])
        .unwrap();

    let stored = manager.deactivate_for_storage(entity);
    assert_eq!(manager.sector_manager().get_active_entity_count(), 0);

    manager.create_entity_with_id(entity.id(), stored);
    assert_eq!(manager.owning_cache(entity.id()), Some(sector));
    assert_eq!(owners(&manager, entity), 1);
    assert_eq!(entity.scope(&manager), Scope::Sector);
}

#[test]
fn test_restore_sector_entity_without_history_uses_default_sector() {
    let mut manager = EntityManager::new();
    let id = manager.allocate_id().unwrap();

    let restored = manager.create_entity_with_id(
        id,
        vec![Box::new(Health(1)), Box::new(EntityInfo::with_scope(Scope::Sector))],
    );
    assert_eq!(restored.id(), id);
    assert_eq!(manager.owning_cache(id), Some(CacheId::DEFAULT_SECTOR));
}

#[test]
fn test_restore_rejects_unallocated_ids() {
    let mut manager = EntityManager::new();
    manager.create_empty().unwrap();

    let unknown = manager.create_entity_with_id(EntityId::new(99), vec![Box::new(Health(1))]);
    assert_eq!(unknown, EntityRef::NULL);
    let null = manager.create_entity_with_id(EntityId::NULL, Vec::new());
    assert_eq!(null, EntityRef::NULL);
    assert_eq!(manager.get_active_entity_count(), 1);
}

#[test]
fn test_restore_over_active_entity_replaces_state() {
    let mut manager = EntityManager::new();
    let entity = manager.create_sector_entity_with(vec![Box::new(Health(1))]).unwrap();

    manager.create_entity_with_id(entity.id(), vec![Box::new(Tag("fresh"))]);
    assert_eq!(owners(&manager, entity), 1);
    assert_eq!(manager.owning_cache(entity.id()), Some(CacheId::Global));
    assert!(!entity.has_component::<Health>(&manager));
    assert_eq!(entity.get_component::<Tag>(&manager), Some(&Tag("fresh")));
    assert_eq!(manager.sector_manager().get_active_entity_count(), 0);
}
