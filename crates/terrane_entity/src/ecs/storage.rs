//! # Component Storage
//!
//! Partition-local map from (entity, component type) to component value.
//!
//! Storage is keyed type-first, so each type's map doubles as the reverse
//! index "all entities holding X":
//!
//! ```text
//! ComponentTable
//!   Health   -> { 3: Health(50), 7: Health(10) }
//!   Position -> { 3: Position(..) }
//! ```
//!
//! Per-type maps are ordered by entity id, so every iteration is
//! deterministic.

use std::collections::BTreeMap;

use super::component::{Component, ComponentType};
use super::entity::EntityId;

/// Storage for every component of one cache partition.
#[derive(Debug, Default)]
pub struct ComponentTable {
    store: BTreeMap<ComponentType, BTreeMap<EntityId, Box<dyn Component>>>,
}

impl ComponentTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a component by entity and type.
    #[must_use]
    pub fn get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.get_dyn(entity, ComponentType::of::<T>())
            .and_then(|c| c.downcast_ref::<T>())
    }

    /// Gets a type-erased component.
    #[must_use]
    pub fn get_dyn(&self, entity: EntityId, component_type: ComponentType) -> Option<&dyn Component> {
        self.store
            .get(&component_type)
            .and_then(|column| column.get(&entity))
            .map(|c| &**c)
    }

    /// Gets a mutable component by entity and type.
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.store
            .get_mut(&ComponentType::of::<T>())
            .and_then(|column| column.get_mut(&entity))
            .and_then(|c| (**c).downcast_mut::<T>())
    }

    /// Whether the entity has a component of the given type.
    #[must_use]
    pub fn contains(&self, entity: EntityId, component_type: ComponentType) -> bool {
        self.store
            .get(&component_type)
            .is_some_and(|column| column.contains_key(&entity))
    }

    /// Stores a component, returning the one it replaced.
    pub fn put(&mut self, entity: EntityId, component: Box<dyn Component>) -> Option<Box<dyn Component>> {
        let component_type = ComponentType::of_val(&*component);
        self.store
            .entry(component_type)
            .or_default()
            .insert(entity, component)
    }

    /// Removes one component.
    pub fn remove(&mut self, entity: EntityId, component_type: ComponentType) -> Option<Box<dyn Component>> {
        let column = self.store.get_mut(&component_type)?;
        let removed = column.remove(&entity);
        if column.is_empty() {
            self.store.remove(&component_type);
        }
        removed
    }

    /// Removes every component of an entity, in type order.
    pub fn remove_all(&mut self, entity: EntityId) -> Vec<Box<dyn Component>> {
        let mut removed = Vec::new();
        self.store.retain(|_, column| {
            if let Some(component) = column.remove(&entity) {
                removed.push(component);
            }
            !column.is_empty()
        });
        removed
    }

    /// Iterates an entity's components in type order.
    pub fn iterate_components(&self, entity: EntityId) -> impl Iterator<Item = &dyn Component> + '_ {
        self.store
            .values()
            .filter_map(move |column| column.get(&entity))
            .map(|c| &**c)
    }

    /// Snapshot of the component types an entity holds.
    #[must_use]
    pub fn component_types_of(&self, entity: EntityId) -> Vec<ComponentType> {
        self.store
            .iter()
            .filter(|(_, column)| column.contains_key(&entity))
            .map(|(component_type, _)| *component_type)
            .collect()
    }

    /// Number of components an entity holds.
    #[must_use]
    pub fn component_count_of(&self, entity: EntityId) -> usize {
        self.store
            .values()
            .filter(|column| column.contains_key(&entity))
            .count()
    }

    /// Iterates every `(entity, component)` pair of type `T`, by entity id.
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.store
            .get(&ComponentType::of::<T>())
            .into_iter()
            .flat_map(|column| column.iter())
            .filter_map(|(entity, c)| (**c).downcast_ref::<T>().map(|value| (*entity, value)))
    }

    /// Number of entities holding a component of the given type.
    #[must_use]
    pub fn count(&self, component_type: ComponentType) -> usize {
        self.store.get(&component_type).map_or(0, BTreeMap::len)
    }

    /// Entities holding every listed type, ascending by id.
    ///
    /// Walks the smallest column and probes the others.
    #[must_use]
    pub fn entities_with(&self, component_types: &[ComponentType]) -> Vec<EntityId> {
        let mut columns = Vec::with_capacity(component_types.len());
        for component_type in component_types {
            match self.store.get(component_type) {
                Some(column) => columns.push(column),
                None => return Vec::new(),
            }
        }
        let Some((smallest_index, smallest)) = columns
            .iter()
            .enumerate()
            .min_by_key(|(_, column)| column.len())
            .map(|(i, column)| (i, *column))
        else {
            return Vec::new();
        };

        smallest
            .keys()
            .copied()
            .filter(|entity| {
                columns
                    .iter()
                    .enumerate()
                    .all(|(i, column)| i == smallest_index || column.contains_key(entity))
            })
            .collect()
    }

    /// Number of distinct component types stored.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.store.len()
    }

    /// Whether the table holds no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Drops every component.
    pub fn clear(&mut self) {
        self.store.clear();
    }
}
