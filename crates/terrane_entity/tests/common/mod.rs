//! Shared components and a recording observer for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use terrane_entity::{
    BeforeEntityCreated, Component, ComponentType, EntityChangeSubscriber, EntityDestroySubscriber,
    EntityManager, EntityRef, LifecycleEvent, LifecycleEventSystem,
};

#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}
impl Component for Position {}

#[derive(Clone, Debug, PartialEq)]
pub struct Health(pub u32);
impl Component for Health {}

#[derive(Clone, Debug, PartialEq)]
pub struct Tag(pub &'static str);
impl Component for Tag {}

pub fn position(x: i32, y: i32) -> Position {
    Position { x, y }
}

/// Everything an observer can hear, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum Note {
    BeforeCreated(EntityRef),
    Event(EntityRef, LifecycleEvent),
    Added(EntityRef, ComponentType),
    Changed(EntityRef, ComponentType),
    Removed(EntityRef, ComponentType),
    Reactivated(EntityRef, Vec<ComponentType>),
    BeforeDeactivation(EntityRef, usize),
    Destroyed(EntityRef),
}

/// Change subscriber, destroy subscriber and event system in one, writing
/// into a shared log.
#[derive(Default)]
pub struct Recorder {
    log: Mutex<Vec<Note>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribes for changes and destruction and attaches as event system.
    pub fn attach_all(self: &Arc<Self>, manager: &mut EntityManager) {
        manager.subscribe_for_changes(self);
        manager.subscribe_for_destruction(self);
        manager.set_event_system(Arc::clone(self) as Arc<dyn LifecycleEventSystem>);
    }

    pub fn notes(&self) -> Vec<Note> {
        self.log.lock().clone()
    }

    pub fn take(&self) -> Vec<Note> {
        std::mem::take(&mut *self.log.lock())
    }

    pub fn count(&self, predicate: impl Fn(&Note) -> bool) -> usize {
        self.log.lock().iter().filter(|note| predicate(note)).count()
    }

    fn push(&self, note: Note) {
        self.log.lock().push(note);
    }
}

impl EntityChangeSubscriber for Recorder {
    fn on_entity_component_added(&self, _manager: &mut EntityManager, entity: EntityRef, component: ComponentType) {
        self.push(Note::Added(entity, component));
    }

    fn on_entity_component_removed(&self, _manager: &mut EntityManager, entity: EntityRef, component: ComponentType) {
        self.push(Note::Removed(entity, component));
    }

    fn on_entity_component_change(&self, _manager: &mut EntityManager, entity: EntityRef, component: ComponentType) {
        self.push(Note::Changed(entity, component));
    }

    fn on_reactivation(&self, _manager: &mut EntityManager, entity: EntityRef, components: &[ComponentType]) {
        self.push(Note::Reactivated(entity, components.to_vec()));
    }

    fn on_before_deactivation(&self, _manager: &mut EntityManager, entity: EntityRef, components: &[ComponentType]) {
        self.push(Note::BeforeDeactivation(entity, components.len()));
    }
}

impl EntityDestroySubscriber for Recorder {
    fn on_entity_destroyed(&self, _manager: &mut EntityManager, entity: EntityRef) {
        self.push(Note::Destroyed(entity));
    }
}

impl LifecycleEventSystem for Recorder {
    fn before_entity_created(
        &self,
        _manager: &mut EntityManager,
        entity: EntityRef,
        _event: &mut BeforeEntityCreated,
    ) {
        self.push(Note::BeforeCreated(entity));
    }

    fn send(&self, _manager: &mut EntityManager, entity: EntityRef, event: LifecycleEvent) {
        self.push(Note::Event(entity, event));
    }
}

pub fn health_type() -> ComponentType {
    ComponentType::of::<Health>()
}

pub fn position_type() -> ComponentType {
    ComponentType::of::<Position>()
}
