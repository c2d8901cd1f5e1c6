//! # TERRANE Entity Runtime
//!
//! The entity/component core of the TERRANE engine:
//! - Monotonic entity ids, never reused while the manager lives
//! - Components stored per partition (a global cache plus sector caches)
//! - Lifecycle notifications to subscribers and an optional event system
//!
//! ## Rules
//!
//! 1. **One writer** - the manager does no internal locking
//! 2. **Handles are ids** - an `EntityRef` stops resolving once its entity is
//!    gone, it never dangles
//! 3. **Reentrant callbacks** - observers may mutate the manager mid-notification
//!
//! ## Example
//!
//! ```rust,ignore
//! use terrane_entity::{Component, EntityManager};
//!
//! #[derive(Clone, Debug)]
//! struct Health(u32);
//! impl Component for Health {}
//!
//! let mut manager = EntityManager::new();
//! let entity = manager.create(vec![Box::new(Health(100))])?;
//! entity.add_component(&mut manager, Health(50));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod lifecycle;
pub mod metadata;

pub use config::EntityManagerConfig;
pub use ecs::{
    CacheId, CacheMut, Component, ComponentTable, ComponentType, EntityBuilder, EntityCache,
    EntityId, EntityInfo, EntityManager, EntityRef, Scope, SectorManager,
};
pub use error::{EntityError, EntityResult};
pub use lifecycle::{
    BeforeEntityCreated, EntityChangeSubscriber, EntityDestroySubscriber, LifecycleEvent,
    LifecycleEventBus, LifecycleEventReceiver, LifecycleEventSystem, LifecycleRecord,
};
pub use metadata::{
    ComponentLibrary, ComponentRegistry, Prefab, PrefabManager, PrefabRegistry, StaticPrefab,
};
