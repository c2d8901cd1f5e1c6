//! # Entity Component Runtime
//!
//! Entities are ids, components are typed payloads, and every mutation goes
//! through the [`EntityManager`].
//!
//! ## Layout
//!
//! - [`entity`]: `EntityId` and the `EntityRef` handle
//! - [`component`]: the `Component` trait, `ComponentType`, `EntityInfo`
//! - [`storage`]: `ComponentTable`, one per partition
//! - [`cache`]: partitions (global and sector caches)
//! - [`manager`]: id allocation, routing, notifications
//! - [`builder`]: one-shot entity construction

pub mod builder;
pub mod cache;
pub mod component;
pub mod entity;
pub mod manager;
pub mod storage;

pub use builder::EntityBuilder;
pub use cache::{CacheId, CacheMut, EntityCache, SectorManager};
pub use component::{Component, ComponentAny, ComponentType, EntityInfo, Scope};
pub use entity::{EntityId, EntityRef};
pub use manager::EntityManager;
pub use storage::ComponentTable;
