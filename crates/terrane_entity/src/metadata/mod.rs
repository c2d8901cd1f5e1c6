//! # Entity Metadata Collaborators
//!
//! The entity runtime never introspects component contents. Two collaborators
//! supply what it needs:
//!
//! - [`ComponentLibrary`]: deep copies of type-erased components.
//! - [`PrefabManager`]: named templates resolved into component lists.
//!
//! [`ComponentRegistry`] and [`PrefabRegistry`] are in-memory implementations
//! that cover both roles for tools and tests.

pub mod library;
pub mod prefab;

pub use library::{ComponentLibrary, ComponentRegistry};
pub use prefab::{Prefab, PrefabManager, PrefabRegistry, StaticPrefab};
