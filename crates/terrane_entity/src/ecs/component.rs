//! # Component System
//!
//! Components are opaque data payloads identified by their concrete type.
//! An entity holds at most one component per type.
//!
//! Any `Send + Sync + Debug + 'static` type becomes a component with an empty
//! marker impl:
//!
//! ```rust,ignore
//! #[derive(Clone, Debug)]
//! struct Health(u32);
//!
//! impl Component for Health {}
//! ```

use std::any::{type_name, Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::entity::EntityRef;
use crate::metadata::Prefab;

/// Type-erased access to a component value.
///
/// Implemented for every `'static` type; it is a supertrait of [`Component`]
/// so `dyn Component` values can be downcast. Call these methods on
/// `&dyn Component` or `Box<dyn Component>`, never on `&Box<dyn Component>`.
pub trait ComponentAny: Any {
    /// Borrows the value as `dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// Mutably borrows the value as `dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Converts the boxed value into `Box<dyn Any>`.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    /// The `TypeId` of the concrete type.
    fn component_type_id(&self) -> TypeId;
    /// The name of the concrete type.
    fn component_type_name(&self) -> &'static str;
}

impl<T: Any> ComponentAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn component_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn component_type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// Marker trait for entity components.
pub trait Component: ComponentAny + Send + Sync + fmt::Debug {}

impl dyn Component {
    /// The component type of this value.
    #[inline]
    #[must_use]
    pub fn component_type(&self) -> ComponentType {
        ComponentType::of_val(self)
    }

    /// Whether the value is a `T`.
    #[inline]
    #[must_use]
    pub fn is<T: Component>(&self) -> bool {
        self.component_type_id() == TypeId::of::<T>()
    }

    /// Downcasts to a `T`.
    #[inline]
    #[must_use]
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Mutably downcasts to a `T`.
    #[inline]
    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Unboxes into a `T`, handing the box back on a type mismatch.
    ///
    /// # Errors
    ///
    /// Returns the original box if the value is not a `T`.
    pub fn downcast<T: Component>(self: Box<Self>) -> Result<T, Box<dyn Component>> {
        if self.is::<T>() {
            match self.into_any().downcast::<T>() {
                Ok(value) => Ok(*value),
                // is::<T>() was just checked
                Err(_) => unreachable!("component type id matched but downcast failed"),
            }
        } else {
            Err(self)
        }
    }
}

/// Identity of a component type.
///
/// Equality, hashing and ordering use the `TypeId` only; the name is carried
/// for diagnostics.
#[derive(Clone, Copy)]
pub struct ComponentType {
    id: TypeId,
    name: &'static str,
}

impl ComponentType {
    /// The component type of `T`.
    #[inline]
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The component type of a type-erased value.
    #[inline]
    #[must_use]
    pub fn of_val(component: &dyn Component) -> Self {
        Self {
            id: component.component_type_id(),
            name: component.component_type_name(),
        }
    }

    /// The underlying `TypeId`.
    #[inline]
    #[must_use]
    pub const fn type_id(self) -> TypeId {
        self.id
    }

    /// The full type name.
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.name
    }

    /// The type name without its module path.
    #[must_use]
    pub fn short_name(self) -> &'static str {
        if self.name.contains('<') {
            return self.name;
        }
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentType {}

impl Hash for ComponentType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for ComponentType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComponentType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Which partition owns an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// The default, manager-lifetime partition.
    #[default]
    Global,
    /// A spatial/temporal partition managed by the sector manager.
    Sector,
}

/// Identity metadata stored alongside an entity's components.
///
/// Carries the prefab it was built from, persistence/relevance flags, the
/// owning entity and the partition scope.
#[derive(Clone, Debug)]
pub struct EntityInfo {
    /// Template the entity was instantiated from.
    pub parent_prefab: Option<Arc<dyn Prefab>>,
    /// Whether the entity is written to storage.
    pub persisted: bool,
    /// Whether the entity stays relevant regardless of distance.
    pub always_relevant: bool,
    /// Entity that owns this one.
    pub owner: EntityRef,
    /// Partition scope.
    pub scope: Scope,
}

impl EntityInfo {
    /// Marker for an entity built from `prefab`.
    #[must_use]
    pub fn from_prefab(prefab: &Arc<dyn Prefab>) -> Self {
        Self {
            parent_prefab: Some(Arc::clone(prefab)),
            persisted: prefab.is_persisted(),
            always_relevant: prefab.is_always_relevant(),
            ..Self::default()
        }
    }

    /// Marker with only the scope set.
    #[must_use]
    pub fn with_scope(scope: Scope) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }
}

impl Default for EntityInfo {
    fn default() -> Self {
        Self {
            parent_prefab: None,
            persisted: true,
            always_relevant: false,
            owner: EntityRef::NULL,
            scope: Scope::Global,
        }
    }
}

impl Component for EntityInfo {}

/// Finds the [`EntityInfo`] in a component list.
pub(crate) fn find_entity_info(components: &[Box<dyn Component>]) -> Option<&EntityInfo> {
    components.iter().find_map(|c| (**c).downcast_ref::<EntityInfo>())
}

/// Sets the scope on the [`EntityInfo`] in a component list, appending one if
/// none is present.
pub(crate) fn tag_scope(components: &mut Vec<Box<dyn Component>>, scope: Scope) {
    let existing = components
        .iter_mut()
        .find_map(|c| (**c).downcast_mut::<EntityInfo>());
    match existing {
        Some(info) => info.scope = scope,
        None => components.push(Box::new(EntityInfo::with_scope(scope))),
    }
}
