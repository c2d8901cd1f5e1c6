//! Prefab templates.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ecs::Component;

/// A named template of components.
pub trait Prefab: Send + Sync + fmt::Debug {
    /// Template name, unique within its [`PrefabManager`].
    fn name(&self) -> &str;

    /// Template components, in declaration order.
    fn components(&self) -> &[Box<dyn Component>];

    /// Whether entities built from this template are persisted.
    fn is_persisted(&self) -> bool {
        true
    }

    /// Whether entities built from this template are always relevant.
    fn is_always_relevant(&self) -> bool {
        false
    }
}

/// Resolves prefab names.
pub trait PrefabManager: Send + Sync {
    /// Looks up a prefab by name.
    fn get_prefab(&self, name: &str) -> Option<Arc<dyn Prefab>>;
}

/// A prefab whose components are fixed at construction.
#[derive(Debug)]
pub struct StaticPrefab {
    name: String,
    components: Vec<Box<dyn Component>>,
    persisted: bool,
    always_relevant: bool,
}

impl StaticPrefab {
    /// Creates a persisted, not always-relevant prefab.
    #[must_use]
    pub fn new(name: impl Into<String>, components: Vec<Box<dyn Component>>) -> Self {
        Self {
            name: name.into(),
            components,
            persisted: true,
            always_relevant: false,
        }
    }

    /// Sets the persistence flag.
    #[must_use]
    pub fn persisted(mut self, persisted: bool) -> Self {
        self.persisted = persisted;
        self
    }

    /// Sets the relevance flag.
    #[must_use]
    pub fn always_relevant(mut self, always_relevant: bool) -> Self {
        self.always_relevant = always_relevant;
        self
    }
}

impl Prefab for StaticPrefab {
    fn name(&self) -> &str {
        &self.name
    }

    fn components(&self) -> &[Box<dyn Component>] {
        &self.components
    }

    fn is_persisted(&self) -> bool {
        self.persisted
    }

    fn is_always_relevant(&self) -> bool {
        self.always_relevant
    }
}

/// In-memory [`PrefabManager`].
#[derive(Default)]
pub struct PrefabRegistry {
    prefabs: RwLock<HashMap<String, Arc<dyn Prefab>>>,
}

impl PrefabRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a prefab under its own name, returning the shared handle.
    ///
    /// A prefab with the same name is replaced.
    pub fn register(&self, prefab: impl Prefab + 'static) -> Arc<dyn Prefab> {
        let prefab: Arc<dyn Prefab> = Arc::new(prefab);
        let previous = self
            .prefabs
            .write()
            .insert(prefab.name().to_owned(), Arc::clone(&prefab));
        if previous.is_some() {
            tracing::debug!(name = prefab.name(), "Replaced prefab");
        }
        prefab
    }

    /// Number of registered prefabs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prefabs.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefabs.read().is_empty()
    }
}

impl PrefabManager for PrefabRegistry {
    fn get_prefab(&self, name: &str) -> Option<Arc<dyn Prefab>> {
        self.prefabs.read().get(name).cloned()
    }
}

impl fmt::Debug for PrefabRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefabRegistry")
            .field("prefabs", &self.len())
            .finish()
    }
}
