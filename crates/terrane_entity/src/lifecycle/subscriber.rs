//! Change and destroy subscribers.

use std::sync::{Arc, Weak};

use crate::ecs::{ComponentType, EntityManager, EntityRef};

/// Observer of component-level changes.
///
/// Every method defaults to a no-op.
pub trait EntityChangeSubscriber: Send + Sync {
    /// A component type was added to an entity.
    fn on_entity_component_added(&self, _manager: &mut EntityManager, _entity: EntityRef, _component: ComponentType) {}

    /// A component type was removed from an entity.
    fn on_entity_component_removed(&self, _manager: &mut EntityManager, _entity: EntityRef, _component: ComponentType) {}

    /// An existing component was replaced.
    fn on_entity_component_change(&self, _manager: &mut EntityManager, _entity: EntityRef, _component: ComponentType) {}

    /// A stored entity was restored with these component types.
    fn on_reactivation(&self, _manager: &mut EntityManager, _entity: EntityRef, _components: &[ComponentType]) {}

    /// An entity is about to be unloaded for storage. It is still active and
    /// every listed component is still readable through the manager.
    fn on_before_deactivation(&self, _manager: &mut EntityManager, _entity: EntityRef, _components: &[ComponentType]) {}
}

/// Observer of entity destruction.
pub trait EntityDestroySubscriber: Send + Sync {
    /// The entity was destroyed.
    fn on_entity_destroyed(&self, manager: &mut EntityManager, entity: EntityRef);
}

/// Insertion-ordered set of weakly held subscribers.
///
/// Iteration always goes through [`SubscriberSet::snapshot`], so callbacks may
/// (un)subscribe freely.
pub(crate) struct SubscriberSet<T: ?Sized> {
    entries: Vec<Weak<T>>,
}

impl<T: ?Sized> SubscriberSet<T> {
    pub(crate) const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Adds a subscriber. Returns `false` if it was already present.
    pub(crate) fn insert(&mut self, subscriber: Weak<T>) -> bool {
        self.prune();
        if self.position(&subscriber).is_some() {
            return false;
        }
        self.entries.push(subscriber);
        true
    }

    /// Removes a subscriber. Returns `false` if it was not present.
    pub(crate) fn remove(&mut self, subscriber: &Weak<T>) -> bool {
        let removed = match self.position(subscriber) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        };
        self.prune();
        removed
    }

    /// Live subscribers in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.iter().filter_map(Weak::upgrade).collect()
    }

    /// Number of live subscribers.
    pub(crate) fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.strong_count() > 0).count()
    }

    fn position(&self, subscriber: &Weak<T>) -> Option<usize> {
        let target = subscriber.as_ptr().cast::<()>();
        self.entries
            .iter()
            .position(|e| e.as_ptr().cast::<()>() == target)
    }

    fn prune(&mut self) {
        self.entries.retain(|e| e.strong_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct Sub(&'static str);
    impl Named for Sub {
        fn name(&self) -> &'static str {
            self.0
        }
    }

    fn weak(sub: &Arc<Sub>) -> Weak<dyn Named> {
        let weak: Weak<Sub> = Arc::downgrade(sub);
        weak
    }

    #[test]
    fn test_insertion_order_and_dedup() {
        let a = Arc::new(Sub("a"));
        let b = Arc::new(Sub("b"));
        let mut set: SubscriberSet<dyn Named> = SubscriberSet::new();

        assert!(set.insert(weak(&b)));
        assert!(set.insert(weak(&a)));
        assert!(!set.insert(weak(&b)));

        let names: Vec<_> = set.snapshot().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_dropped_subscribers_pruned() {
        let a = Arc::new(Sub("a"));
        let b = Arc::new(Sub("b"));
        let mut set: SubscriberSet<dyn Named> = SubscriberSet::new();
        set.insert(weak(&a));
        set.insert(weak(&b));

        drop(a);
        assert_eq!(set.len(), 1);
        assert_eq!(set.snapshot().len(), 1);

        assert!(set.remove(&weak(&b)));
        assert!(!set.remove(&weak(&b)));
        assert_eq!(set.len(), 0);
    }
}
