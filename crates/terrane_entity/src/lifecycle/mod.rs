//! # Lifecycle Notifications
//!
//! Two audiences hear about entity state transitions:
//!
//! - **Subscribers** ([`EntityChangeSubscriber`], [`EntityDestroySubscriber`])
//!   registered on the manager, held weakly, notified in registration order.
//! - **An event system** ([`LifecycleEventSystem`]), optional, receiving the
//!   fixed [`LifecycleEvent`] vocabulary plus [`BeforeEntityCreated`].
//!
//! For a new component type subscribers hear first:
//!
//! ```text
//! add (new type)    on_entity_component_added -> OnAdded -> OnActivated
//! add (replace)     on_entity_component_change -> OnChanged
//! remove            BeforeDeactivate -> BeforeRemove -> (table) -> on_entity_component_removed
//! ```
//!
//! Every callback receives `&mut EntityManager` and may create, mutate or
//! destroy entities, or (un)subscribe, while it runs.

pub mod bus;
pub mod events;
pub mod subscriber;

pub use bus::{LifecycleEventBus, LifecycleEventReceiver, LifecycleRecord};
pub use events::{BeforeEntityCreated, LifecycleEvent, LifecycleEventSystem};
pub use subscriber::{EntityChangeSubscriber, EntityDestroySubscriber};
pub(crate) use subscriber::SubscriberSet;
