//! # Lifecycle Event Bus
//!
//! A [`LifecycleEventSystem`] that forwards every lifecycle event into a
//! bounded crossbeam channel, for consumers that process them later (query
//! caches, replication, tooling).
//!
//! Sending never blocks. When the channel is full the event is dropped and
//! counted.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use super::events::{LifecycleEvent, LifecycleEventSystem};
use crate::ecs::{EntityManager, EntityRef};

/// Default channel capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// One forwarded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleRecord {
    /// Entity the event was addressed to.
    pub entity: EntityRef,
    /// The event.
    pub event: LifecycleEvent,
}

/// Channel-backed lifecycle event system.
pub struct LifecycleEventBus {
    sender: Sender<LifecycleRecord>,
    receiver: Receiver<LifecycleRecord>,
    dropped: AtomicU64,
}

impl LifecycleEventBus {
    /// Creates a bus holding at most `capacity` undelivered events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            dropped: AtomicU64::new(0),
        }
    }

    /// Creates a receiver handle (clone for multiple consumers).
    #[must_use]
    pub fn receiver(&self) -> LifecycleEventReceiver {
        LifecycleEventReceiver {
            receiver: self.receiver.clone(),
        }
    }

    /// Number of events dropped because the channel was full.
    #[inline]
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn publish(&self, record: LifecycleRecord) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    "Lifecycle bus full, dropped {} for {} ({} dropped so far)",
                    record.event.name(),
                    record.entity,
                    dropped
                );
                false
            }
            // The bus holds its own receiver
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl Default for LifecycleEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl LifecycleEventSystem for LifecycleEventBus {
    fn send(&self, _manager: &mut EntityManager, entity: EntityRef, event: LifecycleEvent) {
        self.publish(LifecycleRecord { entity, event });
    }
}

/// Handle for receiving forwarded events.
#[derive(Clone)]
pub struct LifecycleEventReceiver {
    receiver: Receiver<LifecycleRecord>,
}

impl LifecycleEventReceiver {
    /// Receives all pending events (non-blocking).
    #[inline]
    pub fn drain(&self) -> Vec<LifecycleRecord> {
        let mut records = Vec::with_capacity(self.receiver.len());
        while let Ok(record) = self.receiver.try_recv() {
            records.push(record);
        }
        records
    }

    /// Receives one event (non-blocking).
    #[inline]
    pub fn try_recv(&self) -> Option<LifecycleRecord> {
        self.receiver.try_recv().ok()
    }

    /// Returns the number of pending events.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Checks if there are pending events.
    #[inline]
    #[must_use]
    pub fn has_events(&self) -> bool {
        !self.receiver.is_empty()
    }
}
