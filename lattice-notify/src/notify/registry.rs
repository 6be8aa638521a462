//! Listener Registry
//!
//! Holds the listeners of one node in registration order.
//!
//! # Concurrency
//!
//! The entry map sits behind an `RwLock`. The dispatcher never iterates the
//! map while calling listeners: it takes an ordered [`snapshot`] under the
//! read lock and walks that instead, so registration and removal can proceed
//! while a delivery is running.
//!
//! Removal is made visible to an in-flight walk through a per-entry `active`
//! flag. [`unregister`] clears the flag before returning and the walk checks
//! it right before each call, so a removed listener is skipped by every
//! delivery that has not already started.
//!
//! [`snapshot`]: ListenerRegistry::snapshot
//! [`unregister`]: ListenerRegistry::unregister

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::event::Timestamp;
use super::listener::{Listener, ListenerId};
use crate::graph::NodeId;

/// Identifies one registration on one node.
///
/// Handles are plain values. Unregistering the same handle twice is a no-op
/// the second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationHandle {
    node: NodeId,
    listener: ListenerId,
}

impl RegistrationHandle {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn listener(&self) -> ListenerId {
        self.listener
    }
}

/// Last timestamp handed to an entry before its bootstrap event.
const NOT_BOOTSTRAPPED: i64 = i64::MIN;

/// One registration.
pub(crate) struct Entry<T> {
    id: ListenerId,
    listener: Box<dyn Listener<T>>,
    active: AtomicBool,
    /// Raw form of the last timestamp delivered to this entry.
    last_delivered: AtomicI64,
}

impl<T> Entry<T> {
    pub(crate) fn new(listener: Box<dyn Listener<T>>) -> Self {
        Self {
            id: ListenerId::new(),
            listener,
            active: AtomicBool::new(true),
            last_delivered: AtomicI64::new(NOT_BOOTSTRAPPED),
        }
    }

    pub(crate) fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn listener(&self) -> &dyn Listener<T> {
        self.listener.as_ref()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Record that `timestamp` is about to be delivered to this entry.
    ///
    /// Panics on an ordering violation: a real event before the bootstrap
    /// event, a second bootstrap, or a sequenced timestamp that does not
    /// increase. None of these can happen through the public API.
    pub(crate) fn advance(&self, timestamp: Timestamp) {
        let raw = timestamp.as_raw();
        let previous = self.last_delivered.swap(raw, Ordering::AcqRel);

        match timestamp {
            Timestamp::Bootstrap => assert_eq!(
                previous, NOT_BOOTSTRAPPED,
                "ordering violation: listener {:?} bootstrapped twice",
                self.id
            ),
            Timestamp::Sequenced(_) => assert!(
                previous != NOT_BOOTSTRAPPED && raw > previous,
                "ordering violation: listener {:?} got {} after raw timestamp {}",
                self.id,
                timestamp,
                previous
            ),
        }
    }
}

/// Listeners of one node, in registration order.
pub struct ListenerRegistry<T> {
    node: NodeId,
    entries: RwLock<IndexMap<ListenerId, Arc<Entry<T>>>>,
}

impl<T> ListenerRegistry<T> {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            entries: RwLock::new(IndexMap::new()),
        }
    }

    /// Add an already bootstrapped entry to the end of the active set.
    ///
    /// Only the dispatcher calls this, after it has delivered the bootstrap
    /// event while holding the node's publish lock.
    pub(crate) fn insert(&self, entry: Arc<Entry<T>>) -> RegistrationHandle {
        let id = entry.id();
        self.entries.write().insert(id, entry);

        RegistrationHandle {
            node: self.node,
            listener: id,
        }
    }

    /// Remove a registration.
    ///
    /// Returns `false` for handles that are stale or belong to another node.
    pub fn unregister(&self, handle: RegistrationHandle) -> bool {
        if handle.node != self.node {
            return false;
        }

        // shift_remove keeps the remaining entries in registration order.
        match self.entries.write().shift_remove(&handle.listener) {
            Some(entry) => {
                entry.deactivate();
                true
            }
            None => false,
        }
    }

    /// Remove every registration.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.entries.write().drain(..).collect();
        for (_, entry) in &drained {
            entry.deactivate();
        }
        drained.len()
    }

    /// Ordered copy of the current entries.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Entry<T>>> {
        self.entries.read().values().cloned().collect()
    }

    pub fn contains(&self, handle: RegistrationHandle) -> bool {
        handle.node == self.node && self.entries.read().contains_key(&handle.listener)
    }

    /// Registered listener IDs, in registration order.
    pub fn listener_ids(&self) -> Vec<ListenerId> {
        self.entries.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn node(&self) -> NodeId {
        self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ListenerError;
    use crate::notify::{FnListener, ValueEvent};

    fn noop() -> Box<dyn Listener<i32>> {
        Box::new(FnListener::new(|_: &ValueEvent<i32>| Ok::<(), ListenerError>(())))
    }

    #[test]
    fn preserves_registration_order() {
        let registry = ListenerRegistry::new(NodeId::new());
        let a = registry.insert(Arc::new(Entry::new(noop())));
        let b = registry.insert(Arc::new(Entry::new(noop())));
        let c = registry.insert(Arc::new(Entry::new(noop())));

        assert_eq!(
            registry.listener_ids(),
            vec![a.listener(), b.listener(), c.listener()]
        );

        registry.unregister(b);
        assert_eq!(registry.listener_ids(), vec![a.listener(), c.listener()]);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ListenerRegistry::new(NodeId::new());
        let handle = registry.insert(Arc::new(Entry::new(noop())));

        assert!(registry.contains(handle));
        assert!(registry.unregister(handle));
        assert!(!registry.unregister(handle));
        assert!(registry.is_empty());
    }

    #[test]
    fn foreign_handles_are_ignored() {
        let first = ListenerRegistry::new(NodeId::new());
        let second = ListenerRegistry::<i32>::new(NodeId::new());
        let handle = first.insert(Arc::new(Entry::new(noop())));

        assert!(!second.unregister(handle));
        assert!(first.contains(handle));
    }

    #[test]
    fn unregister_deactivates_snapshotted_entries() {
        let registry = ListenerRegistry::new(NodeId::new());
        let handle = registry.insert(Arc::new(Entry::new(noop())));

        let snapshot = registry.snapshot();
        assert!(snapshot[0].is_active());

        registry.unregister(handle);
        assert!(!snapshot[0].is_active());
    }

    #[test]
    fn clear_deactivates_everything() {
        let registry = ListenerRegistry::new(NodeId::new());
        registry.insert(Arc::new(Entry::new(noop())));
        registry.insert(Arc::new(Entry::new(noop())));
        let snapshot = registry.snapshot();

        assert_eq!(registry.clear(), 2);
        assert_eq!(registry.len(), 0);
        assert!(snapshot.iter().all(|entry| !entry.is_active()));
    }

    #[test]
    fn advance_accepts_bootstrap_then_increasing() {
        let entry = Entry::new(noop());
        entry.advance(Timestamp::Bootstrap);
        entry.advance(Timestamp::Sequenced(0));
        entry.advance(Timestamp::Sequenced(4));
    }

    #[test]
    #[should_panic(expected = "ordering violation")]
    fn advance_rejects_real_event_before_bootstrap() {
        let entry = Entry::new(noop());
        entry.advance(Timestamp::Sequenced(0));
    }

    #[test]
    #[should_panic(expected = "ordering violation")]
    fn advance_rejects_non_increasing() {
        let entry = Entry::new(noop());
        entry.advance(Timestamp::Bootstrap);
        entry.advance(Timestamp::Sequenced(3));
        entry.advance(Timestamp::Sequenced(3));
    }
}
