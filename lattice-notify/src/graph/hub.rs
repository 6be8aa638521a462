//! Event Hub
//!
//! Maps node IDs to their dispatchers. This is the entry point the engine
//! calls: `publish(node, value)` when it has computed a new value, and
//! `register`/`unregister` on behalf of its API consumers.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::node::NodeId;
use crate::config::NotifyConfig;
use crate::error::{DispatchError, ListenerError};
use crate::notify::{
    Dispatcher, FnListener, Listener, PublishReport, Registration, RegistrationHandle,
    Subscription, ValueEvent,
};

/// Dispatchers for a set of nodes carrying values of type `T`.
pub struct EventHub<T>
where
    T: Clone + Send + Sync + 'static,
{
    nodes: DashMap<NodeId, Arc<Dispatcher<T>>>,
    config: NotifyConfig,
}

impl<T> EventHub<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_config(NotifyConfig::default())
    }

    /// Create a hub whose dispatchers all use `config`.
    pub fn with_config(config: NotifyConfig) -> Self {
        Self {
            nodes: DashMap::new(),
            config,
        }
    }

    /// Start tracking a node holding `initial`.
    pub fn add_node(&self, initial: T) -> NodeId {
        let node = NodeId::new();
        let dispatcher = Dispatcher::for_node(node, initial, self.config.clone());
        self.nodes.insert(node, Arc::new(dispatcher));

        debug!(node = %node, "node added");
        node
    }

    /// Stop tracking a node. Its listeners receive nothing further.
    ///
    /// Returns `false` if the node was unknown.
    pub fn remove_node(&self, node: NodeId) -> bool {
        match self.nodes.remove(&node) {
            Some((_, dispatcher)) => {
                let dropped = dispatcher.close();
                debug!(node = %node, listeners = dropped, "node removed");
                true
            }
            None => false,
        }
    }

    /// Publish a new value for `node`.
    pub fn publish(&self, node: NodeId, value: T) -> Result<PublishReport, DispatchError> {
        self.dispatcher(node)?.publish(value)
    }

    /// Register a listener on `node`. See [`Dispatcher::register`].
    pub fn register<L>(&self, node: NodeId, listener: L) -> Result<Registration, DispatchError>
    where
        L: Listener<T> + 'static,
    {
        self.dispatcher(node)?.register(listener)
    }

    pub fn register_fn<F>(&self, node: NodeId, f: F) -> Result<Registration, DispatchError>
    where
        F: Fn(&ValueEvent<T>) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.register(node, FnListener::new(f))
    }

    /// Register a listener that is removed when the guard drops.
    pub fn subscribe<L>(&self, node: NodeId, listener: L) -> Result<Subscription<T>, DispatchError>
    where
        L: Listener<T> + 'static,
    {
        self.dispatcher(node)?.subscribe(listener)
    }

    /// Remove a registration. Stale handles and handles of removed nodes are
    /// a no-op returning `false`.
    pub fn unregister(&self, handle: RegistrationHandle) -> bool {
        match self.dispatcher(handle.node()) {
            Ok(dispatcher) => dispatcher.unregister(handle),
            Err(_) => false,
        }
    }

    /// Current value of `node`.
    pub fn current(&self, node: NodeId) -> Result<T, DispatchError> {
        Ok(self.dispatcher(node)?.current())
    }

    /// The dispatcher of `node`.
    ///
    /// The returned `Arc` outlives the map entry; the hub's lock is not held.
    pub fn dispatcher(&self, node: NodeId) -> Result<Arc<Dispatcher<T>>, DispatchError> {
        self.nodes
            .get(&node)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(DispatchError::UnknownNode(node))
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }
}

impl<T> Default for EventHub<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Timestamp;
    use parking_lot::Mutex;

    fn recording(log: &Arc<Mutex<Vec<(i32, i64)>>>) -> impl Listener<i32> + 'static {
        let log = log.clone();
        FnListener::new(move |event: &ValueEvent<i32>| {
            log.lock().push((*event.value(), event.timestamp().as_raw()));
            Ok(())
        })
    }

    #[test]
    fn add_and_remove_nodes() {
        let hub = EventHub::new();
        let a = hub.add_node(1);
        let b = hub.add_node(2);

        assert_eq!(hub.node_count(), 2);
        assert_eq!(hub.current(a).unwrap(), 1);

        assert!(hub.remove_node(a));
        assert!(!hub.remove_node(a));
        assert!(!hub.contains(a));
        assert!(hub.contains(b));
        assert_eq!(hub.publish(a, 3).unwrap_err(), DispatchError::UnknownNode(a));
    }

    #[test]
    fn nodes_are_sequenced_independently() {
        let hub = EventHub::new();
        let a = hub.add_node(0);
        let b = hub.add_node(0);

        hub.publish(a, 1).unwrap();
        hub.publish(a, 2).unwrap();
        let report = hub.publish(b, 1).unwrap();

        assert_eq!(report.timestamp(), Timestamp::Sequenced(0));
        assert_eq!(hub.dispatcher(a).unwrap().last_timestamp(), Some(1));
    }

    #[test]
    fn removing_a_node_silences_its_listeners() {
        let hub = EventHub::new();
        let node = hub.add_node(0);
        let log = Arc::new(Mutex::new(Vec::new()));

        let handle = hub.register(node, recording(&log)).unwrap().handle();
        let dispatcher = hub.dispatcher(node).unwrap();

        hub.remove_node(node);

        assert!(dispatcher.publish(5).is_err());
        assert!(!hub.unregister(handle));
        assert_eq!(*log.lock(), vec![(0, -1)]);
    }

    #[test]
    fn listener_on_one_node_may_publish_to_another() {
        let hub = Arc::new(EventHub::new());
        let source = hub.add_node(0);
        let mirror = hub.add_node(0);
        let log = Arc::new(Mutex::new(Vec::new()));

        hub.register(mirror, recording(&log)).unwrap();

        let hub_weak = Arc::downgrade(&hub);
        hub.register_fn(source, move |event: &ValueEvent<i32>| {
            if event.is_bootstrap() {
                return Ok(());
            }
            if let Some(hub) = hub_weak.upgrade() {
                hub.publish(mirror, *event.value() * 10)
                    .map_err(ListenerError::from_source)?;
            }
            Ok(())
        })
        .unwrap();

        let report = hub.publish(source, 4).unwrap();
        assert!(report.is_clean());
        assert_eq!(*log.lock(), vec![(0, -1), (40, 0)]);
    }

    #[test]
    fn subscribe_through_hub() {
        let hub = EventHub::new();
        let node = hub.add_node(0);
        let log = Arc::new(Mutex::new(Vec::new()));

        let subscription = hub.subscribe(node, recording(&log)).unwrap();
        hub.publish(node, 1).unwrap();
        drop(subscription);
        hub.publish(node, 2).unwrap();

        assert_eq!(*log.lock(), vec![(0, -1), (1, 0)]);
    }

    #[test]
    fn hub_config_reaches_dispatchers() {
        let config = NotifyConfig {
            catch_panics: false,
            slow_listener_threshold_ms: Some(5),
        };
        let hub = EventHub::<i32>::with_config(config.clone());
        let node = hub.add_node(0);

        assert_eq!(hub.dispatcher(node).unwrap().config(), &config);
    }

    #[test]
    fn listener_reads_current_value_of_its_own_node() {
        let hub = Arc::new(EventHub::new());
        let node = hub.add_node(0);
        let reads = Arc::new(Mutex::new(Vec::new()));

        let hub_weak = Arc::downgrade(&hub);
        let reads_clone = reads.clone();
        hub.register_fn(node, move |_: &ValueEvent<i32>| {
            if let Some(hub) = hub_weak.upgrade() {
                let value = hub.current(node).map_err(ListenerError::from_source)?;
                reads_clone.lock().push(value);
            }
            Ok(())
        })
        .unwrap();

        let report = hub.publish(node, 9).unwrap();

        assert!(report.is_clean());
        assert_eq!(*reads.lock(), vec![0, 9]);
    }

    #[test]
    fn listener_removes_its_own_node() {
        let hub = Arc::new(EventHub::new());
        let node = hub.add_node(0);

        let hub_weak = Arc::downgrade(&hub);
        hub.register_fn(node, move |event: &ValueEvent<i32>| {
            if !event.is_bootstrap() {
                if let Some(hub) = hub_weak.upgrade() {
                    hub.remove_node(node);
                }
            }
            Ok(())
        })
        .unwrap();

        hub.publish(node, 1).unwrap();

        assert!(!hub.contains(node));
        assert_eq!(hub.publish(node, 2).unwrap_err(), DispatchError::UnknownNode(node));
    }
}
