//! Dispatcher Implementation
//!
//! The dispatcher owns the notification state of one node: its current
//! value, its timestamp source and its listener registry.
//!
//! # How Publishing Works
//!
//! 1. Take the node's publish lock. Concurrent publishes queue up here, so
//!    timestamps are issued in one total order.
//!
//! 2. Issue the next timestamp and store the new value as current. The
//!    current value lives behind its own short-lived lock, so listeners can
//!    read it while the publish lock is still held.
//!
//! 3. Snapshot the registry and call every still-active listener, one at a
//!    time, in registration order.
//!
//! 4. Release the lock and return a [`PublishReport`].
//!
//! # How Registering Works
//!
//! Registration takes the same publish lock, delivers a bootstrap event with
//! the current value, and only then adds the listener to the registry. A
//! registration racing a publish therefore lands either before it (and sees
//! the publish as its first real event) or after it (and sees the published
//! value in its bootstrap). Either way nothing is missed or duplicated.
//!
//! # Failures
//!
//! A listener that returns an error, or panics while panic isolation is on,
//! is recorded in the report and skipped. Delivery continues with the next
//! listener. Nothing is retried.
//!
//! # Blocking
//!
//! Delivery is synchronous. A slow listener delays every listener after it
//! and every publisher queued behind it; a listener that never returns
//! blocks the node forever.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::context::DeliveryContext;
use super::event::{Timestamp, ValueEvent};
use super::listener::{FnListener, Listener};
use super::registry::{Entry, ListenerRegistry, RegistrationHandle};
use super::timestamp::TimestampSource;
use crate::config::NotifyConfig;
use crate::error::{DispatchError, FailureCause, ListenerError, ListenerFailure};
use crate::graph::NodeId;

/// Outcome of one publish.
#[derive(Debug)]
pub struct PublishReport {
    node: NodeId,
    timestamp: Timestamp,
    delivered: usize,
    failures: SmallVec<[ListenerFailure; 1]>,
}

impl PublishReport {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Timestamp assigned to the published event.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Number of listeners that accepted the event.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn failures(&self) -> &[ListenerFailure] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<ListenerFailure> {
        self.failures.into_vec()
    }

    /// True if every listener accepted the event.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of a registration.
#[derive(Debug)]
pub struct Registration {
    handle: RegistrationHandle,
    bootstrap_failure: Option<ListenerFailure>,
}

impl Registration {
    pub fn handle(&self) -> RegistrationHandle {
        self.handle
    }

    /// Set if the listener failed on its bootstrap event. The listener stays
    /// registered regardless.
    pub fn bootstrap_failure(&self) -> Option<&ListenerFailure> {
        self.bootstrap_failure.as_ref()
    }

    pub fn into_handle(self) -> RegistrationHandle {
        self.handle
    }
}

/// Registration that is removed when dropped.
pub struct Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    dispatcher: Option<Weak<Dispatcher<T>>>,
    registration: Registration,
}

impl<T> Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn handle(&self) -> RegistrationHandle {
        self.registration.handle
    }

    pub fn bootstrap_failure(&self) -> Option<&ListenerFailure> {
        self.registration.bootstrap_failure()
    }

    /// Keep the listener registered after this guard is gone.
    pub fn detach(mut self) -> RegistrationHandle {
        self.dispatcher = None;
        self.registration.handle
    }
}

impl<T> Drop for Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take().and_then(|weak| weak.upgrade()) {
            dispatcher.unregister(self.registration.handle);
        }
    }
}

impl<T> fmt::Debug for Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("handle", &self.registration.handle)
            .field("attached", &self.dispatcher.is_some())
            .finish()
    }
}

/// What readers see of the node: its value and the last issued timestamp.
///
/// Written only while the publish lock is held, read without it.
struct Published<T> {
    value: T,
    last: Option<u64>,
}

/// Sequences and delivers the events of one node.
///
/// # Example
///
/// ```rust
/// use lattice_notify::{Dispatcher, Timestamp, ValueEvent};
///
/// let dispatcher = Dispatcher::new(0);
/// dispatcher
///     .register_fn(|event: &ValueEvent<i32>| {
///         println!("{} at {}", event.value(), event.timestamp());
///         Ok(())
///     })
///     .unwrap();
///
/// let report = dispatcher.publish(1).unwrap();
/// assert_eq!(report.timestamp(), Timestamp::Sequenced(0));
/// ```
pub struct Dispatcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    node: NodeId,
    /// Publish lock. Held across timestamp issue and the delivery loop.
    sequencer: Mutex<TimestampSource>,
    published: RwLock<Published<T>>,
    registry: ListenerRegistry<T>,
    config: NotifyConfig,
    closed: AtomicBool,
}

impl<T> Dispatcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a dispatcher for a fresh node holding `initial`.
    pub fn new(initial: T) -> Self {
        Self::for_node(NodeId::new(), initial, NotifyConfig::default())
    }

    pub fn with_config(initial: T, config: NotifyConfig) -> Self {
        Self::for_node(NodeId::new(), initial, config)
    }

    pub(crate) fn for_node(node: NodeId, initial: T, config: NotifyConfig) -> Self {
        Self {
            node,
            sequencer: Mutex::new(TimestampSource::new()),
            published: RwLock::new(Published {
                value: initial,
                last: None,
            }),
            registry: ListenerRegistry::new(node),
            config,
            closed: AtomicBool::new(false),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Publish a new value for the node.
    ///
    /// Blocks until every listener has been called.
    pub fn publish(&self, value: T) -> Result<PublishReport, DispatchError> {
        self.check_callable()?;

        let mut sequencer = self.sequencer.lock();
        if self.is_closed() {
            return Err(DispatchError::UnknownNode(self.node));
        }

        let seq = sequencer
            .next()
            .ok_or(DispatchError::TimestampExhausted(self.node))?;
        let timestamp = Timestamp::Sequenced(seq);
        {
            let mut published = self.published.write();
            published.value = value.clone();
            published.last = Some(seq);
        }
        let event = ValueEvent::new(value, timestamp);

        let entries = self.registry.snapshot();
        let _ctx = DeliveryContext::enter(self.node);

        let mut delivered = 0;
        let mut failures = SmallVec::new();
        for entry in entries {
            // Removed after the snapshot was taken.
            if !entry.is_active() {
                continue;
            }
            match self.deliver(&entry, &event) {
                Ok(()) => delivered += 1,
                Err(failure) => failures.push(failure),
            }
        }

        trace!(
            node = %self.node,
            %timestamp,
            delivered,
            failed = failures.len(),
            "published"
        );

        drop(sequencer);

        Ok(PublishReport {
            node: self.node,
            timestamp,
            delivered,
            failures,
        })
    }

    /// Register a listener.
    ///
    /// The listener receives a bootstrap event carrying the current value
    /// before this returns, and every later publish after that.
    pub fn register<L>(&self, listener: L) -> Result<Registration, DispatchError>
    where
        L: Listener<T> + 'static,
    {
        self.check_callable()?;

        let sequencer = self.sequencer.lock();
        if self.is_closed() {
            return Err(DispatchError::UnknownNode(self.node));
        }

        let entry = Arc::new(Entry::new(Box::new(listener)));
        let event = ValueEvent::bootstrap(self.current());

        let bootstrap_failure = {
            let _ctx = DeliveryContext::enter(self.node);
            self.deliver(&entry, &event).err()
        };

        let handle = self.registry.insert(entry);
        drop(sequencer);

        debug!(
            node = %self.node,
            listener = handle.listener().raw(),
            "listener registered"
        );

        Ok(Registration {
            handle,
            bootstrap_failure,
        })
    }

    /// Register a closure as a listener.
    pub fn register_fn<F>(&self, f: F) -> Result<Registration, DispatchError>
    where
        F: Fn(&ValueEvent<T>) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.register(FnListener::new(f))
    }

    /// Register a listener that is removed when the returned guard drops.
    pub fn subscribe<L>(self: &Arc<Self>, listener: L) -> Result<Subscription<T>, DispatchError>
    where
        L: Listener<T> + 'static,
    {
        let registration = self.register(listener)?;
        Ok(Subscription {
            dispatcher: Some(Arc::downgrade(self)),
            registration,
        })
    }

    /// Remove a registration.
    ///
    /// Once this returns the listener is not called again, except for a
    /// delivery another thread had already started. Stale handles are a
    /// no-op and return `false`. Safe to call from inside a listener.
    pub fn unregister(&self, handle: RegistrationHandle) -> bool {
        let removed = self.registry.unregister(handle);
        if removed {
            debug!(
                node = %self.node,
                listener = handle.listener().raw(),
                "listener unregistered"
            );
        } else {
            trace!(
                node = %self.node,
                listener = handle.listener().raw(),
                "unregister of stale handle ignored"
            );
        }
        removed
    }

    /// The node's current value.
    ///
    /// Does not wait for an in-flight publish, so it is safe to call from
    /// inside a listener. During a publish it already returns the value
    /// being delivered.
    pub fn current(&self) -> T {
        self.published.read().value.clone()
    }

    /// Sequence number of the last published event, if any.
    pub fn last_timestamp(&self) -> Option<u64> {
        self.published.read().last
    }

    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &ListenerRegistry<T> {
        &self.registry
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }

    /// Stop accepting publishes and registrations and drop every listener.
    ///
    /// Takes the publish lock so no registration can slip in after the
    /// clear. A listener closing its own node already holds that lock on
    /// this thread, and no other thread can be registering meanwhile.
    pub(crate) fn close(&self) -> usize {
        let _sequencer = if DeliveryContext::is_delivering(self.node) {
            None
        } else {
            Some(self.sequencer.lock())
        };
        self.closed.store(true, Ordering::Release);
        self.registry.clear()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_callable(&self) -> Result<(), DispatchError> {
        if DeliveryContext::is_delivering(self.node) {
            return Err(DispatchError::Reentrant { node: self.node });
        }
        if self.is_closed() {
            return Err(DispatchError::UnknownNode(self.node));
        }
        Ok(())
    }

    /// Hand one event to one entry, isolating its failure.
    fn deliver(&self, entry: &Entry<T>, event: &ValueEvent<T>) -> Result<(), ListenerFailure> {
        entry.advance(event.timestamp());

        let started = Instant::now();
        let outcome = if self.config.catch_panics {
            match panic::catch_unwind(AssertUnwindSafe(|| entry.listener().receive(event))) {
                Ok(result) => result.map_err(FailureCause::Error),
                Err(payload) => Err(FailureCause::Panic(panic_message(payload.as_ref()))),
            }
        } else {
            entry.listener().receive(event).map_err(FailureCause::Error)
        };

        if let Some(threshold) = self.config.slow_listener_threshold() {
            let elapsed = started.elapsed();
            if elapsed > threshold {
                warn!(
                    node = %self.node,
                    listener = entry.id().raw(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "slow listener is delaying delivery"
                );
            }
        }

        outcome.map_err(|cause| {
            warn!(
                node = %self.node,
                listener = entry.id().raw(),
                timestamp = %event.timestamp(),
                error = %cause,
                "listener failed"
            );
            ListenerFailure {
                node: self.node,
                listener: entry.id(),
                timestamp: event.timestamp(),
                cause,
            }
        })
    }
}

impl<T> fmt::Debug for Dispatcher<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("node", &self.node)
            .field("listener_count", &self.listener_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
