//! Lattice Notify
//!
//! This crate provides the change-notification layer of the Lattice
//! incremental computation engine. It implements:
//!
//! - Per-node value events with logical timestamps
//! - Listener registration with a bootstrap snapshot on registration
//! - Ordered, synchronous delivery with isolated listener failures
//! - A node-keyed hub the engine publishes through
//!
//! The engine decides when a node changed and what its new value is. This
//! crate only sequences and delivers that change.
//!
//! # Architecture
//!
//! - `notify`: events, timestamps, listeners, the registry and the dispatcher
//! - `graph`: node identity and the [`EventHub`] keyed by it
//! - `config`: dispatcher tunables
//! - `error`: listener and dispatch errors
//!
//! # Example
//!
//! ```rust
//! use lattice_notify::{EventHub, ValueEvent};
//!
//! let hub = EventHub::new();
//! let node = hub.add_node(0);
//!
//! // Prints "0 at bootstrap" immediately
//! hub.register_fn(node, |event: &ValueEvent<i32>| {
//!     println!("{} at {}", event.value(), event.timestamp());
//!     Ok(())
//! })
//! .unwrap();
//!
//! // Prints "5 at #0"
//! hub.publish(node, 5).unwrap();
//! ```
//!
//! # Limitations
//!
//! Timestamps from different nodes are not comparable. Listeners run on the
//! publishing thread, so a listener that blocks stalls its node.

pub mod config;
pub mod error;
pub mod graph;
pub mod notify;

pub use config::NotifyConfig;
pub use error::{DispatchError, FailureCause, ListenerError, ListenerFailure};
pub use graph::{EventHub, NodeId};
pub use notify::{
    Dispatcher, FnListener, Listener, ListenerId, PublishReport, Registration,
    RegistrationHandle, Subscription, Timestamp, ValueEvent,
};
