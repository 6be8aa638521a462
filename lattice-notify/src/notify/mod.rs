//! Change Notification
//!
//! This module implements the per-node notification layer: how a node tells
//! its observers that its value changed, and how those changes are ordered.
//!
//! # Concepts
//!
//! ## Events
//!
//! A [`ValueEvent`] is an immutable `(value, timestamp)` pair. Real events
//! carry [`Timestamp::Sequenced`] numbers that strictly increase per node.
//! The first event every listener receives is a bootstrap snapshot carrying
//! [`Timestamp::Bootstrap`] (raw value `-1`), which sits outside the
//! sequence.
//!
//! ## Listeners
//!
//! A [`Listener`] is a single-method callback. Any number may be registered
//! on a node, including the same one several times; each registration gets
//! its own stream.
//!
//! ## Dispatcher
//!
//! A [`Dispatcher`] serializes publishes for one node, delivers each event
//! to the registered listeners in registration order, and bootstraps new
//! listeners so they never miss or double-see a transition.
//!
//! # Implementation Notes
//!
//! Timestamps are deliberately scoped to one node. There is no global clock,
//! and comparing timestamps from two nodes is meaningless.

mod context;
mod dispatcher;
mod event;
mod listener;
mod registry;
mod timestamp;

pub use context::DeliveryContext;
pub use dispatcher::{Dispatcher, PublishReport, Registration, Subscription};
pub use event::{Timestamp, ValueEvent};
pub use listener::{FnListener, Listener, ListenerId};
pub use registry::{ListenerRegistry, RegistrationHandle};
pub use timestamp::TimestampSource;
