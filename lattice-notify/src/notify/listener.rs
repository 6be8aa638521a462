//! Listener types.
//!
//! A listener is a callback capability: it is handed events and nothing
//! else. It has no reference back to the node or dispatcher that calls it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::event::ValueEvent;
use crate::error::ListenerError;

/// Unique identifier for one registration.
///
/// Registering the same listener twice produces two ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for ListenerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Receives the events of one node.
///
/// `receive` runs synchronously on the publishing thread and blocks delivery
/// to every listener registered after this one. Hand long work off elsewhere.
pub trait Listener<T>: Send + Sync {
    fn receive(&self, event: &ValueEvent<T>) -> Result<(), ListenerError>;
}

impl<T, L> Listener<T> for Arc<L>
where
    L: Listener<T> + ?Sized,
{
    fn receive(&self, event: &ValueEvent<T>) -> Result<(), ListenerError> {
        (**self).receive(event)
    }
}

impl<T, L> Listener<T> for Box<L>
where
    L: Listener<T> + ?Sized,
{
    fn receive(&self, event: &ValueEvent<T>) -> Result<(), ListenerError> {
        (**self).receive(event)
    }
}

/// Adapts a closure into a [`Listener`].
pub struct FnListener<F> {
    f: F,
}

impl<F> FnListener<F> {
    pub fn new<T>(f: F) -> Self
    where
        F: Fn(&ValueEvent<T>) -> Result<(), ListenerError> + Send + Sync,
    {
        Self { f }
    }
}

impl<T, F> Listener<T> for FnListener<F>
where
    F: Fn(&ValueEvent<T>) -> Result<(), ListenerError> + Send + Sync,
{
    fn receive(&self, event: &ValueEvent<T>) -> Result<(), ListenerError> {
        (self.f)(event)
    }
}
