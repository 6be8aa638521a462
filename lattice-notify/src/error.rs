//! Error Types
//!
//! Two families of errors live here:
//!
//! - Errors a listener hands back from its callback ([`ListenerError`]) and
//!   the record the dispatcher keeps when that happens ([`ListenerFailure`]).
//!   These never abort a publish; they are collected and reported.
//!
//! - Errors from the dispatch entry points themselves ([`DispatchError`]).

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::graph::NodeId;
use crate::notify::{ListenerId, Timestamp};

/// Error returned by a listener callback.
#[derive(Debug)]
pub struct ListenerError {
    message: String,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl ListenerError {
    /// Create an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error.
    pub fn from_source<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for ListenerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn StdError + 'static))
    }
}

/// Why a delivery failed.
#[derive(Debug)]
pub enum FailureCause {
    /// The listener returned an error.
    Error(ListenerError),

    /// The listener panicked. Holds the panic payload if it was a string.
    Panic(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Error(err) => write!(f, "{}", err),
            FailureCause::Panic(msg) => write!(f, "listener panicked: {}", msg),
        }
    }
}

/// One isolated delivery failure.
///
/// The event that failed is not retried.
#[derive(Debug, Error)]
#[error("listener {listener:?} failed on node {node} at {timestamp}: {cause}")]
pub struct ListenerFailure {
    pub node: NodeId,
    pub listener: ListenerId,
    pub timestamp: Timestamp,
    pub cause: FailureCause,
}

/// Errors returned by publish/register.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("node {0} is not registered")]
    UnknownNode(NodeId),

    /// A listener of `node` tried to publish to, or register on, the node it
    /// is being notified for. The per-node lock is held for the whole
    /// delivery, so this would deadlock.
    #[error("re-entrant dispatch on node {node} from inside one of its listeners")]
    Reentrant { node: NodeId },

    #[error("timestamp space exhausted for node {0}")]
    TimestampExhausted(NodeId),
}
