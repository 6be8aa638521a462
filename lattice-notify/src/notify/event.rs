//! Value Events
//!
//! A [`ValueEvent`] pairs a snapshot of a node's value with the logical
//! timestamp of that snapshot.
//!
//! # Timestamps
//!
//! Timestamps only mean something relative to other timestamps of the *same*
//! node. Two nodes count independently, so comparing a timestamp from node A
//! with one from node B tells you nothing. For that reason [`Timestamp`] is
//! not `Ord`: compare the raw sequence numbers explicitly when you know they
//! came from the same node.
//!
//! The first event a listener sees is a bootstrap snapshot of the node's
//! value at registration time. It carries [`Timestamp::Bootstrap`] instead of
//! a sequence number and is not part of the node's sequence at all.

use std::fmt;

/// Logical timestamp of a [`ValueEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timestamp {
    /// Snapshot delivered when a listener registers. Not comparable to any
    /// sequenced timestamp, including ones from the same node.
    Bootstrap,

    /// Position in the node's own strictly increasing sequence.
    Sequenced(u64),
}

impl Timestamp {
    /// Raw value of the bootstrap sentinel.
    pub const BOOTSTRAP_RAW: i64 = -1;

    /// Integer form: the sequence number, or `-1` for bootstrap events.
    ///
    /// Dispatchers never issue sequence numbers above `i64::MAX`. A
    /// hand-built `Sequenced` beyond that saturates to `i64::MAX`, so it can
    /// never read back as the bootstrap sentinel.
    pub fn as_raw(&self) -> i64 {
        match self {
            Timestamp::Bootstrap => Self::BOOTSTRAP_RAW,
            Timestamp::Sequenced(seq) => i64::try_from(*seq).unwrap_or(i64::MAX),
        }
    }

    pub fn is_bootstrap(&self) -> bool {
        matches!(self, Timestamp::Bootstrap)
    }

    /// The sequence number, if this is not a bootstrap timestamp.
    pub fn sequence(&self) -> Option<u64> {
        match self {
            Timestamp::Bootstrap => None,
            Timestamp::Sequenced(seq) => Some(*seq),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Bootstrap => f.write_str("bootstrap"),
            Timestamp::Sequenced(seq) => write!(f, "#{}", seq),
        }
    }
}

/// An observed value of one node.
///
/// Events are immutable. Listeners receive them by reference; the same event
/// instance is shared by every listener of a publish.
#[derive(Debug, Clone)]
pub struct ValueEvent<T> {
    value: T,
    timestamp: Timestamp,
}

impl<T> ValueEvent<T> {
    pub fn new(value: T, timestamp: Timestamp) -> Self {
        Self { value, timestamp }
    }

    /// Build the bootstrap snapshot for a newly registered listener.
    pub fn bootstrap(value: T) -> Self {
        Self::new(value, Timestamp::Bootstrap)
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn is_bootstrap(&self) -> bool {
        self.timestamp.is_bootstrap()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
