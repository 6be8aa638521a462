//! Per-node timestamp source.
//!
//! Each dispatcher owns exactly one of these. There is intentionally no
//! shared or global counter: nodes are sequenced independently.

/// Strictly increasing counter for one node.
#[derive(Debug, Default)]
pub struct TimestampSource {
    last: Option<u64>,
}

impl TimestampSource {
    /// Largest value ever issued. Keeps [`Timestamp::as_raw`] exact.
    ///
    /// [`Timestamp::as_raw`]: super::Timestamp::as_raw
    pub const MAX: u64 = i64::MAX as u64;

    pub fn new() -> Self {
        Self { last: None }
    }

    /// Issue the next timestamp.
    ///
    /// Returns `None` once the sequence is exhausted; it never wraps.
    pub fn next(&mut self) -> Option<u64> {
        let next = match self.last {
            None => 0,
            Some(last) if last >= Self::MAX => return None,
            Some(last) => last + 1,
        };
        debug_assert!(self.last.map_or(true, |last| next > last));
        self.last = Some(next);
        Some(next)
    }

    /// The most recently issued timestamp, if any.
    pub fn last(&self) -> Option<u64> {
        self.last
    }
}
