//! Sequence correlation tracker
//!
//! Remembers which in-flight CMD_SUBMIT requests were OUT transfers. A
//! RET_SUBMIT for such a request carries no transfer data even though its
//! `actual_length` is nonzero, so the reply side must know about it before it
//! can compute the reply's length.

use crate::length::TrackerEffect;
use std::collections::HashSet;

/// Default number of OUT requests that can be in flight at once
pub const DEFAULT_TRACKER_CAPACITY: usize = 256;

/// Result of applying a [`TrackerEffect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectOutcome {
    /// No tracker change was requested
    Unchanged,
    /// Sequence number is now tracked (or already was)
    Recorded,
    /// Sequence number is new and the table has no free slot
    TableFull,
    /// Sequence number was tracked and has been removed
    Taken,
    /// Sequence number was not tracked
    NotTracked,
}

/// Bounded set of pending OUT sequence numbers
///
/// An entry is removed only by the RET_SUBMIT that answers it. An OUT request
/// that is unlinked and answered with RET_UNLINK alone keeps its entry for the
/// rest of the session, so a long session with many cancelled OUT transfers
/// can fill the table. Once full, new OUT requests are not recorded and their
/// replies fall back to `actual_length` (see [`EffectOutcome::TableFull`]).
#[derive(Debug, Clone)]
pub struct SeqTracker {
    pending: HashSet<u32>,
    capacity: usize,
}

impl SeqTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TRACKER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Track `seqnum`.
    ///
    /// Recording an already tracked number succeeds without taking a slot.
    /// Returns `false` only when the number is new and the table is full.
    pub fn record(&mut self, seqnum: u32) -> bool {
        if self.pending.contains(&seqnum) {
            return true;
        }
        if self.pending.len() >= self.capacity {
            return false;
        }
        self.pending.insert(seqnum)
    }

    /// Remove `seqnum`, returning whether it was tracked
    pub fn take(&mut self, seqnum: u32) -> bool {
        self.pending.remove(&seqnum)
    }

    pub fn contains(&self, seqnum: u32) -> bool {
        self.pending.contains(&seqnum)
    }

    pub fn apply(&mut self, effect: TrackerEffect) -> EffectOutcome {
        match effect {
            TrackerEffect::None => EffectOutcome::Unchanged,
            TrackerEffect::Record(seqnum) => {
                if self.record(seqnum) {
                    EffectOutcome::Recorded
                } else {
                    EffectOutcome::TableFull
                }
            }
            TrackerEffect::Take(seqnum) => {
                if self.take(seqnum) {
                    EffectOutcome::Taken
                } else {
                    EffectOutcome::NotTracked
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.capacity
    }
}

impl Default for SeqTracker {
    fn default() -> Self {
        Self::new()
    }
}
