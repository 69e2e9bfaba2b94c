//! Optimistic write ledger for a single field.
//!
//! ```text
//!            propose(v1)            confirm(t1)
//! Committed ───────────► Pending ──────────────► Committed(v1)
//!   (v0)                  │  ▲
//!                         │  └── propose(v2)     (stacked writes)
//!                         │
//!                         └─ reject(t1) ──► roll back to v0
//! ```
//!
//! The ledger holds the last committed value while writes are in flight.
//! Remote updates that arrive meanwhile are folded into the committed
//! value with [`amend`](Optimistic::amend), so a later rollback restores
//! the newest authoritative value rather than a stale one.

/// Identifies one proposed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    seq: u64,
}

#[derive(Debug)]
pub struct Optimistic<T> {
    committed: Option<T>,
    pending: Vec<(u64, T)>,
    generation: u64,
    next_seq: u64,
}

impl<T> Default for Optimistic<T> {
    fn default() -> Self {
        Self {
            committed: None,
            pending: Vec::new(),
            generation: 0,
            next_seq: 0,
        }
    }
}

impl<T: Clone> Optimistic<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a local write of `value` over `current`.
    pub fn propose(&mut self, current: T, value: T) -> Ticket {
        if self.pending.is_empty() {
            self.committed = Some(current);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push((seq, value));
        Ticket {
            generation: self.generation,
            seq,
        }
    }

    /// The write was accepted. Older writes still in flight are superseded.
    pub fn confirm(&mut self, ticket: Ticket) {
        if ticket.generation != self.generation {
            return;
        }
        let Some(index) = self.pending.iter().position(|(seq, _)| *seq == ticket.seq) else {
            return;
        };
        let (_, value) = self.pending.remove(index);
        self.pending.retain(|(seq, _)| *seq > ticket.seq);
        self.committed = Some(value);
    }

    /// The write failed. Returns the value to roll the field back to, or
    /// `None` when a newer write already owns the field (or the ledger was
    /// reset since).
    pub fn reject(&mut self, ticket: Ticket) -> Option<T> {
        if ticket.generation != self.generation {
            return None;
        }
        let index = self.pending.iter().position(|(seq, _)| *seq == ticket.seq)?;
        let newest = index + 1 == self.pending.len();
        self.pending.remove(index);
        if !newest {
            return None;
        }
        match self.pending.last() {
            Some((_, value)) => Some(value.clone()),
            None => self.committed.clone(),
        }
    }

    /// Fold an authoritative change into the committed value.
    pub fn amend(&mut self, apply: impl FnOnce(&mut T)) {
        if self.pending.is_empty() {
            return;
        }
        if let Some(committed) = self.committed.as_mut() {
            apply(committed);
        }
    }

    /// Forget every pending write; their tickets become stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.pending.clear();
        self.committed = None;
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
