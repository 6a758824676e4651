use std::collections::BTreeMap;

use log::warn;

use crate::types::OpSeq;

/// Buffers authority-ordered items that may arrive out of order and releases
/// them strictly in sequence, with no gaps and no duplicates.
///
/// Items ahead of the next expected seq wait in the buffer; stale and
/// duplicate seqs are dropped.
pub struct OpReceiver<T> {
    next: OpSeq,
    buffer: BTreeMap<OpSeq, T>,
}

impl<T> OpReceiver<T> {
    pub fn new(next: OpSeq) -> Self {
        Self {
            next,
            buffer: BTreeMap::new(),
        }
    }

    /// Accepts one item. Returns false if the seq was already consumed or
    /// already buffered.
    pub fn insert(&mut self, seq: OpSeq, item: T) -> bool {
        if seq < self.next {
            warn!("dropping stale op seq {seq}, already applied up to {}", self.next);
            return false;
        }
        if self.buffer.contains_key(&seq) {
            warn!("dropping duplicate op seq {seq}");
            return false;
        }
        self.buffer.insert(seq, item);
        true
    }

    /// Releases the next in-sequence item, if it has arrived
    pub fn pop_ready(&mut self) -> Option<(OpSeq, T)> {
        let item = self.buffer.remove(&self.next)?;
        let seq = self.next;
        self.next += 1;
        Some((seq, item))
    }

    /// The seq the receiver is waiting for
    pub fn next_seq(&self) -> OpSeq {
        self.next
    }

    /// Buffered items, including any stuck behind a gap
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// True when items are buffered but the next-in-sequence one is missing
    pub fn has_gap(&self) -> bool {
        match self.buffer.keys().next() {
            Some(first) => *first != self.next,
            None => false,
        }
    }
}

// Tests
