//! # Delay queue for failed deliveries.
//!
//! A min-heap keyed by `(ready_at, seq)`. Failed messages wait here instead of
//! in detached timers, so the bus can count them toward capacity, clear them
//! on shutdown, and put them back into their priority lane in a defined order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tokio::time::Instant;

struct Entry<T> {
    ready_at: Instant,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ready_at
            .cmp(&other.ready_at)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Items ordered by the instant they become due; ties keep insertion order.
pub(crate) struct RetryQueue<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    seq: u64,
}

impl<T> Default for RetryQueue<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }
}

impl<T> RetryQueue<T> {
    pub(crate) fn schedule(&mut self, item: T, ready_at: Instant) {
        self.seq += 1;
        self.heap.push(Reverse(Entry {
            ready_at,
            seq: self.seq,
            item,
        }));
    }

    /// Pops the earliest item if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<T> {
        if self.next_ready_at()? > now {
            return None;
        }
        self.heap.pop().map(|Reverse(e)| e.item)
    }

    pub(crate) fn next_ready_at(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(e)| e.ready_at)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pops_only_due_items_in_time_order() {
        let now = Instant::now();
        let mut q = RetryQueue::default();
        q.schedule("late", now + Duration::from_millis(30));
        q.schedule("early", now + Duration::from_millis(10));
        q.schedule("early-2", now + Duration::from_millis(10));

        assert_eq!(q.pop_due(now), None);
        assert_eq!(q.next_ready_at(), Some(now + Duration::from_millis(10)));

        let t = now + Duration::from_millis(20);
        assert_eq!(q.pop_due(t), Some("early"));
        assert_eq!(q.pop_due(t), Some("early-2"));
        assert_eq!(q.pop_due(t), None);
        assert_eq!(q.len(), 1);

        q.clear();
        assert_eq!(q.len(), 0);
    }
}
