//! # Four-lane priority queue.
//!
//! [`PriorityQueue`] keeps one FIFO lane per [`Priority`] and always serves
//! the highest non-empty lane first.
//!
//! ```text
//! enqueue(item, prio) ──► [critical] [high] [normal] [low]
//!                              │        │       │       │
//! dequeue() ◄── first non-empty lane, scanning left → right
//! ```
//!
//! ## Rules
//! - FIFO within a lane, strict preemption across lanes.
//! - No capacity check here; the [`MessageBus`](crate::MessageBus) enforces it.
//! - A sustained stream of critical items starves lower lanes. This is an
//!   accepted tradeoff: priorities are honoured absolutely.

use std::collections::VecDeque;

use super::priority::Priority;

/// Per-lane item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneSizes {
    pub critical: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl LaneSizes {
    /// Sum over all lanes.
    pub fn total(&self) -> usize {
        self.critical + self.high + self.normal + self.low
    }
}

/// Priority queue with four independent FIFO lanes.
#[derive(Debug)]
pub struct PriorityQueue<T> {
    lanes: [VecDeque<T>; 4],
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            lanes: [
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
            ],
        }
    }

    /// Appends `item` to the lane for `priority`.
    pub fn enqueue(&mut self, item: T, priority: Priority) {
        self.lanes[priority.lane()].push_back(item);
    }

    /// Removes and returns the head of the first non-empty lane.
    pub fn dequeue(&mut self) -> Option<T> {
        self.lanes.iter_mut().find_map(VecDeque::pop_front)
    }

    /// Returns the item `dequeue()` would return, without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.lanes.iter().find_map(VecDeque::front)
    }

    /// Total number of items across lanes.
    pub fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    /// True if every lane is empty.
    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }

    /// Drops every queued item.
    pub fn clear(&mut self) {
        for lane in &mut self.lanes {
            lane.clear();
        }
    }

    /// Per-lane counts, for observability.
    pub fn sizes(&self) -> LaneSizes {
        LaneSizes {
            critical: self.lanes[Priority::Critical.lane()].len(),
            high: self.lanes[Priority::High.lane()].len(),
            normal: self.lanes[Priority::Normal.lane()].len(),
            low: self.lanes[Priority::Low.lane()].len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_higher_lane_always_first() {
        let mut q = PriorityQueue::new();
        q.enqueue("low", Priority::Low);
        q.enqueue("normal", Priority::Normal);
        q.enqueue("high", Priority::High);
        q.enqueue("critical", Priority::Critical);

        assert_eq!(q.dequeue(), Some("critical"));
        assert_eq!(q.dequeue(), Some("high"));
        assert_eq!(q.dequeue(), Some("normal"));
        assert_eq!(q.dequeue(), Some("low"));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn test_precedence_holds_for_interleaved_orders() {
        // Every permutation-ish interleaving drains in lane order.
        let orders: [[Priority; 4]; 3] = [
            [Priority::Normal, Priority::Critical, Priority::Low, Priority::High],
            [Priority::High, Priority::Low, Priority::Critical, Priority::Normal],
            [Priority::Low, Priority::Normal, Priority::High, Priority::Critical],
        ];
        for order in orders {
            let mut q = PriorityQueue::new();
            for (n, prio) in order.iter().enumerate() {
                q.enqueue((n, *prio), *prio);
                q.enqueue((n + 10, *prio), *prio);
            }
            let drained: Vec<Priority> = std::iter::from_fn(|| q.dequeue()).map(|(_, p)| p).collect();
            let mut sorted = drained.clone();
            sorted.sort_by_key(|p| p.lane());
            assert_eq!(drained, sorted);
        }
    }

    #[test]
    fn test_fifo_within_lane() {
        let mut q = PriorityQueue::new();
        for n in 0..100 {
            q.enqueue(n, Priority::Normal);
        }
        let drained: Vec<i32> = std::iter::from_fn(|| q.dequeue()).collect();
        assert_eq!(drained, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_peek_size_and_clear() {
        let mut q = PriorityQueue::new();
        assert!(q.peek().is_none());
        q.enqueue(1, Priority::Low);
        q.enqueue(2, Priority::High);
        q.enqueue(3, Priority::High);

        assert_eq!(q.peek(), Some(&2));
        assert_eq!(q.len(), 3);
        assert_eq!(
            q.sizes(),
            LaneSizes {
                critical: 0,
                high: 2,
                normal: 0,
                low: 1
            }
        );
        assert_eq!(q.sizes().total(), q.len());

        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.dequeue(), None);
    }
}
