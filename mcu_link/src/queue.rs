/*!
Priority outbound queue.

Three FIFO tiers of pre-encoded frames. The transmit tick always drains the
highest non-empty tier first. A tier that grows past its capacity is cut
back to the frame just pushed: on a motor-control link only the latest
command matters, so stale frames are dropped instead of blocking producers.
*/

use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Outbound priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Mid,
    Low,
}

impl Priority {
    /// Tiers in arbitration order
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Mid, Priority::Low];

    fn index(self) -> usize {
        match self {
            Self::High => 0,
            Self::Mid => 1,
            Self::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Mid => "mid",
            Self::Low => "low",
        }
    }
}

/// Per-tier capacity policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCapacities {
    pub high: usize,
    pub mid: usize,
    pub low: usize,
}

impl QueueCapacities {
    pub fn get(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.high,
            Priority::Mid => self.mid,
            Priority::Low => self.low,
        }
    }
}

impl Default for QueueCapacities {
    fn default() -> Self {
        Self {
            high: 3,
            mid: 5,
            low: 10,
        }
    }
}

/// Snapshot of queue counters
///
/// `dequeued` counts frames handed to the transmit tick, including any that
/// were then lost to a write error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub dropped: u64,
    pub dequeued: u64,
}

/// Thread-safe three-tier outbound queue
///
/// The lock is held only while a frame is pushed or popped, never across
/// serial I/O.
#[derive(Debug)]
pub struct PriorityQueue {
    tiers: Mutex<[VecDeque<Frame>; 3]>,
    capacities: QueueCapacities,
    submitted: AtomicU64,
    dropped: AtomicU64,
    dequeued: AtomicU64,
}

impl PriorityQueue {
    /// Create a queue with the given tier capacities
    pub fn new(capacities: QueueCapacities) -> Self {
        Self {
            tiers: Mutex::new([VecDeque::new(), VecDeque::new(), VecDeque::new()]),
            capacities,
            submitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
        }
    }

    pub fn capacities(&self) -> QueueCapacities {
        self.capacities
    }

    // A panic on another producer must not wedge the link.
    fn lock(&self) -> MutexGuard<'_, [VecDeque<Frame>; 3]> {
        self.tiers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push_locked(&self, tiers: &mut [VecDeque<Frame>; 3], priority: Priority, frame: Frame) {
        let tier = &mut tiers[priority.index()];
        tier.push_back(frame);
        self.submitted.fetch_add(1, Ordering::Relaxed);

        let capacity = self.capacities.get(priority);
        if tier.len() > capacity {
            let stale = tier.len() - 1;
            tier.drain(..stale);
            self.dropped.fetch_add(stale as u64, Ordering::Relaxed);
            warn!(
                "{} priority queue overflow (capacity {}), dropped {} stale frames",
                priority.as_str(),
                capacity,
                stale
            );
        }
    }

    /// Append a frame to a tier; never blocks, may drop stale frames
    pub fn submit(&self, priority: Priority, frame: Frame) {
        let mut tiers = self.lock();
        self.push_locked(&mut tiers, priority, frame);
    }

    /// Append several frames to one tier under a single lock acquisition
    pub fn submit_all<I>(&self, priority: Priority, frames: I)
    where
        I: IntoIterator<Item = Frame>,
    {
        let mut tiers = self.lock();
        for frame in frames {
            self.push_locked(&mut tiers, priority, frame);
        }
    }

    /// Pop the head of the highest-priority non-empty tier
    pub fn dequeue_next(&self) -> Option<Frame> {
        let mut tiers = self.lock();
        let frame = tiers.iter_mut().find_map(|tier| tier.pop_front());
        if frame.is_some() {
            self.dequeued.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Number of frames waiting in one tier
    pub fn len(&self, priority: Priority) -> usize {
        self.lock()[priority.index()].len()
    }

    /// Total frames waiting across all tiers
    pub fn total_len(&self) -> usize {
        self.lock().iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().iter().all(VecDeque::is_empty)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
        }
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new(QueueCapacities::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn tagged(tag: u8) -> Frame {
        Frame::encode(0x20, [tag, 0, 0, 0, 0, 0, 0, 0])
    }

    #[test]
    fn test_strict_priority_order() {
        let queue = PriorityQueue::default();
        queue.submit(Priority::Low, tagged(3));
        queue.submit(Priority::Mid, tagged(2));
        queue.submit(Priority::High, tagged(1));

        assert_eq!(queue.dequeue_next(), Some(tagged(1)));
        assert_eq!(queue.dequeue_next(), Some(tagged(2)));
        assert_eq!(queue.dequeue_next(), Some(tagged(3)));
        assert_eq!(queue.dequeue_next(), None);
    }

    #[test]
    fn test_fifo_within_tier() {
        let queue = PriorityQueue::default();
        for tag in 0..4 {
            queue.submit(Priority::Low, tagged(tag));
        }
        for tag in 0..4 {
            assert_eq!(queue.dequeue_next(), Some(tagged(tag)));
        }
    }

    #[test]
    fn test_overflow_keeps_newest_only() {
        let queue = PriorityQueue::default();
        let capacity = queue.capacities().mid;

        for tag in 0..=capacity as u8 {
            queue.submit(Priority::Mid, tagged(tag));
        }

        assert_eq!(queue.len(Priority::Mid), 1);
        assert_eq!(queue.dequeue_next(), Some(tagged(capacity as u8)));
        assert_eq!(queue.stats().dropped, capacity as u64);
    }

    #[test]
    fn test_filling_to_capacity_drops_nothing() {
        let queue = PriorityQueue::default();
        for tag in 0..3 {
            queue.submit(Priority::High, tagged(tag));
        }
        assert_eq!(queue.len(Priority::High), 3);
        assert_eq!(queue.stats().dropped, 0);
    }

    #[test]
    fn test_overflow_is_per_tier() {
        let queue = PriorityQueue::new(QueueCapacities { high: 1, mid: 1, low: 1 });
        queue.submit(Priority::Low, tagged(9));
        queue.submit(Priority::High, tagged(1));
        queue.submit(Priority::High, tagged(2));

        assert_eq!(queue.len(Priority::High), 1);
        assert_eq!(queue.len(Priority::Low), 1);
    }

    #[test]
    fn test_submit_all_keeps_frames_adjacent() {
        let queue = PriorityQueue::default();
        queue.submit_all(Priority::High, [tagged(1), tagged(2)]);
        assert_eq!(queue.total_len(), 2);
        assert_eq!(queue.dequeue_next(), Some(tagged(1)));
        assert_eq!(queue.dequeue_next(), Some(tagged(2)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_stats_count_dequeues() {
        let queue = PriorityQueue::new(QueueCapacities { high: 1, mid: 5, low: 5 });
        queue.submit(Priority::High, tagged(1));
        queue.submit(Priority::High, tagged(2));
        queue.submit(Priority::Low, tagged(3));

        queue.dequeue_next();
        queue.dequeue_next();
        assert_eq!(queue.dequeue_next(), None);

        assert_eq!(
            queue.stats(),
            QueueStats { submitted: 3, dropped: 1, dequeued: 2 }
        );
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(PriorityQueue::new(QueueCapacities { high: 1000, mid: 1000, low: 1000 }));

        let handles: Vec<_> = Priority::ALL
            .into_iter()
            .map(|priority| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for tag in 0..100 {
                        queue.submit(priority, tagged(tag));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.total_len(), 300);
        assert_eq!(queue.stats().submitted, 300);
    }
}
