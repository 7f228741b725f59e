//! Scheduler for managing the crawl frontier and politeness limits
//!
//! This module handles:
//! - Priority queue management for discovery work items
//! - Delayed re-entry of retried work after its backoff
//! - Global concurrency limiting via semaphores
//! - Respecting a minimum interval between dispatches

use crate::crawler::stages::WorkItem;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A work item waiting in the frontier
#[derive(Debug, Clone)]
struct QueuedWork {
    item: WorkItem,
    /// Insertion order; breaks priority ties first-in first-out
    seq: u64,
}

// Higher priority values are popped first from BinaryHeap
impl Ord for QueuedWork {
    fn cmp(&self, other: &Self) -> Ordering {
        self.item
            .priority
            .cmp(&other.item.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedWork {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedWork {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedWork {}

/// A retried work item waiting out its backoff
#[derive(Debug, Clone)]
struct DelayedWork {
    ready_at: Instant,
    queued: QueuedWork,
}

impl Ord for DelayedWork {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ready_at
            .cmp(&other.ready_at)
            .then_with(|| self.queued.seq.cmp(&other.queued.seq))
    }
}

impl PartialOrd for DelayedWork {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DelayedWork {
    fn eq(&self, other: &Self) -> bool {
        self.queued.seq == other.queued.seq
    }
}

impl Eq for DelayedWork {}

/// A dispatched work item with its semaphore permit
#[derive(Debug)]
pub struct ScheduledWork {
    pub item: WorkItem,

    /// Released when the work item completes
    pub permit: OwnedSemaphorePermit,
}

/// What the scheduler can hand out right now
#[derive(Debug)]
pub enum Dispatch {
    /// A work item may start now
    Ready(ScheduledWork),

    /// Nothing may start before this much time has passed
    Wait(Duration),

    /// Every concurrency slot is taken
    Saturated,

    /// The frontier holds no work at all
    Empty,
}

/// Scheduler manages the frontier queue and politeness limits
///
/// The scheduler coordinates:
/// - Global concurrency limits (max in-flight work items)
/// - A minimum interval between consecutive dispatches
/// - Priority-based selection from the frontier
/// - Backoff delays for retried work
pub struct Scheduler {
    /// Global semaphore for limiting concurrent work items
    semaphore: Arc<Semaphore>,

    /// Work that may start now (higher priority first)
    frontier: BinaryHeap<QueuedWork>,

    /// Work that becomes eligible later (earliest first)
    delayed: BinaryHeap<Reverse<DelayedWork>>,

    minimum_interval: Duration,
    last_dispatch: Option<Instant>,
    next_seq: u64,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `max_concurrent` - Maximum number of in-flight work items
    /// * `minimum_interval` - Minimum time between two dispatches
    pub fn new(max_concurrent: usize, minimum_interval: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            frontier: BinaryHeap::new(),
            delayed: BinaryHeap::new(),
            minimum_interval,
            last_dispatch: None,
            next_seq: 0,
        }
    }

    fn queued(&mut self, item: WorkItem) -> QueuedWork {
        let seq = self.next_seq;
        self.next_seq += 1;
        QueuedWork { item, seq }
    }

    /// Adds a work item that may start immediately
    pub fn push(&mut self, item: WorkItem) {
        let queued = self.queued(item);
        self.frontier.push(queued);
    }

    /// Adds a work item that may start once `delay` has passed
    pub fn push_delayed(&mut self, item: WorkItem, delay: Duration) {
        if delay.is_zero() {
            return self.push(item);
        }
        let queued = self.queued(item);
        self.delayed.push(Reverse(DelayedWork {
            ready_at: Instant::now() + delay,
            queued,
        }));
    }

    fn promote_due(&mut self, now: Instant) {
        while let Some(Reverse(next)) = self.delayed.peek() {
            if next.ready_at > now {
                break;
            }
            if let Some(Reverse(due)) = self.delayed.pop() {
                self.frontier.push(due.queued);
            }
        }
    }

    /// Hands out the next work item if one may start at `now`
    pub fn next_ready(&mut self, now: Instant) -> Dispatch {
        self.promote_due(now);

        if self.frontier.is_empty() {
            return match self.delayed.peek() {
                Some(Reverse(next)) => Dispatch::Wait(next.ready_at.saturating_duration_since(now)),
                None => Dispatch::Empty,
            };
        }

        if let Some(last) = self.last_dispatch {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.minimum_interval {
                return Dispatch::Wait(self.minimum_interval - elapsed);
            }
        }

        let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Dispatch::Saturated,
        };

        match self.frontier.pop() {
            Some(queued) => {
                self.last_dispatch = Some(now);
                tracing::trace!(
                    "Dispatching {} (priority {})",
                    queued.item.describe(),
                    queued.item.priority
                );
                Dispatch::Ready(ScheduledWork {
                    item: queued.item,
                    permit,
                })
            }
            None => Dispatch::Empty,
        }
    }

    /// Number of work items waiting, delayed ones included
    pub fn frontier_size(&self) -> usize {
        self.frontier.len() + self.delayed.len()
    }

    /// Returns whether no work is waiting
    pub fn is_empty(&self) -> bool {
        self.frontier.is_empty() && self.delayed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::stages::Work;

    fn store(id: &str, priority: i32) -> WorkItem {
        let mut item = WorkItem::new(Work::Store {
            label: "berkeley-ca".to_string(),
            store_id: id.to_string(),
        });
        item.priority = priority;
        item
    }

    fn ready_id(dispatch: Dispatch) -> String {
        match dispatch {
            Dispatch::Ready(scheduled) => match scheduled.item.work {
                Work::Store { store_id, .. } => store_id,
                other => panic!("unexpected work {:?}", other),
            },
            other => panic!("expected ready work, got {:?}", other),
        }
    }

    #[test]
    fn test_new_scheduler() {
        let mut scheduler = Scheduler::new(4, Duration::ZERO);
        assert!(scheduler.is_empty());
        assert!(matches!(scheduler.next_ready(Instant::now()), Dispatch::Empty));
    }

    #[test]
    fn test_higher_priority_first_then_fifo() {
        let mut scheduler = Scheduler::new(10, Duration::ZERO);
        scheduler.push(store("retry", -1));
        scheduler.push(store("a", 0));
        scheduler.push(store("b", 0));

        let now = Instant::now();
        assert_eq!(ready_id(scheduler.next_ready(now)), "a");
        assert_eq!(ready_id(scheduler.next_ready(now)), "b");
        assert_eq!(ready_id(scheduler.next_ready(now)), "retry");
        assert_eq!(scheduler.frontier_size(), 0);
    }

    #[test]
    fn test_concurrency_limit() {
        let mut scheduler = Scheduler::new(1, Duration::ZERO);
        scheduler.push(store("a", 0));
        scheduler.push(store("b", 0));

        let first = scheduler.next_ready(Instant::now());
        assert!(matches!(first, Dispatch::Ready(_)));
        assert!(matches!(
            scheduler.next_ready(Instant::now()),
            Dispatch::Saturated
        ));

        drop(first);
        assert_eq!(ready_id(scheduler.next_ready(Instant::now())), "b");
    }

    #[test]
    fn test_minimum_interval() {
        let mut scheduler = Scheduler::new(10, Duration::from_millis(500));
        scheduler.push(store("a", 0));
        scheduler.push(store("b", 0));

        let now = Instant::now();
        assert_eq!(ready_id(scheduler.next_ready(now)), "a");
        match scheduler.next_ready(now + Duration::from_millis(200)) {
            Dispatch::Wait(wait) => assert_eq!(wait, Duration::from_millis(300)),
            other => panic!("expected wait, got {:?}", other),
        }
        assert_eq!(
            ready_id(scheduler.next_ready(now + Duration::from_millis(500))),
            "b"
        );
    }

    #[test]
    fn test_delayed_work_waits_for_backoff() {
        let mut scheduler = Scheduler::new(10, Duration::ZERO);
        scheduler.push_delayed(store("retry", 0), Duration::from_secs(60));

        assert!(!scheduler.is_empty());
        assert!(matches!(
            scheduler.next_ready(Instant::now()),
            Dispatch::Wait(_)
        ));
        assert_eq!(
            ready_id(scheduler.next_ready(Instant::now() + Duration::from_secs(61))),
            "retry"
        );
    }
}
