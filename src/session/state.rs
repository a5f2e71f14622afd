use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tokio::time::Instant;

/// Counters accumulated over one engagement session
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub scrolls: u64,
    pub likes: u64,
    pub explores: u64,
    pub scrape_triggers: u64,
    pub profiles_visited: u64,
}

impl SessionStats {
    /// Fold another session's counters into this one
    pub fn absorb(&mut self, other: &SessionStats) {
        self.scrolls += other.scrolls;
        self.likes += other.likes;
        self.explores += other.explores;
        self.scrape_triggers += other.scrape_triggers;
        self.profiles_visited += other.profiles_visited;
    }
}

/// Mutable working state for one session run
#[derive(Debug)]
pub struct SessionState {
    pub stats: SessionStats,
    /// Item references already scraped. Grows monotonically so no item is
    /// ever scraped twice within a run.
    pub visited_items: HashSet<String>,
    queue: VecDeque<String>,
    queue_cap: usize,
    /// Every identity ever enqueued, including those already visited
    ever_enqueued: HashSet<String>,
    pub total_enqueued: u64,
    /// Cooldown anchors. Clocks start at session start, so a phase first
    /// becomes eligible one cooldown into the session.
    pub last_explore: Instant,
    pub last_scrape: Instant,
    pub last_visit: Instant,
}

impl SessionState {
    pub fn new(queue_cap: usize) -> Self {
        let now = Instant::now();
        Self {
            stats: SessionStats::default(),
            visited_items: HashSet::new(),
            queue: VecDeque::new(),
            queue_cap,
            ever_enqueued: HashSet::new(),
            total_enqueued: 0,
            last_explore: now,
            last_scrape: now,
            last_visit: now,
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_has_room(&self) -> bool {
        self.queue.len() < self.queue_cap
    }

    /// Enqueue an identity for visiting unless it was ever enqueued before
    /// or the queue is at capacity. Returns whether it was added.
    pub fn enqueue_visit(&mut self, identity: &str) -> bool {
        if self.queue.len() >= self.queue_cap || self.ever_enqueued.contains(identity) {
            return false;
        }
        self.ever_enqueued.insert(identity.to_string());
        self.queue.push_back(identity.to_string());
        self.total_enqueued += 1;
        true
    }

    /// Next identity to visit, oldest first
    pub fn dequeue_visit(&mut self) -> Option<String> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_is_fifo() {
        let mut state = SessionState::new(10);
        assert!(state.enqueue_visit("alice"));
        assert!(state.enqueue_visit("bob"));
        assert_eq!(state.dequeue_visit().as_deref(), Some("alice"));
        assert_eq!(state.dequeue_visit().as_deref(), Some("bob"));
        assert_eq!(state.dequeue_visit(), None);
    }

    #[test]
    fn test_queue_respects_cap() {
        let mut state = SessionState::new(2);
        assert!(state.enqueue_visit("a"));
        assert!(state.enqueue_visit("b"));
        assert!(!state.queue_has_room());
        assert!(!state.enqueue_visit("c"));
        assert_eq!(state.queue_len(), 2);
        assert_eq!(state.total_enqueued, 2);
        // room opens up again after a dequeue
        state.dequeue_visit();
        assert!(state.enqueue_visit("c"));
        assert_eq!(state.total_enqueued, 3);
    }

    #[test]
    fn test_identities_never_requeued() {
        let mut state = SessionState::new(10);
        assert!(state.enqueue_visit("alice"));
        assert!(!state.enqueue_visit("alice"));
        state.dequeue_visit();
        // already visited once, so it stays out
        assert!(!state.enqueue_visit("alice"));
        assert_eq!(state.total_enqueued, 1);
    }

    #[test]
    fn test_absorb_sums_counters() {
        let mut total = SessionStats::default();
        let one = SessionStats {
            scrolls: 10,
            likes: 2,
            explores: 1,
            scrape_triggers: 1,
            profiles_visited: 3,
        };
        total.absorb(&one);
        total.absorb(&one);
        assert_eq!(total.scrolls, 20);
        assert_eq!(total.likes, 4);
        assert_eq!(total.explores, 2);
        assert_eq!(total.scrape_triggers, 2);
        assert_eq!(total.profiles_visited, 6);
    }
}
