//! Track pool
//!
//! Free list of anonymous tracks created up front. The pool only holds keys;
//! the tracks themselves live in the audio manager's track table.

use serde::{Deserialize, Serialize};

use super::track::TrackKey;

/// What `acquire_track` does when the free list is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Create another track and count it towards the pool's capacity
    #[default]
    Elastic,
    /// Fail with `PoolExhausted`
    Bounded,
}

pub(crate) struct TrackPool {
    free: Vec<TrackKey>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl TrackPool {
    pub fn with_capacity(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            free: Vec::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    pub fn pop(&mut self) -> Option<TrackKey> {
        self.free.pop()
    }

    pub fn push(&mut self, key: TrackKey) {
        self.free.push(key);
    }

    /// Count one overflow track as a regular pool member
    pub fn grow(&mut self) {
        self.capacity += 1;
    }

    pub fn drain(&mut self) -> Vec<TrackKey> {
        std::mem::take(&mut self.free)
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub const fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_free_list_is_lifo() {
        let mut keys: SlotMap<TrackKey, ()> = SlotMap::with_key();
        let a = keys.insert(());
        let b = keys.insert(());

        let mut pool = TrackPool::with_capacity(2, OverflowPolicy::Elastic);
        pool.push(a);
        pool.push(b);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.pop(), Some(b));
        assert_eq!(pool.pop(), Some(a));
        assert_eq!(pool.pop(), None);
    }

    #[test]
    fn test_grow_counts_overflow() {
        let mut pool = TrackPool::with_capacity(1, OverflowPolicy::Elastic);
        pool.grow();
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_policy_parses_snake_case() {
        let policy: OverflowPolicy = ron::from_str("bounded").unwrap();
        assert_eq!(policy, OverflowPolicy::Bounded);
    }
}
