//! Item id allocation with delayed reuse.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{SessionError, SessionResult};

/// Number of ids a pool hands out.
pub const MAX_IDS: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdState {
    Free,
    Allocated,
    Timed,
}

/// Hands out item ids and holds freed ids back for a timeout, so a peer
/// never sees a new object reuse a recently removed object's id.
#[derive(Debug, Clone)]
pub struct SnapIdPool {
    states: Vec<IdState>,
    free: Vec<u16>,
    timed: VecDeque<(u16, Instant)>,
    timeout: Duration,
    in_usage: usize,
}

impl SnapIdPool {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            states: vec![IdState::Free; MAX_IDS],
            free: (0..MAX_IDS as u16).rev().collect(),
            timed: VecDeque::new(),
            timeout,
            in_usage: 0,
        }
    }

    /// Allocates the lowest recently released id. `None` when exhausted.
    pub fn new_id(&mut self, now: Instant) -> Option<u16> {
        while self
            .timed
            .front()
            .is_some_and(|&(_, deadline)| deadline < now)
        {
            self.release_first_timed();
        }
        let Some(id) = self.free.pop() else {
            tracing::warn!(in_usage = self.in_usage, "snap id pool exhausted");
            return None;
        };
        self.states[usize::from(id)] = IdState::Allocated;
        self.in_usage += 1;
        Some(id)
    }

    /// Returns `id` to the pool after the timeout.
    pub fn free_id(&mut self, id: u16, now: Instant) -> SessionResult<()> {
        match self.states.get(usize::from(id)) {
            Some(IdState::Allocated) => {}
            _ => return Err(SessionError::IdNotAllocated { id }),
        }
        self.states[usize::from(id)] = IdState::Timed;
        self.in_usage -= 1;
        self.timed.push_back((id, now + self.timeout));
        Ok(())
    }

    /// Releases every timed id immediately.
    pub fn timeout_all(&mut self) {
        while !self.timed.is_empty() {
            self.release_first_timed();
        }
    }

    /// Ids currently allocated.
    #[must_use]
    pub const fn in_usage(&self) -> usize {
        self.in_usage
    }

    /// Ids waiting out their timeout.
    #[must_use]
    pub fn timed(&self) -> usize {
        self.timed.len()
    }

    fn release_first_timed(&mut self) {
        if let Some((id, _)) = self.timed.pop_front() {
            self.states[usize::from(id)] = IdState::Free;
            self.free.push(id);
        }
    }
}

impl Default for SnapIdPool {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequentially() {
        let mut pool = SnapIdPool::default();
        let now = Instant::now();
        assert_eq!(pool.new_id(now), Some(0));
        assert_eq!(pool.new_id(now), Some(1));
        assert_eq!(pool.in_usage(), 2);
    }

    #[test]
    fn freed_ids_wait_for_timeout() {
        let mut pool = SnapIdPool::new(Duration::from_millis(100));
        let now = Instant::now();
        let id = pool.new_id(now).unwrap();
        pool.free_id(id, now).unwrap();
        assert_eq!(pool.timed(), 1);
        assert_eq!(pool.new_id(now + Duration::from_millis(50)), Some(1));
        assert_eq!(pool.new_id(now + Duration::from_millis(150)), Some(id));
        assert_eq!(pool.timed(), 0);
    }

    #[test]
    fn timeout_all_releases_everything() {
        let mut pool = SnapIdPool::default();
        let now = Instant::now();
        let id = pool.new_id(now).unwrap();
        pool.free_id(id, now).unwrap();
        pool.timeout_all();
        assert_eq!(pool.new_id(now), Some(id));
    }

    #[test]
    fn rejects_double_free() {
        let mut pool = SnapIdPool::default();
        let now = Instant::now();
        let id = pool.new_id(now).unwrap();
        pool.free_id(id, now).unwrap();
        assert!(matches!(
            pool.free_id(id, now),
            Err(SessionError::IdNotAllocated { id: 0 })
        ));
        assert!(pool.free_id(7, now).is_err());
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut pool = SnapIdPool::default();
        let now = Instant::now();
        for _ in 0..MAX_IDS {
            assert!(pool.new_id(now).is_some());
        }
        assert_eq!(pool.new_id(now), None);
        assert_eq!(pool.in_usage(), MAX_IDS);
    }
}
