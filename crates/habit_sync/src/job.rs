use std::collections::VecDeque;

use habit_domain::store::Collection;
use serde::{Deserialize, Serialize};

/// A full re-fetch of one or both mirrored collections. Notifications only ever queue
/// the per-collection kinds; `InitialFetch` is run directly on session start and on a
/// manual refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncJobKind {
    InitialFetch,
    RefetchHabits,
    RefetchCompletions,
}

impl SyncJobKind {
    pub fn for_collection(collection: Collection) -> Self {
        match collection {
            Collection::Habits => SyncJobKind::RefetchHabits,
            Collection::Completions => SyncJobKind::RefetchCompletions,
        }
    }
}

/// Pending refetches. A job already queued is not queued again, so a burst of
/// notifications costs one read per collection.
#[derive(Debug, Default)]
pub struct JobQueue {
    pending: VecDeque<SyncJobKind>,
}

impl JobQueue {
    pub fn push(&mut self, job: SyncJobKind) {
        if !self.pending.contains(&job) {
            self.pending.push_back(job);
        }
    }

    pub fn pop(&mut self) -> Option<SyncJobKind> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_refetches_coalesce() {
        let mut queue = JobQueue::default();
        queue.push(SyncJobKind::RefetchHabits);
        queue.push(SyncJobKind::RefetchCompletions);
        queue.push(SyncJobKind::RefetchHabits);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(SyncJobKind::RefetchHabits));
        assert_eq!(queue.pop(), Some(SyncJobKind::RefetchCompletions));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn burst_of_notifications_is_bounded_per_collection() {
        let mut queue = JobQueue::default();
        for _ in 0..50 {
            queue.push(SyncJobKind::for_collection(Collection::Completions));
            queue.push(SyncJobKind::for_collection(Collection::Habits));
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(SyncJobKind::RefetchCompletions));
        queue.push(SyncJobKind::RefetchCompletions);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn collection_maps_to_its_refetch() {
        assert_eq!(
            SyncJobKind::for_collection(Collection::Completions),
            SyncJobKind::RefetchCompletions
        );
    }
}
