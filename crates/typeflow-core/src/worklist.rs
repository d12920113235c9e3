//! Queue of pending block analyses across a compilation unit
//!
//! Besides the FIFO of `(routine, block)` pairs the worklist remembers which
//! caller blocks consumed which callee results. When a callee publishes a new
//! result, its waiters are queued again; blocks that held back their
//! successors for an unstable callee are released as well.

use crate::bound::{BlockId, ExprId};
use crate::symbols::RoutineId;
use fnv::{FnvHashMap, FnvHashSet};
use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;
use tracing::trace;

/// A block of some routine in the unit
pub type BlockRef = (RoutineId, BlockId);

/// Caller blocks interested in one callee
#[derive(Debug, Clone, Default)]
pub struct Dependents {
    /// Blocks that consumed the callee's result
    pub waiters: IndexSet<BlockRef>,
    /// Blocks whose successors are held back until the callee settles
    pub deferred: IndexSet<BlockRef>,
}

#[derive(Debug, Default)]
pub struct Worklist {
    queue: VecDeque<BlockRef>,
    queued: FnvHashSet<BlockRef>,
    pending: FnvHashMap<RoutineId, usize>,
    dependencies: IndexMap<RoutineId, Dependents>,
}

impl Worklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a block; returns false when it is already queued
    pub fn enqueue(&mut self, routine: RoutineId, block: BlockId) -> bool {
        if !self.queued.insert((routine, block)) {
            return false;
        }
        self.queue.push_back((routine, block));
        *self.pending.entry(routine).or_default() += 1;
        true
    }

    pub fn dequeue(&mut self) -> Option<BlockRef> {
        let entry = self.queue.pop_front()?;
        self.queued.remove(&entry);
        if let Some(count) = self.pending.get_mut(&entry.0) {
            *count = count.saturating_sub(1);
        }
        Some(entry)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_queued(&self, routine: RoutineId, block: BlockId) -> bool {
        self.queued.contains(&(routine, block))
    }

    /// No block of `routine` is waiting to be analyzed
    pub fn is_stable(&self, routine: RoutineId) -> bool {
        self.pending.get(&routine).copied().unwrap_or(0) == 0
    }

    /// Record that `caller` consumed the result of `callee` at `call`
    ///
    /// Returns true when the callee still has queued blocks, i.e. its result
    /// may still grow during this round.
    pub fn enqueue_routine(&mut self, callee: RoutineId, caller: BlockRef, call: ExprId) -> bool {
        let dependents = self.dependencies.entry(callee).or_default();
        if dependents.waiters.insert(caller) {
            trace!(?callee, ?caller, ?call, "registered result dependency");
        }
        !self.is_stable(callee)
    }

    /// Hold back `caller`'s successors until `callee` settles
    pub fn defer(&mut self, callee: RoutineId, caller: BlockRef) {
        self.dependencies.entry(callee).or_default().deferred.insert(caller);
    }

    pub fn dependents(&self, callee: RoutineId) -> Option<&Dependents> {
        self.dependencies.get(&callee)
    }

    pub fn waiters(&self, callee: RoutineId) -> impl Iterator<Item = BlockRef> + '_ {
        self.dependencies
            .get(&callee)
            .into_iter()
            .flat_map(|d| d.waiters.iter().copied())
    }

    /// Remove and return the blocks deferred on `callee`
    pub fn take_deferred(&mut self, callee: RoutineId) -> Vec<BlockRef> {
        match self.dependencies.get_mut(&callee) {
            Some(dependents) => dependents.deferred.drain(..).collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: RoutineId = RoutineId(0);
    const B: RoutineId = RoutineId(1);

    #[test]
    fn test_fifo_without_duplicates() {
        let mut worklist = Worklist::new();
        assert!(worklist.enqueue(A, BlockId(0)));
        assert!(worklist.enqueue(A, BlockId(1)));
        assert!(!worklist.enqueue(A, BlockId(0)));
        assert_eq!(worklist.len(), 2);

        assert_eq!(worklist.dequeue(), Some((A, BlockId(0))));
        assert!(!worklist.is_queued(A, BlockId(0)));
        assert!(worklist.enqueue(A, BlockId(0)));
        assert_eq!(worklist.dequeue(), Some((A, BlockId(1))));
        assert_eq!(worklist.dequeue(), Some((A, BlockId(0))));
        assert!(worklist.dequeue().is_none());
    }

    #[test]
    fn test_stability_tracks_pending_blocks() {
        let mut worklist = Worklist::new();
        assert!(worklist.is_stable(B));
        worklist.enqueue(B, BlockId(0));
        worklist.enqueue(B, BlockId(2));
        assert!(!worklist.is_stable(B));
        worklist.dequeue();
        assert!(!worklist.is_stable(B));
        worklist.dequeue();
        assert!(worklist.is_stable(B));
    }

    #[test]
    fn test_enqueue_routine_reports_unstable_callee() {
        let mut worklist = Worklist::new();
        worklist.enqueue(B, BlockId(0));

        assert!(worklist.enqueue_routine(B, (A, BlockId(3)), ExprId(7)));
        worklist.dequeue();
        assert!(!worklist.enqueue_routine(B, (A, BlockId(3)), ExprId(7)));

        let waiters: Vec<_> = worklist.waiters(B).collect();
        assert_eq!(waiters, vec![(A, BlockId(3))]);
        assert_eq!(worklist.waiters(A).count(), 0);
    }

    #[test]
    fn test_deferred_blocks_are_taken_once() {
        let mut worklist = Worklist::new();
        worklist.defer(B, (A, BlockId(1)));
        worklist.defer(B, (A, BlockId(1)));
        assert_eq!(worklist.take_deferred(B), vec![(A, BlockId(1))]);
        assert!(worklist.take_deferred(B).is_empty());
        assert!(worklist.dependents(B).is_some());
    }
}
