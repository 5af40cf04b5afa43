// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-size timer node pool.
//!
//! Every scheduled timer occupies one node, addressed by its pool index. Free
//! indices are kept on a stack so that allocation pops and release pushes,
//! both in O(1). The pool is sized once and never grows.

use cadence_core::Status;
use std::fmt;
use std::time::{Duration, Instant};

/// Stable handle of a scheduled timer: its index in the node pool.
///
/// A handle stays valid until its node is freed. Afterwards the index may be
/// handed out again to a new timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u32);

impl TimerId {
    /// Builds a handle from a raw pool index.
    #[inline]
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// The pool index behind this handle.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a pool node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimerStatus {
    /// On the free list. Also reported for out-of-range handles.
    #[default]
    Free,
    /// Scheduled in exactly one slot bucket or in the overflow heap.
    Waiting,
    /// Tombstoned; freed the next time its bucket or the heap reaches it.
    Canceled,
}

/// A boxed timer callback receiving the timer's payload.
pub type TimerCallback<D> = Box<dyn FnMut(&mut D) -> Status + Send>;

/// Callback plus the payload it runs against.
pub(crate) struct TimerTask<D> {
    callback: TimerCallback<D>,
    data: D,
}

impl<D> TimerTask<D> {
    pub(crate) fn new(callback: TimerCallback<D>, data: D) -> Self {
        Self { callback, data }
    }

    #[inline]
    pub(crate) fn run(&mut self) -> Status {
        (self.callback)(&mut self.data)
    }
}

pub(crate) struct TimerNode<D> {
    pub(crate) expiry: Instant,
    /// Zero for one-shot timers.
    pub(crate) interval: Duration,
    /// `None` only while the ticking thread is running the callback.
    pub(crate) task: Option<TimerTask<D>>,
}

pub(crate) struct NodePool<D> {
    nodes: Vec<Option<TimerNode<D>>>,
    status: Vec<TimerStatus>,
    free: Vec<u32>,
}

impl<D> NodePool<D> {
    pub(crate) fn new(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity);
        nodes.resize_with(capacity, || None);
        Self {
            nodes,
            status: vec![TimerStatus::Free; capacity],
            // Reversed so the lowest index is handed out first.
            free: (0..capacity as u32).rev().collect(),
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Length of the free list.
    #[inline]
    pub(crate) fn available(&self) -> usize {
        self.free.len()
    }

    /// Nodes that are waiting or tombstoned.
    #[inline]
    pub(crate) fn in_use(&self) -> usize {
        self.capacity() - self.free.len()
    }

    /// Pops a free index and stores `node` there as `Waiting`.
    /// Returns `None`, dropping `node`, when the pool is exhausted.
    pub(crate) fn allocate(&mut self, node: TimerNode<D>) -> Option<TimerId> {
        let index = self.free.pop()? as usize;
        debug_assert_eq!(self.status[index], TimerStatus::Free);
        self.nodes[index] = Some(node);
        self.status[index] = TimerStatus::Waiting;
        Some(TimerId::from_index(index))
    }

    /// Frees the node behind `id` and pushes its index back on the free list.
    /// Releasing a node that is already free does nothing.
    pub(crate) fn release(&mut self, id: TimerId) -> Option<TimerNode<D>> {
        let index = id.index();
        match self.status.get(index) {
            None | Some(TimerStatus::Free) => return None,
            Some(_) => {}
        }
        self.status[index] = TimerStatus::Free;
        self.free.push(index as u32);
        self.nodes[index].take()
    }

    pub(crate) fn status(&self, id: TimerId) -> TimerStatus {
        self.status.get(id.index()).copied().unwrap_or_default()
    }

    /// Tombstones a waiting node. Returns false for any other state.
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        match self.status.get_mut(id.index()) {
            Some(status) if *status == TimerStatus::Waiting => {
                *status = TimerStatus::Canceled;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn node(&self, id: TimerId) -> Option<&TimerNode<D>> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, id: TimerId) -> Option<&mut TimerNode<D>> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Earliest expiry among waiting nodes.
    pub(crate) fn earliest_waiting(&self) -> Option<Instant> {
        self.nodes
            .iter()
            .zip(&self.status)
            .filter(|(_, status)| **status == TimerStatus::Waiting)
            .filter_map(|(node, _)| node.as_ref().map(|n| n.expiry))
            .min()
    }

    /// Frees every node and rebuilds the free list. Returns the freed nodes.
    pub(crate) fn purge(&mut self) -> Vec<TimerNode<D>> {
        let freed = self.nodes.iter_mut().filter_map(Option::take).collect();
        self.status.fill(TimerStatus::Free);
        self.free.clear();
        self.free.extend((0..self.capacity() as u32).rev());
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(expiry: Instant) -> TimerNode<u32> {
        TimerNode {
            expiry,
            interval: Duration::ZERO,
            task: Some(TimerTask::new(Box::new(|_: &mut u32| Status::Success), 0)),
        }
    }

    #[test]
    fn test_allocation_hands_out_lowest_index_first() {
        let mut pool = NodePool::new(3);
        let now = Instant::now();
        assert_eq!(pool.allocate(node(now)), Some(TimerId::from_index(0)));
        assert_eq!(pool.allocate(node(now)), Some(TimerId::from_index(1)));
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn test_exhausted_pool_refuses_allocation() {
        let mut pool = NodePool::new(1);
        let now = Instant::now();
        assert!(pool.allocate(node(now)).is_some());
        assert!(pool.allocate(node(now)).is_none());
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn test_release_recycles_the_index() {
        let mut pool = NodePool::new(2);
        let now = Instant::now();
        let a = pool.allocate(node(now)).unwrap();
        let _b = pool.allocate(node(now)).unwrap();

        assert!(pool.release(a).is_some());
        assert_eq!(pool.status(a), TimerStatus::Free);
        assert!(pool.release(a).is_none(), "double release is ignored");
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.allocate(node(now)), Some(a));
    }

    #[test]
    fn test_cancel_only_affects_waiting_nodes() {
        let mut pool = NodePool::new(2);
        let id = pool.allocate(node(Instant::now())).unwrap();

        assert!(pool.cancel(id));
        assert_eq!(pool.status(id), TimerStatus::Canceled);
        assert!(!pool.cancel(id), "already canceled");
        assert!(!pool.cancel(TimerId::from_index(1)), "free node");
        assert!(!pool.cancel(TimerId::from_index(99)), "out of range");
        assert_eq!(pool.status(TimerId::from_index(99)), TimerStatus::Free);
    }

    #[test]
    fn test_earliest_waiting_skips_tombstones() {
        let mut pool = NodePool::new(3);
        let now = Instant::now();
        let early = pool.allocate(node(now)).unwrap();
        pool.allocate(node(now + Duration::from_millis(50))).unwrap();

        assert_eq!(pool.earliest_waiting(), Some(now));
        pool.cancel(early);
        assert_eq!(pool.earliest_waiting(), Some(now + Duration::from_millis(50)));
    }

    #[test]
    fn test_purge_frees_everything() {
        let mut pool = NodePool::new(4);
        let now = Instant::now();
        for _ in 0..4 {
            pool.allocate(node(now)).unwrap();
        }
        pool.cancel(TimerId::from_index(2));

        pool.purge();
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.in_use(), 0);
        assert!(pool.node(TimerId::from_index(2)).is_none());
        assert_eq!(pool.allocate(node(now)), Some(TimerId::from_index(0)));
    }
}
