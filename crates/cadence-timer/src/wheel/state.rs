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

//! Slot array, overflow heap and placement rule of the timer wheel.
//!
//! Everything here runs under the wheel lock. Callbacks are never invoked
//! from this module.

use crate::error::TimerError;
use crate::pool::{NodePool, TimerId, TimerNode, TimerStatus, TimerTask};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::mem;
use std::time::{Duration, Instant};

/// Overflow heap entry. The expiry is copied in because a node's expiry does
/// not change while it sits in the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OverflowEntry {
    expiry: Instant,
    /// Insertion sequence, so equal expiries leave the heap in FIFO order.
    seq: u64,
    id: TimerId,
}

impl Ord for OverflowEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.expiry
            .cmp(&other.expiry)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for OverflowEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Where a waiting or tombstoned node currently lives.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Location {
    Slot(usize),
    Overflow,
}

pub(crate) struct WheelState<D> {
    tick_width: Duration,
    /// Time of the tick the current slot belongs to.
    now_tick: Instant,
    slot_index: usize,
    pub(crate) pool: NodePool<D>,
    slots: Vec<Vec<TimerId>>,
    overflow: BinaryHeap<Reverse<OverflowEntry>>,
    seq: u64,
}

impl<D> WheelState<D> {
    pub(crate) fn new(capacity: usize, tick_width: Duration) -> Self {
        Self {
            tick_width,
            now_tick: Instant::now(),
            slot_index: 0,
            pool: NodePool::new(capacity),
            slots: vec![Vec::new(); capacity],
            overflow: BinaryHeap::new(),
            seq: 0,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn tick_width(&self) -> Duration {
        self.tick_width
    }

    #[inline]
    pub(crate) fn is_timed(&self) -> bool {
        !self.tick_width.is_zero()
    }

    #[inline]
    pub(crate) fn now_tick(&self) -> Instant {
        self.now_tick
    }

    /// Base for new expiries: the wheel clock when timed, the wall clock otherwise.
    fn current_time(&self) -> Instant {
        if self.is_timed() {
            self.now_tick
        } else {
            Instant::now()
        }
    }

    /// Whole ticks from the current tick boundary until `expiry`, rounded up.
    /// Zero for expiries at or before the boundary.
    fn ticks_until(&self, expiry: Instant) -> u64 {
        if !self.is_timed() {
            return 0;
        }
        let delta = expiry.saturating_duration_since(self.now_tick);
        let ticks = delta.as_nanos().div_ceil(self.tick_width.as_nanos());
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    pub(crate) fn schedule(
        &mut self,
        timeout: Duration,
        interval: Duration,
        task: TimerTask<D>,
    ) -> Result<TimerId, TimerError> {
        let expiry = self.current_time() + timeout;
        let node = TimerNode {
            expiry,
            interval,
            task: Some(task),
        };
        let id = self
            .pool
            .allocate(node)
            .ok_or(TimerError::CapacityExceeded {
                capacity: self.capacity(),
            })?;
        log::debug!(
            "Scheduled timer {} in {:?} (interval {:?}).",
            id,
            timeout,
            interval
        );
        self.place(id);
        Ok(id)
    }

    /// Routes a node to a slot bucket or the overflow heap by its expiry.
    ///
    /// An expiry at or before the current tick lands in the current slot. An
    /// offset of `capacity` ticks or more goes to the heap, never to a
    /// wrapped-around slot.
    pub(crate) fn place(&mut self, id: TimerId) {
        let Some(expiry) = self.pool.node(id).map(|node| node.expiry) else {
            return;
        };
        if !self.is_timed() {
            self.push_overflow(id, expiry);
            return;
        }

        let ticks = self.ticks_until(expiry);
        if ticks >= self.capacity() as u64 {
            log::trace!("Timer {id} is {ticks} ticks out, parked in overflow.");
            self.push_overflow(id, expiry);
        } else {
            let slot = (self.slot_index + ticks as usize) % self.capacity();
            log::trace!("Timer {id} placed in slot {slot} ({ticks} ticks out).");
            self.slots[slot].push(id);
        }
    }

    fn push_overflow(&mut self, id: TimerId, expiry: Instant) {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        self.overflow.push(Reverse(OverflowEntry { expiry, seq, id }));
    }

    /// Detaches the bucket of the current slot for processing.
    pub(crate) fn take_current_bucket(&mut self) -> Vec<TimerId> {
        mem::take(&mut self.slots[self.slot_index])
    }

    /// Completes a tick once the detached bucket has been processed.
    ///
    /// `rearm` holds the recurring timers that just fired. Anything scheduled
    /// into the current slot while callbacks ran is collected too. The slot
    /// and clock advance by one tick, overflow entries now inside the horizon
    /// are drained (tombstones are freed on the spot), and every collected
    /// node is placed again against the new clock.
    ///
    /// Returns the freed nodes so their payloads can be dropped outside the
    /// lock. A wheel retuned to zero width mid-tick only re-places.
    pub(crate) fn finish_tick(&mut self, mut rearm: Vec<TimerId>) -> Vec<TimerNode<D>> {
        let late = mem::take(&mut self.slots[self.slot_index]);
        rearm.extend(late);
        let mut freed = Vec::new();

        if !self.is_timed() {
            for id in rearm {
                self.place(id);
            }
            return freed;
        }

        self.slot_index = (self.slot_index + 1) % self.capacity();
        self.now_tick += self.tick_width;

        while let Some(Reverse(top)) = self.overflow.peek() {
            if self.ticks_until(top.expiry) >= self.capacity() as u64 {
                break;
            }
            let Some(Reverse(entry)) = self.overflow.pop() else {
                break;
            };
            match self.pool.status(entry.id) {
                TimerStatus::Canceled => freed.extend(self.pool.release(entry.id)),
                TimerStatus::Waiting => rearm.push(entry.id),
                TimerStatus::Free => {}
            }
        }

        for id in rearm {
            self.place(id);
        }
        freed
    }

    /// Empties every bucket and the heap and frees every node, handing the
    /// nodes back to the caller.
    pub(crate) fn purge(&mut self) -> Vec<TimerNode<D>> {
        self.slots.iter_mut().for_each(Vec::clear);
        self.overflow.clear();
        self.pool.purge()
    }

    pub(crate) fn reset_clock(&mut self, now: Instant) {
        self.now_tick = now;
        self.slot_index = 0;
    }

    /// Moves a lagging clock forward to `now` and shifts every pending
    /// expiry by the same amount.
    ///
    /// Slot offsets are relative to the clock and stay valid. Heap entries
    /// carry their own copy of the expiry and are rebuilt.
    pub(crate) fn rebase(&mut self, now: Instant) {
        let Some(lag) = now.checked_duration_since(self.now_tick) else {
            return;
        };
        self.now_tick = now;
        for index in 0..self.capacity() {
            if let Some(node) = self.pool.node_mut(TimerId::from_index(index)) {
                node.expiry += lag;
            }
        }
        let entries = mem::take(&mut self.overflow).into_vec();
        self.overflow = entries
            .into_iter()
            .map(|Reverse(mut entry)| {
                entry.expiry += lag;
                Reverse(entry)
            })
            .collect();
        log::debug!("Timer wheel clock moved forward by {lag:?}.");
    }

    /// Purges all state and switches to a new tick width.
    pub(crate) fn retune(&mut self, tick_width: Duration) -> Vec<TimerNode<D>> {
        let freed = self.purge();
        self.tick_width = tick_width;
        self.reset_clock(Instant::now());
        freed
    }

    #[cfg(test)]
    pub(crate) fn locate(&self, id: TimerId) -> Option<Location> {
        if let Some(slot) = self.slots.iter().position(|bucket| bucket.contains(&id)) {
            return Some(Location::Slot(slot));
        }
        self.overflow
            .iter()
            .any(|Reverse(entry)| entry.id == id)
            .then_some(Location::Overflow)
    }

    #[cfg(test)]
    pub(crate) fn slot_index(&self) -> usize {
        self.slot_index
    }
}
