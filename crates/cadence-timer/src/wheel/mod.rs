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

//! The hashed timer wheel.
//!
//! A wheel owns `capacity` slots, a node pool of the same size and an
//! overflow min-heap. A timer due within `capacity × tick_width` sits in the
//! slot of its tick; anything further out waits in the heap until the
//! advancing horizon reaches it.
//!
//! One background thread per wheel runs the tick procedure:
//!
//! 1. detach the current slot's bucket and walk it in insertion order,
//!    freeing tombstones and firing everything else,
//! 2. route non-success results through the optional error handler, where
//!    [`Status::Terminate`] frees the timer,
//! 3. re-arm recurring timers and free one-shots,
//! 4. advance slot and clock, drain the heap into the new horizon,
//! 5. place every re-armed node again,
//! 6. sleep until the next absolute tick boundary, or not at all when the
//!    tick overran so that no fire is ever dropped.
//!
//! All state sits behind one mutex. The lock is released while a callback
//! runs, so callbacks may schedule or cancel timers on their own wheel
//! through a [`Scheduler`].

mod state;

use self::state::WheelState;
use crate::config::WheelConfig;
use crate::error::TimerError;
use crate::pool::{TimerId, TimerStatus, TimerTask};
use cadence_core::Status;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// Hook invoked with the timer handle and the status of a failed callback.
///
/// Returning [`Status::Terminate`] frees the timer. Any other value lets the
/// timer continue as scheduled.
pub type ErrorHandler = Box<dyn FnMut(TimerId, Status) -> Status + Send>;

struct Shared<D> {
    state: Mutex<WheelState<D>>,
    error_handler: Mutex<Option<ErrorHandler>>,
    /// Serializes whole ticks, between the worker and manual `advance` calls.
    tick_guard: Mutex<()>,
    /// Thread currently inside `tick`, worker or not.
    ticking: Mutex<Option<ThreadId>>,
    running: AtomicBool,
    closed: AtomicBool,
}

/// Marks the calling thread as ticking until dropped.
struct TickingMark<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> TickingMark<'a> {
    fn set(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
        Self(slot)
    }
}

impl Drop for TickingMark<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl<D> Shared<D> {
    fn new(capacity: usize, tick_width: Duration) -> Self {
        Self {
            state: Mutex::new(WheelState::new(capacity, tick_width)),
            error_handler: Mutex::new(None),
            tick_guard: Mutex::new(()),
            ticking: Mutex::new(None),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// A callback that panicked must not wedge the wheel, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, WheelState<D>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true when the calling thread is running a tick of this wheel.
    fn is_ticking_here(&self) -> bool {
        *self.ticking.lock().unwrap_or_else(PoisonError::into_inner) == Some(thread::current().id())
    }

    fn schedule<F>(
        &self,
        timeout: Duration,
        interval: Duration,
        callback: F,
        data: D,
    ) -> Result<TimerId, TimerError>
    where
        F: FnMut(&mut D) -> Status + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(TimerError::Closed);
        }
        let task = TimerTask::new(Box::new(callback), data);
        let mut state = self.lock();
        if state.pool.available() == 0 {
            let capacity = state.capacity();
            drop(state);
            // The rejected payload is dropped without the lock.
            drop(task);
            return Err(TimerError::CapacityExceeded { capacity });
        }
        state.schedule(timeout, interval, task)
    }

    fn cancel(&self, id: TimerId) -> bool {
        let canceled = self.lock().pool.cancel(id);
        if canceled {
            log::debug!("Timer {id} canceled.");
        }
        canceled
    }

    fn status(&self, id: TimerId) -> TimerStatus {
        self.lock().pool.status(id)
    }

    /// Empties the wheel, dropping every payload after the lock is released.
    fn purge(&self) {
        let freed = self.lock().purge();
        drop(freed);
    }

    fn tick(&self) {
        let _tick = self.tick_guard.lock().unwrap_or_else(PoisonError::into_inner);
        let _mark = TickingMark::set(&self.ticking);

        let bucket = {
            let mut state = self.lock();
            log::trace!(
                "Ticking at {:?} with {} timer(s) due.",
                state.now_tick(),
                state.pool.in_use()
            );
            state.take_current_bucket()
        };

        // Freed nodes are dropped at the end of the tick, outside the lock.
        let mut freed = Vec::new();
        let mut rearm = Vec::new();
        for id in bucket {
            let mut task = {
                let mut state = self.lock();
                match state.pool.status(id) {
                    TimerStatus::Canceled => {
                        freed.extend(state.pool.release(id));
                        continue;
                    }
                    TimerStatus::Free => continue,
                    TimerStatus::Waiting => {}
                }
                match state.pool.node_mut(id).and_then(|node| node.task.take()) {
                    Some(task) => task,
                    None => continue,
                }
            };

            let code = task.run();
            let terminate = code != Status::Success && self.handle_failure(id, code);

            let mut state = self.lock();
            if state.pool.node(id).is_some_and(|node| node.task.is_some()) {
                // Purged and handed out again while the callback ran.
                continue;
            }
            if terminate || state.pool.status(id) == TimerStatus::Canceled {
                freed.extend(state.pool.release(id));
                continue;
            }
            match state.pool.node_mut(id) {
                Some(node) if !node.interval.is_zero() => {
                    node.expiry += node.interval;
                    node.task = Some(task);
                    rearm.push(id);
                }
                Some(_) => {
                    freed.extend(state.pool.release(id));
                }
                None => {}
            }
        }

        let reaped = self.lock().finish_tick(rearm);
        freed.extend(reaped);
        drop(freed);
    }

    /// Runs the error handler for a failed callback. Returns true when the
    /// handler asked for the timer to be terminated.
    fn handle_failure(&self, id: TimerId, code: Status) -> bool {
        let mut handler = self
            .error_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match handler.as_mut() {
            Some(handler) => {
                let verdict = handler(id, code);
                if verdict == Status::Terminate {
                    log::debug!("Timer {id} terminated by the error handler after {code:?}.");
                    true
                } else {
                    false
                }
            }
            None => {
                log::warn!("Timer {id} callback returned {code:?}; no error handler is set.");
                false
            }
        }
    }
}

fn run_worker<D>(shared: Arc<Shared<D>>) {
    log::info!("Timer wheel thread started.");
    while shared.running.load(Ordering::Acquire) {
        shared.tick();

        // Sleep until the absolute boundary of the next tick. An overrun
        // tick leaves the deadline in the past and the loop runs again at once.
        let deadline = shared.lock().now_tick();
        loop {
            if !shared.running.load(Ordering::Acquire) {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
    }
    log::info!("Timer wheel thread stopped.");
}

/// A cloneable handle for scheduling on a wheel from anywhere, including
/// from inside the wheel's own callbacks.
pub struct Scheduler<D> {
    shared: Arc<Shared<D>>,
}

impl<D> Scheduler<D> {
    /// See [`TimerWheel::schedule`].
    pub fn schedule<F>(
        &self,
        timeout: Duration,
        interval: Duration,
        callback: F,
        data: D,
    ) -> Result<TimerId, TimerError>
    where
        F: FnMut(&mut D) -> Status + Send + 'static,
    {
        self.shared.schedule(timeout, interval, callback, data)
    }

    /// See [`TimerWheel::cancel`].
    pub fn cancel(&self, id: TimerId) -> bool {
        self.shared.cancel(id)
    }

    /// See [`TimerWheel::status`].
    pub fn status(&self, id: TimerId) -> TimerStatus {
        self.shared.status(id)
    }
}

impl<D> Clone for Scheduler<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D> fmt::Debug for Scheduler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("closed", &self.shared.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Fixed-capacity hashed timer wheel with an overflow heap and a dedicated
/// ticking thread.
///
/// `D` is the payload each timer carries; the wheel owns it and drops it when
/// the timer's node is freed. A wheel with a zero tick width is untimed: it
/// only collects deadlines in its heap and never ticks.
pub struct TimerWheel<D = ()> {
    shared: Arc<Shared<D>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<D> TimerWheel<D> {
    /// Creates a stopped wheel with `capacity` slots and pool nodes.
    ///
    /// ## Panics
    /// If `capacity` is zero or does not fit a `u32` handle.
    pub fn new(capacity: usize, tick_width: Duration) -> Self {
        assert!(capacity > 0, "timer wheel capacity must be at least 1");
        assert!(
            capacity <= u32::MAX as usize,
            "timer wheel capacity exceeds the handle range"
        );
        log::debug!("TimerWheel initialized: {capacity} slots of {tick_width:?}.");
        Self {
            shared: Arc::new(Shared::new(capacity, tick_width)),
            worker: Mutex::new(None),
        }
    }

    /// Creates an untimed wheel, a plain deadline heap with no thread.
    pub fn untimed(capacity: usize) -> Self {
        Self::new(capacity, Duration::ZERO)
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true on the ticking thread and inside a manual `advance`.
    fn in_timer_context(&self) -> bool {
        self.shared.is_ticking_here()
            || self
                .lock_worker()
                .as_ref()
                .is_some_and(|handle| handle.thread().id() == thread::current().id())
    }

    /// Returns a cloneable scheduling handle for this wheel.
    pub fn scheduler(&self) -> Scheduler<D> {
        Scheduler {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Schedules `callback` to run with `data` once `timeout` has elapsed,
    /// then every `interval` if the interval is nonzero.
    ///
    /// ## Returns
    /// The timer's handle, valid until its node is freed.
    ///
    /// ## Errors
    /// [`TimerError::CapacityExceeded`] if every pool node is in use. The
    /// pool does not grow and existing timers are left untouched.
    pub fn schedule<F>(
        &self,
        timeout: Duration,
        interval: Duration,
        callback: F,
        data: D,
    ) -> Result<TimerId, TimerError>
    where
        F: FnMut(&mut D) -> Status + Send + 'static,
    {
        self.shared.schedule(timeout, interval, callback, data)
    }

    /// Tombstones a waiting timer.
    ///
    /// Returns false if the timer already fired, was already canceled, or the
    /// handle is invalid. The node stays allocated until the wheel reaches it.
    pub fn cancel(&self, id: TimerId) -> bool {
        self.shared.cancel(id)
    }

    /// Current lifecycle state of a handle.
    pub fn status(&self, id: TimerId) -> TimerStatus {
        self.shared.status(id)
    }

    /// Installs the hook that sees every non-success callback result.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: FnMut(TimerId, Status) -> Status + Send + 'static,
    {
        *self
            .shared
            .error_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(handler));
    }

    /// Removes the error hook.
    pub fn clear_error_handler(&self) {
        *self
            .shared
            .error_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Stops the ticking thread, joins it, then frees every pending timer.
    ///
    /// ## Errors
    /// * [`TimerError::NotRunning`] if no thread is running.
    /// * [`TimerError::CalledFromTimerThread`] from inside a callback.
    /// * [`TimerError::WorkerPanicked`] if the thread died in a callback. The
    ///   wheel is still stopped and purged.
    pub fn stop(&self) -> Result<(), TimerError> {
        if self.shared.is_ticking_here() {
            return Err(TimerError::CalledFromTimerThread);
        }
        let handle = {
            let mut worker = self.lock_worker();
            match worker.as_ref() {
                None => return Err(TimerError::NotRunning),
                Some(handle) if handle.thread().id() == thread::current().id() => {
                    return Err(TimerError::CalledFromTimerThread);
                }
                Some(_) => {}
            }
            worker.take()
        };

        self.shared.running.store(false, Ordering::Release);
        let joined = match handle {
            Some(handle) => {
                handle.thread().unpark();
                handle.join()
            }
            None => Ok(()),
        };

        self.shared.purge();
        log::info!("Timer wheel stopped; pending timers purged.");
        joined.map_err(|_| TimerError::WorkerPanicked)
    }

    /// Runs one tick on the calling thread.
    ///
    /// Lets an application drive a stopped, timed wheel from its own loop.
    ///
    /// ## Errors
    /// [`TimerError::AlreadyRunning`] while the ticking thread is alive,
    /// [`TimerError::Untimed`] for a zero tick width.
    pub fn advance(&self) -> Result<(), TimerError> {
        if self.lock_worker().is_some() {
            return Err(TimerError::AlreadyRunning);
        }
        if !self.shared.lock().is_timed() {
            return Err(TimerError::Untimed);
        }
        self.shared.tick();
        Ok(())
    }

    /// Number of slots, which is also the pool size.
    pub fn capacity(&self) -> usize {
        self.shared.lock().capacity()
    }

    /// Current tick width. Zero for an untimed wheel.
    pub fn tick_width(&self) -> Duration {
        self.shared.lock().tick_width()
    }

    /// Returns true while the ticking thread is alive.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Nodes currently waiting or tombstoned.
    pub fn pending(&self) -> usize {
        self.shared.lock().pool.in_use()
    }

    /// Nodes left on the free list.
    pub fn available(&self) -> usize {
        self.shared.lock().pool.available()
    }

    /// Earliest expiry among waiting timers.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.shared.lock().pool.earliest_waiting()
    }
}

impl<D: Send + 'static> TimerWheel<D> {
    /// Builds a wheel from a configuration, starting it if `autostart` is set
    /// and the tick width is nonzero.
    pub fn with_config(config: &WheelConfig) -> Result<Self, TimerError> {
        config.validate()?;
        let wheel = Self::new(config.capacity, config.tick_width());
        if config.autostart && !config.tick_width().is_zero() {
            wheel.start()?;
        }
        Ok(wheel)
    }

    /// Spawns the ticking thread.
    ///
    /// The wheel clock moves to the current instant. Timers scheduled while
    /// the wheel was stopped are shifted along with it, so none of them fires
    /// before its requested timeout.
    ///
    /// ## Errors
    /// [`TimerError::AlreadyRunning`], [`TimerError::Untimed`], or
    /// [`TimerError::Spawn`] if the OS refuses the thread.
    pub fn start(&self) -> Result<(), TimerError> {
        let mut worker = self.lock_worker();
        if worker.is_some() {
            return Err(TimerError::AlreadyRunning);
        }
        {
            let mut state = self.shared.lock();
            if !state.is_timed() {
                return Err(TimerError::Untimed);
            }
            if state.pool.in_use() == 0 {
                state.reset_clock(Instant::now());
            } else {
                state.rebase(Instant::now());
            }
        }

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("cadence-timer".into())
            .spawn(move || run_worker(shared));
        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                Err(TimerError::Spawn(err))
            }
        }
    }

    /// Switches to a new tick width.
    ///
    /// Stops the thread if it runs, discards every pending timer (slots and
    /// heap alike, expiries are not carried over) and restarts with the new
    /// width. A zero width leaves the wheel untimed and stopped.
    pub fn set_tick_width(&self, tick_width: Duration) -> Result<(), TimerError> {
        if self.in_timer_context() {
            return Err(TimerError::CalledFromTimerThread);
        }
        let stopped = match self.stop() {
            Err(TimerError::NotRunning) => Ok(()),
            other => other,
        };
        let freed = self.shared.lock().retune(tick_width);
        drop(freed);
        stopped?;
        log::info!("Timer wheel tick width set to {tick_width:?}.");

        if !tick_width.is_zero() {
            self.start()?;
        }
        Ok(())
    }
}

impl<D> Drop for TimerWheel<D> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        match self.stop() {
            Ok(()) | Err(TimerError::NotRunning) => {}
            Err(TimerError::CalledFromTimerThread) => {
                // Dropped by one of its own callbacks: let the thread wind down on its own.
                self.shared.running.store(false, Ordering::Release);
                self.lock_worker().take();
            }
            Err(err) => log::error!("Timer wheel shutdown failed: {err}"),
        }
        self.shared.purge();
        self.clear_error_handler();
    }
}

impl<D> fmt::Debug for TimerWheel<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("TimerWheel")
            .field("capacity", &state.capacity())
            .field("tick_width", &state.tick_width())
            .field("pending", &state.pool.in_use())
            .field("running", &self.shared.running.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const TICK: Duration = Duration::from_millis(10);

    fn counter() -> (Arc<AtomicUsize>, impl FnMut(&mut ()) -> Status + Send + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        (hits, move |_: &mut ()| {
            seen.fetch_add(1, Ordering::SeqCst);
            Status::Success
        })
    }

    #[test]
    fn test_one_shot_fires_once_and_frees_its_node() {
        let wheel = TimerWheel::new(8, TICK);
        let (hits, callback) = counter();
        let id = wheel.schedule(Duration::from_millis(20), Duration::ZERO, callback, ()).unwrap();
        assert_eq!(wheel.status(id), TimerStatus::Waiting);

        wheel.advance().unwrap();
        wheel.advance().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        wheel.advance().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(wheel.status(id), TimerStatus::Free);
        assert_eq!(wheel.available(), 8);

        for _ in 0..16 {
            wheel.advance().unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_recurring_timer_rearms_with_its_payload() {
        let wheel: TimerWheel<u32> = TimerWheel::new(4, TICK);
        let fired = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&fired);
        wheel
            .schedule(
                TICK,
                TICK * 2,
                move |count: &mut u32| {
                    *count += 1;
                    log.lock().unwrap().push(*count);
                    Status::Success
                },
                0,
            )
            .unwrap();

        for _ in 0..6 {
            wheel.advance().unwrap();
        }
        assert_eq!(*fired.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(wheel.pending(), 1);
    }

    #[test]
    fn test_canceled_timer_never_fires_and_is_freed_on_the_pass() {
        let wheel = TimerWheel::new(8, TICK);
        let (hits, callback) = counter();
        let id = wheel.schedule(TICK, Duration::ZERO, callback, ()).unwrap();

        assert!(wheel.cancel(id));
        assert!(!wheel.cancel(id));
        assert_eq!(wheel.status(id), TimerStatus::Canceled);
        assert_eq!(wheel.pending(), 1);

        wheel.advance().unwrap();
        wheel.advance().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(wheel.status(id), TimerStatus::Free);
        assert_eq!(wheel.pending(), 0);
    }

    #[test]
    fn test_canceled_overflow_timer_is_freed_when_drained() {
        let wheel = TimerWheel::new(2, TICK);
        let (hits, callback) = counter();
        let id = wheel.schedule(TICK * 5, Duration::ZERO, callback, ()).unwrap();
        assert!(wheel.cancel(id));

        for _ in 0..8 {
            wheel.advance().unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(wheel.available(), 2);
    }

    #[test]
    fn test_error_handler_terminate_frees_a_recurring_timer() {
        let wheel = TimerWheel::new(4, TICK);
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        wheel.set_error_handler(move |id, code| {
            sink.lock().unwrap().push((id, code));
            Status::Terminate
        });
        let id = wheel
            .schedule(Duration::ZERO, TICK, |_: &mut ()| Status::Error, ())
            .unwrap();

        for _ in 0..4 {
            wheel.advance().unwrap();
        }
        assert_eq!(*reports.lock().unwrap(), vec![(id, Status::Error)]);
        assert_eq!(wheel.status(id), TimerStatus::Free);
    }

    #[test]
    fn test_error_handler_other_verdicts_keep_the_schedule() {
        let wheel = TimerWheel::new(4, TICK);
        let reports = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&reports);
        wheel.set_error_handler(move |_, _| {
            sink.fetch_add(1, Ordering::SeqCst);
            Status::Continue
        });
        let id = wheel
            .schedule(Duration::ZERO, TICK, |_: &mut ()| Status::Error, ())
            .unwrap();

        for _ in 0..3 {
            wheel.advance().unwrap();
        }
        assert_eq!(reports.load(Ordering::SeqCst), 3);
        assert_eq!(wheel.status(id), TimerStatus::Waiting);

        wheel.clear_error_handler();
        wheel.advance().unwrap();
        assert_eq!(reports.load(Ordering::SeqCst), 3);
        assert_eq!(wheel.status(id), TimerStatus::Waiting);
    }

    #[test]
    fn test_callbacks_can_schedule_on_their_own_wheel() {
        let wheel = TimerWheel::new(4, TICK);
        let scheduler = wheel.scheduler();
        let (hits, callback) = counter();
        let mut callback = Some(callback);
        wheel
            .schedule(
                Duration::ZERO,
                Duration::ZERO,
                move |_: &mut ()| {
                    if let Some(callback) = callback.take() {
                        scheduler
                            .schedule(Duration::ZERO, Duration::ZERO, callback, ())
                            .unwrap();
                    }
                    Status::Success
                },
                (),
            )
            .unwrap();

        wheel.advance().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(wheel.pending(), 1);
        wheel.advance().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(wheel.pending(), 0);
    }

    #[test]
    fn test_callbacks_can_cancel_their_own_timer() {
        let wheel = TimerWheel::new(4, TICK);
        let scheduler = wheel.scheduler();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let slot = Arc::new(Mutex::new(None::<TimerId>));
        let own = Arc::clone(&slot);
        let id = wheel
            .schedule(
                Duration::ZERO,
                TICK,
                move |_: &mut ()| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    if let Some(id) = *own.lock().unwrap() {
                        scheduler.cancel(id);
                    }
                    Status::Success
                },
                (),
            )
            .unwrap();
        *slot.lock().unwrap() = Some(id);

        for _ in 0..4 {
            wheel.advance().unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(wheel.status(id), TimerStatus::Free);
    }

    #[test]
    fn test_full_pool_rejects_new_timers() {
        let wheel = TimerWheel::new(2, TICK);
        for _ in 0..2 {
            wheel.schedule(TICK, Duration::ZERO, |_: &mut ()| Status::Success, ()).unwrap();
        }
        let err = wheel
            .schedule(TICK, Duration::ZERO, |_: &mut ()| Status::Success, ())
            .unwrap_err();
        assert!(matches!(err, TimerError::CapacityExceeded { capacity: 2 }));
        assert_eq!(wheel.pending(), 2);
    }

    #[test]
    fn test_next_deadline_tracks_the_earliest_waiting_timer() {
        let wheel = TimerWheel::new(8, TICK);
        assert!(wheel.next_deadline().is_none());
        let late = wheel.schedule(TICK * 4, Duration::ZERO, |_: &mut ()| Status::Success, ()).unwrap();
        let early = wheel.schedule(TICK, Duration::ZERO, |_: &mut ()| Status::Success, ()).unwrap();
        let first = wheel.next_deadline().unwrap();

        wheel.cancel(early);
        let second = wheel.next_deadline().unwrap();
        assert_eq!(second - first, TICK * 3);

        wheel.cancel(late);
        assert!(wheel.next_deadline().is_none());
    }

    #[test]
    fn test_untimed_wheel_never_ticks() {
        let wheel = TimerWheel::untimed(4);
        let (hits, callback) = counter();
        wheel.schedule(Duration::ZERO, Duration::ZERO, callback, ()).unwrap();

        assert!(matches!(wheel.start(), Err(TimerError::Untimed)));
        assert!(matches!(wheel.advance(), Err(TimerError::Untimed)));
        assert!(!wheel.is_running());
        assert_eq!(wheel.pending(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lifecycle_errors() {
        let wheel: TimerWheel = TimerWheel::new(4, TICK);
        assert!(matches!(wheel.stop(), Err(TimerError::NotRunning)));

        wheel.start().unwrap();
        assert!(wheel.is_running());
        assert!(matches!(wheel.start(), Err(TimerError::AlreadyRunning)));
        assert!(matches!(wheel.advance(), Err(TimerError::AlreadyRunning)));

        wheel.stop().unwrap();
        assert!(!wheel.is_running());
    }

    #[test]
    fn test_stop_purges_pending_timers() {
        let wheel = TimerWheel::new(4, TICK);
        wheel.start().unwrap();
        wheel
            .schedule(Duration::from_secs(60), Duration::ZERO, |_: &mut ()| Status::Success, ())
            .unwrap();
        assert_eq!(wheel.pending(), 1);

        wheel.stop().unwrap();
        assert_eq!(wheel.pending(), 0);
        assert_eq!(wheel.available(), 4);
    }

    #[test]
    fn test_zero_tick_width_leaves_the_wheel_untimed_and_empty() {
        let wheel = TimerWheel::new(4, TICK);
        wheel
            .schedule(TICK, Duration::ZERO, |_: &mut ()| Status::Success, ())
            .unwrap();

        wheel.set_tick_width(Duration::ZERO).unwrap();
        assert_eq!(wheel.tick_width(), Duration::ZERO);
        assert_eq!(wheel.pending(), 0);
        assert!(!wheel.is_running());
    }

    #[test]
    fn test_scheduler_outliving_the_wheel_is_closed() {
        let wheel = TimerWheel::new(4, TICK);
        let scheduler = wheel.scheduler();
        drop(wheel);

        let err = scheduler
            .schedule(TICK, Duration::ZERO, |_: &mut ()| Status::Success, ())
            .unwrap_err();
        assert!(matches!(err, TimerError::Closed));
    }

    #[test]
    fn test_with_config_respects_autostart() {
        let config = WheelConfig {
            capacity: 16,
            tick_width_ms: 2,
            autostart: false,
        };
        let wheel: TimerWheel = TimerWheel::with_config(&config).unwrap();
        assert_eq!(wheel.capacity(), 16);
        assert_eq!(wheel.tick_width(), Duration::from_millis(2));
        assert!(!wheel.is_running());

        let invalid = WheelConfig {
            capacity: 0,
            ..config
        };
        assert!(matches!(
            TimerWheel::<()>::with_config(&invalid),
            Err(TimerError::Config(_))
        ));
    }

    #[test]
    fn test_cancel_of_a_later_entry_in_the_same_bucket_is_honored() {
        let wheel = TimerWheel::new(4, TICK);
        let scheduler = wheel.scheduler();
        let victim = Arc::new(Mutex::new(None::<TimerId>));
        let target = Arc::clone(&victim);
        wheel
            .schedule(
                Duration::ZERO,
                Duration::ZERO,
                move |_: &mut ()| {
                    if let Some(id) = *target.lock().unwrap() {
                        assert!(scheduler.cancel(id));
                    }
                    Status::Success
                },
                (),
            )
            .unwrap();
        let (hits, callback) = counter();
        let later = wheel.schedule(Duration::ZERO, Duration::ZERO, callback, ()).unwrap();
        *victim.lock().unwrap() = Some(later);

        wheel.advance().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(wheel.status(later), TimerStatus::Free);
        assert_eq!(wheel.available(), 4);
    }

    #[test]
    fn test_retune_and_stop_are_refused_inside_a_manual_tick() {
        let wheel = Arc::new(TimerWheel::<()>::new(8, TICK));
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        let inner = Arc::downgrade(&wheel);
        let scheduler = wheel.scheduler();
        wheel
            .schedule(
                Duration::ZERO,
                Duration::ZERO,
                move |_: &mut ()| {
                    if let Some(wheel) = inner.upgrade() {
                        let mut sink = sink.lock().unwrap();
                        sink.push(wheel.set_tick_width(Duration::ZERO));
                        sink.push(wheel.stop());
                    }
                    scheduler
                        .schedule(TICK / 2, Duration::ZERO, |_: &mut ()| Status::Success, ())
                        .unwrap();
                    Status::Success
                },
                (),
            )
            .unwrap();
        wheel
            .schedule(TICK * 20, Duration::ZERO, |_: &mut ()| Status::Success, ())
            .unwrap();

        wheel.advance().unwrap();
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|outcome| matches!(outcome, Err(TimerError::CalledFromTimerThread))));
        assert_eq!(wheel.tick_width(), TICK);
        assert_eq!(wheel.pending(), 2);

        // Outside a tick the same calls go through.
        wheel.set_tick_width(Duration::ZERO).unwrap();
        assert_eq!(wheel.pending(), 0);
    }

    struct Reentrant {
        scheduler: Option<Scheduler<Reentrant>>,
        attempts: Arc<AtomicUsize>,
    }

    impl Drop for Reentrant {
        fn drop(&mut self) {
            if let Some(scheduler) = self.scheduler.take() {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                let _ = scheduler.schedule(
                    TICK,
                    Duration::ZERO,
                    |_: &mut Reentrant| Status::Success,
                    Reentrant {
                        scheduler: None,
                        attempts: Arc::clone(&self.attempts),
                    },
                );
            }
        }
    }

    #[test]
    fn test_payload_drop_may_schedule_on_the_same_wheel() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let wheel: TimerWheel<Reentrant> = TimerWheel::new(2, TICK);
        let payload = || Reentrant {
            scheduler: Some(wheel.scheduler()),
            attempts: Arc::clone(&attempts),
        };

        // Reaped tombstone.
        let canceled = wheel
            .schedule(TICK, Duration::ZERO, |_: &mut Reentrant| Status::Success, payload())
            .unwrap();
        wheel.cancel(canceled);
        wheel.advance().unwrap();
        wheel.advance().unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(wheel.pending(), 1);

        // Fired one-shot.
        wheel
            .schedule(Duration::ZERO, Duration::ZERO, |_: &mut Reentrant| Status::Success, payload())
            .unwrap();
        wheel.advance().unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        // Rejected for capacity while the pool is full.
        while wheel.available() > 0 {
            wheel
                .schedule(TICK * 50, Duration::ZERO, |_: &mut Reentrant| Status::Success, payload())
                .unwrap();
        }
        let rejected = wheel.schedule(TICK, Duration::ZERO, |_: &mut Reentrant| Status::Success, payload());
        assert!(matches!(rejected, Err(TimerError::CapacityExceeded { .. })));
        assert!(attempts.load(Ordering::SeqCst) >= 3);

        // Dropping the wheel purges the rest; the payloads find it closed.
        drop(wheel);
    }
}
