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

//! Cross-thread delivery of fired timers.
//!
//! A [`DeliveryBridge`] schedules an ordinary wheel timer whose only job is
//! to post a [`Notification`] into a `flume` queue. The application's polling
//! loop drains the queue and runs the packaged callback on its own thread.
//! The queue is unbounded: a stalled consumer lets notifications pile up.

use crate::error::TimerError;
use crate::pool::{TimerCallback, TimerId};
use crate::wheel::TimerWheel;
use cadence_core::Status;
use flume::{Receiver, Sender};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

struct Packed<D> {
    callback: TimerCallback<D>,
    data: D,
}

/// A fired timer waiting to be executed by the consumer.
///
/// Every fire of a recurring timer posts a fresh notification sharing the
/// same packaged callback, which lives until the last of them is dispatched
/// or dropped.
pub struct Notification<D> {
    timer: TimerId,
    packed: Arc<Mutex<Packed<D>>>,
}

impl<D> Notification<D> {
    /// Handle of the wheel timer that posted this notification.
    pub fn timer(&self) -> TimerId {
        self.timer
    }

    /// Runs the packaged callback on the calling thread, consuming the notification.
    pub fn dispatch(self) -> Status {
        let mut packed = self.packed.lock().unwrap_or_else(PoisonError::into_inner);
        let Packed { callback, data } = &mut *packed;
        callback(data)
    }
}

impl<D> fmt::Debug for Notification<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

/// Queue between a timer wheel and an application polling loop.
pub struct DeliveryBridge<D> {
    sender: Sender<Notification<D>>,
    receiver: Receiver<Notification<D>>,
}

impl<D: Send + 'static> DeliveryBridge<D> {
    /// Creates a bridge with an empty, unbounded queue.
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    /// Schedules `callback` on `wheel`, deferring its execution to whoever
    /// drains this bridge.
    ///
    /// ## Arguments
    /// * `wheel` - The wheel that measures the deadline. Its own payload is
    ///   left at `W::default()`.
    /// * `timeout` / `interval` - As for [`TimerWheel::schedule`].
    /// * `callback` / `data` - Run by [`Notification::dispatch`].
    ///
    /// ## Returns
    /// The handle of the underlying wheel timer, usable with
    /// [`TimerWheel::cancel`].
    pub fn schedule<W, F>(
        &self,
        wheel: &TimerWheel<W>,
        timeout: Duration,
        interval: Duration,
        callback: F,
        data: D,
    ) -> Result<TimerId, TimerError>
    where
        W: Default + Send + 'static,
        F: FnMut(&mut D) -> Status + Send + 'static,
    {
        let packed = Arc::new(Mutex::new(Packed {
            callback: Box::new(callback),
            data,
        }));
        let sender = self.sender.clone();
        let id = Arc::new(Mutex::new(None::<TimerId>));
        let own_id = Arc::clone(&id);
        // Held until the handle is known, so an immediate fire waits for it.
        let mut slot = id.lock().unwrap_or_else(PoisonError::into_inner);

        let timer = wheel.schedule(
            timeout,
            interval,
            move |_: &mut W| {
                let own = own_id.lock().unwrap_or_else(PoisonError::into_inner);
                let Some(timer) = *own else {
                    return Status::Continue;
                };
                let notification = Notification {
                    timer,
                    packed: Arc::clone(&packed),
                };
                match sender.send(notification) {
                    Ok(()) => Status::Success,
                    Err(_) => {
                        log::warn!("Delivery bridge for timer {timer} is gone; dropping notification.");
                        Status::Error
                    }
                }
            },
            W::default(),
        )?;
        *slot = Some(timer);
        drop(slot);
        log::debug!("Timer {timer} bridged to the polling loop.");
        Ok(timer)
    }

    /// A sender for posting notifications from elsewhere.
    pub fn sender(&self) -> Sender<Notification<D>> {
        self.sender.clone()
    }

    /// A receiver for consumers that block on the queue instead of polling.
    pub fn receiver(&self) -> Receiver<Notification<D>> {
        self.receiver.clone()
    }

    /// Runs every notification queued at the time of the call.
    ///
    /// ## Returns
    /// The number of notifications dispatched.
    pub fn dispatch_pending(&self) -> usize {
        let mut dispatched = 0;
        for notification in self.receiver.try_iter() {
            let timer = notification.timer();
            let code = notification.dispatch();
            if code != Status::Success {
                log::warn!("Bridged callback for timer {timer} returned {code:?}.");
            }
            dispatched += 1;
        }
        dispatched
    }

    /// Notifications waiting in the queue.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl<D: Send + 'static> Default for DeliveryBridge<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for DeliveryBridge<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryBridge")
            .field("pending", &self.receiver.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const TICK: Duration = Duration::from_millis(10);

    #[test]
    fn test_fired_timer_runs_only_when_dispatched() {
        let wheel: TimerWheel = TimerWheel::new(8, TICK);
        let bridge = DeliveryBridge::new();
        bridge
            .schedule(
                &wheel,
                Duration::ZERO,
                Duration::ZERO,
                |count: &mut u32| {
                    *count += 1;
                    Status::Success
                },
                0,
            )
            .unwrap();

        assert_eq!(bridge.pending(), 0);
        wheel.advance().unwrap();
        assert_eq!(bridge.pending(), 1);
        assert_eq!(wheel.pending(), 0);

        assert_eq!(bridge.dispatch_pending(), 1);
        assert_eq!(bridge.pending(), 0);
        assert_eq!(bridge.dispatch_pending(), 0);
    }

    #[test]
    fn test_recurring_notifications_share_one_payload() {
        let wheel: TimerWheel = TimerWheel::new(8, TICK);
        let bridge = DeliveryBridge::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bridge
            .schedule(
                &wheel,
                Duration::ZERO,
                TICK,
                move |count: &mut u32| {
                    *count += 1;
                    sink.lock().unwrap().push(*count);
                    Status::Success
                },
                0,
            )
            .unwrap();

        for _ in 0..3 {
            wheel.advance().unwrap();
        }
        assert_eq!(bridge.pending(), 3);
        assert_eq!(bridge.dispatch_pending(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_notifications_run_on_the_consuming_thread() {
        let wheel: TimerWheel = TimerWheel::new(8, TICK);
        let bridge = DeliveryBridge::new();
        let timer = bridge
            .schedule(
                &wheel,
                Duration::ZERO,
                Duration::ZERO,
                |origin: &mut Option<thread::ThreadId>| {
                    *origin = Some(thread::current().id());
                    Status::Success
                },
                None,
            )
            .unwrap();
        wheel.advance().unwrap();

        let receiver = bridge.receiver();
        let consumer = thread::spawn(move || {
            let notification = receiver.recv_timeout(Duration::from_secs(1)).unwrap();
            assert_eq!(notification.timer(), timer);
            let status = notification.dispatch();
            (status, thread::current().id())
        });
        let (status, consumer_id) = consumer.join().unwrap();
        assert_eq!(status, Status::Success);
        assert_ne!(consumer_id, thread::current().id());
    }

    #[test]
    fn test_canceled_bridged_timer_posts_nothing() {
        let wheel: TimerWheel = TimerWheel::new(8, TICK);
        let bridge = DeliveryBridge::new();
        let timer = bridge
            .schedule(&wheel, TICK, Duration::ZERO, |_: &mut ()| Status::Success, ())
            .unwrap();
        assert!(wheel.cancel(timer));

        wheel.advance().unwrap();
        wheel.advance().unwrap();
        assert_eq!(bridge.pending(), 0);
    }

    #[test]
    fn test_dropped_bridge_reports_an_error_to_the_wheel() {
        let wheel: TimerWheel = TimerWheel::new(8, TICK);
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        wheel.set_error_handler(move |id, code| {
            sink.lock().unwrap().push((id, code));
            Status::Terminate
        });

        let bridge = DeliveryBridge::new();
        let timer = bridge
            .schedule(&wheel, Duration::ZERO, TICK, |_: &mut ()| Status::Success, ())
            .unwrap();
        drop(bridge);

        wheel.advance().unwrap();
        assert_eq!(*reports.lock().unwrap(), vec![(timer, Status::Error)]);
        assert_eq!(wheel.pending(), 0);
    }
}
