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

//! The application entry object.

use crate::config::AppConfig;
use anyhow::{bail, Context, Result};
use cadence_core::{CompactTrie, EventRegistry, Status};
use cadence_timer::{DeliveryBridge, TimerError, TimerId, TimerStatus, TimerWheel};
use flume::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Payload handed to every event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Number of frame timer fires so far.
    pub index: u64,
    /// Time since the app was created.
    pub elapsed: Duration,
}

/// Signals posted by the platform layer into the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSignal {
    /// The user or the OS asked the application to close.
    Quit,
}

#[derive(Debug)]
struct FrameClock {
    origin: Instant,
    index: AtomicU64,
}

impl FrameClock {
    fn current(&self) -> Frame {
        Frame {
            index: self.index.load(Ordering::Acquire),
            elapsed: self.origin.elapsed(),
        }
    }

    fn advance(&self) -> Frame {
        Frame {
            index: self.index.fetch_add(1, Ordering::AcqRel) + 1,
            elapsed: self.origin.elapsed(),
        }
    }
}

/// Running flag plus the condition variable `join` waits on.
#[derive(Debug, Default)]
struct Lifecycle {
    running: Mutex<bool>,
    changed: Condvar,
}

impl Lifecycle {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, running: bool) {
        *self.lock() = running;
        self.changed.notify_all();
    }

    fn is_running(&self) -> bool {
        *self.lock()
    }

    fn wait_stopped(&self) {
        let guard = self.lock();
        let _stopped = self
            .changed
            .wait_while(guard, |running| *running)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

type Registry = Arc<Mutex<EventRegistry<Frame>>>;

fn lock_registry(registry: &Registry) -> MutexGuard<'_, EventRegistry<Frame>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Application entry object.
///
/// Owns the event registry, a property store and a timer wheel. `start`
/// drives a recurring frame timer that emits `"refresh"` then `"present"`;
/// `run` is the polling loop that turns [`PlatformSignal::Quit`] into a
/// `"quit"` event and executes bridged timers.
///
/// Handlers run with the registry locked, so a handler must not emit events
/// through the same `App`.
pub struct App {
    config: AppConfig,
    registry: Registry,
    props: Mutex<CompactTrie<serde_json::Value>>,
    wheel: TimerWheel,
    bridge: DeliveryBridge<()>,
    signals: (Sender<PlatformSignal>, Receiver<PlatformSignal>),
    clock: Arc<FrameClock>,
    lifecycle: Arc<Lifecycle>,
}

impl App {
    /// Creates an app and registers its default `"quit"` handler, which
    /// stops the polling loop.
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate().context("invalid app configuration")?;
        let wheel = TimerWheel::with_config(&config.wheel).context("failed to create the timer wheel")?;

        let lifecycle = Arc::new(Lifecycle::default());
        let mut registry = EventRegistry::new();
        let on_quit = Arc::clone(&lifecycle);
        registry.register("quit", move |_: &Frame| {
            on_quit.set(false);
            Status::Success
        })?;

        log::info!("App '{}' initialized.", config.name);
        Ok(Self {
            config,
            registry: Arc::new(Mutex::new(registry)),
            props: Mutex::new(CompactTrie::new()),
            wheel,
            bridge: DeliveryBridge::new(),
            signals: flume::unbounded(),
            clock: Arc::new(FrameClock {
                origin: Instant::now(),
                index: AtomicU64::new(0),
            }),
            lifecycle,
        })
    }

    /// The configuration the app was built from.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Appends `handler` to the handlers of `name`.
    pub fn register_event<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: FnMut(&Frame) -> Status + Send + 'static,
    {
        lock_registry(&self.registry)
            .register(name, handler)
            .with_context(|| format!("failed to register a handler for '{name}'"))
    }

    /// Inserts `handler` at position `place` of the handlers of `name`.
    ///
    /// Useful to run ahead of the default `"quit"` handler, which stops dispatch.
    pub fn register_event_at<F>(&self, name: &str, place: usize, handler: F) -> Result<()>
    where
        F: FnMut(&Frame) -> Status + Send + 'static,
    {
        lock_registry(&self.registry)
            .register_at(name, Some(place), handler)
            .with_context(|| format!("failed to register a handler for '{name}'"))
    }

    /// Emits `name` with the current frame.
    pub fn emit_event(&self, name: &str) -> Result<Status> {
        let frame = self.clock.current();
        lock_registry(&self.registry)
            .emit(name, &frame)
            .with_context(|| format!("failed to emit '{name}'"))
    }

    /// Stores `value` under `key` in the property store.
    pub fn set_property(&self, key: &str, value: impl Into<serde_json::Value>) -> Result<()> {
        self.props
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set(key, value.into())
            .with_context(|| format!("invalid property key '{key}'"))
    }

    /// Reads a property. Unset keys and intermediate path nodes read as `None`.
    pub fn property(&self, key: &str) -> Option<serde_json::Value> {
        self.props
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .filter(|value| !value.is_null())
            .cloned()
    }

    /// Schedules `callback` to run on the timer thread.
    pub fn schedule<F>(&self, timeout: Duration, interval: Duration, mut callback: F) -> Result<TimerId>
    where
        F: FnMut() -> Status + Send + 'static,
    {
        let id = self
            .wheel
            .schedule(timeout, interval, move |_: &mut ()| callback(), ())?;
        Ok(id)
    }

    /// Schedules `callback` to run on the thread that drives [`App::run`].
    pub fn create_event<F>(&self, timeout: Duration, interval: Duration, mut callback: F) -> Result<TimerId>
    where
        F: FnMut() -> Status + Send + 'static,
    {
        let id = self
            .bridge
            .schedule(&self.wheel, timeout, interval, move |_: &mut ()| callback(), ())?;
        Ok(id)
    }

    /// Cancels a timer created by [`App::schedule`] or [`App::create_event`].
    pub fn cancel(&self, id: TimerId) -> bool {
        self.wheel.cancel(id)
    }

    /// Lifecycle state of a timer handle.
    pub fn timer_status(&self, id: TimerId) -> TimerStatus {
        self.wheel.status(id)
    }

    /// Starts the frame clock at `fps` frames per second.
    ///
    /// Starts the wheel unless the configuration already did. Timers
    /// scheduled before the call keep their timeouts. Every frame emits
    /// `"refresh"` and then `"present"` from the timer thread.
    ///
    /// ## Returns
    /// The handle of the frame timer.
    pub fn start(&self, fps: u32) -> Result<TimerId> {
        if fps == 0 {
            bail!("frame rate must be at least 1");
        }
        if self.wheel.tick_width().is_zero() {
            bail!("the frame clock needs a timed wheel");
        }
        if !self.wheel.is_running() {
            self.wheel.start()?;
        }

        self.lifecycle.set(true);
        let period = Duration::from_millis(u64::from((1000 / fps).max(1)));
        let registry = Arc::clone(&self.registry);
        let clock = Arc::clone(&self.clock);
        let id = self.wheel.schedule(
            Duration::ZERO,
            period,
            move |_: &mut ()| {
                let frame = clock.advance();
                let mut registry = lock_registry(&registry);
                for name in ["refresh", "present"] {
                    match registry.emit(name, &frame) {
                        Ok(Status::Error) => log::warn!("'{name}' handler failed on frame {}.", frame.index),
                        Ok(_) => {}
                        Err(err) => log::error!("Frame event '{name}' rejected: {err}"),
                    }
                }
                Status::Success
            },
            (),
        )?;
        log::info!("App '{}' started at {fps} fps ({period:?} per frame).", self.config.name);
        Ok(id)
    }

    /// A sender the platform layer uses to post signals to [`App::run`].
    pub fn signal_sender(&self) -> Sender<PlatformSignal> {
        self.signals.0.clone()
    }

    /// The polling loop. Returns once the app stops running.
    ///
    /// Each iteration turns queued [`PlatformSignal::Quit`] signals into a
    /// `"quit"` event, runs bridged timer callbacks, then sleeps for 1 ms.
    pub fn run(&self) -> Result<()> {
        log::info!("Entering main loop.");
        while self.lifecycle.is_running() {
            for signal in self.signals.1.try_iter() {
                log::debug!("Polled platform signal {signal:?}.");
                match signal {
                    PlatformSignal::Quit => {
                        self.emit_event("quit")?;
                    }
                }
            }
            self.bridge.dispatch_pending();
            thread::sleep(Duration::from_millis(1));
        }
        log::info!("Main loop exited.");
        Ok(())
    }

    /// Returns true between `start` and `quit`.
    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Stops the polling loop and wakes every `join` caller.
    pub fn quit(&self) {
        self.lifecycle.set(false);
    }

    /// Blocks until the app stops running.
    pub fn join(&self) {
        self.lifecycle.wait_stopped();
    }

    /// Quits and stops the timer wheel, discarding pending timers.
    pub fn shutdown(&self) -> Result<()> {
        self.quit();
        match self.wheel.stop() {
            Ok(()) | Err(TimerError::NotRunning) => {}
            Err(err) => return Err(err).context("failed to stop the timer wheel"),
        }
        log::info!("App '{}' shut down.", self.config.name);
        Ok(())
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("name", &self.config.name)
            .field("running", &self.is_running())
            .field("wheel", &self.wheel)
            .finish_non_exhaustive()
    }
}
