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

//! Error types for the timer wheel and its configuration.

use thiserror::Error;

/// Errors returned by [`TimerWheel`](crate::TimerWheel) operations.
#[derive(Debug, Error)]
pub enum TimerError {
    /// Every node of the pool is in use. The pool never grows.
    #[error("timer pool exhausted: all {capacity} nodes are in use")]
    CapacityExceeded {
        /// Capacity of the exhausted pool.
        capacity: usize,
    },
    /// `start` was called while the ticking thread is alive.
    #[error("timer wheel is already running")]
    AlreadyRunning,
    /// `stop` was called without a ticking thread.
    #[error("timer wheel is not running")]
    NotRunning,
    /// The wheel has a zero tick width and works as a plain deadline heap.
    #[error("timer wheel has a zero tick width and cannot tick")]
    Untimed,
    /// `stop` or `set_tick_width` was called from a timer callback.
    #[error("cannot stop or retune the wheel from its own ticking thread")]
    CalledFromTimerThread,
    /// The OS refused to spawn the ticking thread.
    #[error("failed to spawn the ticking thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// The ticking thread panicked, most likely inside a callback.
    #[error("the ticking thread panicked")]
    WorkerPanicked,
    /// The wheel behind a [`Scheduler`](crate::Scheduler) has been dropped.
    #[error("timer wheel has been dropped")]
    Closed,
    /// The configuration handed to the wheel was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while loading a [`WheelConfig`](crate::WheelConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration is not valid JSON for this schema.
    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    /// The configuration parsed but holds unusable values.
    #[error("invalid config: {0}")]
    Invalid(String),
}
