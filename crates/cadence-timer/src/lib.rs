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

//! # Cadence Timer
//!
//! Deferred and recurring work on a hashed timer wheel.
//!
//! * [`wheel`]: the [`TimerWheel`], a fixed-capacity circular slot array with
//!   an overflow min-heap for deadlines past the horizon, driven by a
//!   dedicated ticking thread.
//! * [`pool`]: the fixed node pool and free list behind timer handles.
//! * [`bridge`]: the [`DeliveryBridge`], which turns a fired timer into a
//!   notification executed later on another thread.
//! * [`config`]: serde-backed [`WheelConfig`].

#![warn(missing_docs)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod pool;
pub mod wheel;

pub use bridge::{DeliveryBridge, Notification};
pub use cadence_core::Status;
pub use config::WheelConfig;
pub use error::{ConfigError, TimerError};
pub use pool::{TimerCallback, TimerId, TimerStatus};
pub use wheel::{ErrorHandler, Scheduler, TimerWheel};
