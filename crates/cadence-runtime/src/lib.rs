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

//! # Cadence Runtime
//!
//! The [`App`] entry object: a named-event registry, a property store and a
//! timer wheel wired into a frame clock and a polling loop.

#![warn(missing_docs)]

pub mod app;
pub mod config;

pub use app::{App, Frame, PlatformSignal};
pub use config::AppConfig;

pub use cadence_core::{EventError, Status};
pub use cadence_timer::{TimerError, TimerId, TimerStatus};
