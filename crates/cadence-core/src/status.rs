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

//! Result codes returned by event handlers, timer callbacks and error handlers.

/// Outcome reported by a handler or callback.
///
/// The numeric codes are stable and match [`Status::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// The work completed. Stops event dispatch.
    #[default]
    Success,
    /// The work failed. Stops event dispatch and makes the emit report an error.
    Error,
    /// Let the next handler in line run.
    Continue,
    /// Returned by a timer error handler to free the failing timer.
    Terminate,
}

impl Status {
    /// Returns the stable numeric code of this status.
    pub fn code(self) -> i32 {
        match self {
            Status::Success => 0,
            Status::Error => 1,
            Status::Continue => 2,
            Status::Terminate => 3,
        }
    }

    /// Maps a numeric code back to a status, if it is one of the known codes.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Status::Success),
            1 => Some(Status::Error),
            2 => Some(Status::Continue),
            3 => Some(Status::Terminate),
            _ => None,
        }
    }

    /// Returns true for [`Status::Success`].
    #[inline]
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}
