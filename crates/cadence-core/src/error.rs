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

//! Error types for trie keys and event names.

use thiserror::Error;

/// A key contained a character outside the trie alphabet `[A-Za-z0-9._]`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key holds a character with no symbol in the alphabet.
    #[error("key '{key}' contains '{found}', only [A-Za-z0-9._] are allowed")]
    InvalidSymbol {
        /// The rejected key.
        key: String,
        /// The first offending character.
        found: char,
    },
}

/// Errors surfaced synchronously by the event registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The event name contains a character outside `[A-Za-z0-9._]`.
    #[error("invalid event name '{name}': '{found}' is not in [A-Za-z0-9._]")]
    InvalidName {
        /// The rejected event name.
        name: String,
        /// The first offending character.
        found: char,
    },
}

impl From<KeyError> for EventError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::InvalidSymbol { key, found } => EventError::InvalidName { name: key, found },
        }
    }
}
