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

//! # Cadence Core
//!
//! Graphics-agnostic building blocks for the cadence event layer:
//!
//! * [`trie`]: a compact associative trie over a 64-symbol alphabet, using a
//!   per-node occupancy bitmask and popcount-compressed child indexing.
//! * [`event`]: a named-event registry built on the trie, dispatching to
//!   ordered handler lists with short-circuit semantics.
//! * [`status`]: the result codes shared by event handlers and timer callbacks.

#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod status;
pub mod trie;

pub use error::{EventError, KeyError};
pub use event::{EventRegistry, Handler};
pub use status::Status;
pub use trie::CompactTrie;
