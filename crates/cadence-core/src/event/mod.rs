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

//! Named-event dispatch.
//!
//! The [`EventRegistry`] maps event names over `[A-Za-z0-9._]` to ordered
//! handler lists stored in a [`CompactTrie`](crate::trie::CompactTrie).
//! Emitting a name runs its handlers in registration order until one of them
//! returns something other than [`Status::Continue`](crate::Status::Continue).
//!
//! The registry is generic over the payload `D` handed to every handler, so
//! higher-level crates decide what an event carries.

mod registry;

pub use self::registry::{validate_name, EventRegistry, Handler};
