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

use crate::error::EventError;
use crate::status::Status;
use crate::trie::{symbol_of, CompactTrie};

/// A boxed event handler receiving the emitted payload.
pub type Handler<D> = Box<dyn FnMut(&D) -> Status + Send>;

/// Checks that `name` only uses `[A-Za-z0-9._]`.
///
/// ## Errors
/// [`EventError::InvalidName`] carrying the first offending character.
pub fn validate_name(name: &str) -> Result<(), EventError> {
    match name.chars().find(|c| symbol_of(*c).is_none()) {
        Some(found) => Err(EventError::InvalidName {
            name: name.to_owned(),
            found,
        }),
        None => Ok(()),
    }
}

/// Registry of named events and their ordered handler lists.
///
/// Insertion order is invocation order. Lists grow without bound.
pub struct EventRegistry<D> {
    trie: CompactTrie<Vec<Handler<D>>>,
}

impl<D> EventRegistry<D> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        log::debug!("EventRegistry initialized.");
        Self {
            trie: CompactTrie::new(),
        }
    }

    /// Appends `handler` to the list for `name`, creating the entry if absent.
    ///
    /// ## Errors
    /// [`EventError::InvalidName`] if `name` is outside `[A-Za-z0-9._]`.
    pub fn register<F>(&mut self, name: &str, handler: F) -> Result<(), EventError>
    where
        F: FnMut(&D) -> Status + Send + 'static,
    {
        self.register_at(name, None, handler)
    }

    /// Inserts `handler` at position `place` in the list for `name`.
    ///
    /// `None`, or a position past the end, appends.
    pub fn register_at<F>(
        &mut self,
        name: &str,
        place: Option<usize>,
        handler: F,
    ) -> Result<(), EventError>
    where
        F: FnMut(&D) -> Status + Send + 'static,
    {
        validate_name(name)?;
        let handlers = self.trie.get_or_create(name)?;
        let index = place.map_or(handlers.len(), |p| p.min(handlers.len()));
        handlers.insert(index, Box::new(handler));
        log::debug!(
            "Registered handler #{} for event '{}' ({} total).",
            index,
            name,
            handlers.len()
        );
        Ok(())
    }

    /// Runs the handlers of `name` in order with `payload`.
    ///
    /// [`Status::Continue`] moves on to the next handler. Any other result
    /// stops the walk: the emit reports [`Status::Error`] if that handler
    /// returned `Error`, and [`Status::Success`] otherwise. An exhausted list,
    /// or a name nobody registered, reports `Success`. Looking up an unknown
    /// name does not create it.
    ///
    /// ## Errors
    /// [`EventError::InvalidName`] if `name` is outside `[A-Za-z0-9._]`.
    pub fn emit(&mut self, name: &str, payload: &D) -> Result<Status, EventError> {
        validate_name(name)?;
        let Some(handlers) = self.trie.get_mut(name) else {
            log::trace!("Event '{name}' has no handlers.");
            return Ok(Status::Success);
        };

        log::trace!("Emitting '{}' to {} handler(s).", name, handlers.len());
        for handler in handlers.iter_mut() {
            match handler(payload) {
                Status::Continue => continue,
                Status::Error => return Ok(Status::Error),
                _ => return Ok(Status::Success),
            }
        }
        Ok(Status::Success)
    }

    /// Number of handlers registered under `name`. Zero for unknown or invalid names.
    pub fn handler_count(&self, name: &str) -> usize {
        self.trie.get(name).map_or(0, Vec::len)
    }

    /// Returns true if at least one handler is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.handler_count(name) > 0
    }

    /// Removes every handler of `name`, returning how many were dropped.
    ///
    /// The trie path stays in place with an empty list.
    pub fn clear(&mut self, name: &str) -> usize {
        self.trie
            .get_mut(name)
            .map_or(0, |handlers| handlers.drain(..).count())
    }
}

impl<D> Default for EventRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> std::fmt::Debug for EventRegistry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("nodes", &self.trie.node_count())
            .finish()
    }
}
