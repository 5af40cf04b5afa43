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

//! A compact associative trie over the 64-symbol alphabet `[a-zA-Z0-9._]`.
//!
//! Every node keeps a `u64` occupancy mask where bit `x` is set when a child
//! exists for symbol `x`. Children are stored densely in the order of the set
//! bits, so the child for symbol `x` lives at `popcount(mask & ((1 << x) - 1))`.
//! No hashing and no per-node 64-entry table is needed.
//!
//! Nodes live in a single arena owned by the trie and refer to their children
//! by index. Dropping the trie drops every node.

use crate::error::KeyError;

/// Number of symbols in the trie alphabet.
pub const ALPHABET_SIZE: usize = 64;

/// Index of the root node in the arena. The root stands for the empty key.
const ROOT: u32 = 0;

/// Maps a character to its alphabet symbol.
///
/// `a-z` map to 0..=25, `A-Z` to 26..=51, `0-9` to 52..=61, `.` to 62 and
/// `_` to 63. Any other character has no symbol.
#[inline]
pub fn symbol_of(c: char) -> Option<u8> {
    match c {
        'a'..='z' => Some(c as u8 - b'a'),
        'A'..='Z' => Some(c as u8 - b'A' + 26),
        '0'..='9' => Some(c as u8 - b'0' + 52),
        '.' => Some(62),
        '_' => Some(63),
        _ => None,
    }
}

/// Maps an alphabet symbol back to its character. Symbols past 63 wrap.
#[inline]
pub fn char_of(symbol: u8) -> char {
    let symbol = symbol % ALPHABET_SIZE as u8;
    match symbol {
        0..=25 => (b'a' + symbol) as char,
        26..=51 => (b'A' + symbol - 26) as char,
        52..=61 => (b'0' + symbol - 52) as char,
        62 => '.',
        _ => '_',
    }
}

/// Translates a key into its symbol sequence, rejecting the whole key on the
/// first character outside the alphabet.
fn encode(key: &str) -> Result<Vec<u8>, KeyError> {
    key.chars()
        .map(|c| {
            symbol_of(c).ok_or_else(|| KeyError::InvalidSymbol {
                key: key.to_owned(),
                found: c,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
struct TrieNode<T> {
    mask: u64,
    /// Arena indices of the children, in ascending symbol order.
    children: Vec<u32>,
    value: T,
}

impl<T> TrieNode<T> {
    fn new(value: T) -> Self {
        Self {
            mask: 0,
            children: Vec::new(),
            value,
        }
    }

    #[inline]
    fn has_child(&self, symbol: u8) -> bool {
        (self.mask >> symbol) & 1 == 1
    }

    /// Compressed position of `symbol` among the node's children.
    #[inline]
    fn rank(&self, symbol: u8) -> usize {
        (self.mask & ((1u64 << symbol) - 1)).count_ones() as usize
    }

    #[inline]
    fn child(&self, symbol: u8) -> Option<u32> {
        if self.has_child(symbol) {
            Some(self.children[self.rank(symbol)])
        } else {
            None
        }
    }
}

/// An ordered associative container keyed by strings over `[a-zA-Z0-9._]`.
///
/// Paths are created lazily: [`CompactTrie::get_or_create`] materialises every
/// missing node on the way to the key, each holding a default payload.
/// Lookups through [`CompactTrie::get`] never mutate the trie.
#[derive(Debug, Clone)]
pub struct CompactTrie<T> {
    nodes: Vec<TrieNode<T>>,
}

impl<T: Default> CompactTrie<T> {
    /// Creates a trie holding only the root sentinel.
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::new(T::default())],
        }
    }

    /// Walks the path for `key`, creating any missing node with a default
    /// payload, and returns the payload slot of the terminal node.
    ///
    /// ## Errors
    /// Returns [`KeyError::InvalidSymbol`] if `key` holds a character outside
    /// the alphabet. Nothing is created in that case.
    pub fn get_or_create(&mut self, key: &str) -> Result<&mut T, KeyError> {
        let symbols = encode(key)?;
        let mut current = ROOT;
        for symbol in symbols {
            current = self.child_or_insert(current, symbol);
        }
        Ok(&mut self.nodes[current as usize].value)
    }

    /// Stores `value` at `key`, creating the path if needed.
    pub fn set(&mut self, key: &str, value: T) -> Result<(), KeyError> {
        *self.get_or_create(key)? = value;
        Ok(())
    }

    fn child_or_insert(&mut self, parent: u32, symbol: u8) -> u32 {
        if let Some(child) = self.nodes[parent as usize].child(symbol) {
            return child;
        }

        let index = self.nodes.len() as u32;
        self.nodes.push(TrieNode::new(T::default()));

        let node = &mut self.nodes[parent as usize];
        let rank = node.rank(symbol);
        node.mask |= 1u64 << symbol;
        node.children.insert(rank, index);
        index
    }
}

impl<T> CompactTrie<T> {
    fn find(&self, key: &str) -> Option<u32> {
        let mut current = ROOT;
        for c in key.chars() {
            let symbol = symbol_of(c)?;
            current = self.nodes[current as usize].child(symbol)?;
        }
        Some(current)
    }

    /// Returns the payload at `key` if its path has been materialised.
    ///
    /// A key with characters outside the alphabet can never be present and
    /// yields `None`.
    pub fn get(&self, key: &str) -> Option<&T> {
        self.find(key).map(|index| &self.nodes[index as usize].value)
    }

    /// Mutable counterpart of [`CompactTrie::get`]. Never creates nodes.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        let index = self.find(key)?;
        Some(&mut self.nodes[index as usize].value)
    }

    /// Returns true if the path for `key` exists.
    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Number of materialised nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true when nothing but the root exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Iterates over every materialised node as `(key, payload)`.
    ///
    /// Intermediate nodes created by longer keys are yielded too. The order is
    /// unspecified.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            trie: self,
            stack: vec![(ROOT, String::new())],
        }
    }
}

impl<T: Default> Default for CompactTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first iterator over a [`CompactTrie`].
pub struct Iter<'a, T> {
    trie: &'a CompactTrie<T>,
    stack: Vec<(u32, String)>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (String, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let (index, key) = self.stack.pop()?;
        let node = &self.trie.nodes[index as usize];

        let mut mask = node.mask;
        let mut rank = 0;
        while mask != 0 {
            let symbol = mask.trailing_zeros() as u8;
            let mut child_key = key.clone();
            child_key.push(char_of(symbol));
            self.stack.push((node.children[rank], child_key));
            mask &= mask - 1;
            rank += 1;
        }

        Some((key, &node.value))
    }
}
