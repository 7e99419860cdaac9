//! Topic Trie shared by the subscription and retained message trees
//!
//! A trie (prefix tree) keyed by topic level. Each node owns its children and
//! carries a payload `V`; the subscription tree stores subscriber maps, the
//! retained tree stores at most one message. Wildcards are ordinary child keys
//! (`+` and `#`), distinct from any literal level.
//!
//! Nodes whose payload is vacant and which have no children are pruned on
//! every mutating path, so repeated insert/remove cycles leave the trie in
//! its original shape. The root is never pruned.
//!
//! Performance optimizations:
//! - Uses callback-based matching to avoid intermediate allocations
//! - Uses compact_str for memory-efficient topic level storage
//! - Uses SmallVec for the path stack (typical topic depths fit inline)

use ahash::AHashMap;
use compact_str::CompactString;
use smallvec::SmallVec;

use super::path::{TopicLevel, MULTI_WILDCARD, SINGLE_WILDCARD};

/// Payload stored at every trie node
pub trait TrieValue: Default {
    /// Whether the payload holds nothing; vacant leaves are pruned
    fn is_vacant(&self) -> bool;
}

impl<T> TrieValue for Option<T> {
    fn is_vacant(&self) -> bool {
        self.is_none()
    }
}

/// Stack of level keys from the root to the node being visited
type PathStack<'a> = SmallVec<[&'a str; 8]>;

/// Node in the topic trie
#[derive(Debug, Default)]
struct TrieNode<V> {
    /// Payload stored at this exact path
    value: V,
    /// Children indexed by level token (CompactString avoids heap allocation for short strings)
    children: AHashMap<CompactString, TrieNode<V>>,
}

impl<V: TrieValue> TrieNode<V> {
    fn is_prunable(&self) -> bool {
        self.value.is_vacant() && self.children.is_empty()
    }

    fn count(&self) -> usize {
        1 + self.children.values().map(TrieNode::count).sum::<usize>()
    }
}

/// Topic Trie for subscription matching and retained message lookup
#[derive(Debug, Default)]
pub struct TopicTrie<V> {
    root: TrieNode<V>,
}

impl<V: TrieValue> TopicTrie<V> {
    pub fn new() -> Self {
        Self {
            root: TrieNode::default(),
        }
    }

    /// Whether the trie holds no payload at all
    pub fn is_empty(&self) -> bool {
        self.root.is_prunable()
    }

    /// Number of nodes, root included
    pub fn node_count(&self) -> usize {
        self.root.count()
    }

    /// Payload at an exact path
    pub fn get(&self, levels: &[&str]) -> Option<&V> {
        let mut node = &self.root;
        for level in levels {
            node = node.children.get(*level)?;
        }
        Some(&node.value)
    }

    /// Payload at an exact path, creating the nodes on the way
    pub fn get_or_insert(&mut self, levels: &[&str]) -> &mut V {
        let mut node = &mut self.root;
        for level in levels {
            node = node.children.entry(CompactString::new(level)).or_default();
        }
        &mut node.value
    }

    /// Mutate the payload at an existing path and prune the path afterwards.
    ///
    /// Returns `None` without touching the trie when the path does not exist.
    pub fn update<R, F>(&mut self, levels: &[&str], f: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        Self::update_recursive(&mut self.root, levels, f)
    }

    fn update_recursive<R, F>(node: &mut TrieNode<V>, levels: &[&str], f: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        let Some((level, rest)) = levels.split_first() else {
            return Some(f(&mut node.value));
        };

        let child = node.children.get_mut(*level)?;
        let result = Self::update_recursive(child, rest, f);
        if child.is_prunable() {
            node.children.remove(*level);
        }
        result
    }

    /// Mutate every payload in the trie, pruning whatever becomes empty
    pub fn update_all<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut V),
    {
        Self::update_all_recursive(&mut self.root, &mut f);
    }

    fn update_all_recursive<F>(node: &mut TrieNode<V>, f: &mut F)
    where
        F: FnMut(&mut V),
    {
        f(&mut node.value);
        node.children.retain(|_, child| {
            Self::update_all_recursive(child, f);
            !child.is_prunable()
        });
    }

    /// Find all payloads whose filter path matches a topic name.
    ///
    /// At every level three branches are explored: the `#` child (matches
    /// the rest of the topic, including nothing), the `+` child (any
    /// non-empty level) and the literal child. The callback runs once per
    /// matching node, so overlapping filters each report their own payload.
    ///
    /// `topic` must not contain wildcard levels.
    pub fn matches<F>(&self, topic: &[&str], mut callback: F)
    where
        F: FnMut(&V),
    {
        Self::matches_recursive(&self.root, topic, 0, &mut callback);
    }

    fn matches_recursive<F>(node: &TrieNode<V>, levels: &[&str], index: usize, callback: &mut F)
    where
        F: FnMut(&V),
    {
        if let Some(child) = node.children.get(MULTI_WILDCARD) {
            if !child.value.is_vacant() {
                callback(&child.value);
            }
        }

        if index >= levels.len() {
            if !node.value.is_vacant() {
                callback(&node.value);
            }
            return;
        }

        let level = levels[index];

        if !level.is_empty() {
            if let Some(child) = node.children.get(SINGLE_WILDCARD) {
                Self::matches_recursive(child, levels, index + 1, callback);
            }
        }

        if let Some(child) = node.children.get(level) {
            Self::matches_recursive(child, levels, index + 1, callback);
        }
    }

    /// Find all payloads stored at literal paths matched by a filter.
    ///
    /// This is the reverse direction of [`TopicTrie::matches`]: the trie is
    /// keyed by topic names and the wildcards come from the caller. The
    /// callback receives the levels of each matching path.
    pub fn matches_filter<F>(&self, filter: &[&str], mut callback: F)
    where
        F: FnMut(&[&str], &V),
    {
        let mut path = PathStack::new();
        Self::matches_filter_recursive(&self.root, filter, 0, &mut path, &mut callback);
    }

    fn matches_filter_recursive<'a, F>(
        node: &'a TrieNode<V>,
        filter: &[&str],
        index: usize,
        path: &mut PathStack<'a>,
        callback: &mut F,
    ) where
        F: FnMut(&[&str], &V),
    {
        if index >= filter.len() {
            if !node.value.is_vacant() {
                callback(path.as_slice(), &node.value);
            }
            return;
        }

        match TopicLevel::from(filter[index]) {
            TopicLevel::MultiWildcard => Self::walk_recursive(node, path, callback),
            TopicLevel::SingleWildcard => {
                for (key, child) in node.children.iter() {
                    if key.is_empty() {
                        continue;
                    }
                    path.push(key.as_str());
                    Self::matches_filter_recursive(child, filter, index + 1, path, callback);
                    path.pop();
                }
            }
            TopicLevel::Normal(literal) => {
                if let Some((key, child)) = node.children.get_key_value(literal) {
                    path.push(key.as_str());
                    Self::matches_filter_recursive(child, filter, index + 1, path, callback);
                    path.pop();
                }
            }
        }
    }

    /// Visit every non-vacant payload together with its path
    pub fn walk<F>(&self, mut callback: F)
    where
        F: FnMut(&[&str], &V),
    {
        let mut path = PathStack::new();
        Self::walk_recursive(&self.root, &mut path, &mut callback);
    }

    fn walk_recursive<'a, F>(node: &'a TrieNode<V>, path: &mut PathStack<'a>, callback: &mut F)
    where
        F: FnMut(&[&str], &V),
    {
        if !node.value.is_vacant() {
            callback(path.as_slice(), &node.value);
        }

        for (key, child) in node.children.iter() {
            path.push(key.as_str());
            Self::walk_recursive(child, path, callback);
            path.pop();
        }
    }
}
