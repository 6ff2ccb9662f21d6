//! `ResDict`: the ordered, string-keyed container every section of an archive
//! is published through.
//!
//! On disk a dictionary is a Patricia trie; the trie links are decoded and
//! kept on every node but lookups are plain linear scans in entry order.

use std::fmt;

use crate::Rc;
use crate::data::loader::ResFileLoader;
use crate::error::{ErrorKind, IResult};

/// Size of one on-disk node, for either generation.
pub const NODE_SIZE: usize = 0x10;

/// Trie bookkeeping carried by every node, root included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TrieLinks {
    pub reference: u32,
    pub idx_left: u16,
    pub idx_right: u16,
}

impl TrieLinks {
    /// Links of a node that was created in memory rather than decoded.
    pub const UNLINKED: TrieLinks = TrieLinks {
        reference: 0xFFFF_FFFF,
        idx_left: 0,
        idx_right: 0,
    };
}

impl Default for TrieLinks {
    fn default() -> Self {
        TrieLinks::UNLINKED
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DictNode<V> {
    pub links: TrieLinks,
    pub key: String,
    pub value: V,
}

/// A node as it appears on disk, before any value has been loaded.
#[derive(Debug, Clone)]
pub(crate) struct RawNode {
    pub links: TrieLinks,
    pub key: String,
    /// Value offset; only the 32-bit generation stores one in the node.
    pub value: Option<u64>,
}

/// Read the header, the count and all `count + 1` nodes at the loader's position.
///
/// The first returned node is the root sentinel.
pub(crate) fn read_raw_nodes(loader: &mut ResFileLoader<'_>) -> IResult<Vec<RawNode>> {
    // Total size on 32-bit, always zero on 64-bit.
    let _header = loader.read_u32()?;
    let count = loader.read_u32()? as usize;
    let inline_values = loader.generation().inlines_dict_values();

    let capacity = count.saturating_add(1).min(loader.remaining() / NODE_SIZE);
    let mut nodes = Vec::with_capacity(capacity);
    for _ in 0..=count {
        let links = TrieLinks {
            reference: loader.read_u32()?,
            idx_left: loader.read_u16()?,
            idx_right: loader.read_u16()?,
        };
        let key = loader.load_string(None)?;
        let value = if inline_values {
            loader.read_offset()?
        } else {
            None
        };
        nodes.push(RawNode { links, key, value });
    }

    tracing::trace!(count, generation = ?loader.generation(), "decoded dictionary nodes");
    Ok(nodes)
}

/// Ordered, uniquely-keyed container with positional access.
///
/// Index `i` always refers to the `i`-th entry after the root sentinel, which
/// is never exposed.
#[derive(Clone, PartialEq)]
pub struct ResDict<V> {
    root: TrieLinks,
    nodes: Vec<DictNode<V>>,
}

impl<V> Default for ResDict<V> {
    fn default() -> Self {
        ResDict {
            root: TrieLinks::UNLINKED,
            nodes: Vec::new(),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for ResDict<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<V> ResDict<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_root(root: TrieLinks) -> Self {
        ResDict {
            root,
            nodes: Vec::new(),
        }
    }

    /// Append a decoded node, keeping its trie links.
    pub(crate) fn push_node(&mut self, node: DictNode<V>) -> IResult<()> {
        if self.contains_key(&node.key) {
            return Err(ErrorKind::DuplicateKey { key: node.key }.into());
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Trie links of the hidden root node.
    pub fn root(&self) -> &TrieLinks {
        &self.root
    }

    pub fn nodes(&self) -> &[DictNode<V>] {
        &self.nodes
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.nodes.iter().map(node_entry)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.nodes.iter().map(|node| &node.value)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.nodes.iter_mut().map(|node| &mut node.value)
    }

    pub fn index_of_key(&self, key: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.key == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index_of_key(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index_of_key(key).map(|i| &self.nodes[i].value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.index_of_key(key).map(|i| &mut self.nodes[i].value)
    }

    /// Like [`ResDict::get`], but a missing key is an error.
    pub fn lookup(&self, key: &str) -> IResult<&V> {
        self.get(key).ok_or_else(|| {
            ErrorKind::KeyNotFound {
                key: key.to_owned(),
            }
            .into()
        })
    }

    pub fn get_index(&self, index: usize) -> Option<&V> {
        self.nodes.get(index).map(|node| &node.value)
    }

    /// Like [`ResDict::get_index`], but an out of range index is an error.
    pub fn at(&self, index: usize) -> IResult<&V> {
        self.get_index(index).ok_or_else(|| self.out_of_range(index))
    }

    pub fn key_at(&self, index: usize) -> IResult<&str> {
        self.nodes
            .get(index)
            .map(|node| node.key.as_str())
            .ok_or_else(|| self.out_of_range(index))
    }

    /// Add a new entry at the end. Fails if `key` is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> IResult<()> {
        self.push_node(DictNode {
            links: TrieLinks::UNLINKED,
            key: key.into(),
            value,
        })
    }

    /// Replace the value stored under `key`, or append it if the key is new.
    /// Returns the replaced value.
    pub fn set(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        match self.index_of_key(&key) {
            Some(i) => Some(std::mem::replace(&mut self.nodes[i].value, value)),
            None => {
                self.nodes.push(DictNode {
                    links: TrieLinks::UNLINKED,
                    key,
                    value,
                });
                None
            }
        }
    }

    pub fn rename(&mut self, key: &str, new_key: impl Into<String>) -> IResult<()> {
        let new_key = new_key.into();
        let index = self.index_of_key(key).ok_or_else(|| ErrorKind::KeyNotFound {
            key: key.to_owned(),
        })?;
        if new_key != key && self.contains_key(&new_key) {
            return Err(ErrorKind::DuplicateKey { key: new_key }.into());
        }
        self.nodes[index].key = new_key;
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let index = self.index_of_key(key)?;
        Some(self.nodes.remove(index).value)
    }

    pub fn remove_at(&mut self, index: usize) -> IResult<DictNode<V>> {
        if index >= self.nodes.len() {
            return Err(self.out_of_range(index));
        }
        Ok(self.nodes.remove(index))
    }

    /// Remove every entry; the root sentinel stays.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    fn out_of_range(&self, index: usize) -> crate::error::Error {
        ErrorKind::IndexOutOfRange {
            index,
            len: self.nodes.len(),
        }
        .into()
    }
}

impl<V: PartialEq> ResDict<V> {
    pub fn index_of_value(&self, value: &V) -> Option<usize> {
        self.nodes.iter().position(|node| node.value == *value)
    }

    /// Key of the first entry whose value equals `value`.
    pub fn key_of(&self, value: &V) -> Option<&str> {
        self.index_of_value(value)
            .map(|i| self.nodes[i].key.as_str())
    }

    pub fn remove_value(&mut self, value: &V) -> Option<DictNode<V>> {
        let index = self.index_of_value(value)?;
        Some(self.nodes.remove(index))
    }
}

impl<T> ResDict<Rc<T>> {
    /// Position of the entry holding this exact shared instance.
    pub fn index_of_shared(&self, value: &Rc<T>) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| Rc::ptr_eq(&node.value, value))
    }

    pub fn key_of_shared(&self, value: &Rc<T>) -> Option<&str> {
        self.index_of_shared(value)
            .map(|i| self.nodes[i].key.as_str())
    }
}

impl<'a, V> IntoIterator for &'a ResDict<V> {
    type Item = (&'a str, &'a V);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, DictNode<V>>,
        fn(&'a DictNode<V>) -> (&'a str, &'a V),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes
            .iter()
            .map(node_entry as fn(&'a DictNode<V>) -> (&'a str, &'a V))
    }
}

fn node_entry<V>(node: &DictNode<V>) -> (&str, &V) {
    (node.key.as_str(), &node.value)
}

#[cfg(feature = "serde")]
impl<V: serde::Serialize> serde::Serialize for ResDict<V> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}
