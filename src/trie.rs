use crate::bitops;
use crate::chunk;
use crate::error::TrieError;
use crate::iter::Iter;
use crate::node::{Branch, Node};

/// The largest key length whose deepest quintet depth still fits the
/// `u32` chunk-depth field of [`Branch::depth`] (spec.md §7's "key
/// length against the variant's offset-field width" check).
///
/// A key of length `len` is read at byte offsets up to `len`, so
/// bounding `len` to `u32::MAX / 8` keeps every byte offset — and so
/// every depth derived from it — well inside `u32` range, with room to
/// spare; this mirrors the original's `Tix_width_offset` field, which
/// caps keys at 2^28 bytes for the same reason. Computed in `u64` so
/// the bound itself can never overflow regardless of `usize` width.
const MAX_KEY_LEN_QUINTETS: u64 = u32::MAX as u64 / 8;

fn validate_key_len(len: usize) -> Result<(), TrieError> {
    if len as u64 > MAX_KEY_LEN_QUINTETS {
        Err(TrieError::KeyTooLong {
            len,
            max: MAX_KEY_LEN_QUINTETS as usize,
        })
    } else {
        Ok(())
    }
}

/// An ordered, byte-string-keyed associative array backed by a
/// popcount-indexed qp-trie (spec.md §1-§4, qp-5 variant).
///
/// Keys and values are borrowed for the lifetime `'a`: the trie never
/// copies a key and never owns the storage behind it (spec.md §3's
/// "Borrowed storage" invariant).
pub struct Trie<'a, V> {
    root: Option<Node<'a, V>>,
    len: usize,
}

impl<'a, V> Default for Trie<'a, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, V> Trie<'a, V> {
    pub fn new() -> Self {
        Trie { root: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// spec.md §6's `get`.
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// spec.md §6's `get_kv`.
    pub fn get_key_value(&self, key: &[u8]) -> Option<(&'a [u8], &V)> {
        let mut node = self.root.as_ref()?;
        loop {
            match node {
                Node::Leaf { key: k, value } => {
                    return if *k == key { Some((k, value)) } else { None };
                }
                Node::Branch(b) => {
                    let bit = chunk::quintet_bit(key, b.depth);
                    if !b.has_twig(bit) {
                        return None;
                    }
                    let idx = b.twig_index(bit);
                    node = &b.twigs[idx];
                }
            }
        }
    }

    /// spec.md §6's `set`, insert-or-overwrite. Returns the previous
    /// value if `key` was already present.
    ///
    /// Unlike the C API this is grounded on, a zero value never means
    /// "delete" (see SPEC_FULL.md / DESIGN.md): use [`Trie::remove`]
    /// instead.
    pub fn set(&mut self, key: &'a [u8], value: V) -> Result<Option<V>, TrieError> {
        validate_key_len(key.len())?;

        let Some(root) = self.root.take() else {
            self.root = Some(Node::Leaf { key, value });
            self.len = 1;
            return Ok(None);
        };

        let near = nearby_key(&root, key);
        match chunk::divergence(key, near) {
            None => {
                let mut node = root;
                let old = overwrite(&mut node, key, value);
                self.root = Some(node);
                Ok(Some(old))
            }
            Some(div_depth) => match install(root, key, value, div_depth) {
                Ok(new_root) => {
                    self.root = Some(new_root);
                    self.len += 1;
                    Ok(None)
                }
                Err((node, e)) => {
                    self.root = Some(node);
                    Err(e)
                }
            },
        }
    }

    /// spec.md §6's `del_kv`: removes `key`, returning the stored key
    /// (the borrowed slice the trie held, which may not be the same
    /// allocation as the lookup key) and value.
    pub fn remove_entry(&mut self, key: &[u8]) -> Option<(&'a [u8], V)> {
        let root = self.root.take()?;
        let (new_root, removed) = remove(root, key);
        self.root = new_root;
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// spec.md §6's `del`.
    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Ordered (ascending byte-lexicographic) traversal of every entry
    /// (spec.md §4.6/§8's exhaustive `next` traversal).
    pub fn iter(&self) -> Iter<'_, 'a, V> {
        Iter::new(self.root.as_ref())
    }

    /// spec.md §6's `next`: the lexicographic successor of `after`, or
    /// the first entry if `after` is `None`. `after` must name a key
    /// presently in the trie; otherwise returns `None`, mirroring
    /// `Tnextl`'s contract in `fn.c`.
    pub fn successor(&self, after: Option<&[u8]>) -> Option<(&'a [u8], &V)> {
        let Some(after) = after else {
            return self.iter().next();
        };

        let mut path: Vec<(&Branch<'a, V>, usize)> = Vec::new();
        let mut node = self.root.as_ref()?;
        loop {
            match node {
                Node::Leaf { key, .. } => {
                    if *key != after {
                        return None;
                    }
                    break;
                }
                Node::Branch(b) => {
                    let bit = chunk::quintet_bit(after, b.depth);
                    if !b.has_twig(bit) {
                        return None;
                    }
                    let idx = b.twig_index(bit);
                    path.push((b, idx));
                    node = &b.twigs[idx];
                }
            }
        }

        while let Some((b, idx)) = path.pop() {
            if idx + 1 < b.twigs.len() {
                return Some(leftmost(&b.twigs[idx + 1]));
            }
        }
        None
    }
}

fn leftmost<'t, 'a, V>(mut node: &'t Node<'a, V>) -> (&'a [u8], &'t V) {
    loop {
        match node {
            Node::Leaf { key, value } => return (key, value),
            Node::Branch(b) => node = &b.twigs[0],
        }
    }
}

/// Walks to the leaf the new `key` is most similar to (spec.md §4.4
/// pass (a)): at each branch, follows the twig for `key`'s own chunk
/// if present, otherwise an arbitrary existing twig (index 0), since
/// invariant 3 guarantees every twig below here shares the same prefix
/// above this branch's depth.
fn nearby_key<'a, V>(node: &Node<'a, V>, key: &[u8]) -> &'a [u8] {
    let mut node = node;
    loop {
        match node {
            Node::Leaf { key, .. } => return key,
            Node::Branch(b) => {
                let bit = chunk::quintet_bit(key, b.depth);
                let idx = if b.has_twig(bit) {
                    b.twig_index(bit)
                } else {
                    0
                };
                node = &b.twigs[idx];
            }
        }
    }
}

fn overwrite<'a, V>(node: &mut Node<'a, V>, key: &[u8], value: V) -> V {
    match node {
        Node::Leaf { value: slot, .. } => std::mem::replace(slot, value),
        Node::Branch(b) => {
            let bit = chunk::quintet_bit(key, b.depth);
            let idx = b.twig_index(bit);
            overwrite(&mut b.twigs[idx], key, value)
        }
    }
}

fn representative_key<'a, V>(node: &Node<'a, V>) -> &'a [u8] {
    match node {
        Node::Leaf { key, .. } => key,
        Node::Branch(b) => representative_key(&b.twigs[0]),
    }
}

/// spec.md §4.4 pass (c): installs `key`/`value` at the chunk depth
/// `div_depth` where it first diverges from the trie's existing
/// content, splitting a branch or growing one as required.
///
/// On `OutOfMemory` the original (unmodified) subtree is returned
/// alongside the error so the caller can splice it back in place,
/// satisfying spec.md §4.4's "the trie is left unmodified" guarantee
/// for the keys and structure already present; `value` itself is
/// dropped.
fn install<'a, V>(
    node: Node<'a, V>,
    key: &'a [u8],
    value: V,
    div_depth: u32,
) -> Result<Node<'a, V>, (Node<'a, V>, TrieError)> {
    if let Node::Branch(b) = &node {
        if div_depth > b.depth {
            let mut node = node;
            let Node::Branch(b) = &mut node else {
                unreachable!()
            };
            let bit = chunk::quintet_bit(key, b.depth);
            debug_assert!(b.has_twig(bit));
            let idx = b.twig_index(bit);
            let child = b.twigs.remove(idx);
            return match install(child, key, value, div_depth) {
                Ok(new_child) => {
                    let Node::Branch(b) = &mut node else {
                        unreachable!()
                    };
                    b.twigs.insert(idx, new_child);
                    Ok(node)
                }
                Err((new_child, e)) => {
                    let Node::Branch(b) = &mut node else {
                        unreachable!()
                    };
                    b.twigs.insert(idx, new_child);
                    Err((node, e))
                }
            };
        }
        if div_depth == b.depth {
            let mut node = node;
            let new_bit = chunk::quintet_bit(key, div_depth);
            let Node::Branch(b) = &mut node else {
                unreachable!()
            };
            debug_assert!(!b.has_twig(new_bit));
            if b.twigs.try_reserve(1).is_err() {
                return Err((node, TrieError::OutOfMemory));
            }
            let idx = b.twig_index(new_bit);
            b.twigs.insert(idx, Node::Leaf { key, value });
            b.bitmap |= new_bit;
            return Ok(node);
        }
    }

    // Split here: `node` is a leaf, or a branch shallower than `div_depth`.
    let new_bit = chunk::quintet_bit(key, div_depth);
    let old_bit = chunk::quintet_bit(representative_key(&node), div_depth);
    debug_assert_ne!(new_bit, old_bit);
    let bitmap = new_bit | old_bit;
    let mut twigs = Vec::new();
    if twigs.try_reserve(2).is_err() {
        return Err((node, TrieError::OutOfMemory));
    }
    let new_leaf = Node::Leaf { key, value };
    if bitops::twig_offset(bitmap, new_bit) == 0 {
        twigs.push(new_leaf);
        twigs.push(node);
    } else {
        twigs.push(node);
        twigs.push(new_leaf);
    }
    Ok(Node::Branch(Box::new(Branch {
        depth: div_depth,
        bitmap,
        twigs,
    })))
}

/// spec.md §4.5: removes `key`, returning the trie's new root (`None`
/// if it is now empty) and the removed entry, if any.
fn remove<'a, V>(node: Node<'a, V>, key: &[u8]) -> (Option<Node<'a, V>>, Option<(&'a [u8], V)>) {
    match node {
        Node::Leaf { key: k, value } => {
            if k == key {
                (None, Some((k, value)))
            } else {
                (Some(Node::Leaf { key: k, value }), None)
            }
        }
        Node::Branch(mut b) => {
            let bit = chunk::quintet_bit(key, b.depth);
            if !b.has_twig(bit) {
                return (Some(Node::Branch(b)), None);
            }
            let idx = b.twig_index(bit);
            let child = b.twigs.remove(idx);
            let (new_child, removed) = remove(child, key);
            match new_child {
                None => {
                    b.bitmap &= !bit;
                    if b.twigs.len() == 1 {
                        // Invariant 4: collapse the branch into its sole
                        // remaining twig.
                        let only = b.twigs.pop().unwrap();
                        (Some(only), removed)
                    } else {
                        (Some(Node::Branch(b)), removed)
                    }
                }
                Some(new_child) => {
                    b.twigs.insert(idx, new_child);
                    (Some(Node::Branch(b)), removed)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    proptest! {
        #[test]
        fn tree_set_matches_btreemap(pairs in prop::collection::vec((prop::collection::vec(any::<u8>(), 0..8), any::<u32>()), 0..200)) {
            let mut model = BTreeMap::new();
            let mut t = Trie::new();
            for (k, v) in &pairs {
                let expected = model.insert(k.clone(), *v);
                let actual = t.set(k, *v).unwrap();
                prop_assert_eq!(expected, actual);
            }
            prop_assert_eq!(model.len(), t.len());
            for (k, v) in &model {
                prop_assert_eq!(t.get(k), Some(v));
            }
        }

        #[test]
        fn tree_iter_is_sorted_and_matches_model(pairs in prop::collection::vec((prop::collection::vec(any::<u8>(), 0..8), any::<u32>()), 0..200)) {
            let mut model = BTreeMap::new();
            let mut t = Trie::new();
            for (k, v) in &pairs {
                model.insert(k.clone(), *v);
                t.set(k, *v).unwrap();
            }
            let got: Vec<(Vec<u8>, u32)> = t.iter().map(|(k, v)| (k.to_vec(), *v)).collect();
            let expected: Vec<(Vec<u8>, u32)> =
                model.into_iter().map(|(k, v)| (k, v)).collect();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn tree_set_then_remove_all_is_empty(pairs in prop::collection::vec((prop::collection::vec(any::<u8>(), 0..8), any::<u32>()), 0..200)) {
            let mut model = BTreeMap::new();
            let mut t = Trie::new();
            for (k, v) in &pairs {
                model.insert(k.clone(), *v);
                t.set(k, *v).unwrap();
            }
            for k in model.keys() {
                prop_assert!(t.remove(k).is_some());
            }
            prop_assert!(t.is_empty());
            prop_assert_eq!(t.len(), 0);
        }

        #[test]
        fn tree_remove_is_idempotent(
            pairs in prop::collection::vec((prop::collection::vec(any::<u8>(), 0..8), any::<u32>()), 0..200),
            victim in prop::collection::vec(any::<u8>(), 0..8),
        ) {
            let mut t = Trie::new();
            for (k, v) in &pairs {
                t.set(k, *v).unwrap();
            }
            let first = t.remove(&victim);
            let second = t.remove(&victim);
            prop_assert_eq!(second, None);
            if first.is_some() {
                prop_assert_eq!(t.get(&victim), None);
            }
        }
    }

    #[test]
    fn empty_trie_has_no_successor() {
        let t: Trie<u32> = Trie::new();
        assert_eq!(t.successor(None), None);
    }

    #[test]
    fn successor_of_key_not_present_is_none() {
        let mut t = Trie::new();
        t.set(b"foo", 1).unwrap();
        assert_eq!(t.successor(Some(b"bar")), None);
    }

    #[test]
    fn validate_key_len_rejects_lengths_past_the_depth_field() {
        assert!(validate_key_len(MAX_KEY_LEN_QUINTETS as usize).is_ok());
        let err = validate_key_len(MAX_KEY_LEN_QUINTETS as usize + 1).unwrap_err();
        assert!(matches!(err, TrieError::KeyTooLong { .. }));
    }
}
