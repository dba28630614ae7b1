//! The trie cell (spec.md §3's "Cell"), as an explicit Rust enum
//! rather than a tagged pointer.
//!
//! spec.md §9 notes that a portable, non-tagged-pointer redesign "uses
//! an explicit discriminant (an enum field) in exchange for one extra
//! word per cell" — that is exactly what `Node` is. Keys and values are
//! borrowed (spec.md §3's "Borrowed storage" invariant): a leaf holds a
//! `&'a [u8]` key and a `V`, never an owned copy.

/// One branch's present children, found invariant 5 (spec.md §3): if
/// `bitmap` has `k` bits set, `twigs` has exactly `k` entries, and the
/// twig for bitmap bit `b` lives at `popcount(bitmap & (b-1))`.
pub(crate) struct Branch<'a, V> {
    /// Quintet depth this branch discriminates on. Encodes both
    /// spec.md's `offset` and `shift` as a single monotone integer
    /// (see DESIGN.md); `depth*5/8` is the byte offset, `depth*5%8`
    /// the bit shift, consistent with `fn.c`'s `qo`.
    pub depth: u32,
    /// 64 bits wide, not 32: `chunk`'s alphabet reserves a 33rd symbol
    /// (the end-of-key quintet) distinct from every real value.
    pub bitmap: u64,
    pub twigs: Vec<Node<'a, V>>,
}

impl<'a, V> Branch<'a, V> {
    /// Local index of `bit` within `twigs`.
    #[inline]
    pub(crate) fn twig_index(&self, bit: u64) -> usize {
        crate::bitops::twig_offset(self.bitmap, bit)
    }

    #[inline]
    pub(crate) fn has_twig(&self, bit: u64) -> bool {
        self.bitmap & bit != 0
    }
}

pub(crate) enum Node<'a, V> {
    Leaf { key: &'a [u8], value: V },
    Branch(Box<Branch<'a, V>>),
}
