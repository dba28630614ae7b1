//! A popcount-indexed qp-trie: an ordered, byte-string-keyed associative
//! array.
//!
//! Keys are decomposed into 5-bit symbols ("quintets"), plus a reserved
//! end-of-key symbol; each branch holds a 64-bit bitmap of the symbols
//! present among its children and a packed vector of only those
//! children, indexed by popcount. This is the "new" (quintet) trie
//! design, as opposed to the original quadbit/crit-bit designs it
//! supersedes.
//!
//! ```
//! use poptrie::Trie;
//!
//! let mut t: Trie<u32> = Trie::new();
//! t.set(b"foo", 1).unwrap();
//! t.set(b"bar", 2).unwrap();
//! assert_eq!(t.get(b"foo"), Some(&1));
//! assert_eq!(t.iter().next(), Some((&b"bar"[..], &2)));
//! ```

mod bitops;
mod chunk;
mod error;
mod iter;
mod node;
mod trie;

pub use error::TrieError;
pub use iter::Iter;
pub use trie::Trie;
