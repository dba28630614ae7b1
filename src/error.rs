use std::error::Error;
use std::fmt;

/// Failure modes of a mutating trie operation (spec.md §7).
///
/// `NotFound` is deliberately absent here: a missing key is an ordinary
/// negative result (`None`), not an error, matching spec.md §7's "not
/// an error" note for `get`/`get_kv`/`del_kv`/`next`.
#[derive(Debug)]
pub enum TrieError {
    /// The key is too long for this variant's chunk-depth field to
    /// address. spec.md §7's `InvalidArgument`, reinterpreted for a
    /// typed API without a `void *` tag convention to violate (see
    /// SPEC_FULL.md's `error` module notes).
    KeyTooLong { len: usize, max: usize },
    /// A twig vector allocation failed. spec.md §7's `OutOfMemory`;
    /// raised only from `set`, and only before any in-place mutation,
    /// so the trie is left unmodified (spec.md §4.4).
    OutOfMemory,
}

impl fmt::Display for TrieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrieError::KeyTooLong { len, max } => {
                write!(f, "key of length {len} exceeds the maximum of {max}")
            }
            TrieError::OutOfMemory => write!(f, "failed to allocate a twig array"),
        }
    }
}

impl Error for TrieError {}
