//! Hash map alias switching between gxhash and std
//!
//! The `gxhash` feature needs AES-NI/SSE2 at compile time, so it is opt-in;
//! without it the std map with its default hasher is used.

#[cfg(feature = "gxhash")]
pub use gxhash::{HashMap, HashMapExt};

/// Hash map keyed by asset ids in the in-memory storage
#[cfg(not(feature = "gxhash"))]
pub type HashMap<K, V> = std::collections::HashMap<K, V>;

/// Constructors shared by both map flavours
#[cfg(not(feature = "gxhash"))]
pub trait HashMapExt {
    /// Creates an empty map
    fn new() -> Self;

    /// Creates an empty map with room for `capacity` entries
    fn with_capacity(capacity: usize) -> Self;
}

#[cfg(not(feature = "gxhash"))]
impl<K, V> HashMapExt for std::collections::HashMap<K, V> {
    fn new() -> Self {
        std::collections::HashMap::new()
    }

    fn with_capacity(capacity: usize) -> Self {
        std::collections::HashMap::with_capacity(capacity)
    }
}
