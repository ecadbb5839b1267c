//! Process-wide interned descriptors.
//!
//! Every interned item is a thin, `Clone`-cheap handle over a heap-allocated
//! payload. Equality and hashing are defined over the handle's pointer
//! identity, never over its content: the only way to get two handles that
//! compare equal is to intern the same content through the same [`ItemPool`].
//!
//! See: <https://source.android.com/docs/core/runtime/dex-format#string-item>

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;

/// Payload of an interned string: a length-prefixed modified-UTF8 byte
/// sequence plus its cached hash.
#[derive(Debug)]
pub struct DexStringData {
    bytes: Box<[u8]>,
    hash: u64,
}

impl DexStringData {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// An interned modified-UTF8 string. Two handles are equal iff they were
/// produced by the same `intern` call (directly or via a cache hit).
#[derive(Clone)]
pub struct DexString(Arc<DexStringData>);

impl DexString {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len_utf16(&self) -> usize {
        simd_cesu8::mutf8::decode_lossy(self.as_bytes())
            .chars()
            .map(char::len_utf16)
            .sum()
    }

    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        simd_cesu8::mutf8::decode_lossy(self.as_bytes())
    }
}

impl PartialEq for DexString {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for DexString {}

impl Hash for DexString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for DexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DexString({:?})", self.as_str())
    }
}

/// Table that canonicalizes interned strings. Thread-safe: concurrent
/// `intern` calls for equivalent byte sequences return the identical handle.
#[derive(Default)]
pub struct StringTable {
    by_bytes: DashMap<Box<[u8]>, DexString>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, bytes: &[u8]) -> DexString {
        if let Some(existing) = self.by_bytes.get(bytes) {
            return existing.clone();
        }

        let hash = fnv1a(bytes);
        let handle = DexString(Arc::new(DexStringData {
            bytes: bytes.into(),
            hash,
        }));

        self.by_bytes
            .entry(bytes.into())
            .or_insert_with(|| handle.clone())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.by_bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_bytes.is_empty()
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_identity_preserving() {
        let table = StringTable::new();
        let a = table.intern(b"Ljava/lang/Object;");
        let b = table.intern(b"Ljava/lang/Object;");
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.0, &b.0));

        let c = table.intern(b"Ljava/lang/String;");
        assert_ne!(a, c);
    }

    #[test]
    fn decodes_as_str() {
        let table = StringTable::new();
        let s = table.intern("hi".as_bytes());
        assert_eq!(s.as_str(), "hi");
    }
}
