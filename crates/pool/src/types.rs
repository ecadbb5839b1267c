//! [`DexType`]: an interned type descriptor plus the predicates and
//! transformations the rest of the pipeline relies on.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;

use crate::interned::{DexString, StringTable};

#[derive(Debug)]
struct DexTypeData {
    descriptor: DexString,
}

/// A single interned type. Wraps one JVM/DEX type descriptor
/// (e.g. `I`, `[Ljava/lang/String;`, `Lcom/app/Foo;`).
#[derive(Clone)]
pub struct DexType(Arc<DexTypeData>);

impl PartialEq for DexType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for DexType {}

impl Hash for DexType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for DexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DexType({})", self.descriptor())
    }
}

impl DexType {
    pub fn descriptor_string(&self) -> &DexString {
        &self.0.descriptor
    }

    pub fn descriptor(&self) -> std::borrow::Cow<'_, str> {
        self.0.descriptor.as_str()
    }

    /// `true` for `V Z B S C I J F D`.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self.0.descriptor.as_bytes().first(),
            Some(b'V' | b'Z' | b'B' | b'S' | b'C' | b'I' | b'J' | b'F' | b'D')
        )
    }

    pub fn is_void(&self) -> bool {
        self.0.descriptor.as_bytes() == b"V"
    }

    pub fn is_array(&self) -> bool {
        self.0.descriptor.as_bytes().first() == Some(&b'[')
    }

    pub fn is_class(&self) -> bool {
        self.0.descriptor.as_bytes().first() == Some(&b'L')
    }

    /// References are class types and array types; everything else is a
    /// primitive value type.
    pub fn is_reference(&self) -> bool {
        self.is_class() || self.is_array()
    }

    /// `true` for the two 64-bit primitive types, `J` (long) and `D` (double).
    pub fn is_wide(&self) -> bool {
        matches!(self.0.descriptor.as_bytes().first(), Some(b'J' | b'D'))
    }

    /// Number of `[` prefixes.
    pub fn array_depth(&self) -> usize {
        self.0
            .descriptor
            .as_bytes()
            .iter()
            .take_while(|&&b| b == b'[')
            .count()
    }

    /// Strips one array dimension, if this is an array type.
    pub fn array_element_descriptor(&self) -> Option<&[u8]> {
        self.is_array()
            .then(|| &self.0.descriptor.as_bytes()[1..])
    }

    /// The package portion of a class descriptor, e.g. `com/app` for
    /// `Lcom/app/Foo;`. `None` for primitives and arrays.
    pub fn package(&self) -> Option<String> {
        if !self.is_class() {
            return None;
        }
        let body = &self.0.descriptor.as_str()[1..];
        let body = body.strip_suffix(';').unwrap_or(body);
        match body.rfind('/') {
            Some(idx) => Some(body[..idx].to_string()),
            None => Some(String::new()),
        }
    }

    /// The simple (unqualified) name of a class descriptor.
    pub fn simple_name(&self) -> Option<String> {
        if !self.is_class() {
            return None;
        }
        let body = &self.0.descriptor.as_str()[1..];
        let body = body.strip_suffix(';').unwrap_or(body);
        match body.rfind('/') {
            Some(idx) => Some(body[idx + 1..].to_string()),
            None => Some(body.to_string()),
        }
    }
}

/// Table that canonicalizes interned types, keyed on the interned
/// descriptor string's identity.
#[derive(Default)]
pub struct TypeTable {
    by_descriptor: DashMap<DexString, DexType>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, strings: &StringTable, descriptor: &[u8]) -> DexType {
        let descriptor = strings.intern(descriptor);
        if let Some(existing) = self.by_descriptor.get(&descriptor) {
            return existing.clone();
        }
        let handle = DexType(Arc::new(DexTypeData {
            descriptor: descriptor.clone(),
        }));
        self.by_descriptor
            .entry(descriptor)
            .or_insert_with(|| handle.clone())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.by_descriptor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_descriptor.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates() {
        let strings = StringTable::new();
        let types = TypeTable::new();

        let int = types.intern(&strings, b"I");
        assert!(int.is_primitive());
        assert!(!int.is_reference());
        assert!(!int.is_wide());

        let long = types.intern(&strings, b"J");
        assert!(long.is_wide());

        let arr = types.intern(&strings, b"[Ljava/lang/String;");
        assert!(arr.is_array());
        assert!(arr.is_reference());
        assert_eq!(arr.array_depth(), 1);

        let cls = types.intern(&strings, b"Lcom/app/Foo;");
        assert_eq!(cls.package().as_deref(), Some("com/app"));
        assert_eq!(cls.simple_name().as_deref(), Some("Foo"));
    }

    #[test]
    fn interning_returns_identical_handle() {
        let strings = StringTable::new();
        let types = TypeTable::new();
        let a = types.intern(&strings, b"Lcom/app/Foo;");
        let b = types.intern(&strings, b"Lcom/app/Foo;");
        assert_eq!(a, b);
    }
}
