//! [`DexProto`]: a method prototype (return type, parameter types, shorty).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;

use crate::interned::{DexString, StringTable};
use crate::types::{DexType, TypeTable};

#[derive(Debug)]
struct DexProtoData {
    shorty: DexString,
    return_type: DexType,
    parameters: Vec<DexType>,
}

#[derive(Clone)]
pub struct DexProto(Arc<DexProtoData>);

impl PartialEq for DexProto {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for DexProto {}

impl Hash for DexProto {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for DexProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DexProto({})", self.shorty().as_str())
    }
}

impl DexProto {
    pub fn shorty(&self) -> &DexString {
        &self.0.shorty
    }

    pub fn return_type(&self) -> &DexType {
        &self.0.return_type
    }

    pub fn parameters(&self) -> &[DexType] {
        &self.0.parameters
    }

    pub fn parameter_count(&self) -> usize {
        self.0.parameters.len()
    }
}

/// A key canonicalizing proto identity independently of the interned
/// handles' memory addresses (needed because the key is built from a
/// `Vec<DexType>` whose element pointers already canonicalize content, so
/// structural equality on the key coincides with descriptor equality).
#[derive(Clone, PartialEq, Eq, Hash)]
struct ProtoKey {
    return_type: DexType,
    parameters: Vec<DexType>,
}

#[derive(Default)]
pub struct ProtoTable {
    by_signature: DashMap<ProtoKey, DexProto>,
}

impl ProtoTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(
        &self,
        strings: &StringTable,
        shorty: &[u8],
        return_type: DexType,
        parameters: Vec<DexType>,
    ) -> DexProto {
        let key = ProtoKey {
            return_type: return_type.clone(),
            parameters: parameters.clone(),
        };
        if let Some(existing) = self.by_signature.get(&key) {
            return existing.clone();
        }

        let shorty = strings.intern(shorty);
        let handle = DexProto(Arc::new(DexProtoData {
            shorty,
            return_type,
            parameters,
        }));
        self.by_signature
            .entry(key)
            .or_insert_with(|| handle.clone())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.by_signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_signature.is_empty()
    }
}

/// Computes the shorty descriptor for a return type and parameter list,
/// e.g. `(I, Ljava/lang/String;) -> Z` becomes `"ZIL"`.
pub fn compute_shorty(return_type: &DexType, parameters: &[DexType]) -> Vec<u8> {
    let mut shorty = Vec::with_capacity(parameters.len() + 1);
    shorty.push(shorty_char(return_type));
    for p in parameters {
        shorty.push(shorty_char(p));
    }
    shorty
}

fn shorty_char(ty: &DexType) -> u8 {
    if ty.is_reference() {
        b'L'
    } else {
        ty.descriptor_string().as_bytes()[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorty_computation() {
        let strings = StringTable::new();
        let types = TypeTable::new();
        let ret = types.intern(&strings, b"Z");
        let params = vec![
            types.intern(&strings, b"I"),
            types.intern(&strings, b"Ljava/lang/String;"),
        ];
        assert_eq!(compute_shorty(&ret, &params), b"ZIL");
    }

    #[test]
    fn interning_dedupes_by_signature() {
        let strings = StringTable::new();
        let types = TypeTable::new();
        let protos = ProtoTable::new();
        let ret = types.intern(&strings, b"V");
        let params = vec![types.intern(&strings, b"I")];

        let a = protos.intern(&strings, b"VI", ret.clone(), params.clone());
        let b = protos.intern(&strings, b"VI", ret, params);
        assert_eq!(a, b);
    }
}
