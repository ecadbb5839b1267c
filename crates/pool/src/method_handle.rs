//! [`DexMethodHandle`]: a method-handle constant (spec §4.7 step 5's
//! "call-sites, method-handles" table, generalized here as a standard
//! interned pool entry alongside fields and methods).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;

use crate::field::DexField;
use crate::method::DexMethod;

/// The eight method-handle kinds DEX distinguishes, in their on-disk
/// numeric order (`MethodHandleItem.method_handle_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MethodHandleKind {
    StaticPut = 0x00,
    StaticGet = 0x01,
    InstancePut = 0x02,
    InstanceGet = 0x03,
    InvokeStatic = 0x04,
    InvokeInstance = 0x05,
    InvokeConstructor = 0x06,
    InvokeDirect = 0x07,
    InvokeInterface = 0x08,
}

impl MethodHandleKind {
    /// `true` for the four field-accessor kinds, `false` for the five
    /// invoke kinds.
    pub fn targets_field(self) -> bool {
        matches!(self, MethodHandleKind::StaticPut | MethodHandleKind::StaticGet | MethodHandleKind::InstancePut | MethodHandleKind::InstanceGet)
    }
}

/// What a method handle resolves to: a field for the four accessor kinds,
/// a method for the five invoke kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodHandleTarget {
    Field(DexField),
    Method(DexMethod),
}

#[derive(Debug)]
struct DexMethodHandleData {
    kind: MethodHandleKind,
    target: MethodHandleTarget,
}

#[derive(Clone)]
pub struct DexMethodHandle(Arc<DexMethodHandleData>);

impl PartialEq for DexMethodHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for DexMethodHandle {}

impl Hash for DexMethodHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for DexMethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DexMethodHandle({:?}, {:?})", self.kind(), self.target())
    }
}

impl DexMethodHandle {
    pub fn kind(&self) -> MethodHandleKind {
        self.0.kind
    }

    pub fn target(&self) -> &MethodHandleTarget {
        &self.0.target
    }

    pub fn as_field(&self) -> Option<&DexField> {
        match &self.0.target {
            MethodHandleTarget::Field(f) => Some(f),
            MethodHandleTarget::Method(_) => None,
        }
    }

    pub fn as_method(&self) -> Option<&DexMethod> {
        match &self.0.target {
            MethodHandleTarget::Method(m) => Some(m),
            MethodHandleTarget::Field(_) => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct MethodHandleKey {
    kind: MethodHandleKind,
    target: MethodHandleTarget,
}

#[derive(Default)]
pub struct MethodHandleTable {
    by_signature: DashMap<MethodHandleKey, DexMethodHandle>,
}

impl MethodHandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, kind: MethodHandleKind, target: MethodHandleTarget) -> DexMethodHandle {
        let key = MethodHandleKey { kind, target: target.clone() };
        if let Some(existing) = self.by_signature.get(&key) {
            return existing.clone();
        }
        let handle = DexMethodHandle(Arc::new(DexMethodHandleData { kind, target }));
        self.by_signature.entry(key).or_insert_with(|| handle.clone()).clone()
    }

    pub fn len(&self) -> usize {
        self.by_signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_signature.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interned::StringTable;
    use crate::method::MethodTable;
    use crate::proto::ProtoTable;
    use crate::types::TypeTable;

    #[test]
    fn interning_dedupes_by_kind_and_target() {
        let strings = StringTable::new();
        let types = TypeTable::new();
        let protos = ProtoTable::new();
        let methods = MethodTable::new();
        let holder = types.intern(&strings, b"Lcom/app/Foo;");
        let void_ty = types.intern(&strings, b"V");
        let proto = protos.intern(&strings, b"V", void_ty, Vec::new());
        let method = methods.intern(&strings, holder, proto, b"bootstrap");

        let handles = MethodHandleTable::new();
        let a = handles.intern(MethodHandleKind::InvokeStatic, MethodHandleTarget::Method(method.clone()));
        let b = handles.intern(MethodHandleKind::InvokeStatic, MethodHandleTarget::Method(method));
        assert_eq!(a, b);
        assert_eq!(handles.len(), 1);
    }
}
