//! [`DexMethod`]: a method reference (holder, prototype, name).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;

use crate::interned::{DexString, StringTable};
use crate::proto::DexProto;
use crate::types::DexType;

#[derive(Debug)]
struct DexMethodData {
    holder: DexType,
    proto: DexProto,
    name: DexString,
}

#[derive(Clone)]
pub struct DexMethod(Arc<DexMethodData>);

impl PartialEq for DexMethod {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for DexMethod {}

impl Hash for DexMethod {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for DexMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DexMethod({}.{}{})",
            self.holder().descriptor(),
            self.name().as_str(),
            self.proto().shorty().as_str()
        )
    }
}

impl DexMethod {
    pub fn holder(&self) -> &DexType {
        &self.0.holder
    }

    pub fn proto(&self) -> &DexProto {
        &self.0.proto
    }

    pub fn name(&self) -> &DexString {
        &self.0.name
    }

    /// A method named `<init>` that is not static is an instance
    /// constructor.
    pub fn is_instance_initializer(&self) -> bool {
        self.name().as_bytes() == b"<init>"
    }

    /// The class's static initializer, `<clinit>`.
    pub fn is_class_initializer(&self) -> bool {
        self.name().as_bytes() == b"<clinit>"
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    holder: DexType,
    proto: DexProto,
    name: DexString,
}

#[derive(Default)]
pub struct MethodTable {
    by_signature: DashMap<MethodKey, DexMethod>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(
        &self,
        strings: &StringTable,
        holder: DexType,
        proto: DexProto,
        name: &[u8],
    ) -> DexMethod {
        let name = strings.intern(name);
        let key = MethodKey {
            holder: holder.clone(),
            proto: proto.clone(),
            name: name.clone(),
        };
        if let Some(existing) = self.by_signature.get(&key) {
            return existing.clone();
        }
        let handle = DexMethod(Arc::new(DexMethodData {
            holder,
            proto,
            name,
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
