//! [`DexField`]: a field reference (holder, type, name).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;

use crate::interned::{DexString, StringTable};
use crate::types::DexType;

#[derive(Debug)]
struct DexFieldData {
    holder: DexType,
    type_: DexType,
    name: DexString,
}

#[derive(Clone)]
pub struct DexField(Arc<DexFieldData>);

impl PartialEq for DexField {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for DexField {}

impl Hash for DexField {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for DexField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DexField({} {}.{})",
            self.field_type().descriptor(),
            self.holder().descriptor(),
            self.name().as_str()
        )
    }
}

impl DexField {
    pub fn holder(&self) -> &DexType {
        &self.0.holder
    }

    pub fn field_type(&self) -> &DexType {
        &self.0.type_
    }

    pub fn name(&self) -> &DexString {
        &self.0.name
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct FieldKey {
    holder: DexType,
    type_: DexType,
    name: DexString,
}

#[derive(Default)]
pub struct FieldTable {
    by_signature: DashMap<FieldKey, DexField>,
}

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(
        &self,
        strings: &StringTable,
        holder: DexType,
        type_: DexType,
        name: &[u8],
    ) -> DexField {
        let name = strings.intern(name);
        let key = FieldKey {
            holder: holder.clone(),
            type_: type_.clone(),
            name: name.clone(),
        };
        if let Some(existing) = self.by_signature.get(&key) {
            return existing.clone();
        }
        let handle = DexField(Arc::new(DexFieldData {
            holder,
            type_,
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
