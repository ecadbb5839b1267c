//! Liveness facts: the immutable fact bundle produced by the (external)
//! shrinker and consumed, never computed, by the core (spec §2, §4.3).

use std::collections::{HashMap, HashSet};

use crate::field::DexField;
use crate::method::DexMethod;
use crate::types::DexType;

/// Why a field is read or written, so passes can distinguish "read for
/// side effect" style accesses from ordinary value flow if ever needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccessKind {
    Read,
    Write,
}

/// Immutable, externally computed facts about what survives shrinking.
/// Optimization passes query this; nothing in the core pipeline mutates
/// it — it is produced once (by the shrinker, out of scope here) and
/// handed in for the whole compilation.
#[derive(Debug, Default)]
pub struct LivenessInfo {
    reachable_types: HashSet<DexType>,
    called_methods: HashSet<DexMethod>,
    pinned_methods: HashSet<DexMethod>,
    pinned_fields: HashSet<DexField>,
    field_reads: HashSet<DexField>,
    field_writes: HashSet<DexField>,
    /// Fields proven to always hold the same allocation, keyed to the
    /// constructor that performs the unique allocation. Drives class
    /// inlining (§4.3 step 21).
    single_allocation_sites: HashMap<DexField, DexMethod>,
}

impl LivenessInfo {
    pub fn builder() -> LivenessInfoBuilder {
        LivenessInfoBuilder::default()
    }

    pub fn is_type_reachable(&self, ty: &DexType) -> bool {
        self.reachable_types.contains(ty)
    }

    pub fn is_method_called(&self, method: &DexMethod) -> bool {
        self.called_methods.contains(method)
    }

    /// Pinned entities are exempt from renaming/removal/inlining: their
    /// identity and body must survive unchanged.
    pub fn is_method_pinned(&self, method: &DexMethod) -> bool {
        self.pinned_methods.contains(method)
    }

    pub fn is_field_pinned(&self, field: &DexField) -> bool {
        self.pinned_fields.contains(field)
    }

    pub fn field_access(&self, field: &DexField, kind: FieldAccessKind) -> bool {
        match kind {
            FieldAccessKind::Read => self.field_reads.contains(field),
            FieldAccessKind::Write => self.field_writes.contains(field),
        }
    }

    pub fn single_allocation_site(&self, field: &DexField) -> Option<&DexMethod> {
        self.single_allocation_sites.get(field)
    }
}

#[derive(Default)]
pub struct LivenessInfoBuilder {
    info: LivenessInfo,
}

impl LivenessInfoBuilder {
    pub fn reachable_type(mut self, ty: DexType) -> Self {
        self.info.reachable_types.insert(ty);
        self
    }

    pub fn called_method(mut self, method: DexMethod) -> Self {
        self.info.called_methods.insert(method);
        self
    }

    pub fn pinned_method(mut self, method: DexMethod) -> Self {
        self.info.pinned_methods.insert(method);
        self
    }

    pub fn pinned_field(mut self, field: DexField) -> Self {
        self.info.pinned_fields.insert(field);
        self
    }

    pub fn field_access(mut self, field: DexField, kind: FieldAccessKind) -> Self {
        match kind {
            FieldAccessKind::Read => self.info.field_reads.insert(field),
            FieldAccessKind::Write => self.info.field_writes.insert(field),
        };
        self
    }

    pub fn single_allocation_site(mut self, field: DexField, ctor: DexMethod) -> Self {
        self.info.single_allocation_sites.insert(field, ctor);
        self
    }

    pub fn build(self) -> LivenessInfo {
        self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ItemPool;

    #[test]
    fn pinned_methods_are_queryable() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let void_ty = pool.intern_type(b"V");
        let proto = pool.intern_proto(void_ty, vec![]);
        let method = pool.intern_method(holder, proto, b"<init>");

        let facts = LivenessInfo::builder()
            .pinned_method(method.clone())
            .build();

        assert!(facts.is_method_pinned(&method));
        assert!(method.is_instance_initializer());
    }
}
