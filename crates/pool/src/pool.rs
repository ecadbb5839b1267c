//! The interned item pool: the single point through which every descriptor,
//! type, prototype, field and method reference is canonicalized.
//!
//! There is deliberately no global singleton here (see the "Global mutable
//! state" design note) — every compilation run owns one [`ItemPool`] and
//! threads it explicitly into every pass that needs to intern something.

use crate::call_site::{CallSiteTable, DexCallSite};
use crate::field::{DexField, FieldTable};
use crate::interned::{DexString, StringTable};
use crate::method::{DexMethod, MethodTable};
use crate::method_handle::{DexMethodHandle, MethodHandleKind, MethodHandleTable, MethodHandleTarget};
use crate::proto::{compute_shorty, DexProto, ProtoTable};
use crate::types::{DexType, TypeTable};

#[derive(Default)]
pub struct ItemPool {
    strings: StringTable,
    types: TypeTable,
    protos: ProtoTable,
    fields: FieldTable,
    methods: MethodTable,
    method_handles: MethodHandleTable,
    call_sites: CallSiteTable,
}

impl ItemPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_string(&self, bytes: &[u8]) -> DexString {
        self.strings.intern(bytes)
    }

    pub fn intern_type(&self, descriptor: &[u8]) -> DexType {
        self.types.intern(&self.strings, descriptor)
    }

    pub fn intern_proto(&self, return_type: DexType, parameters: Vec<DexType>) -> DexProto {
        let shorty = compute_shorty(&return_type, &parameters);
        self.protos
            .intern(&self.strings, &shorty, return_type, parameters)
    }

    pub fn intern_field(&self, holder: DexType, type_: DexType, name: &[u8]) -> DexField {
        self.fields.intern(&self.strings, holder, type_, name)
    }

    pub fn intern_method(&self, holder: DexType, proto: DexProto, name: &[u8]) -> DexMethod {
        self.methods.intern(&self.strings, holder, proto, name)
    }

    pub fn intern_method_handle(&self, kind: MethodHandleKind, target: MethodHandleTarget) -> DexMethodHandle {
        self.method_handles.intern(kind, target)
    }

    pub fn intern_call_site(&self, bootstrap_method: DexMethodHandle, method_name: DexString, method_proto: DexProto) -> DexCallSite {
        self.call_sites.intern(bootstrap_method, method_name, method_proto)
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn proto_count(&self) -> usize {
        self.protos.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn method_handle_count(&self) -> usize {
        self.method_handles.len()
    }

    pub fn call_site_count(&self) -> usize {
        self.call_sites.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_interning_converges_on_one_reference() {
        use std::sync::Arc;
        use std::thread;

        let pool = Arc::new(ItemPool::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || pool.intern_type(b"Lcom/app/Foo;")));
        }

        let first = handles.remove(0).join().unwrap();
        for h in handles {
            assert_eq!(first, h.join().unwrap());
        }
        assert_eq!(pool.type_count(), 1);
    }

    #[test]
    fn method_and_field_round_trip() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let int_ty = pool.intern_type(b"I");
        let string_ty = pool.intern_type(b"Ljava/lang/String;");

        let proto = pool.intern_proto(int_ty.clone(), vec![string_ty.clone()]);
        assert_eq!(proto.shorty().as_bytes(), b"IL");

        let method = pool.intern_method(holder.clone(), proto, b"parse");
        assert_eq!(method.name().as_bytes(), b"parse");
        assert_eq!(method.holder(), &holder);

        let field = pool.intern_field(holder.clone(), int_ty, b"count");
        assert_eq!(field.holder(), &holder);
    }
}
