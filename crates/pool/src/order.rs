//! The compare-visitor stack used to produce DEX's canonical, byte-identical
//! output ordering (spec §4.1).
//!
//! Three visitor variants are chained in assembly order: lexicographic
//! (compares raw bytes, used only to assign the string table itself),
//! string-table-indexed (compares by an already-assigned string index,
//! used to order the type table), and type-table-indexed (compares by an
//! already-assigned type index, used to order protos/fields/methods/
//! call-sites/method-handles). Each later table's key bottoms out in
//! indices assigned to an earlier table, which is what makes the overall
//! encoding deterministic.

use std::cmp::Ordering;

use crate::call_site::DexCallSite;
use crate::field::DexField;
use crate::interned::DexString;
use crate::method::DexMethod;
use crate::method_handle::{DexMethodHandle, MethodHandleTarget};
use crate::proto::DexProto;
use crate::types::DexType;

/// Compares interned strings by raw byte value. This is the only visitor
/// that does not depend on any previously assigned index; it is used to
/// produce the string table's own order.
pub fn compare_lexicographic(a: &DexString, b: &DexString) -> Ordering {
    a.as_bytes().cmp(b.as_bytes())
}

/// Gives the already-assigned index of an interned string. Implemented by
/// whatever structure owns the string table's index assignment.
pub trait StringIndex {
    fn string_index(&self, s: &DexString) -> u32;
}

/// Gives the already-assigned index of an interned type. Implies the
/// string table is already fully indexed (a type's descriptor must be
/// resolved to a string index first).
pub trait TypeIndex: StringIndex {
    fn type_index(&self, t: &DexType) -> u32;
}

/// Compares two strings by their assigned table index (smaller index
/// sorts first). Used to order the type table.
pub fn compare_string_indexed(idx: &impl StringIndex, a: &DexString, b: &DexString) -> Ordering {
    idx.string_index(a).cmp(&idx.string_index(b))
}

/// Compares two types by their descriptor's assigned string index. This is
/// exactly how the type table itself is ordered.
pub fn compare_type_by_descriptor(idx: &impl StringIndex, a: &DexType, b: &DexType) -> Ordering {
    compare_string_indexed(idx, a.descriptor_string(), b.descriptor_string())
}

/// Compares two types by their own already-assigned table index. Used by
/// every later table (protos, fields, methods, ...) that references types.
pub fn compare_type_indexed(idx: &impl TypeIndex, a: &DexType, b: &DexType) -> Ordering {
    idx.type_index(a).cmp(&idx.type_index(b))
}

fn compare_type_slices(idx: &impl TypeIndex, a: &[DexType], b: &[DexType]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let c = compare_type_indexed(idx, x, y);
        if c != Ordering::Equal {
            return c;
        }
    }
    a.len().cmp(&b.len())
}

/// Proto order: `(return type, parameter list, shorty)`, all type-table
/// indexed except the final byte-wise shorty tie-break.
pub fn compare_proto(idx: &impl TypeIndex, a: &DexProto, b: &DexProto) -> Ordering {
    compare_type_indexed(idx, a.return_type(), b.return_type())
        .then_with(|| compare_type_slices(idx, a.parameters(), b.parameters()))
        .then_with(|| a.shorty().as_bytes().cmp(b.shorty().as_bytes()))
}

/// Field order: defining type is the major key, name the intermediate key,
/// field type the minor key — matching the on-disk `field_id_item` table
/// requirement that this order be used verbatim.
pub fn compare_field(idx: &impl TypeIndex, a: &DexField, b: &DexField) -> Ordering {
    compare_type_indexed(idx, a.holder(), b.holder())
        .then_with(|| compare_string_indexed(idx, a.name(), b.name()))
        .then_with(|| compare_type_indexed(idx, a.field_type(), b.field_type()))
}

/// Method order: defining type is the major key, name the intermediate
/// key, prototype the minor key.
pub fn compare_method(idx: &impl TypeIndex, a: &DexMethod, b: &DexMethod) -> Ordering {
    compare_type_indexed(idx, a.holder(), b.holder())
        .then_with(|| compare_string_indexed(idx, a.name(), b.name()))
        .then_with(|| compare_proto(idx, a.proto(), b.proto()))
}

/// Method-handle order: handle kind is the major key (its on-disk numeric
/// value), the resolved field or method the minor key.
pub fn compare_method_handle(idx: &impl TypeIndex, a: &DexMethodHandle, b: &DexMethodHandle) -> Ordering {
    (a.kind() as u8)
        .cmp(&(b.kind() as u8))
        .then_with(|| match (a.target(), b.target()) {
            (MethodHandleTarget::Field(x), MethodHandleTarget::Field(y)) => compare_field(idx, x, y),
            (MethodHandleTarget::Method(x), MethodHandleTarget::Method(y)) => compare_method(idx, x, y),
            // Different kinds never reach here since the kind comparison
            // above already differs between field- and method-targeting
            // handles.
            (MethodHandleTarget::Field(_), MethodHandleTarget::Method(_)) => Ordering::Less,
            (MethodHandleTarget::Method(_), MethodHandleTarget::Field(_)) => Ordering::Greater,
        })
}

/// Call-site order: bootstrap method handle is the major key, invoked name
/// and prototype the minor keys.
pub fn compare_call_site(idx: &impl TypeIndex, a: &DexCallSite, b: &DexCallSite) -> Ordering {
    compare_method_handle(idx, a.bootstrap_method(), b.bootstrap_method())
        .then_with(|| compare_string_indexed(idx, a.method_name(), b.method_name()))
        .then_with(|| compare_proto(idx, a.method_proto(), b.method_proto()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ItemPool;
    use std::collections::HashMap;

    struct FakeIndex {
        strings: HashMap<*const u8, u32>,
        types: HashMap<*const u8, u32>,
    }

    impl StringIndex for FakeIndex {
        fn string_index(&self, s: &DexString) -> u32 {
            self.strings[&s.as_bytes().as_ptr()]
        }
    }
    impl TypeIndex for FakeIndex {
        fn type_index(&self, t: &DexType) -> u32 {
            self.types[&t.descriptor_string().as_bytes().as_ptr()]
        }
    }

    #[test]
    fn lexicographic_matches_byte_order() {
        let pool = ItemPool::new();
        let a = pool.intern_string(b"Apple");
        let b = pool.intern_string(b"Banana");
        assert_eq!(compare_lexicographic(&a, &b), Ordering::Less);
        assert_eq!(compare_lexicographic(&b, &a), Ordering::Greater);
        assert_eq!(compare_lexicographic(&a, &a), Ordering::Equal);
    }

    #[test]
    fn field_order_respects_major_intermediate_minor() {
        let pool = ItemPool::new();
        let holder_a = pool.intern_type(b"La;");
        let holder_b = pool.intern_type(b"Lb;");
        let int_ty = pool.intern_type(b"I");

        let f1 = pool.intern_field(holder_a.clone(), int_ty.clone(), b"x");
        let f2 = pool.intern_field(holder_b, int_ty, b"a");

        let mut strings = HashMap::new();
        let mut types = HashMap::new();
        types.insert(holder_a.descriptor_string().as_bytes().as_ptr(), 0u32);
        types.insert(f2.holder().descriptor_string().as_bytes().as_ptr(), 1u32);
        types.insert(f1.field_type().descriptor_string().as_bytes().as_ptr(), 2u32);
        strings.insert(f1.name().as_bytes().as_ptr(), 5u32);
        strings.insert(f2.name().as_bytes().as_ptr(), 1u32);

        let idx = FakeIndex { strings, types };
        // holder_a (index 0) sorts before holder_b (index 1) regardless of name.
        assert_eq!(compare_field(&idx, &f1, &f2), Ordering::Less);
    }
}
