//! Index-and-offset assembly (spec §4.7): assigns every interned
//! reference used by a set of classes its final table index, in the
//! strict order the DEX format requires.

use std::collections::HashMap;

use dexcomp_pool::order::{
    StringIndex, TypeIndex, compare_call_site, compare_field, compare_lexicographic, compare_method, compare_method_handle, compare_proto,
    compare_type_by_descriptor,
};
use dexcomp_pool::{DexCallSite, DexField, DexMethod, DexMethodHandle, DexProto, DexString, DexType};

use crate::class::{DexClass, EncodedValue};
use crate::errors::DexError;
use crate::graph::ClassGraph;

const MAX_TABLE_SIZE: usize = 1 << 16;

/// Pool references a caller already knows about beyond what a class
/// graph's declared structure exposes — chiefly the constants a method
/// body's lowered instructions embed (string/type/field/method constants,
/// method-handle constants) that [crate::lowering] needs an index for
/// before it can encode them. [crate::assemble] folds these in alongside
/// whatever it collects from `graph` itself.
#[derive(Default, Clone)]
pub struct ExtraReferences {
    pub strings: Vec<DexString>,
    pub types: Vec<DexType>,
    pub protos: Vec<DexProto>,
    pub fields: Vec<DexField>,
    pub methods: Vec<DexMethod>,
    pub method_handles: Vec<DexMethodHandle>,
    pub call_sites: Vec<DexCallSite>,
}

/// Every table's final index assignment, ready for [crate::lowering] and
/// [crate::image] to consult.
pub struct AssembledIndex {
    pub strings: Vec<DexString>,
    pub types: Vec<DexType>,
    pub protos: Vec<DexProto>,
    pub fields: Vec<DexField>,
    pub methods: Vec<DexMethod>,
    pub method_handles: Vec<DexMethodHandle>,
    pub call_sites: Vec<DexCallSite>,
    /// Program classes in DEX class_defs emission order: sorted by
    /// (inheritance depth, type index) so that supertypes always precede
    /// their subtypes in the file (spec §4.7 step 3).
    pub class_order: Vec<DexType>,
    /// First string index `>= 2^16`, if any. Code referencing any string
    /// at or beyond this index must use the jumbo instruction form.
    pub first_jumbo_string: Option<u32>,

    string_index: HashMap<DexString, u32>,
    type_index: HashMap<DexType, u32>,
    proto_index: HashMap<DexProto, u32>,
    field_index: HashMap<DexField, u32>,
    method_index: HashMap<DexMethod, u32>,
    method_handle_index: HashMap<DexMethodHandle, u32>,
    call_site_index: HashMap<DexCallSite, u32>,
}

impl StringIndex for AssembledIndex {
    fn string_index(&self, s: &DexString) -> u32 {
        self.string_index[s]
    }
}

impl TypeIndex for AssembledIndex {
    fn type_index(&self, t: &DexType) -> u32 {
        self.type_index[t]
    }
}

impl AssembledIndex {
    pub fn proto_index(&self, p: &DexProto) -> u32 {
        self.proto_index[p]
    }

    pub fn field_index(&self, f: &DexField) -> u32 {
        self.field_index[f]
    }

    pub fn method_index(&self, m: &DexMethod) -> u32 {
        self.method_index[m]
    }

    pub fn method_handle_index(&self, h: &DexMethodHandle) -> u32 {
        self.method_handle_index[h]
    }

    pub fn call_site_index(&self, c: &DexCallSite) -> u32 {
        self.call_site_index[c]
    }

    /// `true` if `s`'s assigned index requires the jumbo-string
    /// instruction form.
    pub fn is_jumbo_string(&self, s: &DexString) -> bool {
        match self.first_jumbo_string {
            Some(first) => self.string_index(s) >= first,
            None => false,
        }
    }
}

fn referenced_types(class: &DexClass) -> Vec<DexType> {
    let mut types = vec![class.class_type.clone()];
    types.extend(class.super_type.clone());
    types.extend(class.interfaces.iter().cloned());
    for field in class.all_fields() {
        types.push(field.reference.holder().clone());
        types.push(field.reference.field_type().clone());
    }
    for method in class.all_methods() {
        types.push(method.reference.holder().clone());
        types.push(method.reference.proto().return_type().clone());
        types.extend(method.reference.proto().parameters().iter().cloned());
        if let Some(code) = method.code.as_ref().and_then(|c| c.as_dex()) {
            for handler in &code.handlers {
                types.extend(handler.handlers.iter().map(|(ty, _)| ty.clone()));
            }
        }
    }
    types
}

fn referenced_strings(class: &DexClass) -> Vec<DexString> {
    let mut strings: Vec<DexString> = referenced_types(class)
        .iter()
        .map(|t| t.descriptor_string().clone())
        .collect();
    strings.extend(class.source_file.clone());
    for field in class.all_fields() {
        strings.push(field.reference.name().clone());
    }
    for method in class.all_methods() {
        strings.push(method.reference.name().clone());
        strings.push(method.reference.proto().shorty().clone());
    }
    strings
}

fn collect_method_handles_from_value(value: &EncodedValue, out: &mut Vec<DexMethodHandle>) {
    match value {
        EncodedValue::MethodHandle(h) => out.push(h.clone()),
        EncodedValue::Array(values) => {
            for v in values {
                collect_method_handles_from_value(v, out);
            }
        }
        EncodedValue::Annotation(annotation) => {
            for (_, v) in &annotation.elements {
                collect_method_handles_from_value(v, out);
            }
        }
        _ => {}
    }
}

/// Method handles reachable from a class's constant values: static field
/// initializers and annotation elements (spec §4.7 step 5).
fn referenced_method_handles(class: &DexClass) -> Vec<DexMethodHandle> {
    let mut handles = Vec::new();
    for field in class.all_fields() {
        if let Some(value) = &field.static_value {
            collect_method_handles_from_value(value, &mut handles);
        }
        for annotation in &field.annotations.annotations {
            for (_, v) in &annotation.elements {
                collect_method_handles_from_value(v, &mut handles);
            }
        }
    }
    for method in class.all_methods() {
        for annotation in &method.annotations.annotations {
            for (_, v) in &annotation.elements {
                collect_method_handles_from_value(v, &mut handles);
            }
        }
        for param_annotations in &method.parameter_annotations {
            for annotation in &param_annotations.annotations {
                for (_, v) in &annotation.elements {
                    collect_method_handles_from_value(v, &mut handles);
                }
            }
        }
    }
    for annotation in &class.annotations.annotations {
        for (_, v) in &annotation.elements {
            collect_method_handles_from_value(v, &mut handles);
        }
    }
    handles
}

/// Types and strings a set of method handles' resolved fields/methods pull
/// in, so the type/string tables are complete before [compare_method_handle]
/// runs.
fn referenced_from_method_handles(handles: &[DexMethodHandle]) -> (Vec<DexType>, Vec<DexString>) {
    let mut types = Vec::new();
    let mut strings = Vec::new();
    for handle in handles {
        if let Some(field) = handle.as_field() {
            types.push(field.holder().clone());
            types.push(field.field_type().clone());
            strings.push(field.name().clone());
        }
        if let Some(method) = handle.as_method() {
            types.push(method.holder().clone());
            types.push(method.proto().return_type().clone());
            types.extend(method.proto().parameters().iter().cloned());
            strings.push(method.name().clone());
            strings.push(method.proto().shorty().clone());
        }
    }
    strings.extend(types.iter().map(|t| t.descriptor_string().clone()));
    (types, strings)
}

/// Depth-first computation of inheritance depth: `1 + max(super depth,
/// interface depths)`, `0` for a class with no resolvable supertype.
fn inheritance_depth(graph: &ClassGraph, ty: &DexType, memo: &mut HashMap<DexType, u32>) -> u32 {
    if let Some(&depth) = memo.get(ty) {
        return depth;
    }
    // Insert a provisional value so a cycle (already rejected elsewhere,
    // but cheap to guard here too) terminates instead of looping.
    memo.insert(ty.clone(), 0);

    let depth = match graph.lookup(ty) {
        Some(class) => {
            let super_depth = class
                .super_type
                .as_ref()
                .map(|s| inheritance_depth(graph, s, memo))
                .unwrap_or(0);
            let iface_depth = class
                .interfaces
                .iter()
                .map(|i| inheritance_depth(graph, i, memo))
                .max()
                .unwrap_or(0);
            1 + super_depth.max(iface_depth)
        }
        None => 0,
    };
    memo.insert(ty.clone(), depth);
    depth
}

fn dedup_sorted<T: Clone, F: Fn(&T, &T) -> std::cmp::Ordering>(mut items: Vec<T>, cmp: F) -> Vec<T> {
    items.sort_by(&cmp);
    items.dedup_by(|a, b| cmp(a, b) == std::cmp::Ordering::Equal);
    items
}

/// Runs the five-step algorithm of spec §4.7 over every class in `graph`.
/// Only program classes contribute to `class_order`; classpath/library
/// classes still contribute their referenced strings/types/protos so
/// that method signatures touching them resolve correctly.
pub fn assemble(graph: &ClassGraph) -> Result<AssembledIndex, DexError> {
    assemble_with_extra(graph, &ExtraReferences::default())
}

/// Like [assemble], but also folds in pool references a caller collected
/// from somewhere `graph`'s declared class structure doesn't expose —
/// typically constants a not-yet-written-back method body's lowered
/// instructions embed.
pub fn assemble_with_extra(graph: &ClassGraph, extra: &ExtraReferences) -> Result<AssembledIndex, DexError> {
    let mut all_strings = extra.strings.clone();
    let mut all_types = extra.types.clone();
    let mut all_protos = extra.protos.clone();
    let mut all_fields = extra.fields.clone();
    let mut all_methods = extra.methods.clone();
    let mut all_method_handles = extra.method_handles.clone();
    let all_call_sites = extra.call_sites.clone();

    for class in graph.all_classes() {
        all_strings.extend(referenced_strings(class));
        all_types.extend(referenced_types(class));
        for field in class.all_fields() {
            all_fields.push(field.reference.clone());
        }
        for method in class.all_methods() {
            all_methods.push(method.reference.clone());
            all_protos.push(method.reference.proto().clone());
        }
        all_method_handles.extend(referenced_method_handles(class));
    }

    for call_site in &all_call_sites {
        all_method_handles.push(call_site.bootstrap_method().clone());
        all_protos.push(call_site.method_proto().clone());
        all_strings.push(call_site.method_name().clone());
    }

    let (mh_types, mh_strings) = referenced_from_method_handles(&all_method_handles);
    all_types.extend(mh_types);
    all_strings.extend(mh_strings);

    // Step 1: strings, lexicographic. Strings are explicitly exempt from
    // the 2^16 ceiling (spec §4.7) — indices past it just switch to the
    // jumbo instruction form instead of failing.
    let strings = dedup_sorted(all_strings, compare_lexicographic);
    let first_jumbo_string = if strings.len() > MAX_TABLE_SIZE {
        Some(MAX_TABLE_SIZE as u32)
    } else {
        None
    };
    let mut string_index = HashMap::with_capacity(strings.len());
    for (i, s) in strings.iter().enumerate() {
        string_index.insert(s.clone(), i as u32);
    }

    // Step 2: types, string-table-indexed on descriptor.
    let string_index_for_types = StringIndexMap(&string_index);
    let types = dedup_sorted(all_types, |a, b| compare_type_by_descriptor(&string_index_for_types, a, b));
    if types.len() > MAX_TABLE_SIZE {
        return Err(DexError::IndexOverflow {
            table: "type_ids",
            count: types.len(),
        });
    }
    let mut type_index = HashMap::with_capacity(types.len());
    for (i, t) in types.iter().enumerate() {
        type_index.insert(t.clone(), i as u32);
    }

    // Step 3: program classes, (inheritance depth, type index).
    let mut depth_memo = HashMap::new();
    let mut class_order: Vec<DexType> = graph.program_classes().map(|c| c.class_type.clone()).collect();
    class_order.sort_by(|a, b| {
        let depth_a = inheritance_depth(graph, a, &mut depth_memo);
        let depth_b = inheritance_depth(graph, b, &mut depth_memo);
        depth_a
            .cmp(&depth_b)
            .then_with(|| type_index[a].cmp(&type_index[b]))
    });

    // Steps 4-5 need a combined String+Type index view.
    let combined = CombinedIndex {
        strings: &string_index,
        types: &type_index,
    };

    let protos = dedup_sorted(all_protos, |a, b| compare_proto(&combined, a, b));
    if protos.len() > MAX_TABLE_SIZE {
        return Err(DexError::IndexOverflow {
            table: "proto_ids",
            count: protos.len(),
        });
    }
    let mut proto_index = HashMap::with_capacity(protos.len());
    for (i, p) in protos.iter().enumerate() {
        proto_index.insert(p.clone(), i as u32);
    }

    let fields = dedup_sorted(all_fields, |a, b| compare_field(&combined, a, b));
    if fields.len() > MAX_TABLE_SIZE {
        return Err(DexError::IndexOverflow {
            table: "field_ids",
            count: fields.len(),
        });
    }
    let mut field_index = HashMap::with_capacity(fields.len());
    for (i, f) in fields.iter().enumerate() {
        field_index.insert(f.clone(), i as u32);
    }

    let methods = dedup_sorted(all_methods, |a, b| compare_method(&combined, a, b));
    if methods.len() > MAX_TABLE_SIZE {
        return Err(DexError::IndexOverflow {
            table: "method_ids",
            count: methods.len(),
        });
    }
    let mut method_index = HashMap::with_capacity(methods.len());
    for (i, m) in methods.iter().enumerate() {
        method_index.insert(m.clone(), i as u32);
    }

    let method_handles = dedup_sorted(all_method_handles, |a, b| compare_method_handle(&combined, a, b));
    if method_handles.len() > MAX_TABLE_SIZE {
        return Err(DexError::IndexOverflow {
            table: "method_handles",
            count: method_handles.len(),
        });
    }
    let mut method_handle_index = HashMap::with_capacity(method_handles.len());
    for (i, h) in method_handles.iter().enumerate() {
        method_handle_index.insert(h.clone(), i as u32);
    }

    let call_sites = dedup_sorted(all_call_sites, |a, b| compare_call_site(&combined, a, b));
    if call_sites.len() > MAX_TABLE_SIZE {
        return Err(DexError::IndexOverflow {
            table: "call_sites",
            count: call_sites.len(),
        });
    }
    let mut call_site_index = HashMap::with_capacity(call_sites.len());
    for (i, c) in call_sites.iter().enumerate() {
        call_site_index.insert(c.clone(), i as u32);
    }

    Ok(AssembledIndex {
        strings,
        types,
        protos,
        fields,
        methods,
        method_handles,
        call_sites,
        class_order,
        first_jumbo_string,
        string_index,
        type_index,
        proto_index,
        field_index,
        method_index,
        method_handle_index,
        call_site_index,
    })
}

struct StringIndexMap<'a>(&'a HashMap<DexString, u32>);

impl StringIndex for StringIndexMap<'_> {
    fn string_index(&self, s: &DexString) -> u32 {
        self.0[s]
    }
}

struct CombinedIndex<'a> {
    strings: &'a HashMap<DexString, u32>,
    types: &'a HashMap<DexType, u32>,
}

impl StringIndex for CombinedIndex<'_> {
    fn string_index(&self, s: &DexString) -> u32 {
        self.strings[s]
    }
}

impl TypeIndex for CombinedIndex<'_> {
    fn type_index(&self, t: &DexType) -> u32 {
        self.types[t]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_flags::AccessFlags;
    use crate::class::{AnnotationSet, ClassKind, ProgramClassInfo};
    use dexcomp_pool::ItemPool;

    fn program_class(pool: &ItemPool, name: &[u8], super_type: Option<DexType>) -> DexClass {
        DexClass {
            kind: ClassKind::Program(ProgramClassInfo::default()),
            class_type: pool.intern_type(name),
            access_flags: AccessFlags::PUBLIC,
            super_type,
            interfaces: Vec::new(),
            source_file: None,
            nest_host: None,
            nest_members: Vec::new(),
            inner_classes: Vec::new(),
            enclosing_method: None,
            generic_signature: None,
            annotations: AnnotationSet::default(),
            static_fields: Vec::new(),
            instance_fields: Vec::new(),
            direct_methods: Vec::new(),
            virtual_methods: Vec::new(),
        }
    }

    #[test]
    fn supertypes_precede_subtypes_in_class_order() {
        let pool = ItemPool::new();
        let object_ty = pool.intern_type(b"Ljava/lang/Object;");
        let base_ty = pool.intern_type(b"Lcom/app/Base;");
        let derived_ty = pool.intern_type(b"Lcom/app/Derived;");

        let mut graph = ClassGraph::new();
        graph.insert(program_class(&pool, b"Ljava/lang/Object;", None));
        graph.insert(program_class(&pool, b"Lcom/app/Base;", Some(object_ty)));
        graph.insert(program_class(&pool, b"Lcom/app/Derived;", Some(base_ty)));

        let index = assemble(&graph).unwrap();
        let derived_pos = index.class_order.iter().position(|t| t == &derived_ty).unwrap();
        let base_pos = index
            .class_order
            .iter()
            .position(|t| t == &pool.intern_type(b"Lcom/app/Base;"))
            .unwrap();
        assert!(base_pos < derived_pos);
    }

    #[test]
    fn strings_are_sorted_lexicographically() {
        let pool = ItemPool::new();
        let mut graph = ClassGraph::new();
        graph.insert(program_class(&pool, b"Lb/B;", None));
        graph.insert(program_class(&pool, b"La/A;", None));

        let index = assemble(&graph).unwrap();
        let mut sorted = index.strings.clone();
        sorted.sort_by(compare_lexicographic);
        assert_eq!(
            index.strings.iter().map(|s| s.as_bytes().to_vec()).collect::<Vec<_>>(),
            sorted.iter().map(|s| s.as_bytes().to_vec()).collect::<Vec<_>>()
        );
    }
}
