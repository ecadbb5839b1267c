//! Classes and their encoded members (spec §3 "Classes", "Encoded members").
//!
//! The three class variants ([ClassKind::Program], [ClassKind::Classpath],
//! [ClassKind::Library]) share one field layout and are distinguished by a
//! tagged variant rather than an inheritance ladder — see spec §9's
//! "Deep inheritance of encoded items" redesign note.

use dexcomp_pool::{DexField, DexMethod, DexMethodHandle, DexString, DexType};

use crate::access_flags::AccessFlags;
use crate::code::Code;

/// A constant value attached to a field's static initializer, an
/// annotation element, or a default annotation value.
#[derive(Debug, Clone)]
pub enum EncodedValue {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(DexString),
    Type(DexType),
    Field(DexField),
    Method(DexMethod),
    MethodHandle(DexMethodHandle),
    Enum(DexField),
    Array(Vec<EncodedValue>),
    Annotation(Annotation),
    Null,
    Boolean(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationVisibility {
    Build,
    Runtime,
    System,
}

#[derive(Debug, Clone)]
pub struct Annotation {
    pub annotation_type: DexType,
    pub visibility: AnnotationVisibility,
    pub elements: Vec<(DexString, EncodedValue)>,
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationSet {
    pub annotations: Vec<Annotation>,
}

impl AnnotationSet {
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct InnerClassAttribute {
    pub inner_type: DexType,
    pub outer_type: Option<DexType>,
    pub inner_name: Option<DexString>,
    pub access_flags: AccessFlags,
}

#[derive(Debug, Clone)]
pub struct EnclosingMethodAttribute {
    pub method: DexMethod,
}

/// Mutable optimization facts attached to a field, populated and consumed
/// by `dexcomp-opt` passes. Only touched while the owning method/class is
/// "not yet processed", or through the wave scheduler's delayed-feedback
/// discipline (spec §3 invariant, §5).
#[derive(Debug, Clone, Default)]
pub struct FieldOptimizationInfo {
    pub is_dead: bool,
    pub can_be_inlined: bool,
}

/// Mutable optimization facts attached to a method.
#[derive(Debug, Clone, Default)]
pub struct MethodOptimizationInfo {
    pub is_inline_candidate: bool,
    pub never_returns_normally: bool,
    pub is_bridge_target: Option<DexMethod>,
    /// Reasons this method must not be inlined into a caller (e.g. it
    /// throws a checked exception its caller can't declare, or is
    /// recursive). Empty means unconstrained.
    pub inlining_constraints: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DexEncodedField {
    pub reference: DexField,
    pub access_flags: AccessFlags,
    pub generic_signature: Option<DexString>,
    pub annotations: AnnotationSet,
    pub static_value: Option<EncodedValue>,
    pub deprecated: bool,
    pub optimization_info: FieldOptimizationInfo,
}

impl DexEncodedField {
    pub fn new(reference: DexField, access_flags: AccessFlags) -> Self {
        DexEncodedField {
            reference,
            access_flags,
            generic_signature: None,
            annotations: AnnotationSet::default(),
            static_value: None,
            deprecated: false,
            optimization_info: FieldOptimizationInfo::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DexEncodedMethod {
    pub reference: DexMethod,
    pub access_flags: AccessFlags,
    pub generic_signature: Option<DexString>,
    pub annotations: AnnotationSet,
    pub parameter_annotations: Vec<AnnotationSet>,
    pub code: Option<Code>,
    pub deprecated: bool,
    pub optimization_info: MethodOptimizationInfo,
}

impl DexEncodedMethod {
    pub fn new(reference: DexMethod, access_flags: AccessFlags) -> Self {
        DexEncodedMethod {
            reference,
            access_flags,
            generic_signature: None,
            annotations: AnnotationSet::default(),
            parameter_annotations: Vec::new(),
            code: None,
            deprecated: false,
            optimization_info: MethodOptimizationInfo::default(),
        }
    }

    /// Classpath/library methods have no body (spec §3 invariant).
    pub fn has_code(&self) -> bool {
        self.code.is_some()
    }

    pub fn is_abstract_or_native(&self) -> bool {
        self.access_flags.is_abstract() || self.access_flags.is_native()
    }
}

/// Data carried only by [ClassKind::Program] classes: they mutate,
/// participate in emission, and remember their class-file provenance.
#[derive(Debug, Clone, Default)]
pub struct ProgramClassInfo {
    /// Adler32/CRC checksum of the originating class-file or dex entry,
    /// if one was supplied at read time; recomputed by the external
    /// writer for the final output, not trusted for identity here.
    pub origin_checksum: Option<u32>,
    pub original_class_file_version: Option<u32>,
    /// Ancestors this class was synthesized from by desugaring (e.g. a
    /// lambda's enclosing class, or the interface a companion class was
    /// generated for). Empty for classes read directly from input.
    pub synthesized_from: Vec<DexType>,
}

/// Which of the three class variants a [DexClass] is. Carries no
/// per-kind fields besides [ClassKind::Program]'s metadata; the shared
/// `{isProgramClass, hasBodies, emitsToDex}` capability set previously
/// expressed as inheritance is now just predicate methods on [DexClass].
#[derive(Debug, Clone)]
pub enum ClassKind {
    Program(ProgramClassInfo),
    Classpath,
    Library,
}

/// A class: access flags, supertype, member arrays, and the attributes
/// that describe it to tools and the runtime (spec §3 "Classes").
#[derive(Debug, Clone)]
pub struct DexClass {
    pub kind: ClassKind,
    pub class_type: DexType,
    pub access_flags: AccessFlags,
    pub super_type: Option<DexType>,
    pub interfaces: Vec<DexType>,
    pub source_file: Option<DexString>,
    pub nest_host: Option<DexType>,
    pub nest_members: Vec<DexType>,
    pub inner_classes: Vec<InnerClassAttribute>,
    pub enclosing_method: Option<EnclosingMethodAttribute>,
    pub generic_signature: Option<DexString>,
    pub annotations: AnnotationSet,
    pub static_fields: Vec<DexEncodedField>,
    pub instance_fields: Vec<DexEncodedField>,
    pub direct_methods: Vec<DexEncodedMethod>,
    pub virtual_methods: Vec<DexEncodedMethod>,
}

impl DexClass {
    pub fn is_program_class(&self) -> bool {
        matches!(self.kind, ClassKind::Program(_))
    }

    /// Classpath/library classes may have had bodies discarded or
    /// stripped; only program classes are guaranteed to have them.
    pub fn has_bodies(&self) -> bool {
        self.is_program_class()
    }

    pub fn emits_to_dex(&self) -> bool {
        self.is_program_class()
    }

    pub fn program_info(&self) -> Option<&ProgramClassInfo> {
        match &self.kind {
            ClassKind::Program(info) => Some(info),
            _ => None,
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.is_interface()
    }

    pub fn all_methods(&self) -> impl Iterator<Item = &DexEncodedMethod> {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }

    pub fn all_fields(&self) -> impl Iterator<Item = &DexEncodedField> {
        self.static_fields.iter().chain(self.instance_fields.iter())
    }

    pub fn lookup_method(&self, method: &DexMethod) -> Option<&DexEncodedMethod> {
        self.all_methods().find(|m| &m.reference == method)
    }

    pub fn lookup_field(&self, field: &DexField) -> Option<&DexEncodedField> {
        self.all_fields().find(|f| &f.reference == field)
    }

    pub fn all_methods_mut(&mut self) -> impl Iterator<Item = &mut DexEncodedMethod> {
        self.direct_methods.iter_mut().chain(self.virtual_methods.iter_mut())
    }

    pub fn lookup_method_mut(&mut self, method: &DexMethod) -> Option<&mut DexEncodedMethod> {
        self.all_methods_mut().find(|m| &m.reference == method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_pool::ItemPool;

    fn sample_class(pool: &ItemPool, kind: ClassKind) -> DexClass {
        let class_type = pool.intern_type(b"Lcom/app/Foo;");
        let object_type = pool.intern_type(b"Ljava/lang/Object;");
        DexClass {
            kind,
            class_type,
            access_flags: AccessFlags::PUBLIC,
            super_type: Some(object_type),
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
    fn capability_set_tracks_kind() {
        let pool = ItemPool::new();
        let program = sample_class(&pool, ClassKind::Program(ProgramClassInfo::default()));
        assert!(program.is_program_class());
        assert!(program.has_bodies());
        assert!(program.emits_to_dex());

        let library = sample_class(&pool, ClassKind::Library);
        assert!(!library.is_program_class());
        assert!(!library.has_bodies());
    }

    #[test]
    fn method_lookup_scans_both_arrays() {
        let pool = ItemPool::new();
        let mut class = sample_class(&pool, ClassKind::Classpath);
        let void_ty = pool.intern_type(b"V");
        let proto = pool.intern_proto(void_ty, vec![]);
        let method = pool.intern_method(class.class_type.clone(), proto, b"doThing");
        class
            .virtual_methods
            .push(DexEncodedMethod::new(method.clone(), AccessFlags::PUBLIC));

        assert!(class.lookup_method(&method).is_some());
    }
}
