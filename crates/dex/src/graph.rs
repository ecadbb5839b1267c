//! Class graph: the mapping from type identity to class definition across
//! the three partitions a compilation sees at once (spec §2 "Class Graph").

use std::collections::HashMap;

use dexcomp_pool::{DexMethod, DexType};

use crate::class::{ClassKind, DexClass, DexEncodedMethod};

/// Type identity → class definition, spanning program, classpath and
/// library classes. There is exactly one of these per compilation run.
#[derive(Debug, Default)]
pub struct ClassGraph {
    classes: HashMap<DexType, DexClass>,
}

impl ClassGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a class. Panics never happen here — a
    /// re-insert under the same type simply shadows the previous
    /// definition, matching how a classpath stub is later promoted to a
    /// program class once its real body is read.
    pub fn insert(&mut self, class: DexClass) {
        self.classes.insert(class.class_type.clone(), class);
    }

    pub fn lookup(&self, ty: &DexType) -> Option<&DexClass> {
        self.classes.get(ty)
    }

    pub fn lookup_mut(&mut self, ty: &DexType) -> Option<&mut DexClass> {
        self.classes.get_mut(ty)
    }

    pub fn contains(&self, ty: &DexType) -> bool {
        self.classes.contains_key(ty)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn program_classes(&self) -> impl Iterator<Item = &DexClass> {
        self.classes.values().filter(|c| c.is_program_class())
    }

    pub fn all_classes(&self) -> impl Iterator<Item = &DexClass> {
        self.classes.values()
    }

    /// Walks the `super_type` chain starting at `ty`, stopping at
    /// `Object` or at a type missing from the graph (classpath tail not
    /// resolved). Returns `Err` if a cycle is detected, matching the
    /// DEX verifier's own requirement that inheritance be acyclic.
    pub fn superclass_chain(&self, ty: &DexType) -> Result<Vec<DexType>, crate::errors::DexError> {
        let mut chain = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut current = ty.clone();
        loop {
            if !seen.insert(current.clone()) {
                return Err(crate::errors::DexError::CyclicInheritance(
                    current.descriptor().into_owned(),
                ));
            }
            let Some(class) = self.classes.get(&current) else {
                break;
            };
            let Some(super_type) = &class.super_type else {
                break;
            };
            chain.push(super_type.clone());
            current = super_type.clone();
        }
        Ok(chain)
    }

    /// `true` if `sub` is `sup` or descends from it through resolvable
    /// supertypes.
    pub fn is_subtype_of(&self, sub: &DexType, sup: &DexType) -> bool {
        if sub == sup {
            return true;
        }
        matches!(self.superclass_chain(sub), Ok(chain) if chain.iter().any(|t| t == sup))
    }

    pub fn kind_of(&self, ty: &DexType) -> Option<&ClassKind> {
        self.classes.get(ty).map(|c| &c.kind)
    }

    /// Finds `method`'s encoded declaration by first locating its holder
    /// class, then its member entry within that class.
    pub fn lookup_method_mut(&mut self, method: &DexMethod) -> Option<&mut DexEncodedMethod> {
        self.lookup_mut(method.holder())?.lookup_method_mut(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_flags::AccessFlags;
    use crate::class::{AnnotationSet, ClassKind, ProgramClassInfo};
    use dexcomp_pool::ItemPool;

    fn leaf_class(pool: &ItemPool, name: &[u8], super_type: Option<DexType>) -> DexClass {
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
    fn subtype_check_walks_chain() {
        let pool = ItemPool::new();
        let object_ty = pool.intern_type(b"Ljava/lang/Object;");
        let base_ty = pool.intern_type(b"Lcom/app/Base;");
        let derived_ty = pool.intern_type(b"Lcom/app/Derived;");

        let mut graph = ClassGraph::new();
        graph.insert(leaf_class(&pool, b"Ljava/lang/Object;", None));
        graph.insert(leaf_class(&pool, b"Lcom/app/Base;", Some(object_ty.clone())));
        graph.insert(leaf_class(&pool, b"Lcom/app/Derived;", Some(base_ty.clone())));

        assert!(graph.is_subtype_of(&derived_ty, &base_ty));
        assert!(graph.is_subtype_of(&derived_ty, &object_ty));
        assert!(!graph.is_subtype_of(&base_ty, &derived_ty));
    }

    #[test]
    fn cyclic_inheritance_is_detected() {
        let pool = ItemPool::new();
        let a_ty = pool.intern_type(b"Lcom/app/A;");
        let b_ty = pool.intern_type(b"Lcom/app/B;");

        let mut graph = ClassGraph::new();
        graph.insert(leaf_class(&pool, b"Lcom/app/A;", Some(b_ty.clone())));
        graph.insert(leaf_class(&pool, b"Lcom/app/B;", Some(a_ty.clone())));

        assert!(graph.superclass_chain(&a_ty).is_err());
    }
}
