//! The finished in-memory DEX image: every table in emission order, ready
//! for an external writer to serialize and checksum (spec §6 — the byte
//! stream and its Adler-32 are explicitly out of scope here).

use dexcomp_pool::{DexCallSite, DexField, DexMethod, DexMethodHandle, DexProto, DexString, DexType};

use crate::assembly::{AssembledIndex, ExtraReferences};
use crate::class::DexClass;
use crate::errors::DexError;
use crate::graph::ClassGraph;
use crate::header::DexVersion;

/// A fully assembled DEX image: the header-level metadata plus every
/// index table in its final, sorted emission order. This is the
/// hand-off point to the (out of scope) container/file writer.
pub struct DexImage {
    pub version: DexVersion,
    pub strings: Vec<DexString>,
    pub types: Vec<DexType>,
    pub protos: Vec<DexProto>,
    pub fields: Vec<DexField>,
    pub methods: Vec<DexMethod>,
    pub method_handles: Vec<DexMethodHandle>,
    pub call_sites: Vec<DexCallSite>,
    /// Program classes in final `class_defs` order (spec §4.7 step 3).
    pub classes: Vec<DexClass>,
    pub first_jumbo_string: Option<u32>,
}

impl DexImage {
    /// Assembles every table for the program classes in `graph` and
    /// snapshots them into final emission order. Fails with
    /// [DexError::IndexOverflow] if any index-bounded table (every table
    /// except strings) would exceed the uint16 index space.
    pub fn assemble(graph: &ClassGraph, version: DexVersion) -> Result<DexImage, DexError> {
        Self::assemble_with_extra(graph, version, &ExtraReferences::default())
    }

    /// Like [Self::assemble], but also folds in pool references collected
    /// outside `graph`'s declared structure — used by the driver to account
    /// for constants a lowered method body's instructions embed before that
    /// body is written back into the graph.
    pub fn assemble_with_extra(graph: &ClassGraph, version: DexVersion, extra: &ExtraReferences) -> Result<DexImage, DexError> {
        let index = crate::assembly::assemble_with_extra(graph, extra)?;
        let classes = index
            .class_order
            .iter()
            .filter_map(|ty| graph.lookup(ty).cloned())
            .collect();

        Ok(DexImage {
            version,
            strings: index.strings,
            types: index.types,
            protos: index.protos,
            fields: index.fields,
            methods: index.methods,
            method_handles: index.method_handles,
            call_sites: index.call_sites,
            classes,
            first_jumbo_string: index.first_jumbo_string,
        })
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

impl TryFrom<&ClassGraph> for AssembledIndex {
    type Error = DexError;

    fn try_from(graph: &ClassGraph) -> Result<Self, Self::Error> {
        crate::assembly::assemble(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_flags::AccessFlags;
    use crate::class::{AnnotationSet, ClassKind, ProgramClassInfo};
    use dexcomp_pool::ItemPool;

    #[test]
    fn assembling_empty_graph_yields_empty_image() {
        let graph = ClassGraph::new();
        let image = DexImage::assemble(&graph, DexVersion::Dex39).unwrap();
        assert_eq!(image.class_count(), 0);
        assert_eq!(image.string_count(), 0);
    }

    #[test]
    fn assembling_single_class_populates_tables() {
        let pool = ItemPool::new();
        let mut graph = ClassGraph::new();
        graph.insert(DexClass {
            kind: ClassKind::Program(ProgramClassInfo::default()),
            class_type: pool.intern_type(b"Lcom/app/Foo;"),
            access_flags: AccessFlags::PUBLIC,
            super_type: Some(pool.intern_type(b"Ljava/lang/Object;")),
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
        });

        let image = DexImage::assemble(&graph, DexVersion::Dex39).unwrap();
        assert_eq!(image.class_count(), 1);
        assert!(image.string_count() > 0);
    }
}
