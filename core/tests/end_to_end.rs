//! End-to-end driver scenarios (spec §8's concrete examples, minus the
//! ones that need a real class-file/dex fixture on disk).

use std::sync::Arc;

use dexcomp_core::options::DexProgramUnit;
use dexcomp_core::{BufferingReporter, CompilationOptions, Compiler, OutputConsumer, OutputFormat, ProgramInput, SequentialExecutor, Severity};
use dexcomp_dex::class::ProgramClassInfo;
use dexcomp_dex::{AccessFlags, ClassGraph, ClassKind, DexClass, DexIndexTables};
use dexcomp_pool::ItemPool;

fn minimal_program_class(pool: &ItemPool) -> DexClass {
    let class_type = pool.intern_type(b"LMinimal;");
    let object_type = pool.intern_type(b"Ljava/lang/Object;");
    DexClass {
        kind: ClassKind::Program(ProgramClassInfo::default()),
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
        annotations: Default::default(),
        static_fields: Vec::new(),
        instance_fields: Vec::new(),
        direct_methods: Vec::new(),
        virtual_methods: Vec::new(),
    }
}

#[test]
fn a_minimal_class_with_no_methods_compiles_to_a_one_class_image() {
    let pool = Arc::new(ItemPool::new());
    let class = minimal_program_class(&pool);

    let mut graph = ClassGraph::new();
    graph.insert(class.clone());

    let options = CompilationOptions::new(
        ProgramInput::Dex(vec![DexProgramUnit { classes: vec![class], tables: DexIndexTables::default() }]),
        21,
        OutputFormat::Dex,
        OutputConsumer::InMemory,
    )
    .with_desugar(false);

    let reporter = BufferingReporter::new();
    let compiler = Compiler::new(pool, Box::new(SequentialExecutor));
    let image = compiler.compile(&options, &mut graph, &reporter).expect("a class with no methods has nothing to fail on");

    assert_eq!(image.class_count(), 1);
    assert!(reporter.diagnostics().iter().all(|d| d.severity < Severity::Error));
}

#[test]
fn desugaring_without_a_min_api_is_rejected_before_any_work_runs() {
    let pool = Arc::new(ItemPool::new());
    let class = minimal_program_class(&pool);

    let mut graph = ClassGraph::new();
    graph.insert(class.clone());

    let options = CompilationOptions::new(
        ProgramInput::Dex(vec![DexProgramUnit { classes: vec![class], tables: DexIndexTables::default() }]),
        0,
        OutputFormat::Dex,
        OutputConsumer::InMemory,
    );

    let reporter = BufferingReporter::new();
    let compiler = Compiler::new(pool, Box::new(SequentialExecutor));
    let result = compiler.compile(&options, &mut graph, &reporter);

    assert!(result.is_err());
    assert!(reporter.diagnostics().is_empty(), "configuration errors are rejected before the driver reports anything");
}
