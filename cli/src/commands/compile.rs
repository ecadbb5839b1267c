use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use dexcomp_core::{CompilationOptions, Compiler, OutputConsumer, OutputFormat, ProgramInput, RayonExecutor};
use dexcomp_core::options::DexProgramUnit;
use dexcomp_dex::ClassGraph;
use dexcomp_pool::ItemPool;

pub(crate) fn command_compile(input: &PathBuf, min_api: u32, desugar: bool) -> Result<()> {
    let data = std::fs::read(input).with_context(|| format!("can't read dex file: {:?}", input))?;

    let pool = Arc::new(ItemPool::new());
    let parsed = dexcomp_dex::parse(&data, &pool).with_context(|| format!("can't parse dex file: {input:?}"))?;

    let mut graph = ClassGraph::new();
    for class in &parsed.classes {
        graph.insert(class.clone());
    }

    let options = CompilationOptions::new(
        ProgramInput::Dex(vec![DexProgramUnit { classes: parsed.classes, tables: parsed.tables }]),
        min_api,
        OutputFormat::Dex,
        OutputConsumer::InMemory,
    )
    .with_desugar(desugar);

    let reporter = dexcomp_core::BufferingReporter::new();
    let compiler = Compiler::new(pool, Box::new(RayonExecutor));
    let image = compiler.compile(&options, &mut graph, &reporter).with_context(|| "compilation failed")?;

    println!("strings: {}", image.string_count());
    println!("classes: {}", image.class_count());
    for diagnostic in reporter.diagnostics() {
        println!("{diagnostic}");
    }

    Ok(())
}
