//! The top-level compilation driver (spec §4.5, §6): builds IR for every
//! program method, partitions them into waves, runs each wave through
//! the optimization pipeline, drains synthesized methods into later
//! waves, and assembles the result into a [dexcomp_dex::DexImage].

use std::collections::HashMap;
use std::sync::Arc;

use dexcomp_dex::{Code, ClassGraph, DexImage, DexVersion};
use dexcomp_ir::IRCode;
use dexcomp_opt::desugar::InterfaceMethodRewriting;
use dexcomp_opt::Pass;
use dexcomp_pool::{DexMethod, ItemPool};

use crate::callgraph::CallGraph;
use crate::errors::{CompileError, Origin};
use crate::executor::Executor;
use crate::options::{CompilationOptions, DexProgramUnit, ProgramInput};
use crate::report::{Diagnostic, Reporter, Severity};
use crate::waves::{WaveScheduler, partition_waves};

/// A finished, one-shot compilation (spec §6 "Persisted state: None").
pub struct Compiler {
    pool: Arc<ItemPool>,
    executor: Box<dyn Executor>,
}

impl Compiler {
    pub fn new(pool: Arc<ItemPool>, executor: Box<dyn Executor>) -> Self {
        Compiler { pool, executor }
    }

    /// Builds IR for every program method in `options`, wave-schedules
    /// and optimizes it, then assembles the program partition of `graph`
    /// into a [DexImage]. `graph` must already contain the classpath and
    /// library declarations `options` names, plus every program class;
    /// building that union is the caller's concern (spec §1 "input
    /// container reading... out of scope").
    pub fn compile(&self, options: &CompilationOptions, graph: &mut ClassGraph, reporter: &dyn Reporter) -> Result<DexImage, CompileError> {
        options.validate()?;
        reporter.info("starting compilation");

        let mut bodies = self.build_ir(options, reporter)?;
        let method_refs: Vec<DexMethod> = bodies.keys().cloned().collect();

        let mut call_graph = CallGraph::build(&method_refs, &bodies);
        let broken = call_graph.break_cycles();
        for (caller, callee) in &broken {
            reporter.warning(Diagnostic::new(Severity::Warning, format!("broke recursive call edge {caller:?} -> {callee:?} for wave scheduling")));
        }

        let waves = partition_waves(&call_graph);
        reporter.info(&format!("scheduled {} method(s) across {} wave(s)", method_refs.len(), waves.len()));

        let throwable_type = self.pool.intern_type(b"Ljava/lang/Throwable;");
        let interface_method_rewriting = InterfaceMethodRewriting::new(self.pool.clone());
        if options.desugar {
            for class in graph.program_classes() {
                if !class.is_interface() {
                    continue;
                }
                for method in class.all_methods() {
                    if method.has_code() && !method.is_abstract_or_native() {
                        interface_method_rewriting.record_default_method(method.reference.clone());
                    }
                }
            }
        }
        let passes = Arc::new(dexcomp_opt::default_pipeline(
            matches!(options.output_format, crate::options::OutputFormat::Dex),
            interface_method_rewriting,
        ));
        let mut scheduler = WaveScheduler::new(self.pool.clone());

        let mut pending_waves = waves;
        let mut wave_index = 0;
        while wave_index < pending_waves.len() {
            let wave = pending_waves[wave_index].clone();
            let outcomes = scheduler.run_wave(&wave, &passes, &throwable_type, &mut bodies, graph, self.executor.as_ref());
            for (method, outcome) in wave.iter().zip(outcomes) {
                if let Err(err) = outcome {
                    return Err(CompileError::InvariantViolation {
                        origin: Origin::Synthesized(format!("{method:?}")),
                        method: format!("{method:?}"),
                        source: err,
                    });
                }
            }

            if !scheduler.synthesized().is_empty() {
                let mut next_wave = Vec::new();
                for entry in scheduler.synthesized().iter() {
                    next_wave.push(entry.key().clone());
                }
                for method in &next_wave {
                    if let Some((_, code)) = scheduler.synthesized().remove(method) {
                        bodies.insert(method.clone(), code);
                    }
                }
                pending_waves.push(next_wave);
            }
            wave_index += 1;

            if scheduler.is_cancelled() {
                reporter.warning(Diagnostic::new(Severity::Warning, "compilation cancelled, discarding remaining waves"));
                break;
            }
        }

        reporter.info("lowering optimized bodies to dex bytecode");
        let extra = dexcomp_opt::lowering::collect_references(bodies.values());
        let index = dexcomp_dex::assembly::assemble_with_extra(graph, &extra)
            .map_err(|source| CompileError::IndexOverflow { origin: Origin::Synthesized("lowering".to_string()), source })?;
        for (method, code) in &bodies {
            let dex_code = dexcomp_opt::lowering::lower_method(code, &index).map_err(|source| CompileError::LoweringFailure {
                origin: Origin::Synthesized(format!("{method:?}")),
                method: format!("{method:?}"),
                source,
            })?;
            if let Some(encoded) = graph.lookup_method_mut(method) {
                encoded.code = Some(Code::Dex(dex_code));
            }
        }

        reporter.info("assembling dex image");
        DexImage::assemble_with_extra(graph, DexVersion::min_for_api_level(options.min_api), &extra)
            .map_err(|source| CompileError::IndexOverflow { origin: Origin::Synthesized("assembly".to_string()), source })
    }

    /// Builds the initial `IRCode` for every method in the program input.
    /// Unresolvable references are recoverable (spec §7
    /// `ResolutionFailure`): the method is skipped with a warning rather
    /// than failing the whole compile.
    fn build_ir(&self, options: &CompilationOptions, reporter: &dyn Reporter) -> Result<HashMap<DexMethod, IRCode>, CompileError> {
        let mut bodies = HashMap::new();
        match &options.program {
            ProgramInput::Dex(units) => {
                for DexProgramUnit { classes, tables } in units {
                    for class in classes {
                        for method in class.all_methods() {
                            let Some(code) = method.code.as_ref().and_then(|c| c.as_dex()) else { continue };
                            let is_static = method.access_flags.is_static();
                            match dexcomp_ir::build_from_dex_code(&method.reference, code, is_static, tables) {
                                Ok(ir) => {
                                    bodies.insert(method.reference.clone(), ir);
                                }
                                Err(err) => {
                                    reporter.warning(Diagnostic::new(Severity::Warning, format!("skipping {:?}: {err}", method.reference)));
                                }
                            }
                        }
                    }
                }
            }
            ProgramInput::ClassFiles(units) => {
                for crate::options::ClassFileProgramUnit { class, pool } in units {
                    for method in class.all_methods() {
                        let Some(code) = method.code.as_ref().and_then(Code::as_cf) else { continue };
                        let is_static = method.access_flags.is_static();
                        match dexcomp_ir::build_from_cf_code(&method.reference, code, is_static, pool) {
                            Ok(ir) => {
                                bodies.insert(method.reference.clone(), ir);
                            }
                            Err(err) => {
                                reporter.warning(Diagnostic::new(Severity::Warning, format!("skipping {:?}: {err}", method.reference)));
                            }
                        }
                    }
                }
            }
        }
        Ok(bodies)
    }
}
