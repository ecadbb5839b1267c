//! The optimization pipeline, desugaring collection and graph lens (spec
//! §4.3, §4.4, §4.6). `dexcomp-core` drives this crate one method at a
//! time from its wave scheduler; nothing here touches threads directly.

pub(crate) mod cfg_util;
pub mod context;
pub mod desugar;
pub mod errors;
pub mod lens;
pub mod lowering;
pub mod pass;
pub mod passes;
pub mod pipeline;

pub use context::MethodProcessingContext;
pub use errors::OptError;
pub use lens::GraphLens;
pub use pass::Pass;
pub use pipeline::{finalize_empty_throwing_code, run_method_pipeline};

/// The fixed pipeline order (spec §4.3): every [Pass] a method's IR runs
/// through, front to back. `target_is_dex` gates the two DEX-target-only
/// steps (constant canonicalization/live-range shortening; everything
/// else runs for both DEX and class-file targets). `interface_method_rewriting`
/// backs step 20 (spec §4.3, §4.4) — the caller is expected to have already
/// populated it via [desugar::InterfaceMethodRewriting::record_default_method]
/// for every default/static/private interface method the program
/// declares, before the first wave runs.
pub fn default_pipeline(target_is_dex: bool, interface_method_rewriting: desugar::InterfaceMethodRewriting) -> Vec<Box<dyn Pass>> {
    let mut pipeline: Vec<Box<dyn Pass>> = vec![
        Box::new(passes::lens_rewrite::LensRewrite),
        Box::new(passes::assume_insertion::AssumeInsertion),
        Box::new(passes::member_value_propagation::MemberValuePropagation),
        Box::new(passes::inlining::Inlining::default()),
        Box::new(passes::reflection_string_simplification::ReflectionStringSimplification),
        Box::new(passes::devirtualization::Devirtualization),
        Box::new(passes::check_cast_removal::CheckCastRemoval),
        Box::new(passes::constant_enum_rewriting::ConstantEnumRewriting),
        Box::new(passes::simplifications::Simplifications),
        Box::new(passes::move_result_rewriting::MoveResultRewriting),
        Box::new(passes::range_invoke_splitting::RangeInvokeSplitting),
        Box::new(passes::sparse_conditional_constant_propagation::SparseConditionalConstantPropagation),
        Box::new(passes::always_throwing::AlwaysThrowing),
        Box::new(passes::control_flow_simplification::ControlFlowSimplification),
        Box::new(passes::redundant_field_load_elimination::RedundantFieldLoadElimination),
        Box::new(passes::class_initializer_defaults::ClassInitializerDefaults),
        Box::new(passes::dead_code_removal::DeadCodeRemoval),
        Box::new(passes::desugaring_pass::DesugaringPass::default().with_interface_method_rewriting(interface_method_rewriting)),
        Box::new(passes::class_inlining::ClassInlining),
        Box::new(passes::outline_identification::OutlineIdentification::default()),
    ];
    if target_is_dex {
        pipeline.push(Box::new(passes::constant_canonicalization::ConstantCanonicalization));
    }
    pipeline.push(Box::new(passes::idempotent_call_canonicalization::IdempotentCallCanonicalization));
    pipeline
}
