//! One module per pipeline step (spec §4.3); steps the spec already
//! groups together (array-length/assertion-error/CSE/array-construction
//! simplification) stay grouped in one file rather than split further.

pub mod always_throwing;
pub mod assume_insertion;
pub mod check_cast_removal;
pub mod class_inlining;
pub mod class_initializer_defaults;
pub mod constant_canonicalization;
pub mod constant_enum_rewriting;
pub mod control_flow_simplification;
pub mod dead_code_removal;
pub mod desugaring_pass;
pub mod devirtualization;
pub mod idempotent_call_canonicalization;
pub mod inlining;
pub mod lens_rewrite;
pub mod member_value_propagation;
pub mod move_result_rewriting;
pub mod outline_identification;
pub mod range_invoke_splitting;
pub mod redundant_field_load_elimination;
pub mod reflection_string_simplification;
pub mod simplifications;
pub mod sparse_conditional_constant_propagation;
