//! Covariant-return-type annotation expansion (spec §4.4): a method
//! overridden with a narrower return type needs a synthetic bridge with
//! the original erased signature so runtimes that dispatch by exact
//! descriptor still find it.
//!
//! Deciding this requires the overridden method's declared signature
//! from the class hierarchy, which this crate's IR layer doesn't carry
//! (see [crate::passes::devirtualization] for the same limitation). A
//! documented no-op until a class-hierarchy query is threaded in.

use dexcomp_ir::IRCode;

use crate::context::MethodProcessingContext;
use crate::desugar::{Desugaring, DesugaringEvents};
use crate::errors::OptError;

#[derive(Default)]
pub struct CovariantReturnTypeExpansion;

impl Desugaring for CovariantReturnTypeExpansion {
    fn name(&self) -> &'static str {
        "covariant-return-type-expansion"
    }

    fn needs_desugaring(&self, _code: &IRCode) -> bool {
        false
    }

    fn desugar(&self, _ctx: &mut MethodProcessingContext, code: IRCode, _events: &mut DesugaringEvents) -> Result<IRCode, OptError> {
        Ok(code)
    }
}
