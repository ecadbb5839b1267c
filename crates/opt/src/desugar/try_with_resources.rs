//! Step 18: try-with-resources desugaring. On platforms old enough to
//! need it, the compiler-synthesized `$closeResource` helper and its
//! call chain through a resource's `close()` are collapsed back into a
//! straightforward try/finally shape the rest of the pipeline already
//! understands.
//!
//! This IR's exception model records catch handlers per block (spec §3)
//! but not the structured try/finally region a resource's desugared
//! shape depends on recognizing, so this transformation is a documented
//! no-op here rather than a guess at the region boundaries: it never
//! reports needing to run, and its presence in the collection exists so
//! the per-method desugaring trace (spec §4.4's "fast registry scan")
//! has a stable, named slot once that region information is available.

use dexcomp_ir::IRCode;

use crate::context::MethodProcessingContext;
use crate::desugar::{Desugaring, DesugaringEvents};
use crate::errors::OptError;

#[derive(Default)]
pub struct TryWithResourcesDesugaring;

impl Desugaring for TryWithResourcesDesugaring {
    fn name(&self) -> &'static str {
        "try-with-resources-desugaring"
    }

    fn needs_desugaring(&self, _code: &IRCode) -> bool {
        false
    }

    fn desugar(&self, _ctx: &mut MethodProcessingContext, code: IRCode, _events: &mut DesugaringEvents) -> Result<IRCode, OptError> {
        Ok(code)
    }
}
