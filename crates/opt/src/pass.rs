//! The `Pass` trait every pipeline step implements (spec §4.3).

use dexcomp_ir::IRCode;

use crate::context::MethodProcessingContext;
use crate::errors::OptError;

/// One optimization or lowering step over a single method's IR. A pass
/// owns its input `IRCode` and returns the (possibly rewritten) result;
/// the pipeline re-verifies SSA invariants after every pass (spec §4.3
/// "each pass preserves SSA form, def-use links, type consistency and
/// block-link consistency").
pub trait Pass: Send + Sync {
    /// A stable, human-readable name used in [OptError] and logging —
    /// never read back programmatically.
    fn name(&self) -> &'static str;

    fn run(&self, ctx: &mut MethodProcessingContext, code: IRCode) -> Result<IRCode, OptError>;
}
