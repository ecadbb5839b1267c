//! Step 11: range-invoke splitting (spec §4.3). On the real target this
//! step decides, after register allocation, whether a call's arguments
//! land in registers contiguous enough to use the compact `invoke-range`
//! encoding instead of the fixed five-argument form. Register allocation
//! runs downstream of this crate (in `dexcomp-dex`'s bytecode lowering),
//! so nothing in this pre-allocation SSA pipeline can make that call yet.
//! No-op, kept for pipeline-order fidelity with the specification.

use dexcomp_ir::IRCode;

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct RangeInvokeSplitting;

impl Pass for RangeInvokeSplitting {
    fn name(&self) -> &'static str {
        "range-invoke-splitting"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, code: IRCode) -> Result<IRCode, OptError> {
        Ok(code)
    }
}
