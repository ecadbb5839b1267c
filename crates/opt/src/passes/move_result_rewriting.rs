//! Step 10: move-result rewriting (spec §4.3). On a register-based target
//! a call result and the register move that follows it are separate
//! bytecode instructions; this pipeline's builder already folds that
//! pair into [dexcomp_ir::Instruction::Invoke]'s own `result` field
//! during IR construction (spec §4.2), so there is nothing left for this
//! step to do by the time a method reaches the pipeline. Kept as an
//! explicit no-op pass, rather than dropped from the pipeline, so the
//! step ordering in [crate::default_pipeline] matches the specification
//! one-for-one.

use dexcomp_ir::IRCode;

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct MoveResultRewriting;

impl Pass for MoveResultRewriting {
    fn name(&self) -> &'static str {
        "move-result-rewriting"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, code: IRCode) -> Result<IRCode, OptError> {
        Ok(code)
    }
}
