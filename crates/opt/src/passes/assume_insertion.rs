//! Step 2: assume insertion (spec §4.3). Attaches a non-null
//! [dexcomp_ir::Assumption] to every `new-instance` result: allocation
//! can't yield null, so later passes (devirtualization, check-cast
//! removal) can read that fact straight off the value instead of
//! re-deriving it from a dataflow fixpoint.
//!
//! Scoped down to the one assumption kind the rest of this pipeline
//! actually consumes; `DynamicType`/`ConstantRange` assumptions are
//! structurally supported by the IR but nothing here synthesizes them yet.

use dexcomp_ir::{Assumption, IRCode, Instruction};

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct AssumeInsertion;

impl Pass for AssumeInsertion {
    fn name(&self) -> &'static str {
        "assume-insertion"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        let targets: Vec<_> = code
            .blocks()
            .flat_map(|(block_id, block)| {
                block
                    .instructions
                    .iter()
                    .copied()
                    .filter(|&id| matches!(code.instruction(id), Instruction::NewInstance { .. }))
                    .map(move |id| (block_id, id))
            })
            .collect();

        for (block, instr_id) in targets {
            let Instruction::NewInstance { result, .. } = *code.instruction(instr_id) else {
                continue;
            };
            let users: Vec<_> = code.value(result).users.to_vec();
            let assumed = code.new_undefined_value(code.value(result).type_element.clone());
            let assume_id = code.push_instruction(
                block,
                Instruction::Assume { result: assumed, operand: result, assumption: Assumption::NonNull },
            );
            for user in users {
                code.instruction_mut(user).replace_operand(result, assumed);
                code.value_mut(assumed).users.push(user);
            }
            code.value_mut(result).users.retain(|&u| u == assume_id);
        }
        Ok(code)
    }
}
