//! Step 16: class initializer defaults optimization (spec §4.3). A
//! `<clinit>` that stores a field's implicit default (`0` or `null`)
//! into one of its own class's static fields is storing a value the
//! field already holds — the verifier zero-initializes every static
//! field before `<clinit>` runs. Such a store is always redundant and
//! is dropped outright.
//!
//! Scoped to `<clinit>` specifically (hence "self-contained": no
//! whole-class-hierarchy analysis, just this one method's own body) and
//! to the same class's own fields, since a write to an inherited or
//! unrelated class's static isn't guaranteed to be a no-op here.

use dexcomp_ir::{IRCode, Instruction};

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct ClassInitializerDefaults;

impl Pass for ClassInitializerDefaults {
    fn name(&self) -> &'static str {
        "class-initializer-defaults"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        if !code.method().is_class_initializer() {
            return Ok(code);
        }
        let own_class = code.method().holder().clone();

        let targets: Vec<_> = code
            .blocks()
            .flat_map(|(block_id, block)| {
                block
                    .instructions
                    .iter()
                    .copied()
                    .filter(|&id| {
                        let Instruction::StaticPut { value, field } = code.instruction(id) else {
                            return false;
                        };
                        if field.holder() != &own_class {
                            return false;
                        }
                        matches!(
                            code.definition(*value),
                            Some(Instruction::Const { bits: 0, .. }) | Some(Instruction::ConstNull { .. })
                        )
                    })
                    .map(move |id| (block_id, id))
                    .collect::<Vec<_>>()
            })
            .collect();

        for (block, instr_id) in targets {
            code.remove_instruction(block, instr_id);
        }
        Ok(code)
    }
}
