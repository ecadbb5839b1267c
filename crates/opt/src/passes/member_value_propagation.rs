//! Step 3: member value propagation (spec §4.3). Folds a `static-get` of
//! a field known to hold a compile-time constant (a `static final` with a
//! literal initializer) straight into a `Const`.
//!
//! The constant table is supplied externally — this crate has no class
//! hierarchy of its own, so whatever assembles the wave (spec §4.5) is
//! expected to have already collected `static final` initializers into a
//! [MemberValuePropagation] before scheduling methods through the
//! pipeline.

use dashmap::DashMap;
use dexcomp_ir::{IRCode, Instruction};
use dexcomp_pool::DexField;

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

#[derive(Default)]
pub struct MemberValuePropagation {
    known_constants: DashMap<DexField, i64>,
}

impl MemberValuePropagation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_constant(&self, field: DexField, bits: i64) {
        self.known_constants.insert(field, bits);
    }
}

impl Pass for MemberValuePropagation {
    fn name(&self) -> &'static str {
        "member-value-propagation"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        let targets: Vec<_> = code
            .blocks()
            .flat_map(|(block_id, block)| {
                block
                    .instructions
                    .iter()
                    .copied()
                    .filter_map(|id| match code.instruction(id) {
                        Instruction::StaticGet { result, field } => {
                            self.known_constants.get(field).map(|bits| (block_id, id, *result, *bits))
                        }
                        _ => None,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        for (block, instr_id, result, bits) in targets {
            let users: Vec<_> = code.value(result).users.to_vec();
            let folded = code.new_undefined_value(code.value(result).type_element.clone());
            let const_id = code.push_instruction(block, Instruction::Const { result: folded, bits });
            for user in users {
                if user == const_id {
                    continue;
                }
                code.instruction_mut(user).replace_operand(result, folded);
                code.value_mut(folded).users.push(user);
            }
            code.remove_instruction(block, instr_id);
        }
        Ok(code)
    }
}
