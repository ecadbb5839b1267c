//! Step 7: check-cast (and instance-of) removal (spec §4.3). Drops a
//! `check-cast` whose operand's known static type already exactly
//! matches the cast's target type — the check can't fail, so the
//! instruction is redundant and its result is just its operand.
//!
//! Scoped down to exact type equality rather than full subtyping (no
//! class hierarchy available here); a cast to a strict supertype is left
//! alone even though it's just as provably safe.

use dexcomp_ir::{IRCode, Instruction, TypeElement};

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct CheckCastRemoval;

impl Pass for CheckCastRemoval {
    fn name(&self) -> &'static str {
        "check-cast-removal"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        let targets: Vec<_> = code
            .blocks()
            .flat_map(|(block_id, block)| {
                block
                    .instructions
                    .iter()
                    .copied()
                    .filter_map(|id| {
                        let Instruction::CheckCast { result, operand, class_type } = code.instruction(id) else {
                            return None;
                        };
                        let TypeElement::Reference { class: Some(operand_class), .. } = &code.value(*operand).type_element
                        else {
                            return None;
                        };
                        (operand_class == class_type).then_some((block_id, id, *result, *operand))
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        for (block, instr_id, result, operand) in targets {
            code.replace_all_uses(result, operand);
            code.remove_instruction(block, instr_id);
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_pool::ItemPool;

    #[test]
    fn a_check_cast_to_the_operands_own_exact_type_is_removed() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        let method = pool.intern_method(holder.clone(), proto, b"m");

        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let operand = code.new_undefined_value(TypeElement::Reference {
            class: Some(holder.clone()),
            interfaces: Default::default(),
            nullable: false,
        });
        let result = code.new_undefined_value(TypeElement::Reference {
            class: Some(holder.clone()),
            interfaces: Default::default(),
            nullable: false,
        });
        code.push_instruction(entry, Instruction::CheckCast { result, operand, class_type: holder });
        code.push_instruction(entry, Instruction::Return { value: Some(result) });

        let mut ctx = MethodProcessingContext::for_test(false);
        let code = CheckCastRemoval.run(&mut ctx, code).unwrap();

        assert_eq!(code.block(entry).instructions.len(), 1);
        let Instruction::Return { value } = code.instruction(code.block(entry).instructions[0]) else {
            panic!("expected Return")
        };
        assert_eq!(*value, Some(operand));
    }
}
