//! Step 17: dead code removal (spec §4.3). Repeatedly drops pure,
//! result-producing instructions with no remaining users until a fixpoint
//! — removing one dead value can make the values it depended on dead in
//! turn (`c = const 1; x = c + c;` with `x` unused leaves both dead once
//! `x` goes).
//!
//! "Pure" here is the same conservative set [crate::passes::simplifications]
//! uses for CSE: constants and non-throwing arithmetic. Anything that can
//! raise (`array-get`, `check-cast`, `div`/`rem`, a field load that can
//! NPE) is left alone even if its result is unused, since removing it
//! would change whether the method throws. This pass only drops dead
//! instructions; unreachable blocks are not pruned here.

use dexcomp_ir::{BinaryOp, IRCode, Instruction};

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct DeadCodeRemoval;

fn is_removable_when_unused(instr: &Instruction) -> bool {
    matches!(
        instr,
        Instruction::Const { .. } | Instruction::ConstString { .. } | Instruction::ConstClass { .. } | Instruction::ConstNull { .. }
    ) || matches!(instr, Instruction::Binary { op, .. } if !matches!(op, BinaryOp::Div | BinaryOp::Rem))
        || matches!(instr, Instruction::Unary { op, .. } if !matches!(op, dexcomp_ir::UnaryOp::NumberConversion))
}

impl Pass for DeadCodeRemoval {
    fn name(&self) -> &'static str {
        "dead-code-removal"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        loop {
            let dead: Vec<_> = code
                .blocks()
                .flat_map(|(block_id, block)| {
                    block
                        .instructions
                        .iter()
                        .copied()
                        .filter(|&id| {
                            let instr = code.instruction(id);
                            instr.result().is_some_and(|r| code.value(r).users.is_empty()) && is_removable_when_unused(instr)
                        })
                        .map(move |id| (block_id, id))
                        .collect::<Vec<_>>()
                })
                .collect();

            if dead.is_empty() {
                break;
            }
            for (block, instr_id) in dead {
                for operand in code.instruction(instr_id).operands() {
                    code.value_mut(operand).users.retain(|&u| u != instr_id);
                }
                code.remove_instruction(block, instr_id);
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_ir::PrimitiveType;
    use dexcomp_pool::ItemPool;

    #[test]
    fn a_chain_of_unused_constants_and_arithmetic_is_fully_removed() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        let method = pool.intern_method(holder, proto, b"m");

        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let a = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        let b = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        let sum = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        code.push_instruction(entry, Instruction::Const { result: a, bits: 1 });
        code.push_instruction(entry, Instruction::Const { result: b, bits: 2 });
        code.push_instruction(entry, Instruction::Binary { result: sum, op: BinaryOp::Add, lhs: a, rhs: b });
        code.push_instruction(entry, Instruction::Return { value: None });

        let mut ctx = MethodProcessingContext::for_test(false);
        let code = DeadCodeRemoval.run(&mut ctx, code).unwrap();

        assert_eq!(code.block(entry).instructions.len(), 1);
        assert!(matches!(code.instruction(code.block(entry).instructions[0]), Instruction::Return { value: None }));
    }
}
