//! Step 12: sparse conditional constant propagation (spec §4.3). Folds
//! arithmetic whose operands are both compile-time constants, and
//! resolves `if` branches with constant operands into an unconditional
//! `goto` — pruning the untaken edge and repairing the target block's
//! phi operand lists to match its new (shorter) predecessor list.
//!
//! A real SCCP is a worklist algorithm that propagates constants through
//! phis across the whole method, discovering more opportunities as
//! branches resolve. This is a single forward pass over each block in
//! program order — it catches straight-line constant folding and
//! directly-constant branches, but won't iterate to a fixpoint across
//! loops or transitively through a phi every one of whose operands turns
//! out constant.

use dexcomp_ir::{BinaryOp, IRCode, Instruction, UnaryOp};

use crate::cfg_util::unlink_edge;
use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct SparseConditionalConstantPropagation;

fn eval_binary(op: BinaryOp, lhs: i64, rhs: i64) -> Option<i64> {
    Some(match op {
        BinaryOp::Add => lhs.wrapping_add(rhs),
        BinaryOp::Sub => lhs.wrapping_sub(rhs),
        BinaryOp::Mul => lhs.wrapping_mul(rhs),
        BinaryOp::Div if rhs != 0 => lhs.wrapping_div(rhs),
        BinaryOp::Rem if rhs != 0 => lhs.wrapping_rem(rhs),
        BinaryOp::Div | BinaryOp::Rem => return None,
        BinaryOp::And => lhs & rhs,
        BinaryOp::Or => lhs | rhs,
        BinaryOp::Xor => lhs ^ rhs,
        BinaryOp::Shl => lhs.wrapping_shl(rhs as u32),
        BinaryOp::Shr => lhs.wrapping_shr(rhs as u32),
        BinaryOp::UShr => ((lhs as u64) >> (rhs as u32 & 63)) as i64,
        BinaryOp::CmpLess => (lhs < rhs) as i64,
        BinaryOp::CmpLessEqual => (lhs <= rhs) as i64,
        BinaryOp::CmpGreater => (lhs > rhs) as i64,
        BinaryOp::CmpGreaterEqual => (lhs >= rhs) as i64,
        BinaryOp::CmpEqual => (lhs == rhs) as i64,
        BinaryOp::CmpNotEqual => (lhs != rhs) as i64,
    })
}

fn eval_unary(op: UnaryOp, operand: i64) -> Option<i64> {
    match op {
        UnaryOp::Neg => Some(operand.wrapping_neg()),
        UnaryOp::Not => Some(!operand),
        // Needs the source/target primitive widths to fold correctly;
        // not available from the bit pattern alone.
        UnaryOp::NumberConversion => None,
    }
}

fn const_bits(code: &IRCode, value: dexcomp_ir::ValueId) -> Option<i64> {
    match code.definition(value)? {
        Instruction::Const { bits, .. } => Some(*bits),
        _ => None,
    }
}

impl Pass for SparseConditionalConstantPropagation {
    fn name(&self) -> &'static str {
        "sparse-conditional-constant-propagation"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        fold_constant_arithmetic(&mut code);
        resolve_constant_branches(&mut code);
        Ok(code)
    }
}

fn fold_constant_arithmetic(code: &mut IRCode) {
    let targets: Vec<_> = code
        .blocks()
        .flat_map(|(block_id, block)| {
            block
                .instructions
                .iter()
                .copied()
                .filter_map(|id| {
                    let folded = match code.instruction(id) {
                        Instruction::Binary { result, op, lhs, rhs } => {
                            eval_binary(*op, const_bits(code, *lhs)?, const_bits(code, *rhs)?).map(|bits| (*result, bits))
                        }
                        Instruction::Unary { result, op, operand } => {
                            eval_unary(*op, const_bits(code, *operand)?).map(|bits| (*result, bits))
                        }
                        _ => None,
                    }?;
                    Some((block_id, id, folded.0, folded.1))
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
}

fn resolve_constant_branches(code: &mut IRCode) {
    let blocks: Vec<_> = code.blocks().map(|(id, _)| id).collect();
    for block in blocks {
        let Some(&last) = code.block(block).instructions.last() else { continue };
        let Instruction::If { op, lhs, rhs, if_true, if_false } = code.instruction(last) else { continue };
        let (Some(lhs_bits), Some(rhs_bits)) = (const_bits(code, *lhs), const_bits(code, *rhs)) else { continue };
        let Some(taken_is_true) = eval_binary(*op, lhs_bits, rhs_bits).map(|r| r != 0) else { continue };
        let (taken, dropped) = if taken_is_true { (*if_true, *if_false) } else { (*if_false, *if_true) };

        for operand in code.instruction(last).operands() {
            code.value_mut(operand).users.retain(|&u| u != last);
        }
        *code.instruction_mut(last) = Instruction::Goto { target: taken };

        if dropped != taken {
            unlink_edge(code, block, dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_ir::PrimitiveType;
    use dexcomp_pool::ItemPool;

    fn test_method(pool: &ItemPool) -> dexcomp_pool::DexMethod {
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        pool.intern_method(holder, proto, b"m")
    }

    #[test]
    fn constant_arithmetic_is_folded() {
        let pool = ItemPool::new();
        let mut code = IRCode::new(test_method(&pool));
        let entry = code.entry_block();
        let a = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        let b = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        code.push_instruction(entry, Instruction::Const { result: a, bits: 2 });
        code.push_instruction(entry, Instruction::Const { result: b, bits: 3 });
        let sum = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        code.push_instruction(entry, Instruction::Binary { result: sum, op: BinaryOp::Add, lhs: a, rhs: b });
        code.push_instruction(entry, Instruction::Return { value: Some(sum) });

        let mut ctx = MethodProcessingContext::for_test(false);
        let code = SparseConditionalConstantPropagation.run(&mut ctx, code).unwrap();

        let Instruction::Return { value } = code.instruction(*code.block(entry).instructions.last().unwrap()) else {
            panic!("expected Return")
        };
        let Instruction::Const { bits, .. } = code.definition(value.unwrap()).unwrap() else {
            panic!("expected Const")
        };
        assert_eq!(*bits, 5);
    }

    #[test]
    fn a_branch_on_constants_becomes_a_goto_and_prunes_the_dead_edge() {
        let pool = ItemPool::new();
        let mut code = IRCode::new(test_method(&pool));
        let entry = code.entry_block();
        let left = code.new_block();
        let right = code.new_block();
        code.link(entry, left);
        code.link(entry, right);

        let a = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        let b = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        code.push_instruction(entry, Instruction::Const { result: a, bits: 1 });
        code.push_instruction(entry, Instruction::Const { result: b, bits: 1 });
        code.push_instruction(
            entry,
            Instruction::If { op: BinaryOp::CmpEqual, lhs: a, rhs: b, if_true: left, if_false: right },
        );

        let mut ctx = MethodProcessingContext::for_test(false);
        let code = SparseConditionalConstantPropagation.run(&mut ctx, code).unwrap();

        assert_eq!(code.block(entry).successors.as_slice(), &[left]);
        assert!(code.block(right).predecessors.is_empty());
        let Instruction::Goto { target } = code.instruction(*code.block(entry).instructions.last().unwrap()) else {
            panic!("expected Goto")
        };
        assert_eq!(*target, left);
    }
}
