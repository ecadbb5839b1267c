//! Step 23: constant canonicalization and live-range shortening (spec
//! §4.3, DEX target only — register pressure is the allocator's problem
//! on a register machine, not on the class-file target's stack machine).
//!
//! Sinks a constant materialization (`const`, `const-string`,
//! `const-class`, `const/4 null`) down to immediately before its first
//! use, when every use is in the same block — shortening the value's
//! live range to the smallest span the allocator has to keep a register
//! reserved for it. A constant used across multiple blocks, or with no
//! use at all (left for [crate::passes::dead_code_removal]), is left in
//! place.

use std::collections::{HashMap, HashSet};

use dexcomp_ir::{IRCode, Instruction, InstructionId};

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct ConstantCanonicalization;

fn is_materialization(instr: &Instruction) -> bool {
    matches!(
        instr,
        Instruction::Const { .. } | Instruction::ConstString { .. } | Instruction::ConstClass { .. } | Instruction::ConstNull { .. }
    )
}

impl Pass for ConstantCanonicalization {
    fn name(&self) -> &'static str {
        "constant-canonicalization"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        let blocks: Vec<_> = code.blocks().map(|(id, _)| id).collect();
        for block in blocks {
            let instrs = code.block(block).instructions.clone();
            let mut sink_before: HashMap<InstructionId, Vec<InstructionId>> = HashMap::new();
            let mut moved: HashSet<InstructionId> = HashSet::new();

            for &id in &instrs {
                if !is_materialization(code.instruction(id)) {
                    continue;
                }
                let Some(result) = code.instruction(id).result() else { continue };
                let users = &code.value(result).users;
                if users.is_empty() || !users.iter().all(|u| instrs.contains(u)) {
                    continue;
                }
                let first_user = *instrs.iter().find(|candidate| users.contains(candidate)).unwrap();
                sink_before.entry(first_user).or_default().push(id);
                moved.insert(id);
            }

            if moved.is_empty() {
                continue;
            }
            let mut new_order = Vec::with_capacity(instrs.len());
            for &id in &instrs {
                if moved.contains(&id) {
                    continue;
                }
                if let Some(pre) = sink_before.get(&id) {
                    new_order.extend(pre.iter().copied());
                }
                new_order.push(id);
            }
            code.block_mut(block).instructions = new_order;
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_ir::{BinaryOp, PrimitiveType};
    use dexcomp_pool::ItemPool;

    #[test]
    fn a_constant_used_far_downstream_sinks_next_to_its_use() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        let method = pool.intern_method(holder, proto, b"m");

        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let a = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        let const_a = code.push_instruction(entry, Instruction::Const { result: a, bits: 5 });
        let b = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        let const_b = code.push_instruction(entry, Instruction::Const { result: b, bits: 9 });
        let x = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        let use_b = code.push_instruction(entry, Instruction::Binary { result: x, op: BinaryOp::Add, lhs: b, rhs: b });
        let y = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        let use_a = code.push_instruction(entry, Instruction::Binary { result: y, op: BinaryOp::Add, lhs: a, rhs: a });
        let ret_instr = code.push_instruction(entry, Instruction::Return { value: Some(y) });

        let mut ctx = MethodProcessingContext::for_test(false);
        let code = ConstantCanonicalization.run(&mut ctx, code).unwrap();

        assert_eq!(code.block(entry).instructions, vec![const_b, use_b, const_a, use_a, ret_instr]);
    }
}
