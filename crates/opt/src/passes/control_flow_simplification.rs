//! Step 14: control-flow simplification (spec §4.3). Threads jumps
//! through single-predecessor, goto-only trampoline blocks: `p -> b -> t`
//! becomes `p -> t` directly when `b` holds nothing but the `goto` and
//! has no other predecessor to disturb.
//!
//! Scoped to the single-predecessor case specifically so `t`'s phi
//! operand count never needs to grow — redirecting a multi-predecessor
//! trampoline would require duplicating whichever phi operand `b`
//! contributed, once per predecessor `b` used to merge.

use dexcomp_ir::{BlockId, IRCode, Instruction};

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct ControlFlowSimplification;

fn retarget(instr: &mut Instruction, from: BlockId, to: BlockId) {
    match instr {
        Instruction::Goto { target } => {
            if *target == from {
                *target = to;
            }
        }
        Instruction::If { if_true, if_false, .. } => {
            if *if_true == from {
                *if_true = to;
            }
            if *if_false == from {
                *if_false = to;
            }
        }
        Instruction::Switch { cases, default, .. } => {
            for case in cases.iter_mut() {
                if case.target == from {
                    case.target = to;
                }
            }
            if *default == from {
                *default = to;
            }
        }
        _ => {}
    }
}

impl Pass for ControlFlowSimplification {
    fn name(&self) -> &'static str {
        "control-flow-simplification"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        let entry = code.entry_block();
        let trampolines: Vec<_> = code
            .blocks()
            .filter(|&(id, block)| {
                id != entry
                    && block.phis.is_empty()
                    && block.predecessors.len() == 1
                    && block.instructions.len() == 1
                    && matches!(code.instruction(block.instructions[0]), Instruction::Goto { .. })
            })
            .map(|(id, block)| {
                let Instruction::Goto { target } = code.instruction(block.instructions[0]) else {
                    unreachable!()
                };
                (id, block.predecessors[0], *target)
            })
            .collect();

        for (trampoline, predecessor, target) in trampolines {
            if predecessor == trampoline || code.block(target).predecessors.contains(&predecessor) {
                continue;
            }

            let pred_instrs = code.block(predecessor).instructions.clone();
            for instr_id in pred_instrs {
                retarget(code.instruction_mut(instr_id), trampoline, target);
            }
            for succ in code.block_mut(predecessor).successors.iter_mut() {
                if *succ == trampoline {
                    *succ = target;
                }
            }
            for pred in code.block_mut(target).predecessors.iter_mut() {
                if *pred == trampoline {
                    *pred = predecessor;
                }
            }
            code.block_mut(trampoline).predecessors.clear();
            code.block_mut(trampoline).successors.clear();
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_pool::ItemPool;

    #[test]
    fn a_single_predecessor_goto_only_block_is_threaded_through() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        let method = pool.intern_method(holder, proto, b"m");

        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let trampoline = code.new_block();
        let target = code.new_block();
        code.link(entry, trampoline);
        code.link(trampoline, target);
        code.push_instruction(entry, Instruction::Goto { target: trampoline });
        code.push_instruction(trampoline, Instruction::Goto { target });

        let mut ctx = MethodProcessingContext::for_test(false);
        let code = ControlFlowSimplification.run(&mut ctx, code).unwrap();

        assert_eq!(code.block(entry).successors.as_slice(), &[target]);
        assert_eq!(code.block(target).predecessors.as_slice(), &[entry]);
        assert!(code.block(trampoline).predecessors.is_empty());
        assert!(code.block(trampoline).successors.is_empty());
        let Instruction::Goto { target: retargeted } = code.instruction(code.block(entry).instructions[0]) else {
            panic!("expected Goto")
        };
        assert_eq!(*retargeted, target);
    }
}
