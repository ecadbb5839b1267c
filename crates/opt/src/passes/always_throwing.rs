//! Step 13: always-throwing-instruction optimization (spec §4.3). When a
//! call site invokes a method known to never return normally, everything
//! after it in the block is dead: truncated to an
//! [dexcomp_ir::Instruction::Unreachable] and the block's normal-exit
//! successor edges are dropped (the call's own exceptional edges, if the
//! block has any, are left alone — a thrown exception still needs
//! somewhere to go).
//!
//! The always-throws method set is supplied externally (analogous to
//! [crate::passes::member_value_propagation]'s constant table); nothing
//! in this crate alone can prove a method never returns.

use dashmap::DashSet;
use dexcomp_ir::{IRCode, Instruction};
use dexcomp_pool::DexMethod;

use crate::cfg_util::unlink_edge;
use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

#[derive(Default)]
pub struct AlwaysThrowing {
    never_returns: DashSet<DexMethod>,
}

impl AlwaysThrowing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_never_returns(&self, method: DexMethod) {
        self.never_returns.insert(method);
    }
}

impl Pass for AlwaysThrowing {
    fn name(&self) -> &'static str {
        "always-throwing"
    }

    fn run(&self, ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        let blocks: Vec<_> = code.blocks().map(|(id, _)| id).collect();
        for block in blocks {
            let instrs = code.block(block).instructions.clone();
            let Some(cut_at) = instrs.iter().position(|&id| {
                matches!(code.instruction(id), Instruction::Invoke { method, .. } if self.never_returns.contains(method))
            }) else {
                continue;
            };
            if cut_at + 1 == instrs.len() {
                continue;
            }

            for &dead in &instrs[cut_at + 1..] {
                for operand in code.instruction(dead).operands() {
                    code.value_mut(operand).users.retain(|&u| u != dead);
                }
                code.remove_instruction(block, dead);
            }
            let successors: Vec<_> = code.block(block).successors.to_vec();
            for succ in successors {
                unlink_edge(&mut code, block, succ);
            }
            let unreachable = code.push_instruction(block, Instruction::Unreachable);
            debug_assert_eq!(code.block(block).instructions.last(), Some(&unreachable));
        }

        if body_never_returns_normally(&code) {
            ctx.feedback.record_never_returns_normally(code.method().clone());
        }
        Ok(code)
    }
}

/// `true` once no block in `code` can fall off the end into a `Return` —
/// every exit is a `Throw` or an `Unreachable` truncation. The fact this
/// produces feeds the next wave's `AlwaysThrowing` instance for its
/// callers (spec §5 "delayed feedback propagation").
fn body_never_returns_normally(code: &IRCode) -> bool {
    if code.instruction_count() == 0 {
        return false;
    }
    !code
        .blocks()
        .any(|(_, block)| block.instructions.last().is_some_and(|&id| matches!(code.instruction(id), Instruction::Return { .. })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FeedbackSink;
    use dexcomp_ir::PrimitiveType;
    use dexcomp_pool::ItemPool;
    use smallvec::smallvec;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingSink {
        never_returns: DashSet<DexMethod>,
    }

    impl FeedbackSink for RecordingSink {
        fn record_never_returns_normally(&self, method: DexMethod) {
            self.never_returns.insert(method);
        }

        fn record_inline_candidate(&self, _method: DexMethod) {}
    }

    #[test]
    fn code_following_an_always_throwing_call_is_replaced_with_unreachable() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        let fail_method = pool.intern_method(holder.clone(), proto.clone(), b"fail");
        let method = pool.intern_method(holder, proto, b"m");

        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let tail = code.new_block();
        code.link(entry, tail);

        code.push_instruction(
            entry,
            Instruction::Invoke { result: None, kind: dexcomp_ir::InvokeKind::Static, method: fail_method.clone(), arguments: smallvec![] },
        );
        let dead = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        code.push_instruction(entry, Instruction::Const { result: dead, bits: 1 });
        code.push_instruction(entry, Instruction::Goto { target: tail });

        let pass = AlwaysThrowing::new();
        pass.record_never_returns(fail_method);
        let sink = Arc::new(RecordingSink::default());
        let mut ctx = MethodProcessingContext::for_test(false).with_feedback(sink.clone());
        let code = pass.run(&mut ctx, code).unwrap();

        let instrs = &code.block(entry).instructions;
        assert_eq!(instrs.len(), 2);
        assert!(matches!(code.instruction(instrs[1]), Instruction::Unreachable));
        assert!(code.block(entry).successors.is_empty());
        assert!(code.block(tail).predecessors.is_empty());
        assert!(sink.never_returns.contains(code.method()));
    }

    #[test]
    fn a_method_with_a_reachable_return_is_not_reported_as_never_returning() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        let method = pool.intern_method(holder, proto, b"m");

        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        code.push_instruction(entry, Instruction::Return { value: None });

        let pass = AlwaysThrowing::new();
        let sink = Arc::new(RecordingSink::default());
        let mut ctx = MethodProcessingContext::for_test(false).with_feedback(sink.clone());
        pass.run(&mut ctx, code).unwrap();

        assert!(sink.never_returns.is_empty());
    }
}
