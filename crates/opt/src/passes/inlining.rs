//! Step 4: inlining (spec §4.3, §5 "Inlining wave" example). Splices a
//! callee's body directly into a call site, given the callee's finished
//! IR from an earlier wave ([MethodProcessingContext::compiled_bodies] —
//! the wave scheduler only populates that map for methods it has decided
//! are inlinable, so this pass treats presence there as permission and
//! only adds the *structural* shape check: a single, branch-free,
//! monitor-free block ending in `return`, within an instruction
//! allowance).
//!
//! Scoped down deliberately: only `invoke-direct`/`invoke-static` call
//! sites are considered (a virtual/interface call may dispatch to an
//! override, which isn't safe to inline without prior devirtualization),
//! and only single-block callees — a callee with its own control flow
//! would need its blocks spliced into the caller's CFG and its
//! terminator rewired to a continuation block, which this pass does not
//! attempt. Recursive inlining falls out for free: a deeper call already
//! got inlined into the callee's own stored body in its own wave, so one
//! splice here picks up any of that transitively, bounded by the same
//! instruction allowance.

use dexcomp_ir::{IRCode, Instruction, InvokeKind, ValueId};

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

/// Total callee instructions (excluding the trailing `return`) a single
/// call site may pull in.
const DEFAULT_INSTRUCTION_ALLOWANCE: usize = 64;

pub struct Inlining {
    instruction_allowance: usize,
}

impl Default for Inlining {
    fn default() -> Self {
        Inlining { instruction_allowance: DEFAULT_INSTRUCTION_ALLOWANCE }
    }
}

impl Pass for Inlining {
    fn name(&self) -> &'static str {
        "inlining"
    }

    fn run(&self, ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        loop {
            let blocks: Vec<_> = code.blocks().map(|(id, _)| id).collect();
            let mut inlined_any = false;
            for block in blocks {
                let instrs = code.block(block).instructions.clone();
                for instr_id in instrs {
                    let Instruction::Invoke { result, kind, method, arguments } = code.instruction(instr_id).clone() else {
                        continue;
                    };
                    if !matches!(kind, InvokeKind::Direct | InvokeKind::Static) || method == *code.method() {
                        continue;
                    }
                    let Some(callee) = ctx.compiled_bodies.get(&method) else {
                        continue;
                    };
                    if self.splice(&mut code, block, instr_id, result, &arguments, &callee) {
                        inlined_any = true;
                    }
                }
            }
            if !inlined_any {
                break;
            }
        }

        if self.is_inline_eligible(&code) {
            ctx.feedback.record_inline_candidate(code.method().clone());
        }
        Ok(code)
    }
}

impl Inlining {
    /// The same shape check `splice` applies to a callee, run against
    /// `code` itself once its own pipeline pass has finished — a method
    /// this small is worth offering to callers processed in a later wave
    /// (spec §5 "delayed feedback propagation").
    fn is_inline_eligible(&self, code: &IRCode) -> bool {
        if code.block_count() != 1 {
            return false;
        }
        let entry = code.entry_block();
        let Some((last, body)) = code.block(entry).instructions.split_last() else {
            return false;
        };
        if !matches!(code.instruction(*last), Instruction::Return { .. }) {
            return false;
        }
        if body.len() > self.instruction_allowance {
            return false;
        }
        !body.iter().any(|&id| matches!(code.instruction(id), Instruction::MonitorEnter { .. } | Instruction::MonitorExit { .. } | Instruction::Throw { .. }))
    }

    fn splice(
        &self,
        code: &mut IRCode,
        block: dexcomp_ir::BlockId,
        invoke_id: dexcomp_ir::InstructionId,
        invoke_result: Option<ValueId>,
        arguments: &[ValueId],
        callee: &IRCode,
    ) -> bool {
        if callee.block_count() != 1 {
            return false;
        }
        let callee_entry = callee.entry_block();
        let callee_instrs = &callee.block(callee_entry).instructions;
        let Some((last, body)) = callee_instrs.split_last() else {
            return false;
        };
        let Instruction::Return { value: returned } = callee.instruction(*last) else {
            return false;
        };
        if body.len() > self.instruction_allowance {
            return false;
        }
        if body.iter().any(|&id| matches!(callee.instruction(id), Instruction::MonitorEnter { .. } | Instruction::MonitorExit { .. } | Instruction::Throw { .. })) {
            return false;
        }

        let mut map: std::collections::HashMap<ValueId, ValueId> = callee.arguments().iter().copied().zip(arguments.iter().copied()).collect();
        let mut new_ids = Vec::with_capacity(body.len());
        for &id in body {
            let mut instr = callee.instruction(id).clone();
            for operand in instr.operands() {
                if let Some(&mapped) = map.get(&operand) {
                    instr.replace_operand(operand, mapped);
                }
            }
            if let Some(old_result) = instr.result() {
                let new_result = code.new_undefined_value(callee.value(old_result).type_element.clone());
                match &mut instr {
                    Instruction::Const { result, .. }
                    | Instruction::ConstString { result, .. }
                    | Instruction::ConstClass { result, .. }
                    | Instruction::ConstNull { result }
                    | Instruction::Binary { result, .. }
                    | Instruction::Unary { result, .. }
                    | Instruction::InstanceGet { result, .. }
                    | Instruction::StaticGet { result, .. }
                    | Instruction::ArrayGet { result, .. }
                    | Instruction::ArrayLength { result, .. }
                    | Instruction::NewArray { result, .. }
                    | Instruction::NewInstance { result, .. }
                    | Instruction::CheckCast { result, .. }
                    | Instruction::InstanceOf { result, .. }
                    | Instruction::Assume { result, .. } => *result = new_result,
                    Instruction::Invoke { result, .. } => *result = Some(new_result),
                    _ => unreachable!(),
                }
                map.insert(old_result, new_result);
            }
            new_ids.push(code.push_instruction(block, instr));
        }

        if let (Some(caller_result), Some(returned)) = (invoke_result, returned) {
            let mapped_return = map.get(returned).copied().unwrap_or(*returned);
            code.replace_all_uses(caller_result, mapped_return);
        }

        let mut block_instrs = code.block(block).instructions.clone();
        let invoke_pos = block_instrs.iter().position(|&id| id == invoke_id).unwrap();
        block_instrs.retain(|id| *id != invoke_id && !new_ids.contains(id));
        for operand in code.instruction(invoke_id).operands() {
            code.value_mut(operand).users.retain(|&u| u != invoke_id);
        }
        block_instrs.splice(invoke_pos..invoke_pos, new_ids);
        code.block_mut(block).instructions = block_instrs;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FeedbackSink;
    use dashmap::DashSet;
    use dexcomp_ir::PrimitiveType;
    use dexcomp_pool::{DexMethod, ItemPool};
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingSink {
        inline_candidates: DashSet<DexMethod>,
    }

    impl FeedbackSink for RecordingSink {
        fn record_never_returns_normally(&self, _method: DexMethod) {}

        fn record_inline_candidate(&self, method: DexMethod) {
            self.inline_candidates.insert(method);
        }
    }

    #[test]
    fn a_static_call_to_a_single_block_callee_is_spliced_in() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let int_ty = pool.intern_type(b"I");
        let ret_proto = pool.intern_proto(int_ty.clone(), Vec::new());
        let callee_method = pool.intern_method(holder.clone(), ret_proto.clone(), b"g");
        let caller_method = pool.intern_method(holder, ret_proto, b"f");

        let mut callee = IRCode::new(callee_method.clone());
        let callee_entry = callee.entry_block();
        let one = callee.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        callee.push_instruction(callee_entry, Instruction::Const { result: one, bits: 1 });
        callee.push_instruction(callee_entry, Instruction::Return { value: Some(one) });

        let mut caller = IRCode::new(caller_method);
        let caller_entry = caller.entry_block();
        let call_result = caller.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        caller.push_instruction(
            caller_entry,
            Instruction::Invoke {
                result: Some(call_result),
                kind: InvokeKind::Static,
                method: callee_method.clone(),
                arguments: Default::default(),
            },
        );
        caller.push_instruction(caller_entry, Instruction::Return { value: Some(call_result) });

        let sink = Arc::new(RecordingSink::default());
        let mut ctx = MethodProcessingContext::for_test(false).with_feedback(sink.clone());
        ctx.compiled_bodies.insert(callee_method, callee);
        let caller_method = caller.method().clone();
        let caller = Inlining::default().run(&mut ctx, caller).unwrap();

        let instrs = &caller.block(caller_entry).instructions;
        assert_eq!(instrs.len(), 2);
        let Instruction::Const { bits, .. } = caller.instruction(instrs[0]) else {
            panic!("expected Const spliced in")
        };
        assert_eq!(*bits, 1);
        let Instruction::Return { value } = caller.instruction(instrs[1]) else {
            panic!("expected Return")
        };
        let Instruction::Const { result: const_result, .. } = caller.instruction(instrs[0]) else {
            unreachable!()
        };
        assert_eq!(*value, Some(*const_result));
        assert!(sink.inline_candidates.contains(&caller_method));
    }
}
