//! Step 24: idempotent-call canonicalization (spec §4.3). Folds a second
//! call to a known-pure method with the same arguments, in the same
//! block, to the first call's result — the same block-local
//! common-subexpression elimination [crate::passes::simplifications]
//! applies to arithmetic, specialized to calls whose purity has been
//! established externally (no field/array reads, no allocation, no
//! observable side effect) rather than inferred from the instruction
//! alone, the way a `Binary`/`Unary`'s purity is.
//!
//! Block-local only: two calls to the same pure method in different
//! blocks could still be folded by a full dominance-based analysis, but
//! this pass doesn't attempt that.

use std::collections::HashMap;

use dashmap::DashSet;
use dexcomp_ir::{IRCode, Instruction, ValueId};
use dexcomp_pool::DexMethod;
use smallvec::SmallVec;

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

#[derive(Default)]
pub struct IdempotentCallCanonicalization {
    pure_methods: DashSet<DexMethod>,
}

impl IdempotentCallCanonicalization {
    pub fn record_pure(&self, method: DexMethod) {
        self.pure_methods.insert(method);
    }
}

impl Pass for IdempotentCallCanonicalization {
    fn name(&self) -> &'static str {
        "idempotent-call-canonicalization"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        let blocks: Vec<_> = code.blocks().map(|(id, _)| id).collect();
        for block in blocks {
            let mut seen: HashMap<(DexMethod, SmallVec<[ValueId; 4]>), ValueId> = HashMap::new();
            let instrs = code.block(block).instructions.clone();
            for instr_id in instrs {
                let Instruction::Invoke { result: Some(result), method, arguments, .. } = code.instruction(instr_id).clone() else {
                    continue;
                };
                if !self.pure_methods.contains(&method) {
                    continue;
                }
                let key = (method, arguments);
                match seen.get(&key) {
                    Some(&existing) => {
                        code.replace_all_uses(result, existing);
                        code.remove_instruction(block, instr_id);
                    }
                    None => {
                        seen.insert(key, result);
                    }
                }
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_ir::InvokeKind;
    use dexcomp_pool::ItemPool;

    #[test]
    fn a_repeated_call_to_a_pure_method_with_the_same_argument_is_folded() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Ljava/lang/Math;");
        let int_ty = pool.intern_type(b"I");
        let proto = pool.intern_proto(int_ty.clone(), vec![int_ty.clone()]);
        let abs = pool.intern_method(holder, proto, b"abs");

        let canon = IdempotentCallCanonicalization::default();
        canon.record_pure(abs.clone());

        let caller_proto = pool.intern_proto(pool.intern_type(b"V"), Vec::new());
        let method = pool.intern_method(pool.intern_type(b"Lcom/app/Foo;"), caller_proto, b"m");
        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let arg = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(dexcomp_ir::PrimitiveType::Int));
        code.push_instruction(entry, Instruction::Const { result: arg, bits: -3 });
        let first = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(dexcomp_ir::PrimitiveType::Int));
        code.push_instruction(
            entry,
            Instruction::Invoke { result: Some(first), kind: InvokeKind::Static, method: abs.clone(), arguments: SmallVec::from_slice(&[arg]) },
        );
        let second = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(dexcomp_ir::PrimitiveType::Int));
        code.push_instruction(
            entry,
            Instruction::Invoke { result: Some(second), kind: InvokeKind::Static, method: abs, arguments: SmallVec::from_slice(&[arg]) },
        );
        code.push_instruction(entry, Instruction::Return { value: Some(second) });

        let mut ctx = MethodProcessingContext::for_test(false);
        let code = canon.run(&mut ctx, code).unwrap();

        assert_eq!(code.block(entry).instructions.len(), 3);
        let Instruction::Return { value } = code.instruction(*code.block(entry).instructions.last().unwrap()) else {
            panic!("expected Return")
        };
        assert_eq!(*value, Some(first));
    }
}
