//! Step 6: devirtualization (spec §4.3). When a virtual or interface
//! call's receiver is traceable back to a `new-instance` of a concrete
//! type — directly, or through a chain of [dexcomp_ir::Assume] wrappers —
//! the dispatch is statically known, so the call is rewritten to a
//! direct invoke of that type's override.
//!
//! Scoped down from a full class-hierarchy analysis: this only recognizes
//! the one pattern above (freshly allocated receiver), not types narrowed
//! by an upstream `instanceof` check or a final field.

use dexcomp_ir::{IRCode, Instruction, InvokeKind, ValueId};
use dexcomp_pool::DexType;

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct Devirtualization;

fn concrete_allocation_type(code: &IRCode, mut value: ValueId) -> Option<DexType> {
    loop {
        match code.definition(value)? {
            Instruction::NewInstance { class_type, .. } => return Some(class_type.clone()),
            Instruction::Assume { operand, .. } => value = *operand,
            _ => return None,
        }
    }
}

impl Pass for Devirtualization {
    fn name(&self) -> &'static str {
        "devirtualization"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        let targets: Vec<_> = code
            .blocks()
            .flat_map(|(_, block)| block.instructions.iter().copied())
            .filter(|&id| {
                matches!(
                    code.instruction(id),
                    Instruction::Invoke { kind: InvokeKind::Virtual | InvokeKind::Interface, .. }
                )
            })
            .filter(|&id| {
                let Instruction::Invoke { arguments, .. } = code.instruction(id) else {
                    unreachable!()
                };
                arguments.first().is_some_and(|&receiver| concrete_allocation_type(&code, receiver).is_some())
            })
            .collect();

        for id in targets {
            if let Instruction::Invoke { kind, .. } = code.instruction_mut(id) {
                *kind = InvokeKind::Direct;
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_pool::ItemPool;
    use smallvec::smallvec;

    #[test]
    fn a_virtual_call_on_a_freshly_allocated_receiver_becomes_direct() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        let target = pool.intern_method(holder.clone(), proto.clone(), b"bar");
        let method = pool.intern_method(holder.clone(), proto, b"m");

        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let receiver = code.new_undefined_value(dexcomp_ir::TypeElement::Reference {
            class: Some(holder.clone()),
            interfaces: Default::default(),
            nullable: false,
        });
        code.push_instruction(entry, Instruction::NewInstance { result: receiver, class_type: holder });
        let invoke = code.push_instruction(
            entry,
            Instruction::Invoke { result: None, kind: InvokeKind::Virtual, method: target, arguments: smallvec![receiver] },
        );

        let mut ctx = MethodProcessingContext::for_test(false);
        let code = Devirtualization.run(&mut ctx, code).unwrap();

        let Instruction::Invoke { kind, .. } = code.instruction(invoke) else {
            panic!("expected Invoke")
        };
        assert_eq!(*kind, InvokeKind::Direct);
    }
}
