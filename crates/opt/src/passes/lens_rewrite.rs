//! Step 1: lens rewrite (spec §4.3, §4.6). Resolves every type/field/
//! method reference in the method body through the context's current
//! [crate::lens::GraphLens] before any other pass reasons about them.

use dexcomp_ir::{IRCode, Instruction};

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct LensRewrite;

impl Pass for LensRewrite {
    fn name(&self) -> &'static str {
        "lens-rewrite"
    }

    fn run(&self, ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        let instruction_ids: Vec<_> = code
            .blocks()
            .flat_map(|(_, block)| block.instructions.iter().copied())
            .collect();

        for id in instruction_ids {
            let instr = code.instruction_mut(id);
            match instr {
                Instruction::ConstClass { class_type, .. }
                | Instruction::NewInstance { class_type, .. }
                | Instruction::CheckCast { class_type, .. }
                | Instruction::InstanceOf { class_type, .. } => {
                    *class_type = ctx.lens.lookup_type(class_type);
                }
                Instruction::NewArray { element_type, .. } => {
                    *element_type = ctx.lens.lookup_type(element_type);
                }
                Instruction::InstanceGet { field, .. }
                | Instruction::InstancePut { field, .. }
                | Instruction::StaticGet { field, .. }
                | Instruction::StaticPut { field, .. } => {
                    *field = ctx.lens.lookup_field(field);
                }
                Instruction::Invoke { kind, method, .. } => {
                    *kind = ctx.lens.lookup_invoke_type(*kind, method);
                    *method = ctx.lens.lookup_method(method);
                }
                _ => {}
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use dexcomp_pool::ItemPool;

    #[test]
    fn rewrites_a_check_cast_target_through_the_lens() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let bar = pool.intern_type(b"Lcom/app/Bar;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        let method = pool.intern_method(holder.clone(), proto, b"m");

        struct Retarget(dexcomp_pool::DexType);
        impl crate::lens::GraphLens for Retarget {
            fn lookup_type(&self, _original: &dexcomp_pool::DexType) -> dexcomp_pool::DexType {
                self.0.clone()
            }
        }

        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let obj = code.new_undefined_value(dexcomp_ir::TypeElement::Reference {
            class: Some(holder.clone()),
            interfaces: Default::default(),
            nullable: true,
        });
        let result = code.new_undefined_value(dexcomp_ir::TypeElement::Reference {
            class: Some(holder.clone()),
            interfaces: Default::default(),
            nullable: false,
        });
        code.push_instruction(
            entry,
            Instruction::CheckCast { result, operand: obj, class_type: holder.clone() },
        );

        let mut ctx = MethodProcessingContext::for_test(false).with_lens(Arc::new(Retarget(bar.clone())));
        let code = LensRewrite.run(&mut ctx, code).unwrap();

        let Instruction::CheckCast { class_type, .. } = code.instruction(
            code.block(code.entry_block()).instructions[0],
        ) else {
            panic!("expected CheckCast")
        };
        assert_eq!(*class_type, bar);
    }
}
