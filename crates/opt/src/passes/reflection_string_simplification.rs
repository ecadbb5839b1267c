//! Step 5: reflection and string simplification (spec §4.3). Folds
//! `SomeClass.class.getName()`/`getSimpleName()` — a `const-class`
//! immediately fed into one of those two no-argument invokes — into the
//! descriptor string the compiler already knows at compile time.

use dexcomp_ir::{IRCode, Instruction, InvokeKind};

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct ReflectionStringSimplification;

impl Pass for ReflectionStringSimplification {
    fn name(&self) -> &'static str {
        "reflection-string-simplification"
    }

    fn run(&self, ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        let targets: Vec<_> = code
            .blocks()
            .flat_map(|(block_id, block)| {
                block
                    .instructions
                    .iter()
                    .copied()
                    .filter_map(|id| {
                        let Instruction::Invoke { result: Some(result), kind: InvokeKind::Virtual, method, arguments } =
                            code.instruction(id)
                        else {
                            return None;
                        };
                        if arguments.len() != 1 {
                            return None;
                        }
                        let is_get_name = matches!(method.name().as_bytes(), b"getName" | b"getSimpleName");
                        if !is_get_name {
                            return None;
                        }
                        let Some(Instruction::ConstClass { class_type, .. }) = code.definition(arguments[0]) else {
                            return None;
                        };
                        let simple = method.name().as_bytes() == b"getSimpleName";
                        let name = if simple {
                            class_type.simple_name()?
                        } else {
                            class_type.descriptor().trim_start_matches('L').trim_end_matches(';').replace('/', ".")
                        };
                        Some((block_id, id, *result, name))
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        for (block, instr_id, result, name) in targets {
            let string_value = ctx.pool.intern_string(name.as_bytes());
            let users: Vec<_> = code.value(result).users.to_vec();
            let folded = code.new_undefined_value(code.value(result).type_element.clone());
            let const_id = code.push_instruction(block, Instruction::ConstString { result: folded, value: string_value });
            for user in users {
                if user == const_id {
                    continue;
                }
                code.instruction_mut(user).replace_operand(result, folded);
                code.value_mut(folded).users.push(user);
            }
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
    fn get_simple_name_of_a_const_class_folds_to_a_string_literal() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let class_ty = pool.intern_type(b"Ljava/lang/Class;");
        let string_ty = pool.intern_type(b"Ljava/lang/String;");
        let proto = pool.intern_proto(string_ty, Vec::new());
        let get_simple_name = pool.intern_method(class_ty.clone(), proto, b"getSimpleName");
        let ret = pool.intern_type(b"V");
        let method_proto = pool.intern_proto(ret, Vec::new());
        let method = pool.intern_method(holder.clone(), method_proto, b"m");

        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let class_value = code.new_undefined_value(dexcomp_ir::TypeElement::Reference {
            class: Some(class_ty),
            interfaces: Default::default(),
            nullable: false,
        });
        code.push_instruction(entry, Instruction::ConstClass { result: class_value, class_type: holder });
        let result = code.new_undefined_value(dexcomp_ir::TypeElement::Reference {
            class: None,
            interfaces: Default::default(),
            nullable: false,
        });
        code.push_instruction(
            entry,
            Instruction::Invoke {
                result: Some(result),
                kind: InvokeKind::Virtual,
                method: get_simple_name,
                arguments: smallvec::smallvec![class_value],
            },
        );
        code.push_instruction(entry, Instruction::Return { value: Some(result) });

        let mut ctx = MethodProcessingContext::for_test(false);
        let code = ReflectionStringSimplification.run(&mut ctx, code).unwrap();

        let instrs = &code.block(entry).instructions;
        let Instruction::ConstString { value, .. } = code.instruction(instrs[1]) else {
            panic!("expected ConstString")
        };
        assert_eq!(value.as_str(), "Foo");
    }
}
