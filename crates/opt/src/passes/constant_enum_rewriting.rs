//! Step 8: constant enum method rewriting (spec §4.3). Folds `.ordinal()`
//! calls on a `static-get` of a known enum constant field straight to the
//! ordinal's `Const`, once the ordinal table has been populated (mirrors
//! [crate::passes::member_value_propagation], which folds the field read
//! itself rather than a method called on it).

use dashmap::DashMap;
use dexcomp_ir::{IRCode, Instruction, InvokeKind};
use dexcomp_pool::DexField;

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

#[derive(Default)]
pub struct ConstantEnumRewriting {
    ordinals: DashMap<DexField, i32>,
}

impl ConstantEnumRewriting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ordinal(&self, enum_constant_field: DexField, ordinal: i32) {
        self.ordinals.insert(enum_constant_field, ordinal);
    }
}

impl Pass for ConstantEnumRewriting {
    fn name(&self) -> &'static str {
        "constant-enum-rewriting"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        let targets: Vec<_> = code
            .blocks()
            .flat_map(|(block_id, block)| {
                block
                    .instructions
                    .iter()
                    .copied()
                    .filter_map(|id| {
                        let Instruction::Invoke {
                            result: Some(result),
                            kind: InvokeKind::Virtual,
                            method,
                            arguments,
                        } = code.instruction(id)
                        else {
                            return None;
                        };
                        if method.name().as_bytes() != b"ordinal" || arguments.len() != 1 {
                            return None;
                        }
                        let Some(Instruction::StaticGet { field, .. }) = code.definition(arguments[0]) else {
                            return None;
                        };
                        let ordinal = *self.ordinals.get(field)?;
                        Some((block_id, id, *result, ordinal))
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        for (block, instr_id, result, ordinal) in targets {
            let users: Vec<_> = code.value(result).users.to_vec();
            let folded = code.new_undefined_value(code.value(result).type_element.clone());
            let const_id = code.push_instruction(block, Instruction::Const { result: folded, bits: ordinal as i64 });
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
    use smallvec::smallvec;

    #[test]
    fn ordinal_of_a_known_constant_folds_to_a_literal() {
        let pool = ItemPool::new();
        let enum_type = pool.intern_type(b"Lcom/app/Suit;");
        let int_ty = pool.intern_type(b"I");
        let field = pool.intern_field(enum_type.clone(), enum_type.clone(), b"HEARTS");
        let ordinal_proto = pool.intern_proto(int_ty.clone(), Vec::new());
        let ordinal_method = pool.intern_method(pool.intern_type(b"Ljava/lang/Enum;"), ordinal_proto, b"ordinal");
        let m_proto = pool.intern_proto(int_ty.clone(), Vec::new());
        let method = pool.intern_method(pool.intern_type(b"Lcom/app/Foo;"), m_proto, b"m");

        let rewriting = ConstantEnumRewriting::new();
        rewriting.record_ordinal(field.clone(), 2);

        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let constant = code.new_undefined_value(dexcomp_ir::TypeElement::Reference { class: Some(enum_type), interfaces: Default::default(), nullable: false });
        code.push_instruction(entry, Instruction::StaticGet { result: constant, field });
        let ordinal = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(dexcomp_ir::PrimitiveType::Int));
        code.push_instruction(
            entry,
            Instruction::Invoke { result: Some(ordinal), kind: InvokeKind::Virtual, method: ordinal_method, arguments: smallvec![constant] },
        );
        code.push_instruction(entry, Instruction::Return { value: Some(ordinal) });

        let mut ctx = MethodProcessingContext::for_test(false);
        let code = rewriting.run(&mut ctx, code).unwrap();

        let Instruction::Return { value } = code.instruction(*code.block(entry).instructions.last().unwrap()) else {
            panic!("expected Return")
        };
        let Instruction::Const { bits, .. } = code.definition(value.unwrap()).unwrap() else {
            panic!("expected Const")
        };
        assert_eq!(*bits, 2);
    }
}
