//! Step 15: redundant field load elimination (spec §4.3). Forwards a
//! field's last-known value — from a prior load or a prior store in the
//! same block — to the next load of that same field, instead of issuing
//! another `iget`/`sget`.
//!
//! Local to one block, in instruction order: an `invoke` conservatively
//! invalidates every tracked field (it might have written through a
//! setter), and a store to field `f` only forwards to later loads of
//! that same `f`, not to unrelated fields. No alias analysis across
//! distinct object values for instance fields — two receivers are only
//! considered the same object if they're literally the same [ValueId].

use std::collections::HashMap;

use dexcomp_ir::{IRCode, Instruction, ValueId};
use dexcomp_pool::DexField;

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct RedundantFieldLoadElimination;

#[derive(PartialEq, Eq, Hash, Clone)]
enum FieldKey {
    Instance(u32, DexField),
    Static(DexField),
}

impl Pass for RedundantFieldLoadElimination {
    fn name(&self) -> &'static str {
        "redundant-field-load-elimination"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        let blocks: Vec<_> = code.blocks().map(|(id, _)| id).collect();
        for block in blocks {
            let mut known: HashMap<FieldKey, ValueId> = HashMap::new();
            let instrs = code.block(block).instructions.clone();
            for instr_id in instrs {
                match code.instruction(instr_id).clone() {
                    Instruction::InstanceGet { result, object, field } => {
                        let key = FieldKey::Instance(object.0, field);
                        match known.get(&key) {
                            Some(&value) => {
                                code.replace_all_uses(result, value);
                                code.remove_instruction(block, instr_id);
                            }
                            None => {
                                known.insert(key, result);
                            }
                        }
                    }
                    Instruction::StaticGet { result, field } => {
                        let key = FieldKey::Static(field);
                        match known.get(&key) {
                            Some(&value) => {
                                code.replace_all_uses(result, value);
                                code.remove_instruction(block, instr_id);
                            }
                            None => {
                                known.insert(key, result);
                            }
                        }
                    }
                    Instruction::InstancePut { object, value, field } => {
                        known.insert(FieldKey::Instance(object.0, field), value);
                    }
                    Instruction::StaticPut { value, field } => {
                        known.insert(FieldKey::Static(field), value);
                    }
                    Instruction::Invoke { .. } => known.clear(),
                    _ => {}
                }
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_ir::PrimitiveType;
    use dexcomp_pool::ItemPool;

    #[test]
    fn a_second_load_of_the_same_instance_field_reuses_the_first() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let int_ty = pool.intern_type(b"I");
        let field = pool.intern_field(holder.clone(), int_ty, b"count");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        let method = pool.intern_method(holder.clone(), proto, b"m");

        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let object = code.new_undefined_value(dexcomp_ir::TypeElement::Reference {
            class: Some(holder),
            interfaces: Default::default(),
            nullable: false,
        });
        let first = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        let second = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        code.push_instruction(entry, Instruction::InstanceGet { result: first, object, field: field.clone() });
        code.push_instruction(entry, Instruction::InstanceGet { result: second, object, field });
        code.push_instruction(entry, Instruction::Return { value: Some(second) });

        let mut ctx = MethodProcessingContext::for_test(false);
        let code = RedundantFieldLoadElimination.run(&mut ctx, code).unwrap();

        assert_eq!(code.block(entry).instructions.len(), 2);
        let Instruction::Return { value } = code.instruction(code.block(entry).instructions[1]) else {
            panic!("expected Return")
        };
        assert_eq!(*value, Some(first));
    }
}
