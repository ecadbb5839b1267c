//! Step 21: class inlining (spec §4.3). A scalar-replacement pass for
//! allocations that never escape their own block: when a `new-instance`
//! result (looking through at most one [dexcomp_ir::Assumption::NonNull]
//! wrapper) is only ever read and written through exactly one field, and
//! every one of those reads/writes lives in the same block as the
//! allocation, the field is promoted to a plain SSA value — loads
//! forward the last store, and the allocation itself becomes dead for
//! [crate::passes::dead_code_removal] to sweep up later.
//!
//! This is the scoped-down special case of class inlining: a full
//! version would replace allocations with several fields and allocations
//! that escape into other blocks (but not into another method), which
//! needs per-field dataflow across the whole CFG rather than one block.

use std::collections::HashSet;

use dexcomp_ir::{BlockId, IRCode, Instruction, ValueId};
use dexcomp_pool::DexField;

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

pub struct ClassInlining;

/// Follows a single [Instruction::Assume] hop forward from `value`, if
/// its only user is one — consumers read the assume's result, not the
/// allocation's own value, once assume insertion has run.
fn representative(code: &IRCode, value: ValueId) -> ValueId {
    let users = &code.value(value).users;
    if users.len() == 1 {
        if let Instruction::Assume { result, .. } = code.instruction(users[0]) {
            return *result;
        }
    }
    value
}

impl Pass for ClassInlining {
    fn name(&self) -> &'static str {
        "class-inlining"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        let blocks: Vec<_> = code.blocks().map(|(id, _)| id).collect();
        for block in blocks {
            let instrs = code.block(block).instructions.clone();
            for instr_id in &instrs {
                let Instruction::NewInstance { result, .. } = code.instruction(*instr_id) else {
                    continue;
                };
                let repr = representative(&code, *result);
                let Some(field) = single_non_escaping_field(&code, block, &instrs, repr) else {
                    continue;
                };
                promote_field(&mut code, block, &instrs, repr, &field);
            }
        }
        Ok(code)
    }
}

/// Returns the one field `repr` is used through, if every user is an
/// `InstanceGet`/`InstancePut` on that exact field within `block` — `None`
/// if `repr` escapes (any other use, or a use outside `block`).
fn single_non_escaping_field(code: &IRCode, block: BlockId, block_instrs: &[dexcomp_ir::InstructionId], repr: ValueId) -> Option<DexField> {
    let mut fields: HashSet<DexField> = HashSet::new();
    for &user in &code.value(repr).users {
        if !block_instrs.contains(&user) {
            return None;
        }
        match code.instruction(user) {
            Instruction::InstanceGet { object, field, .. } if *object == repr => fields.insert(field.clone()),
            Instruction::InstancePut { object, field, .. } if *object == repr => fields.insert(field.clone()),
            _ => return None,
        };
    }
    let _ = block;
    (fields.len() == 1).then(|| fields.into_iter().next().unwrap())
}

fn promote_field(code: &mut IRCode, block: BlockId, block_instrs: &[dexcomp_ir::InstructionId], repr: ValueId, field: &DexField) {
    let mut current: Option<ValueId> = None;
    for &instr_id in block_instrs {
        match code.instruction(instr_id) {
            Instruction::InstancePut { object, value, field: f } if *object == repr && f == field => {
                current = Some(*value);
                code.remove_instruction(block, instr_id);
            }
            Instruction::InstanceGet { result, object, field: f } if *object == repr && f == field => {
                if let Some(value) = current {
                    let result = *result;
                    code.replace_all_uses(result, value);
                    code.remove_instruction(block, instr_id);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_ir::PrimitiveType;
    use dexcomp_pool::ItemPool;

    #[test]
    fn a_single_field_non_escaping_allocation_has_its_load_forwarded() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let int_ty = pool.intern_type(b"I");
        let field = pool.intern_field(holder.clone(), int_ty, b"x");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        let method = pool.intern_method(holder.clone(), proto, b"m");

        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let obj = code.new_undefined_value(dexcomp_ir::TypeElement::Reference {
            class: Some(holder.clone()),
            interfaces: Default::default(),
            nullable: false,
        });
        code.push_instruction(entry, Instruction::NewInstance { result: obj, class_type: holder });
        let written = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        code.push_instruction(entry, Instruction::Const { result: written, bits: 7 });
        code.push_instruction(entry, Instruction::InstancePut { object: obj, value: written, field: field.clone() });
        let loaded = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        code.push_instruction(entry, Instruction::InstanceGet { result: loaded, object: obj, field });
        code.push_instruction(entry, Instruction::Return { value: Some(loaded) });

        let mut ctx = MethodProcessingContext::for_test(false);
        let code = ClassInlining.run(&mut ctx, code).unwrap();

        let Instruction::Return { value } = code.instruction(*code.block(entry).instructions.last().unwrap()) else {
            panic!("expected Return")
        };
        assert_eq!(*value, Some(written));
    }
}
