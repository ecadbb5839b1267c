//! Post-build invariant checker (spec §4.2 "Invariants after build", §8
//! quantified invariants). Every builder and every optimization pass hands
//! its output through here before the next stage touches it — "input IR
//! with invariants, output IR with the same invariants" only holds if
//! something actually re-checks it at each boundary.

use std::collections::HashMap;

use crate::block::BlockId;
use crate::code::IRCode;
use crate::errors::IrError;

/// Runs every structural and type check spec §4.2/§8 require. Returns the
/// first violation found; callers that want every violation should run the
/// individual `check_*` functions themselves.
pub fn verify(ir: &IRCode) -> Result<(), IrError> {
    check_def_use_links(ir)?;
    check_block_link_symmetry(ir)?;
    check_phi_operand_counts(ir)?;
    check_phi_type_lattice(ir)?;
    check_reducible(ir)?;
    Ok(())
}

/// Every non-argument, non-phi value has exactly one definition, and every
/// operand it appears as is recorded in its definer's user list (spec §3,
/// §8 "SSA break caught").
fn check_def_use_links(ir: &IRCode) -> Result<(), IrError> {
    for (value_id, value) in ir.values() {
        if !value.is_argument() && !value.is_phi() && value.definition.is_none() {
            return Err(IrError::MalformedInputCode {
                method: format!("{:?}", ir.method()),
                reason: format!("value {value_id:?} is neither an argument nor a phi but has no definition"),
            });
        }
    }

    for (_, block) in ir.blocks() {
        for &instr_id in &block.instructions {
            let instr = ir.instruction(instr_id);
            for operand in instr.operands() {
                if !ir.value(operand).users.contains(&instr_id) {
                    return Err(IrError::MalformedInputCode {
                        method: format!("{:?}", ir.method()),
                        reason: format!("value {operand:?} is read by {instr_id:?} but doesn't list it as a user"),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Block predecessor/successor edges are bidirectionally consistent: `a`
/// lists `b` as a successor iff `b` lists `a` as a predecessor.
fn check_block_link_symmetry(ir: &IRCode) -> Result<(), IrError> {
    for (block_id, block) in ir.blocks() {
        for &succ in &block.successors {
            if !ir.block(succ).predecessors.contains(&block_id) {
                return Err(IrError::IrreducibleControlFlow { block: succ.0 });
            }
        }
        for &pred in &block.predecessors {
            if !ir.block(pred).successors.contains(&block_id) {
                return Err(IrError::IrreducibleControlFlow { block: block_id.0 });
            }
        }
    }
    Ok(())
}

/// Every phi's operand list has exactly one entry per predecessor of its
/// block, aligned in predecessor order (spec §3 "A `Phi` is a value whose
/// operands align with predecessor order", §8 quantified invariant).
fn check_phi_operand_counts(ir: &IRCode) -> Result<(), IrError> {
    for (block_id, block) in ir.blocks() {
        let expected = block.predecessors.len();
        for &phi in &block.phis {
            let actual = ir.value(phi).phi_operands.len();
            if actual != expected {
                return Err(IrError::InconsistentJoinTypes { block: block_id.0, register: phi.0 });
            }
        }
    }
    Ok(())
}

/// Types form a lattice meet at every phi: folding `meet` across a phi's
/// operands must never land on `Bottom` (spec §4.2 "types form a lattice
/// meet at every phi").
fn check_phi_type_lattice(ir: &IRCode) -> Result<(), IrError> {
    use crate::value::TypeElement;

    for (block_id, block) in ir.blocks() {
        for &phi in &block.phis {
            let value = ir.value(phi);
            let merged = value
                .phi_operands
                .iter()
                .fold(TypeElement::Top, |acc, &operand| acc.meet(&ir.value(operand).type_element));
            if matches!(merged, TypeElement::Bottom) {
                return Err(IrError::InconsistentJoinTypes { block: block_id.0, register: phi.0 });
            }
        }
    }
    Ok(())
}

/// Blocks form a reducible flow graph: every back edge's target dominates
/// its source (spec §4.2 "blocks form a reducible flow graph (no
/// irreducible loops for valid inputs)"). Computed with the standard
/// iterative dominator fixpoint over a reverse-postorder block numbering.
fn check_reducible(ir: &IRCode) -> Result<(), IrError> {
    let order = reverse_postorder(ir);
    let position: HashMap<BlockId, usize> = order.iter().enumerate().map(|(i, &b)| (b, i)).collect();

    let mut idom: Vec<Option<usize>> = vec![None; order.len()];
    let entry_pos = position[&ir.entry_block()];
    idom[entry_pos] = Some(entry_pos);

    let mut changed = true;
    while changed {
        changed = false;
        for (pos, &block_id) in order.iter().enumerate() {
            if pos == entry_pos {
                continue;
            }
            let mut new_idom: Option<usize> = None;
            for &pred in &ir.block(block_id).predecessors {
                let Some(&pred_pos) = position.get(&pred) else { continue };
                if idom[pred_pos].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred_pos,
                    Some(current) => intersect(&idom, current, pred_pos),
                });
            }
            if new_idom != idom[pos] {
                idom[pos] = new_idom;
                changed = true;
            }
        }
    }

    for &block_id in &order {
        for &succ in &ir.block(block_id).successors {
            let Some(&succ_pos) = position.get(&succ) else { continue };
            let is_back_edge = position[&block_id] >= succ_pos;
            if is_back_edge && !dominates(&idom, succ_pos, position[&block_id]) {
                return Err(IrError::IrreducibleControlFlow { block: block_id.0 });
            }
        }
    }
    Ok(())
}

fn intersect(idom: &[Option<usize>], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            a = idom[a].unwrap();
        }
        while b > a {
            b = idom[b].unwrap();
        }
    }
    a
}

fn dominates(idom: &[Option<usize>], candidate: usize, mut node: usize) -> bool {
    loop {
        if node == candidate {
            return true;
        }
        match idom[node] {
            Some(next) if next != node => node = next,
            _ => return node == candidate,
        }
    }
}

fn reverse_postorder(ir: &IRCode) -> Vec<BlockId> {
    let mut visited = vec![false; ir.block_count()];
    let mut order = Vec::with_capacity(ir.block_count());
    let mut stack = vec![(ir.entry_block(), false)];

    while let Some((block_id, processed)) = stack.pop() {
        if processed {
            order.push(block_id);
            continue;
        }
        if visited[block_id.0 as usize] {
            continue;
        }
        visited[block_id.0 as usize] = true;
        stack.push((block_id, true));
        for &succ in ir.block(block_id).successors.iter().rev() {
            if !visited[succ.0 as usize] {
                stack.push((succ, false));
            }
        }
    }
    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{BinaryOp, Instruction};
    use crate::value::{PrimitiveType, TypeElement};
    use dexcomp_pool::ItemPool;

    fn test_method(pool: &ItemPool) -> dexcomp_pool::DexMethod {
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        pool.intern_method(holder, proto, b"bar")
    }

    #[test]
    fn a_fresh_single_block_program_verifies() {
        let pool = ItemPool::new();
        let mut code = IRCode::new(test_method(&pool));
        let entry = code.entry_block();
        let a = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        code.push_instruction(entry, Instruction::Return { value: Some(a) });
        assert!(verify(&code).is_ok());
    }

    #[test]
    fn a_use_missing_from_its_definer_user_list_is_rejected() {
        let pool = ItemPool::new();
        let mut code = IRCode::new(test_method(&pool));
        let entry = code.entry_block();
        let a = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        let b = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        let result = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        code.push_instruction(entry, Instruction::Binary { result, op: BinaryOp::Add, lhs: a, rhs: b });
        // Corrupt the def/use link directly, bypassing `push_instruction`.
        code.value_mut(a).users.clear();
        assert!(matches!(verify(&code), Err(IrError::MalformedInputCode { .. })));
    }

    #[test]
    fn a_phi_with_too_few_operands_for_its_predecessors_is_rejected() {
        let pool = ItemPool::new();
        let mut code = IRCode::new(test_method(&pool));
        let entry = code.entry_block();
        let left = code.new_block();
        let right = code.new_block();
        let join = code.new_block();
        code.link(entry, left);
        code.link(entry, right);
        code.link(left, join);
        code.link(right, join);

        let phi = code.new_undefined_value(TypeElement::Top);
        code.push_phi(join, phi);
        let only_operand = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        code.set_phi_operands(phi, smallvec::smallvec![only_operand]);

        assert!(matches!(verify(&code), Err(IrError::InconsistentJoinTypes { .. })));
    }

    #[test]
    fn incompatible_primitive_widths_at_a_phi_are_rejected() {
        let pool = ItemPool::new();
        let mut code = IRCode::new(test_method(&pool));
        let entry = code.entry_block();
        let left = code.new_block();
        let right = code.new_block();
        let join = code.new_block();
        code.link(entry, left);
        code.link(entry, right);
        code.link(left, join);
        code.link(right, join);

        let phi = code.new_undefined_value(TypeElement::Top);
        code.push_phi(join, phi);
        let int_value = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        let long_value = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Long));
        code.set_phi_operands(phi, smallvec::smallvec![int_value, long_value]);

        assert!(matches!(verify(&code), Err(IrError::InconsistentJoinTypes { .. })));
    }

    #[test]
    fn a_natural_loop_back_edge_is_reducible() {
        let pool = ItemPool::new();
        let mut code = IRCode::new(test_method(&pool));
        let entry = code.entry_block();
        let header = code.new_block();
        let body = code.new_block();
        let exit = code.new_block();
        code.link(entry, header);
        code.link(header, body);
        code.link(body, header);
        code.link(header, exit);

        assert!(check_reducible(&code).is_ok());
    }
}
