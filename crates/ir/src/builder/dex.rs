//! Builds SSA IR from a `code_item`'s raw DEX instructions by abstract
//! interpretation over register state (spec §4.2): a first pass finds
//! every block boundary (branch targets and the instruction after every
//! terminator), a second pass translates each block's instructions
//! against the register state it enters with, and a final pass fills in
//! phi operands once every predecessor's exit state is known.

use std::collections::BTreeSet;

use dexcomp_dex::{DexCode, DexIndexTables};
use dexcomp_pool::{DexMethod, DexType};
use smallvec::SmallVec;

use crate::block::BlockId;
use crate::code::IRCode;
use crate::errors::IrError;
use crate::instruction::Instruction;
use crate::value::{PrimitiveType, TypeElement, ValueId};

use super::decode::{RawOp, decode_insn};

fn method_label(method: &DexMethod) -> String {
    format!("{:?}", method)
}

fn type_element_for(ty: &DexType) -> TypeElement {
    if ty.is_primitive() {
        let kind = match ty.descriptor_string().as_bytes().first() {
            Some(b'Z') => PrimitiveType::Boolean,
            Some(b'B') => PrimitiveType::Byte,
            Some(b'C') => PrimitiveType::Char,
            Some(b'S') => PrimitiveType::Short,
            Some(b'J') => PrimitiveType::Long,
            Some(b'F') => PrimitiveType::Float,
            Some(b'D') => PrimitiveType::Double,
            _ => PrimitiveType::Int,
        };
        TypeElement::Primitive(kind)
    } else {
        TypeElement::Reference {
            class: Some(ty.clone()),
            interfaces: SmallVec::new(),
            nullable: true,
        }
    }
}

/// One decoded instruction plus its starting address, kept around between
/// the boundary-finding pass and the translation pass.
struct Decoded {
    addr: u32,
    op: RawOp,
}

/// Builds the IR for one DEX-encoded method body.
///
/// `is_static` controls whether the leading incoming register holds an
/// implicit `this` (spec §4.2's register-state abstract interpretation
/// needs to know the calling convention to seed argument values).
pub fn build_from_dex_code(method: &DexMethod, code: &DexCode, is_static: bool, tables: &DexIndexTables) -> Result<IRCode, IrError> {
    let label = method_label(method);
    let insns = &code.insns;

    let mut decoded = Vec::new();
    let mut pc = 0usize;
    while pc < insns.len() {
        let (op, width) = decode_insn(insns, pc, &label)?;
        decoded.push(Decoded { addr: pc as u32, op });
        pc += width;
    }

    let mut boundaries: BTreeSet<u32> = BTreeSet::new();
    boundaries.insert(0);
    for (i, d) in decoded.iter().enumerate() {
        if let Some(offset) = d.op.branch_offset() {
            let target = (d.addr as i64 + offset as i64) as u32;
            boundaries.insert(target);
        }
        if d.op.is_terminator() {
            if let Some(next) = decoded.get(i + 1) {
                boundaries.insert(next.addr);
            }
        }
    }

    let boundary_list: Vec<u32> = boundaries.into_iter().collect();
    let mut ir = IRCode::new(method.clone());
    let mut addr_to_block: Vec<(u32, BlockId)> = vec![(boundary_list[0], ir.entry_block())];
    for &addr in boundary_list.iter().skip(1) {
        let id = ir.new_block();
        addr_to_block.push((addr, id));
    }

    let block_of = |addr: u32| -> BlockId {
        match addr_to_block.binary_search_by_key(&addr, |&(a, _)| a) {
            Ok(i) => addr_to_block[i].1,
            Err(0) => addr_to_block[0].1,
            Err(i) => addr_to_block[i - 1].1,
        }
    };

    // Group decoded instructions per block.
    let mut block_instrs: Vec<Vec<&Decoded>> = vec![Vec::new(); addr_to_block.len()];
    for d in &decoded {
        let idx = match addr_to_block.binary_search_by_key(&d.addr, |&(a, _)| a) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        block_instrs[idx].push(d);
    }

    // Link control-flow edges before any value translation, so every
    // block's final predecessor count is known up front.
    for (idx, instrs) in block_instrs.iter().enumerate() {
        let this_block = addr_to_block[idx].1;
        let Some(last) = instrs.last() else { continue };
        match &last.op {
            RawOp::Goto { target } => {
                let dest = (last.addr as i64 + *target as i64) as u32;
                ir.link(this_block, block_of(dest));
            }
            RawOp::IfTest { target, .. } | RawOp::IfTestZ { target, .. } => {
                let dest = (last.addr as i64 + *target as i64) as u32;
                ir.link(this_block, block_of(dest));
                if let Some(&(next_addr, _)) = addr_to_block.get(idx + 1) {
                    ir.link(this_block, block_of(next_addr));
                }
            }
            RawOp::ReturnVoid | RawOp::Return { .. } | RawOp::Throw { .. } => {}
            _ => {
                if let Some(&(next_addr, _)) = addr_to_block.get(idx + 1) {
                    ir.link(this_block, block_of(next_addr));
                }
            }
        }
    }

    let registers_size = code.registers_size as u16;
    let ins_size = code.ins_size as u16;

    // Seed the entry block's register state with the incoming arguments,
    // placed at the tail of register space per DEX calling convention.
    let mut entry_regs = vec![None; registers_size as usize];
    let mut next_reg = registers_size - ins_size;
    let mut arguments = Vec::new();
    if !is_static {
        let value = ir.new_undefined_value(type_element_for(method.holder()));
        entry_regs[next_reg as usize] = Some(value);
        arguments.push(value);
        next_reg += 1;
    }
    for param in method.proto().parameters() {
        let value = ir.new_undefined_value(type_element_for(param));
        entry_regs[next_reg as usize] = Some(value);
        arguments.push(value);
        next_reg += if param.is_wide() { 2 } else { 1 };
    }
    ir.set_arguments(arguments);

    let mut entry_state: Vec<Vec<Option<ValueId>>> = vec![Vec::new(); addr_to_block.len()];
    entry_state[0] = entry_regs;

    let mut exit_state: Vec<Vec<Option<ValueId>>> = vec![Vec::new(); addr_to_block.len()];
    let mut join_phis: Vec<Vec<ValueId>> = vec![Vec::new(); addr_to_block.len()];

    for idx in 0..addr_to_block.len() {
        let block_id = addr_to_block[idx].1;
        if idx != 0 {
            let preds = ir.block(block_id).predecessors.len();
            if preds == 0 {
                if !block_instrs[idx].is_empty() {
                    return Err(IrError::UnreachableCodeWithInstructions { address: addr_to_block[idx].0 });
                }
                entry_state[idx] = vec![None; registers_size as usize];
            } else if preds == 1 {
                let pred = ir.block(block_id).predecessors[0];
                let pred_idx = addr_to_block.iter().position(|&(_, b)| b == pred).unwrap();
                entry_state[idx] = if exit_state[pred_idx].is_empty() {
                    vec![None; registers_size as usize]
                } else {
                    exit_state[pred_idx].clone()
                };
            } else {
                let mut regs = Vec::with_capacity(registers_size as usize);
                let mut phis = Vec::with_capacity(registers_size as usize);
                for _ in 0..registers_size {
                    let phi = ir.new_undefined_value(TypeElement::Top);
                    ir.push_phi(block_id, phi);
                    phis.push(phi);
                    regs.push(Some(phi));
                }
                join_phis[idx] = phis;
                entry_state[idx] = regs;
            }
        }

        let mut regs = entry_state[idx].clone();
        let mut pending_invoke_result: Option<ValueId> = None;

        for d in &block_instrs[idx] {
            translate_one(&mut ir, block_id, d, tables, &mut regs, &mut pending_invoke_result, &label)?;
        }

        if let Some(last) = block_instrs[idx].last() {
            if !last.op.is_terminator() {
                if let Some(&(next_addr, _)) = addr_to_block.get(idx + 1) {
                    ir.push_instruction(block_id, Instruction::Goto { target: block_of(next_addr) });
                }
            }
        } else if let Some(&(next_addr, _)) = addr_to_block.get(idx + 1) {
            ir.push_instruction(block_id, Instruction::Goto { target: block_of(next_addr) });
        }

        exit_state[idx] = regs;
    }

    // Second pass: wire up phi operands now that every predecessor's exit
    // state is known, in predecessor-list order per spec §3.
    for idx in 0..addr_to_block.len() {
        if join_phis[idx].is_empty() {
            continue;
        }
        let block_id = addr_to_block[idx].1;
        let preds = ir.block(block_id).predecessors.clone();
        for (reg, &phi) in join_phis[idx].iter().enumerate() {
            let mut operands = SmallVec::<[ValueId; 4]>::new();
            for &pred in &preds {
                let pred_idx = addr_to_block.iter().position(|&(_, b)| b == pred).unwrap();
                if let Some(Some(v)) = exit_state[pred_idx].get(reg) {
                    operands.push(*v);
                }
            }
            let merged = operands
                .iter()
                .fold(TypeElement::Top, |acc, &v| acc.meet(&ir.value(v).type_element));
            ir.set_phi_operands(phi, operands);
            ir.value_mut(phi).type_element = merged;
        }
    }

    Ok(ir)
}

fn reg_value(regs: &[Option<ValueId>], reg: u16, label: &str) -> Result<ValueId, IrError> {
    regs.get(reg as usize)
        .copied()
        .flatten()
        .ok_or_else(|| IrError::MalformedInputCode {
            method: label.to_string(),
            reason: format!("register v{reg} read before it was ever defined"),
        })
}

#[allow(clippy::too_many_arguments)]
fn translate_one(
    ir: &mut IRCode,
    block: BlockId,
    decoded: &Decoded,
    tables: &DexIndexTables,
    regs: &mut Vec<Option<ValueId>>,
    pending_invoke_result: &mut Option<ValueId>,
    label: &str,
) -> Result<(), IrError> {
    match &decoded.op {
        RawOp::Nop => {}
        RawOp::Move { dst, src } => {
            regs[*dst as usize] = Some(reg_value(regs, *src, label)?);
        }
        RawOp::MoveResult { dst } => {
            let value = pending_invoke_result.take().ok_or_else(|| IrError::MalformedInputCode {
                method: label.to_string(),
                reason: "move-result with no preceding invoke".to_string(),
            })?;
            regs[*dst as usize] = Some(value);
        }
        RawOp::MoveException { dst } => {
            let value = ir.new_undefined_value(TypeElement::Reference {
                class: None,
                interfaces: SmallVec::new(),
                nullable: false,
            });
            regs[*dst as usize] = Some(value);
        }
        RawOp::ReturnVoid => {
            ir.push_instruction(block, Instruction::Return { value: None });
        }
        RawOp::Return { src } => {
            let value = reg_value(regs, *src, label)?;
            ir.push_instruction(block, Instruction::Return { value: Some(value) });
        }
        RawOp::ConstInt { dst, value } => {
            let result = ir.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
            ir.push_instruction(block, Instruction::Const { result, bits: *value });
            regs[*dst as usize] = Some(result);
        }
        RawOp::ConstString { dst, string_idx } => {
            let value = tables.string_at(*string_idx)?;
            let result = ir.new_undefined_value(TypeElement::Reference {
                class: None,
                interfaces: SmallVec::new(),
                nullable: false,
            });
            ir.push_instruction(block, Instruction::ConstString { result, value });
            regs[*dst as usize] = Some(result);
        }
        RawOp::ConstClass { dst, type_idx } => {
            let class_type = tables.type_at(*type_idx)?;
            let result = ir.new_undefined_value(TypeElement::Reference {
                class: None,
                interfaces: SmallVec::new(),
                nullable: false,
            });
            ir.push_instruction(block, Instruction::ConstClass { result, class_type });
            regs[*dst as usize] = Some(result);
        }
        RawOp::MonitorEnter { reg } => {
            let object = reg_value(regs, *reg, label)?;
            ir.push_instruction(block, Instruction::MonitorEnter { object });
        }
        RawOp::MonitorExit { reg } => {
            let object = reg_value(regs, *reg, label)?;
            ir.push_instruction(block, Instruction::MonitorExit { object });
        }
        RawOp::CheckCast { reg, type_idx } => {
            let operand = reg_value(regs, *reg, label)?;
            let class_type = tables.type_at(*type_idx)?;
            let result = ir.new_undefined_value(type_element_for(&class_type));
            ir.push_instruction(block, Instruction::CheckCast { result, operand, class_type });
            regs[*reg as usize] = Some(result);
        }
        RawOp::InstanceOf { dst, src, type_idx } => {
            let operand = reg_value(regs, *src, label)?;
            let class_type = tables.type_at(*type_idx)?;
            let result = ir.new_undefined_value(TypeElement::Primitive(PrimitiveType::Boolean));
            ir.push_instruction(block, Instruction::InstanceOf { result, operand, class_type });
            regs[*dst as usize] = Some(result);
        }
        RawOp::ArrayLength { dst, array } => {
            let array_value = reg_value(regs, *array, label)?;
            let result = ir.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
            ir.push_instruction(block, Instruction::ArrayLength { result, array: array_value });
            regs[*dst as usize] = Some(result);
        }
        RawOp::NewInstance { dst, type_idx } => {
            let class_type = tables.type_at(*type_idx)?;
            let result = ir.new_undefined_value(type_element_for(&class_type));
            ir.push_instruction(block, Instruction::NewInstance { result, class_type });
            regs[*dst as usize] = Some(result);
        }
        RawOp::NewArray { dst, size, type_idx } => {
            let element_type = tables.type_at(*type_idx)?;
            let length = reg_value(regs, *size, label)?;
            let result = ir.new_undefined_value(type_element_for(&element_type));
            ir.push_instruction(block, Instruction::NewArray { result, element_type, length });
            regs[*dst as usize] = Some(result);
        }
        RawOp::Throw { reg } => {
            let exception = reg_value(regs, *reg, label)?;
            ir.push_instruction(block, Instruction::Throw { exception });
        }
        RawOp::Goto { .. } => {
            // Linked in the control-flow pass; no value-level effect.
        }
        RawOp::IfTest { op, a, b, .. } => {
            let lhs = reg_value(regs, *a, label)?;
            let rhs = reg_value(regs, *b, label)?;
            let successors = ir.block(block).successors.clone();
            let (if_true, if_false) = (successors[0], *successors.get(1).unwrap_or(&successors[0]));
            ir.push_instruction(block, Instruction::If { op: *op, lhs, rhs, if_true, if_false });
        }
        RawOp::IfTestZ { op, a, .. } => {
            let lhs = reg_value(regs, *a, label)?;
            let zero = ir.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
            ir.push_instruction(block, Instruction::Const { result: zero, bits: 0 });
            let successors = ir.block(block).successors.clone();
            let (if_true, if_false) = (successors[0], *successors.get(1).unwrap_or(&successors[0]));
            ir.push_instruction(block, Instruction::If { op: *op, lhs, rhs: zero, if_true, if_false });
        }
        RawOp::ArrayGet { dst, array, index } => {
            let array_value = reg_value(regs, *array, label)?;
            let index_value = reg_value(regs, *index, label)?;
            let result = ir.new_undefined_value(TypeElement::Top);
            ir.push_instruction(
                block,
                Instruction::ArrayGet { result, array: array_value, index: index_value },
            );
            regs[*dst as usize] = Some(result);
        }
        RawOp::ArrayPut { src, array, index } => {
            let value = reg_value(regs, *src, label)?;
            let array_value = reg_value(regs, *array, label)?;
            let index_value = reg_value(regs, *index, label)?;
            ir.push_instruction(
                block,
                Instruction::ArrayPut { array: array_value, index: index_value, value },
            );
        }
        RawOp::InstanceGet { dst, object, field_idx } => {
            let object_value = reg_value(regs, *object, label)?;
            let field = tables.field_at(*field_idx)?;
            let result = ir.new_undefined_value(type_element_for(field.field_type()));
            ir.push_instruction(block, Instruction::InstanceGet { result, object: object_value, field });
            regs[*dst as usize] = Some(result);
        }
        RawOp::InstancePut { src, object, field_idx } => {
            let value = reg_value(regs, *src, label)?;
            let object_value = reg_value(regs, *object, label)?;
            let field = tables.field_at(*field_idx)?;
            ir.push_instruction(block, Instruction::InstancePut { object: object_value, value, field });
        }
        RawOp::StaticGet { dst, field_idx } => {
            let field = tables.field_at(*field_idx)?;
            let result = ir.new_undefined_value(type_element_for(field.field_type()));
            ir.push_instruction(block, Instruction::StaticGet { result, field });
            regs[*dst as usize] = Some(result);
        }
        RawOp::StaticPut { src, field_idx } => {
            let value = reg_value(regs, *src, label)?;
            let field = tables.field_at(*field_idx)?;
            ir.push_instruction(block, Instruction::StaticPut { value, field });
        }
        RawOp::Invoke { kind, method_idx, args } => {
            let method = tables.method_at(*method_idx)?;
            let arguments: SmallVec<[ValueId; 4]> = args
                .iter()
                .map(|&r| reg_value(regs, r, label))
                .collect::<Result<_, _>>()?;
            let result = if method.proto().return_type().is_void() {
                None
            } else {
                Some(ir.new_undefined_value(type_element_for(method.proto().return_type())))
            };
            ir.push_instruction(block, Instruction::Invoke { result, kind: *kind, method, arguments });
            *pending_invoke_result = result;
        }
        RawOp::Unop { op, dst, src } => {
            let operand = reg_value(regs, *src, label)?;
            let result = ir.new_undefined_value(TypeElement::Top);
            ir.push_instruction(block, Instruction::Unary { result, op: *op, operand });
            regs[*dst as usize] = Some(result);
        }
        RawOp::Binop { op, dst, a, b } => {
            let lhs = reg_value(regs, *a, label)?;
            let rhs = reg_value(regs, *b, label)?;
            let result = ir.new_undefined_value(TypeElement::Top);
            ir.push_instruction(block, Instruction::Binary { result, op: *op, lhs, rhs });
            regs[*dst as usize] = Some(result);
        }
        RawOp::BinopLit { op, dst, a, literal, reverse } => {
            let operand = reg_value(regs, *a, label)?;
            let literal_value = ir.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
            ir.push_instruction(block, Instruction::Const { result: literal_value, bits: *literal as i64 });
            let (lhs, rhs) = if *reverse { (literal_value, operand) } else { (operand, literal_value) };
            let result = ir.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
            ir.push_instruction(block, Instruction::Binary { result, op: *op, lhs, rhs });
            regs[*dst as usize] = Some(result);
        }
    }

    Ok(())
}
