//! Builds SSA IR from class-file bytecode by converting the JVM's
//! stack-based instruction set to explicit values via an explicit
//! load/store helper (spec §4.2): locals get the same per-block phi
//! treatment DEX registers get in [super::dex]; the operand stack is
//! simulated instruction-by-instruction and must be empty at every block
//! boundary — true of ordinary compiler output, and reported as
//! [IrError::MalformedInputCode] when it isn't.

use std::collections::BTreeSet;

use dexcomp_dex::CfCode;
use dexcomp_pool::{DexField, DexMethod, DexString, DexType};
use smallvec::SmallVec;

use crate::block::BlockId;
use crate::code::IRCode;
use crate::errors::IrError;
use crate::instruction::{BinaryOp, Instruction, InvokeKind, UnaryOp};
use crate::value::{PrimitiveType, TypeElement, ValueId};

/// A resolved view of a class file's constant pool, narrowed to what the
/// builder needs: the handful of entries its instructions index into.
/// Built by the (out of scope here) class-file reader; this module only
/// consumes it.
#[derive(Debug, Default)]
pub struct CfConstantPool {
    pub methods: Vec<Option<DexMethod>>,
    pub fields: Vec<Option<DexField>>,
    pub types: Vec<Option<DexType>>,
    pub strings: Vec<Option<DexString>>,
    pub ints: Vec<Option<i32>>,
}

impl CfConstantPool {
    fn method_at(&self, idx: u16, label: &str) -> Result<DexMethod, IrError> {
        self.methods
            .get(idx as usize)
            .cloned()
            .flatten()
            .ok_or_else(|| unresolved(label, "method", idx))
    }

    fn field_at(&self, idx: u16, label: &str) -> Result<DexField, IrError> {
        self.fields
            .get(idx as usize)
            .cloned()
            .flatten()
            .ok_or_else(|| unresolved(label, "field", idx))
    }

    fn type_at(&self, idx: u16, label: &str) -> Result<DexType, IrError> {
        self.types
            .get(idx as usize)
            .cloned()
            .flatten()
            .ok_or_else(|| unresolved(label, "type", idx))
    }

    fn string_at(&self, idx: u16, label: &str) -> Result<DexString, IrError> {
        self.strings
            .get(idx as usize)
            .cloned()
            .flatten()
            .ok_or_else(|| unresolved(label, "string", idx))
    }

    fn int_at(&self, idx: u16, label: &str) -> Result<i32, IrError> {
        self.ints
            .get(idx as usize)
            .copied()
            .flatten()
            .ok_or_else(|| unresolved(label, "int", idx))
    }
}

fn unresolved(label: &str, kind: &str, idx: u16) -> IrError {
    IrError::MalformedInputCode {
        method: label.to_string(),
        reason: format!("constant pool {kind} entry {idx} is unresolved"),
    }
}

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
        TypeElement::Reference { class: Some(ty.clone()), interfaces: SmallVec::new(), nullable: true }
    }
}

enum Op {
    Const(i64),
    ConstNull,
    ConstString(u16),
    Load(u16),
    Store(u16),
    Pop,
    Dup,
    Binary(BinaryOp),
    Unary(UnaryOp),
    IfCmp(BinaryOp, i32),
    IfZ(BinaryOp, i32),
    IfNull(bool, i32),
    Goto(i32),
    Return(bool),
    GetStatic(u16),
    PutStatic(u16),
    GetField(u16),
    PutField(u16),
    Invoke(InvokeKind, u16),
    New(u16),
    CheckCast(u16),
    InstanceOf(u16),
    Throw,
    Nop,
}

fn u16_at(code: &[u8], pc: usize) -> u16 {
    ((code[pc] as u16) << 8) | code[pc + 1] as u16
}

fn i16_at(code: &[u8], pc: usize) -> i16 {
    u16_at(code, pc) as i16
}

fn decode(code: &[u8], pc: usize, label: &str) -> Result<(Op, usize), IrError> {
    let fail = |reason: String| IrError::MalformedInputCode { method: label.to_string(), reason };
    let opcode = *code.get(pc).ok_or_else(|| fail("instruction stream truncated".to_string()))?;
    match opcode {
        0x00 => Ok((Op::Nop, 1)),
        0x01 => Ok((Op::ConstNull, 1)),
        0x02..=0x08 => Ok((Op::Const(opcode as i64 - 0x03), 1)),
        0x09 | 0x0a => Ok((Op::Const((opcode - 0x09) as i64), 1)),
        0x0b..=0x0d => Ok((Op::Const((opcode - 0x0b) as i64), 1)),
        0x0e | 0x0f => Ok((Op::Const((opcode - 0x0e) as i64), 1)),
        0x10 => Ok((Op::Const(code[pc + 1] as i8 as i64), 2)),
        0x11 => Ok((Op::Const(i16_at(code, pc + 1) as i64), 3)),
        0x12 => Ok((Op::ConstString(code[pc + 1] as u16), 2)),
        0x13 => Ok((Op::ConstString(u16_at(code, pc + 1)), 3)),
        0x15..=0x19 => Ok((Op::Load(code[pc + 1] as u16), 2)),
        0x1a..=0x2d => {
            let group = (opcode - 0x1a) / 4;
            let slot = (opcode - 0x1a) % 4;
            let _ = group;
            Ok((Op::Load(slot as u16), 1))
        }
        0x36..=0x3a => Ok((Op::Store(code[pc + 1] as u16), 2)),
        0x3b..=0x4e => {
            let slot = (opcode - 0x3b) % 4;
            Ok((Op::Store(slot as u16), 1))
        }
        0x57 => Ok((Op::Pop, 1)),
        0x59 => Ok((Op::Dup, 1)),
        0x60 | 0x61 | 0x62 | 0x63 => Ok((Op::Binary(BinaryOp::Add), 1)),
        0x64 | 0x65 | 0x66 | 0x67 => Ok((Op::Binary(BinaryOp::Sub), 1)),
        0x68 | 0x69 | 0x6a | 0x6b => Ok((Op::Binary(BinaryOp::Mul), 1)),
        0x6c | 0x6d | 0x6e | 0x6f => Ok((Op::Binary(BinaryOp::Div), 1)),
        0x70 | 0x71 | 0x72 | 0x73 => Ok((Op::Binary(BinaryOp::Rem), 1)),
        0x74 | 0x75 | 0x76 | 0x77 => Ok((Op::Unary(UnaryOp::Neg), 1)),
        0x78 | 0x79 => Ok((Op::Binary(BinaryOp::Shl), 1)),
        0x7a | 0x7b => Ok((Op::Binary(BinaryOp::Shr), 1)),
        0x7e | 0x7f => Ok((Op::Binary(BinaryOp::And), 1)),
        0x80 | 0x81 => Ok((Op::Binary(BinaryOp::Or), 1)),
        0x82 | 0x83 => Ok((Op::Binary(BinaryOp::Xor), 1)),
        0x99 => Ok((Op::IfZ(BinaryOp::CmpEqual, i16_at(code, pc + 1) as i32), 3)),
        0x9a => Ok((Op::IfZ(BinaryOp::CmpNotEqual, i16_at(code, pc + 1) as i32), 3)),
        0x9b => Ok((Op::IfZ(BinaryOp::CmpLess, i16_at(code, pc + 1) as i32), 3)),
        0x9c => Ok((Op::IfZ(BinaryOp::CmpGreaterEqual, i16_at(code, pc + 1) as i32), 3)),
        0x9d => Ok((Op::IfZ(BinaryOp::CmpGreater, i16_at(code, pc + 1) as i32), 3)),
        0x9e => Ok((Op::IfZ(BinaryOp::CmpLessEqual, i16_at(code, pc + 1) as i32), 3)),
        0x9f => Ok((Op::IfCmp(BinaryOp::CmpEqual, i16_at(code, pc + 1) as i32), 3)),
        0xa0 => Ok((Op::IfCmp(BinaryOp::CmpNotEqual, i16_at(code, pc + 1) as i32), 3)),
        0xa1 => Ok((Op::IfCmp(BinaryOp::CmpLess, i16_at(code, pc + 1) as i32), 3)),
        0xa2 => Ok((Op::IfCmp(BinaryOp::CmpGreaterEqual, i16_at(code, pc + 1) as i32), 3)),
        0xa3 => Ok((Op::IfCmp(BinaryOp::CmpGreater, i16_at(code, pc + 1) as i32), 3)),
        0xa4 => Ok((Op::IfCmp(BinaryOp::CmpLessEqual, i16_at(code, pc + 1) as i32), 3)),
        0xa7 => Ok((Op::Goto(i16_at(code, pc + 1) as i32), 3)),
        0xac..=0xb0 => Ok((Op::Return(true), 1)),
        0xb1 => Ok((Op::Return(false), 1)),
        0xb2 => Ok((Op::GetStatic(u16_at(code, pc + 1)), 3)),
        0xb3 => Ok((Op::PutStatic(u16_at(code, pc + 1)), 3)),
        0xb4 => Ok((Op::GetField(u16_at(code, pc + 1)), 3)),
        0xb5 => Ok((Op::PutField(u16_at(code, pc + 1)), 3)),
        0xb6 => Ok((Op::Invoke(InvokeKind::Virtual, u16_at(code, pc + 1)), 3)),
        0xb7 => Ok((Op::Invoke(InvokeKind::Direct, u16_at(code, pc + 1)), 3)),
        0xb8 => Ok((Op::Invoke(InvokeKind::Static, u16_at(code, pc + 1)), 3)),
        0xb9 => Ok((Op::Invoke(InvokeKind::Interface, u16_at(code, pc + 1)), 5)),
        0xbb => Ok((Op::New(u16_at(code, pc + 1)), 3)),
        0xbf => Ok((Op::Throw, 1)),
        0xc0 => Ok((Op::CheckCast(u16_at(code, pc + 1)), 3)),
        0xc1 => Ok((Op::InstanceOf(u16_at(code, pc + 1)), 3)),
        0xc6 => Ok((Op::IfNull(true, i16_at(code, pc + 1) as i32), 3)),
        0xc7 => Ok((Op::IfNull(false, i16_at(code, pc + 1) as i32), 3)),
        other => Err(fail(format!("unsupported class-file opcode 0x{other:02x}"))),
    }
}

fn is_terminator(op: &Op) -> bool {
    matches!(op, Op::Return(_) | Op::Goto(_) | Op::IfCmp(..) | Op::IfZ(..) | Op::IfNull(..) | Op::Throw)
}

/// Builds the IR for one class-file-encoded method body. `is_static` and
/// `param_types` together determine the local-variable slot layout (spec
/// §3 "`CfCode` = (max-stack, max-locals, instruction list, ...)").
pub fn build_from_cf_code(
    method: &DexMethod,
    code: &CfCode,
    is_static: bool,
    pool: &CfConstantPool,
) -> Result<IRCode, IrError> {
    let label = method_label(method);
    let bytes = &code.instructions;

    let mut decoded = Vec::new();
    let mut pc = 0usize;
    while pc < bytes.len() {
        let (op, width) = decode(bytes, pc, &label)?;
        decoded.push((pc as u32, op));
        pc += width;
    }

    let mut boundaries: BTreeSet<u32> = BTreeSet::new();
    boundaries.insert(0);
    for (i, (addr, op)) in decoded.iter().enumerate() {
        let target = match op {
            Op::Goto(off) | Op::IfCmp(_, off) | Op::IfZ(_, off) | Op::IfNull(_, off) => Some(*addr as i64 + *off as i64),
            _ => None,
        };
        if let Some(t) = target {
            boundaries.insert(t as u32);
        }
        if is_terminator(op) {
            if let Some((next_addr, _)) = decoded.get(i + 1) {
                boundaries.insert(*next_addr);
            }
        }
    }

    let boundary_list: Vec<u32> = boundaries.into_iter().collect();
    let mut ir = IRCode::new(method.clone());
    let mut addr_to_block: Vec<(u32, BlockId)> = vec![(boundary_list[0], ir.entry_block())];
    for &addr in boundary_list.iter().skip(1) {
        addr_to_block.push((addr, ir.new_block()));
    }

    let block_of = |addr: u32| -> BlockId {
        match addr_to_block.binary_search_by_key(&addr, |&(a, _)| a) {
            Ok(i) => addr_to_block[i].1,
            Err(0) => addr_to_block[0].1,
            Err(i) => addr_to_block[i - 1].1,
        }
    };

    let mut block_ops: Vec<Vec<&(u32, Op)>> = vec![Vec::new(); addr_to_block.len()];
    for entry in &decoded {
        let idx = match addr_to_block.binary_search_by_key(&entry.0, |&(a, _)| a) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        block_ops[idx].push(entry);
    }

    for (idx, ops) in block_ops.iter().enumerate() {
        let this_block = addr_to_block[idx].1;
        let Some((addr, op)) = ops.last() else { continue };
        match op {
            Op::Goto(off) => ir.link(this_block, block_of((*addr as i64 + *off as i64) as u32)),
            Op::IfCmp(_, off) | Op::IfZ(_, off) | Op::IfNull(_, off) => {
                ir.link(this_block, block_of((*addr as i64 + *off as i64) as u32));
                if let Some(&(next_addr, _)) = addr_to_block.get(idx + 1) {
                    ir.link(this_block, block_of(next_addr));
                }
            }
            Op::Return(_) | Op::Throw => {}
            _ => {
                if let Some(&(next_addr, _)) = addr_to_block.get(idx + 1) {
                    ir.link(this_block, block_of(next_addr));
                }
            }
        }
    }

    let max_locals = code.max_locals;
    let mut entry_locals = vec![None; max_locals as usize];
    let mut next_slot = 0u16;
    let mut arguments = Vec::new();
    if !is_static {
        let value = ir.new_undefined_value(type_element_for(method.holder()));
        entry_locals[next_slot as usize] = Some(value);
        arguments.push(value);
        next_slot += 1;
    }
    for param in method.proto().parameters() {
        let value = ir.new_undefined_value(type_element_for(param));
        entry_locals[next_slot as usize] = Some(value);
        arguments.push(value);
        next_slot += if param.is_wide() { 2 } else { 1 };
    }
    ir.set_arguments(arguments);

    let mut entry_locals_state: Vec<Vec<Option<ValueId>>> = vec![Vec::new(); addr_to_block.len()];
    entry_locals_state[0] = entry_locals;
    let mut exit_locals_state: Vec<Vec<Option<ValueId>>> = vec![Vec::new(); addr_to_block.len()];
    let mut join_phis: Vec<Vec<ValueId>> = vec![Vec::new(); addr_to_block.len()];

    for idx in 0..addr_to_block.len() {
        let block_id = addr_to_block[idx].1;
        if idx != 0 {
            let preds = ir.block(block_id).predecessors.len();
            if preds == 0 {
                if !block_ops[idx].is_empty() {
                    return Err(IrError::UnreachableCodeWithInstructions { address: addr_to_block[idx].0 });
                }
                entry_locals_state[idx] = vec![None; max_locals as usize];
            } else if preds == 1 {
                let pred = ir.block(block_id).predecessors[0];
                let pred_idx = addr_to_block.iter().position(|&(_, b)| b == pred).unwrap();
                entry_locals_state[idx] = exit_locals_state[pred_idx].clone();
            } else {
                let mut locals = Vec::with_capacity(max_locals as usize);
                let mut phis = Vec::with_capacity(max_locals as usize);
                for _ in 0..max_locals {
                    let phi = ir.new_undefined_value(TypeElement::Top);
                    ir.push_phi(block_id, phi);
                    phis.push(phi);
                    locals.push(Some(phi));
                }
                join_phis[idx] = phis;
                entry_locals_state[idx] = locals;
            }
        }

        let mut locals = entry_locals_state[idx].clone();
        let mut stack: Vec<ValueId> = Vec::new();

        for (_, op) in &block_ops[idx] {
            translate_one(&mut ir, block_id, op, pool, &mut locals, &mut stack, &label)?;
        }

        if !stack.is_empty() {
            return Err(IrError::MalformedInputCode {
                method: label.clone(),
                reason: "operand stack is not empty at a block boundary".to_string(),
            });
        }

        if let Some((_, last)) = block_ops[idx].last() {
            if !is_terminator(last) {
                if let Some(&(next_addr, _)) = addr_to_block.get(idx + 1) {
                    ir.push_instruction(block_id, Instruction::Goto { target: block_of(next_addr) });
                }
            }
        } else if let Some(&(next_addr, _)) = addr_to_block.get(idx + 1) {
            ir.push_instruction(block_id, Instruction::Goto { target: block_of(next_addr) });
        }

        exit_locals_state[idx] = locals;
    }

    for idx in 0..addr_to_block.len() {
        if join_phis[idx].is_empty() {
            continue;
        }
        let block_id = addr_to_block[idx].1;
        let preds = ir.block(block_id).predecessors.clone();
        for (slot, &phi) in join_phis[idx].iter().enumerate() {
            let mut operands = SmallVec::<[ValueId; 4]>::new();
            for &pred in &preds {
                let pred_idx = addr_to_block.iter().position(|&(_, b)| b == pred).unwrap();
                if let Some(Some(v)) = exit_locals_state[pred_idx].get(slot) {
                    operands.push(*v);
                }
            }
            let merged = operands.iter().fold(TypeElement::Top, |acc, &v| acc.meet(&ir.value(v).type_element));
            ir.set_phi_operands(phi, operands);
            ir.value_mut(phi).type_element = merged;
        }
    }

    Ok(ir)
}

fn local_value(locals: &[Option<ValueId>], slot: u16, label: &str) -> Result<ValueId, IrError> {
    locals
        .get(slot as usize)
        .copied()
        .flatten()
        .ok_or_else(|| IrError::MalformedInputCode {
            method: label.to_string(),
            reason: format!("local slot {slot} read before it was ever stored"),
        })
}

fn pop(stack: &mut Vec<ValueId>, label: &str) -> Result<ValueId, IrError> {
    stack.pop().ok_or_else(|| IrError::MalformedInputCode {
        method: label.to_string(),
        reason: "popped an empty operand stack".to_string(),
    })
}

fn translate_one(
    ir: &mut IRCode,
    block: BlockId,
    op: &Op,
    pool: &CfConstantPool,
    locals: &mut Vec<Option<ValueId>>,
    stack: &mut Vec<ValueId>,
    label: &str,
) -> Result<(), IrError> {
    match op {
        Op::Nop => {}
        Op::Const(bits) => {
            let result = ir.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
            ir.push_instruction(block, Instruction::Const { result, bits: *bits });
            stack.push(result);
        }
        Op::ConstNull => {
            let result = ir.new_undefined_value(TypeElement::Reference { class: None, interfaces: SmallVec::new(), nullable: true });
            ir.push_instruction(block, Instruction::ConstNull { result });
            stack.push(result);
        }
        Op::ConstString(idx) => {
            // `ldc`/`ldc_w` cover both string and numeric constants; the
            // pool entry kind disambiguates them.
            if let Ok(value) = pool.string_at(*idx, label) {
                let result = ir.new_undefined_value(TypeElement::Reference { class: None, interfaces: SmallVec::new(), nullable: false });
                ir.push_instruction(block, Instruction::ConstString { result, value });
                stack.push(result);
            } else {
                let literal = pool.int_at(*idx, label)?;
                let result = ir.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
                ir.push_instruction(block, Instruction::Const { result, bits: literal as i64 });
                stack.push(result);
            }
        }
        Op::Load(slot) => {
            stack.push(local_value(locals, *slot, label)?);
        }
        Op::Store(slot) => {
            let value = pop(stack, label)?;
            locals[*slot as usize] = Some(value);
        }
        Op::Pop => {
            pop(stack, label)?;
        }
        Op::Dup => {
            let value = pop(stack, label)?;
            stack.push(value);
            stack.push(value);
        }
        Op::Binary(bin_op) => {
            let rhs = pop(stack, label)?;
            let lhs = pop(stack, label)?;
            let result = ir.new_undefined_value(TypeElement::Top);
            ir.push_instruction(block, Instruction::Binary { result, op: *bin_op, lhs, rhs });
            stack.push(result);
        }
        Op::Unary(un_op) => {
            let operand = pop(stack, label)?;
            let result = ir.new_undefined_value(TypeElement::Top);
            ir.push_instruction(block, Instruction::Unary { result, op: *un_op, operand });
            stack.push(result);
        }
        Op::IfCmp(cmp_op, _) => {
            let rhs = pop(stack, label)?;
            let lhs = pop(stack, label)?;
            let successors = ir.block(block).successors.clone();
            let (if_true, if_false) = (successors[0], *successors.get(1).unwrap_or(&successors[0]));
            ir.push_instruction(block, Instruction::If { op: *cmp_op, lhs, rhs, if_true, if_false });
        }
        Op::IfZ(cmp_op, _) => {
            let lhs = pop(stack, label)?;
            let zero = ir.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
            ir.push_instruction(block, Instruction::Const { result: zero, bits: 0 });
            let successors = ir.block(block).successors.clone();
            let (if_true, if_false) = (successors[0], *successors.get(1).unwrap_or(&successors[0]));
            ir.push_instruction(block, Instruction::If { op: *cmp_op, lhs, rhs: zero, if_true, if_false });
        }
        Op::IfNull(is_null, _) => {
            let operand = pop(stack, label)?;
            let null_value = ir.new_undefined_value(TypeElement::Reference { class: None, interfaces: SmallVec::new(), nullable: true });
            ir.push_instruction(block, Instruction::ConstNull { result: null_value });
            let op = if *is_null { BinaryOp::CmpEqual } else { BinaryOp::CmpNotEqual };
            let successors = ir.block(block).successors.clone();
            let (if_true, if_false) = (successors[0], *successors.get(1).unwrap_or(&successors[0]));
            ir.push_instruction(block, Instruction::If { op, lhs: operand, rhs: null_value, if_true, if_false });
        }
        Op::Goto(_) => {}
        Op::Return(has_value) => {
            let value = if *has_value { Some(pop(stack, label)?) } else { None };
            ir.push_instruction(block, Instruction::Return { value });
        }
        Op::GetStatic(idx) => {
            let field = pool.field_at(*idx, label)?;
            let result = ir.new_undefined_value(type_element_for(field.field_type()));
            ir.push_instruction(block, Instruction::StaticGet { result, field });
            stack.push(result);
        }
        Op::PutStatic(idx) => {
            let field = pool.field_at(*idx, label)?;
            let value = pop(stack, label)?;
            ir.push_instruction(block, Instruction::StaticPut { value, field });
        }
        Op::GetField(idx) => {
            let field = pool.field_at(*idx, label)?;
            let object = pop(stack, label)?;
            let result = ir.new_undefined_value(type_element_for(field.field_type()));
            ir.push_instruction(block, Instruction::InstanceGet { result, object, field });
            stack.push(result);
        }
        Op::PutField(idx) => {
            let field = pool.field_at(*idx, label)?;
            let value = pop(stack, label)?;
            let object = pop(stack, label)?;
            ir.push_instruction(block, Instruction::InstancePut { object, value, field });
        }
        Op::Invoke(kind, idx) => {
            let method = pool.method_at(*idx, label)?;
            let param_count = method.proto().parameter_count();
            let mut arguments = SmallVec::<[ValueId; 4]>::new();
            for _ in 0..param_count {
                arguments.push(pop(stack, label)?);
            }
            arguments.reverse();
            if !matches!(kind, InvokeKind::Static) {
                arguments.insert(0, pop(stack, label)?);
            }
            let result = if method.proto().return_type().is_void() {
                None
            } else {
                Some(ir.new_undefined_value(type_element_for(method.proto().return_type())))
            };
            ir.push_instruction(block, Instruction::Invoke { result, kind: *kind, method, arguments });
            if let Some(result) = result {
                stack.push(result);
            }
        }
        Op::New(idx) => {
            let class_type = pool.type_at(*idx, label)?;
            let result = ir.new_undefined_value(type_element_for(&class_type));
            ir.push_instruction(block, Instruction::NewInstance { result, class_type });
            stack.push(result);
        }
        Op::CheckCast(idx) => {
            let class_type = pool.type_at(*idx, label)?;
            let operand = pop(stack, label)?;
            let result = ir.new_undefined_value(type_element_for(&class_type));
            ir.push_instruction(block, Instruction::CheckCast { result, operand, class_type });
            stack.push(result);
        }
        Op::InstanceOf(idx) => {
            let class_type = pool.type_at(*idx, label)?;
            let operand = pop(stack, label)?;
            let result = ir.new_undefined_value(TypeElement::Primitive(PrimitiveType::Boolean));
            ir.push_instruction(block, Instruction::InstanceOf { result, operand, class_type });
            stack.push(result);
        }
        Op::Throw => {
            let exception = pop(stack, label)?;
            ir.push_instruction(block, Instruction::Throw { exception });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_dex::CfCode;
    use dexcomp_pool::ItemPool;

    fn add_method(pool: &ItemPool) -> DexMethod {
        let holder = pool.intern_type(b"Lcom/app/Math;");
        let int_ty = pool.intern_type(b"I");
        let proto = pool.intern_proto(int_ty.clone(), vec![int_ty.clone(), int_ty]);
        pool.intern_method(holder, proto, b"add")
    }

    #[test]
    fn straight_line_method_builds_one_block() {
        let pool = ItemPool::new();
        let method = add_method(&pool);
        // iload_0, iload_1, iadd, ireturn
        let code = CfCode {
            max_stack: 2,
            max_locals: 2,
            instructions: vec![0x1a, 0x1b, 0x60, 0xac],
            try_catch_ranges: Vec::new(),
            local_variables: Vec::new(),
        };
        let cp = CfConstantPool::default();
        let ir = build_from_cf_code(&method, &code, true, &cp).unwrap();

        assert_eq!(ir.block_count(), 1);
        let entry = ir.block(ir.entry_block());
        assert!(entry.phis.is_empty());
        assert_eq!(entry.instructions.len(), 2);
        assert!(matches!(ir.instruction(entry.instructions[0]), Instruction::Binary { op: BinaryOp::Add, .. }));
        assert!(matches!(ir.instruction(entry.instructions[1]), Instruction::Return { value: Some(_) }));
    }

    #[test]
    fn branch_merge_gets_one_phi_per_local() {
        let pool = ItemPool::new();
        let method = add_method(&pool);
        // addr0  iload_0
        // addr1  ifeq +8 -> addr9
        // addr4  iconst_0
        // addr5  istore_1
        // addr6  goto +5 -> addr11
        // addr9  iconst_1
        // addr10 istore_1
        // addr11 iload_1
        // addr12 ireturn
        let instructions = vec![
            0x1a, 0x99, 0x00, 0x08, 0x03, 0x3c, 0xa7, 0x00, 0x05, 0x04, 0x3c, 0x1b, 0xac,
        ];
        let max_locals = 2u16;
        let code = CfCode {
            max_stack: 1,
            max_locals,
            instructions,
            try_catch_ranges: Vec::new(),
            local_variables: Vec::new(),
        };
        let cp = CfConstantPool::default();
        let ir = build_from_cf_code(&method, &code, true, &cp).unwrap();

        let merge = ir
            .blocks()
            .find(|(_, b)| !b.phis.is_empty())
            .expect("join block should carry phis");
        assert_eq!(merge.1.phis.len(), max_locals as usize);
    }
}
