//! Decodes one DEX instruction at a time into a register-level, pre-SSA
//! [RawOp]. Deliberately covers a representative opcode set rather than
//! the full table — every opcode below maps cleanly onto an
//! [crate::instruction::Instruction] variant; anything outside that set
//! is reported through [IrError::MalformedInputCode] rather than guessed
//! at.

use smallvec::SmallVec;

use crate::errors::IrError;
use crate::instruction::{BinaryOp, InvokeKind, UnaryOp};

#[derive(Debug, Clone)]
pub(super) enum RawOp {
    Nop,
    Move { dst: u16, src: u16 },
    MoveResult { dst: u16 },
    MoveException { dst: u16 },
    ReturnVoid,
    Return { src: u16 },
    ConstInt { dst: u16, value: i64 },
    ConstString { dst: u16, string_idx: u32 },
    ConstClass { dst: u16, type_idx: u32 },
    MonitorEnter { reg: u16 },
    MonitorExit { reg: u16 },
    CheckCast { reg: u16, type_idx: u32 },
    InstanceOf { dst: u16, src: u16, type_idx: u32 },
    ArrayLength { dst: u16, array: u16 },
    NewInstance { dst: u16, type_idx: u32 },
    NewArray { dst: u16, size: u16, type_idx: u32 },
    Throw { reg: u16 },
    Goto { target: i32 },
    IfTest { op: BinaryOp, a: u16, b: u16, target: i32 },
    IfTestZ { op: BinaryOp, a: u16, target: i32 },
    ArrayGet { dst: u16, array: u16, index: u16 },
    ArrayPut { src: u16, array: u16, index: u16 },
    InstanceGet { dst: u16, object: u16, field_idx: u32 },
    InstancePut { src: u16, object: u16, field_idx: u32 },
    StaticGet { dst: u16, field_idx: u32 },
    StaticPut { src: u16, field_idx: u32 },
    Invoke { kind: InvokeKind, method_idx: u32, args: SmallVec<[u16; 5]> },
    Unop { op: UnaryOp, dst: u16, src: u16 },
    Binop { op: BinaryOp, dst: u16, a: u16, b: u16 },
    BinopLit { op: BinaryOp, dst: u16, a: u16, literal: i32, reverse: bool },
}

impl RawOp {
    /// The block-boundary-relevant branch target this instruction carries,
    /// if any (as an absolute code-unit address it is the caller's job to
    /// compute from `target`, which is a *relative* offset here).
    pub(super) fn branch_offset(&self) -> Option<i32> {
        match self {
            RawOp::Goto { target } => Some(*target),
            RawOp::IfTest { target, .. } | RawOp::IfTestZ { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub(super) fn is_terminator(&self) -> bool {
        matches!(
            self,
            RawOp::ReturnVoid
                | RawOp::Return { .. }
                | RawOp::Throw { .. }
                | RawOp::Goto { .. }
                | RawOp::IfTest { .. }
                | RawOp::IfTestZ { .. }
        )
    }
}

fn unit(insns: &[u16], pc: usize, method: &str) -> Result<u16, IrError> {
    insns.get(pc).copied().ok_or_else(|| IrError::MalformedInputCode {
        method: method.to_string(),
        reason: format!("instruction stream truncated at code unit {pc}"),
    })
}

const INT_LONG_OPS: [BinaryOp; 11] = [
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mul,
    BinaryOp::Div,
    BinaryOp::Rem,
    BinaryOp::And,
    BinaryOp::Or,
    BinaryOp::Xor,
    BinaryOp::Shl,
    BinaryOp::Shr,
    BinaryOp::UShr,
];
const FLOAT_DOUBLE_OPS: [BinaryOp; 5] = [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Div, BinaryOp::Rem];
const LIT_OPS: [BinaryOp; 8] = [
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mul,
    BinaryOp::Div,
    BinaryOp::Rem,
    BinaryOp::And,
    BinaryOp::Or,
    BinaryOp::Xor,
];
const LIT8_EXTRA_OPS: [BinaryOp; 3] = [BinaryOp::Shl, BinaryOp::Shr, BinaryOp::UShr];

fn binop_from_23x(opcode: u8) -> Option<BinaryOp> {
    match opcode {
        0x90..=0x9a => Some(INT_LONG_OPS[(opcode - 0x90) as usize]),
        0x9b..=0xa5 => Some(INT_LONG_OPS[(opcode - 0x9b) as usize]),
        0xa6..=0xaa => Some(FLOAT_DOUBLE_OPS[(opcode - 0xa6) as usize]),
        0xab..=0xaf => Some(FLOAT_DOUBLE_OPS[(opcode - 0xab) as usize]),
        _ => None,
    }
}

fn binop_from_2addr(opcode: u8) -> Option<BinaryOp> {
    match opcode {
        0xb0..=0xba => Some(INT_LONG_OPS[(opcode - 0xb0) as usize]),
        0xbb..=0xc5 => Some(INT_LONG_OPS[(opcode - 0xbb) as usize]),
        0xc6..=0xca => Some(FLOAT_DOUBLE_OPS[(opcode - 0xc6) as usize]),
        0xcb..=0xcf => Some(FLOAT_DOUBLE_OPS[(opcode - 0xcb) as usize]),
        _ => None,
    }
}

fn cmp_as_binop(opcode: u8) -> Option<BinaryOp> {
    // cmpl-float, cmpg-float, cmpl-double, cmpg-double, cmp-long: all
    // reduce to a three-way compare in our simplified lattice, modeled
    // with the same `CmpEqual`/`CmpLess` family used by `if-test`.
    match opcode {
        0x2d..=0x31 => Some(BinaryOp::CmpLess),
        _ => None,
    }
}

fn if_test_op(opcode: u8) -> Option<BinaryOp> {
    match opcode {
        0x32 => Some(BinaryOp::CmpEqual),
        0x33 => Some(BinaryOp::CmpNotEqual),
        0x34 => Some(BinaryOp::CmpLess),
        0x35 => Some(BinaryOp::CmpGreaterEqual),
        0x36 => Some(BinaryOp::CmpGreater),
        0x37 => Some(BinaryOp::CmpLessEqual),
        _ => None,
    }
}

fn if_testz_op(opcode: u8) -> Option<BinaryOp> {
    if_test_op(opcode - (0x38 - 0x32))
}

/// Decodes the instruction at `pc` (a code-unit index into `insns`),
/// returning it plus its width in 16-bit code units.
pub(super) fn decode_insn(insns: &[u16], pc: usize, method: &str) -> Result<(RawOp, usize), IrError> {
    let u0 = unit(insns, pc, method)?;
    let opcode = (u0 & 0xff) as u8;
    let arg_byte = (u0 >> 8) as u8;
    let a4 = (arg_byte & 0x0f) as u16;
    let b4 = ((arg_byte >> 4) & 0x0f) as u16;

    let fail = |reason: String| IrError::MalformedInputCode {
        method: method.to_string(),
        reason,
    };

    match opcode {
        0x00 => Ok((RawOp::Nop, 1)),
        0x01 | 0x04 | 0x07 => Ok((RawOp::Move { dst: a4, src: b4 }, 1)),
        0x02 | 0x05 | 0x08 => {
            let dst = arg_byte as u16;
            let src = unit(insns, pc + 1, method)?;
            Ok((RawOp::Move { dst, src }, 2))
        }
        0x03 | 0x06 | 0x09 => {
            let dst = unit(insns, pc + 1, method)?;
            let src = unit(insns, pc + 2, method)?;
            Ok((RawOp::Move { dst, src }, 3))
        }
        0x0a | 0x0b | 0x0c => Ok((RawOp::MoveResult { dst: arg_byte as u16 }, 1)),
        0x0d => Ok((RawOp::MoveException { dst: arg_byte as u16 }, 1)),
        0x0e => Ok((RawOp::ReturnVoid, 1)),
        0x0f | 0x10 | 0x11 => Ok((RawOp::Return { src: arg_byte as u16 }, 1)),
        0x12 => {
            let value = ((b4 as i16) << 12 >> 12) as i64; // sign-extend 4-bit literal
            Ok((RawOp::ConstInt { dst: a4, value }, 1))
        }
        0x13 | 0x16 => {
            let dst = arg_byte as u16;
            let value = unit(insns, pc + 1, method)? as i16 as i64;
            Ok((RawOp::ConstInt { dst, value }, 2))
        }
        0x14 | 0x17 => {
            let dst = arg_byte as u16;
            let lo = unit(insns, pc + 1, method)? as u32;
            let hi = unit(insns, pc + 2, method)? as u32;
            let value = ((hi << 16) | lo) as i32 as i64;
            Ok((RawOp::ConstInt { dst, value }, 3))
        }
        0x15 | 0x19 => {
            let dst = arg_byte as u16;
            let hi16 = unit(insns, pc + 1, method)?;
            Ok((RawOp::ConstInt { dst, value: (hi16 as i64) << 16 }, 2))
        }
        0x18 => {
            let dst = arg_byte as u16;
            let lo = unit(insns, pc + 1, method)? as u64;
            let mid_lo = unit(insns, pc + 2, method)? as u64;
            let mid_hi = unit(insns, pc + 3, method)? as u64;
            let hi = unit(insns, pc + 4, method)? as u64;
            let value = (hi << 48) | (mid_hi << 32) | (mid_lo << 16) | lo;
            Ok((RawOp::ConstInt { dst, value: value as i64 }, 5))
        }
        0x1a => {
            let dst = arg_byte as u16;
            let idx = unit(insns, pc + 1, method)? as u32;
            Ok((RawOp::ConstString { dst, string_idx: idx }, 2))
        }
        0x1b => {
            let dst = arg_byte as u16;
            let lo = unit(insns, pc + 1, method)? as u32;
            let hi = unit(insns, pc + 2, method)? as u32;
            Ok((RawOp::ConstString { dst, string_idx: (hi << 16) | lo }, 3))
        }
        0x1c => {
            let dst = arg_byte as u16;
            let idx = unit(insns, pc + 1, method)? as u32;
            Ok((RawOp::ConstClass { dst, type_idx: idx }, 2))
        }
        0x1d => Ok((RawOp::MonitorEnter { reg: arg_byte as u16 }, 1)),
        0x1e => Ok((RawOp::MonitorExit { reg: arg_byte as u16 }, 1)),
        0x1f => {
            let reg = arg_byte as u16;
            let type_idx = unit(insns, pc + 1, method)? as u32;
            Ok((RawOp::CheckCast { reg, type_idx }, 2))
        }
        0x20 => {
            let type_idx = unit(insns, pc + 1, method)? as u32;
            Ok((RawOp::InstanceOf { dst: a4, src: b4, type_idx }, 2))
        }
        0x21 => Ok((RawOp::ArrayLength { dst: a4, array: b4 }, 1)),
        0x22 => {
            let dst = arg_byte as u16;
            let type_idx = unit(insns, pc + 1, method)? as u32;
            Ok((RawOp::NewInstance { dst, type_idx }, 2))
        }
        0x23 => {
            let type_idx = unit(insns, pc + 1, method)? as u32;
            Ok((RawOp::NewArray { dst: a4, size: b4, type_idx }, 2))
        }
        0x27 => Ok((RawOp::Throw { reg: arg_byte as u16 }, 1)),
        0x28 => {
            let off = arg_byte as i8 as i32;
            Ok((RawOp::Goto { target: off }, 1))
        }
        0x29 => {
            let off = unit(insns, pc + 1, method)? as i16 as i32;
            Ok((RawOp::Goto { target: off }, 2))
        }
        0x2a => {
            let lo = unit(insns, pc + 1, method)? as u32;
            let hi = unit(insns, pc + 2, method)? as u32;
            let off = ((hi << 16) | lo) as i32;
            Ok((RawOp::Goto { target: off }, 3))
        }
        0x2d..=0x31 => {
            let op = cmp_as_binop(opcode).expect("range guarded above");
            let u1 = unit(insns, pc + 1, method)?;
            let a = u1 & 0xff;
            let b = u1 >> 8;
            Ok((RawOp::Binop { op, dst: arg_byte as u16, a, b }, 2))
        }
        0x32..=0x37 => {
            let op = if_test_op(opcode).ok_or_else(|| fail(format!("unknown if-test opcode 0x{opcode:02x}")))?;
            let target = unit(insns, pc + 1, method)? as i16 as i32;
            Ok((RawOp::IfTest { op, a: a4, b: b4, target }, 2))
        }
        0x38..=0x3d => {
            let op = if_testz_op(opcode).ok_or_else(|| fail(format!("unknown if-testz opcode 0x{opcode:02x}")))?;
            let target = unit(insns, pc + 1, method)? as i16 as i32;
            Ok((RawOp::IfTestZ { op, a: arg_byte as u16, target }, 2))
        }
        0x44..=0x51 => {
            let u1 = unit(insns, pc + 1, method)?;
            let array = (u1 & 0xff) as u16;
            let index = (u1 >> 8) as u16;
            Ok((RawOp::ArrayGet { dst: arg_byte as u16, array, index }, 2))
        }
        0x52..=0x5f => {
            let field_idx = unit(insns, pc + 1, method)? as u32;
            Ok((RawOp::InstanceGet { dst: a4, object: b4, field_idx }, 2))
        }
        0x60..=0x6d => {
            let field_idx = unit(insns, pc + 1, method)? as u32;
            Ok((RawOp::StaticGet { dst: arg_byte as u16, field_idx }, 2))
        }
        0x6e..=0x72 => {
            let kind = match opcode {
                0x6e => InvokeKind::Virtual,
                0x6f => InvokeKind::Super,
                0x70 => InvokeKind::Direct,
                0x71 => InvokeKind::Static,
                0x72 => InvokeKind::Interface,
                _ => unreachable!(),
            };
            let method_idx = unit(insns, pc + 1, method)? as u32;
            let u2 = unit(insns, pc + 2, method)?;
            let count = b4;
            let g = a4;
            let c = u2 & 0xf;
            let d = (u2 >> 4) & 0xf;
            let e = (u2 >> 8) & 0xf;
            let f = (u2 >> 12) & 0xf;
            let all = [c, d, e, f, g];
            let args: SmallVec<[u16; 5]> = all.into_iter().take(count as usize).collect();
            Ok((RawOp::Invoke { kind, method_idx, args }, 3))
        }
        0x74..=0x78 => {
            let kind = match opcode {
                0x74 => InvokeKind::Virtual,
                0x75 => InvokeKind::Super,
                0x76 => InvokeKind::Direct,
                0x77 => InvokeKind::Static,
                0x78 => InvokeKind::Interface,
                _ => unreachable!(),
            };
            let count = arg_byte as u16;
            let method_idx = unit(insns, pc + 1, method)? as u32;
            let first_reg = unit(insns, pc + 2, method)?;
            let args: SmallVec<[u16; 5]> = (0..count).map(|i| first_reg + i).collect();
            Ok((RawOp::Invoke { kind, method_idx, args }, 3))
        }
        0x7b..=0x8f => {
            let op = unop_from_opcode(opcode).ok_or_else(|| fail(format!("unknown unop opcode 0x{opcode:02x}")))?;
            Ok((RawOp::Unop { op, dst: a4, src: b4 }, 1))
        }
        0x90..=0xaf => {
            let op = binop_from_23x(opcode).expect("range guarded above");
            let u1 = unit(insns, pc + 1, method)?;
            let a = (u1 & 0xff) as u16;
            let b = (u1 >> 8) as u16;
            Ok((RawOp::Binop { op, dst: arg_byte as u16, a, b }, 2))
        }
        0xb0..=0xcf => {
            let op = binop_from_2addr(opcode).expect("range guarded above");
            Ok((RawOp::Binop { op, dst: a4, a: a4, b: b4 }, 1))
        }
        0xd0..=0xd7 => {
            let op = LIT_OPS[(opcode - 0xd0) as usize];
            let literal = unit(insns, pc + 1, method)? as i16 as i32;
            let reverse = opcode == 0xd1; // rsub-int
            Ok((RawOp::BinopLit { op, dst: a4, a: b4, literal, reverse }, 2))
        }
        0xd8..=0xe2 => {
            let idx = (opcode - 0xd8) as usize;
            let (op, reverse) = if idx == 1 {
                (BinaryOp::Sub, true) // rsub-int/lit8
            } else if idx < 8 {
                (LIT_OPS[idx], false)
            } else {
                (LIT8_EXTRA_OPS[idx - 8], false)
            };
            let u1 = unit(insns, pc + 1, method)?;
            let a = (u1 & 0xff) as u16;
            let literal = (u1 >> 8) as i8 as i32;
            Ok((RawOp::BinopLit { op, dst: arg_byte as u16, a, literal, reverse }, 2))
        }
        _ => Err(fail(format!("unsupported opcode 0x{opcode:02x}"))),
    }
}

fn unop_from_opcode(opcode: u8) -> Option<UnaryOp> {
    match opcode {
        0x7b | 0x7d | 0x7f | 0x80 => Some(UnaryOp::Neg),
        0x7c | 0x7e => Some(UnaryOp::Not),
        0x81..=0x8f => Some(UnaryOp::NumberConversion),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_4_sign_extends_the_literal() {
        // const/4 v0, #-1 -> opcode 0x12, A=0, B=0xf (-1 in 4-bit two's complement)
        let insns = [0x0012u16 | (0xf << 12)];
        let (op, width) = decode_insn(&insns, 0, "m").unwrap();
        assert_eq!(width, 1);
        match op {
            RawOp::ConstInt { dst: 0, value: -1 } => {}
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn goto_decodes_signed_byte_offset() {
        let insns = [0x0028u16 | ((0xfeu16) << 8)]; // goto -2
        let (op, width) = decode_insn(&insns, 0, "m").unwrap();
        assert_eq!(width, 1);
        assert_eq!(op.branch_offset(), Some(-2));
    }

    #[test]
    fn unknown_opcode_reports_malformed_input() {
        let insns = [0x00ffu16];
        let err = decode_insn(&insns, 0, "m").unwrap_err();
        assert!(matches!(err, IrError::MalformedInputCode { .. }));
    }

    #[test]
    fn invoke_virtual_collects_registers_in_cdefg_order() {
        // invoke-virtual {v1, v2}, method@5 : A=2 (count), G unused, C=1, D=2
        let u0 = 0x006eu16 | (2u16 << 12);
        let u1 = 5u16;
        let u2 = 1u16 | (2u16 << 4);
        let insns = [u0, u1, u2];
        let (op, width) = decode_insn(&insns, 0, "m").unwrap();
        assert_eq!(width, 3);
        match op {
            RawOp::Invoke { method_idx: 5, args, .. } => {
                assert_eq!(args.as_slice(), &[1, 2]);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }
}
