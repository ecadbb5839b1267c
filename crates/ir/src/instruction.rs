//! IR instructions: the operation payloads a [crate::block::BasicBlock]
//! holds, referenced by [InstructionId] from both the block's list and
//! each operand's producer/user links.

use dexcomp_pool::{DexField, DexMethod, DexType};
use smallvec::SmallVec;

use crate::block::BlockId;
use crate::value::ValueId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstructionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
    CmpLess,
    CmpLessEqual,
    CmpGreater,
    CmpGreaterEqual,
    CmpEqual,
    CmpNotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    NumberConversion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    /// Also the retargeted kind once the interface-processor lens relocates
    /// an interface-method invocation to a companion class: real DEX
    /// bytecode has no separate "was an interface call" invoke-kind, so a
    /// relocated call becomes an ordinary `invoke-static` like any other.
    Static,
    Interface,
}

/// One switch arm: a matched constant and its target block.
#[derive(Debug, Clone, Copy)]
pub struct SwitchCase {
    pub key: i32,
    pub target: BlockId,
}

/// An assumption pseudo-value inserted by the "Assume insertion" pass
/// (spec §4.3 step 2): a cheap, locally-scoped fact attached after a
/// dominating operation so later passes can reason without re-deriving it.
#[derive(Debug, Clone)]
pub enum Assumption {
    NonNull,
    DynamicType(DexType),
    ConstantRange { lo: i64, hi: i64 },
}

/// The operation an [InstructionId] identifies. Every instruction that
/// produces a value stores that value's [ValueId] in `result`; side-effect
/// only instructions (branches, stores, throws) leave it `None`.
#[derive(Debug, Clone)]
pub enum Instruction {
    /// A 32- or 64-bit integer, float/double bit pattern, string, class
    /// literal, or null constant materialized into a fresh value.
    Const {
        result: ValueId,
        bits: i64,
    },
    ConstString {
        result: ValueId,
        value: dexcomp_pool::DexString,
    },
    ConstClass {
        result: ValueId,
        class_type: DexType,
    },
    ConstNull {
        result: ValueId,
    },

    Binary {
        result: ValueId,
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Unary {
        result: ValueId,
        op: UnaryOp,
        operand: ValueId,
    },

    InstanceGet {
        result: ValueId,
        object: ValueId,
        field: DexField,
    },
    InstancePut {
        object: ValueId,
        value: ValueId,
        field: DexField,
    },
    StaticGet {
        result: ValueId,
        field: DexField,
    },
    StaticPut {
        value: ValueId,
        field: DexField,
    },

    ArrayGet {
        result: ValueId,
        array: ValueId,
        index: ValueId,
    },
    ArrayPut {
        array: ValueId,
        index: ValueId,
        value: ValueId,
    },
    ArrayLength {
        result: ValueId,
        array: ValueId,
    },
    NewArray {
        result: ValueId,
        element_type: DexType,
        length: ValueId,
    },
    NewInstance {
        result: ValueId,
        class_type: DexType,
    },

    CheckCast {
        result: ValueId,
        operand: ValueId,
        class_type: DexType,
    },
    InstanceOf {
        result: ValueId,
        operand: ValueId,
        class_type: DexType,
    },

    /// A call site. `move_result` tracking across a later pass (spec
    /// §4.3 step 10) folds the paired `move-result` into this node's
    /// `result` directly rather than leaving it a separate instruction.
    Invoke {
        result: Option<ValueId>,
        kind: InvokeKind,
        method: DexMethod,
        arguments: SmallVec<[ValueId; 4]>,
    },

    MonitorEnter {
        object: ValueId,
    },
    MonitorExit {
        object: ValueId,
    },

    Assume {
        result: ValueId,
        operand: ValueId,
        assumption: Assumption,
    },

    Goto {
        target: BlockId,
    },
    If {
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
        if_true: BlockId,
        if_false: BlockId,
    },
    Switch {
        operand: ValueId,
        cases: Vec<SwitchCase>,
        default: BlockId,
    },
    Return {
        value: Option<ValueId>,
    },
    Throw {
        exception: ValueId,
    },
    /// Installed by "Always-throwing-instruction optimization" (spec
    /// §4.3 step 13) in place of dead code following a guaranteed throw.
    Unreachable,
}

impl Instruction {
    pub fn result(&self) -> Option<ValueId> {
        match self {
            Instruction::Const { result, .. }
            | Instruction::ConstString { result, .. }
            | Instruction::ConstClass { result, .. }
            | Instruction::ConstNull { result }
            | Instruction::Binary { result, .. }
            | Instruction::Unary { result, .. }
            | Instruction::InstanceGet { result, .. }
            | Instruction::StaticGet { result, .. }
            | Instruction::ArrayGet { result, .. }
            | Instruction::ArrayLength { result, .. }
            | Instruction::NewArray { result, .. }
            | Instruction::NewInstance { result, .. }
            | Instruction::CheckCast { result, .. }
            | Instruction::InstanceOf { result, .. }
            | Instruction::Assume { result, .. } => Some(*result),
            Instruction::Invoke { result, .. } => *result,
            _ => None,
        }
    }

    /// The instruction's operand values, in the order an abstract
    /// interpreter or dataflow pass should visit them. Does not include
    /// `result` itself.
    pub fn operands(&self) -> SmallVec<[ValueId; 4]> {
        match self {
            Instruction::Const { .. }
            | Instruction::ConstString { .. }
            | Instruction::ConstClass { .. }
            | Instruction::ConstNull { .. }
            | Instruction::Goto { .. }
            | Instruction::Unreachable => SmallVec::new(),
            Instruction::Binary { lhs, rhs, .. } => SmallVec::from_slice(&[*lhs, *rhs]),
            Instruction::Unary { operand, .. } => SmallVec::from_slice(&[*operand]),
            Instruction::InstanceGet { object, .. } => SmallVec::from_slice(&[*object]),
            Instruction::InstancePut { object, value, .. } => SmallVec::from_slice(&[*object, *value]),
            Instruction::StaticGet { .. } => SmallVec::new(),
            Instruction::StaticPut { value, .. } => SmallVec::from_slice(&[*value]),
            Instruction::ArrayGet { array, index, .. } => SmallVec::from_slice(&[*array, *index]),
            Instruction::ArrayPut { array, index, value } => {
                SmallVec::from_slice(&[*array, *index, *value])
            }
            Instruction::ArrayLength { array, .. } => SmallVec::from_slice(&[*array]),
            Instruction::NewArray { length, .. } => SmallVec::from_slice(&[*length]),
            Instruction::NewInstance { .. } => SmallVec::new(),
            Instruction::CheckCast { operand, .. } | Instruction::InstanceOf { operand, .. } => {
                SmallVec::from_slice(&[*operand])
            }
            Instruction::Invoke { arguments, .. } => arguments.clone(),
            Instruction::MonitorEnter { object } | Instruction::MonitorExit { object } => {
                SmallVec::from_slice(&[*object])
            }
            Instruction::Assume { operand, .. } => SmallVec::from_slice(&[*operand]),
            Instruction::If { lhs, rhs, .. } => SmallVec::from_slice(&[*lhs, *rhs]),
            Instruction::Switch { operand, .. } => SmallVec::from_slice(&[*operand]),
            Instruction::Return { value } => value.iter().copied().collect(),
            Instruction::Throw { exception } => SmallVec::from_slice(&[*exception]),
        }
    }

    /// Rewrites every occurrence of `old` among this instruction's operands
    /// to `new`, in place. Used by passes that fold or forward a value
    /// (constant propagation, redundant-load elimination, CSE) — the
    /// instruction's def/use bookkeeping in [crate::code::IRCode] is the
    /// caller's responsibility.
    pub fn replace_operand(&mut self, old: ValueId, new: ValueId) {
        let swap = |v: &mut ValueId| {
            if *v == old {
                *v = new;
            }
        };
        match self {
            Instruction::Const { .. }
            | Instruction::ConstString { .. }
            | Instruction::ConstClass { .. }
            | Instruction::ConstNull { .. }
            | Instruction::Goto { .. }
            | Instruction::StaticGet { .. }
            | Instruction::NewInstance { .. }
            | Instruction::Unreachable => {}
            Instruction::Binary { lhs, rhs, .. } => {
                swap(lhs);
                swap(rhs);
            }
            Instruction::Unary { operand, .. } => swap(operand),
            Instruction::InstanceGet { object, .. } => swap(object),
            Instruction::InstancePut { object, value, .. } => {
                swap(object);
                swap(value);
            }
            Instruction::StaticPut { value, .. } => swap(value),
            Instruction::ArrayGet { array, index, .. } => {
                swap(array);
                swap(index);
            }
            Instruction::ArrayPut { array, index, value } => {
                swap(array);
                swap(index);
                swap(value);
            }
            Instruction::ArrayLength { array, .. } => swap(array),
            Instruction::NewArray { length, .. } => swap(length),
            Instruction::CheckCast { operand, .. } | Instruction::InstanceOf { operand, .. } => swap(operand),
            Instruction::Invoke { arguments, .. } => arguments.iter_mut().for_each(swap),
            Instruction::MonitorEnter { object } | Instruction::MonitorExit { object } => swap(object),
            Instruction::Assume { operand, .. } => swap(operand),
            Instruction::If { lhs, rhs, .. } => {
                swap(lhs);
                swap(rhs);
            }
            Instruction::Switch { operand, .. } => swap(operand),
            Instruction::Return { value } => {
                if let Some(value) = value {
                    swap(value);
                }
            }
            Instruction::Throw { exception } => swap(exception),
        }
    }

    /// Whether control falls through to the next instruction, as opposed
    /// to ending the block (branches, returns, throws, unreachable).
    pub fn is_block_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Goto { .. }
                | Instruction::If { .. }
                | Instruction::Switch { .. }
                | Instruction::Return { .. }
                | Instruction::Throw { .. }
                | Instruction::Unreachable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_operands_are_lhs_then_rhs() {
        let instr = Instruction::Binary {
            result: ValueId(2),
            op: BinaryOp::Add,
            lhs: ValueId(0),
            rhs: ValueId(1),
        };
        assert_eq!(instr.operands().as_slice(), &[ValueId(0), ValueId(1)]);
        assert_eq!(instr.result(), Some(ValueId(2)));
    }

    #[test]
    fn terminators_are_identified() {
        assert!(Instruction::Return { value: None }.is_block_terminator());
        assert!(!Instruction::Const { result: ValueId(0), bits: 1 }.is_block_terminator());
    }

    #[test]
    fn return_with_value_reports_it_as_an_operand() {
        let instr = Instruction::Return {
            value: Some(ValueId(5)),
        };
        assert_eq!(instr.operands().as_slice(), &[ValueId(5)]);
    }
}
