//! The SSA program graph (spec §3 "IR (SSA)") and the builders that
//! construct it from either DEX or class-file method bodies (spec §4.2).
//!
//! Nothing here runs an optimization; `dexcomp-opt` consumes the graph this
//! crate produces and runs the pass pipeline over it.

pub mod block;
pub mod builder;
pub mod code;
pub mod errors;
pub mod instruction;
pub mod value;
pub mod verify;

pub use block::{BasicBlock, BlockId, CatchHandler};
pub use builder::{CfConstantPool, build_from_cf_code, build_from_dex_code};
pub use code::IRCode;
pub use errors::IrError;
pub use instruction::{Assumption, BinaryOp, Instruction, InstructionId, InvokeKind, SwitchCase, UnaryOp};
pub use value::{DebugLocalInfo, PrimitiveType, TypeElement, Value, ValueId};
