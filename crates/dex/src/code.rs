//! Method bodies: the DEX-encoded form, the class-file form, and the
//! tagged union a [crate::class::DexEncodedMethod] actually holds.
//!
//! See spec §3 ("Code") and §4.8 (lowering produces [DexCode] from IR).

use std::sync::Arc;

use dexcomp_pool::DexType;

/// A single `try`/`catch` protected range, referencing its handler by
/// offset at parse time. [crate::assembly] rewrites handler references to
/// index form before emission (spec §4.7).
#[derive(Debug, Clone)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    pub handler_offset: u16,
}

/// One catch handler: an ordered list of (exception type, handler address)
/// pairs, plus an optional catch-all address.
#[derive(Debug, Clone, Default)]
pub struct EncodedCatchHandler {
    pub handlers: Vec<(DexType, u32)>,
    pub catch_all_addr: Option<u32>,
}

/// A single entry of the line-number/local-variable debug stream attached
/// to a [DexCode]. Kept coarse — full opcode-level debug_info_item replay
/// is a detail of the external writer, not of this model.
#[derive(Debug, Clone)]
pub struct DebugPositionEntry {
    pub address: u32,
    pub line: u32,
}

/// `code_item`: register layout, raw DEX instructions, and try/catch data.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#code-item>
#[derive(Debug, Clone, Default)]
pub struct DexCode {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub insns: Vec<u16>,
    pub tries: Vec<TryItem>,
    pub handlers: Vec<EncodedCatchHandler>,
    pub debug_positions: Vec<DebugPositionEntry>,
}

impl DexCode {
    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Total register count addressable by this code item's instructions.
    pub fn registers_size(&self) -> u16 {
        self.registers_size
    }
}

/// A class-file `try`/`catch` range, identified by bytecode offsets rather
/// than a handler table index.
#[derive(Debug, Clone)]
pub struct CfTryCatchRange {
    pub start_pc: u32,
    pub end_pc: u32,
    pub handler_pc: u32,
    pub catch_type: Option<DexType>,
}

/// One class-file local variable table slot.
#[derive(Debug, Clone)]
pub struct CfLocalVariable {
    pub slot: u16,
    pub name: Arc<str>,
    pub descriptor: DexType,
    pub start_pc: u32,
    pub length: u32,
}

/// `Code` attribute contents, as read from a `.class` file input.
#[derive(Debug, Clone, Default)]
pub struct CfCode {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<u8>,
    pub try_catch_ranges: Vec<CfTryCatchRange>,
    pub local_variables: Vec<CfLocalVariable>,
}

/// The two shapes a method body can take prior to finalization. Immutable
/// once attached to a finalized [crate::class::DexEncodedMethod] (spec §3).
#[derive(Debug, Clone)]
pub enum Code {
    Dex(DexCode),
    Cf(CfCode),
}

impl Code {
    pub fn as_dex(&self) -> Option<&DexCode> {
        match self {
            Code::Dex(code) => Some(code),
            Code::Cf(_) => None,
        }
    }

    pub fn as_cf(&self) -> Option<&CfCode> {
        match self {
            Code::Cf(code) => Some(code),
            Code::Dex(_) => None,
        }
    }

    pub fn is_dex(&self) -> bool {
        matches!(self, Code::Dex(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_variant_predicates() {
        let code = Code::Dex(DexCode::default());
        assert!(code.is_dex());
        assert!(code.as_dex().is_some());
        assert!(code.as_cf().is_none());
    }
}
