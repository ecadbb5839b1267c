//! Errors returned by this crate.
//!
//! This module contains the definitions for all error types returned by this crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DexError {
    #[error("got unknown dex version: {0}")]
    UnknownVersion(u16),

    #[error("invalid header")]
    InvalidHeader,

    #[error("got error while parsing string_ids")]
    StringError,

    #[error("got error while parsing type_ids")]
    TypeError,

    #[error("got error while parsing proto_ids")]
    ProtoError,

    #[error("got error while parsing field_ids")]
    FieldError,

    #[error("got error while parsing method_ids")]
    MethodError,

    #[error("got error while parsing class_defs")]
    ClassError,

    #[error("got error while parsing code_item for method {0}")]
    CodeError(String),

    #[error("got unknown type item: {0}")]
    UnknownTypeItem(u16),

    #[error("got error while parsing map_list")]
    MapListError,

    #[error("unknown instruction opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error(
        "`{table}` table has {count} entries, exceeding the uint16 index space (65536); the application must be sharded across multiple dex files"
    )]
    IndexOverflow { table: &'static str, count: usize },

    #[error("register v{register} does not fit format `{format}` ({bits}-bit)")]
    RegisterOutOfRange {
        format: &'static str,
        register: u32,
        bits: u32,
    },

    #[error("branch offset {offset} does not fit format `{format}`")]
    BranchOffsetOutOfRange { format: &'static str, offset: i64 },

    #[error("class `{0}` depends on itself through its supertype chain")]
    CyclicInheritance(String),

    #[error("unsupported encoded_value type tag 0x{0:02x}")]
    UnsupportedEncodedValue(u8),

    #[error("string index {idx} out of range (table has {len} entries)")]
    StringIndexOutOfRange { idx: u32, len: usize },

    #[error("type index {idx} out of range (table has {len} entries)")]
    TypeIndexOutOfRange { idx: u32, len: usize },
}
