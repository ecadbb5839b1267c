//! Errors returned by this crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrError {
    #[error("malformed input code for method `{method}`: {reason}")]
    MalformedInputCode { method: String, reason: String },

    #[error("unreachable code with live instructions at address {address}")]
    UnreachableCodeWithInstructions { address: u32 },

    #[error("inconsistent register types at join into block {block}, register v{register}")]
    InconsistentJoinTypes { block: u32, register: u32 },

    #[error("unresolvable reference type for register v{register} in non-dead code")]
    UnresolvableReferenceType { register: u32 },

    #[error("irreducible control flow entering block {block}")]
    IrreducibleControlFlow { block: u32 },

    #[error(transparent)]
    Dex(#[from] dexcomp_dex::DexError),
}
