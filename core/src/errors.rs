//! Errors returned by this crate (spec §7 error taxonomy).
//!
//! Every fatal variant carries an [Origin] naming where the failing input
//! or synthesized entity came from, so a caller can report a path instead
//! of a bare message.

use std::path::PathBuf;

use thiserror::Error;

/// Where a failing input or synthesized entity came from (spec §7 "All
/// fatal errors attach an origin").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Input(PathBuf),
    Synthesized(String),
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Input(path) => write!(f, "{}", path.display()),
            Origin::Synthesized(name) => write!(f, "<synthesized: {name}>"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CompileError {
    /// Unparseable DEX or class-file input (spec §7 `MalformedInput`).
    #[error("malformed input from {origin}: {source}")]
    MalformedInput {
        origin: Origin,
        #[source]
        source: dexcomp_dex::DexError,
    },

    /// A table exceeded the uint16 index space (spec §7 `IndexOverflow`,
    /// §4.7 "caller must shard the application into multiple dex files").
    #[error("index table overflow while assembling from {origin}: {source}")]
    IndexOverflow {
        origin: Origin,
        #[source]
        source: dexcomp_dex::DexError,
    },

    /// Incompatible options caught before processing starts (spec §7
    /// `ConfigurationError`), e.g. desugaring requested with no min-api.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// SSA broken after a pass, or the IR builder produced inconsistent
    /// state (spec §7 `InvariantViolation`) — never silently recovered.
    #[error("invariant violation in method {method} (from {origin}): {source}")]
    InvariantViolation {
        origin: Origin,
        method: String,
        #[source]
        source: dexcomp_opt::OptError,
    },

    #[error(transparent)]
    Ir(#[from] dexcomp_ir::IrError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An optimized body couldn't be lowered to bytecode (spec §7
    /// `InvariantViolation`) — e.g. an arithmetic op dex has no single
    /// instruction for, left over from a pass that should have rewritten
    /// it away.
    #[error("failed to lower method {method} (from {origin}): {source}")]
    LoweringFailure {
        origin: Origin,
        method: String,
        #[source]
        source: dexcomp_opt::lowering::LoweringError,
    },
}
