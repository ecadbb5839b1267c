//! Errors returned by this crate (spec §7 error taxonomy, the
//! `InvariantViolation`/`TypeCheckFailure` rows specifically).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptError {
    /// A pass produced IR that fails [dexcomp_ir::verify::verify] — never
    /// silently recovered, per spec §7 `InvariantViolation`.
    #[error("optimization invariant broken by pass `{pass}`: {source}")]
    InvariantViolation {
        pass: &'static str,
        #[source]
        source: dexcomp_ir::IrError,
    },

    /// The IR does not type-check; degraded to an empty throwing body for
    /// unpinned methods (spec §4.3 "Failure semantics"), surfaced as-is
    /// for pinned ones.
    #[error("type-check failure in pass `{pass}`: {reason}")]
    TypeCheckFailure { pass: &'static str, reason: String },

    #[error(transparent)]
    Ir(#[from] dexcomp_ir::IrError),
}
