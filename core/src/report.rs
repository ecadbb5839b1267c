//! The `Reporter`/`Diagnostic` surface (spec §6 "Exit codes and
//! diagnostics").

use std::fmt;

use dexcomp_pool::DexMethod;

use crate::errors::Origin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
    FatalError,
}

/// A position within a method, attached to a [Diagnostic] when available
/// (spec §7 "a method position when available").
#[derive(Debug, Clone)]
pub struct MethodPosition {
    pub method: DexMethod,
    pub instruction_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub origin: Option<Origin>,
    pub position: Option<MethodPosition>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic { severity, message: message.into(), origin: None, position: None }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_position(mut self, position: MethodPosition) -> Self {
        self.position = Some(position);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.severity, self.message)?;
        if let Some(origin) = &self.origin {
            write!(f, " (from {origin})")?;
        }
        Ok(())
    }
}

/// Sink for everything the driver wants to tell a caller about, without
/// committing to how it's displayed (spec §6). `fatal_error` is expected
/// to also be surfaced through a returned [crate::errors::CompileError];
/// the reporter is for *accumulating* diagnostics, not control flow.
pub trait Reporter: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, diagnostic: Diagnostic);
    fn error(&self, diagnostic: Diagnostic);
    fn fatal_error(&self, diagnostic: Diagnostic);
}

/// Default in-process reporter: buffers every diagnostic (queryable
/// after the run) and also emits it through `log` at the matching level,
/// so a caller gets useful output with zero configuration.
#[derive(Default)]
pub struct BufferingReporter {
    diagnostics: std::sync::Mutex<Vec<Diagnostic>>,
}

impl BufferingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().unwrap().clone()
    }

    fn record(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Info => log::info!("{diagnostic}"),
            Severity::Warning => log::warn!("{diagnostic}"),
            Severity::Error | Severity::FatalError => log::error!("{diagnostic}"),
        }
        self.diagnostics.lock().unwrap().push(diagnostic);
    }
}

impl Reporter for BufferingReporter {
    fn info(&self, message: &str) {
        self.record(Diagnostic::new(Severity::Info, message));
    }

    fn warning(&self, diagnostic: Diagnostic) {
        self.record(diagnostic);
    }

    fn error(&self, diagnostic: Diagnostic) {
        self.record(diagnostic);
    }

    fn fatal_error(&self, diagnostic: Diagnostic) {
        self.record(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_diagnostics_are_queryable_after_the_run() {
        let reporter = BufferingReporter::new();
        reporter.info("starting compilation");
        reporter.warning(Diagnostic::new(Severity::Warning, "missing nest member, continuing"));

        let diagnostics = reporter.diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].severity, Severity::Info);
        assert_eq!(diagnostics[1].severity, Severity::Warning);
    }
}
