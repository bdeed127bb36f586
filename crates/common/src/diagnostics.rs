//! Structured diagnostics raised by the storage compiler passes.
//!
//! Passes never render text for the user. They hand a [`CompleteDiagnostic`]
//! to whichever frontend drives them, and that frontend owns formatting.

use std::fmt;

use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// The pass that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagnosticPass {
    Config,
    StorageLayout,
    AccessorGen,
    YulEmit,
}

impl DiagnosticPass {
    pub fn code(self) -> u16 {
        match self {
            DiagnosticPass::Config => 1,
            DiagnosticPass::StorageLayout => 2,
            DiagnosticPass::AccessorGen => 3,
            DiagnosticPass::YulEmit => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorCode {
    pub pass: DiagnosticPass,
    pub local_code: u16,
}

impl ErrorCode {
    pub fn new(pass: DiagnosticPass, local_code: u16) -> Self {
        Self { pass, local_code }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04}", self.pass.code(), self.local_code)
    }
}

/// A byte range inside a named source, as handed over by the type checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub source: SmolStr,
    pub start: u32,
    pub end: u32,
}

impl SourceLocation {
    pub fn new(source: impl Into<SmolStr>, start: u32, end: u32) -> Self {
        Self {
            source: source.into(),
            start,
            end,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}..{}", self.source, self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubDiagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompleteDiagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub sub_diagnostics: Vec<SubDiagnostic>,
    pub error_code: ErrorCode,
}

impl CompleteDiagnostic {
    pub fn new(
        severity: Severity,
        message: impl Into<String>,
        location: Option<SourceLocation>,
        error_code: ErrorCode,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            location,
            sub_diagnostics: Vec::new(),
            error_code,
        }
    }

    pub fn with_note(
        mut self,
        message: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        self.sub_diagnostics.push(SubDiagnostic {
            severity: Severity::Note,
            message: message.into(),
            location,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Anything that can be turned into a [`CompleteDiagnostic`].
pub trait DiagnosticVoucher {
    fn to_complete(&self) -> CompleteDiagnostic;
}

impl<T: DiagnosticVoucher> DiagnosticVoucher for &T {
    fn to_complete(&self) -> CompleteDiagnostic {
        (*self).to_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_display_is_stable() {
        let code = ErrorCode::new(DiagnosticPass::StorageLayout, 3);
        assert_eq!(code.to_string(), "2-0003");
    }

    #[test]
    fn notes_are_attached_in_order() {
        let diag = CompleteDiagnostic::new(
            Severity::Error,
            "duplicate field",
            Some(SourceLocation::new("a.fe", 4, 9)),
            ErrorCode::new(DiagnosticPass::StorageLayout, 1),
        )
        .with_note("first declared here", Some(SourceLocation::new("a.fe", 0, 3)))
        .with_note("fields must have unique names", None);

        assert!(diag.is_error());
        assert_eq!(diag.sub_diagnostics.len(), 2);
        assert_eq!(diag.sub_diagnostics[0].severity, Severity::Note);
        assert_eq!(
            diag.sub_diagnostics[0].location.as_ref().unwrap().to_string(),
            "a.fe:0..3"
        );
    }
}
