//! Diagnostics sink
//!
//! The evaluator never prints from the middle of an evaluation; it records
//! diagnostics on the session and mirrors them to `tracing`. The error
//! counter backs the driver-visible `error_count` query.

use opal_ir::Loc;
use std::fmt;
use tracing::{error, info, warn};

/// Severity ladder shared by diagnostics and assertion/report ops
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Failure,
    /// Contract violation; the driver must abort the compilation
    Fatal,
}

impl Severity {
    /// Decode the integer encoding carried by assert/report operands
    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            0 => Some(Severity::Note),
            1 => Some(Severity::Warning),
            2 => Some(Severity::Error),
            3 => Some(Severity::Failure),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Failure => "failure",
            Severity::Fatal => "fatal",
        };
        write!(f, "{}", name)
    }
}

/// A recorded diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub loc: Loc,
    pub message: String,
}

/// Session-owned diagnostic store and error counter
#[derive(Debug, Default)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
    errors: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_at(&mut self, loc: &Loc, message: String) {
        info!(%loc, "{}", message);
        self.push(Severity::Note, loc, message);
    }

    pub fn warn_at(&mut self, loc: &Loc, message: String) {
        warn!(%loc, "{}", message);
        self.push(Severity::Warning, loc, message);
    }

    pub fn error_at(&mut self, loc: &Loc, message: String) {
        error!(%loc, "{}", message);
        self.errors += 1;
        self.push(Severity::Error, loc, message);
    }

    /// Record a compilation-terminating diagnostic; the caller unwinds
    /// with a fatal abort and the driver decides process teardown
    pub fn fatal_at(&mut self, loc: &Loc, message: String) {
        error!(%loc, "fatal: {}", message);
        self.errors += 1;
        self.push(Severity::Fatal, loc, message);
    }

    fn push(&mut self, severity: Severity, loc: &Loc, message: String) {
        self.records.push(Diagnostic {
            severity,
            loc: loc.clone(),
            message,
        });
    }

    /// Diagnostics recorded so far, in emission order
    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    /// Number of error-severity diagnostics issued
    pub fn error_count(&self) -> usize {
        self.errors
    }

    /// True when a fatal diagnostic has been recorded
    pub fn has_fatal(&self) -> bool {
        self.records
            .iter()
            .any(|d| d.severity == Severity::Fatal)
    }
}
