//! Source location bookmarks
//!
//! Every op that can produce a diagnostic carries a `Loc` pointing back at
//! the syntax node it was lowered from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location with file, line and column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loc {
    /// Source file (if known)
    pub file: Option<String>,
    /// Line number (1-indexed, 0 when unknown)
    pub line: u32,
    /// Column number (1-indexed, 0 when unknown)
    pub column: u32,
}

impl Loc {
    /// Create a location within a named file
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: Some(file.into()),
            line,
            column,
        }
    }

    /// Location for generated code with no source counterpart
    pub fn invalid() -> Self {
        Self::default()
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "<generated>"),
        }
    }
}
