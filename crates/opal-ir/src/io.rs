//! Persistence of lowered units
//!
//! Units are stored as JSON so a library store can serve previously
//! lowered IR without re-running the front-end.

use crate::unit::Unit;
use std::io::{Read, Write};
use thiserror::Error;

/// Error reading or writing persisted IR
#[derive(Debug, Error)]
pub enum IrError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed unit data: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serialise a set of units to a writer
pub fn write_units<W: Write>(writer: W, units: &[Unit]) -> Result<(), IrError> {
    serde_json::to_writer(writer, units)?;
    Ok(())
}

/// Deserialise a set of units from a reader
pub fn read_units<R: Read>(reader: R) -> Result<Vec<Unit>, IrError> {
    Ok(serde_json::from_reader(reader)?)
}
