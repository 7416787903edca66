//! Bounds, assertion and report handlers
//!
//! Bounds violations are genuine source errors: they are reported through
//! the session diagnostics (when bounds reporting is enabled) and always
//! abort the fold. Assertions and reports are observable side effects, so
//! they only fold when the caller has opted in with the *report* flag.

use crate::diag::Severity;
use crate::interp::{Abort, Frame, Interp};
use crate::value::Value;
use opal_ir::{BoundsKind, IrType, Loc, RegId};

impl<'a> Interp<'a> {
    pub(crate) fn op_bounds(
        &mut self,
        frame: &Frame,
        value: RegId,
        ty: &IrType,
        kind: BoundsKind,
        loc: &Loc,
    ) -> Result<(), Abort> {
        match Self::read(frame, value) {
            &Value::Integer(v) => {
                let (Some(low), Some(high)) = (ty.low(), ty.high()) else {
                    return Err(self.fatal("non-integer type in bounds op".to_string()));
                };
                self.check_range(v, low, high, kind, loc)
            }
            Value::Real(_) => Ok(()),
            other => {
                let name = other.kind_name();
                Err(self.fatal(format!("invalid {} value in bounds op", name)))
            }
        }
    }

    pub(crate) fn op_dynamic_bounds(
        &mut self,
        frame: &Frame,
        value: RegId,
        low: RegId,
        high: RegId,
        kind: BoundsKind,
        loc: &Loc,
    ) -> Result<(), Abort> {
        match Self::read(frame, value) {
            &Value::Integer(v) => {
                let low = self.int_value(frame, low)?;
                let high = self.int_value(frame, high)?;
                self.check_range(v, low, high, kind, loc)
            }
            Value::Real(_) => Ok(()),
            other => {
                let name = other.kind_name();
                Err(self.fatal(format!("invalid {} value in dynamic bounds op", name)))
            }
        }
    }

    /// Check a value against an inclusive range; a null range passes
    fn check_range(
        &mut self,
        value: i64,
        low: i64,
        high: i64,
        kind: BoundsKind,
        loc: &Loc,
    ) -> Result<(), Abort> {
        if low > high || (value >= low && value <= high) {
            return Ok(());
        }
        if self.flags.bounds {
            let what = match kind {
                BoundsKind::Range => "value",
                BoundsKind::Index => "array index",
            };
            self.diags.error_at(
                loc,
                format!("{} {} outside of bounds {} to {}", what, value, low, high),
            );
        }
        Err(Abort::Fold)
    }

    pub(crate) fn op_index_check(
        &mut self,
        frame: &Frame,
        low: RegId,
        high: RegId,
        ty: &IrType,
        loc: &Loc,
    ) -> Result<(), Abort> {
        let low = self.int_value(frame, low)?;
        let high = self.int_value(frame, high)?;
        if low > high {
            // null slice
            return Ok(());
        }
        let (Some(min), Some(max)) = (ty.low(), ty.high()) else {
            return Err(self.fatal("non-integer type in index check op".to_string()));
        };
        if low >= min && high <= max {
            return Ok(());
        }
        if self.flags.bounds {
            let value = if low < min { low } else { high };
            self.diags.error_at(
                loc,
                format!("array index {} outside of bounds {} to {}", value, min, max),
            );
        }
        Err(Abort::Fold)
    }

    pub(crate) fn op_assert(
        &mut self,
        frame: &Frame,
        test: RegId,
        severity: RegId,
        message: Option<(RegId, RegId)>,
        loc: &Loc,
    ) -> Result<(), Abort> {
        if self.int_value(frame, test)? != 0 {
            return Ok(());
        }
        if !self.flags.report {
            return Err(self.fail_warn("assertion prevents constant folding".to_string()));
        }
        let text = match message {
            Some((ptr, length)) => self.message_string(frame, ptr, length)?,
            None => "Assertion violation.".to_string(),
        };
        self.emit_severity(frame, severity, "assertion", &text, loc)
    }

    pub(crate) fn op_report(
        &mut self,
        frame: &Frame,
        severity: RegId,
        message: RegId,
        length: RegId,
        loc: &Loc,
    ) -> Result<(), Abort> {
        if !self.flags.report {
            return Err(self.fail_warn("report statement prevents constant folding".to_string()));
        }
        let text = self.message_string(frame, message, length)?;
        self.emit_severity(frame, severity, "report", &text, loc)
    }

    /// Emit `what: text` at the severity held in a register; severities of
    /// error and above abort the fold
    fn emit_severity(
        &mut self,
        frame: &Frame,
        severity: RegId,
        what: &str,
        text: &str,
        loc: &Loc,
    ) -> Result<(), Abort> {
        let level = self.int_value(frame, severity)?;
        let Some(severity) = Severity::from_level(level) else {
            return Err(self.fatal(format!("invalid severity level {}", level)));
        };
        let message = format!("{} {}: {}", what, severity, text);
        match severity {
            Severity::Note => self.diags.note_at(loc, message),
            Severity::Warning => self.diags.warn_at(loc, message),
            _ => self.diags.error_at(loc, message),
        }
        if severity >= Severity::Error {
            Err(Abort::Fold)
        } else {
            Ok(())
        }
    }

    /// Collect a character-cell run into a string
    fn message_string(&mut self, frame: &Frame, ptr: RegId, length: RegId) -> Result<String, Abort> {
        let base = self.pointer_value(frame, ptr)?;
        let length = self.int_value(frame, length)?.max(0) as usize;
        let mut text = String::with_capacity(length);
        for i in 0..length {
            match self.heap_read(base + i)? {
                Value::Integer(code) => {
                    text.push(char::from_u32(code as u32).unwrap_or('?'));
                }
                other => {
                    return Err(self.fatal(format!(
                        "invalid {} value in message string",
                        other.kind_name()
                    )))
                }
            }
        }
        Ok(text)
    }

    fn int_value(&mut self, frame: &Frame, reg: RegId) -> Result<i64, Abort> {
        match Self::read(frame, reg) {
            &Value::Integer(v) => Ok(v),
            other => {
                let name = other.kind_name();
                Err(self.fatal(format!("expected integer check operand, not {}", name)))
            }
        }
    }

    fn pointer_value(&mut self, frame: &Frame, reg: RegId) -> Result<usize, Abort> {
        match Self::read(frame, reg) {
            &Value::Pointer(p) => Ok(p),
            other => {
                let name = other.kind_name();
                Err(self.fatal(format!("expected message pointer, not {}", name)))
            }
        }
    }
}
