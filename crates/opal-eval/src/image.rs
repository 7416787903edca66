//! The image operation
//!
//! Formats a scalar as a character sequence under its source type's rules
//! and hands back a one-dimensional ascending array of character cells,
//! indexed from 1, with its data buffer on the evaluation heap.

use crate::interp::{Abort, Frame, Interp};
use crate::value::{Dim, RangeDir, UArray, Value};
use opal_ir::{ImageKind, Loc, RegId};

/// Significant digits in the image of a real value
const REAL_IMAGE_DIGITS: usize = 18;

impl<'a> Interp<'a> {
    pub(crate) fn op_image(
        &mut self,
        frame: &mut Frame,
        result: RegId,
        arg: RegId,
        kind: &ImageKind,
        loc: &Loc,
    ) -> Result<(), Abort> {
        let value = Self::read(frame, arg).clone();
        let text = match (kind, &value) {
            (ImageKind::Integer, Value::Integer(i)) => i.to_string(),
            (ImageKind::Real, Value::Real(r)) => general_format(*r, REAL_IMAGE_DIGITS),
            (ImageKind::Enum { literals }, Value::Integer(i)) => {
                let Some(lit) = usize::try_from(*i).ok().and_then(|i| literals.get(i)) else {
                    self.diags
                        .fatal_at(loc, format!("enum position {} has no literal", i));
                    return Err(Abort::Fatal);
                };
                lit.clone()
            }
            (ImageKind::Physical { unit }, Value::Integer(i)) => format!("{} {}", i, unit),
            _ => {
                self.diags.fatal_at(
                    loc,
                    format!("cannot compute image of {} value", value.kind_name()),
                );
                return Err(Abort::Fatal);
            }
        };

        let chars: Vec<char> = text.chars().collect();
        let base = self.alloc(chars.len())?;
        for (i, ch) in chars.iter().enumerate() {
            self.heap_write(base + i, Value::Integer(*ch as i64))?;
        }
        let image = UArray {
            data: base,
            dims: vec![Dim {
                left: 1,
                right: chars.len() as i64,
                dir: RangeDir::To,
            }],
        };
        Self::write(frame, result, Value::UArray(image));
        Ok(())
    }
}

/// `%g`-style general formatting with a fixed number of significant
/// digits: scientific notation for very large or very small magnitudes,
/// fixed-point otherwise, trailing zeros stripped
fn general_format(value: f64, digits: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return if value.is_nan() {
            "nan".to_string()
        } else if value < 0.0 {
            "-inf".to_string()
        } else {
            "inf".to_string()
        };
    }

    let exponent = value.abs().log10().floor() as i32;
    if exponent < -4 || exponent >= digits as i32 {
        let s = format!("{:.*e}", digits.saturating_sub(1), value);
        match s.split_once('e') {
            Some((mantissa, exp)) => format!("{}e{}", trim_fraction(mantissa), exp),
            None => s,
        }
    } else {
        let precision = (digits as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", precision, value))
    }
}

fn trim_fraction(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_reals_lose_their_fraction() {
        assert_eq!(general_format(1.0, 18), "1");
        assert_eq!(general_format(-42.0, 18), "-42");
        assert_eq!(general_format(0.0, 18), "0");
    }

    #[test]
    fn short_fractions_stay_fixed_point() {
        assert_eq!(general_format(0.5, 18), "0.5");
        assert_eq!(general_format(1.25, 18), "1.25");
        assert_eq!(general_format(-0.75, 18), "-0.75");
    }

    #[test]
    fn extreme_magnitudes_go_scientific() {
        // 2^100 and 2^-20, both exactly representable
        assert_eq!(
            general_format(1.2676506002282294e30, 18),
            "1.2676506002282294e30"
        );
        assert_eq!(general_format(9.5367431640625e-7, 18), "9.5367431640625e-7");
    }

    #[test]
    fn non_finite_values_have_names() {
        assert_eq!(general_format(f64::NAN, 18), "nan");
        assert_eq!(general_format(f64::INFINITY, 18), "inf");
        assert_eq!(general_format(f64::NEG_INFINITY, 18), "-inf");
    }
}
