//! IR type descriptors
//!
//! The evaluator only needs a small slice of type information: the kind of
//! a value, integer bounds for range checks, and the element count of
//! constrained arrays for storage sizing.

use serde::{Deserialize, Serialize};

/// Type descriptor attached to variables and to bounds/cast ops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrType {
    /// Signed integer with an inclusive range
    Int { low: i64, high: i64 },
    /// Pointer/array offset arithmetic type
    Offset,
    /// IEEE-754 double
    Real,
    /// Pointer to a run of values
    Pointer(Box<IrType>),
    /// Unconstrained array descriptor
    Uarray { ndims: usize, elem: Box<IrType> },
    /// Constrained array with a statically known element count
    Carray { size: usize, elem: Box<IrType> },
}

impl IrType {
    /// Integer type covering the full 64-bit range
    pub fn int() -> Self {
        IrType::Int {
            low: i64::MIN,
            high: i64::MAX,
        }
    }

    /// Low bound of an integer range, if this is an integer type
    pub fn low(&self) -> Option<i64> {
        match self {
            IrType::Int { low, .. } => Some(*low),
            _ => None,
        }
    }

    /// High bound of an integer range, if this is an integer type
    pub fn high(&self) -> Option<i64> {
        match self {
            IrType::Int { high, .. } => Some(*high),
            _ => None,
        }
    }

    /// Element count of a constrained array type
    pub fn size(&self) -> Option<usize> {
        match self {
            IrType::Carray { size, .. } => Some(*size),
            _ => None,
        }
    }
}
