//! The IR operation set
//!
//! One enum variant per operation, carrying exactly the side data the
//! evaluator queries: argument registers, result register, variable
//! references, immediates, comparison sub-kind, dimension index, branch
//! targets, callee name, type attributes and a source bookmark.

use crate::span::Loc;
use crate::types::IrType;
use serde::{Deserialize, Serialize};

/// Virtual register id, local to a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegId(pub u32);

/// Basic block id, local to a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// Reference to a variable slot: the lexical depth of the owning unit and
/// the variable index within that unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarRef {
    /// Depth of the unit declaring the variable
    pub depth: u32,
    /// Dense index within the declaring unit
    pub index: u32,
}

/// Comparison sub-kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpKind {
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
}

/// Flavour of a bounds check, used for diagnostic wording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundsKind {
    /// Scalar range constraint
    Range,
    /// Array index constraint
    Index,
}

/// Registers holding one dimension of a wrap op: left bound, right bound
/// and direction (0 ascending, 1 descending)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimRegs {
    pub left: RegId,
    pub right: RegId,
    pub dir: RegId,
}

/// Source-type formatting rule for the image op
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImageKind {
    /// Signed decimal
    Integer,
    /// General floating-point format
    Real,
    /// Declared literal identifiers, indexed by value
    Enum { literals: Vec<String> },
    /// Decimal integer followed by the base unit identifier
    Physical { unit: String },
}

/// A single IR operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// No-op annotation kept for IR dumps
    Comment { text: String },

    /// Integer immediate
    Const { result: RegId, value: i64 },
    /// Real immediate
    ConstReal { result: RegId, value: f64 },
    /// Allocate and populate a contiguous run of values
    ConstArray { result: RegId, values: Vec<RegId> },

    Add { result: RegId, lhs: RegId, rhs: RegId },
    Sub { result: RegId, lhs: RegId, rhs: RegId },
    Mul { result: RegId, lhs: RegId, rhs: RegId },
    Div { result: RegId, lhs: RegId, rhs: RegId },
    /// Modulo: absolute value of the truncated remainder
    Mod { result: RegId, lhs: RegId, rhs: RegId },
    /// Truncated remainder: `a - (a/b)*b`
    Rem { result: RegId, lhs: RegId, rhs: RegId },
    /// Real-only exponentiation
    Exp { result: RegId, lhs: RegId, rhs: RegId },
    Neg { result: RegId, arg: RegId },
    Abs { result: RegId, arg: RegId },
    /// Logical not: nonzero becomes 0, zero becomes 1
    Not { result: RegId, arg: RegId },
    And { result: RegId, lhs: RegId, rhs: RegId },
    Or { result: RegId, lhs: RegId, rhs: RegId },
    Cmp { result: RegId, kind: CmpKind, lhs: RegId, rhs: RegId },
    /// Convert between the scalar kinds named by `ty`
    Cast { result: RegId, ty: IrType, arg: RegId },
    /// Ternary choice: `test != 0 ? if_true : if_false`
    Select { result: RegId, test: RegId, if_true: RegId, if_false: RegId },

    /// Build an unconstrained-array descriptor over a pointer
    Wrap { result: RegId, data: RegId, dims: Vec<DimRegs> },
    /// Extract the data pointer from a descriptor
    Unwrap { result: RegId, arg: RegId },
    /// Length of one dimension, clamped to non-negative
    UarrayLen { result: RegId, arg: RegId, dim: usize },
    UarrayLeft { result: RegId, arg: RegId, dim: usize },
    UarrayRight { result: RegId, arg: RegId, dim: usize },
    /// Direction of one dimension: 0 ascending, 1 descending
    UarrayDir { result: RegId, arg: RegId, dim: usize },

    /// Read a variable slot into a register
    Load { result: RegId, var: VarRef },
    /// Write a register into a variable slot
    Store { var: VarRef, value: RegId },
    /// Dereference a pointer-valued register
    LoadIndirect { result: RegId, ptr: RegId },
    /// Store through a pointer-valued register
    StoreIndirect { ptr: RegId, value: RegId },
    /// Pointer to the first element of a constrained-array variable
    Index { result: RegId, var: VarRef },
    /// Copy `count` values from `src` to `dst`; overlap is undefined
    Copy { dst: RegId, src: RegId, count: RegId },
    /// Allocate `count` fresh zeroed values
    Alloca { result: RegId, count: RegId },
    /// 1 if all `count` value pairs compare equal, else 0
    Memcmp { result: RegId, lhs: RegId, rhs: RegId, count: RegId },

    Jump { target: BlockId },
    Cond { test: RegId, if_true: BlockId, if_false: BlockId },
    /// Multi-way branch on equality with the arm values
    Case { test: RegId, default: BlockId, arms: Vec<(RegId, BlockId)> },
    Return { value: Option<RegId> },

    /// Range check against the bounds of `ty`
    Bounds { value: RegId, ty: IrType, kind: BoundsKind, loc: Loc },
    /// Range check against bounds held in registers
    DynamicBounds { value: RegId, low: RegId, high: RegId, kind: BoundsKind, loc: Loc },
    /// Check that `[low, high]` lies within the declared range of `ty`
    IndexCheck { low: RegId, high: RegId, ty: IrType, loc: Loc },
    /// Assertion: fires when `test` is zero; severity and message are
    /// runtime values (message is a pointer/length pair of character cells)
    Assert { test: RegId, severity: RegId, message: Option<(RegId, RegId)>, loc: Loc },
    /// Unconditional report with severity and message
    Report { severity: RegId, message: RegId, length: RegId, loc: Loc },
    /// Reference to an object with no defined value in this phase
    Undefined { result: RegId },

    /// Scalar-to-string conversion under type-specific formatting
    Image { result: RegId, arg: RegId, kind: ImageKind, loc: Loc },

    /// Call a named unit, binding `args` positionally
    Fcall { result: RegId, func: String, args: Vec<RegId> },
    /// Call through a closure-bearing nested reference (never folded)
    NestedFcall { result: RegId, func: String, args: Vec<RegId> },

    /// Record the heap mark (no-op at compile time)
    HeapSave { result: RegId },
    /// Restore a recorded heap mark (no-op at compile time)
    HeapRestore { arg: RegId },
}

impl Op {
    /// Name of the operation, for diagnostics and dumps
    pub fn name(&self) -> &'static str {
        match self {
            Op::Comment { .. } => "comment",
            Op::Const { .. } => "const",
            Op::ConstReal { .. } => "const real",
            Op::ConstArray { .. } => "const array",
            Op::Add { .. } => "add",
            Op::Sub { .. } => "sub",
            Op::Mul { .. } => "mul",
            Op::Div { .. } => "div",
            Op::Mod { .. } => "mod",
            Op::Rem { .. } => "rem",
            Op::Exp { .. } => "exp",
            Op::Neg { .. } => "neg",
            Op::Abs { .. } => "abs",
            Op::Not { .. } => "not",
            Op::And { .. } => "and",
            Op::Or { .. } => "or",
            Op::Cmp { .. } => "cmp",
            Op::Cast { .. } => "cast",
            Op::Select { .. } => "select",
            Op::Wrap { .. } => "wrap",
            Op::Unwrap { .. } => "unwrap",
            Op::UarrayLen { .. } => "uarray len",
            Op::UarrayLeft { .. } => "uarray left",
            Op::UarrayRight { .. } => "uarray right",
            Op::UarrayDir { .. } => "uarray dir",
            Op::Load { .. } => "load",
            Op::Store { .. } => "store",
            Op::LoadIndirect { .. } => "load indirect",
            Op::StoreIndirect { .. } => "store indirect",
            Op::Index { .. } => "index",
            Op::Copy { .. } => "copy",
            Op::Alloca { .. } => "alloca",
            Op::Memcmp { .. } => "memcmp",
            Op::Jump { .. } => "jump",
            Op::Cond { .. } => "cond",
            Op::Case { .. } => "case",
            Op::Return { .. } => "return",
            Op::Bounds { .. } => "bounds",
            Op::DynamicBounds { .. } => "dynamic bounds",
            Op::IndexCheck { .. } => "index check",
            Op::Assert { .. } => "assert",
            Op::Report { .. } => "report",
            Op::Undefined { .. } => "undefined",
            Op::Image { .. } => "image",
            Op::Fcall { .. } => "fcall",
            Op::NestedFcall { .. } => "nested fcall",
            Op::HeapSave { .. } => "heap save",
            Op::HeapRestore { .. } => "heap restore",
        }
    }
}
