//! Opal compile-time expression evaluator
//!
//! Folds side-effect-free calls and constant-bearing expressions down to
//! literal scalar values, so later passes see statically known constants
//! in place of call sites. The core is a small per-call virtual machine
//! over the lowered IR: it runs straight-line ops inside basic blocks,
//! branches between them, descends into callees, walks enclosing scopes,
//! and enforces bounds and assertion checks as it goes. Intermediate
//! aggregates live on a bump-allocated heap owned by the root evaluation.

mod call;
mod checks;
mod context;
mod image;
mod interp;

pub mod diag;
pub mod fold;
pub mod heap;
pub mod lower;
pub mod tree;
pub mod value;

pub use diag::{Diagnostic, Diagnostics, Severity};
pub use fold::{EvalFlags, Evaluator};
pub use heap::EVAL_HEAP;
pub use lower::{Lowering, UnitSource};
pub use tree::{Call, Expr, ExprKind, Literal, PhysicalUnit, RefTarget, Type};
pub use value::{Dim, RangeDir, UArray, Value, MAX_DIMS};
