//! Opal IR - the register-transfer representation consumed by the
//! compile-time evaluator
//!
//! This crate defines:
//! - Typed IR units (functions, packages, thunks) made of basic blocks
//! - The operation set with its per-op side data
//! - An emit-style builder used by lowering and by tests
//! - serde persistence for units served from a library store

pub mod builder;
pub mod io;
pub mod ops;
pub mod span;
pub mod types;
pub mod unit;

pub use builder::UnitBuilder;
pub use io::{read_units, write_units, IrError};
pub use ops::{BlockId, BoundsKind, CmpKind, DimRegs, ImageKind, Op, RegId, VarRef};
pub use span::Loc;
pub use types::IrType;
pub use unit::{Block, Unit, UnitKind, UnitRegistry, Var};
