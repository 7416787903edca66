//! Syntax surface consumed by the folder
//!
//! The evaluator sees only the slice of the syntax tree it needs: call
//! sites, the literal forms it can reify, and the reference kinds the
//! syntactic pre-filter distinguishes. The real front-end owns the full
//! tree; these nodes are its contract with the folder.

use opal_ir::Loc;
use serde::{Deserialize, Serialize};

/// Source-level type of an expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    /// Integer subtype with an inclusive range
    Integer { low: i64, high: i64 },
    /// Floating-point type
    Real,
    /// Enumeration; literal identifiers indexed by position
    Enum { literals: Vec<String> },
    /// Physical type; base unit first
    Physical { units: Vec<PhysicalUnit> },
    /// Array type (never reified)
    Array { elem: Box<Type> },
}

/// A secondary unit declaration of a physical type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalUnit {
    pub name: String,
    /// Multiplier relative to the base unit
    pub multiplier: i64,
}

impl Type {
    /// Whether values of this type can be reified as a literal
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Type::Array { .. })
    }

    /// The predefined boolean enumeration
    pub fn boolean() -> Self {
        Type::Enum {
            literals: vec!["false".to_string(), "true".to_string()],
        }
    }

    /// An unbounded integer type
    pub fn universal_integer() -> Self {
        Type::Integer {
            low: i64::MIN,
            high: i64::MAX,
        }
    }
}

/// Literal forms the evaluator can produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Real(f64),
    /// Position of the literal within its enumeration type
    Enum(u32),
    /// String literal; appears in arguments, never in folded results
    String(String),
}

/// A function call expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Fully qualified name of the lowered callee unit
    pub func: String,
    /// False when the callee declaration bears an impurity flag
    pub pure: bool,
    pub args: Vec<Expr>,
}

/// Target of a name reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RefTarget {
    /// Constant declaration with its initializer
    Const { name: String, value: Box<Expr> },
    /// Enumeration literal
    EnumLit { index: u32 },
    /// Physical unit declaration with its value
    PhysUnit { value: Box<Expr> },
    /// Signal, variable or other object with no compile-time value
    Object { name: String },
}

/// Expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    Call(Call),
    /// Type conversion over a single argument
    Conversion(Box<Expr>),
    Ref(RefTarget),
    /// Aggregate expression (never folded through this path)
    Aggregate(Vec<Expr>),
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type, loc: Loc) -> Self {
        Self { kind, ty, loc }
    }

    pub fn int_literal(value: i64, ty: Type, loc: Loc) -> Self {
        Self::new(ExprKind::Literal(Literal::Int(value)), ty, loc)
    }

    pub fn real_literal(value: f64, ty: Type, loc: Loc) -> Self {
        Self::new(ExprKind::Literal(Literal::Real(value)), ty, loc)
    }

    pub fn enum_literal(index: u32, ty: Type, loc: Loc) -> Self {
        Self::new(ExprKind::Literal(Literal::Enum(index)), ty, loc)
    }

    /// Whether this node is a literal of any form
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(_))
    }

    /// The call payload, when this node is a call
    pub fn as_call(&self) -> Option<&Call> {
        match &self.kind {
            ExprKind::Call(call) => Some(call),
            _ => None,
        }
    }
}
