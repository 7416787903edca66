//! IR units and the unit registry
//!
//! A unit is a named container of basic blocks: a function body, a package
//! initialiser, or a throwaway thunk compiled for a single evaluation.
//! Units nest lexically through `context`; a unit at depth `d` can reach
//! variables of every enclosing unit at depths `0..d`.

use crate::ops::{BlockId, Op};
use crate::types::IrType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Kind of an IR unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    /// Function body
    Function,
    /// Stand-alone expression compiled to be evaluated once
    Thunk,
    /// Package declaration initialiser
    Package,
    /// Package body initialiser
    PackageBody,
    /// Elaborated process (never evaluated at compile time)
    Process,
}

/// Variable declaration within a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Var {
    /// Variable name for dumps and diagnostics
    pub name: String,
    /// Declared type, used to pre-initialise the storage slot
    pub ty: IrType,
    /// True when the storage lives outside the compile-time world; any
    /// access prevents folding
    pub extern_storage: bool,
}

/// Basic block: straight-line ops ended by a branch or return
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub ops: Vec<Op>,
}

/// A named IR container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Fully qualified dotted name, e.g. `work.pack.add1`
    pub name: String,
    /// What this unit is
    pub kind: UnitKind,
    /// Name of the lexically enclosing unit, if any
    pub context: Option<String>,
    /// Lexical depth: 0 for library-level units, +1 per enclosing unit
    pub depth: u32,
    /// Number of virtual registers used by the unit
    pub regs: u32,
    /// Variable declarations, densely indexed
    pub vars: Vec<Var>,
    /// Basic blocks; execution starts at block 0
    pub blocks: Vec<Block>,
}

impl Unit {
    /// The block with the given id
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }
}

/// Name-keyed store of lowered units
///
/// Insertion is idempotent: the first unit registered under a name wins,
/// so repeated library loads are harmless.
#[derive(Debug, Default)]
pub struct UnitRegistry {
    units: IndexMap<String, Arc<Unit>>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit under its own name; keeps any existing entry
    pub fn insert(&mut self, unit: Unit) -> Arc<Unit> {
        self.units
            .entry(unit.name.clone())
            .or_insert_with(|| Arc::new(unit))
            .clone()
    }

    /// Look up a unit by fully qualified name
    pub fn find(&self, name: &str) -> Option<Arc<Unit>> {
        self.units.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Iterate units in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Unit>> {
        self.units.values()
    }
}
