//! Activation records
//!
//! Each evaluation frame owns a context: dense register and variable
//! arrays sized from the unit being run. Variables are pre-initialised
//! from their declared type, with constrained-array storage carved out of
//! the shared heap at construction time. The parent link is materialised
//! lazily, the first time a variable reference escapes the current
//! lexical depth.

use crate::heap::Heap;
use crate::value::{UArray, Value};
use opal_ir::{IrType, Unit};
use std::sync::Arc;

/// Scope context for one running unit
#[derive(Debug)]
pub struct Context {
    /// The unit this context was sized from
    pub unit: Arc<Unit>,
    /// Transient SSA values, indexed by register id
    pub regs: Vec<Value>,
    /// Mutable locals and parameters, indexed by variable id
    pub vars: Vec<Value>,
    /// Enclosing scope, present once an outer variable has been touched
    pub parent: Option<Box<Context>>,
}

impl Context {
    /// Build a context for `unit`, allocating constrained-array storage
    /// from `heap`. Returns None when the heap ceiling is hit.
    pub fn new(unit: Arc<Unit>, heap: &mut Heap) -> Option<Self> {
        let regs = vec![Value::default(); unit.regs as usize];

        let mut vars = Vec::with_capacity(unit.vars.len());
        for var in &unit.vars {
            vars.push(initial_value(&var.ty, heap)?);
        }

        Some(Self {
            unit,
            regs,
            vars,
            parent: None,
        })
    }
}

/// Initial slot value for a declared variable type
fn initial_value(ty: &IrType, heap: &mut Heap) -> Option<Value> {
    let value = match ty {
        IrType::Int { .. } | IrType::Offset => Value::Integer(0),
        IrType::Real => Value::Real(0.0),
        IrType::Pointer(_) => Value::default(),
        IrType::Uarray { ndims, .. } => Value::UArray(UArray::empty(*ndims)),
        IrType::Carray { size, .. } => Value::CArray(heap.alloc(*size)?),
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_ir::{UnitBuilder, UnitKind};

    #[test]
    fn variables_are_preinitialised_by_type() {
        let mut b = UnitBuilder::new("work.pack", UnitKind::Package);
        b.add_var("i", IrType::Int { low: 0, high: 7 });
        b.add_var("r", IrType::Real);
        b.add_var(
            "u",
            IrType::Uarray { ndims: 2, elem: Box::new(IrType::int()) },
        );
        b.add_var(
            "c",
            IrType::Carray { size: 3, elem: Box::new(IrType::int()) },
        );
        b.ret(None);

        let mut heap = Heap::new();
        let ctx = Context::new(Arc::new(b.finish()), &mut heap).unwrap();

        assert_eq!(ctx.vars[0], Value::Integer(0));
        assert_eq!(ctx.vars[1], Value::Real(0.0));
        match &ctx.vars[2] {
            Value::UArray(u) => {
                assert_eq!(u.dims.len(), 2);
                assert!(u.dims.iter().all(|d| d.is_empty()));
            }
            other => panic!("expected uarray, got {:?}", other),
        }
        assert_eq!(ctx.vars[3], Value::CArray(0));
        assert_eq!(heap.used_cells(), 3);
    }

    #[test]
    fn carray_storage_respects_the_heap_ceiling() {
        let mut b = UnitBuilder::new("work.big", UnitKind::Package);
        b.add_var(
            "huge",
            IrType::Carray { size: 100_000, elem: Box::new(IrType::int()) },
        );
        b.ret(None);

        let mut heap = Heap::new();
        assert!(Context::new(Arc::new(b.finish()), &mut heap).is_none());
    }
}
