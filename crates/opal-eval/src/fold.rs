//! Public entry points: single-call evaluation and whole-tree folding
//!
//! `Evaluator` is the long-lived session object. It owns the unit
//! registry, the diagnostics store with its error counter, and the
//! collaborator handles. `eval` folds one call site to a literal or hands
//! the node back untouched; `fold` rewrites every eligible node of a
//! tree bottom-up.

use crate::context::Context;
use crate::diag::{Diagnostic, Diagnostics};
use crate::heap::Heap;
use crate::interp::{Frame, Interp};
use crate::lower::{Lowering, UnitSource};
use crate::tree::{Expr, ExprKind, RefTarget, Type};
use crate::value::Value;
use opal_ir::UnitRegistry;
use std::env;
use std::sync::Arc;
use tracing::debug;

/// Option set controlling one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalFlags {
    /// Invoked from the folder: reject calls whose arguments are
    /// themselves scalar-returning calls
    pub fold: bool,
    /// Permit descending into function calls
    pub fcall: bool,
    /// Report bounds violations as errors
    pub bounds: bool,
    /// Warn whenever something prevents folding
    pub warn: bool,
    /// Permit folding through assertions and reports
    pub report: bool,
    /// Log each fold
    pub verbose: bool,
    /// Permit loading and lowering units from the library store
    pub lower: bool,
}

impl EvalFlags {
    /// Flags used by the tree folder
    pub fn for_folding() -> Self {
        Self {
            fold: true,
            fcall: true,
            lower: true,
            ..Self::default()
        }
    }
}

/// Compile-time evaluation session
pub struct Evaluator {
    registry: UnitRegistry,
    lowering: Box<dyn Lowering>,
    source: Option<Box<dyn UnitSource>>,
    diags: Diagnostics,
}

impl Evaluator {
    pub fn new(lowering: Box<dyn Lowering>) -> Self {
        Self {
            registry: UnitRegistry::new(),
            lowering,
            source: None,
            diags: Diagnostics::new(),
        }
    }

    /// Attach a library store serving persisted units
    pub fn with_source(mut self, source: Box<dyn UnitSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut UnitRegistry {
        &mut self.registry
    }

    /// Diagnostics recorded so far
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diags.records()
    }

    /// Number of error diagnostics issued by bounds reporting and failed
    /// assertions
    pub fn error_count(&self) -> usize {
        self.diags.error_count()
    }

    /// True when a contract violation was recorded; the driver must stop
    /// the compilation
    pub fn has_fatal(&self) -> bool {
        self.diags.has_fatal()
    }

    /// Fold every eligible node of `expr`, bottom-up
    pub fn fold(&mut self, expr: &mut Expr) {
        match &mut expr.kind {
            ExprKind::Call(call) => {
                for arg in &mut call.args {
                    self.fold(arg);
                }
            }
            ExprKind::Conversion(arg) => self.fold(arg),
            ExprKind::Aggregate(items) => {
                for item in items {
                    self.fold(item);
                }
            }
            ExprKind::Literal(_) | ExprKind::Ref(_) => {}
        }

        match &expr.kind {
            ExprKind::Call(_) => {
                *expr = self.eval(expr.clone(), EvalFlags::for_folding());
            }
            ExprKind::Ref(RefTarget::Const { value, .. }) if value.is_literal() => {
                *expr = (**value).clone();
            }
            ExprKind::Ref(RefTarget::PhysUnit { value }) => {
                *expr = (**value).clone();
            }
            _ => {}
        }
    }

    /// Evaluate one call site. Returns a literal of the call's type on
    /// success, or the original node when the call cannot be folded.
    pub fn eval(&mut self, expr: Expr, flags: EvalFlags) -> Expr {
        let func = match expr.as_call() {
            Some(call) => call.func.clone(),
            None => return expr,
        };
        if !expr.ty.is_scalar() {
            return expr;
        }

        let mut flags = flags;
        if env::var_os("OPAL_EVAL_VERBOSE").is_some() {
            flags.verbose = true;
            flags.warn = true;
            flags.bounds = true;
        }
        if flags.verbose {
            flags.warn = true;
        }

        if !self.eval_possible(&expr, flags) {
            return expr;
        }

        let Some(thunk) = self.lowering.lower_thunk(&expr) else {
            return expr;
        };

        let registry = &mut self.registry;
        let source = self.source.as_deref_mut().map(|s| s as &mut dyn UnitSource);
        let diags = &mut self.diags;

        let mut interp = Interp {
            registry,
            source,
            diags,
            heap: Heap::new(),
            flags,
            loc: expr.loc.clone(),
            origin: func.clone(),
            transfers: 0,
        };

        let Some(ctx) = Context::new(Arc::new(thunk), &mut interp.heap) else {
            let _ = interp
                .fail_warn("evaluation heap exhaustion prevents constant folding".to_string());
            return expr;
        };
        let mut frame = Frame::new(ctx);
        if interp.run(&mut frame).is_err() {
            return expr;
        }

        let Some(ret) = frame.result else {
            drop(interp);
            self.diags
                .fatal_at(&expr.loc, format!("thunk for {} did not return a value", func));
            return expr;
        };
        let value = frame.ctx.regs[ret.0 as usize].clone();

        debug!(func = func.as_str(), %value, "folded");
        if flags.verbose {
            drop(interp);
            self.diags
                .note_at(&expr.loc, format!("{} returned {}", func, value));
        }

        self.reify(expr, value)
    }

    /// Syntactic pre-filter: can this expression conceivably fold?
    fn eval_possible(&mut self, expr: &Expr, flags: EvalFlags) -> bool {
        match &expr.kind {
            ExprKind::Call(call) => {
                if !call.pure {
                    return false;
                }
                for arg in &call.args {
                    if !self.eval_possible(arg, flags) {
                        return false;
                    }
                    // a surviving scalar call would have been folded
                    // already by the bottom-up folder
                    if flags.fold && arg.as_call().is_some() && arg.ty.is_scalar() {
                        return false;
                    }
                }
                true
            }
            ExprKind::Literal(_) => true,
            ExprKind::Conversion(arg) => self.eval_possible(arg, flags),
            ExprKind::Ref(target) => match target {
                RefTarget::EnumLit { .. } | RefTarget::PhysUnit { .. } => true,
                RefTarget::Const { value, .. } => self.eval_possible(value, flags),
                RefTarget::Object { .. } => false,
            },
            ExprKind::Aggregate(_) => {
                if flags.warn {
                    self.diags
                        .warn_at(&expr.loc, "expression prevents constant folding".to_string());
                }
                false
            }
        }
    }

    /// Turn a scalar evaluation result into a literal node of the call's
    /// type
    fn reify(&mut self, expr: Expr, value: Value) -> Expr {
        match (&expr.ty, &value) {
            (Type::Enum { literals }, Value::Integer(i)) => {
                if *i < 0 || *i as usize >= literals.len() {
                    self.diags
                        .fatal_at(&expr.loc, format!("enum position {} has no literal", i));
                    return expr;
                }
                Expr::enum_literal(*i as u32, expr.ty.clone(), expr.loc.clone())
            }
            (Type::Integer { .. } | Type::Physical { .. }, Value::Integer(i)) => {
                Expr::int_literal(*i, expr.ty.clone(), expr.loc.clone())
            }
            (Type::Real, Value::Real(r)) => {
                Expr::real_literal(*r, expr.ty.clone(), expr.loc.clone())
            }
            _ => {
                self.diags.fatal_at(
                    &expr.loc,
                    format!("evaluation produced a non-scalar {} result", value.kind_name()),
                );
                expr
            }
        }
    }
}
