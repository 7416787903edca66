//! The IR interpreter
//!
//! A per-evaluation virtual machine: it executes straight-line ops inside
//! the currently selected block, follows branches iteratively, descends
//! into callees, and walks enclosing scopes to reach outer variables. Op
//! handlers live here (arithmetic, memory, control flow); bounds and
//! assertion checks are in `checks`, the call machinery in `call`, image
//! formatting in `image`.

use crate::context::Context;
use crate::diag::Diagnostics;
use crate::fold::EvalFlags;
use crate::heap::Heap;
use crate::lower::UnitSource;
use crate::value::{Dim, RangeDir, UArray, Value, MAX_DIMS};
use opal_ir::{BlockId, CmpKind, IrType, Loc, Op, RegId, Unit, UnitRegistry, VarRef};
use std::cmp::Ordering;
use std::mem;

/// Block transfers allowed per root evaluation before the fold is
/// abandoned as a runaway loop
pub(crate) const BLOCK_TRANSFER_LIMIT: usize = 1 << 16;

/// Why an evaluation stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Abort {
    /// The expression cannot be folded; the original call survives
    Fold,
    /// Contract violation; the driver must abort the compilation
    Fatal,
}

/// Outcome of a single op
pub(crate) enum Flow {
    Continue,
    Branch(BlockId),
    Return,
}

/// One activation of a unit
pub(crate) struct Frame {
    pub ctx: Context,
    pub block: usize,
    /// Register named by the return op, once reached
    pub result: Option<RegId>,
}

impl Frame {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            block: 0,
            result: None,
        }
    }
}

/// Shared state of one root evaluation and all its nested calls
pub(crate) struct Interp<'a> {
    pub registry: &'a mut UnitRegistry,
    pub source: Option<&'a mut dyn UnitSource>,
    pub diags: &'a mut Diagnostics,
    pub heap: Heap,
    pub flags: EvalFlags,
    /// Call-site bookmark for diagnostics
    pub loc: Loc,
    /// Name of the call being folded, for verbose output
    pub origin: String,
    pub transfers: usize,
}

impl<'a> Interp<'a> {
    /// Run `frame` until its unit returns
    pub fn run(&mut self, frame: &mut Frame) -> Result<(), Abort> {
        let unit = frame.ctx.unit.clone();
        loop {
            let mut branch = None;
            for op in &unit.blocks[frame.block].ops {
                match self.step(op, frame)? {
                    Flow::Continue => {}
                    Flow::Branch(target) => {
                        branch = Some(target);
                        break;
                    }
                    Flow::Return => return Ok(()),
                }
            }

            let Some(target) = branch else {
                return Err(self.fatal(format!(
                    "block {} of {} has no terminator",
                    frame.block, unit.name
                )));
            };
            if target.0 as usize >= unit.blocks.len() {
                return Err(self.fatal(format!(
                    "branch to missing block {} in {}",
                    target.0, unit.name
                )));
            }

            self.transfers += 1;
            if self.transfers > BLOCK_TRANSFER_LIMIT {
                return Err(
                    self.fail_warn("iteration limit prevents constant folding".to_string())
                );
            }
            frame.block = target.0 as usize;
        }
    }

    fn step(&mut self, op: &Op, frame: &mut Frame) -> Result<Flow, Abort> {
        match op {
            Op::Comment { .. } | Op::HeapSave { .. } | Op::HeapRestore { .. } => {}

            Op::Const { result, value } => {
                Self::write(frame, *result, Value::Integer(*value));
            }

            Op::ConstReal { result, value } => {
                Self::write(frame, *result, Value::Real(*value));
            }

            Op::ConstArray { result, values } => {
                let base = self.alloc(values.len())?;
                for (i, value) in values.iter().enumerate() {
                    let cell = Self::read(frame, *value).clone();
                    self.heap_write(base + i, cell)?;
                }
                Self::write(frame, *result, Value::Pointer(base));
            }

            Op::Add { result, lhs, rhs } => {
                let value = match (Self::read(frame, *lhs), Self::read(frame, *rhs)) {
                    (Value::Integer(a), Value::Integer(b)) => Value::Integer(a.wrapping_add(*b)),
                    (Value::Real(a), Value::Real(b)) => Value::Real(a + b),
                    // pointer arithmetic advances by value slots
                    (Value::Pointer(p), Value::Integer(n)) => {
                        Value::Pointer((*p as i64).wrapping_add(*n) as usize)
                    }
                    _ => return Err(self.invalid_operands(op)),
                };
                Self::write(frame, *result, value);
            }

            Op::Sub { result, lhs, rhs } => {
                let value = match (Self::read(frame, *lhs), Self::read(frame, *rhs)) {
                    (Value::Integer(a), Value::Integer(b)) => Value::Integer(a.wrapping_sub(*b)),
                    (Value::Real(a), Value::Real(b)) => Value::Real(a - b),
                    _ => return Err(self.invalid_operands(op)),
                };
                Self::write(frame, *result, value);
            }

            Op::Mul { result, lhs, rhs } => {
                let value = match (Self::read(frame, *lhs), Self::read(frame, *rhs)) {
                    (Value::Integer(a), Value::Integer(b)) => Value::Integer(a.wrapping_mul(*b)),
                    (Value::Real(a), Value::Real(b)) => Value::Real(a * b),
                    _ => return Err(self.invalid_operands(op)),
                };
                Self::write(frame, *result, value);
            }

            Op::Div { result, lhs, rhs } => {
                let value = match (Self::read(frame, *lhs), Self::read(frame, *rhs)) {
                    (Value::Integer(a), Value::Integer(b)) => {
                        if *b == 0 {
                            return Err(self.fatal("division by zero".to_string()));
                        }
                        Value::Integer(a.wrapping_div(*b))
                    }
                    (Value::Real(a), Value::Real(b)) => Value::Real(a / b),
                    _ => return Err(self.invalid_operands(op)),
                };
                Self::write(frame, *result, value);
            }

            Op::Mod { result, lhs, rhs } => {
                let (a, b) = self.int_operands(frame, *lhs, *rhs, op)?;
                if b == 0 {
                    return Err(self.fatal("division by zero".to_string()));
                }
                Self::write(frame, *result, Value::Integer(a.wrapping_rem(b).wrapping_abs()));
            }

            Op::Rem { result, lhs, rhs } => {
                let (a, b) = self.int_operands(frame, *lhs, *rhs, op)?;
                if b == 0 {
                    return Err(self.fatal("division by zero".to_string()));
                }
                Self::write(frame, *result, Value::Integer(a.wrapping_rem(b)));
            }

            Op::Exp { result, lhs, rhs } => {
                let value = match (Self::read(frame, *lhs), Self::read(frame, *rhs)) {
                    (Value::Real(a), Value::Real(b)) => Value::Real(a.powf(*b)),
                    (Value::Integer(_), _) | (_, Value::Integer(_)) => {
                        return Err(self.fail_warn(
                            "integer exponentiation prevents constant folding".to_string(),
                        ))
                    }
                    _ => return Err(self.invalid_operands(op)),
                };
                Self::write(frame, *result, value);
            }

            Op::Neg { result, arg } => {
                let value = match Self::read(frame, *arg) {
                    Value::Integer(a) => Value::Integer(a.wrapping_neg()),
                    Value::Real(a) => Value::Real(-a),
                    _ => return Err(self.invalid_operands(op)),
                };
                Self::write(frame, *result, value);
            }

            Op::Abs { result, arg } => {
                let value = match Self::read(frame, *arg) {
                    Value::Integer(a) => Value::Integer(a.wrapping_abs()),
                    Value::Real(a) => Value::Real(a.abs()),
                    _ => return Err(self.invalid_operands(op)),
                };
                Self::write(frame, *result, value);
            }

            Op::Not { result, arg } => {
                let a = self.int_reg(frame, *arg, op)?;
                Self::write(frame, *result, Value::Integer((a == 0) as i64));
            }

            Op::And { result, lhs, rhs } => {
                let (a, b) = self.int_operands(frame, *lhs, *rhs, op)?;
                Self::write(frame, *result, Value::Integer(a & b));
            }

            Op::Or { result, lhs, rhs } => {
                let (a, b) = self.int_operands(frame, *lhs, *rhs, op)?;
                Self::write(frame, *result, Value::Integer(a | b));
            }

            Op::Cmp { result, kind, lhs, rhs } => {
                let lhs = Self::read(frame, *lhs).clone();
                let rhs = Self::read(frame, *rhs).clone();
                let ord = self.value_cmp(&lhs, &rhs)?;
                let holds = match kind {
                    CmpKind::Eq => ord == Ordering::Equal,
                    CmpKind::Neq => ord != Ordering::Equal,
                    CmpKind::Lt => ord == Ordering::Less,
                    CmpKind::Leq => ord != Ordering::Greater,
                    CmpKind::Gt => ord == Ordering::Greater,
                    CmpKind::Geq => ord != Ordering::Less,
                };
                Self::write(frame, *result, Value::Integer(holds as i64));
            }

            Op::Cast { result, ty, arg } => {
                let src = Self::read(frame, *arg).clone();
                let value = match ty {
                    IrType::Int { .. } | IrType::Offset => match src {
                        Value::Integer(_) => src,
                        Value::Real(r) => Value::Integer(r.trunc() as i64),
                        other => {
                            return Err(self.fail_warn(format!(
                                "cast of {} value prevents constant folding",
                                other.kind_name()
                            )))
                        }
                    },
                    IrType::Real => match src {
                        Value::Real(_) => src,
                        Value::Integer(i) => Value::Real(i as f64),
                        other => {
                            return Err(self.fail_warn(format!(
                                "cast of {} value prevents constant folding",
                                other.kind_name()
                            )))
                        }
                    },
                    _ => return Err(self.fatal("invalid destination type in cast".to_string())),
                };
                Self::write(frame, *result, value);
            }

            Op::Select { result, test, if_true, if_false } => {
                let test = self.int_reg(frame, *test, op)?;
                let chosen = if test != 0 { *if_true } else { *if_false };
                let value = Self::read(frame, chosen).clone();
                Self::write(frame, *result, value);
            }

            Op::Wrap { result, data, dims } => {
                let base = self.pointer_reg(frame, *data, op)?;
                if dims.is_empty() {
                    return Err(self.fatal("wrap without dimensions".to_string()));
                }
                if dims.len() > MAX_DIMS {
                    return Err(self.fail_warn(format!(
                        "{} dimensional array prevents constant folding",
                        dims.len()
                    )));
                }
                let mut out = Vec::with_capacity(dims.len());
                for d in dims {
                    let left = self.int_reg(frame, d.left, op)?;
                    let right = self.int_reg(frame, d.right, op)?;
                    let dir = self.int_reg(frame, d.dir, op)?;
                    out.push(Dim {
                        left,
                        right,
                        dir: RangeDir::from_integer(dir),
                    });
                }
                Self::write(frame, *result, Value::UArray(UArray { data: base, dims: out }));
            }

            Op::Unwrap { result, arg } => {
                let data = self.uarray_reg(frame, *arg, op)?.data;
                Self::write(frame, *result, Value::Pointer(data));
            }

            Op::UarrayLen { result, arg, dim } => {
                let d = self.uarray_dim(frame, *arg, *dim, op)?;
                Self::write(frame, *result, Value::Integer(d.len()));
            }

            Op::UarrayLeft { result, arg, dim } => {
                let d = self.uarray_dim(frame, *arg, *dim, op)?;
                Self::write(frame, *result, Value::Integer(d.left));
            }

            Op::UarrayRight { result, arg, dim } => {
                let d = self.uarray_dim(frame, *arg, *dim, op)?;
                Self::write(frame, *result, Value::Integer(d.right));
            }

            Op::UarrayDir { result, arg, dim } => {
                let d = self.uarray_dim(frame, *arg, *dim, op)?;
                Self::write(frame, *result, Value::Integer(d.dir.to_integer()));
            }

            Op::Load { result, var } => {
                let value = self.var_slot(&mut frame.ctx, var)?.clone();
                Self::write(frame, *result, value);
            }

            Op::Store { var, value } => {
                let value = Self::read(frame, *value).clone();
                *self.var_slot(&mut frame.ctx, var)? = value;
            }

            Op::LoadIndirect { result, ptr } => {
                let addr = self.pointer_reg(frame, *ptr, op)?;
                let value = self.heap_read(addr)?;
                Self::write(frame, *result, value);
            }

            Op::StoreIndirect { ptr, value } => {
                let addr = self.pointer_reg(frame, *ptr, op)?;
                let value = Self::read(frame, *value).clone();
                self.heap_write(addr, value)?;
            }

            Op::Index { result, var } => {
                let slot = self.var_slot(&mut frame.ctx, var)?;
                let Value::CArray(base) = *slot else {
                    return Err(self.fatal("index of a non-array variable".to_string()));
                };
                Self::write(frame, *result, Value::Pointer(base));
            }

            Op::Copy { dst, src, count } => {
                let to = self.pointer_reg(frame, *dst, op)?;
                let from = self.pointer_reg(frame, *src, op)?;
                let count = self.int_reg(frame, *count, op)?.max(0) as usize;
                for i in 0..count {
                    let value = self.heap_read(from + i)?;
                    self.heap_write(to + i, value)?;
                }
            }

            Op::Alloca { result, count } => {
                let count = self.int_reg(frame, *count, op)?.max(0) as usize;
                let base = self.alloc(count)?;
                Self::write(frame, *result, Value::Pointer(base));
            }

            Op::Memcmp { result, lhs, rhs, count } => {
                let a = self.pointer_reg(frame, *lhs, op)?;
                let b = self.pointer_reg(frame, *rhs, op)?;
                let count = self.int_reg(frame, *count, op)?.max(0) as usize;
                let mut equal = true;
                for i in 0..count {
                    let x = self.heap_read(a + i)?;
                    let y = self.heap_read(b + i)?;
                    if self.value_cmp(&x, &y)? != Ordering::Equal {
                        equal = false;
                        break;
                    }
                }
                Self::write(frame, *result, Value::Integer(equal as i64));
            }

            Op::Jump { target } => return Ok(Flow::Branch(*target)),

            Op::Cond { test, if_true, if_false } => {
                let test = self.int_reg(frame, *test, op)?;
                let target = if test != 0 { *if_true } else { *if_false };
                return Ok(Flow::Branch(target));
            }

            Op::Case { test, default, arms } => {
                let test = Self::read(frame, *test).clone();
                let mut target = *default;
                for (value, block) in arms {
                    let arm = Self::read(frame, *value).clone();
                    if self.value_cmp(&test, &arm)? == Ordering::Equal {
                        target = *block;
                        break;
                    }
                }
                return Ok(Flow::Branch(target));
            }

            Op::Return { value } => {
                frame.result = *value;
                return Ok(Flow::Return);
            }

            Op::Bounds { value, ty, kind, loc } => {
                self.op_bounds(frame, *value, ty, *kind, loc)?;
            }

            Op::DynamicBounds { value, low, high, kind, loc } => {
                self.op_dynamic_bounds(frame, *value, *low, *high, *kind, loc)?;
            }

            Op::IndexCheck { low, high, ty, loc } => {
                self.op_index_check(frame, *low, *high, ty, loc)?;
            }

            Op::Assert { test, severity, message, loc } => {
                self.op_assert(frame, *test, *severity, *message, loc)?;
            }

            Op::Report { severity, message, length, loc } => {
                self.op_report(frame, *severity, *message, *length, loc)?;
            }

            Op::Undefined { .. } => {
                return Err(self.fail_warn(
                    "reference to object without defined value in this phase \
                     prevents constant folding"
                        .to_string(),
                ));
            }

            Op::Image { result, arg, kind, loc } => {
                self.op_image(frame, *result, *arg, kind, loc)?;
            }

            Op::Fcall { result, func, args } => {
                if !self.flags.fcall {
                    return Err(Abort::Fold);
                }
                self.op_fcall(frame, *result, func, args)?;
            }

            Op::NestedFcall { .. } => {
                return Err(self.fail_warn(format!(
                    "cannot evaluate {} op",
                    op.name()
                )));
            }
        }

        Ok(Flow::Continue)
    }

    // --- register and heap access ------------------------------------

    pub(crate) fn read(frame: &Frame, reg: RegId) -> &Value {
        &frame.ctx.regs[reg.0 as usize]
    }

    pub(crate) fn write(frame: &mut Frame, reg: RegId, value: Value) {
        frame.ctx.regs[reg.0 as usize] = value;
    }

    pub(crate) fn int_reg(&mut self, frame: &Frame, reg: RegId, op: &Op) -> Result<i64, Abort> {
        match Self::read(frame, reg) {
            Value::Integer(i) => Ok(*i),
            other => {
                let kind = other.kind_name();
                Err(self.fatal(format!("expected integer, not {}, in {} op", kind, op.name())))
            }
        }
    }

    pub(crate) fn pointer_reg(
        &mut self,
        frame: &Frame,
        reg: RegId,
        op: &Op,
    ) -> Result<usize, Abort> {
        match Self::read(frame, reg) {
            Value::Pointer(p) => Ok(*p),
            other => {
                let kind = other.kind_name();
                Err(self.fatal(format!("expected pointer, not {}, in {} op", kind, op.name())))
            }
        }
    }

    fn uarray_reg<'f>(
        &mut self,
        frame: &'f Frame,
        reg: RegId,
        op: &Op,
    ) -> Result<&'f UArray, Abort> {
        match Self::read(frame, reg) {
            Value::UArray(u) => Ok(u),
            other => {
                let kind = other.kind_name();
                Err(self.fatal(format!("expected uarray, not {}, in {} op", kind, op.name())))
            }
        }
    }

    fn uarray_dim(&mut self, frame: &Frame, reg: RegId, dim: usize, op: &Op) -> Result<Dim, Abort> {
        let ndims = self.uarray_reg(frame, reg, op)?.dims.len();
        if dim >= ndims {
            return Err(self.fatal(format!("dimension {} out of range in {} op", dim, op.name())));
        }
        Ok(self.uarray_reg(frame, reg, op)?.dims[dim])
    }

    fn int_operands(
        &mut self,
        frame: &Frame,
        lhs: RegId,
        rhs: RegId,
        op: &Op,
    ) -> Result<(i64, i64), Abort> {
        match (Self::read(frame, lhs), Self::read(frame, rhs)) {
            (Value::Integer(a), Value::Integer(b)) => Ok((*a, *b)),
            _ => Err(self.invalid_operands(op)),
        }
    }

    pub(crate) fn heap_read(&mut self, addr: usize) -> Result<Value, Abort> {
        if let Some(value) = self.heap.get(addr) {
            Ok(value.clone())
        } else {
            Err(self.fatal(format!("heap access out of range at {}", addr)))
        }
    }

    pub(crate) fn heap_write(&mut self, addr: usize, value: Value) -> Result<(), Abort> {
        if let Some(cell) = self.heap.get_mut(addr) {
            *cell = value;
            Ok(())
        } else {
            Err(self.fatal(format!("heap access out of range at {}", addr)))
        }
    }

    /// Bump-allocate `count` cells; a hit on the ceiling prevents folding
    pub(crate) fn alloc(&mut self, count: usize) -> Result<usize, Abort> {
        if let Some(base) = self.heap.alloc(count) {
            Ok(base)
        } else {
            let used = self.heap.used_bytes();
            Err(self.fail_warn(format!(
                "evaluation heap exhaustion prevents constant folding \
                 ({} bytes allocated, {} requested)",
                used,
                count * mem::size_of::<Value>()
            )))
        }
    }

    // --- scope walking ------------------------------------------------

    /// Resolve a variable reference, materialising parent contexts as
    /// needed
    pub(crate) fn var_slot<'c>(
        &mut self,
        ctx: &'c mut Context,
        var: &VarRef,
    ) -> Result<&'c mut Value, Abort> {
        match var.depth.cmp(&ctx.unit.depth) {
            Ordering::Equal => {
                let Some(decl) = ctx.unit.vars.get(var.index as usize) else {
                    return Err(self.fatal(format!(
                        "variable {} out of range in {}",
                        var.index, ctx.unit.name
                    )));
                };
                if decl.extern_storage {
                    let name = decl.name.clone();
                    return Err(self.fail_warn(format!(
                        "reference to external name {} prevents constant folding",
                        name
                    )));
                }
                Ok(&mut ctx.vars[var.index as usize])
            }
            Ordering::Less => {
                if ctx.parent.is_none() {
                    let unit = ctx.unit.clone();
                    let parent = self.materialise_parent(&unit)?;
                    ctx.parent = Some(Box::new(parent));
                }
                self.var_slot(ctx.parent.as_mut().unwrap(), var)
            }
            Ordering::Greater => Err(self.fatal(format!(
                "variable at depth {} referenced from unit {} at depth {}",
                var.depth, ctx.unit.name, ctx.unit.depth
            ))),
        }
    }

    /// Build the enclosing unit's context by running its block 0
    fn materialise_parent(&mut self, unit: &Unit) -> Result<Context, Abort> {
        let Some(context_name) = unit.context.as_deref() else {
            return Err(self.fatal(format!("unit {} has no enclosing context", unit.name)));
        };
        let Some(parent_unit) = self.registry.find(context_name) else {
            return Err(self.fail_warn(format!(
                "missing context unit {} prevents constant folding",
                context_name
            )));
        };
        let Some(ctx) = Context::new(parent_unit, &mut self.heap) else {
            return Err(self.fail_warn(
                "evaluation heap exhaustion prevents constant folding".to_string(),
            ));
        };
        let mut frame = Frame::new(ctx);
        self.run(&mut frame)?;
        Ok(frame.ctx)
    }

    // --- comparison and failure helpers -------------------------------

    /// Ordering over the three comparable kinds; reals use IEEE ordering,
    /// mixed tags are an IR type violation
    pub(crate) fn value_cmp(&mut self, lhs: &Value, rhs: &Value) -> Result<Ordering, Abort> {
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
            (Value::Real(a), Value::Real(b)) => match a.partial_cmp(b) {
                Some(ord) => Ok(ord),
                // NaN operands compare unordered
                None => Err(self.fail_warn(
                    "unordered real comparison prevents constant folding".to_string(),
                )),
            },
            (Value::Pointer(a), Value::Pointer(b)) => Ok(a.cmp(b)),
            _ => Err(self.fatal(format!(
                "cannot compare {} and {} values",
                lhs.kind_name(),
                rhs.kind_name()
            ))),
        }
    }

    fn invalid_operands(&mut self, op: &Op) -> Abort {
        self.fatal(format!("invalid operand kinds in {} op", op.name()))
    }

    /// Record a contract violation and unwind fatally
    pub(crate) fn fatal(&mut self, message: String) -> Abort {
        self.diags.fatal_at(&self.loc, message);
        Abort::Fatal
    }

    /// Give up on the fold, warning when the caller asked for warnings
    pub(crate) fn fail_warn(&mut self, message: String) -> Abort {
        if self.flags.warn {
            self.diags.warn_at(&self.loc, message);
        }
        Abort::Fold
    }
}
