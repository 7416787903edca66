//! Emit-style construction of IR units
//!
//! The lowering pass builds units one op at a time through this builder;
//! tests use it to hand-construct callees and thunks. Emit methods append
//! to the currently selected block and return the result register.

use crate::ops::{BlockId, BoundsKind, CmpKind, DimRegs, ImageKind, Op, RegId, VarRef};
use crate::span::Loc;
use crate::types::IrType;
use crate::unit::{Block, Unit, UnitKind, Var};

/// Builder for a single IR unit
pub struct UnitBuilder {
    unit: Unit,
    current: usize,
    next_reg: u32,
}

impl UnitBuilder {
    /// Start a unit with an empty block 0 selected
    pub fn new(name: impl Into<String>, kind: UnitKind) -> Self {
        Self {
            unit: Unit {
                name: name.into(),
                kind,
                context: None,
                depth: 0,
                regs: 0,
                vars: Vec::new(),
                blocks: vec![Block::default()],
            },
            current: 0,
            next_reg: 0,
        }
    }

    /// Set the lexically enclosing unit and this unit's depth
    pub fn with_context(mut self, context: impl Into<String>, depth: u32) -> Self {
        self.unit.context = Some(context.into());
        self.unit.depth = depth;
        self
    }

    /// Append a new empty block
    pub fn add_block(&mut self) -> BlockId {
        self.unit.blocks.push(Block::default());
        BlockId(self.unit.blocks.len() as u32 - 1)
    }

    /// Redirect subsequent emits to `block`
    pub fn select_block(&mut self, block: BlockId) {
        assert!((block.0 as usize) < self.unit.blocks.len());
        self.current = block.0 as usize;
    }

    /// Allocate a fresh virtual register
    pub fn new_reg(&mut self) -> RegId {
        let reg = RegId(self.next_reg);
        self.next_reg += 1;
        reg
    }

    /// Allocate a parameter register; parameters occupy the first N
    /// registers in declaration order
    pub fn param(&mut self) -> RegId {
        self.new_reg()
    }

    /// Declare a variable of this unit
    pub fn add_var(&mut self, name: impl Into<String>, ty: IrType) -> VarRef {
        self.unit.vars.push(Var {
            name: name.into(),
            ty,
            extern_storage: false,
        });
        VarRef {
            depth: self.unit.depth,
            index: self.unit.vars.len() as u32 - 1,
        }
    }

    /// Declare a variable whose storage lives outside the compile-time world
    pub fn add_extern_var(&mut self, name: impl Into<String>, ty: IrType) -> VarRef {
        let var = self.add_var(name, ty);
        self.unit.vars.last_mut().unwrap().extern_storage = true;
        var
    }

    fn push(&mut self, op: Op) {
        self.unit.blocks[self.current].ops.push(op);
    }

    fn emit(&mut self, f: impl FnOnce(RegId) -> Op) -> RegId {
        let result = self.new_reg();
        self.push(f(result));
        result
    }

    pub fn comment(&mut self, text: impl Into<String>) {
        self.push(Op::Comment { text: text.into() });
    }

    pub fn const_int(&mut self, value: i64) -> RegId {
        self.emit(|result| Op::Const { result, value })
    }

    pub fn const_real(&mut self, value: f64) -> RegId {
        self.emit(|result| Op::ConstReal { result, value })
    }

    pub fn const_array(&mut self, values: Vec<RegId>) -> RegId {
        self.emit(|result| Op::ConstArray { result, values })
    }

    pub fn add(&mut self, lhs: RegId, rhs: RegId) -> RegId {
        self.emit(|result| Op::Add { result, lhs, rhs })
    }

    pub fn sub(&mut self, lhs: RegId, rhs: RegId) -> RegId {
        self.emit(|result| Op::Sub { result, lhs, rhs })
    }

    pub fn mul(&mut self, lhs: RegId, rhs: RegId) -> RegId {
        self.emit(|result| Op::Mul { result, lhs, rhs })
    }

    pub fn div(&mut self, lhs: RegId, rhs: RegId) -> RegId {
        self.emit(|result| Op::Div { result, lhs, rhs })
    }

    pub fn modulo(&mut self, lhs: RegId, rhs: RegId) -> RegId {
        self.emit(|result| Op::Mod { result, lhs, rhs })
    }

    pub fn rem(&mut self, lhs: RegId, rhs: RegId) -> RegId {
        self.emit(|result| Op::Rem { result, lhs, rhs })
    }

    pub fn exp(&mut self, lhs: RegId, rhs: RegId) -> RegId {
        self.emit(|result| Op::Exp { result, lhs, rhs })
    }

    pub fn neg(&mut self, arg: RegId) -> RegId {
        self.emit(|result| Op::Neg { result, arg })
    }

    pub fn abs(&mut self, arg: RegId) -> RegId {
        self.emit(|result| Op::Abs { result, arg })
    }

    pub fn not(&mut self, arg: RegId) -> RegId {
        self.emit(|result| Op::Not { result, arg })
    }

    pub fn and(&mut self, lhs: RegId, rhs: RegId) -> RegId {
        self.emit(|result| Op::And { result, lhs, rhs })
    }

    pub fn or(&mut self, lhs: RegId, rhs: RegId) -> RegId {
        self.emit(|result| Op::Or { result, lhs, rhs })
    }

    pub fn cmp(&mut self, kind: CmpKind, lhs: RegId, rhs: RegId) -> RegId {
        self.emit(|result| Op::Cmp { result, kind, lhs, rhs })
    }

    pub fn cast(&mut self, ty: IrType, arg: RegId) -> RegId {
        self.emit(|result| Op::Cast { result, ty, arg })
    }

    pub fn select(&mut self, test: RegId, if_true: RegId, if_false: RegId) -> RegId {
        self.emit(|result| Op::Select { result, test, if_true, if_false })
    }

    pub fn wrap(&mut self, data: RegId, dims: Vec<DimRegs>) -> RegId {
        self.emit(|result| Op::Wrap { result, data, dims })
    }

    pub fn unwrap(&mut self, arg: RegId) -> RegId {
        self.emit(|result| Op::Unwrap { result, arg })
    }

    pub fn uarray_len(&mut self, arg: RegId, dim: usize) -> RegId {
        self.emit(|result| Op::UarrayLen { result, arg, dim })
    }

    pub fn uarray_left(&mut self, arg: RegId, dim: usize) -> RegId {
        self.emit(|result| Op::UarrayLeft { result, arg, dim })
    }

    pub fn uarray_right(&mut self, arg: RegId, dim: usize) -> RegId {
        self.emit(|result| Op::UarrayRight { result, arg, dim })
    }

    pub fn uarray_dir(&mut self, arg: RegId, dim: usize) -> RegId {
        self.emit(|result| Op::UarrayDir { result, arg, dim })
    }

    pub fn load(&mut self, var: VarRef) -> RegId {
        self.emit(|result| Op::Load { result, var })
    }

    pub fn store(&mut self, var: VarRef, value: RegId) {
        self.push(Op::Store { var, value });
    }

    pub fn load_indirect(&mut self, ptr: RegId) -> RegId {
        self.emit(|result| Op::LoadIndirect { result, ptr })
    }

    pub fn store_indirect(&mut self, ptr: RegId, value: RegId) {
        self.push(Op::StoreIndirect { ptr, value });
    }

    pub fn index(&mut self, var: VarRef) -> RegId {
        self.emit(|result| Op::Index { result, var })
    }

    pub fn copy(&mut self, dst: RegId, src: RegId, count: RegId) {
        self.push(Op::Copy { dst, src, count });
    }

    pub fn alloca(&mut self, count: RegId) -> RegId {
        self.emit(|result| Op::Alloca { result, count })
    }

    pub fn memcmp(&mut self, lhs: RegId, rhs: RegId, count: RegId) -> RegId {
        self.emit(|result| Op::Memcmp { result, lhs, rhs, count })
    }

    pub fn jump(&mut self, target: BlockId) {
        self.push(Op::Jump { target });
    }

    pub fn cond(&mut self, test: RegId, if_true: BlockId, if_false: BlockId) {
        self.push(Op::Cond { test, if_true, if_false });
    }

    pub fn case(&mut self, test: RegId, default: BlockId, arms: Vec<(RegId, BlockId)>) {
        self.push(Op::Case { test, default, arms });
    }

    pub fn ret(&mut self, value: Option<RegId>) {
        self.push(Op::Return { value });
    }

    pub fn bounds(&mut self, value: RegId, ty: IrType, kind: BoundsKind, loc: Loc) {
        self.push(Op::Bounds { value, ty, kind, loc });
    }

    pub fn dynamic_bounds(
        &mut self,
        value: RegId,
        low: RegId,
        high: RegId,
        kind: BoundsKind,
        loc: Loc,
    ) {
        self.push(Op::DynamicBounds { value, low, high, kind, loc });
    }

    pub fn index_check(&mut self, low: RegId, high: RegId, ty: IrType, loc: Loc) {
        self.push(Op::IndexCheck { low, high, ty, loc });
    }

    pub fn assert(
        &mut self,
        test: RegId,
        severity: RegId,
        message: Option<(RegId, RegId)>,
        loc: Loc,
    ) {
        self.push(Op::Assert { test, severity, message, loc });
    }

    pub fn report(&mut self, severity: RegId, message: RegId, length: RegId, loc: Loc) {
        self.push(Op::Report { severity, message, length, loc });
    }

    pub fn undefined(&mut self) -> RegId {
        self.emit(|result| Op::Undefined { result })
    }

    pub fn image(&mut self, arg: RegId, kind: ImageKind, loc: Loc) -> RegId {
        self.emit(|result| Op::Image { result, arg, kind, loc })
    }

    pub fn fcall(&mut self, func: impl Into<String>, args: Vec<RegId>) -> RegId {
        let func = func.into();
        self.emit(|result| Op::Fcall { result, func, args })
    }

    pub fn nested_fcall(&mut self, func: impl Into<String>, args: Vec<RegId>) -> RegId {
        let func = func.into();
        self.emit(|result| Op::NestedFcall { result, func, args })
    }

    pub fn heap_save(&mut self) -> RegId {
        self.emit(|result| Op::HeapSave { result })
    }

    pub fn heap_restore(&mut self, arg: RegId) {
        self.push(Op::HeapRestore { arg });
    }

    /// Finish the unit, fixing its register count
    pub fn finish(mut self) -> Unit {
        self.unit.regs = self.next_reg;
        self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_blocks_and_registers() {
        let mut b = UnitBuilder::new("work.t", UnitKind::Function);
        let x = b.param();
        let one = b.const_int(1);
        let sum = b.add(x, one);
        b.ret(Some(sum));

        let unit = b.finish();
        assert_eq!(unit.regs, 3);
        assert_eq!(unit.blocks.len(), 1);
        assert_eq!(unit.blocks[0].ops.len(), 3);
        assert_eq!(
            unit.blocks[0].ops[2],
            Op::Return { value: Some(RegId(2)) }
        );
    }

    #[test]
    fn selects_blocks() {
        let mut b = UnitBuilder::new("work.t", UnitKind::Function);
        let test = b.const_int(0);
        let then_blk = b.add_block();
        let else_blk = b.add_block();
        b.cond(test, then_blk, else_blk);

        b.select_block(then_blk);
        let one = b.const_int(1);
        b.ret(Some(one));

        b.select_block(else_blk);
        let two = b.const_int(2);
        b.ret(Some(two));

        let unit = b.finish();
        assert_eq!(unit.blocks.len(), 3);
        assert!(matches!(unit.blocks[0].ops[1], Op::Cond { .. }));
        assert!(matches!(unit.blocks[1].ops[1], Op::Return { .. }));
    }
}
