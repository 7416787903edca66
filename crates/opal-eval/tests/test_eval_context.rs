//! Scope-chain construction, on-demand library loading, and the tree
//! folder

use opal_eval::{
    Call, EvalFlags, Evaluator, Expr, ExprKind, Literal, Lowering, RefTarget, Severity, Type,
    UnitSource,
};
use opal_ir::{read_units, write_units, IrType, Loc, Unit, UnitBuilder, UnitKind};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

struct MapLowering {
    thunks: HashMap<String, Unit>,
}

impl MapLowering {
    fn single(func: &str, thunk: Unit) -> Box<Self> {
        let mut thunks = HashMap::new();
        thunks.insert(func.to_string(), thunk);
        Box::new(Self { thunks })
    }
}

impl Lowering for MapLowering {
    fn lower_thunk(&mut self, call: &Expr) -> Option<Unit> {
        let func = &call.as_call()?.func;
        self.thunks.get(func).cloned()
    }
}

fn loc() -> Loc {
    Loc::new("design.vhd", 12, 3)
}

fn int_type() -> Type {
    Type::universal_integer()
}

fn call_expr(func: &str, args: Vec<Expr>, ty: Type) -> Expr {
    Expr::new(
        ExprKind::Call(Call { func: func.to_string(), pure: true, args }),
        ty,
        loc(),
    )
}

fn fcall_flags() -> EvalFlags {
    EvalFlags { fcall: true, ..EvalFlags::default() }
}

fn call_thunk(func: &str) -> Unit {
    let mut t = UnitBuilder::new("thunk", UnitKind::Thunk);
    let r = t.fcall(func, Vec::new());
    t.ret(Some(r));
    t.finish()
}

/// Package body whose block 0 stores 42 into its variable
fn build_pack_body() -> Unit {
    let mut b = UnitBuilder::new("work.pack-body", UnitKind::PackageBody);
    let x = b.add_var("x", IrType::int());
    let v = b.const_int(42);
    b.store(x, v);
    b.ret(None);
    b.finish()
}

/// Function at depth 1 reading the package variable at depth 0
fn build_get_x() -> Unit {
    let mut b =
        UnitBuilder::new("work.pack.get_x", UnitKind::Function).with_context("work.pack-body", 1);
    let x = opal_ir::VarRef { depth: 0, index: 0 };
    let v = b.load(x);
    b.ret(Some(v));
    b.finish()
}

#[test]
fn outer_variables_materialise_the_parent_context() {
    let mut eval = Evaluator::new(MapLowering::single(
        "work.pack.get_x",
        call_thunk("work.pack.get_x"),
    ));
    eval.registry_mut().insert(build_pack_body());
    eval.registry_mut().insert(build_get_x());

    let expr = call_expr("work.pack.get_x", Vec::new(), int_type());
    let folded = eval.eval(expr, fcall_flags());

    assert_eq!(folded.kind, ExprKind::Literal(Literal::Int(42)));
}

#[test]
fn missing_context_units_prevent_folding() {
    let mut eval = Evaluator::new(MapLowering::single(
        "work.pack.get_x",
        call_thunk("work.pack.get_x"),
    ));
    eval.registry_mut().insert(build_get_x());

    let expr = call_expr("work.pack.get_x", Vec::new(), int_type());
    let out = eval.eval(
        expr.clone(),
        EvalFlags { fcall: true, warn: true, ..EvalFlags::default() },
    );

    assert_eq!(out, expr);
    assert!(eval
        .diagnostics()
        .iter()
        .any(|d| d.severity == Severity::Warning
            && d.message.contains("missing context unit work.pack-body")));
}

#[test]
fn extern_variables_prevent_folding() {
    let mut b = UnitBuilder::new("work.pack.get_ext", UnitKind::Function);
    let x = b.add_extern_var("shared_counter", IrType::int());
    let v = b.load(x);
    b.ret(Some(v));

    let mut eval = Evaluator::new(MapLowering::single(
        "work.pack.get_ext",
        call_thunk("work.pack.get_ext"),
    ));
    eval.registry_mut().insert(b.finish());

    let expr = call_expr("work.pack.get_ext", Vec::new(), int_type());
    let out = eval.eval(
        expr.clone(),
        EvalFlags { fcall: true, warn: true, ..EvalFlags::default() },
    );

    assert_eq!(out, expr);
    assert!(eval
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("external name shared_counter prevents")));
}

/// Library store serving serialised units, with a request log
struct JsonStore {
    shelves: HashMap<(String, String), Vec<u8>>,
    requests: Rc<RefCell<Vec<String>>>,
}

impl JsonStore {
    fn new(requests: Rc<RefCell<Vec<String>>>) -> Self {
        Self { shelves: HashMap::new(), requests }
    }

    fn shelve(&mut self, library: &str, unit: &str, units: &[Unit]) {
        let mut buf = Vec::new();
        write_units(&mut buf, units).unwrap();
        self.shelves
            .insert((library.to_string(), unit.to_string()), buf);
    }
}

impl UnitSource for JsonStore {
    fn load(&mut self, library: &str, unit: &str) -> Option<Vec<Unit>> {
        self.requests.borrow_mut().push(unit.to_string());
        let data = self
            .shelves
            .get(&(library.to_string(), unit.to_string()))?;
        Some(read_units(data.as_slice()).unwrap())
    }
}

fn build_package() -> Unit {
    let mut b = UnitBuilder::new("work.mathlib", UnitKind::Package);
    b.ret(None);
    b.finish()
}

fn build_inc() -> Unit {
    let mut b = UnitBuilder::new("work.mathlib.inc", UnitKind::Function);
    let x = b.param();
    let one = b.const_int(1);
    let r = b.add(x, one);
    b.ret(Some(r));
    b.finish()
}

#[test]
fn callees_load_from_the_library_with_package_bodies() {
    let requests = Rc::new(RefCell::new(Vec::new()));
    let mut store = JsonStore::new(requests.clone());
    store.shelve("work", "work.mathlib", &[build_package(), build_inc()]);
    let mut body = UnitBuilder::new("work.mathlib-body", UnitKind::PackageBody);
    body.ret(None);
    store.shelve("work", "work.mathlib-body", &[body.finish()]);

    let mut t = UnitBuilder::new("thunk", UnitKind::Thunk);
    let three = t.const_int(3);
    let r = t.fcall("work.mathlib.inc", vec![three]);
    t.ret(Some(r));

    let mut eval = Evaluator::new(MapLowering::single("work.mathlib.inc", t.finish()))
        .with_source(Box::new(store));

    let arg = Expr::int_literal(3, int_type(), loc());
    let expr = call_expr("work.mathlib.inc", vec![arg], int_type());
    let folded = eval.eval(
        expr.clone(),
        EvalFlags { fcall: true, lower: true, ..EvalFlags::default() },
    );

    assert_eq!(folded.kind, ExprKind::Literal(Literal::Int(4)));
    assert_eq!(*requests.borrow(), vec!["work.mathlib", "work.mathlib-body"]);
    assert!(eval.registry().find("work.mathlib.inc").is_some());
    assert!(eval.registry().find("work.mathlib-body").is_some());

    // a second evaluation hits the registry, not the store
    let folded = eval.eval(expr, EvalFlags { fcall: true, lower: true, ..EvalFlags::default() });
    assert_eq!(folded.kind, ExprKind::Literal(Literal::Int(4)));
    assert_eq!(requests.borrow().len(), 2);
}

#[test]
fn loads_are_gated_by_the_lower_flag() {
    let requests = Rc::new(RefCell::new(Vec::new()));
    let mut store = JsonStore::new(requests.clone());
    store.shelve("work", "work.mathlib", &[build_package(), build_inc()]);

    let mut t = UnitBuilder::new("thunk", UnitKind::Thunk);
    let three = t.const_int(3);
    let r = t.fcall("work.mathlib.inc", vec![three]);
    t.ret(Some(r));

    let mut eval = Evaluator::new(MapLowering::single("work.mathlib.inc", t.finish()))
        .with_source(Box::new(store));

    let arg = Expr::int_literal(3, int_type(), loc());
    let expr = call_expr("work.mathlib.inc", vec![arg], int_type());
    let out = eval.eval(expr.clone(), fcall_flags());

    assert_eq!(out, expr);
    assert!(requests.borrow().is_empty());
}

#[test]
fn fold_rewrites_calls_bottom_up() {
    // add1(add1(5)): the inner call folds first, so the outer call sees a
    // literal argument and folds too
    let mut b = UnitBuilder::new("work.pack.add1", UnitKind::Function);
    let x = b.param();
    let one = b.const_int(1);
    let sum = b.add(x, one);
    b.ret(Some(sum));

    let mut inner_thunk = UnitBuilder::new("thunk", UnitKind::Thunk);
    let five = inner_thunk.const_int(5);
    let r = inner_thunk.fcall("work.pack.add1", vec![five]);
    inner_thunk.ret(Some(r));

    let mut outer_thunk = UnitBuilder::new("thunk", UnitKind::Thunk);
    let six = outer_thunk.const_int(6);
    let r = outer_thunk.fcall("work.pack.add1", vec![six]);
    outer_thunk.ret(Some(r));

    // the folder asks for a thunk once per call site; serve the inner
    // expression first
    struct QueueLowering {
        thunks: Vec<Unit>,
    }
    impl Lowering for QueueLowering {
        fn lower_thunk(&mut self, _call: &Expr) -> Option<Unit> {
            if self.thunks.is_empty() {
                None
            } else {
                Some(self.thunks.remove(0))
            }
        }
    }

    let mut eval = Evaluator::new(Box::new(QueueLowering {
        thunks: vec![inner_thunk.finish(), outer_thunk.finish()],
    }));
    eval.registry_mut().insert(b.finish());

    let inner = call_expr(
        "work.pack.add1",
        vec![Expr::int_literal(5, int_type(), loc())],
        int_type(),
    );
    let mut expr = call_expr("work.pack.add1", vec![inner], int_type());
    eval.fold(&mut expr);

    assert_eq!(expr.kind, ExprKind::Literal(Literal::Int(7)));
}

#[test]
fn fold_substitutes_constant_and_unit_references() {
    let mut eval = Evaluator::new(MapLowering::single("unused", call_thunk("unused")));

    let mut constant = Expr::new(
        ExprKind::Ref(RefTarget::Const {
            name: "width".to_string(),
            value: Box::new(Expr::int_literal(8, int_type(), loc())),
        }),
        int_type(),
        loc(),
    );
    eval.fold(&mut constant);
    assert_eq!(constant.kind, ExprKind::Literal(Literal::Int(8)));

    let ns = Type::Physical {
        units: vec![opal_eval::PhysicalUnit { name: "ns".to_string(), multiplier: 1 }],
    };
    let mut unit_ref = Expr::new(
        ExprKind::Ref(RefTarget::PhysUnit {
            value: Box::new(Expr::int_literal(1_000_000, ns.clone(), loc())),
        }),
        ns,
        loc(),
    );
    eval.fold(&mut unit_ref);
    assert_eq!(unit_ref.kind, ExprKind::Literal(Literal::Int(1_000_000)));

    // a constant with a non-literal initializer stays put
    let mut opaque = Expr::new(
        ExprKind::Ref(RefTarget::Const {
            name: "depth".to_string(),
            value: Box::new(call_expr("work.pack.f", Vec::new(), int_type())),
        }),
        int_type(),
        loc(),
    );
    let before = opaque.clone();
    eval.fold(&mut opaque);
    assert_eq!(opaque, before);
}

#[test]
fn verbose_evaluations_note_their_results() {
    let mut b = UnitBuilder::new("work.pack.add1", UnitKind::Function);
    let x = b.param();
    let one = b.const_int(1);
    let sum = b.add(x, one);
    b.ret(Some(sum));

    let mut t = UnitBuilder::new("thunk", UnitKind::Thunk);
    let five = t.const_int(5);
    let r = t.fcall("work.pack.add1", vec![five]);
    t.ret(Some(r));

    let mut eval = Evaluator::new(MapLowering::single("work.pack.add1", t.finish()));
    eval.registry_mut().insert(b.finish());

    let arg = Expr::int_literal(5, int_type(), loc());
    let expr = call_expr("work.pack.add1", vec![arg], int_type());
    let folded = eval.eval(
        expr,
        EvalFlags { fcall: true, verbose: true, ..EvalFlags::default() },
    );

    assert_eq!(folded.kind, ExprKind::Literal(Literal::Int(6)));
    let notes: Vec<_> = eval
        .diagnostics()
        .iter()
        .filter(|d| d.severity == Severity::Note)
        .collect();
    assert!(notes
        .iter()
        .any(|d| d.message.contains("work.pack.add1 returned 6")));
}
