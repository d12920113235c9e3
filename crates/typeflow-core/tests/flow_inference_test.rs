//! Tests for flow-sensitive inference inside a single routine
//!
//! Bodies are assembled with `BodyBuilder`, the same way a front end lowers
//! source code, and checked through the public results: displayed masks of
//! expressions and return values, flags and routine effects.

use std::sync::Once;
use typeflow_core::bound::{BoundExpr, ClassRef, StaticVar};
use typeflow_core::prelude::*;

static TRACING: Once = Once::new();

/// Route analysis logs to the test output (`RUST_LOG=typeflow_core=trace`)
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Helper to run inference on one body and return its results
fn infer(body: RoutineBody, table: &SymbolTable) -> InferredRoutine {
    init_tracing();
    FlowTypeInferencer::new()
        .infer_routine(&body, table)
        .expect("Type inference failed")
}

/// Helper to declare a parameterless function and start its body
fn function(table: &mut SymbolTable, name: &str) -> BodyBuilder {
    let id = table.declare_function(RoutineSymbol::function(name));
    BodyBuilder::new(id, RoutineKind::Function)
}

// ============================================================================
// Merging and soundness
// ============================================================================

#[test]
fn test_branches_merge_into_union() {
    let mut table = SymbolTable::new();
    let id = table.declare_function(RoutineSymbol::function("pick").param(ParamSymbol::new("flag")));
    let mut b = BodyBuilder::new(id, RoutineKind::Function);
    let flag = b.param("flag");
    let x = b.local("x");
    let condition = b.var(flag);
    let one = b.long(1);
    let text = b.string("one");
    let to_long = b.assign_var(x, one);
    let to_string = b.assign_var(x, text);
    let result = b.var(x);
    let body = b.build(&[
        Stmt::If {
            condition,
            then_body: vec![Stmt::Expr(to_long)],
            else_body: vec![Stmt::Expr(to_string)],
        },
        Stmt::Return(Some(result)),
    ]);

    let inferred = infer(body, &table);
    insta::assert_snapshot!(inferred.result_display(), @"long|string");
    assert!(!inferred.is_maybe_uninitialized(result));
    assert_eq!(inferred.result_mask().type_count(), 2);
}

#[test]
fn test_assignment_on_one_path_is_maybe_uninitialized() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "partial");
    let flag = b.param("flag");
    let x = b.local("x");
    let condition = b.var(flag);
    let one = b.long(1);
    let assign = b.assign_var(x, one);
    let read = b.var(x);
    let body = b.build(&[
        Stmt::If {
            condition,
            then_body: vec![Stmt::Expr(assign)],
            else_body: vec![],
        },
        Stmt::Return(Some(read)),
    ]);

    let inferred = infer(body, &table);
    assert!(inferred.is_maybe_uninitialized(read));
    assert_eq!(inferred.result_display(), "null|long");
}

#[test]
fn test_falling_off_the_end_returns_void() {
    let mut table = SymbolTable::new();
    let b = function(&mut table, "noop");
    let inferred = infer(b.build(&[]), &table);
    assert_eq!(inferred.result_display(), "null|void");
    assert!(inferred.result_mask().is_void());
}

#[test]
fn test_empty_array_literal_has_no_element_types() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "make");
    let empty = b.array(vec![]);
    let body = b.build(&[Stmt::Return(Some(empty))]);
    assert_eq!(infer(body, &table).result_display(), "[]");
}

#[test]
fn test_appending_grows_element_type() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "collect");
    let items = b.local("items");
    let empty = b.array(vec![]);
    let init = b.assign_var(items, empty);
    let target = b.var(items);
    let slot = b.item(target, None);
    let one = b.long(1);
    let append = b.assign(slot, one);
    let result = b.var(items);
    let body = b.build(&[Stmt::Expr(init), Stmt::Expr(append), Stmt::Return(Some(result))]);

    assert_eq!(infer(body, &table).result_display(), "long[]");
}

// ============================================================================
// Loops
// ============================================================================

#[test]
fn test_bounded_loop_counter_stays_long() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "count");
    let i = b.local("i");
    let zero = b.long(0);
    let init = b.assign_var(i, zero);
    let counter = b.var(i);
    let limit = b.long(10);
    let condition = b.binary(BinaryOp::Less, counter, limit);
    let step_target = b.var(i);
    let step = b.post_inc(step_target);
    let result = b.var(i);
    let body = b.build(&[
        Stmt::For {
            init: vec![init],
            condition: Some(condition),
            step: vec![step],
            body: vec![],
        },
        Stmt::Return(Some(result)),
    ]);

    let inferred = infer(body, &table);
    assert_eq!(inferred.result_display(), "long");
    assert_eq!(inferred.expr_display(step), "long");
}

#[test]
fn test_unbounded_increment_may_overflow_to_double() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "spin");
    let flag = b.param("flag");
    let i = b.local("i");
    let zero = b.long(0);
    let init = b.assign_var(i, zero);
    let condition = b.var(flag);
    let target = b.var(i);
    let step = b.post_inc(target);
    let result = b.var(i);
    let body = b.build(&[
        Stmt::Expr(init),
        Stmt::While {
            condition,
            body: vec![Stmt::Expr(step)],
        },
        Stmt::Return(Some(result)),
    ]);

    let inferred = infer(body, &table);
    assert_eq!(inferred.result_display(), "long|double");
}

#[test]
fn test_loop_body_is_revisited_until_stable() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "widen");
    let flag = b.param("flag");
    let x = b.local("x");
    let zero = b.long(0);
    let init = b.assign_var(x, zero);
    let condition = b.var(flag);
    let text = b.string("s");
    let widen = b.assign_var(x, text);
    let read = b.var(x);
    let body = b.build(&[
        Stmt::Expr(init),
        Stmt::While {
            condition,
            body: vec![Stmt::Echo(vec![read]), Stmt::Expr(widen)],
        },
    ]);

    let inferred = infer(body, &table);
    assert_eq!(inferred.expr_display(read), "long|string");
    let visits: usize = (0..8).map(|i| inferred.block_visits(BlockId(i))).sum();
    assert!(visits > 4, "loop blocks should be visited more than once, got {visits}");
}

#[test]
fn test_foreach_binds_key_and_value() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "walk");
    let k = b.local("k");
    let v = b.local("v");
    let one = b.long(1);
    let two = b.long(2);
    let items = b.array(vec![one, two]);
    let key = b.var(k);
    let value = b.var(v);
    let key_read = b.var(k);
    let value_read = b.var(v);
    let body = b.build(&[Stmt::Foreach {
        enumeree: items,
        key: Some(key),
        value,
        by_ref: false,
        body: vec![Stmt::Echo(vec![key_read, value_read])],
    }]);

    let inferred = infer(body, &table);
    assert_eq!(inferred.expr_display(items), "long[]");
    assert_eq!(inferred.expr_display(key_read), "long|string");
    assert_eq!(inferred.expr_display(value_read), "long");
    assert!(!inferred.is_maybe_uninitialized(value_read));
}

/// Helper to build two nested counting loops that keep widening `$x`
fn nested_loops(table: &mut SymbolTable) -> RoutineBody {
    let mut b = function(table, "nested");
    let i = b.local("i");
    let j = b.local("j");
    let x = b.local("x");
    let y = b.local("y");
    let one = b.long(1);
    let init_x = b.assign_var(x, one);

    let zero = b.long(0);
    let init_i = b.assign_var(i, zero);
    let outer_counter = b.var(i);
    let outer_limit = b.long(10);
    let outer_condition = b.binary(BinaryOp::Less, outer_counter, outer_limit);
    let outer_target = b.var(i);
    let outer_step = b.post_inc(outer_target);

    let zero = b.long(0);
    let init_j = b.assign_var(j, zero);
    let inner_counter = b.var(j);
    let inner_limit = b.long(10);
    let inner_condition = b.binary(BinaryOp::Less, inner_counter, inner_limit);
    let inner_target = b.var(j);
    let inner_step = b.post_inc(inner_target);

    let current = b.var(x);
    let suffix = b.string("a");
    let joined = b.binary(BinaryOp::Concat, current, suffix);
    let widen = b.assign_var(x, joined);
    let copied = b.var(x);
    let copy = b.assign_var(y, copied);
    let result = b.var(x);

    b.build(&[
        Stmt::Expr(init_x),
        Stmt::For {
            init: vec![init_i],
            condition: Some(outer_condition),
            step: vec![outer_step],
            body: vec![
                Stmt::For {
                    init: vec![init_j],
                    condition: Some(inner_condition),
                    step: vec![inner_step],
                    body: vec![Stmt::Expr(widen)],
                },
                Stmt::Expr(copy),
            ],
        },
        Stmt::Return(Some(result)),
    ])
}

#[test]
fn test_entry_states_only_grow_between_iterations() {
    init_tracing();
    let mut table = SymbolTable::new();
    let body = nested_loops(&mut table);
    let id = body.routine;
    let run = |limit: usize| {
        FlowTypeInferencer::with_options(AnalysisOptions::new().with_max_iterations(limit))
            .infer_routine(&body, &table)
            .expect("Type inference failed")
    };
    let total = FlowTypeInferencer::new()
        .infer_unit(std::slice::from_ref(&body), &table)
        .expect("Type inference failed")
        .iterations;

    let mut before = run(1);
    for limit in 2..=total {
        let after = run(limit);
        for index in 0..body.cfg.len() {
            let block = BlockId(index as u32);
            if let Some(earlier) = before.entry_state(block) {
                let later = after.entry_state(block).expect("reached blocks stay reached");
                assert!(later.subsumes(earlier), "entry of {block:?} shrank after {limit} iterations");
            }
        }
        before = after;
    }
    assert_eq!(before.routine, id);
    assert_eq!(before.result_display(), "long|string");
}

#[test]
fn test_nested_loops_stabilize_quickly() {
    init_tracing();
    let mut table = SymbolTable::new();
    let body = nested_loops(&mut table);
    let id = body.routine;
    let blocks = body.cfg.len();

    let results = FlowTypeInferencer::new()
        .infer_unit(&[body], &table)
        .expect("Type inference failed");
    assert!(results.converged);
    assert!(results.iterations < 20 * blocks, "{} iterations for {blocks} blocks", results.iterations);
    let inferred = results.routine(id).expect("nested analyzed");
    for index in 0..blocks {
        assert!(inferred.block_visits(BlockId(index as u32)) <= 16);
    }
}

// ============================================================================
// Narrowing
// ============================================================================

#[test]
fn test_not_identical_null_narrows_branch() {
    let mut table = SymbolTable::new();
    let signature = RoutineSymbol::function("maybe")
        .param(ParamSymbol::new("x").typed(TypeHint::Nullable(Box::new(TypeHint::Long))));
    let id = table.declare_function(signature);
    let mut b = BodyBuilder::new(id, RoutineKind::Function);
    let x = b.param("x");
    let tested = b.var(x);
    let null = b.null();
    let condition = b.binary(BinaryOp::NotIdentical, tested, null);
    let inside = b.var(x);
    let zero = b.long(0);
    let body = b.build(&[
        Stmt::If {
            condition,
            then_body: vec![Stmt::Return(Some(inside))],
            else_body: vec![],
        },
        Stmt::Return(Some(zero)),
    ]);

    let inferred = infer(body, &table);
    assert_eq!(inferred.expr_display(tested), "null|long");
    assert_eq!(inferred.expr_display(inside), "long");
    assert_eq!(inferred.result_display(), "long");
}

#[test]
fn test_short_circuit_right_operand_sees_narrowed_state() {
    let mut table = SymbolTable::new();
    let signature = RoutineSymbol::function("positive")
        .param(ParamSymbol::new("x").typed(TypeHint::Nullable(Box::new(TypeHint::Long))));
    let id = table.declare_function(signature);
    let mut b = BodyBuilder::new(id, RoutineKind::Function);
    let x = b.param("x");
    let left_read = b.var(x);
    let null = b.null();
    let not_null = b.binary(BinaryOp::NotIdentical, left_read, null);
    let right_read = b.var(x);
    let zero = b.long(0);
    let positive = b.binary(BinaryOp::Greater, right_read, zero);
    let condition = b.and(not_null, positive);
    let body = b.build(&[Stmt::If {
        condition,
        then_body: vec![],
        else_body: vec![],
    }]);

    let inferred = infer(body, &table);
    assert_eq!(inferred.expr_display(left_read), "null|long");
    assert_eq!(inferred.expr_display(right_read), "long");
    assert_eq!(inferred.expr_display(condition), "bool");
}

#[test]
fn test_instanceof_narrows_unknown_value() {
    let mut table = SymbolTable::new();
    table.declare_class(ClassSymbol::new("Widget"));
    let id = table.declare_function(RoutineSymbol::function("only_widgets").param(ParamSymbol::new("w")));
    let mut b = BodyBuilder::new(id, RoutineKind::Function);
    let w = b.param("w");
    let tested = b.var(w);
    let check = b.instance_of(tested, "Widget");
    let inside = b.var(w);
    let null = b.null();
    let body = b.build(&[
        Stmt::If {
            condition: check,
            then_body: vec![Stmt::Return(Some(inside))],
            else_body: vec![],
        },
        Stmt::Return(Some(null)),
    ]);

    let inferred = infer(body, &table);
    assert_eq!(inferred.expr_display(tested), "mixed");
    assert_eq!(inferred.expr_display(inside), "Widget");
    assert_eq!(inferred.result_display(), "null|Widget");
}

#[test]
fn test_is_string_check_narrows_both_branches() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "describe");
    let flag = b.param("flag");
    let x = b.local("x");
    let cond = b.var(flag);
    let one = b.long(1);
    let text = b.string("a");
    let to_long = b.assign_var(x, one);
    let to_string = b.assign_var(x, text);
    let tested = b.var(x);
    let check = b.call("is_string", vec![tested]);
    let when_string = b.var(x);
    let otherwise = b.var(x);
    let body = b.build(&[
        Stmt::If {
            condition: cond,
            then_body: vec![Stmt::Expr(to_long)],
            else_body: vec![Stmt::Expr(to_string)],
        },
        Stmt::If {
            condition: check,
            then_body: vec![Stmt::Echo(vec![when_string])],
            else_body: vec![Stmt::Echo(vec![otherwise])],
        },
    ]);

    let inferred = infer(body, &table);
    assert_eq!(inferred.expr_display(check), "bool");
    assert_eq!(inferred.expr_display(when_string), "string");
    assert_eq!(inferred.expr_display(otherwise), "long");
}

// ============================================================================
// Statements with special control flow
// ============================================================================

#[test]
fn test_switch_arms_merge_at_end() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "classify");
    let n = b.param("n");
    let r = b.local("r");
    let value = b.var(n);
    let one = b.long(1);
    let text = b.string("one");
    let first = b.assign_var(r, text);
    let two = b.long(2);
    let fallback = b.assign_var(r, two);
    let result = b.var(r);
    let body = b.build(&[
        Stmt::Switch {
            value,
            cases: vec![
                SwitchCase {
                    label: Some(one),
                    body: vec![Stmt::Expr(first), Stmt::Break],
                },
                SwitchCase {
                    label: None,
                    body: vec![Stmt::Expr(fallback)],
                },
            ],
        },
        Stmt::Return(Some(result)),
    ]);

    let inferred = infer(body, &table);
    assert_eq!(inferred.result_display(), "long|string");
    assert!(!inferred.is_maybe_uninitialized(result));
}

#[test]
fn test_catch_block_sees_every_state_of_the_try_body() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "guarded");
    let x = b.local("x");
    let e = b.local("e");
    let one = b.long(1);
    let first = b.assign_var(x, one);
    let text = b.string("a");
    let second = b.assign_var(x, text);
    let in_catch = b.var(x);
    let caught = b.var(e);
    let body = b.build(&[Stmt::Try {
        body: vec![Stmt::Expr(first), Stmt::Expr(second)],
        catches: vec![CatchClause {
            types: vec![Name::new("Exception")],
            variable: Some(e),
            body: vec![Stmt::Echo(vec![caught]), Stmt::Return(Some(in_catch))],
        }],
        finally: None,
    }]);

    let inferred = infer(body, &table);
    assert_eq!(inferred.expr_display(caught), "Exception");
    assert_eq!(inferred.expr_display(in_catch), "null|long|string");
    assert!(inferred.is_maybe_uninitialized(in_catch));
}

#[test]
fn test_unset_variable_reads_as_null() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "forget");
    let x = b.local("x");
    let one = b.long(1);
    let assign = b.assign_var(x, one);
    let target = b.var(x);
    let read = b.var(x);
    let body = b.build(&[Stmt::Expr(assign), Stmt::Unset(vec![target]), Stmt::Return(Some(read))]);

    let inferred = infer(body, &table);
    assert!(inferred.is_maybe_uninitialized(read));
    assert_eq!(inferred.result_display(), "null");
}

#[test]
fn test_static_variables_are_references() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "memo");
    let cache = b.local("cache");
    let init = b.null();
    let read = b.var(cache);
    let body = b.build(&[
        Stmt::Static(vec![StaticVar {
            variable: cache,
            initializer: Some(init),
        }]),
        Stmt::Return(Some(read)),
    ]);

    let inferred = infer(body, &table);
    assert_eq!(inferred.expr_display(read), "&mixed");
    assert_eq!(inferred.result_display(), "mixed");
}

// ============================================================================
// Routine kinds and effects
// ============================================================================

#[test]
fn test_global_code_reads_unknown_variables_as_mixed() {
    let mut table = SymbolTable::new();
    let id = table.declare_pseudo_routine("main", None);
    let mut b = BodyBuilder::new(id, RoutineKind::GlobalCode);
    let argv = b.local("argv");
    let read = b.var(argv);
    let body = b.build(&[Stmt::Echo(vec![read])]);

    let inferred = infer(body, &table);
    assert_eq!(inferred.expr_display(read), "mixed");
    assert!(!inferred.is_maybe_uninitialized(read));
}

#[test]
fn test_eval_makes_locals_unknown() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "dynamic");
    let x = b.local("x");
    let one = b.long(1);
    let assign = b.assign_var(x, one);
    let code = b.string("$x = 'changed';");
    let eval = b.eval(code);
    let read = b.var(x);
    let body = b.build(&[Stmt::Expr(assign), Stmt::Expr(eval), Stmt::Return(Some(read))]);

    let inferred = infer(body, &table);
    assert!(inferred.effects().uses_dynamic_locals);
    assert_eq!(inferred.result_display(), "mixed");
}

#[test]
fn test_extract_marks_dynamic_locals() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "unpack");
    let x = b.local("x");
    let one = b.long(1);
    let assign = b.assign_var(x, one);
    let source = b.array(vec![]);
    let extract = b.call("extract", vec![source]);
    let read = b.var(x);
    let body = b.build(&[Stmt::Expr(assign), Stmt::Expr(extract), Stmt::Return(Some(read))]);

    let inferred = infer(body, &table);
    assert!(inferred.effects().uses_dynamic_locals);
    assert_eq!(inferred.expr_display(extract), "long");
    assert_eq!(inferred.expr_display(read), "&mixed");
}

#[test]
fn test_generator_result_is_generator_object() {
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "numbers");
    let one = b.long(1);
    let produce = b.yield_value(Some(one));
    let body = b.build(&[Stmt::Expr(produce)]);

    let inferred = infer(body, &table);
    assert!(inferred.effects().is_generator);
    assert_eq!(inferred.result_display(), "Generator");
}

#[test]
fn test_new_static_uses_late_static_binding() {
    let mut table = SymbolTable::new();
    let id = table.declare_method("Widget", RoutineSymbol::method("create").static_());
    let mut b = BodyBuilder::new(id, RoutineKind::Method { is_static: true });
    let created = b.expr(BoundExpr::New {
        class: ClassRef::Static,
        args: vec![],
    });
    let body = b.build(&[Stmt::Return(Some(created))]);

    let inferred = infer(body, &table);
    assert!(inferred.effects().uses_late_static_binding);
    assert_eq!(inferred.result_display(), "Widget");
    assert!(!inferred.effects().uses_dynamic_locals);
}

#[test]
fn test_this_has_declaring_class_type() {
    let mut table = SymbolTable::new();
    table.declare_class(ClassSymbol::new("Widget").field("size", Some(TypeHint::Long)));
    let id = table.declare_method("Widget", RoutineSymbol::method("size"));
    let mut b = BodyBuilder::new(id, RoutineKind::Method { is_static: false });
    let this = b.this();
    let receiver = b.var(this);
    let field = b.field(receiver, "size");
    let body = b.build(&[Stmt::Return(Some(field))]);

    let inferred = infer(body, &table);
    assert_eq!(inferred.expr_display(receiver), "Widget");
    assert_eq!(inferred.result_display(), "long");
}

// ============================================================================
// Options
// ============================================================================

#[test]
fn test_options_from_json() {
    let options = AnalysisOptions::from_json(r#"{"max_iterations": 50}"#).expect("valid options");
    assert_eq!(options.max_iterations, 50);

    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "f");
    let one = b.long(1);
    let body = b.build(&[Stmt::Return(Some(one))]);
    let results = FlowTypeInferencer::with_options(options)
        .infer_unit(&[body], &table)
        .expect("Type inference failed");
    assert!(results.converged);
    assert_eq!(results.rounds, 1);
}

#[test]
fn test_type_ref_cap_degrades_to_mixed() {
    init_tracing();
    let mut table = SymbolTable::new();
    let mut b = function(&mut table, "many");
    let x = b.local("x");
    let mut stmts = Vec::new();
    let mut last = None;
    for class in ["A", "B", "C", "D"] {
        let created = b.new_object(class, vec![]);
        stmts.push(Stmt::Expr(b.assign_var(x, created)));
        last = Some(created);
    }
    let result = b.var(x);
    stmts.push(Stmt::Return(Some(result)));
    let body = b.build(&stmts);

    // six primitives plus room for two classes
    let options = AnalysisOptions::new().with_type_ref_cap(8);
    let inferred = FlowTypeInferencer::with_options(options)
        .infer_routine(&body, &table)
        .expect("Type inference failed");
    assert!(inferred.types().has_overflowed());
    assert_eq!(inferred.expr_display(last.expect("classes created")), "mixed");
    assert_eq!(inferred.result_display(), "mixed");
}
