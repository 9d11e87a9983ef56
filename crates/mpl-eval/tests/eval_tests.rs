//! Integration tests for the MPL evaluator.
//!
//! Runs parsed programs against a recording mock host and checks:
//! scoping, coercion, control flow, calls, builtin dispatch, and the
//! safety limits.

use mpl_eval::{
    Environment, Evaluator, FnTable, FunctionValue, GridHost, Limits, NeighborStats,
    RuntimeError, RuntimeResult, Value,
};
use mpl_lexer::Lexer;
use mpl_parser::Parser;
use mpl_types::SourceFile;
use std::rc::Rc;

// ─────────────────────────────────────────────────────────────────────
// Mock host
// ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct TestHost {
    sets: Vec<(f64, f64, f64)>,
    clears: usize,
    steps: usize,
    layers: Vec<f64>,
    prints: Vec<String>,
    random_calls: u32,
    reseeded_with: Option<u64>,
    activations: Vec<(String, usize, bool)>,
    deactivations: Vec<String>,
    stats: Option<NeighborStats>,
}

impl GridHost for TestHost {
    fn set_cell(&mut self, x: f64, y: f64, z: f64) -> RuntimeResult<()> {
        self.sets.push((x, y, z));
        Ok(())
    }
    fn clear(&mut self) -> RuntimeResult<()> {
        self.clears += 1;
        Ok(())
    }
    fn step(&mut self) -> RuntimeResult<()> {
        self.steps += 1;
        Ok(())
    }
    fn select_layer(&mut self, index: f64) -> RuntimeResult<()> {
        self.layers.push(index);
        Ok(())
    }
    fn cell_at(&self, x: f64, _y: f64, _z: f64) -> f64 {
        // Recognizable fake: cellAt(x, ...) == x * 2
        x * 2.0
    }
    fn random(&mut self) -> f64 {
        self.random_calls += 1;
        0.25
    }
    fn reseed(&mut self, seed: u64) {
        self.reseeded_with = Some(seed);
    }
    fn print(&mut self, text: &str) {
        self.prints.push(text.to_string());
    }
    fn activate_rule(
        &mut self,
        name: &str,
        resolved: Option<(Rc<FunctionValue>, FnTable)>,
        args: Vec<Value>,
    ) -> RuntimeResult<()> {
        self.activations
            .push((name.to_string(), args.len(), resolved.is_some()));
        Ok(())
    }
    fn deactivate_rule(&mut self, name: &str) -> RuntimeResult<()> {
        self.deactivations.push(name.to_string());
        Ok(())
    }
    fn neighbor_stats(&self) -> Option<NeighborStats> {
        self.stats
    }
}

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn parse(source: &str) -> mpl_types::ast::Program {
    let sf = SourceFile::new("test.mpl", source);
    let lex = Lexer::new(&sf).lex();
    let result = Parser::new(lex.tokens, &sf).parse();
    if result.errors.has_errors() {
        panic!(
            "parse errors:\n{}",
            result
                .errors
                .errors
                .iter()
                .map(|e| format!("  [{}] {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }
    result.program.expect("no program after successful parse")
}

struct Run {
    env: Environment,
    host: TestHost,
    outcome: Result<(), RuntimeError>,
}

fn run_with(source: &str, limits: Limits, host: TestHost) -> Run {
    let program = parse(source);
    let mut env = Environment::new();
    let mut functions = FnTable::default();
    let mut rules = FnTable::default();
    let mut host = host;
    let outcome = Evaluator::new(&mut env, &mut functions, &mut rules, &mut host)
        .with_limits(limits)
        .run(&program);
    Run { env, host, outcome }
}

fn run(source: &str) -> Run {
    run_with(source, Limits::default(), TestHost::default())
}

fn run_ok(source: &str) -> Run {
    let result = run(source);
    if let Err(e) = &result.outcome {
        panic!("unexpected runtime error: {e}");
    }
    result
}

fn global(run: &Run, name: &str) -> Value {
    run.env
        .get(name)
        .cloned()
        .unwrap_or_else(|| panic!("global '{name}' not defined"))
}

// ─────────────────────────────────────────────────────────────────────
// Variables & scoping
// ─────────────────────────────────────────────────────────────────────

#[test]
fn var_decl_and_arithmetic() {
    let r = run_ok("var a = 2 + 3 * 4;");
    assert_eq!(global(&r, "a"), Value::Number(14.0));
}

#[test]
fn var_without_initializer_is_undefined() {
    let r = run_ok("var a;");
    assert_eq!(global(&r, "a"), Value::Undefined);
}

#[test]
fn redeclaration_overwrites() {
    let r = run_ok("var a = 1; var a = 'two';");
    assert_eq!(global(&r, "a"), Value::Str("two".into()));
}

#[test]
fn assignment_to_undeclared_is_an_error() {
    let r = run("ghost = 1;");
    assert_eq!(
        r.outcome,
        Err(RuntimeError::UndefinedVariable("ghost".into()))
    );
}

#[test]
fn block_scope_shadows_and_restores() {
    let r = run_ok("var a = 1; { var a = 2; } var b = a;");
    assert_eq!(global(&r, "b"), Value::Number(1.0));
}

#[test]
fn assignment_reaches_outer_scope() {
    let r = run_ok("var a = 1; { a = 5; }");
    assert_eq!(global(&r, "a"), Value::Number(5.0));
}

// ─────────────────────────────────────────────────────────────────────
// Coercion & operators
// ─────────────────────────────────────────────────────────────────────

#[test]
fn numeric_string_pairs_coerce() {
    let r = run_ok("var a = '2' * '3'; var b = '10' + '4';");
    assert_eq!(global(&r, "a"), Value::Number(6.0));
    assert_eq!(global(&r, "b"), Value::Number(14.0));
}

#[test]
fn non_numeric_strings_concatenate_with_plus() {
    let r = run_ok("var s = 'foo' + 'bar';");
    assert_eq!(global(&r, "s"), Value::Str("foobar".into()));
}

#[test]
fn mixed_number_and_string_is_a_type_mismatch() {
    let r = run("var a = 1 + 'x';");
    assert!(matches!(r.outcome, Err(RuntimeError::TypeMismatch(_))));
}

#[test]
fn division_by_zero_propagates_infinity() {
    let r = run_ok("var a = 1 / 0; var b = -1 / 0;");
    assert_eq!(global(&r, "a"), Value::Number(f64::INFINITY));
    assert_eq!(global(&r, "b"), Value::Number(f64::NEG_INFINITY));
}

#[test]
fn equality_is_type_strict() {
    let r = run_ok("var a = 1 == '1'; var b = 1 == 1; var c = 'x' != 'y';");
    assert_eq!(global(&r, "a"), Value::Bool(false));
    assert_eq!(global(&r, "b"), Value::Bool(true));
    assert_eq!(global(&r, "c"), Value::Bool(true));
}

#[test]
fn logical_operators_short_circuit() {
    // The right side would raise UndefinedCallable if evaluated.
    let r = run_ok("var a = false && missing(); var b = true || missing();");
    assert_eq!(global(&r, "a"), Value::Bool(false));
    assert_eq!(global(&r, "b"), Value::Bool(true));
}

#[test]
fn comparison_on_mixed_types_errors() {
    let r = run("var a = 1 < 'x';");
    assert!(matches!(r.outcome, Err(RuntimeError::TypeMismatch(_))));
}

// ─────────────────────────────────────────────────────────────────────
// Control flow
// ─────────────────────────────────────────────────────────────────────

#[test]
fn if_else_picks_branch_by_truthiness() {
    let r = run_ok("var a = 0; if (0) a = 1; else a = 2;");
    assert_eq!(global(&r, "a"), Value::Number(2.0));
}

#[test]
fn while_loop_runs_to_condition() {
    let r = run_ok("var i = 0; while (i < 5) i = i + 1;");
    assert_eq!(global(&r, "i"), Value::Number(5.0));
}

#[test]
fn classic_for_loop_accumulates() {
    let r = run_ok("var total = 0; for (var i = 1; i <= 4; i = i + 1) total = total + i;");
    assert_eq!(global(&r, "total"), Value::Number(10.0));
}

#[test]
fn for_of_iterates_array_elements() {
    let r = run_ok("var sum = 0; for (var v of [1, 2, 3]) sum = sum + v;");
    assert_eq!(global(&r, "sum"), Value::Number(6.0));
}

#[test]
fn for_of_iterates_object_values_in_insertion_order() {
    let r = run_ok("var s = ''; for (var v of { b: 'x', a: 'y', c: 'z' }) s = s + v;");
    assert_eq!(global(&r, "s"), Value::Str("xyz".into()));
}

#[test]
fn for_of_over_number_is_not_iterable() {
    let r = run("for (var v of 5) print(v);");
    assert!(matches!(r.outcome, Err(RuntimeError::NotIterable(_))));
}

// ─────────────────────────────────────────────────────────────────────
// Functions & rules
// ─────────────────────────────────────────────────────────────────────

#[test]
fn function_call_binds_params_and_returns() {
    let r = run_ok("function add(a, b) { return a + b; } var s = add(2, 3);");
    assert_eq!(global(&r, "s"), Value::Number(5.0));
}

#[test]
fn missing_args_bind_undefined_and_extras_are_ignored() {
    let r = run_ok(
        "function probe(a, b) { if (b == 2) return 'two'; return 'none'; } \
         var short = probe(1); var long = probe(1, 2, 3, 4);",
    );
    assert_eq!(global(&r, "short"), Value::Str("none".into()));
    assert_eq!(global(&r, "long"), Value::Str("two".into()));
}

#[test]
fn function_body_falls_through_to_undefined() {
    let r = run_ok("function noop() { var x = 1; } var v = noop();");
    assert_eq!(global(&r, "v"), Value::Undefined);
}

#[test]
fn caller_locals_are_invisible_to_callee() {
    let r = run(
        "function inner() { return hidden; } \
         function outer() { var hidden = 1; return inner(); } \
         var v = outer();",
    );
    assert_eq!(
        r.outcome,
        Err(RuntimeError::UndefinedVariable("hidden".into()))
    );
}

#[test]
fn globals_are_visible_inside_calls() {
    let r = run_ok("var g = 7; function f() { return g + 1; } var v = f();");
    assert_eq!(global(&r, "v"), Value::Number(8.0));
}

#[test]
fn recursion_hits_the_depth_limit() {
    let limits = Limits {
        max_call_depth: 16,
        op_budget: None,
    };
    let r = run_with(
        "function f(n) { return f(n + 1); } f(0);",
        limits,
        TestHost::default(),
    );
    assert_eq!(r.outcome, Err(RuntimeError::StackOverflow { limit: 16 }));
}

#[test]
fn bounded_recursion_is_fine() {
    let r = run_ok("function fac(n) { if (n <= 1) return 1; return n * fac(n - 1); } var v = fac(6);");
    assert_eq!(global(&r, "v"), Value::Number(720.0));
}

#[test]
fn rule_is_callable_like_a_function() {
    let r = run_ok("rule cross(n) { set(n, n); } cross(3);");
    assert_eq!(r.host.sets, vec![(3.0, 3.0, 0.0)]);
}

#[test]
fn functions_are_first_class_values() {
    let r = run_ok("function double(n) { return n * 2; } var f = double; var v = f(21);");
    assert_eq!(global(&r, "v"), Value::Number(42.0));
}

#[test]
fn user_function_shadows_builtin() {
    let r = run_ok("function set(a, b) { return a + b; } var v = set(1, 2);");
    assert_eq!(global(&r, "v"), Value::Number(3.0));
    assert!(r.host.sets.is_empty(), "builtin must not fire");
}

#[test]
fn unknown_callable_is_an_error() {
    let r = run("nonsense();");
    assert_eq!(
        r.outcome,
        Err(RuntimeError::UndefinedCallable("nonsense".into()))
    );
}

// ─────────────────────────────────────────────────────────────────────
// Builtins
// ─────────────────────────────────────────────────────────────────────

#[test]
fn grid_builtins_reach_the_host() {
    let r = run_ok("set(1, 2); set(3, 4, 5); clear(); step(); step(); layer(1);");
    assert_eq!(r.host.sets, vec![(1.0, 2.0, 0.0), (3.0, 4.0, 5.0)]);
    assert_eq!(r.host.clears, 1);
    assert_eq!(r.host.steps, 2);
    assert_eq!(r.host.layers, vec![1.0]);
}

#[test]
fn print_joins_display_strings() {
    let r = run_ok("print('cells:', 3, true);");
    assert_eq!(r.host.prints, vec!["cells: 3 true".to_string()]);
}

#[test]
fn random_and_seed_route_through_the_host() {
    let r = run_ok("seed(42); var v = random(); var w = Math.random();");
    assert_eq!(r.host.reseeded_with, Some(42));
    assert_eq!(r.host.random_calls, 2);
    assert_eq!(global(&r, "v"), Value::Number(0.25));
    assert_eq!(global(&r, "w"), Value::Number(0.25));
}

#[test]
fn math_passthrough() {
    let r = run_ok(
        "var f = Math.floor(2.9); var p = Math.pow(2, 10); var m = Math.max(1, 7, 3);",
    );
    assert_eq!(global(&r, "f"), Value::Number(2.0));
    assert_eq!(global(&r, "p"), Value::Number(1024.0));
    assert_eq!(global(&r, "m"), Value::Number(7.0));
}

#[test]
fn cell_at_reads_through_the_host() {
    let r = run_ok("var v = cellAt(4, 0);");
    assert_eq!(global(&r, "v"), Value::Number(8.0));
}

#[test]
fn activate_resolves_program_rules() {
    let r = run_ok("rule decay() { cell = cell - 1; } activate('decay', 10);");
    assert_eq!(r.host.activations, vec![("decay".to_string(), 1, true)]);
}

#[test]
fn activate_unknown_rule_defers_to_host() {
    let r = run_ok("activate('reloaded');");
    assert_eq!(r.host.activations, vec![("reloaded".to_string(), 0, false)]);
}

#[test]
fn deactivate_passes_the_name() {
    let r = run_ok("deactivate('decay');");
    assert_eq!(r.host.deactivations, vec!["decay".to_string()]);
}

#[test]
fn neighbor_builtins_require_rule_context() {
    let r = run("var n = neighborsAlive();");
    assert_eq!(
        r.outcome,
        Err(RuntimeError::NotInRuleContext("neighborsAlive".into()))
    );
}

#[test]
fn neighbor_builtins_read_host_stats() {
    let host = TestHost {
        stats: Some(NeighborStats {
            alive: 5,
            sum: 300.0,
            count: 26,
            max: 255,
        }),
        ..TestHost::default()
    };
    let r = run_with(
        "var a = neighborsAlive(); var s = neighborSum(); var c = neighborCount(); var m = neighborMax();",
        Limits::default(),
        host,
    );
    assert!(r.outcome.is_ok());
    assert_eq!(global(&r, "a"), Value::Number(5.0));
    assert_eq!(global(&r, "s"), Value::Number(300.0));
    assert_eq!(global(&r, "c"), Value::Number(26.0));
    assert_eq!(global(&r, "m"), Value::Number(255.0));
}

// ─────────────────────────────────────────────────────────────────────
// Members & compound data
// ─────────────────────────────────────────────────────────────────────

#[test]
fn array_and_object_member_reads() {
    let r = run_ok(
        "var a = [10, 20, 30]; var o = { pos: { x: 4 } }; \
         var first = a[0]; var len = a.length; var x = o.pos.x; var miss = a[9];",
    );
    assert_eq!(global(&r, "first"), Value::Number(10.0));
    assert_eq!(global(&r, "len"), Value::Number(3.0));
    assert_eq!(global(&r, "x"), Value::Number(4.0));
    assert_eq!(global(&r, "miss"), Value::Undefined);
}

#[test]
fn member_assignment_through_nested_paths() {
    let r = run_ok(
        "var o = { list: [1, 2], name: 'old' }; \
         o.name = 'new'; o.list[1] = 9; o.extra = true;",
    );
    let obj = global(&r, "o");
    let Value::Object(fields) = obj else {
        panic!("expected object");
    };
    assert_eq!(fields.get("name"), Some(&Value::Str("new".into())));
    assert_eq!(
        fields.get("list"),
        Some(&Value::Array(vec![Value::Number(1.0), Value::Number(9.0)]))
    );
    assert_eq!(fields.get("extra"), Some(&Value::Bool(true)));
}

#[test]
fn array_assignment_extends_with_undefined() {
    let r = run_ok("var a = [1]; a[3] = 4;");
    assert_eq!(
        global(&r, "a"),
        Value::Array(vec![
            Value::Number(1.0),
            Value::Undefined,
            Value::Undefined,
            Value::Number(4.0),
        ])
    );
}

#[test]
fn string_length_and_indexing() {
    let r = run_ok("var s = 'abc'; var l = s.length; var c = s[1];");
    assert_eq!(global(&r, "l"), Value::Number(3.0));
    assert_eq!(global(&r, "c"), Value::Str("b".into()));
}

// ─────────────────────────────────────────────────────────────────────
// Limits & cancellation
// ─────────────────────────────────────────────────────────────────────

#[test]
fn op_budget_stops_runaway_loops() {
    let limits = Limits {
        max_call_depth: 1000,
        op_budget: Some(10_000),
    };
    let r = run_with("while (true) { var x = 1; }", limits, TestHost::default());
    assert_eq!(r.outcome, Err(RuntimeError::OpBudgetExhausted));
}

#[test]
fn pre_set_cancel_flag_stops_immediately() {
    use std::sync::atomic::{AtomicBool, Ordering};
    let program = parse("var a = 1;");
    let mut env = Environment::new();
    let mut functions = FnTable::default();
    let mut rules = FnTable::default();
    let mut host = TestHost::default();
    let flag = AtomicBool::new(false);
    flag.store(true, Ordering::Relaxed);
    let outcome = Evaluator::new(&mut env, &mut functions, &mut rules, &mut host)
        .with_cancel_flag(&flag)
        .run(&program);
    assert_eq!(outcome, Err(RuntimeError::Cancelled));
    assert_eq!(env.get("a"), None);
}

#[test]
fn runtime_error_keeps_prior_mutations() {
    let r = run("var a = 1; a = 2; ghost();");
    assert!(matches!(r.outcome, Err(RuntimeError::UndefinedCallable(_))));
    assert_eq!(global(&r, "a"), Value::Number(2.0));
}

#[test]
fn top_level_return_is_an_error() {
    let r = run("return 5;");
    assert!(matches!(r.outcome, Err(RuntimeError::Return(_))));
}
