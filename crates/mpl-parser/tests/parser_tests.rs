//! Integration tests for the MPL parser.
//!
//! Covers: statements, declarations, precedence, for/for-of
//! disambiguation, postfix chains, and multi-error recovery.

use mpl_lexer::Lexer;
use mpl_parser::{ParseResult, Parser};
use mpl_types::ast::*;
use mpl_types::SourceFile;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Parse source and return the result (program + errors).
fn parse(source: &str) -> ParseResult {
    let sf = SourceFile::new("test.mpl", source);
    let lex = Lexer::new(&sf).lex();
    assert!(
        !lex.errors.has_errors(),
        "unexpected lex errors: {:?}",
        lex.errors.errors
    );
    Parser::new(lex.tokens, &sf).parse()
}

/// Parse source and return the program, panicking if there are errors.
fn parse_ok(source: &str) -> Program {
    let result = parse(source);
    if result.errors.has_errors() {
        for e in &result.errors.errors {
            eprintln!("  ERROR: {} ({})", e.message, e.code);
        }
        panic!("unexpected parse errors (see above)");
    }
    result.program.expect("no program returned")
}

/// Parse source and return the error count.
fn error_count(source: &str) -> usize {
    parse(source).errors.total_errors
}

/// Unwrap the single top-level statement as an expression.
fn single_expr(source: &str) -> Expr {
    let prog = parse_ok(source);
    assert_eq!(prog.stmts.len(), 1, "expected exactly one statement");
    match prog.stmts.into_iter().next().unwrap() {
        Stmt::Expr(e) => e.expr,
        other => panic!("expected expression statement, got {other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────
// Statements & declarations
// ─────────────────────────────────────────────────────────────────────

#[test]
fn var_decl_single() {
    let prog = parse_ok("var count = 3;");
    match &prog.stmts[0] {
        Stmt::Var(decl) => {
            assert_eq!(decl.declarators.len(), 1);
            assert_eq!(decl.declarators[0].name.name, "count");
            assert!(decl.declarators[0].init.is_some());
        }
        other => panic!("expected var decl, got {other:?}"),
    }
}

#[test]
fn var_decl_multiple_declarators() {
    let prog = parse_ok("var a = 1, b, c = 3;");
    match &prog.stmts[0] {
        Stmt::Var(decl) => {
            assert_eq!(decl.declarators.len(), 3);
            assert!(decl.declarators[1].init.is_none());
        }
        other => panic!("expected var decl, got {other:?}"),
    }
}

#[test]
fn function_decl() {
    let prog = parse_ok("function line(len) { set(len, 0); }");
    match &prog.stmts[0] {
        Stmt::Function(f) => {
            assert_eq!(f.name.name, "line");
            assert_eq!(f.params.len(), 1);
            assert_eq!(f.params[0].name, "len");
            assert_eq!(f.body.stmts.len(), 1);
        }
        other => panic!("expected function decl, got {other:?}"),
    }
}

#[test]
fn rule_decl_parses_like_function() {
    let prog = parse_ok("rule cross(size) { set(size, size); }");
    match &prog.stmts[0] {
        Stmt::Rule(r) => {
            assert_eq!(r.name.name, "cross");
            assert_eq!(r.params.len(), 1);
        }
        other => panic!("expected rule decl, got {other:?}"),
    }
}

#[test]
fn if_else_chain() {
    let prog = parse_ok("if (a) b; else if (c) d; else e;");
    match &prog.stmts[0] {
        Stmt::If(stmt) => {
            assert!(stmt.else_branch.is_some());
            match stmt.else_branch.as_ref().unwrap() {
                Stmt::If(inner) => assert!(inner.else_branch.is_some()),
                other => panic!("expected nested if, got {other:?}"),
            }
        }
        other => panic!("expected if, got {other:?}"),
    }
}

#[test]
fn while_stmt() {
    let prog = parse_ok("while (i < 10) i = i + 1;");
    assert!(matches!(prog.stmts[0], Stmt::While(_)));
}

#[test]
fn classic_for_loop() {
    let prog = parse_ok("for (var i = 0; i < 5; i = i + 1) set(i, 0);");
    match &prog.stmts[0] {
        Stmt::For(f) => {
            assert!(matches!(f.init, Some(Stmt::Var(_))));
            assert!(f.condition.is_some());
            assert!(f.increment.is_some());
        }
        other => panic!("expected for, got {other:?}"),
    }
}

#[test]
fn for_with_empty_header_slots() {
    let prog = parse_ok("for (;;) step();");
    match &prog.stmts[0] {
        Stmt::For(f) => {
            assert!(f.init.is_none());
            assert!(f.condition.is_none());
            assert!(f.increment.is_none());
        }
        other => panic!("expected for, got {other:?}"),
    }
}

#[test]
fn for_of_loop() {
    let prog = parse_ok("for (var p of points) set(p[0], p[1]);");
    match &prog.stmts[0] {
        Stmt::ForOf(f) => {
            assert_eq!(f.binding.name, "p");
            assert!(matches!(f.iterable.kind, ExprKind::Identifier(_)));
        }
        other => panic!("expected for-of, got {other:?}"),
    }
}

#[test]
fn return_with_and_without_value() {
    let prog = parse_ok("function f() { return; } function g() { return 1; }");
    assert_eq!(prog.stmts.len(), 2);
}

#[test]
fn brace_at_statement_position_is_block() {
    let prog = parse_ok("{ var a = 1; set(a, a); }");
    match &prog.stmts[0] {
        Stmt::Block(b) => assert_eq!(b.stmts.len(), 2),
        other => panic!("expected block, got {other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn precedence_mul_over_add() {
    let expr = single_expr("x = 1 + 2 * 3;");
    // x = (1 + (2 * 3))
    match expr.kind {
        ExprKind::Assign { value, .. } => match value.kind {
            ExprKind::Binary { op: BinOp::Add, right, .. } => {
                assert!(matches!(
                    right.kind,
                    ExprKind::Binary { op: BinOp::Mul, .. }
                ));
            }
            other => panic!("expected add at top, got {other:?}"),
        },
        other => panic!("expected assignment, got {other:?}"),
    }
}

#[test]
fn precedence_comparison_over_logical() {
    let expr = single_expr("ok = a < b && c >= d;");
    match expr.kind {
        ExprKind::Assign { value, .. } => {
            assert!(matches!(
                value.kind,
                ExprKind::Binary { op: BinOp::And, .. }
            ));
        }
        other => panic!("expected assignment, got {other:?}"),
    }
}

#[test]
fn assignment_is_right_associative() {
    let expr = single_expr("a = b = 5;");
    match expr.kind {
        ExprKind::Assign { value, .. } => {
            assert!(matches!(value.kind, ExprKind::Assign { .. }));
        }
        other => panic!("expected assignment, got {other:?}"),
    }
}

#[test]
fn postfix_chain_call_member_index() {
    let expr = single_expr("grid.cells[3](1, 2);");
    // ((grid.cells)[3])(1, 2)
    match expr.kind {
        ExprKind::Call { callee, args } => {
            assert_eq!(args.len(), 2);
            assert!(matches!(
                callee.kind,
                ExprKind::Member {
                    property: MemberProp::Index(_),
                    ..
                }
            ));
        }
        other => panic!("expected call, got {other:?}"),
    }
}

#[test]
fn math_member_call() {
    let expr = single_expr("y = Math.floor(2.7);");
    match expr.kind {
        ExprKind::Assign { value, .. } => match value.kind {
            ExprKind::Call { callee, .. } => {
                assert!(matches!(
                    callee.kind,
                    ExprKind::Member {
                        property: MemberProp::Name(_),
                        ..
                    }
                ));
            }
            other => panic!("expected call, got {other:?}"),
        },
        other => panic!("expected assignment, got {other:?}"),
    }
}

#[test]
fn array_and_object_literals() {
    let expr = single_expr("p = { pos: [1, 2, 3], name: 'seed' };");
    match expr.kind {
        ExprKind::Assign { value, .. } => match value.kind {
            ExprKind::Object(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].key.name, "pos");
                assert!(matches!(entries[0].value.kind, ExprKind::Array(_)));
            }
            other => panic!("expected object literal, got {other:?}"),
        },
        other => panic!("expected assignment, got {other:?}"),
    }
}

#[test]
fn unary_operators_nest() {
    let expr = single_expr("v = !-x;");
    match expr.kind {
        ExprKind::Assign { value, .. } => match value.kind {
            ExprKind::Unary { op: UnaryOp::Not, operand } => {
                assert!(matches!(
                    operand.kind,
                    ExprKind::Unary { op: UnaryOp::Neg, .. }
                ));
            }
            other => panic!("expected unary, got {other:?}"),
        },
        other => panic!("expected assignment, got {other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────
// Error reporting & recovery
// ─────────────────────────────────────────────────────────────────────

#[test]
fn missing_semicolon_reports_error() {
    assert!(error_count("var a = 1") >= 1);
}

#[test]
fn two_independent_errors_both_reported() {
    // Statement 1 is missing `;`, statement 3 has a bad expression.
    let n = error_count("var a = 1\nset(1, 2);\nvar b = * 3;");
    assert!(n >= 2, "expected at least 2 errors, got {n}");
}

#[test]
fn recovery_keeps_later_statements() {
    let result = parse("var a = ;\nvar b = 2;");
    assert!(result.errors.has_errors());
    let prog = result.program.expect("recovered program");
    // The second statement survives resynchronization.
    assert!(prog
        .stmts
        .iter()
        .any(|s| matches!(s, Stmt::Var(d) if d.declarators[0].name.name == "b")));
}

#[test]
fn unclosed_block_is_fatal() {
    let result = parse("function f() { set(1, 2);");
    assert!(result.errors.has_errors());
    assert!(result.program.is_none());
}

#[test]
fn invalid_assignment_target_rejected() {
    assert!(error_count("1 = 2;") >= 1);
}

#[test]
fn parse_is_deterministic() {
    let source = "rule decay() { if (cell > 0) cell = cell - 1; }";
    let first = parse_ok(source);
    for _ in 0..10 {
        assert_eq!(parse_ok(source), first);
    }
}
