//! Integration tests for the MPL lexer.
//!
//! Covers: keywords vs identifiers, numbers, strings (both quote styles,
//! escapes, unterminated), operators, comments, and error recovery.

use mpl_lexer::{Lexer, TokenKind};
use mpl_types::SourceFile;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Lex source and return the token kinds (without the trailing Eof).
fn kinds(source: &str) -> Vec<TokenKind> {
    let sf = SourceFile::new("test.mpl", source);
    let result = Lexer::new(&sf).lex();
    assert!(
        !result.errors.has_errors(),
        "unexpected lex errors: {:?}",
        result.errors.errors
    );
    let mut kinds: Vec<TokenKind> = result.tokens.into_iter().map(|t| t.kind).collect();
    assert_eq!(kinds.pop(), Some(TokenKind::Eof));
    kinds
}

/// Lex source expecting errors; returns (kinds, error count).
fn kinds_with_errors(source: &str) -> (Vec<TokenKind>, usize) {
    let sf = SourceFile::new("test.mpl", source);
    let result = Lexer::new(&sf).lex();
    let kinds = result.tokens.into_iter().map(|t| t.kind).collect();
    (kinds, result.errors.total_errors)
}

// ─────────────────────────────────────────────────────────────────────
// Basics
// ─────────────────────────────────────────────────────────────────────

#[test]
fn empty_source_is_just_eof() {
    let sf = SourceFile::new("test.mpl", "");
    let result = Lexer::new(&sf).lex();
    assert_eq!(result.tokens.len(), 1);
    assert_eq!(result.tokens[0].kind, TokenKind::Eof);
}

#[test]
fn set_call_statement() {
    assert_eq!(
        kinds("set(1, 2);"),
        vec![
            TokenKind::Identifier("set".into()),
            TokenKind::LParen,
            TokenKind::Number(1.0),
            TokenKind::Comma,
            TokenKind::Number(2.0),
            TokenKind::RParen,
            TokenKind::Semicolon,
        ]
    );
}

#[test]
fn keywords_and_identifiers() {
    assert_eq!(
        kinds("var x = true; rule cross() {}"),
        vec![
            TokenKind::Var,
            TokenKind::Identifier("x".into()),
            TokenKind::Eq,
            TokenKind::True,
            TokenKind::Semicolon,
            TokenKind::Rule,
            TokenKind::Identifier("cross".into()),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::LBrace,
            TokenKind::RBrace,
        ]
    );
}

#[test]
fn keywords_are_case_sensitive() {
    assert_eq!(
        kinds("Var RULE If"),
        vec![
            TokenKind::Identifier("Var".into()),
            TokenKind::Identifier("RULE".into()),
            TokenKind::Identifier("If".into()),
        ]
    );
}

#[test]
fn underscore_starts_identifier() {
    assert_eq!(
        kinds("_tmp __x a_b_1"),
        vec![
            TokenKind::Identifier("_tmp".into()),
            TokenKind::Identifier("__x".into()),
            TokenKind::Identifier("a_b_1".into()),
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Numbers
// ─────────────────────────────────────────────────────────────────────

#[test]
fn integer_and_decimal_numbers() {
    assert_eq!(
        kinds("0 42 3.14 255"),
        vec![
            TokenKind::Number(0.0),
            TokenKind::Number(42.0),
            TokenKind::Number(3.14),
            TokenKind::Number(255.0),
        ]
    );
}

#[test]
fn trailing_dot_is_member_access_not_decimal() {
    assert_eq!(
        kinds("1.x"),
        vec![
            TokenKind::Number(1.0),
            TokenKind::Dot,
            TokenKind::Identifier("x".into()),
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Strings
// ─────────────────────────────────────────────────────────────────────

#[test]
fn double_and_single_quoted_strings() {
    assert_eq!(
        kinds(r#""hello" 'world'"#),
        vec![
            TokenKind::Str("hello".into()),
            TokenKind::Str("world".into()),
        ]
    );
}

#[test]
fn string_escapes() {
    assert_eq!(
        kinds(r#""a\"b" 'c\'d' "e\\f""#),
        vec![
            TokenKind::Str("a\"b".into()),
            TokenKind::Str("c'd".into()),
            TokenKind::Str("e\\f".into()),
        ]
    );
}

#[test]
fn quote_styles_do_not_terminate_each_other() {
    assert_eq!(
        kinds(r#""it's fine""#),
        vec![TokenKind::Str("it's fine".into())]
    );
}

#[test]
fn unterminated_string_is_an_error() {
    let (_, errors) = kinds_with_errors("var s = \"oops;\n");
    assert_eq!(errors, 1);
}

// ─────────────────────────────────────────────────────────────────────
// Operators & comments
// ─────────────────────────────────────────────────────────────────────

#[test]
fn two_char_operators() {
    assert_eq!(
        kinds("== != <= >= && ||"),
        vec![
            TokenKind::EqEq,
            TokenKind::BangEq,
            TokenKind::LessEq,
            TokenKind::GreaterEq,
            TokenKind::AmpAmp,
            TokenKind::PipePipe,
        ]
    );
}

#[test]
fn division_vs_comment() {
    assert_eq!(
        kinds("a / b // this is a comment\nc"),
        vec![
            TokenKind::Identifier("a".into()),
            TokenKind::Slash,
            TokenKind::Identifier("b".into()),
            TokenKind::Identifier("c".into()),
        ]
    );
}

#[test]
fn comment_at_eof_without_newline() {
    assert_eq!(kinds("step(); // trailing"), vec![
        TokenKind::Identifier("step".into()),
        TokenKind::LParen,
        TokenKind::RParen,
        TokenKind::Semicolon,
    ]);
}

// ─────────────────────────────────────────────────────────────────────
// Error recovery
// ─────────────────────────────────────────────────────────────────────

#[test]
fn unknown_character_is_skipped_with_error() {
    let (kinds, errors) = kinds_with_errors("var a = 1 # ;");
    assert_eq!(errors, 1);
    // The `#` is dropped; surrounding tokens survive.
    assert!(kinds.contains(&TokenKind::Semicolon));
    assert!(kinds.contains(&TokenKind::Number(1.0)));
}

#[test]
fn single_amp_and_pipe_are_errors() {
    let (_, errors) = kinds_with_errors("a & b | c");
    assert_eq!(errors, 2);
}

#[test]
fn line_and_column_tracking() {
    let sf = SourceFile::new("test.mpl", "var a;\n  set(1, 2);");
    let result = Lexer::new(&sf).lex();
    assert!(!result.errors.has_errors());
    // `set` starts at line 2, column 3
    let set_tok = result
        .tokens
        .iter()
        .find(|t| t.kind == TokenKind::Identifier("set".into()))
        .unwrap();
    assert_eq!(set_tok.span.start_line, 2);
    assert_eq!(set_tok.span.start_col, 3);
}
