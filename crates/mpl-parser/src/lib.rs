//! MPL parser: converts a token stream into an AST.

mod parse_expr;
mod parse_stmt;
mod parser;

pub use parser::{ParseResult, Parser};

use mpl_types::{ast::Program, CompileErrors, SourceFile};

/// Lex and parse a source file in one step.
///
/// Returns the program (possibly partial after error recovery) and every
/// collected lexer + parser error.
pub fn parse_source(source_file: &SourceFile) -> (Option<Program>, CompileErrors) {
    let lexed = mpl_lexer::Lexer::new(source_file).lex();
    let mut errors = lexed.errors;
    let result = Parser::new(lexed.tokens, source_file).parse();
    errors.extend(result.errors);
    (result.program, errors)
}
