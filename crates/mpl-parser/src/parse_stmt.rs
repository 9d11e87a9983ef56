//! Statement parsing.

use crate::parser::Parser;
use mpl_lexer::token::TokenKind;
use mpl_types::ast::*;
use mpl_types::ErrorCode;

impl<'src> Parser<'src> {
    /// Parse a single statement.
    pub(crate) fn parse_statement(&mut self) -> Option<Stmt> {
        match self.peek_kind() {
            TokenKind::Var => self.parse_var_decl().map(Stmt::Var),
            TokenKind::Function => self.parse_function_decl(),
            TokenKind::Rule => self.parse_rule_decl(),
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::Return => self.parse_return_stmt(),
            // `{` at statement position is a block, never an object literal
            TokenKind::LBrace => self.parse_block().map(Stmt::Block),
            _ => {
                let expr = self.parse_expression()?;
                let span = expr.span.merge(self.current_span());
                self.expect_semicolon()?;
                Some(Stmt::Expr(ExprStmt { expr, span }))
            }
        }
    }

    /// Parse a block of statements: `{ stmts... }`
    pub(crate) fn parse_block(&mut self) -> Option<Block> {
        let start = self.current_span();
        self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.at_end() {
                // Unmatched brace at EOF — structural, not recoverable.
                self.error_at(
                    ErrorCode::UNCLOSED_BLOCK,
                    "unclosed block: expected '}' before end of file",
                    start,
                );
                self.fatal = true;
                return None;
            }
            if self.too_many_errors() {
                break;
            }
            match self.parse_statement() {
                Some(stmt) => stmts.push(stmt),
                None => {
                    if self.fatal {
                        return None;
                    }
                    self.synchronize();
                }
            }
        }
        self.expect(&TokenKind::RBrace)?;
        let span = start.merge(self.previous_span());
        Some(Block { stmts, span })
    }

    /// `var a = 1, b;`
    pub(crate) fn parse_var_decl(&mut self) -> Option<VarDecl> {
        let start = self.current_span();
        self.advance(); // eat `var`
        let mut declarators = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            let decl_start = name.span;
            let init = if self.eat(&TokenKind::Eq) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            let span = decl_start.merge(self.previous_span());
            declarators.push(VarDeclarator { name, init, span });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_semicolon()?;
        let span = start.merge(self.previous_span());
        Some(VarDecl { declarators, span })
    }

    /// `function name(params) { body }`
    fn parse_function_decl(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance(); // eat `function`
        let name = self.expect_identifier()?;
        let params = self.parse_param_list()?;
        let body = self.parse_block()?;
        let span = start.merge(self.previous_span());
        Some(Stmt::Function(FunctionDecl {
            name,
            params,
            body,
            span,
        }))
    }

    /// `rule name(params) { body }`
    fn parse_rule_decl(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance(); // eat `rule`
        let name = self.expect_identifier()?;
        let params = self.parse_param_list()?;
        let body = self.parse_block()?;
        let span = start.merge(self.previous_span());
        Some(Stmt::Rule(RuleDecl {
            name,
            params,
            body,
            span,
        }))
    }

    /// `(a, b, c)` — parameter names.
    fn parse_param_list(&mut self) -> Option<Vec<Ident>> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.expect_identifier()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        Some(params)
    }

    /// `if (cond) stmt [else stmt]`
    fn parse_if_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance(); // eat `if`
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let then_branch = self.parse_statement()?;
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(self.parse_statement()?)
        } else {
            None
        };
        let span = start.merge(self.previous_span());
        Some(Stmt::If(Box::new(IfStmt {
            condition,
            then_branch,
            else_branch,
            span,
        })))
    }

    /// `while (cond) stmt`
    fn parse_while_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance(); // eat `while`
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_statement()?;
        let span = start.merge(self.previous_span());
        Some(Stmt::While(Box::new(WhileStmt {
            condition,
            body,
            span,
        })))
    }

    /// Either `for (init; cond; incr) stmt` or `for (var item of expr) stmt`,
    /// disambiguated by looking for `of` after the binding name.
    fn parse_for_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance(); // eat `for`

        // `for` `(` `var` ident `of` ...
        if self.check(&TokenKind::LParen)
            && self.look_ahead(1) == &TokenKind::Var
            && self.look_ahead(3) == &TokenKind::Of
        {
            self.advance(); // eat `(`
            self.advance(); // eat `var`
            let binding = self.expect_identifier()?;
            self.expect(&TokenKind::Of)?;
            let iterable = self.parse_expression()?;
            self.expect(&TokenKind::RParen)?;
            let body = self.parse_statement()?;
            let span = start.merge(self.previous_span());
            return Some(Stmt::ForOf(Box::new(ForOfStmt {
                binding,
                iterable,
                body,
                span,
            })));
        }

        self.expect(&TokenKind::LParen)?;

        // Initializer: var decl, expression statement, or bare `;`
        let init = if self.eat(&TokenKind::Semicolon) {
            None
        } else if self.check(&TokenKind::Var) {
            Some(Stmt::Var(self.parse_var_decl()?))
        } else {
            let expr = self.parse_expression()?;
            let span = expr.span.merge(self.current_span());
            self.expect_semicolon()?;
            Some(Stmt::Expr(ExprStmt { expr, span }))
        };

        // Condition (optional)
        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_semicolon()?;

        // Increment (optional)
        let increment = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RParen)?;

        let body = self.parse_statement()?;
        let span = start.merge(self.previous_span());
        Some(Stmt::For(Box::new(ForStmt {
            init,
            condition,
            increment,
            body,
            span,
        })))
    }

    /// `return [expr];`
    fn parse_return_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance(); // eat `return`
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_semicolon()?;
        let span = start.merge(self.previous_span());
        Some(Stmt::Return(ReturnStmt { value, span }))
    }
}
