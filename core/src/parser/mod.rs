//! Recursive-descent parser: token stream to AST.
//!
//! Hand-written, one token of lookahead. Grammar (EBNF):
//!
//! ```text
//! program    := item*
//! item       := import | "export"? (function | "let" ident "=" expr ";") | statement
//! import     := "import" (ident | "{" ident ("," ident)* "}") "from" (string | ident) ";"
//! function   := "fn" ident "(" (ident ("," ident)*)? ")" block
//! block      := "{" statement* "}"
//! statement  := "let" ident "=" expr ";"
//!             | "read" ident ";"
//!             | "print" expr ";"
//!             | "if" "(" expr ")" block ("else" block)?
//!             | "while" "(" expr ")" block
//!             | "return" expr? ";"
//!             | "throw" expr ";"
//!             | "try" block "catch" "(" ident? ")" block
//!             | expr ";"
//! expr       := assignment
//! assignment := equality ("=" assignment)?
//! equality   := relational (("==" | "!=") relational)*
//! relational := additive (("<" | ">" | "<=" | ">=") additive)*
//! additive   := multiplicative (("+" | "-") multiplicative)*
//! multiplicative := unary (("*" | "/") unary)*
//! unary      := "-" unary | postfix
//! postfix    := primary ("[" expr "]")*
//! primary    := number | string | "[" (expr ("," expr)*)? "]"
//!             | ident "(" args ")" | ident | "(" expr ")"
//! ```
//!
//! `assignment`'s left-hand side may only be an `ident` or a `postfix` ending
//! in `[expr]` — anything else is rejected once parsed, by
//! `Expression::is_assignable`, rather than restricted by the grammar itself
//! (this keeps the grammar's expression precedence uniform instead of
//! special-casing assignment targets token by token).

pub mod ast;
pub mod error;

use ast::*;
pub use error::ParseError;

use crate::lexer::{Span, Token, TokenKind};

/// Recursive expression parsing is bounded so pathological input (deeply
/// nested parentheses) fails with a diagnostic instead of overflowing the
/// host stack.
const MAX_EXPR_DEPTH: usize = 256;

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    pub fn parse_program(tokens: &'a [Token]) -> Result<Program, ParseError> {
        let mut parser = Parser::new(tokens);
        let mut items = Vec::new();
        while !parser.at_eof() {
            let before = parser.pos;
            items.push(parser.parse_item()?);
            if parser.pos == before {
                return Err(ParseError::NoProgress {
                    span: parser.peek().span,
                });
            }
        }
        Ok(Program { items })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else if self.at_eof() {
            Err(ParseError::UnexpectedEof {
                expected: kind.to_string(),
            })
        } else {
            Err(ParseError::UnexpectedToken {
                expected: kind.to_string(),
                found: self.peek().kind.to_string(),
                span: self.peek().span,
            })
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                let span = self.peek().span;
                self.advance();
                Ok((name, span))
            }
            other => {
                if matches!(other, TokenKind::Eof) {
                    Err(ParseError::UnexpectedEof {
                        expected: "identifier".into(),
                    })
                } else {
                    Err(ParseError::UnexpectedToken {
                        expected: "identifier".into(),
                        found: other.to_string(),
                        span: self.peek().span,
                    })
                }
            }
        }
    }

    fn enter(&mut self, span: Span) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_EXPR_DEPTH {
            return Err(ParseError::RecursionLimitExceeded {
                limit: MAX_EXPR_DEPTH,
                span,
            });
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }

    fn parse_item(&mut self) -> Result<Item, ParseError> {
        if self.check(&TokenKind::Import) {
            return self.parse_import().map(Item::Import);
        }
        if self.check(&TokenKind::Export) {
            let export_span = self.advance().span;
            if self.check(&TokenKind::Let) {
                return self
                    .parse_let_statement(true, export_span)
                    .map(Item::Statement);
            }
            let func = self.parse_function(true)?;
            return Ok(Item::Function(func));
        }
        if self.check(&TokenKind::Fn) {
            return self.parse_function(false).map(Item::Function);
        }
        self.parse_statement().map(Item::Statement)
    }

    fn parse_import(&mut self) -> Result<ImportDecl, ParseError> {
        let start = self.expect(TokenKind::Import)?.span;
        let names = if self.check(&TokenKind::LBrace) {
            self.advance();
            let mut names = Vec::new();
            let (first, _) = self.expect_ident()?;
            names.push(first);
            while self.check(&TokenKind::Comma) {
                self.advance();
                let (name, _) = self.expect_ident()?;
                names.push(name);
            }
            self.expect(TokenKind::RBrace)?;
            names
        } else {
            let (name, _) = self.expect_ident()?;
            vec![name]
        };
        self.expect(TokenKind::From)?;
        let module_tok = self.expect_module_name()?;
        let end = self.expect(TokenKind::Semicolon)?.span;
        Ok(ImportDecl {
            names,
            module: module_tok,
            span: start.merge(end),
        })
    }

    /// A module target per the grammar's `"from" (STRING|IDENT)` — either a
    /// quoted path or a bare module name.
    fn expect_module_name(&mut self) -> Result<String, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::String(s) => {
                self.advance();
                Ok(s)
            }
            TokenKind::Ident(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(ParseError::UnexpectedToken {
                expected: "string literal or identifier".into(),
                found: self.peek().kind.to_string(),
                span: self.peek().span,
            }),
        }
    }

    fn parse_function(&mut self, exported: bool) -> Result<FunctionDecl, ParseError> {
        let start = self.expect(TokenKind::Fn)?.span;
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            let (p, _) = self.expect_ident()?;
            params.push(p);
            while self.check(&TokenKind::Comma) {
                self.advance();
                let (p, _) = self.expect_ident()?;
                params.push(p);
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        let span = start.merge(body.span);
        Ok(FunctionDecl {
            name,
            params,
            body,
            exported,
            span,
        })
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let before = self.pos;
            statements.push(self.parse_statement()?);
            if self.pos == before {
                return Err(ParseError::NoProgress {
                    span: self.peek().span,
                });
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        Ok(Block {
            statements,
            span: start.merge(end),
        })
    }

    fn parse_let_statement(&mut self, exported: bool, start: Span) -> Result<Statement, ParseError> {
        self.expect(TokenKind::Let)?;
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::Eq)?;
        let value = self.parse_expr()?;
        let end = self.expect(TokenKind::Semicolon)?.span;
        Ok(Statement::Let {
            name,
            value,
            exported,
            span: start.merge(end),
        })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Let => {
                let start = self.peek().span;
                self.parse_let_statement(false, start)
            }
            TokenKind::Read => {
                let start = self.advance().span;
                let (var, _) = self.expect_ident()?;
                let end = self.expect(TokenKind::Semicolon)?.span;
                Ok(Statement::Read {
                    var,
                    span: start.merge(end),
                })
            }
            TokenKind::Print => {
                let start = self.advance().span;
                let value = self.parse_expr()?;
                let end = self.expect(TokenKind::Semicolon)?.span;
                Ok(Statement::Print {
                    value,
                    span: start.merge(end),
                })
            }
            TokenKind::If => {
                let start = self.advance().span;
                self.expect(TokenKind::LParen)?;
                let condition = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let then_branch = self.parse_block()?;
                let mut span = start.merge(then_branch.span);
                let else_branch = if self.check(&TokenKind::Else) {
                    self.advance();
                    let block = self.parse_block()?;
                    span = span.merge(block.span);
                    Some(block)
                } else {
                    None
                };
                Ok(Statement::If {
                    condition,
                    then_branch,
                    else_branch,
                    span,
                })
            }
            TokenKind::While => {
                let start = self.advance().span;
                self.expect(TokenKind::LParen)?;
                let condition = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let body = self.parse_block()?;
                let span = start.merge(body.span);
                Ok(Statement::While {
                    condition,
                    body,
                    span,
                })
            }
            TokenKind::Return => {
                let start = self.advance().span;
                let value = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let end = self.expect(TokenKind::Semicolon)?.span;
                Ok(Statement::Return {
                    value,
                    span: start.merge(end),
                })
            }
            TokenKind::Throw => {
                let start = self.advance().span;
                let value = self.parse_expr()?;
                let end = self.expect(TokenKind::Semicolon)?.span;
                Ok(Statement::Throw {
                    value,
                    span: start.merge(end),
                })
            }
            TokenKind::Try => {
                let start = self.advance().span;
                let try_block = self.parse_block()?;
                self.expect(TokenKind::Catch)?;
                self.expect(TokenKind::LParen)?;
                let catch_name = if self.check(&TokenKind::RParen) {
                    None
                } else {
                    let (name, _) = self.expect_ident()?;
                    Some(name)
                };
                self.expect(TokenKind::RParen)?;
                let catch_block = self.parse_block()?;
                let span = start.merge(catch_block.span);
                Ok(Statement::TryCatch {
                    try_block,
                    catch_name,
                    catch_block,
                    span,
                })
            }
            _ => {
                let value = self.parse_expr()?;
                let start = value.span();
                let end = self.expect(TokenKind::Semicolon)?.span;
                Ok(Statement::Expr {
                    value,
                    span: start.merge(end),
                })
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Expression, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expression, ParseError> {
        let span = self.peek().span;
        self.enter(span)?;
        let target = self.parse_equality()?;
        let result = if self.check(&TokenKind::Eq) {
            self.advance();
            if !target.is_assignable() {
                Err(ParseError::InvalidAssignmentTarget {
                    span: target.span(),
                })
            } else {
                let value = self.parse_assignment()?;
                let span = target.span().merge(value.span());
                Ok(Expression::Assignment {
                    target: Box::new(target),
                    value: Box::new(value),
                    span,
                })
            }
        } else {
            Ok(target)
        };
        self.exit();
        result
    }

    fn parse_equality(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::BangEq => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            let span = left.span().merge(right.span());
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            let span = left.span().merge(right.span());
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            let span = left.span().merge(right.span());
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            let span = left.span().merge(right.span());
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        if self.check(&TokenKind::Minus) {
            let start = self.advance().span;
            let value = self.parse_unary()?;
            let span = start.merge(value.span());
            return Ok(Expression::Negate {
                value: Box::new(value),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;
        while self.check(&TokenKind::LBracket) {
            let start = expr.span();
            self.advance();
            let index = self.parse_expr()?;
            let end = self.expect(TokenKind::RBracket)?.span;
            expr = Expression::ArrayAccess {
                array: Box::new(expr),
                index: Box::new(index),
                span: start.merge(end),
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expression::Number {
                    value,
                    span: tok.span,
                })
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expression::StringLit {
                    value,
                    span: tok.span,
                })
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    elements.push(self.parse_expr()?);
                    while self.check(&TokenKind::Comma) {
                        self.advance();
                        elements.push(self.parse_expr()?);
                    }
                }
                let end = self.expect(TokenKind::RBracket)?.span;
                Ok(Expression::ArrayLit {
                    elements,
                    span: tok.span.merge(end),
                })
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RParen) {
                        args.push(self.parse_expr()?);
                        while self.check(&TokenKind::Comma) {
                            self.advance();
                            args.push(self.parse_expr()?);
                        }
                    }
                    let end = self.expect(TokenKind::RParen)?.span;
                    Ok(Expression::Call {
                        callee: name,
                        args,
                        span: tok.span.merge(end),
                    })
                } else {
                    Ok(Expression::Ident {
                        name,
                        span: tok.span,
                    })
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEof {
                expected: "expression".into(),
            }),
            other => Err(ParseError::UnexpectedToken {
                expected: "expression".into(),
                found: other.to_string(),
                span: tok.span,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Program {
        let tokens = Lexer::tokenize(src).expect("lex ok");
        Parser::parse_program(&tokens).expect("parse ok")
    }

    #[test]
    fn parses_let_and_print() {
        let program = parse("let x = 1 + 2; print x;");
        assert_eq!(program.items.len(), 2);
        assert!(matches!(program.items[0], Item::Statement(Statement::Let { .. })));
        assert!(matches!(program.items[1], Item::Statement(Statement::Print { .. })));
    }

    #[test]
    fn parses_export_let() {
        let program = parse("export let x = 5;");
        match &program.items[0] {
            Item::Statement(Statement::Let { exported, name, .. }) => {
                assert!(exported);
                assert_eq!(name, "x");
            }
            other => panic!("expected exported let, got {other:?}"),
        }
    }

    #[test]
    fn parses_function_with_params_and_return() {
        let program = parse("export fn add(a, b) { return a + b; }");
        match &program.items[0] {
            Item::Function(f) => {
                assert_eq!(f.name, "add");
                assert_eq!(f.params, vec!["a", "b"]);
                assert!(f.exported);
            }
            _ => panic!("expected function"),
        }
    }

    #[test]
    fn parses_if_else_and_while() {
        let program = parse(
            "fn f() { if (x < 1) { x = 1; } else { x = 2; } while (x < 10) { x = x + 1; } }",
        );
        assert_eq!(program.items.len(), 1);
    }

    #[test]
    fn parses_try_catch_and_throw() {
        let program = parse("fn f() { try { throw 1; } catch (e) { print e; } }");
        match &program.items[0] {
            Item::Function(f) => {
                assert!(matches!(f.body.statements[0], Statement::TryCatch { .. }));
            }
            _ => panic!("expected function"),
        }
    }

    #[test]
    fn parses_braced_import() {
        let program = parse("import { foo, bar } from \"mod\";");
        match &program.items[0] {
            Item::Import(i) => {
                assert_eq!(i.names, vec!["foo", "bar"]);
                assert_eq!(i.module, "mod");
            }
            _ => panic!("expected import"),
        }
    }

    #[test]
    fn parses_single_ident_import() {
        let program = parse("import foo from \"mod\";");
        match &program.items[0] {
            Item::Import(i) => assert_eq!(i.names, vec!["foo"]),
            _ => panic!("expected import"),
        }
    }

    #[test]
    fn import_module_target_may_be_a_bare_ident() {
        let program = parse("import add from math;");
        match &program.items[0] {
            Item::Import(i) => assert_eq!(i.module, "math"),
            _ => panic!("expected import"),
        }
    }

    #[test]
    fn bare_comma_list_import_is_a_parse_error() {
        let tokens = Lexer::tokenize("import foo, bar from \"mod\";").unwrap();
        assert!(Parser::parse_program(&tokens).is_err());
    }

    #[test]
    fn catch_binding_is_optional() {
        let program = parse("fn f() { try { throw 1; } catch () { print 0; } }");
        match &program.items[0] {
            Item::Function(f) => match &f.body.statements[0] {
                Statement::TryCatch { catch_name, .. } => assert_eq!(*catch_name, None),
                other => panic!("expected try/catch, got {other:?}"),
            },
            _ => panic!("expected function"),
        }
    }

    #[test]
    fn precedence_is_respected() {
        let program = parse("let x = 1 + 2 * 3;");
        match &program.items[0] {
            Item::Statement(Statement::Let { value, .. }) => match value {
                Expression::Binary { op: BinaryOp::Add, right, .. } => {
                    assert!(matches!(**right, Expression::Binary { op: BinaryOp::Mul, .. }));
                }
                other => panic!("expected addition at top, got {other:?}"),
            },
            _ => panic!("expected let"),
        }
    }

    #[test]
    fn call_expression_and_read_statement() {
        let program = parse("read n; let x = f(1, n);");
        assert!(matches!(program.items[0], Item::Statement(Statement::Read { .. })));
        match &program.items[1] {
            Item::Statement(Statement::Let { value, .. }) => match value {
                Expression::Call { callee, args, .. } => {
                    assert_eq!(callee, "f");
                    assert_eq!(args.len(), 2);
                }
                other => panic!("expected call, got {other:?}"),
            },
            _ => panic!("expected let"),
        }
    }

    #[test]
    fn parses_array_literal_and_access() {
        let program = parse("let a = [1, 2, 3]; print a[0];");
        match &program.items[0] {
            Item::Statement(Statement::Let { value, .. }) => {
                assert!(matches!(value, Expression::ArrayLit { elements, .. } if elements.len() == 3));
            }
            _ => panic!("expected let"),
        }
        match &program.items[1] {
            Item::Statement(Statement::Print { value, .. }) => {
                assert!(matches!(value, Expression::ArrayAccess { .. }));
            }
            _ => panic!("expected print"),
        }
    }

    #[test]
    fn parses_chained_assignment() {
        let program = parse("fn f() { x = y = 1; }");
        match &program.items[0] {
            Item::Function(f) => match &f.body.statements[0] {
                Statement::Expr { value: Expression::Assignment { target, value, .. }, .. } => {
                    assert!(matches!(**target, Expression::Ident { .. }));
                    assert!(matches!(**value, Expression::Assignment { .. }));
                }
                other => panic!("expected assignment expr statement, got {other:?}"),
            },
            _ => panic!("expected function"),
        }
    }

    #[test]
    fn parses_array_index_assignment() {
        let program = parse("fn f() { a[0] = 5; }");
        match &program.items[0] {
            Item::Function(f) => match &f.body.statements[0] {
                Statement::Expr { value: Expression::Assignment { target, .. }, .. } => {
                    assert!(matches!(**target, Expression::ArrayAccess { .. }));
                }
                other => panic!("expected assignment expr statement, got {other:?}"),
            },
            _ => panic!("expected function"),
        }
    }

    #[test]
    fn assignment_to_non_target_is_a_parse_error() {
        let tokens = Lexer::tokenize("fn f() { 1 + 1 = 2; }").unwrap();
        let err = Parser::parse_program(&tokens).unwrap_err();
        assert!(matches!(err, ParseError::InvalidAssignmentTarget { .. }));
    }

    #[test]
    fn missing_semicolon_is_a_parse_error() {
        let tokens = Lexer::tokenize("let x = 1").unwrap();
        let err = Parser::parse_program(&tokens).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }

    #[test]
    fn deeply_nested_parens_hit_recursion_limit() {
        let src = format!("let x = {}1{};", "(".repeat(300), ")".repeat(300));
        let tokens = Lexer::tokenize(&src).unwrap();
        let err = Parser::parse_program(&tokens).unwrap_err();
        assert!(matches!(err, ParseError::RecursionLimitExceeded { .. }));
    }
}
