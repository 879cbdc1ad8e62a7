//! Recursive-descent parser with precedence climbing for binary operators.
//!
//! The parser never aborts. Syntax errors become diagnostics plus `Error`
//! placeholder nodes, and parsing resynchronizes at statement boundaries so
//! one mistake does not cascade into a wall of follow-on errors.

use crate::ast::{
    Block, ExprKind, Expression, ExpressionStatement, ForInit, ForStatement, FunctionCall,
    FunctionDecl, IfStatement, Param, Program, ReturnStatement, Statement, VariableDecl,
};
use crate::diagnostics::Diagnostic;
use crate::scanner::Scanner;
use crate::token::{Keyword, Op, Position, Sep, TokenKind};

pub struct Parser<'a> {
    scanner: Scanner<'a>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            scanner: Scanner::new(input),
            diagnostics: Vec::new(),
        }
    }

    /// Parses a whole program. Always returns a tree; check the diagnostics
    /// before handing it to later phases.
    pub fn parse(mut self) -> (Program, Vec<Diagnostic>) {
        let pos = self.scanner.peek().pos;
        let mut stmts = Vec::new();
        while !self.scanner.peek().is_eof() {
            if self.eat_sep(Sep::Semicolon) {
                continue;
            }
            stmts.push(self.parse_statement());
        }
        let program = Program {
            body: Block::new(stmts, pos),
            sym: None,
        };
        let mut diagnostics = self.scanner.take_diagnostics();
        diagnostics.append(&mut self.diagnostics);
        diagnostics.sort_by_key(|d| (d.pos.line, d.pos.column));
        (program, diagnostics)
    }

    fn parse_statement(&mut self) -> Statement {
        match &self.scanner.peek().kind {
            TokenKind::Keyword(Keyword::Function) => self.parse_function_decl(),
            TokenKind::Keyword(Keyword::Let) => {
                let decl = self.parse_variable_decl();
                self.expect_sep(Sep::Semicolon);
                Statement::VariableDecl(decl)
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Sep(Sep::OpenBrace) => Statement::Block(self.parse_block()),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_function_decl(&mut self) -> Statement {
        let pos = self.scanner.next().pos;
        let name = match self.expect_identifier("function name") {
            Some(name) => name,
            None => {
                self.skip_to_sync();
                return Statement::Error(pos);
            }
        };
        self.expect_sep(Sep::OpenParen);
        let params = self.parse_params();
        self.expect_sep(Sep::CloseParen);
        let return_type_name = if self.eat_sep(Sep::Colon) {
            self.parse_type_annotation()
        } else {
            None
        };
        let body = self.parse_block();
        Statement::FunctionDecl(FunctionDecl {
            name,
            params,
            return_type_name,
            body,
            sym: None,
            pos,
        })
    }

    fn parse_params(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        if matches!(self.scanner.peek().kind, TokenKind::Sep(Sep::CloseParen)) {
            return params;
        }
        loop {
            let pos = self.scanner.peek().pos;
            match self.expect_identifier("parameter name") {
                Some(name) => {
                    let type_name = if self.eat_sep(Sep::Colon) {
                        self.parse_type_annotation()
                    } else {
                        None
                    };
                    params.push(Param {
                        name,
                        type_name,
                        sym: None,
                        pos,
                    });
                }
                None => {
                    self.skip_to_sync();
                }
            }
            if !self.eat_sep(Sep::Comma) {
                break;
            }
        }
        params
    }

    /// `let` is already the current token. Does not consume the trailing
    /// semicolon, a `for` initializer has none.
    fn parse_variable_decl(&mut self) -> VariableDecl {
        let pos = self.scanner.next().pos;
        let name = match self.expect_identifier("variable name") {
            Some(name) => name,
            None => {
                self.skip_to_sync();
                return VariableDecl {
                    name: String::new(),
                    type_name: None,
                    init: None,
                    sym: None,
                    pos,
                };
            }
        };
        let type_name = if self.eat_sep(Sep::Colon) {
            self.parse_type_annotation()
        } else {
            None
        };
        let init = if self.eat_op(Op::Assign) {
            Some(self.parse_expression())
        } else {
            None
        };
        VariableDecl {
            name,
            type_name,
            init,
            sym: None,
            pos,
        }
    }

    fn parse_type_annotation(&mut self) -> Option<String> {
        let token = self.scanner.peek().clone();
        match token.kind {
            TokenKind::Identifier(name) => {
                self.scanner.next();
                Some(name)
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.scanner.next();
                Some("null".to_string())
            }
            _ => {
                self.error_at(
                    token.pos,
                    format!("expected a type name, found '{}'", token.kind.describe()),
                );
                None
            }
        }
    }

    fn parse_if(&mut self) -> Statement {
        let pos = self.scanner.next().pos;
        self.expect_sep(Sep::OpenParen);
        let condition = self.parse_expression();
        self.expect_sep(Sep::CloseParen);
        let then_stmt = Box::new(self.parse_statement());
        let else_stmt = if self.eat_keyword(Keyword::Else) {
            Some(Box::new(self.parse_statement()))
        } else {
            None
        };
        Statement::If(IfStatement {
            condition,
            then_stmt,
            else_stmt,
            pos,
        })
    }

    fn parse_for(&mut self) -> Statement {
        let pos = self.scanner.next().pos;
        self.expect_sep(Sep::OpenParen);
        let init = if matches!(self.scanner.peek().kind, TokenKind::Sep(Sep::Semicolon)) {
            None
        } else if matches!(self.scanner.peek().kind, TokenKind::Keyword(Keyword::Let)) {
            Some(ForInit::Decl(self.parse_variable_decl()))
        } else {
            Some(ForInit::Expr(self.parse_expression()))
        };
        self.expect_sep(Sep::Semicolon);
        let condition = if matches!(self.scanner.peek().kind, TokenKind::Sep(Sep::Semicolon)) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.expect_sep(Sep::Semicolon);
        let increment = if matches!(self.scanner.peek().kind, TokenKind::Sep(Sep::CloseParen)) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.expect_sep(Sep::CloseParen);
        let body = Box::new(self.parse_statement());
        Statement::For(ForStatement {
            init,
            condition,
            increment,
            body,
            scope: None,
            pos,
        })
    }

    fn parse_return(&mut self) -> Statement {
        let pos = self.scanner.next().pos;
        let exp = if matches!(self.scanner.peek().kind, TokenKind::Sep(Sep::Semicolon)) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.expect_sep(Sep::Semicolon);
        Statement::Return(ReturnStatement { exp, pos })
    }

    fn parse_block(&mut self) -> Block {
        let pos = self.scanner.peek().pos;
        if !self.expect_sep(Sep::OpenBrace) {
            self.skip_to_sync();
            return Block::new(Vec::new(), pos);
        }
        let mut stmts = Vec::new();
        loop {
            match &self.scanner.peek().kind {
                TokenKind::Sep(Sep::CloseBrace) => {
                    self.scanner.next();
                    break;
                }
                TokenKind::Eof => {
                    let pos = self.scanner.peek().pos;
                    self.error_at(pos, "expected '}', found end of input".to_string());
                    break;
                }
                TokenKind::Sep(Sep::Semicolon) => {
                    self.scanner.next();
                }
                _ => stmts.push(self.parse_statement()),
            }
        }
        Block::new(stmts, pos)
    }

    fn parse_expression_statement(&mut self) -> Statement {
        let pos = self.scanner.peek().pos;
        let exp = self.parse_expression();
        if matches!(exp.kind, ExprKind::Error) {
            self.skip_to_sync();
            self.eat_sep(Sep::Semicolon);
            return Statement::Error(pos);
        }
        self.expect_sep(Sep::Semicolon);
        Statement::Expr(ExpressionStatement { exp, pos })
    }

    fn parse_expression(&mut self) -> Expression {
        self.parse_assignment()
    }

    /// Assignment is right-associative and binds loosest. Operands and
    /// operators are collected left to right, then folded from the right.
    fn parse_assignment(&mut self) -> Expression {
        let first = self.parse_binary(2);
        let mut operands = vec![first];
        let mut ops = Vec::new();
        loop {
            let op = match self.scanner.peek().kind {
                TokenKind::Op(op) if op.is_assign() => op,
                _ => break,
            };
            let pos = self.scanner.next().pos;
            ops.push((op, pos));
            operands.push(self.parse_binary(2));
        }
        let mut expr = operands.pop().unwrap();
        while let Some(lhs) = operands.pop() {
            let (op, pos) = ops.pop().unwrap();
            expr = Expression::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(expr),
                },
                pos,
            );
        }
        expr
    }

    /// Precedence climbing: keeps absorbing operators that bind strictly
    /// tighter than `floor`, which makes equal-precedence operators
    /// left-associative.
    fn parse_binary(&mut self, floor: i32) -> Expression {
        let mut lhs = self.parse_unary();
        loop {
            let op = match self.scanner.peek().kind {
                TokenKind::Op(op) => op,
                _ => break,
            };
            let prec = op.precedence();
            if prec <= floor || op.is_assign() {
                break;
            }
            let pos = self.scanner.next().pos;
            let rhs = self.parse_binary(prec);
            lhs = Expression::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            );
        }
        lhs
    }

    fn parse_unary(&mut self) -> Expression {
        let token = self.scanner.peek().clone();
        if let TokenKind::Op(op) = token.kind {
            // Prefix plus is the identity; it parses away entirely.
            if op == Op::Plus {
                self.scanner.next();
                return self.parse_unary();
            }
            if matches!(op, Op::Not | Op::Minus | Op::Inc | Op::Dec) {
                self.scanner.next();
                let operand = Box::new(self.parse_unary());
                return Expression::new(
                    ExprKind::Unary {
                        op,
                        is_prefix: true,
                        operand,
                    },
                    token.pos,
                );
            }
        }
        let mut expr = self.parse_primary();
        // Postfix ++ and --.
        loop {
            match self.scanner.peek().kind {
                TokenKind::Op(op @ (Op::Inc | Op::Dec)) => {
                    let pos = self.scanner.next().pos;
                    expr = Expression::new(
                        ExprKind::Unary {
                            op,
                            is_prefix: false,
                            operand: Box::new(expr),
                        },
                        pos,
                    );
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> Expression {
        let token = self.scanner.peek().clone();
        match token.kind {
            TokenKind::IntegerLiteral(value) => {
                self.scanner.next();
                Expression::new(ExprKind::IntegerLiteral(value), token.pos)
            }
            TokenKind::DecimalLiteral(value) => {
                self.scanner.next();
                Expression::new(ExprKind::DecimalLiteral(value), token.pos)
            }
            TokenKind::StringLiteral(value) => {
                self.scanner.next();
                Expression::new(ExprKind::StringLiteral(value), token.pos)
            }
            TokenKind::Keyword(Keyword::True) => {
                self.scanner.next();
                Expression::new(ExprKind::BooleanLiteral(true), token.pos)
            }
            TokenKind::Keyword(Keyword::False) => {
                self.scanner.next();
                Expression::new(ExprKind::BooleanLiteral(false), token.pos)
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.scanner.next();
                Expression::new(ExprKind::NullLiteral, token.pos)
            }
            TokenKind::Sep(Sep::OpenParen) => {
                self.scanner.next();
                let inner = self.parse_expression();
                self.expect_sep(Sep::CloseParen);
                inner
            }
            TokenKind::Identifier(name) => {
                // Two-token lookahead decides call versus variable
                // reference.
                if matches!(self.scanner.peek2().kind, TokenKind::Sep(Sep::OpenParen)) {
                    self.parse_function_call()
                } else {
                    self.scanner.next();
                    Expression::new(ExprKind::Variable { name, sym: None }, token.pos)
                }
            }
            _ => {
                self.error_at(
                    token.pos,
                    format!("expected an expression, found '{}'", token.kind.describe()),
                );
                if !token.is_eof() && !Self::is_sync_token(&token.kind) {
                    self.scanner.next();
                }
                Expression::error(token.pos)
            }
        }
    }

    fn parse_function_call(&mut self) -> Expression {
        let token = self.scanner.next();
        let name = match token.kind {
            TokenKind::Identifier(name) => name,
            _ => unreachable!("caller checked for an identifier"),
        };
        self.scanner.next(); // (
        let mut args = Vec::new();
        if !matches!(self.scanner.peek().kind, TokenKind::Sep(Sep::CloseParen)) {
            loop {
                args.push(self.parse_expression());
                if !self.eat_sep(Sep::Comma) {
                    break;
                }
            }
        }
        self.expect_sep(Sep::CloseParen);
        Expression::new(
            ExprKind::Call(FunctionCall {
                name,
                args,
                sym: None,
                pos: token.pos,
            }),
            token.pos,
        )
    }

    /// Skips ahead to a token that can plausibly start or end a statement.
    fn skip_to_sync(&mut self) {
        loop {
            let token = self.scanner.peek();
            if token.is_eof() || Self::is_sync_token(&token.kind) {
                return;
            }
            self.scanner.next();
        }
    }

    fn is_sync_token(kind: &TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Sep(
                Sep::Comma
                    | Sep::Semicolon
                    | Sep::OpenBrace
                    | Sep::CloseBrace
                    | Sep::OpenParen
                    | Sep::CloseParen
            ) | TokenKind::Keyword(_)
        )
    }

    fn eat_sep(&mut self, sep: Sep) -> bool {
        if self.scanner.peek().kind == TokenKind::Sep(sep) {
            self.scanner.next();
            true
        } else {
            false
        }
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.scanner.peek().kind == TokenKind::Op(op) {
            self.scanner.next();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.scanner.peek().kind == TokenKind::Keyword(keyword) {
            self.scanner.next();
            true
        } else {
            false
        }
    }

    fn expect_sep(&mut self, sep: Sep) -> bool {
        if self.eat_sep(sep) {
            return true;
        }
        let token = self.scanner.peek().clone();
        self.error_at(
            token.pos,
            format!(
                "expected '{}', found '{}'",
                sep.text(),
                token.kind.describe()
            ),
        );
        false
    }

    fn expect_identifier(&mut self, what: &str) -> Option<String> {
        let token = self.scanner.peek().clone();
        match token.kind {
            TokenKind::Identifier(name) => {
                self.scanner.next();
                Some(name)
            }
            _ => {
                self.error_at(
                    token.pos,
                    format!("expected {what}, found '{}'", token.kind.describe()),
                );
                None
            }
        }
    }

    fn error_at(&mut self, pos: Position, message: String) {
        self.diagnostics.push(Diagnostic::error(message, pos));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn parse_ok(src: &str) -> Program {
        let (program, diagnostics) = Parser::new(src).parse();
        assert!(diagnostics.is_empty(), "unexpected: {diagnostics:?}");
        program
    }

    fn only_expr(program: &Program) -> &Expression {
        match &program.body.stmts[..] {
            [Statement::Expr(stmt)] => &stmt.exp,
            other => panic!("expected one expression statement, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let program = parse_ok("1 + 2 * 3;");
        let ExprKind::Binary { op, lhs, rhs } = &only_expr(&program).kind else {
            panic!()
        };
        assert_eq!(*op, Op::Plus);
        assert_eq!(lhs.kind, ExprKind::IntegerLiteral(1));
        let ExprKind::Binary { op, .. } = &rhs.kind else {
            panic!()
        };
        assert_eq!(*op, Op::Multiply);
    }

    #[test]
    fn subtraction_is_left_associative() {
        let program = parse_ok("10 - 3 - 2;");
        let ExprKind::Binary { op, lhs, rhs } = &only_expr(&program).kind else {
            panic!()
        };
        assert_eq!(*op, Op::Minus);
        assert_eq!(rhs.kind, ExprKind::IntegerLiteral(2));
        let ExprKind::Binary { op, .. } = &lhs.kind else {
            panic!()
        };
        assert_eq!(*op, Op::Minus);
    }

    #[test]
    fn assignment_is_right_associative() {
        let program = parse_ok("a = b = 3;");
        let ExprKind::Binary { op, lhs, rhs } = &only_expr(&program).kind else {
            panic!()
        };
        assert_eq!(*op, Op::Assign);
        assert!(matches!(&lhs.kind, ExprKind::Variable { name, .. } if name == "a"));
        let ExprKind::Binary { op, lhs, .. } = &rhs.kind else {
            panic!()
        };
        assert_eq!(*op, Op::Assign);
        assert!(matches!(&lhs.kind, ExprKind::Variable { name, .. } if name == "b"));
    }

    #[test]
    fn parentheses_override_precedence() {
        let program = parse_ok("(1 + 2) * 3;");
        let ExprKind::Binary { op, lhs, .. } = &only_expr(&program).kind else {
            panic!()
        };
        assert_eq!(*op, Op::Multiply);
        assert!(matches!(&lhs.kind, ExprKind::Binary { op: Op::Plus, .. }));
    }

    #[test]
    fn call_versus_variable_reference() {
        let program = parse_ok("foo(bar);");
        let ExprKind::Call(call) = &only_expr(&program).kind else {
            panic!()
        };
        assert_eq!(call.name, "foo");
        assert_eq!(call.args.len(), 1);
        assert!(matches!(&call.args[0].kind, ExprKind::Variable { name, .. } if name == "bar"));
    }

    #[test]
    fn function_decl_with_params_and_return_type() {
        let program = parse_ok(indoc! {r#"
            function add(a: integer, b: integer): integer {
                return a + b;
            }
        "#});
        let [Statement::FunctionDecl(decl)] = &program.body.stmts[..] else {
            panic!()
        };
        assert_eq!(decl.name, "add");
        assert_eq!(decl.params.len(), 2);
        assert_eq!(decl.params[0].type_name.as_deref(), Some("integer"));
        assert_eq!(decl.return_type_name.as_deref(), Some("integer"));
        assert_eq!(decl.body.stmts.len(), 1);
    }

    #[test]
    fn variable_decl_forms() {
        let program = parse_ok(indoc! {r#"
            let a;
            let b: string;
            let c = 1;
            let d: number = 2.5;
        "#});
        assert_eq!(program.body.stmts.len(), 4);
        let [Statement::VariableDecl(a), Statement::VariableDecl(b), Statement::VariableDecl(c), Statement::VariableDecl(d)] =
            &program.body.stmts[..]
        else {
            panic!()
        };
        assert!(a.type_name.is_none() && a.init.is_none());
        assert_eq!(b.type_name.as_deref(), Some("string"));
        assert!(c.init.is_some());
        assert_eq!(d.type_name.as_deref(), Some("number"));
        assert_eq!(
            d.init.as_ref().unwrap().kind,
            ExprKind::DecimalLiteral(2.5)
        );
    }

    #[test]
    fn if_else_and_for_statements() {
        let program = parse_ok(indoc! {r#"
            if (a > 0) {
                println(a);
            } else {
                println(0);
            }
            for (let i = 0; i < 10; i++) {
                println(i);
            }
        "#});
        let [Statement::If(if_stmt), Statement::For(for_stmt)] = &program.body.stmts[..] else {
            panic!()
        };
        assert!(if_stmt.else_stmt.is_some());
        assert!(matches!(for_stmt.init, Some(ForInit::Decl(_))));
        assert!(for_stmt.condition.is_some());
        let increment = for_stmt.increment.as_ref().unwrap();
        assert!(matches!(
            increment.kind,
            ExprKind::Unary {
                op: Op::Inc,
                is_prefix: false,
                ..
            }
        ));
    }

    #[test]
    fn prefix_and_postfix_unary() {
        let program = parse_ok("!a && --b;");
        let ExprKind::Binary { op, lhs, rhs } = &only_expr(&program).kind else {
            panic!()
        };
        assert_eq!(*op, Op::And);
        assert!(matches!(
            lhs.kind,
            ExprKind::Unary {
                op: Op::Not,
                is_prefix: true,
                ..
            }
        ));
        assert!(matches!(
            rhs.kind,
            ExprKind::Unary {
                op: Op::Dec,
                is_prefix: true,
                ..
            }
        ));
    }

    #[test]
    fn prefix_plus_is_identity() {
        let program = parse_ok("+a;");
        assert!(matches!(
            only_expr(&program).kind,
            ExprKind::Variable { .. }
        ));
    }

    #[test]
    fn compound_assignment_tokens_survive_parsing() {
        let program = parse_ok("a += 2;");
        let ExprKind::Binary { op, .. } = &only_expr(&program).kind else {
            panic!()
        };
        assert_eq!(*op, Op::PlusAssign);
    }

    #[test]
    fn recovery_produces_error_node_and_continues() {
        let (program, diagnostics) = Parser::new(indoc! {r#"
            let a = ;
            println(1);
        "#})
        .parse();
        assert!(!diagnostics.is_empty());
        // The second statement still parses.
        assert!(program
            .body
            .stmts
            .iter()
            .any(|stmt| matches!(stmt, Statement::Expr(_))));
    }

    #[test]
    fn missing_close_brace_is_reported_once() {
        let (_, diagnostics) = Parser::new("function f() { let a = 1;").parse();
        assert_eq!(
            diagnostics
                .iter()
                .filter(|d| d.message.contains("end of input"))
                .count(),
            1
        );
    }
}
