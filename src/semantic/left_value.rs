//! Fifth pass: marks valid assignment and increment targets.
//!
//! Only a resolved variable reference can be written to. The mark is what
//! tells the backends to treat the node as a storage location instead of
//! evaluating it for its value.

use crate::ast::{Expression, ExprKind, ForInit, Program, Statement};
use crate::diagnostics::Diagnostic;
use crate::token::Op;

pub(crate) struct LeftValueAttributor<'a> {
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl<'a> LeftValueAttributor<'a> {
    pub fn run(program: &mut Program, diagnostics: &'a mut Vec<Diagnostic>) {
        let mut pass = Self { diagnostics };
        for stmt in &mut program.body.stmts {
            pass.visit_statement(stmt);
        }
    }

    fn visit_statement(&mut self, stmt: &mut Statement) {
        match stmt {
            Statement::FunctionDecl(decl) => {
                for stmt in &mut decl.body.stmts {
                    self.visit_statement(stmt);
                }
            }
            Statement::VariableDecl(decl) => {
                if let Some(init) = &mut decl.init {
                    self.visit_expression(init);
                }
            }
            Statement::If(if_stmt) => {
                self.visit_expression(&mut if_stmt.condition);
                self.visit_statement(&mut if_stmt.then_stmt);
                if let Some(else_stmt) = &mut if_stmt.else_stmt {
                    self.visit_statement(else_stmt);
                }
            }
            Statement::For(for_stmt) => {
                match &mut for_stmt.init {
                    Some(ForInit::Decl(decl)) => {
                        if let Some(init) = &mut decl.init {
                            self.visit_expression(init);
                        }
                    }
                    Some(ForInit::Expr(exp)) => self.visit_expression(exp),
                    None => {}
                }
                if let Some(condition) = &mut for_stmt.condition {
                    self.visit_expression(condition);
                }
                if let Some(increment) = &mut for_stmt.increment {
                    self.visit_expression(increment);
                }
                self.visit_statement(&mut for_stmt.body);
            }
            Statement::Block(block) => {
                for stmt in &mut block.stmts {
                    self.visit_statement(stmt);
                }
            }
            Statement::Return(ret) => {
                if let Some(exp) = &mut ret.exp {
                    self.visit_expression(exp);
                }
            }
            Statement::Expr(stmt) => self.visit_expression(&mut stmt.exp),
            Statement::Error(_) => {}
        }
    }

    fn visit_expression(&mut self, exp: &mut Expression) {
        match &mut exp.kind {
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                self.visit_expression(rhs);
                if op.is_assign() {
                    self.mark_target(lhs, "the left side of an assignment");
                } else {
                    self.visit_expression(lhs);
                }
            }
            ExprKind::Unary { op, operand, .. } => {
                if matches!(op, Op::Inc | Op::Dec) {
                    let what = if *op == Op::Inc {
                        "the target of '++'"
                    } else {
                        "the target of '--'"
                    };
                    self.mark_target(operand, what);
                } else {
                    self.visit_expression(operand);
                }
            }
            ExprKind::Call(call) => {
                for arg in &mut call.args {
                    self.visit_expression(arg);
                }
            }
            _ => {}
        }
    }

    fn mark_target(&mut self, exp: &mut Expression, what: &str) {
        match &exp.kind {
            ExprKind::Variable { sym: Some(_), .. } => exp.is_left_value = true,
            ExprKind::Variable { sym: None, .. } | ExprKind::Error => {
                // Resolution already reported this node.
            }
            _ => {
                self.diagnostics.push(Diagnostic::error(
                    format!("{what} must be a variable"),
                    exp.pos,
                ));
            }
        }
    }
}
