//! Fourth pass: makes the implicit numeric-to-string conversions explicit.
//!
//! Wherever the checker let a numeric value flow into a string position
//! (one side of `+` against a string, or a string-typed assignment or
//! initializer target), this pass wraps the numeric expression in a call
//! to the `integer_to_string` builtin. After this pass the backends never
//! have to coerce; a string `+` always sees two strings.

use crate::ast::{
    Expression, ExprKind, ForInit, FunctionCall, Program, Statement, VariableDecl,
};
use crate::builtins::BuiltinRegistry;
use crate::token::Op;
use crate::types::{SimpleType, Type};

pub(crate) struct TypeConverter<'a> {
    builtins: &'a BuiltinRegistry,
}

impl<'a> TypeConverter<'a> {
    pub fn run(program: &mut Program, builtins: &'a BuiltinRegistry) {
        let mut pass = Self { builtins };
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
            Statement::VariableDecl(decl) => self.visit_variable_decl(decl),
            Statement::If(if_stmt) => {
                self.visit_expression(&mut if_stmt.condition);
                self.visit_statement(&mut if_stmt.then_stmt);
                if let Some(else_stmt) = &mut if_stmt.else_stmt {
                    self.visit_statement(else_stmt);
                }
            }
            Statement::For(for_stmt) => {
                match &mut for_stmt.init {
                    Some(ForInit::Decl(decl)) => self.visit_variable_decl(decl),
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

    fn visit_variable_decl(&mut self, decl: &mut VariableDecl) {
        let Some(init) = &mut decl.init else {
            return;
        };
        self.visit_expression(init);
        if decl.type_name.as_deref() == Some("string") {
            self.convert_if_numeric(init);
        }
    }

    fn visit_expression(&mut self, exp: &mut Expression) {
        match &mut exp.kind {
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                self.visit_expression(lhs);
                self.visit_expression(rhs);
                match op {
                    Op::Plus => {
                        if is_string(lhs) || is_string(rhs) {
                            self.convert_if_numeric(lhs);
                            self.convert_if_numeric(rhs);
                        }
                    }
                    Op::Assign | Op::PlusAssign => {
                        if is_string(lhs) {
                            self.convert_if_numeric(rhs);
                        }
                    }
                    _ => {}
                }
            }
            ExprKind::Unary { operand, .. } => self.visit_expression(operand),
            ExprKind::Call(call) => {
                for arg in &mut call.args {
                    self.visit_expression(arg);
                }
            }
            _ => {}
        }
    }

    fn convert_if_numeric(&mut self, exp: &mut Expression) {
        let numeric = exp
            .ty
            .as_ref()
            .is_some_and(|ty| ty.is_subtype_of(&Type::Simple(SimpleType::Number)));
        if !numeric {
            return;
        }
        let pos = exp.pos;
        let operand = std::mem::replace(exp, Expression::error(pos));
        let mut call = Expression::new(
            ExprKind::Call(FunctionCall {
                name: "integer_to_string".to_string(),
                args: vec![operand],
                sym: self.builtins.lookup("integer_to_string"),
                pos,
            }),
            pos,
        );
        call.ty = Some(Type::Simple(SimpleType::String));
        *exp = call;
    }
}

fn is_string(exp: &Expression) -> bool {
    exp.ty.as_ref() == Some(&Type::Simple(SimpleType::String))
}
