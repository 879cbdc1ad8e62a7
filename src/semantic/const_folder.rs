//! Optional last pass: annotates expressions with compile-time constants.
//!
//! Folding is conservative. Integer arithmetic uses checked operations and
//! gives up on overflow or division by zero, so a folded value is always
//! the value the program would compute at run time. The pass only writes
//! annotations and never reports diagnostics.

use crate::ast::{ConstValue, Expression, ExprKind, ForInit, Program, Statement};
use crate::token::Op;

pub(crate) struct ConstFolder;

impl ConstFolder {
    pub fn run(program: &mut Program) {
        let mut pass = Self;
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
                    self.fold_expression(init);
                }
            }
            Statement::If(if_stmt) => {
                self.fold_expression(&mut if_stmt.condition);
                self.visit_statement(&mut if_stmt.then_stmt);
                if let Some(else_stmt) = &mut if_stmt.else_stmt {
                    self.visit_statement(else_stmt);
                }
            }
            Statement::For(for_stmt) => {
                match &mut for_stmt.init {
                    Some(ForInit::Decl(decl)) => {
                        if let Some(init) = &mut decl.init {
                            self.fold_expression(init);
                        }
                    }
                    Some(ForInit::Expr(exp)) => self.fold_expression(exp),
                    None => {}
                }
                if let Some(condition) = &mut for_stmt.condition {
                    self.fold_expression(condition);
                }
                if let Some(increment) = &mut for_stmt.increment {
                    self.fold_expression(increment);
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
                    self.fold_expression(exp);
                }
            }
            Statement::Expr(stmt) => self.fold_expression(&mut stmt.exp),
            Statement::Error(_) => {}
        }
    }

    fn fold_expression(&mut self, exp: &mut Expression) {
        let folded = match &mut exp.kind {
            ExprKind::IntegerLiteral(value) => Some(ConstValue::Integer(*value)),
            ExprKind::DecimalLiteral(value) => Some(ConstValue::Decimal(*value)),
            ExprKind::StringLiteral(value) => Some(ConstValue::String(value.clone())),
            ExprKind::BooleanLiteral(value) => Some(ConstValue::Boolean(*value)),
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                self.fold_expression(lhs);
                self.fold_expression(rhs);
                if op.is_assign() {
                    None
                } else {
                    match (&lhs.const_value, &rhs.const_value) {
                        (Some(l), Some(r)) => Self::fold_binary(op, l, r),
                        _ => None,
                    }
                }
            }
            ExprKind::Unary {
                op,
                operand,
                is_prefix: _,
            } => {
                let op = *op;
                self.fold_expression(operand);
                match (op, &operand.const_value) {
                    (Op::Minus, Some(ConstValue::Integer(n))) => {
                        n.checked_neg().map(ConstValue::Integer)
                    }
                    (Op::Minus, Some(ConstValue::Decimal(d))) => Some(ConstValue::Decimal(-d)),
                    (Op::Not, Some(value)) => Some(ConstValue::Boolean(!Self::truthy(value))),
                    _ => None,
                }
            }
            ExprKind::Call(call) => {
                for arg in &mut call.args {
                    self.fold_expression(arg);
                }
                None
            }
            _ => None,
        };
        exp.const_value = folded;
    }

    fn fold_binary(op: Op, lhs: &ConstValue, rhs: &ConstValue) -> Option<ConstValue> {
        use ConstValue::*;
        match (lhs, rhs) {
            (Integer(a), Integer(b)) => {
                let (a, b) = (*a, *b);
                match op {
                    Op::Plus => a.checked_add(b).map(Integer),
                    Op::Minus => a.checked_sub(b).map(Integer),
                    Op::Multiply => a.checked_mul(b).map(Integer),
                    Op::Divide => a.checked_div(b).map(Integer),
                    Op::Modulus => a.checked_rem(b).map(Integer),
                    Op::BitAnd => Some(Integer(a & b)),
                    Op::BitOr => Some(Integer(a | b)),
                    Op::BitXor => Some(Integer(a ^ b)),
                    Op::Eq => Some(Boolean(a == b)),
                    Op::Ne => Some(Boolean(a != b)),
                    Op::Greater => Some(Boolean(a > b)),
                    Op::GreaterEq => Some(Boolean(a >= b)),
                    Op::Less => Some(Boolean(a < b)),
                    Op::LessEq => Some(Boolean(a <= b)),
                    _ => None,
                }
            }
            (String(a), String(b)) => match op {
                Op::Plus => Some(String(format!("{a}{b}"))),
                Op::Eq => Some(Boolean(a == b)),
                Op::Ne => Some(Boolean(a != b)),
                _ => None,
            },
            (Boolean(_), _) | (_, Boolean(_)) => match op {
                Op::And => Some(Boolean(Self::truthy(lhs) && Self::truthy(rhs))),
                Op::Or => Some(Boolean(Self::truthy(lhs) || Self::truthy(rhs))),
                _ => None,
            },
            _ => None,
        }
    }

    fn truthy(value: &ConstValue) -> bool {
        match value {
            ConstValue::Integer(n) => *n != 0,
            ConstValue::Decimal(d) => *d != 0.0,
            ConstValue::String(s) => !s.is_empty(),
            ConstValue::Boolean(b) => *b,
        }
    }
}
