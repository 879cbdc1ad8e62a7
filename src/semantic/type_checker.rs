//! Third pass: bottom-up type inference and checking.
//!
//! Unannotated variables start as `any` and are narrowed by their first
//! initializer or assignment. An `any` operand never produces an error;
//! mixing with `any` just yields `any`. A numeric value meeting a string
//! target is accepted here and converted by the next pass.

use crate::ast::{
    Expression, ExprKind, ForInit, FunctionCall, Program, Statement, VariableDecl,
};
use crate::diagnostics::Diagnostic;
use crate::symbol::{SymbolId, SymbolTable};
use crate::token::{Op, Position};
use crate::types::{SimpleType, Type};

pub(crate) struct TypeChecker<'a> {
    symbols: &'a mut SymbolTable,
    diagnostics: &'a mut Vec<Diagnostic>,
    function_stack: Vec<SymbolId>,
}

impl<'a> TypeChecker<'a> {
    pub fn run(
        program: &mut Program,
        symbols: &'a mut SymbolTable,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) {
        let Some(main) = program.sym else {
            return;
        };
        let mut pass = Self {
            symbols,
            diagnostics,
            function_stack: vec![main],
        };
        for stmt in &mut program.body.stmts {
            pass.visit_statement(stmt);
        }
    }

    fn visit_statement(&mut self, stmt: &mut Statement) {
        match stmt {
            Statement::FunctionDecl(decl) => {
                if let Some(sym) = decl.sym {
                    self.function_stack.push(sym);
                }
                for stmt in &mut decl.body.stmts {
                    self.visit_statement(stmt);
                }
                if decl.sym.is_some() {
                    self.function_stack.pop();
                }
            }
            Statement::VariableDecl(decl) => self.visit_variable_decl(decl),
            Statement::If(if_stmt) => {
                self.check_expression(&mut if_stmt.condition);
                self.visit_statement(&mut if_stmt.then_stmt);
                if let Some(else_stmt) = &mut if_stmt.else_stmt {
                    self.visit_statement(else_stmt);
                }
            }
            Statement::For(for_stmt) => {
                match &mut for_stmt.init {
                    Some(ForInit::Decl(decl)) => self.visit_variable_decl(decl),
                    Some(ForInit::Expr(exp)) => {
                        self.check_expression(exp);
                    }
                    None => {}
                }
                if let Some(condition) = &mut for_stmt.condition {
                    self.check_expression(condition);
                }
                if let Some(increment) = &mut for_stmt.increment {
                    self.check_expression(increment);
                }
                self.visit_statement(&mut for_stmt.body);
            }
            Statement::Block(block) => {
                for stmt in &mut block.stmts {
                    self.visit_statement(stmt);
                }
            }
            Statement::Return(ret) => {
                let value_ty = ret.exp.as_mut().map(|exp| self.check_expression(exp));
                self.check_return(value_ty, ret.pos);
            }
            Statement::Expr(stmt) => {
                self.check_expression(&mut stmt.exp);
            }
            Statement::Error(_) => {}
        }
    }

    fn visit_variable_decl(&mut self, decl: &mut VariableDecl) {
        let Some(init) = &mut decl.init else {
            return;
        };
        let init_ty = self.check_expression(init);
        let Some(sym) = decl.sym else {
            return;
        };
        let declared = match self.symbols.var(sym) {
            Some(var) => var.ty.clone(),
            None => return,
        };
        if declared == Type::ANY && !Self::is_void(&init_ty) {
            if init_ty != Type::ANY {
                if let Some(var) = self.symbols.var_mut(sym) {
                    var.ty = init_ty;
                }
            }
            return;
        }
        if !Self::assignable(&init_ty, &declared) {
            self.diagnostics.push(Diagnostic::error(
                format!(
                    "cannot assign a value of type '{}' to a variable of type '{}'",
                    init_ty.name(),
                    declared.name()
                ),
                decl.pos,
            ));
        }
    }

    fn check_return(&mut self, value_ty: Option<Type>, pos: Position) {
        let current = *self.function_stack.last().unwrap();
        let Some(func) = self.symbols.function(current) else {
            return;
        };
        let return_ty = func.ty.return_type.clone();
        let name = func.name.clone();
        match value_ty {
            Some(ty) => {
                if return_ty == Type::Simple(SimpleType::Void) {
                    self.diagnostics.push(Diagnostic::error(
                        format!("function '{name}' does not return a value"),
                        pos,
                    ));
                } else if !Self::assignable(&ty, &return_ty) {
                    self.diagnostics.push(Diagnostic::error(
                        format!(
                            "cannot return a value of type '{}' from a function returning '{}'",
                            ty.name(),
                            return_ty.name()
                        ),
                        pos,
                    ));
                }
            }
            None => {
                if return_ty != Type::Simple(SimpleType::Void) && return_ty != Type::ANY {
                    self.diagnostics.push(Diagnostic::error(
                        format!("function '{name}' must return a value of type '{}'", return_ty.name()),
                        pos,
                    ));
                }
            }
        }
    }

    fn check_expression(&mut self, exp: &mut Expression) -> Type {
        let pos = exp.pos;
        let ty = match &mut exp.kind {
            ExprKind::IntegerLiteral(_) => Type::Simple(SimpleType::Integer),
            ExprKind::DecimalLiteral(_) => Type::Simple(SimpleType::Decimal),
            ExprKind::StringLiteral(_) => Type::Simple(SimpleType::String),
            ExprKind::BooleanLiteral(_) => Type::Simple(SimpleType::Boolean),
            ExprKind::NullLiteral => Type::Simple(SimpleType::Null),
            ExprKind::Variable { sym, .. } => match sym {
                Some(id) => self.symbols.get(*id).ty(),
                None => Type::ANY,
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                if op.is_assign() {
                    self.check_assignment(op, lhs, rhs, pos)
                } else {
                    let lhs_ty = self.check_expression(lhs);
                    let rhs_ty = self.check_expression(rhs);
                    self.binary_result(op, &lhs_ty, &rhs_ty, pos)
                }
            }
            ExprKind::Unary {
                op,
                operand,
                ..
            } => {
                let op = *op;
                let operand_ty = self.check_expression(operand);
                match op {
                    Op::Not => {
                        self.require_value(op, &operand_ty, pos);
                        Type::Simple(SimpleType::Boolean)
                    }
                    Op::Minus | Op::Inc | Op::Dec => {
                        self.require_numeric(op, &operand_ty, pos);
                        operand_ty
                    }
                    _ => Type::ANY,
                }
            }
            ExprKind::Call(call) => self.check_call(call),
            ExprKind::Error => Type::ANY,
        };
        exp.ty = Some(ty.clone());
        ty
    }

    fn check_assignment(
        &mut self,
        op: Op,
        lhs: &mut Expression,
        rhs: &mut Expression,
        pos: Position,
    ) -> Type {
        let rhs_ty = self.check_expression(rhs);
        // Assignment narrows a still-`any` variable to the value's type.
        if op == Op::Assign && rhs_ty != Type::ANY && !Self::is_void(&rhs_ty) {
            if let ExprKind::Variable { sym: Some(id), .. } = &lhs.kind {
                if let Some(var) = self.symbols.var_mut(*id) {
                    if var.ty == Type::ANY {
                        var.ty = rhs_ty.clone();
                    }
                }
            }
        }
        let lhs_ty = self.check_expression(lhs);
        match op.compound_base() {
            Some(base) => {
                // `a op= b` checks like `a = a op b`.
                let value_ty = self.binary_result(base, &lhs_ty, &rhs_ty, pos);
                if !Self::assignable(&value_ty, &lhs_ty) {
                    self.assign_error(&value_ty, &lhs_ty, pos);
                }
            }
            None => {
                if !Self::assignable(&rhs_ty, &lhs_ty) {
                    self.assign_error(&rhs_ty, &lhs_ty, pos);
                }
            }
        }
        lhs_ty
    }

    fn binary_result(&mut self, op: Op, lhs: &Type, rhs: &Type, pos: Position) -> Type {
        match op {
            Op::Plus => {
                if Self::is_string(lhs) || Self::is_string(rhs) {
                    self.require_value(op, lhs, pos);
                    self.require_value(op, rhs, pos);
                    Type::Simple(SimpleType::String)
                } else {
                    self.numeric_result(op, lhs, rhs, pos)
                }
            }
            Op::Minus | Op::Multiply | Op::Divide | Op::Modulus => {
                self.numeric_result(op, lhs, rhs, pos)
            }
            Op::Greater | Op::GreaterEq | Op::Less | Op::LessEq => {
                self.require_numeric(op, lhs, pos);
                self.require_numeric(op, rhs, pos);
                Type::Simple(SimpleType::Boolean)
            }
            Op::Eq | Op::Ne | Op::And | Op::Or => {
                self.require_value(op, lhs, pos);
                self.require_value(op, rhs, pos);
                Type::Simple(SimpleType::Boolean)
            }
            Op::BitAnd | Op::BitOr | Op::BitXor | Op::ShiftLeft | Op::ShiftRight => {
                self.require_integer(op, lhs, pos);
                self.require_integer(op, rhs, pos);
                Type::Simple(SimpleType::Integer)
            }
            _ => Type::ANY,
        }
    }

    fn numeric_result(&mut self, op: Op, lhs: &Type, rhs: &Type, pos: Position) -> Type {
        self.require_numeric(op, lhs, pos);
        self.require_numeric(op, rhs, pos);
        if *lhs == Type::ANY || *rhs == Type::ANY {
            Type::ANY
        } else {
            Type::upper_bound(lhs, rhs)
        }
    }

    fn check_call(&mut self, call: &mut FunctionCall) -> Type {
        for arg in &mut call.args {
            self.check_expression(arg);
        }
        let Some(sym) = call.sym else {
            return Type::ANY;
        };
        let Some(func) = self.symbols.function(sym) else {
            return Type::ANY;
        };
        let ty = func.ty.clone();
        // println accepts an empty argument list as printing a blank line.
        let arity_ok = if func.is_builtin && func.name == "println" {
            call.args.len() <= 1
        } else {
            call.args.len() == ty.param_types.len()
        };
        if !arity_ok {
            self.diagnostics.push(Diagnostic::error(
                format!(
                    "function '{}' expects {} argument(s), found {}",
                    call.name,
                    ty.param_types.len(),
                    call.args.len()
                ),
                call.pos,
            ));
        } else {
            for (arg, param_ty) in call.args.iter().zip(&ty.param_types) {
                let Some(arg_ty) = &arg.ty else { continue };
                if !Self::assignable(arg_ty, param_ty) {
                    self.diagnostics.push(Diagnostic::error(
                        format!(
                            "argument of type '{}' is not assignable to parameter of type '{}'",
                            arg_ty.name(),
                            param_ty.name()
                        ),
                        arg.pos,
                    ));
                }
            }
        }
        ty.return_type.clone()
    }

    /// Subtype check with the leniencies the later passes rely on: `any`
    /// on either side always passes, and a numeric value may flow into a
    /// string slot because TypeConverter inserts the conversion. A `void`
    /// expression produces no value and never passes, `any` included.
    fn assignable(value: &Type, target: &Type) -> bool {
        if Self::is_void(value) {
            return false;
        }
        if *value == Type::ANY || *target == Type::ANY {
            return true;
        }
        if Self::is_string(target) && Self::is_numeric(value) {
            return true;
        }
        value.is_subtype_of(target)
    }

    fn is_string(ty: &Type) -> bool {
        *ty == Type::Simple(SimpleType::String)
    }

    fn is_void(ty: &Type) -> bool {
        *ty == Type::Simple(SimpleType::Void)
    }

    fn is_numeric(ty: &Type) -> bool {
        ty.is_subtype_of(&Type::Simple(SimpleType::Number))
    }

    fn require_value(&mut self, op: Op, ty: &Type, pos: Position) {
        if Self::is_void(ty) {
            self.operand_error(op, ty, pos);
        }
    }

    fn require_numeric(&mut self, op: Op, ty: &Type, pos: Position) {
        if *ty != Type::ANY && !Self::is_numeric(ty) {
            self.operand_error(op, ty, pos);
        }
    }

    fn require_integer(&mut self, op: Op, ty: &Type, pos: Position) {
        if *ty != Type::ANY && !ty.is_subtype_of(&Type::Simple(SimpleType::Integer)) {
            self.operand_error(op, ty, pos);
        }
    }

    fn operand_error(&mut self, op: Op, ty: &Type, pos: Position) {
        self.diagnostics.push(Diagnostic::error(
            format!(
                "operator '{}' cannot be applied to a value of type '{}'",
                op.text(),
                ty.name()
            ),
            pos,
        ));
    }

    fn assign_error(&mut self, value: &Type, target: &Type, pos: Position) {
        self.diagnostics.push(Diagnostic::error(
            format!(
                "cannot assign a value of type '{}' to a variable of type '{}'",
                value.name(),
                target.name()
            ),
            pos,
        ));
    }
}
