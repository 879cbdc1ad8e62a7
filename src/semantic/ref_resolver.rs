//! Second pass: binds variable references and call sites to symbols.
//!
//! Function references resolve against the complete symbol table, so a call
//! may precede the callee's declaration. Variable references are stricter:
//! a variable may only be used after its declaration statement, and the
//! initializer of a declaration cannot see the variable being declared.

use rustc_hash::FxHashSet;

use crate::ast::{
    Expression, ExprKind, ForInit, FunctionCall, Program, Statement, VariableDecl,
};
use crate::builtins::BuiltinRegistry;
use crate::diagnostics::Diagnostic;
use crate::scope::{ScopeId, ScopeTree};
use crate::symbol::{Symbol, SymbolId, SymbolTable};
use crate::token::Position;

pub(crate) struct RefResolver<'a> {
    symbols: &'a SymbolTable,
    scopes: &'a ScopeTree,
    builtins: &'a BuiltinRegistry,
    diagnostics: &'a mut Vec<Diagnostic>,
    scope_stack: Vec<ScopeId>,
    /// Index into `scope_stack` where the innermost function's scopes
    /// begin. Variables found in scopes below this boundary belong to an
    /// enclosing frame and are unreachable at runtime (no closures).
    function_floor: Vec<usize>,
    declared: FxHashSet<SymbolId>,
    used: FxHashSet<SymbolId>,
    /// Every `let` declaration seen, for the unused-variable warning.
    locals: Vec<(SymbolId, String, Position)>,
}

impl<'a> RefResolver<'a> {
    pub fn run(
        program: &mut Program,
        symbols: &'a SymbolTable,
        scopes: &'a ScopeTree,
        builtins: &'a BuiltinRegistry,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) {
        let Some(global) = program.body.scope else {
            return;
        };
        let mut pass = Self {
            symbols,
            scopes,
            builtins,
            diagnostics,
            scope_stack: vec![global],
            function_floor: vec![0],
            declared: FxHashSet::default(),
            used: FxHashSet::default(),
            locals: Vec::new(),
        };
        for stmt in &mut program.body.stmts {
            pass.visit_statement(stmt);
        }
        for (sym, name, pos) in &pass.locals {
            if !pass.used.contains(sym) {
                pass.diagnostics.push(Diagnostic::warning(
                    format!("variable '{name}' is never used"),
                    *pos,
                ));
            }
        }
    }

    fn current_scope(&self) -> ScopeId {
        *self.scope_stack.last().unwrap()
    }

    fn in_current_function(&self, scope: ScopeId) -> bool {
        let floor = *self.function_floor.last().unwrap();
        self.scope_stack[floor..].contains(&scope)
    }

    fn visit_statement(&mut self, stmt: &mut Statement) {
        match stmt {
            Statement::FunctionDecl(decl) => {
                let Some(scope) = decl.body.scope else {
                    return;
                };
                self.function_floor.push(self.scope_stack.len());
                self.scope_stack.push(scope);
                for param in &decl.params {
                    if let Some(sym) = param.sym {
                        self.declared.insert(sym);
                    }
                }
                for stmt in &mut decl.body.stmts {
                    self.visit_statement(stmt);
                }
                self.scope_stack.pop();
                self.function_floor.pop();
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
                let Some(scope) = for_stmt.scope else {
                    return;
                };
                self.scope_stack.push(scope);
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
                self.scope_stack.pop();
            }
            Statement::Block(block) => {
                let Some(scope) = block.scope else {
                    return;
                };
                self.scope_stack.push(scope);
                for stmt in &mut block.stmts {
                    self.visit_statement(stmt);
                }
                self.scope_stack.pop();
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

    /// The initializer is resolved before the declared symbol becomes
    /// visible, so `let a = a;` is a use-before-declaration error.
    fn visit_variable_decl(&mut self, decl: &mut VariableDecl) {
        if let Some(init) = &mut decl.init {
            self.visit_expression(init);
        }
        if let Some(sym) = decl.sym {
            self.declared.insert(sym);
            self.locals.push((sym, decl.name.clone(), decl.pos));
        }
    }

    fn visit_expression(&mut self, exp: &mut Expression) {
        match &mut exp.kind {
            ExprKind::Variable { name, sym } => {
                let pos = exp.pos;
                match self.scopes.lookup_cascade(self.current_scope(), name) {
                    Some((found, id)) => match self.symbols.get(id) {
                        Symbol::Var(_) => {
                            self.used.insert(id);
                            if !self.in_current_function(found) {
                                self.diagnostics.push(Diagnostic::error(
                                    format!(
                                        "cannot access variable '{name}' declared outside the current function"
                                    ),
                                    pos,
                                ));
                                return;
                            }
                            if !self.declared.contains(&id) {
                                self.diagnostics.push(Diagnostic::error(
                                    format!("variable '{name}' used before its declaration"),
                                    pos,
                                ));
                            }
                            *sym = Some(id);
                        }
                        Symbol::Function(_) => {
                            self.diagnostics.push(Diagnostic::error(
                                format!("'{name}' is a function and cannot be used as a variable"),
                                pos,
                            ));
                        }
                    },
                    None => {
                        self.diagnostics.push(Diagnostic::error(
                            format!("cannot find variable '{name}'"),
                            pos,
                        ));
                    }
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.visit_expression(lhs);
                self.visit_expression(rhs);
            }
            ExprKind::Unary { operand, .. } => self.visit_expression(operand),
            ExprKind::Call(call) => self.visit_call(call),
            ExprKind::IntegerLiteral(_)
            | ExprKind::DecimalLiteral(_)
            | ExprKind::StringLiteral(_)
            | ExprKind::BooleanLiteral(_)
            | ExprKind::NullLiteral
            | ExprKind::Error => {}
        }
    }

    fn visit_call(&mut self, call: &mut FunctionCall) {
        for arg in &mut call.args {
            self.visit_expression(arg);
        }
        if let Some(id) = self.builtins.lookup(&call.name) {
            call.sym = Some(id);
            return;
        }
        match self.scopes.lookup_cascade(self.current_scope(), &call.name) {
            Some((_, id)) => match self.symbols.get(id) {
                Symbol::Function(_) => call.sym = Some(id),
                Symbol::Var(_) => {
                    self.diagnostics.push(Diagnostic::error(
                        format!("'{}' is not a function", call.name),
                        call.pos,
                    ));
                }
            },
            None => {
                self.diagnostics.push(Diagnostic::error(
                    format!("cannot find function '{}'", call.name),
                    call.pos,
                ));
            }
        }
    }
}
