//! First pass: builds the scope tree and the symbol table.
//!
//! Every declaration in the program gets a symbol here, before any
//! reference is resolved, which is what makes calls to later-declared
//! functions work. Variables declared in nested blocks of a function are
//! appended to that function's `locals` in declaration order; their index
//! there is the frame slot both backends agree on.

use std::rc::Rc;

use crate::ast::{Block, ForInit, FunctionDecl, Program, Statement, VariableDecl};
use crate::diagnostics::Diagnostic;
use crate::scope::{ScopeId, ScopeTree};
use crate::symbol::{FunctionSymbol, SymbolId, SymbolTable, VarSymbol};
use crate::token::Position;
use crate::types::{FunctionType, SimpleType, Type};

pub(crate) struct Enter<'a> {
    symbols: &'a mut SymbolTable,
    scopes: &'a mut ScopeTree,
    diagnostics: &'a mut Vec<Diagnostic>,
    scope_stack: Vec<ScopeId>,
    function_stack: Vec<SymbolId>,
}

impl<'a> Enter<'a> {
    pub fn run(
        program: &mut Program,
        symbols: &'a mut SymbolTable,
        scopes: &'a mut ScopeTree,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) {
        let main_ty = Rc::new(FunctionType::new(
            "main",
            Type::Simple(SimpleType::Void),
            vec![],
        ));
        let main = symbols.add_function(FunctionSymbol::new("main", main_ty));
        program.sym = Some(main);

        let global = scopes.add(None);
        program.body.scope = Some(global);

        let mut pass = Self {
            symbols,
            scopes,
            diagnostics,
            scope_stack: vec![global],
            function_stack: vec![main],
        };
        for stmt in &mut program.body.stmts {
            pass.visit_statement(stmt);
        }
    }

    fn current_scope(&self) -> ScopeId {
        *self.scope_stack.last().unwrap()
    }

    fn visit_statement(&mut self, stmt: &mut Statement) {
        match stmt {
            Statement::FunctionDecl(decl) => self.visit_function_decl(decl),
            Statement::VariableDecl(decl) => self.visit_variable_decl(decl),
            Statement::If(if_stmt) => {
                self.visit_statement(&mut if_stmt.then_stmt);
                if let Some(else_stmt) = &mut if_stmt.else_stmt {
                    self.visit_statement(else_stmt);
                }
            }
            Statement::For(for_stmt) => {
                let scope = self.scopes.add(Some(self.current_scope()));
                for_stmt.scope = Some(scope);
                self.scope_stack.push(scope);
                if let Some(ForInit::Decl(decl)) = &mut for_stmt.init {
                    self.visit_variable_decl(decl);
                }
                self.visit_statement(&mut for_stmt.body);
                self.scope_stack.pop();
            }
            Statement::Block(block) => {
                let scope = self.scopes.add(Some(self.current_scope()));
                block.scope = Some(scope);
                self.scope_stack.push(scope);
                self.visit_block_stmts(block);
                self.scope_stack.pop();
            }
            Statement::Return(_) | Statement::Expr(_) | Statement::Error(_) => {}
        }
    }

    fn visit_block_stmts(&mut self, block: &mut Block) {
        for stmt in &mut block.stmts {
            self.visit_statement(stmt);
        }
    }

    fn visit_function_decl(&mut self, decl: &mut FunctionDecl) {
        let return_type = self.resolve_type(decl.return_type_name.as_deref(), decl.pos);
        let param_types: Vec<Type> = decl
            .params
            .iter()
            .map(|p| self.resolve_type(p.type_name.as_deref(), p.pos))
            .collect();
        let ty = Rc::new(FunctionType::new(
            &decl.name,
            return_type,
            param_types.clone(),
        ));
        let id = self.symbols.add_function(FunctionSymbol::new(&decl.name, ty));
        decl.sym = Some(id);
        if !self.scopes.enter(self.current_scope(), &decl.name, id) {
            self.duplicate(&decl.name, decl.pos);
        }

        // The function scope holds the parameters; the body block shares it
        // so a top-level `let` in the body can collide with a parameter.
        let scope = self.scopes.add(Some(self.current_scope()));
        decl.body.scope = Some(scope);
        for (param, ty) in decl.params.iter_mut().zip(param_types) {
            let var = self.symbols.add_var(VarSymbol::new(&param.name, ty));
            param.sym = Some(var);
            if !self.scopes.enter(scope, &param.name, var) {
                self.duplicate(&param.name, param.pos);
            }
            if let Some(func) = self.symbols.function_mut(id) {
                func.locals.push(var);
            }
        }

        self.scope_stack.push(scope);
        self.function_stack.push(id);
        for stmt in &mut decl.body.stmts {
            self.visit_statement(stmt);
        }
        self.function_stack.pop();
        self.scope_stack.pop();
    }

    fn visit_variable_decl(&mut self, decl: &mut VariableDecl) {
        if decl.name.is_empty() {
            // Parser recovery placeholder.
            return;
        }
        let ty = self.resolve_type(decl.type_name.as_deref(), decl.pos);
        let id = self.symbols.add_var(VarSymbol::new(&decl.name, ty));
        decl.sym = Some(id);
        if !self.scopes.enter(self.current_scope(), &decl.name, id) {
            self.duplicate(&decl.name, decl.pos);
        }
        let owner = *self.function_stack.last().unwrap();
        if let Some(func) = self.symbols.function_mut(owner) {
            func.locals.push(id);
        }
    }

    fn resolve_type(&mut self, name: Option<&str>, pos: Position) -> Type {
        match name {
            None => Type::ANY,
            Some(name) => match SimpleType::by_name(name) {
                Some(simple) => Type::Simple(simple),
                None => {
                    self.diagnostics
                        .push(Diagnostic::error(format!("unknown type '{name}'"), pos));
                    Type::ANY
                }
            },
        }
    }

    fn duplicate(&mut self, name: &str, pos: Position) {
        self.diagnostics.push(Diagnostic::error(
            format!("duplicate symbol '{name}' in this scope"),
            pos,
        ));
    }
}
