//! Symbols produced by semantic analysis. Like scopes, symbols live in an
//! arena and are addressed by [`SymbolId`]; AST nodes carry ids rather than
//! references so the tree stays freely mutable across passes.

use std::rc::Rc;

use crate::types::{FunctionType, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(usize);

#[derive(Debug)]
pub enum Symbol {
    Var(VarSymbol),
    Function(FunctionSymbol),
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Var(v) => &v.name,
            Symbol::Function(f) => &f.name,
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Symbol::Var(v) => v.ty.clone(),
            Symbol::Function(f) => Type::Function(f.ty.clone()),
        }
    }
}

#[derive(Debug)]
pub struct VarSymbol {
    pub name: String,
    pub ty: Type,
}

impl VarSymbol {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug)]
pub struct FunctionSymbol {
    pub name: String,
    pub ty: Rc<FunctionType>,
    /// Parameters followed by locals, in declaration order. The position of
    /// a variable in this list is its frame slot in the bytecode backend.
    pub locals: Vec<SymbolId>,
    pub is_builtin: bool,
}

impl FunctionSymbol {
    pub fn new(name: impl Into<String>, ty: Rc<FunctionType>) -> Self {
        Self {
            name: name.into(),
            ty,
            locals: Vec::new(),
            is_builtin: false,
        }
    }

    pub fn builtin(name: impl Into<String>, ty: Rc<FunctionType>) -> Self {
        Self {
            is_builtin: true,
            ..Self::new(name, ty)
        }
    }

    pub fn param_count(&self) -> usize {
        self.ty.param_types.len()
    }

    /// Frame slot of `sym`, if it is a local of this function.
    pub fn slot_of(&self, sym: SymbolId) -> Option<usize> {
        self.locals.iter().position(|&id| id == sym)
    }
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_var(&mut self, var: VarSymbol) -> SymbolId {
        let id = SymbolId(self.symbols.len());
        self.symbols.push(Symbol::Var(var));
        id
    }

    pub fn add_function(&mut self, func: FunctionSymbol) -> SymbolId {
        let id = SymbolId(self.symbols.len());
        self.symbols.push(Symbol::Function(func));
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    pub fn var(&self, id: SymbolId) -> Option<&VarSymbol> {
        match &self.symbols[id.0] {
            Symbol::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn var_mut(&mut self, id: SymbolId) -> Option<&mut VarSymbol> {
        match &mut self.symbols[id.0] {
            Symbol::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn function(&self, id: SymbolId) -> Option<&FunctionSymbol> {
        match &self.symbols[id.0] {
            Symbol::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn function_mut(&mut self, id: SymbolId) -> Option<&mut FunctionSymbol> {
        match &mut self.symbols[id.0] {
            Symbol::Function(f) => Some(f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimpleType;

    #[test]
    fn locals_record_frame_slots_in_declaration_order() {
        let mut table = SymbolTable::new();
        let ty = Rc::new(FunctionType::new(
            "add",
            Type::Simple(SimpleType::Integer),
            vec![
                Type::Simple(SimpleType::Integer),
                Type::Simple(SimpleType::Integer),
            ],
        ));
        let func = table.add_function(FunctionSymbol::new("add", ty));
        let a = table.add_var(VarSymbol::new("a", Type::Simple(SimpleType::Integer)));
        let b = table.add_var(VarSymbol::new("b", Type::Simple(SimpleType::Integer)));
        let tmp = table.add_var(VarSymbol::new("tmp", Type::Simple(SimpleType::Integer)));
        let f = table.function_mut(func).unwrap();
        f.locals.extend([a, b, tmp]);

        let f = table.function(func).unwrap();
        assert_eq!(f.slot_of(a), Some(0));
        assert_eq!(f.slot_of(b), Some(1));
        assert_eq!(f.slot_of(tmp), Some(2));
        assert_eq!(f.slot_of(func), None);
        assert_eq!(f.param_count(), 2);
    }
}
