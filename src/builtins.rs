//! Built-in functions. The registry is constructed explicitly and threaded
//! through resolution and both backends; there is no global table.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::symbol::{FunctionSymbol, SymbolId, SymbolTable};
use crate::types::{FunctionType, SimpleType, Type};

#[derive(Debug)]
pub struct BuiltinRegistry {
    by_name: FxHashMap<String, SymbolId>,
    /// Registration order. The bytecode backend seeds its constant pool
    /// with builtin stubs in this order, so it must be stable.
    order: Vec<SymbolId>,
}

/// Name, return type and parameter types of every builtin, in registration
/// order. The module reader uses this to re-link builtin pool entries by
/// name.
pub fn signatures() -> Vec<(&'static str, Type, Vec<Type>)> {
    vec![
        ("println", Type::Simple(SimpleType::Integer), vec![Type::ANY]),
        ("tick", Type::Simple(SimpleType::Integer), vec![]),
        (
            "integer_to_string",
            Type::Simple(SimpleType::String),
            vec![Type::Simple(SimpleType::Number)],
        ),
    ]
}

impl BuiltinRegistry {
    /// Registers the builtins as function symbols and remembers their ids.
    pub fn install(symbols: &mut SymbolTable) -> Self {
        let mut registry = Self {
            by_name: FxHashMap::default(),
            order: Vec::new(),
        };
        for (name, return_type, param_types) in signatures() {
            registry.register(symbols, name, return_type, param_types);
        }
        registry
    }

    fn register(
        &mut self,
        symbols: &mut SymbolTable,
        name: &str,
        return_type: Type,
        param_types: Vec<Type>,
    ) {
        let ty = Rc::new(FunctionType::new(name, return_type, param_types));
        let id = symbols.add_function(FunctionSymbol::builtin(name, ty));
        self.by_name.insert(name.to_string(), id);
        self.order.push(id);
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn is_builtin(&self, id: SymbolId) -> bool {
        self.order.contains(&id)
    }

    /// Builtin symbols in registration order.
    pub fn iter(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.order.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_registers_the_builtins() {
        let mut symbols = SymbolTable::new();
        let registry = BuiltinRegistry::install(&mut symbols);

        let println = registry.lookup("println").unwrap();
        let func = symbols.function(println).unwrap();
        assert!(func.is_builtin);
        assert_eq!(func.ty.return_type, Type::Simple(SimpleType::Integer));
        assert_eq!(func.ty.param_types, vec![Type::ANY]);

        let tick = registry.lookup("tick").unwrap();
        assert_eq!(symbols.function(tick).unwrap().param_count(), 0);

        assert!(registry.lookup("print").is_none());
    }

    #[test]
    fn registration_order_is_stable() {
        let mut symbols = SymbolTable::new();
        let registry = BuiltinRegistry::install(&mut symbols);
        let names: Vec<_> = registry
            .iter()
            .map(|id| symbols.get(id).name().to_string())
            .collect();
        assert_eq!(names, ["println", "tick", "integer_to_string"]);
    }
}
