//! Lexical scopes. Scopes live in an arena owned by [`ScopeTree`]; a scope
//! refers to its enclosing scope by index only (a non-owning relation used
//! for cascading lookup), while ownership follows the block or function that
//! created the scope.

use rustc_hash::FxHashMap;

use crate::symbol::SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Default)]
pub struct Scope {
    bindings: FxHashMap<String, SymbolId>,
    parent: Option<ScopeId>,
}

impl Scope {
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&str, SymbolId)> {
        self.bindings.iter().map(|(name, &id)| (name.as_str(), id))
    }
}

#[derive(Debug, Default)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            bindings: FxHashMap::default(),
            parent,
        });
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    /// Binds `name` in `scope`. Returns false when the name was already
    /// bound there (the caller reports the duplicate).
    pub fn enter(&mut self, scope: ScopeId, name: &str, sym: SymbolId) -> bool {
        self.scopes[scope.0]
            .bindings
            .insert(name.to_string(), sym)
            .is_none()
    }

    /// Lookup in one scope only, no cascading.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scopes[scope.0].bindings.get(name).copied()
    }

    /// Walks the enclosing-scope chain and returns the nearest binding
    /// together with the scope that holds it.
    pub fn lookup_cascade(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, SymbolId)> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(sym) = self.lookup_local(id, name) {
                return Some((id, sym));
            }
            current = self.scopes[id.0].parent;
        }
        None
    }
}
