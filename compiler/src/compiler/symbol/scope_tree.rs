use std::collections::HashMap;

use super::super::error::CompileError;
use super::symbol::{Symbol, SymbolId};

/// Index of a scope in the tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    /// For-loop scopes do not open a call frame of their own: they
    /// inherit the parent's nesting level and their variables draw
    /// offsets from the enclosing function frame.
    ForLoop,
}

/// Scope is one nested symbol table. Name lookups walk the parent
/// links; offset counters track where the next local of the owning
/// frame lands.
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    /// The function whose body this scope (or its for-loops) belongs
    /// to; None only for the global scope.
    pub parent_fun: Option<SymbolId>,
    pub kind: ScopeKind,
    pub nesting_level: usize,
    pub local_offset_counter: usize,
    pub for_loop_counter: usize,
    symbols: HashMap<String, SymbolId>,
}

/// ScopeTree owns every scope and every symbol of one compilation as
/// two arenas. Cross-references are plain indices, so scopes may freely
/// refer to symbols and back again. The tree is built by context
/// analysis and read (unchanged) by bytecode emission.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
}

impl ScopeTree {
    /// Creates a tree holding only the global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                parent_fun: None,
                kind: ScopeKind::Global,
                nesting_level: 0,
                local_offset_counter: 0,
                for_loop_counter: 0,
                symbols: HashMap::new(),
            }],
            symbols: vec![],
        }
    }

    pub fn global_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Opens a new scope under parent. Function scopes nest one level
    /// deeper; for-loop scopes keep the parent's level.
    pub fn new_scope(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        debug_assert!(kind != ScopeKind::Global, "the global scope is created once");
        let parent_level = self.scope(parent).nesting_level;
        let parent_fun = self.scope(parent).parent_fun;

        let nesting_level = match kind {
            ScopeKind::ForLoop => parent_level,
            _ => parent_level + 1,
        };

        self.scopes.push(Scope {
            parent: Some(parent),
            parent_fun,
            kind,
            nesting_level,
            local_offset_counter: 0,
            for_loop_counter: 0,
            symbols: HashMap::new(),
        });
        ScopeId(self.scopes.len() - 1)
    }

    /// Places a symbol in a scope, linking its parent_scope. Fails if
    /// the name is already bound in this scope (shadowing outer scopes
    /// is allowed, rebinding within one scope is not).
    pub fn insert(&mut self, scope: ScopeId, mut symbol: Symbol) -> Result<SymbolId, CompileError> {
        debug_assert!(
            symbol.parent_scope.is_none(),
            "symbol '{}' inserted twice",
            symbol.name
        );

        if self.lookup_local(scope, &symbol.name).is_some() {
            return Err(CompileError::DuplicateSymbol(symbol.name));
        }

        symbol.parent_scope = Some(scope);
        let id = SymbolId(self.symbols.len());
        self.scopes[scope.0].symbols.insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        Ok(id)
    }

    /// Searches only the given scope.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scope(scope).symbols.get(name).copied()
    }

    /// Walks parent links until the name is found or the root is reached.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(symbol) = self.lookup_local(id, name) {
                return Some(symbol);
            }
            current = self.scope(id).parent;
        }
        None
    }

    /// Allocates the next local offset for a scope. For-loop scopes
    /// share the enclosing function's frame, so the walk settles on the
    /// nearest non-loop scope before bumping its counter.
    pub fn alloc_offset(&mut self, scope: ScopeId) -> usize {
        let frame = self.frame_scope(scope);
        let counter = &mut self.scopes[frame.0].local_offset_counter;
        let offset = *counter;
        *counter += 1;
        offset
    }

    /// The scope owning the call frame that `scope` stores its
    /// variables in.
    pub fn frame_scope(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        while self.scope(current).kind == ScopeKind::ForLoop {
            current = self.scope(current).parent.expect("for-loop scope without parent");
        }
        current
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0]
    }

    /// Nesting level of the scope a symbol lives in.
    pub fn home_level(&self, id: SymbolId) -> usize {
        let scope = self.symbol(id).parent_scope.expect("symbol not yet inserted");
        self.scope(scope).nesting_level
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tetra_common::ValueType;

    #[test]
    fn global_scope_is_level_zero_with_no_parent() {
        let tree = ScopeTree::new();
        let global = tree.global_scope();
        assert_eq!(tree.scope(global).nesting_level, 0);
        assert!(tree.scope(global).parent.is_none());
        assert!(tree.scope(global).parent_fun.is_none());
    }

    #[test]
    fn function_scopes_nest_and_for_scopes_inherit() {
        let mut tree = ScopeTree::new();
        let fun = tree.new_scope(tree.global_scope(), ScopeKind::Function);
        let inner = tree.new_scope(fun, ScopeKind::Function);
        let for_loop = tree.new_scope(inner, ScopeKind::ForLoop);

        assert_eq!(tree.scope(fun).nesting_level, 1);
        assert_eq!(tree.scope(inner).nesting_level, 2);
        assert_eq!(tree.scope(for_loop).nesting_level, 2);
    }

    #[test]
    fn duplicate_insertion_in_one_scope_fails() {
        let mut tree = ScopeTree::new();
        let global = tree.global_scope();
        tree.insert(global, Symbol::new_scalar("x", ValueType::Int)).unwrap();
        let err = tree.insert(global, Symbol::new_scalar("x", ValueType::Float));
        assert!(matches!(err, Err(crate::compiler::error::CompileError::DuplicateSymbol(_))));
    }

    #[test]
    fn shadowing_resolves_to_the_innermost_binding() {
        let mut tree = ScopeTree::new();
        let global = tree.global_scope();
        let fun = tree.new_scope(global, ScopeKind::Function);

        let outer = tree.insert(global, Symbol::new_scalar("x", ValueType::Int)).unwrap();
        let inner = tree.insert(fun, Symbol::new_scalar("x", ValueType::Float)).unwrap();

        assert_eq!(tree.lookup(fun, "x"), Some(inner));
        assert_eq!(tree.lookup(global, "x"), Some(outer));
        assert_eq!(tree.lookup(fun, "y"), None);
    }

    #[test]
    fn lookup_local_does_not_walk_parents() {
        let mut tree = ScopeTree::new();
        let global = tree.global_scope();
        let fun = tree.new_scope(global, ScopeKind::Function);
        tree.insert(global, Symbol::new_scalar("x", ValueType::Int)).unwrap();

        assert!(tree.lookup_local(fun, "x").is_none());
        assert!(tree.lookup(fun, "x").is_some());
    }

    #[test]
    fn for_scopes_draw_offsets_from_the_enclosing_frame() {
        let mut tree = ScopeTree::new();
        let fun = tree.new_scope(tree.global_scope(), ScopeKind::Function);
        let for_loop = tree.new_scope(fun, ScopeKind::ForLoop);
        let nested_loop = tree.new_scope(for_loop, ScopeKind::ForLoop);

        assert_eq!(tree.alloc_offset(fun), 0);
        assert_eq!(tree.alloc_offset(for_loop), 1);
        assert_eq!(tree.alloc_offset(nested_loop), 2);
        assert_eq!(tree.scope(fun).local_offset_counter, 3);
        assert_eq!(tree.scope(for_loop).local_offset_counter, 0);
    }

    #[test]
    fn insert_links_parent_scope_once() {
        let mut tree = ScopeTree::new();
        let global = tree.global_scope();
        let id = tree.insert(global, Symbol::new_scalar("x", ValueType::Int)).unwrap();
        assert_eq!(tree.symbol(id).parent_scope, Some(global));
    }
}
