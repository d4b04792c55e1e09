pub mod scope_tree;
pub mod symbol;

pub use self::scope_tree::{Scope, ScopeId, ScopeKind, ScopeTree};
pub use self::symbol::{ArrayData, ForLoopData, FunData, Symbol, SymbolId, SymbolKind};
