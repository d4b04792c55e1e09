mod arg_stack;
mod context_analyser;

pub(crate) use self::arg_stack::ArgListStack;
pub use self::context_analyser::TetraContextAnalyser;

use super::ast::AbstractSyntaxTree;
use super::error::CompileErrors;
use super::symbol::{ScopeId, ScopeTree};

/// Analysis is everything context analysis hands to the back end: the
/// fully populated scope tree, the handle of the global scope, and
/// whether the program needs a synthetic global-initialisation
/// function. The decorated AST travels separately (the analyser
/// mutates the tree it is given).
#[derive(Debug)]
pub struct Analysis {
    pub scopes: ScopeTree,
    pub global_scope: ScopeId,
    pub requires_init: bool,
}

/// ContextAnalyser checks an AbstractSyntaxTree and builds the symbol
/// information bytecode generation runs on. Analysis is cumulative: it
/// keeps going after an error and reports everything it found at once.
pub trait ContextAnalyser {
    /// Creates a default configuration of the analyser
    fn default() -> Self;

    /// Runs both analysis passes over the tree, decorating it in place.
    fn analyse(self, tree: &mut AbstractSyntaxTree) -> Result<Analysis, CompileErrors>;
}
