mod bytecode_generator;

use tetra_common::Assembly;

use super::analysis::Analysis;
use super::ast::AbstractSyntaxTree;

// Abstract Definitions

/// BackEndGenerator takes a type-checked AbstractSyntaxTree together
/// with the analysis artifacts and generates an Assembly. Generation
/// cannot fail on a tree that passed context analysis; violated
/// assumptions are programming errors, not user errors.
pub trait BackEndGenerator {
    /// Generate default generator configuration
    fn default() -> Self;

    /// Generate assembly from an abstract syntax tree
    fn generate(self, tree: &AbstractSyntaxTree, analysis: Analysis) -> Assembly;
}

// Concrete Definition Export
pub use self::bytecode_generator::TetraBytecodeGenerator;
