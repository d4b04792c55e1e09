// Internal Modules
pub mod compiler;

// Public API Re-Exports
pub use compiler::ast::{
    ASTNode, AbstractSyntaxTree, BinaryOperation, Literal, SourceType, UnaryOperation,
};
pub use compiler::error::{CompileError, CompileErrors};
pub use compiler::{Compiler, TetraBytecodeGenerator, TetraCompiler, TetraContextAnalyser};
