pub mod analysis;
pub mod ast;
pub mod backend;
pub mod error;
pub mod opts;
pub mod symbol;

#[cfg(test)]
pub(crate) mod test_support;


use std::path::Path;

use log::debug;

use tetra_common::Assembly;

// Interface Definitions
use self::analysis::ContextAnalyser;
use self::ast::AbstractSyntaxTree;
use self::backend::BackEndGenerator;
use self::error::{CompileError, CompileErrors};

// Concrete Definitions Re-Export
pub use self::analysis::TetraContextAnalyser;
pub use self::backend::TetraBytecodeGenerator;

/// Compiler ties the back-end passes together: the strength-reduction
/// rewrite, context analysis and bytecode generation. Parsing happens
/// upstream; the compiler consumes a finished AbstractSyntaxTree.
pub struct Compiler<A: ContextAnalyser, G: BackEndGenerator> {
    analyser: A,
    generator: G,
}

/// The default pass configuration.
pub type TetraCompiler = Compiler<TetraContextAnalyser, TetraBytecodeGenerator>;

impl<A: ContextAnalyser, G: BackEndGenerator> Compiler<A, G> {
    pub fn default() -> Self {
        Compiler {
            analyser: A::default(),
            generator: G::default(),
        }
    }

    pub fn new(analyser: A, generator: G) -> Self {
        Compiler { analyser, generator }
    }

    /// Compiles a tree into its in-memory assembly. Analysis errors are
    /// reported together; the tree is decorated in place.
    pub fn compile(self, tree: &mut AbstractSyntaxTree) -> Result<Assembly, CompileErrors> {
        opts::strength_reduction::reduce(tree.root_mut());

        let analysis = self.analyser.analyse(tree)?;
        Ok(self.generator.generate(tree, analysis))
    }

    /// Compiles a tree and writes the textual assembly to dest.
    pub fn compile_and_save(
        self,
        tree: &mut AbstractSyntaxTree,
        dest: &Path,
    ) -> Result<(), CompileErrors> {
        let assembly = self.compile(tree)?;

        assembly
            .save_to_file(dest)
            .map_err(|error| CompileErrors::from(CompileError::Io(error)))?;

        debug!("wrote assembly to {}", dest.display());
        Ok(())
    }
}
