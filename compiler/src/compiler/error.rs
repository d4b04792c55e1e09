use std::fmt;

use thiserror::Error;

use tetra_common::ValueType;

/// CompileError enumerates everything the compiler can report to its
/// user, plus the IO failures of writing the output file. Analysis
/// collects these without stopping so one run surfaces as many problems
/// as possible; internal invariants of the passes are debug assertions
/// instead and never reach this type.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("symbol '{0}' is already declared in this scope")]
    DuplicateSymbol(String),

    #[error("symbol '{0}' has not been declared")]
    UndeclaredSymbol(String),

    #[error("{context}: expected {expected} but got {found}")]
    TypeMismatch {
        context: String,
        expected: ValueType,
        found: ValueType,
    },

    #[error("call to '{name}' expects {expected} argument values but got {found}")]
    ArgumentCountMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("{0}")]
    ArrayShape(String),

    #[error("invalid cast: {0}")]
    InvalidCast(String),

    #[error("operator {op} cannot be applied to {vtype}")]
    InvalidOperator { op: String, vtype: ValueType },

    #[error("invalid type: {0}")]
    InvalidType(String),

    #[error("function '{0}' is missing a return statement")]
    MissingReturn(String),

    #[error("failed to write assembly output")]
    Io(#[from] std::io::Error),
}

/// The cumulative result of a failed analysis run: every error found
/// before the pass gave up, in discovery order.
#[derive(Debug)]
pub struct CompileErrors(pub Vec<CompileError>);

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

impl From<CompileError> for CompileErrors {
    fn from(error: CompileError) -> Self {
        CompileErrors(vec![error])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_type_spellings() {
        let err = CompileError::TypeMismatch {
            context: String::from("assignment"),
            expected: ValueType::Int,
            found: ValueType::FloatArray,
        };
        assert_eq!(err.to_string(), "assignment: expected int but got float[]");
    }

    #[test]
    fn bundles_render_one_error_per_line() {
        let bundle = CompileErrors(vec![
            CompileError::DuplicateSymbol(String::from("x")),
            CompileError::UndeclaredSymbol(String::from("y")),
        ]);
        let text = bundle.to_string();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("'y' has not been declared"));
    }
}
