/// Literals are defined constants within a program. See ASTNode for more
/// detail on their usage. They are divided by their representation in text.
///
/// Note: signed literals are stored in the AST as a negate unary
/// operation. For example -32 <=> MON_OP{UnaryOperation::NEGATE, LITERAL(INTEGER(32))}
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Form: %d
    INTEGER(i64),

    /// Form: %d.%d
    FLOAT(f64),

    /// Form: false | true
    BOOL(bool),
}
