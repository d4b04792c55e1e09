/// Unary operations are expression operations with one argument.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(non_camel_case_types)]
pub enum UnaryOperation {
    NOT,    // ! <rhs>
    NEGATE, // - <rhs>
}

impl UnaryOperation {
    /// Source spelling, used in error messages.
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOperation::NOT => "!",
            UnaryOperation::NEGATE => "-",
        }
    }
}

/// Binary operations are expression operations with two arguments.
/// ADD and MUL double as logical disjunction and conjunction when both
/// operands are boolean.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(non_camel_case_types)]
pub enum BinaryOperation {
    ADD,            // <lhs> + <rhs>
    SUB,            // <lhs> - <rhs>
    MUL,            // <lhs> * <rhs>
    DIV,            // <lhs> / <rhs>
    MOD,            // <lhs> % <rhs>

    EQUAL,          // <lhs> == <rhs>
    NOT_EQUAL,      // <lhs> != <rhs>
    LESS_THAN,      // <lhs> <  <rhs>
    LESS_EQUAL,     // <lhs> <= <rhs>
    GREATER_THAN,   // <lhs> >  <rhs>
    GREATER_EQUAL,  // <lhs> >= <rhs>

    AND,            // <lhs> && <rhs>
    OR,             // <lhs> || <rhs>
}

impl BinaryOperation {
    /// Source spelling, used in error messages.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperation::ADD => "+",
            BinaryOperation::SUB => "-",
            BinaryOperation::MUL => "*",
            BinaryOperation::DIV => "/",
            BinaryOperation::MOD => "%",
            BinaryOperation::EQUAL => "==",
            BinaryOperation::NOT_EQUAL => "!=",
            BinaryOperation::LESS_THAN => "<",
            BinaryOperation::LESS_EQUAL => "<=",
            BinaryOperation::GREATER_THAN => ">",
            BinaryOperation::GREATER_EQUAL => ">=",
            BinaryOperation::AND => "&&",
            BinaryOperation::OR => "||",
        }
    }

    /// Comparison operators produce a boolean regardless of operand type.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperation::EQUAL
                | BinaryOperation::NOT_EQUAL
                | BinaryOperation::LESS_THAN
                | BinaryOperation::LESS_EQUAL
                | BinaryOperation::GREATER_THAN
                | BinaryOperation::GREATER_EQUAL
        )
    }
}
