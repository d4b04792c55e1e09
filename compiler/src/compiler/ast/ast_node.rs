use tetra_common::ValueType;

use super::super::error::CompileError;
use super::super::symbol::SymbolId;
use super::literals::Literal;
use super::operators::{BinaryOperation, UnaryOperation};

/// SourceType is a type as written in source text. It is purely
/// syntactic; context analysis combines it with array information to
/// obtain the runtime ValueType.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Int,
    Float,
    Bool,
    Void,
}

impl SourceType {
    /// Resolves a syntactic type against array-ness into a runtime
    /// value type. Fails for void arrays, which do not exist.
    pub fn to_value_type(self, is_array: bool) -> Result<ValueType, CompileError> {
        let scalar = match self {
            SourceType::Int => ValueType::Int,
            SourceType::Float => ValueType::Float,
            SourceType::Bool => ValueType::Bool,
            SourceType::Void => ValueType::Void,
        };

        if is_array {
            scalar
                .array_of()
                .ok_or_else(|| CompileError::InvalidType(String::from("a void array is not a valid type")))
        } else {
            Ok(scalar)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[allow(non_camel_case_types)]
pub enum ASTNode {
    /// Program is the root node holding all top-level declarations:
    /// function definitions, global definitions and external
    /// declarations, in source order.
    PROGRAM {
        decls: Vec<ASTNode>,
    },

    /// Function definition. A definition without a body declares an
    /// externally linked function that is resolved at link time.
    ///
    /// # Syntax:
    ///     (export)? <type> <identifier>( (<param>, )* ) { ... }
    ///     extern <type> <identifier>( (<param>, )* );
    ///
    /// # Example:
    ///     export int twice(int x) { return 2 * x; }
    ///     ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^ -> Function Definition
    FUN_DEF {
        name: String,
        return_type: SourceType,
        params: Vec<ASTNode>,
        /// None for externally linked functions
        body: Option<Box<ASTNode>>,
        exported: bool,
    },

    /// Function body: local variable declarations first, then nested
    /// function definitions, then statements.
    FUN_BODY {
        decls: Vec<ASTNode>,
        local_fun_defs: Vec<ASTNode>,
        stmts: Vec<ASTNode>,
    },

    /// Function parameter. Array parameters name their dimensions; the
    /// dimension identifiers become integer variables of the function
    /// scope so that array sizes travel with the array.
    ///
    /// # Example:
    ///     int sum(int[n] values) { ... }
    ///             ^^^^^^^^^^^^^ -> Parameter
    PARAM {
        name: String,
        param_type: SourceType,
        dims: Vec<String>,
    },

    /// Externally linked global variable declaration. Array dimensions
    /// are identifiers, imported alongside the array itself.
    ///
    /// # Syntax:
    ///     extern <type> <identifier>;
    ///     extern <type>[<id>(,<id>)*] <identifier>;
    GLOB_DECL {
        name: String,
        decl_type: SourceType,
        dims: Vec<String>,
    },

    /// Global variable definition, optionally initialised and
    /// optionally exported. Array dimensions are expressions evaluated
    /// at program initialisation time.
    ///
    /// # Example:
    ///     export int counter = 0;
    ///     ^^^^^^^^^^^^^^^^^^^^^^^ -> Global Definition
    GLOB_DEF {
        name: String,
        def_type: SourceType,
        dims: Vec<ASTNode>,
        init: Option<Box<ASTNode>>,
        exported: bool,
    },

    /// Local variable declaration at the top of a function body.
    ///
    /// # Example:
    ///     int[2, 3] grid = 0;
    ///     ^^^^^^^^^^^^^^^^^^^ -> Variable Declaration (scalar broadcast)
    VAR_DECL {
        name: String,
        decl_type: SourceType,
        dims: Vec<ASTNode>,
        init: Option<Box<ASTNode>>,
    },

    /// Assignment statement. The target is a VAR_LET node.
    ///
    /// # Syntax:
    ///     <varlet> = <expression>;
    ASSIGN {
        var_let: Box<ASTNode>,
        expr: Box<ASTNode>,
    },

    /// Assignment target: a variable, or an array element when indexed.
    /// Analysis records the resolved symbol so that emission does not
    /// repeat the scope walk.
    VAR_LET {
        name: String,
        indices: Vec<ASTNode>,
        symbol: Option<SymbolId>,
    },

    /// Expression statement; its value is discarded.
    ///
    /// # Example:
    ///     log(x);
    ///     ^^^^^^^ -> Expression Statement
    EXPR_STMT {
        expr: Box<ASTNode>,
    },

    /// Conditional statement. An absent else branch is an empty block.
    ///
    /// # Syntax:
    ///     if (<expression>) { ... } (else { ... })?
    IF_ELSE {
        cond: Box<ASTNode>,
        then_block: Vec<ASTNode>,
        else_block: Vec<ASTNode>,
    },

    /// While loop; the condition is evaluated before each iteration.
    ///
    /// # Syntax:
    ///     while (<expression>) { ... }
    WHILE {
        cond: Box<ASTNode>,
        block: Vec<ASTNode>,
    },

    /// Do-while loop; the body runs at least once.
    ///
    /// # Syntax:
    ///     do { ... } while (<expression>);
    DO_WHILE {
        block: Vec<ASTNode>,
        cond: Box<ASTNode>,
    },

    /// Counted loop over an integer induction variable. Start, stop and
    /// step are integer expressions; a missing step defaults to 1 (the
    /// analyser materialises the literal). The step sign is decided at
    /// runtime, so both upward and downward loops work. The loop opens
    /// a scope of its own that shares the enclosing function's frame;
    /// analysis records the loop's sentinel symbol.
    ///
    /// # Syntax:
    ///     for (int <identifier> = <start>, <stop> (, <step>)?) { ... }
    ///
    /// # Example:
    ///     for (int i = 10, 0, -1) { ... }
    ///     ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^ -> For Loop
    FOR {
        var: String,
        start: Box<ASTNode>,
        stop: Box<ASTNode>,
        step: Option<Box<ASTNode>>,
        block: Vec<ASTNode>,
        symbol: Option<SymbolId>,
    },

    /// Return statement; the expression is absent in void functions.
    ///
    /// # Syntax:
    ///     return (<expression>)?;
    RETURN {
        expr: Option<Box<ASTNode>>,
    },

    /// Function call expression. Analysis records the resolved callee.
    /// Unindexed array arguments implicitly pass their dimensions
    /// before the array reference itself.
    ///
    /// # Example:
    ///     int s = sum(values);
    ///             ^^^^^^^^^^^ -> Function Call
    FUN_CALL {
        name: String,
        args: Vec<ASTNode>,
        symbol: Option<SymbolId>,
    },

    /// Cast expression between the scalar types int, float and bool.
    /// Context analysis also inserts these nodes for implicit numeric
    /// promotions.
    ///
    /// # Syntax:
    ///     (<type>) <expression>
    CAST {
        target: SourceType,
        expr: Box<ASTNode>,
    },

    /// Binary operation.
    ///
    /// # Example:
    ///     int x = 40 + 2;
    ///                ^ -> Binary Operator
    BIN_OP {
        op: BinaryOperation,
        left: Box<ASTNode>,
        right: Box<ASTNode>,
    },

    /// Unary operation.
    ///
    /// # Example:
    ///     bool b = !(x < 3);
    ///              ^ -> Unary Operator
    MON_OP {
        op: UnaryOperation,
        expr: Box<ASTNode>,
    },

    /// Variable use: the plain variable, or an element when indexed.
    /// Using an array without indices pushes its dimensions together
    /// with the reference, matching the calling convention. Analysis
    /// records the resolved symbol.
    VAR {
        name: String,
        indices: Vec<ASTNode>,
        symbol: Option<SymbolId>,
    },

    /// Array literal initialiser, possibly nested for multidimensional
    /// arrays. Only valid as an initialiser.
    ///
    /// # Example:
    ///     int[2, 2] m = [[1, 2], [3, 4]];
    ///                   ^^^^^^^^^^^^^^^^ -> Array Expression
    ARR_EXPR {
        exprs: Vec<ASTNode>,
    },

    /// Literal constant used within an expression.
    ///
    /// # Example:
    ///     int x = 4;
    ///             ^ -> Literal
    LITERAL(Literal),
}
