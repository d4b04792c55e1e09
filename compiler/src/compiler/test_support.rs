//! Hand-built AST fragments shared by the pass tests. Programs are
//! assembled the way an external parser would hand them over.

use super::ast::{
    ASTNode, AbstractSyntaxTree, BinaryOperation, Literal, SourceType, UnaryOperation,
};

pub fn program(decls: Vec<ASTNode>) -> AbstractSyntaxTree {
    AbstractSyntaxTree::new(ASTNode::PROGRAM { decls })
}

pub fn int_lit(value: i64) -> ASTNode {
    ASTNode::LITERAL(Literal::INTEGER(value))
}

pub fn float_lit(value: f64) -> ASTNode {
    ASTNode::LITERAL(Literal::FLOAT(value))
}

pub fn bool_lit(value: bool) -> ASTNode {
    ASTNode::LITERAL(Literal::BOOL(value))
}

pub fn var(name: &str) -> ASTNode {
    ASTNode::VAR {
        name: String::from(name),
        indices: vec![],
        symbol: None,
    }
}

pub fn var_indexed(name: &str, indices: Vec<ASTNode>) -> ASTNode {
    ASTNode::VAR {
        name: String::from(name),
        indices,
        symbol: None,
    }
}

pub fn var_let(name: &str) -> ASTNode {
    ASTNode::VAR_LET {
        name: String::from(name),
        indices: vec![],
        symbol: None,
    }
}

pub fn var_let_indexed(name: &str, indices: Vec<ASTNode>) -> ASTNode {
    ASTNode::VAR_LET {
        name: String::from(name),
        indices,
        symbol: None,
    }
}

pub fn bin_op(op: BinaryOperation, left: ASTNode, right: ASTNode) -> ASTNode {
    ASTNode::BIN_OP {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn mon_op(op: UnaryOperation, expr: ASTNode) -> ASTNode {
    ASTNode::MON_OP {
        op,
        expr: Box::new(expr),
    }
}

pub fn cast(target: SourceType, expr: ASTNode) -> ASTNode {
    ASTNode::CAST {
        target,
        expr: Box::new(expr),
    }
}

pub fn fun_call(name: &str, args: Vec<ASTNode>) -> ASTNode {
    ASTNode::FUN_CALL {
        name: String::from(name),
        args,
        symbol: None,
    }
}

pub fn expr_stmt(expr: ASTNode) -> ASTNode {
    ASTNode::EXPR_STMT {
        expr: Box::new(expr),
    }
}

pub fn assign(var_let: ASTNode, expr: ASTNode) -> ASTNode {
    ASTNode::ASSIGN {
        var_let: Box::new(var_let),
        expr: Box::new(expr),
    }
}

pub fn ret(expr: Option<ASTNode>) -> ASTNode {
    ASTNode::RETURN {
        expr: expr.map(Box::new),
    }
}

pub fn if_else(cond: ASTNode, then_block: Vec<ASTNode>, else_block: Vec<ASTNode>) -> ASTNode {
    ASTNode::IF_ELSE {
        cond: Box::new(cond),
        then_block,
        else_block,
    }
}

pub fn while_loop(cond: ASTNode, block: Vec<ASTNode>) -> ASTNode {
    ASTNode::WHILE {
        cond: Box::new(cond),
        block,
    }
}

pub fn do_while(block: Vec<ASTNode>, cond: ASTNode) -> ASTNode {
    ASTNode::DO_WHILE {
        block,
        cond: Box::new(cond),
    }
}

pub fn for_loop(
    var: &str,
    start: ASTNode,
    stop: ASTNode,
    step: Option<ASTNode>,
    block: Vec<ASTNode>,
) -> ASTNode {
    ASTNode::FOR {
        var: String::from(var),
        start: Box::new(start),
        stop: Box::new(stop),
        step: step.map(Box::new),
        block,
        symbol: None,
    }
}

pub fn arr_expr(exprs: Vec<ASTNode>) -> ASTNode {
    ASTNode::ARR_EXPR { exprs }
}

pub fn param_scalar(name: &str, param_type: SourceType) -> ASTNode {
    ASTNode::PARAM {
        name: String::from(name),
        param_type,
        dims: vec![],
    }
}

pub fn param_array(name: &str, param_type: SourceType, dims: Vec<&str>) -> ASTNode {
    ASTNode::PARAM {
        name: String::from(name),
        param_type,
        dims: dims.into_iter().map(String::from).collect(),
    }
}

pub fn fun_body(
    decls: Vec<ASTNode>,
    local_fun_defs: Vec<ASTNode>,
    stmts: Vec<ASTNode>,
) -> ASTNode {
    ASTNode::FUN_BODY {
        decls,
        local_fun_defs,
        stmts,
    }
}

pub fn fun_def(
    name: &str,
    return_type: SourceType,
    params: Vec<ASTNode>,
    body: Option<ASTNode>,
    exported: bool,
) -> ASTNode {
    ASTNode::FUN_DEF {
        name: String::from(name),
        return_type,
        params,
        body: body.map(Box::new),
        exported,
    }
}

/// `extern <type> <name>;` with optional dimension identifiers.
pub fn glob_decl(name: &str, decl_type: SourceType, dims: Vec<&str>) -> ASTNode {
    ASTNode::GLOB_DECL {
        name: String::from(name),
        decl_type,
        dims: dims.into_iter().map(String::from).collect(),
    }
}

pub fn glob_def_scalar(name: &str, def_type: SourceType, init: Option<ASTNode>) -> ASTNode {
    ASTNode::GLOB_DEF {
        name: String::from(name),
        def_type,
        dims: vec![],
        init: init.map(Box::new),
        exported: false,
    }
}

pub fn glob_def_array(
    name: &str,
    def_type: SourceType,
    dims: Vec<ASTNode>,
    init: Option<ASTNode>,
) -> ASTNode {
    ASTNode::GLOB_DEF {
        name: String::from(name),
        def_type,
        dims,
        init: init.map(Box::new),
        exported: false,
    }
}

pub fn var_decl_scalar(name: &str, decl_type: SourceType, init: Option<ASTNode>) -> ASTNode {
    ASTNode::VAR_DECL {
        name: String::from(name),
        decl_type,
        dims: vec![],
        init: init.map(Box::new),
    }
}

pub fn var_decl_array(
    name: &str,
    decl_type: SourceType,
    dims: Vec<ASTNode>,
    init: Option<ASTNode>,
) -> ASTNode {
    ASTNode::VAR_DECL {
        name: String::from(name),
        decl_type,
        dims,
        init: init.map(Box::new),
    }
}

/// An exported `void main()` holding only statements.
pub fn void_main(stmts: Vec<ASTNode>) -> ASTNode {
    void_main_with_decls(vec![], stmts)
}

pub fn void_main_with_decls(decls: Vec<ASTNode>, stmts: Vec<ASTNode>) -> ASTNode {
    fun_def(
        "main",
        SourceType::Void,
        vec![],
        Some(fun_body(decls, vec![], stmts)),
        true,
    )
}

/// First statement of the body of the function called `main`.
pub fn first_main_stmt(tree: &AbstractSyntaxTree) -> &ASTNode {
    let ASTNode::PROGRAM { decls } = tree.root() else {
        panic!("root is not a program");
    };
    for decl in decls {
        if let ASTNode::FUN_DEF { name, body: Some(body), .. } = decl {
            if name == "main" {
                let ASTNode::FUN_BODY { stmts, .. } = body.as_ref() else {
                    panic!("malformed body");
                };
                return &stmts[0];
            }
        }
    }
    panic!("no main function in test program");
}
