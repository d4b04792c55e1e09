use super::super::ast::{ASTNode, BinaryOperation, Literal};

/// Largest multiplier that is still turned into an addition chain.
const MAX_REDUCED_FACTOR: i64 = 10;

/// Strength reduction rewrites multiplications of a variable by a small
/// integer literal into a chain of additions, which the VM executes
/// faster than a multiply. Only plain (unindexed) variables qualify, so
/// no expression is ever duplicated. Runs before context analysis; the
/// rewritten nodes are analysed like hand-written ones.
pub fn reduce(node: &mut ASTNode) {
    // Children first, so nested candidates collapse before the parent
    // is inspected.
    match node {
        ASTNode::PROGRAM { decls } => decls.iter_mut().for_each(reduce),
        ASTNode::FUN_DEF { body, .. } => {
            if let Some(body) = body {
                reduce(body);
            }
        }
        ASTNode::FUN_BODY { decls, local_fun_defs, stmts } => {
            decls.iter_mut().for_each(reduce);
            local_fun_defs.iter_mut().for_each(reduce);
            stmts.iter_mut().for_each(reduce);
        }
        ASTNode::GLOB_DEF { dims, init, .. } | ASTNode::VAR_DECL { dims, init, .. } => {
            dims.iter_mut().for_each(reduce);
            if let Some(init) = init {
                reduce(init);
            }
        }
        ASTNode::ASSIGN { var_let, expr } => {
            reduce(var_let);
            reduce(expr);
        }
        ASTNode::VAR_LET { indices, .. } | ASTNode::VAR { indices, .. } => {
            indices.iter_mut().for_each(reduce);
        }
        ASTNode::EXPR_STMT { expr } => reduce(expr),
        ASTNode::IF_ELSE { cond, then_block, else_block } => {
            reduce(cond);
            then_block.iter_mut().for_each(reduce);
            else_block.iter_mut().for_each(reduce);
        }
        ASTNode::WHILE { cond, block } => {
            reduce(cond);
            block.iter_mut().for_each(reduce);
        }
        ASTNode::DO_WHILE { block, cond } => {
            block.iter_mut().for_each(reduce);
            reduce(cond);
        }
        ASTNode::FOR { start, stop, step, block, .. } => {
            reduce(start);
            reduce(stop);
            if let Some(step) = step {
                reduce(step);
            }
            block.iter_mut().for_each(reduce);
        }
        ASTNode::RETURN { expr } => {
            if let Some(expr) = expr {
                reduce(expr);
            }
        }
        ASTNode::FUN_CALL { args, .. } => args.iter_mut().for_each(reduce),
        ASTNode::CAST { expr, .. } | ASTNode::MON_OP { expr, .. } => reduce(expr),
        ASTNode::BIN_OP { left, right, .. } => {
            reduce(left);
            reduce(right);
        }
        ASTNode::ARR_EXPR { exprs } => exprs.iter_mut().for_each(reduce),
        ASTNode::PARAM { .. } | ASTNode::GLOB_DECL { .. } | ASTNode::LITERAL(_) => {}
    }

    let ASTNode::BIN_OP { op: BinaryOperation::MUL, left, right } = node else {
        return;
    };

    // One plain variable and one literal factor, in either order
    let candidate = match (left.as_ref(), right.as_ref()) {
        (var @ ASTNode::VAR { indices, .. }, ASTNode::LITERAL(Literal::INTEGER(value)))
            if indices.is_empty() =>
        {
            Some((var.clone(), *value))
        }
        (ASTNode::LITERAL(Literal::INTEGER(value)), var @ ASTNode::VAR { indices, .. })
            if indices.is_empty() =>
        {
            Some((var.clone(), *value))
        }
        _ => None,
    };

    let Some((var, factor)) = candidate else {
        return;
    };
    // Factors 0 and 1 belong to other rewrites; large factors would
    // bloat the instruction stream.
    if !(2..=MAX_REDUCED_FACTOR).contains(&factor) {
        return;
    }

    let mut chain = ASTNode::BIN_OP {
        op: BinaryOperation::ADD,
        left: Box::new(var.clone()),
        right: Box::new(var.clone()),
    };
    for _ in 2..factor {
        chain = ASTNode::BIN_OP {
            op: BinaryOperation::ADD,
            left: Box::new(chain),
            right: Box::new(var.clone()),
        };
    }

    *node = chain;
}

#[cfg(test)]
mod tests {
    use super::reduce;
    use crate::compiler::ast::{ASTNode, BinaryOperation};
    use crate::compiler::test_support::*;

    #[test]
    fn small_multiplications_become_addition_chains() {
        let mut node = bin_op(BinaryOperation::MUL, var("x"), int_lit(3));
        reduce(&mut node);

        // (x + x) + x
        let expected = bin_op(
            BinaryOperation::ADD,
            bin_op(BinaryOperation::ADD, var("x"), var("x")),
            var("x"),
        );
        assert_eq!(node, expected);
    }

    #[test]
    fn the_literal_may_come_first() {
        let mut node = bin_op(BinaryOperation::MUL, int_lit(2), var("x"));
        reduce(&mut node);
        assert_eq!(node, bin_op(BinaryOperation::ADD, var("x"), var("x")));
    }

    #[test]
    fn unit_and_large_factors_are_left_alone() {
        let mut unit = bin_op(BinaryOperation::MUL, var("x"), int_lit(1));
        reduce(&mut unit);
        assert_eq!(unit, bin_op(BinaryOperation::MUL, var("x"), int_lit(1)));

        let mut large = bin_op(BinaryOperation::MUL, var("x"), int_lit(11));
        reduce(&mut large);
        assert_eq!(large, bin_op(BinaryOperation::MUL, var("x"), int_lit(11)));

        let mut negative = bin_op(BinaryOperation::MUL, var("x"), int_lit(-3));
        reduce(&mut negative);
        assert_eq!(negative, bin_op(BinaryOperation::MUL, var("x"), int_lit(-3)));
    }

    #[test]
    fn indexed_variables_are_not_duplicated() {
        let mut node = bin_op(
            BinaryOperation::MUL,
            var_indexed("a", vec![fun_call("next", vec![])]),
            int_lit(2),
        );
        let before = node.clone();
        reduce(&mut node);
        assert_eq!(node, before);
    }

    #[test]
    fn rewrites_apply_inside_statements() {
        let mut tree = program(vec![void_main(vec![
            assign(var_let("y"), bin_op(BinaryOperation::MUL, var("x"), int_lit(2))),
            ret(None),
        ])]);
        reduce(tree.root_mut());

        let stmt = first_main_stmt(&tree);
        let ASTNode::ASSIGN { expr, .. } = stmt else { panic!() };
        assert_eq!(
            expr.as_ref(),
            &bin_op(BinaryOperation::ADD, var("x"), var("x"))
        );
    }
}
