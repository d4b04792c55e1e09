use std::mem;

use log::debug;

use tetra_common::ValueType;

use super::super::ast::{
    ASTNode, AbstractSyntaxTree, BinaryOperation, Literal, SourceType, UnaryOperation,
};
use super::super::error::{CompileError, CompileErrors};
use super::super::symbol::{ScopeId, ScopeKind, ScopeTree, Symbol, SymbolId, SymbolKind};
use super::{Analysis, ArgListStack, ContextAnalyser};

/// TetraContextAnalyser is a concrete ContextAnalyser.
///
/// It traverses the tree twice. The declaration pass discovers every
/// top-level name (and, per function, its parameters and signature) so
/// that bodies may refer to functions declared later in the file. The
/// analysis pass then walks bodies: each function body runs its own
/// nested declaration pass over local declarations and local function
/// definitions before its statements are checked.
///
/// Expression visitors return the inferred value type of the node they
/// checked; `ValueType::Null` means "an error was already reported
/// here", and every caller treats it as compatible to avoid error
/// cascades. Errors accumulate so one run reports as many problems as
/// possible; the pass fails as a whole if anything was recorded.
pub struct TetraContextAnalyser {
    scopes: ScopeTree,
    current_scope: ScopeId,
    errors: Vec<CompileError>,
    args: ArgListStack,

    /// Whether the body currently being analysed contained a return
    had_return: bool,

    // Offset counters of the global scope. Globals index the global
    // variable table; imports and exports index their own tables.
    global_var_offset: usize,
    fun_import_offset: usize,
    var_import_offset: usize,
    fun_export_offset: usize,
}

impl ContextAnalyser for TetraContextAnalyser {
    fn default() -> Self {
        let scopes = ScopeTree::new();
        let current_scope = scopes.global_scope();
        Self {
            scopes,
            current_scope,
            errors: vec![],
            args: ArgListStack::new(),
            had_return: false,
            global_var_offset: 0,
            fun_import_offset: 0,
            var_import_offset: 0,
            fun_export_offset: 0,
        }
    }

    fn analyse(mut self, tree: &mut AbstractSyntaxTree) -> Result<Analysis, CompileErrors> {
        match tree.root_mut() {
            ASTNode::PROGRAM { decls } => {
                debug!("context analysis: declaration pass");
                for decl in decls.iter_mut() {
                    self.declare_decl(decl);
                }

                debug!("context analysis: analysis pass");
                for decl in decls.iter_mut() {
                    self.analyse_decl(decl);
                }
            }
            node => unreachable!("program root must be a PROGRAM node, got {:?}", node),
        }

        debug_assert_eq!(self.args.depth(), 0, "unbalanced call frames after analysis");

        if !self.errors.is_empty() {
            return Err(CompileErrors(self.errors));
        }

        let requires_init = self.global_var_offset > 0;
        debug!(
            "context analysis: done ({} globals, init function {})",
            self.global_var_offset,
            if requires_init { "required" } else { "not required" }
        );

        let global_scope = self.scopes.global_scope();
        Ok(Analysis {
            scopes: self.scopes,
            global_scope,
            requires_init,
        })
    }
}

/// Declaration pass
impl TetraContextAnalyser {
    fn declare_decl(&mut self, node: &mut ASTNode) {
        match node {
            ASTNode::GLOB_DECL { name, decl_type, dims } => {
                let (name, decl_type, dims) = (name.clone(), *decl_type, dims.clone());
                self.declare_glob_decl(&name, decl_type, &dims);
            }
            ASTNode::GLOB_DEF { name, def_type, dims, init, exported } => {
                let (name, def_type, exported) = (name.clone(), *def_type, *exported);
                let dim_count = dims.len();
                let scalar_init = matches!(init.as_deref(), Some(e) if !matches!(e, ASTNode::ARR_EXPR { .. }));
                self.declare_global_variable(&name, def_type, dim_count, scalar_init, exported);
            }
            ASTNode::FUN_DEF { name, return_type, params, body, exported } => {
                let (name, return_type, exported) = (name.clone(), *return_type, *exported);
                let imported = body.is_none();
                self.declare_fun_def(&name, return_type, params, imported, exported);
            }
            ASTNode::VAR_DECL { name, decl_type, dims, init } => {
                let (name, decl_type) = (name.clone(), *decl_type);
                let dim_count = dims.len();
                let scalar_init = matches!(init.as_deref(), Some(e) if !matches!(e, ASTNode::ARR_EXPR { .. }));
                self.declare_local_variable(&name, decl_type, dim_count, scalar_init);
            }
            node => unreachable!("node {:?} is not a declaration", node),
        }
    }

    fn declare_glob_decl(&mut self, name: &str, decl_type: SourceType, dims: &[String]) {
        let vtype = match decl_type.to_value_type(!dims.is_empty()) {
            Ok(vtype) => vtype,
            Err(error) => return self.record(error),
        };

        let global = self.scopes.global_scope();
        self.declare_variable(global, name, vtype, dims, true, false);
    }

    fn declare_global_variable(
        &mut self,
        name: &str,
        def_type: SourceType,
        dim_count: usize,
        scalar_init: bool,
        exported: bool,
    ) {
        let vtype = match def_type.to_value_type(dim_count > 0) {
            Ok(vtype) => vtype,
            Err(error) => return self.record(error),
        };

        let global = self.scopes.global_scope();
        let dim_names = Self::dim_names(name, dim_count);
        self.declare_variable(global, name, vtype, &dim_names, false, exported);

        if dim_count > 0 && scalar_init {
            self.declare_broadcast_helpers(global, name, vtype);
        }
    }

    fn declare_local_variable(
        &mut self,
        name: &str,
        decl_type: SourceType,
        dim_count: usize,
        scalar_init: bool,
    ) {
        let vtype = match decl_type.to_value_type(dim_count > 0) {
            Ok(vtype) => vtype,
            Err(error) => return self.record(error),
        };

        let scope = self.current_scope;
        let dim_names = Self::dim_names(name, dim_count);
        self.declare_variable(scope, name, vtype, &dim_names, false, false);

        if dim_count > 0 && scalar_init {
            self.declare_broadcast_helpers(scope, name, vtype);
        }
    }

    /// Synthetic names of the dimension scalars of an array declared
    /// with expression-sized dimensions.
    fn dim_names(name: &str, dim_count: usize) -> Vec<String> {
        (0..dim_count).map(|i| format!("_dim{}_{}", i, name)).collect()
    }

    /// Declares a variable in `scope`, preceded by one integer scalar
    /// per array dimension. Dimension slots come first so that the
    /// layout matches the VM calling convention.
    fn declare_variable(
        &mut self,
        scope: ScopeId,
        name: &str,
        vtype: ValueType,
        dim_names: &[String],
        imported: bool,
        exported: bool,
    ) -> Option<SymbolId> {
        let mut dim_ids = vec![];
        for dim_name in dim_names {
            let offset = self.alloc_slot(scope, imported);
            let mut dim = Symbol::new_scalar(dim_name, ValueType::Int).with_offset(offset);
            if imported {
                dim = dim.imported();
            }
            if exported {
                dim = dim.exported();
            }
            if let Some(id) = self.insert_or_record(scope, dim) {
                dim_ids.push(id);
            }
        }

        let offset = self.alloc_slot(scope, imported);
        let mut symbol = if dim_names.is_empty() {
            Symbol::new_scalar(name, vtype)
        } else {
            Symbol::new_array(name, vtype)
        };
        symbol = symbol.with_offset(offset);
        if imported {
            symbol = symbol.imported();
        }
        if exported {
            symbol = symbol.exported();
        }
        for dim_id in &dim_ids {
            symbol.add_dim(*dim_id);
        }

        self.insert_or_record(scope, symbol)
    }

    /// Reserves the three scalar slots the emitter uses to lower an
    /// array declaration initialised with a single scalar into a
    /// runtime broadcast loop.
    fn declare_broadcast_helpers(&mut self, scope: ScopeId, name: &str, array_type: ValueType) {
        let element_type = array_type.element_type().expect("broadcast helper for non-array");
        let helpers = [
            (format!("_scalar_{}", name), element_type),
            (format!("_counter_{}", name), ValueType::Int),
            (format!("_size_{}", name), ValueType::Int),
        ];

        for (helper_name, helper_type) in helpers {
            let offset = self.alloc_slot(scope, false);
            let symbol = Symbol::new_scalar(&helper_name, helper_type).with_offset(offset);
            self.insert_or_record(scope, symbol);
        }
    }

    fn declare_fun_def(
        &mut self,
        name: &str,
        return_type: SourceType,
        params: &mut [ASTNode],
        imported: bool,
        exported: bool,
    ) {
        let ret_type = match return_type.to_value_type(false) {
            Ok(vtype) => vtype,
            Err(error) => {
                self.record(error);
                ValueType::Void
            }
        };

        let label = self.mangled_label(name);
        let scope = self.scopes.new_scope(self.current_scope, ScopeKind::Function);

        let offset = if imported {
            let offset = self.fun_import_offset;
            self.fun_import_offset += 1;
            offset
        } else if exported {
            let offset = self.fun_export_offset;
            self.fun_export_offset += 1;
            offset
        } else {
            0
        };

        let mut symbol = Symbol::new_function(name, ret_type, scope, &label).with_offset(offset);
        if imported {
            symbol = symbol.imported();
        }
        if exported {
            symbol = symbol.exported();
        }

        let Some(fun_id) = self.insert_or_record(self.current_scope, symbol) else {
            return;
        };
        self.scopes.scope_mut(scope).parent_fun = Some(fun_id);

        // Parameters are recorded during the declaration pass so that
        // argument checking of calls to later-declared functions sees a
        // complete signature.
        let saved_scope = self.current_scope;
        self.current_scope = scope;
        for param in params.iter_mut() {
            self.declare_param(fun_id, param);
        }
        self.current_scope = saved_scope;
    }

    fn declare_param(&mut self, fun_id: SymbolId, param: &mut ASTNode) {
        let ASTNode::PARAM { name, param_type, dims } = param else {
            unreachable!("node {:?} is not a parameter", param);
        };
        let (name, param_type, dims) = (name.clone(), *param_type, dims.clone());

        let vtype = match param_type.to_value_type(!dims.is_empty()) {
            Ok(vtype) => vtype,
            Err(error) => return self.record(error),
        };

        let scope = self.current_scope;
        self.declare_variable(scope, &name, vtype, &dims, false, false);

        // The dimension scalars of an array parameter are pushed by the
        // caller, so they count as parameter slots of their own.
        for _ in 0..dims.len() {
            self.scopes.symbol_mut(fun_id).add_param(ValueType::Int, 0);
        }
        self.scopes.symbol_mut(fun_id).add_param(vtype, dims.len());
    }

    /// Label of a function: exported and top-level functions keep their
    /// source name; nested functions are prefixed with the chain of
    /// enclosing function names.
    fn mangled_label(&self, name: &str) -> String {
        let mut chain = vec![];
        let mut scope = self.current_scope;
        while let Some(fun_id) = self.scopes.scope(scope).parent_fun {
            let fun = self.scopes.symbol(fun_id);
            chain.push(fun.name.clone());
            scope = fun.parent_scope.expect("function symbol without scope");
        }

        if chain.is_empty() {
            String::from(name)
        } else {
            chain.reverse();
            format!("_{}_{}", chain.join("_"), name)
        }
    }

    /// Allocates one variable slot: imports index the import table,
    /// globals the global table, everything else the enclosing frame.
    fn alloc_slot(&mut self, scope: ScopeId, imported: bool) -> usize {
        if imported {
            let offset = self.var_import_offset;
            self.var_import_offset += 1;
            offset
        } else if scope == self.scopes.global_scope() {
            let offset = self.global_var_offset;
            self.global_var_offset += 1;
            offset
        } else {
            self.scopes.alloc_offset(scope)
        }
    }
}

/// Analysis pass
impl TetraContextAnalyser {
    fn analyse_decl(&mut self, node: &mut ASTNode) {
        match node {
            ASTNode::GLOB_DECL { .. } => {
                // Nothing left to check; dimensions are identifiers
            }
            ASTNode::GLOB_DEF { name, dims, init, .. } => {
                let name = name.clone();
                self.analyse_variable_decl(&name, dims, init);
            }
            ASTNode::FUN_DEF { name, body, .. } => {
                let name = name.clone();
                if let Some(body) = body {
                    self.analyse_fun_def(&name, body);
                }
            }
            ASTNode::VAR_DECL { name, dims, init, .. } => {
                let name = name.clone();
                self.analyse_variable_decl(&name, dims, init);
            }
            node => unreachable!("node {:?} is not a declaration", node),
        }
    }

    fn analyse_variable_decl(
        &mut self,
        name: &str,
        dims: &mut [ASTNode],
        init: &mut Option<Box<ASTNode>>,
    ) {
        // Declaration may have failed; nothing more to check then
        let Some(sym_id) = self.scopes.lookup_local(self.current_scope, name) else {
            return;
        };

        for dim in dims.iter_mut() {
            let found = self.analyse_expr(dim);
            self.require_int(found, "array dimension");
        }

        if let Some(init) = init {
            self.analyse_initialiser(sym_id, init);
        }
    }

    fn analyse_initialiser(&mut self, sym_id: SymbolId, init: &mut Box<ASTNode>) {
        let (name, vtype) = {
            let symbol = self.scopes.symbol(sym_id);
            (symbol.name.clone(), symbol.vtype)
        };

        if let Some(element_type) = vtype.element_type() {
            match init.as_mut() {
                ASTNode::ARR_EXPR { .. } => {
                    self.check_arr_expr_shape(init);
                    self.analyse_arr_expr_leaves(init, element_type);
                }
                node => {
                    let found = self.analyse_expr(node);
                    if found.is_array() {
                        self.record(CompileError::ArrayShape(format!(
                            "array '{}' cannot be initialised from another array",
                            name
                        )));
                    } else {
                        self.coerce(node, found, element_type, "array initialisation");
                    }
                }
            }
        } else {
            match init.as_mut() {
                ASTNode::ARR_EXPR { .. } => {
                    self.record(CompileError::ArrayShape(format!(
                        "'{}' is not an array and cannot take an array literal",
                        name
                    )));
                }
                node => {
                    let found = self.analyse_expr(node);
                    self.coerce(node, found, vtype, "initialisation");
                }
            }
        }
    }

    /// Counts the expressions an array literal contains, exploring
    /// nested literals, and reports inconsistent nesting.
    fn check_arr_expr_shape(&mut self, node: &ASTNode) -> usize {
        match node {
            ASTNode::ARR_EXPR { exprs } => {
                let mut count = 0;
                let mut saw_nested = false;
                for expr in exprs {
                    if matches!(expr, ASTNode::ARR_EXPR { .. }) {
                        count += self.check_arr_expr_shape(expr);
                        saw_nested = true;
                    } else {
                        count += 1;
                        if saw_nested {
                            self.record(CompileError::ArrayShape(String::from(
                                "inconsistent initialisation value shape of array",
                            )));
                        }
                    }
                }
                count
            }
            node => unreachable!("node {:?} is not an array literal", node),
        }
    }

    fn analyse_arr_expr_leaves(&mut self, node: &mut ASTNode, element_type: ValueType) {
        let ASTNode::ARR_EXPR { exprs } = node else {
            unreachable!("node {:?} is not an array literal", node);
        };

        for expr in exprs.iter_mut() {
            if matches!(expr, ASTNode::ARR_EXPR { .. }) {
                self.analyse_arr_expr_leaves(expr, element_type);
            } else {
                let found = self.analyse_expr(expr);
                self.coerce(expr, found, element_type, "array initialisation");
            }
        }
    }

    fn analyse_fun_def(&mut self, name: &str, body: &mut ASTNode) {
        let Some(fun_id) = self.scopes.lookup_local(self.current_scope, name) else {
            return;
        };
        if !self.scopes.symbol(fun_id).is_function() {
            // A duplicate declaration already produced an error
            return;
        }

        let saved_scope = self.current_scope;
        self.current_scope = self.scopes.symbol(fun_id).fun_data().scope;
        self.analyse_fun_body(fun_id, body);
        self.current_scope = saved_scope;
    }

    fn analyse_fun_body(&mut self, fun_id: SymbolId, body: &mut ASTNode) {
        let ASTNode::FUN_BODY { decls, local_fun_defs, stmts } = body else {
            unreachable!("node {:?} is not a function body", body);
        };

        // Nested declaration pass: local declarations and local
        // function signatures become visible before anything in this
        // body is checked.
        for decl in decls.iter_mut() {
            self.declare_decl(decl);
        }
        for fun in local_fun_defs.iter_mut() {
            self.declare_decl(fun);
        }

        // Nested analysis pass
        for fun in local_fun_defs.iter_mut() {
            self.analyse_decl(fun);
        }

        self.had_return = false;
        for decl in decls.iter_mut() {
            self.analyse_decl(decl);
        }
        for stmt in stmts.iter_mut() {
            self.analyse_stmt(stmt);
        }

        let (fun_name, ret_type) = {
            let fun = self.scopes.symbol(fun_id);
            (fun.name.clone(), fun.vtype)
        };
        if ret_type != ValueType::Void && !self.had_return {
            self.record(CompileError::MissingReturn(fun_name));
        }
    }

    fn analyse_stmt(&mut self, node: &mut ASTNode) {
        match node {
            ASTNode::ASSIGN { var_let, expr } => {
                let let_type = self.analyse_var_let(var_let);
                let expr_type = self.analyse_expr(expr);

                if let_type == ValueType::Null || expr_type == ValueType::Null {
                    return;
                }
                if let_type.is_arithmetic() && expr_type.is_arithmetic() {
                    if let_type != expr_type {
                        // Implicit cast toward the target, narrowing included
                        Self::insert_cast(expr, Self::scalar_source_type(let_type));
                    }
                } else if !(let_type == ValueType::Bool && expr_type == ValueType::Bool) {
                    self.record(CompileError::TypeMismatch {
                        context: String::from("assignment"),
                        expected: let_type,
                        found: expr_type,
                    });
                }
            }
            ASTNode::EXPR_STMT { expr } => {
                self.analyse_expr(expr);
            }
            ASTNode::IF_ELSE { cond, then_block, else_block } => {
                let found = self.analyse_expr(cond);
                self.require_bool(found, "if condition");
                for stmt in then_block.iter_mut() {
                    self.analyse_stmt(stmt);
                }
                for stmt in else_block.iter_mut() {
                    self.analyse_stmt(stmt);
                }
            }
            ASTNode::WHILE { cond, block } => {
                let found = self.analyse_expr(cond);
                self.require_bool(found, "while condition");
                for stmt in block.iter_mut() {
                    self.analyse_stmt(stmt);
                }
            }
            ASTNode::DO_WHILE { block, cond } => {
                for stmt in block.iter_mut() {
                    self.analyse_stmt(stmt);
                }
                let found = self.analyse_expr(cond);
                self.require_bool(found, "do-while condition");
            }
            ASTNode::FOR { .. } => self.analyse_for(node),
            ASTNode::RETURN { expr } => {
                let found = match expr {
                    Some(expr) => self.analyse_expr(expr),
                    None => ValueType::Void,
                };

                let fun_id = self
                    .scopes
                    .scope(self.current_scope)
                    .parent_fun
                    .expect("return statement outside of a function");
                let (fun_name, ret_type) = {
                    let fun = self.scopes.symbol(fun_id);
                    (fun.name.clone(), fun.vtype)
                };

                if found != ret_type && found != ValueType::Null {
                    self.record(CompileError::TypeMismatch {
                        context: format!("return from function '{}'", fun_name),
                        expected: ret_type,
                        found,
                    });
                }
                self.had_return = true;
            }
            node => unreachable!("node {:?} is not a statement", node),
        }
    }

    fn analyse_for(&mut self, node: &mut ASTNode) {
        let ASTNode::FOR { var, start, stop, step, block, symbol } = node else {
            unreachable!("node {:?} is not a for loop", node);
        };

        // The sentinel ties the loop to its scope; the digit prefix of
        // its name cannot collide with user identifiers.
        let counter = self.scopes.scope(self.current_scope).for_loop_counter;
        let sentinel_name = format!("{}_{}", counter, var);
        let loop_scope = self.scopes.new_scope(self.current_scope, ScopeKind::ForLoop);
        let sentinel = Symbol::new_for_loop(&sentinel_name, loop_scope);
        *symbol = self.insert_or_record(self.current_scope, sentinel);
        self.scopes.scope_mut(self.current_scope).for_loop_counter += 1;

        // Induction variable, stop bound and step share the enclosing
        // function's frame.
        for name in [var.as_str(), "_cond", "_step"] {
            let offset = self.scopes.alloc_offset(loop_scope);
            let scalar = Symbol::new_scalar(name, ValueType::Int).with_offset(offset);
            self.insert_or_record(loop_scope, scalar);
        }

        // A missing step becomes a literal 1
        if step.is_none() {
            *step = Some(Box::new(ASTNode::LITERAL(Literal::INTEGER(1))));
        }

        let saved_scope = self.current_scope;
        self.current_scope = loop_scope;

        let found = self.analyse_expr(start);
        self.require_int(found, "loop start expression");
        let found = self.analyse_expr(stop);
        self.require_int(found, "loop stop expression");
        let found = self.analyse_expr(step.as_mut().expect("step was just defaulted"));
        self.require_int(found, "loop step expression");

        for stmt in block.iter_mut() {
            self.analyse_stmt(stmt);
        }

        self.current_scope = saved_scope;
    }

    fn analyse_expr(&mut self, node: &mut ASTNode) -> ValueType {
        match node {
            ASTNode::LITERAL(Literal::INTEGER(_)) => ValueType::Int,
            ASTNode::LITERAL(Literal::FLOAT(_)) => ValueType::Float,
            ASTNode::LITERAL(Literal::BOOL(_)) => ValueType::Bool,
            ASTNode::VAR { .. } => self.analyse_var_use(node, false),
            ASTNode::BIN_OP { op, left, right } => {
                let op = *op;
                let left_type = self.analyse_expr(left);
                let right_type = self.analyse_expr(right);
                self.analyse_bin_op(op, left_type, right_type, left, right)
            }
            ASTNode::MON_OP { op, expr } => {
                let op = *op;
                let found = self.analyse_expr(expr);
                self.analyse_mon_op(op, found)
            }
            ASTNode::CAST { target, expr } => {
                let target = *target;
                let found = self.analyse_expr(expr);
                self.analyse_cast(target, found)
            }
            ASTNode::FUN_CALL { .. } => self.analyse_fun_call(node),
            ASTNode::ARR_EXPR { .. } => {
                self.record(CompileError::ArrayShape(String::from(
                    "array literal can only be used as an initialiser",
                )));
                ValueType::Null
            }
            node => unreachable!("node {:?} is not an expression", node),
        }
    }

    /// Resolves a variable use or assignment target, decorates the node
    /// with the symbol, and checks indexing against the array shape.
    fn analyse_var_use(&mut self, node: &mut ASTNode, is_assignment_target: bool) -> ValueType {
        let (name, indices, symbol_slot) = match node {
            ASTNode::VAR { name, indices, symbol } => (name.clone(), indices, symbol),
            ASTNode::VAR_LET { name, indices, symbol } => (name.clone(), indices, symbol),
            node => unreachable!("node {:?} is not a variable use", node),
        };

        let Some(sym_id) = self.scopes.lookup(self.current_scope, &name) else {
            self.record(CompileError::UndeclaredSymbol(name));
            return ValueType::Null;
        };

        let (vtype, dim_count, is_variable) = {
            let symbol = self.scopes.symbol(sym_id);
            let dim_count = if symbol.is_array() { symbol.dim_count() } else { 0 };
            let is_variable = matches!(symbol.kind, SymbolKind::Scalar | SymbolKind::Array(_));
            (symbol.vtype, dim_count, is_variable)
        };

        if !is_variable {
            self.record(CompileError::InvalidType(format!("'{}' is not a variable", name)));
            return ValueType::Null;
        }

        *symbol_slot = Some(sym_id);

        if indices.is_empty() {
            if is_assignment_target && vtype.is_array() {
                self.record(CompileError::ArrayShape(format!(
                    "cannot assign to array '{}' without an index",
                    name
                )));
                return ValueType::Null;
            }
            // Naked use carries the array type
            return vtype;
        }

        let Some(element_type) = vtype.element_type() else {
            self.record(CompileError::ArrayShape(format!(
                "identifier '{}' was indexed, but is not an array",
                name
            )));
            return ValueType::Null;
        };

        if indices.len() != dim_count {
            self.record(CompileError::ArrayShape(format!(
                "expected {} array dimensions but got {}",
                dim_count,
                indices.len()
            )));
        }

        // The borrow on the node ends here so the index expressions can
        // be analysed through self again.
        let mut index_types = vec![];
        for index in indices.iter_mut() {
            index_types.push(self.analyse_expr(index));
        }
        for found in index_types {
            self.require_int(found, "array index");
        }

        element_type
    }

    fn analyse_var_let(&mut self, node: &mut ASTNode) -> ValueType {
        self.analyse_var_use(node, true)
    }

    fn analyse_bin_op(
        &mut self,
        op: BinaryOperation,
        left_type: ValueType,
        right_type: ValueType,
        left: &mut ASTNode,
        right: &mut ASTNode,
    ) -> ValueType {
        use BinaryOperation::*;

        if left_type == ValueType::Null || right_type == ValueType::Null {
            return ValueType::Null;
        }

        if matches!(op, AND | OR) {
            if left_type == ValueType::Bool && right_type == ValueType::Bool {
                return ValueType::Bool;
            }
            self.record(CompileError::TypeMismatch {
                context: format!("operand of '{}'", op.symbol()),
                expected: ValueType::Bool,
                found: if left_type != ValueType::Bool { left_type } else { right_type },
            });
            return ValueType::Null;
        }

        if left_type.is_arithmetic() && right_type.is_arithmetic() {
            // The result is float if either side is; the other side
            // receives an implicit cast node.
            let promoted = if left_type == ValueType::Float || right_type == ValueType::Float {
                ValueType::Float
            } else {
                ValueType::Int
            };
            if left_type != promoted {
                Self::insert_cast(left, SourceType::Float);
            }
            if right_type != promoted {
                Self::insert_cast(right, SourceType::Float);
            }

            if op == MOD && promoted == ValueType::Float {
                self.record(CompileError::InvalidOperator {
                    op: String::from(op.symbol()),
                    vtype: ValueType::Float,
                });
                return ValueType::Null;
            }

            return if op.is_comparison() { ValueType::Bool } else { promoted };
        }

        if left_type == ValueType::Bool && right_type == ValueType::Bool {
            // badd and bmul double as disjunction and conjunction
            return match op {
                EQUAL | NOT_EQUAL | ADD | MUL => ValueType::Bool,
                _ => {
                    self.record(CompileError::InvalidOperator {
                        op: String::from(op.symbol()),
                        vtype: ValueType::Bool,
                    });
                    ValueType::Null
                }
            };
        }

        self.record(CompileError::TypeMismatch {
            context: format!("operands of '{}'", op.symbol()),
            expected: left_type,
            found: right_type,
        });
        ValueType::Null
    }

    fn analyse_mon_op(&mut self, op: UnaryOperation, found: ValueType) -> ValueType {
        if found == ValueType::Null {
            return ValueType::Null;
        }

        match op {
            UnaryOperation::NEGATE if found.is_arithmetic() => found,
            UnaryOperation::NOT if found == ValueType::Bool => ValueType::Bool,
            _ => {
                self.record(CompileError::InvalidOperator {
                    op: String::from(op.symbol()),
                    vtype: found,
                });
                ValueType::Null
            }
        }
    }

    fn analyse_cast(&mut self, target: SourceType, found: ValueType) -> ValueType {
        if target == SourceType::Void {
            self.record(CompileError::InvalidCast(String::from("cannot cast to void")));
            return ValueType::Null;
        }

        let is_castable = matches!(found, ValueType::Int | ValueType::Float | ValueType::Bool);
        if !is_castable && found != ValueType::Null {
            self.record(CompileError::InvalidCast(format!(
                "can only cast from int, float or bool but got {}",
                found
            )));
        }

        target.to_value_type(false).expect("scalar cast target")
    }

    fn analyse_fun_call(&mut self, node: &mut ASTNode) -> ValueType {
        let ASTNode::FUN_CALL { name, args, symbol } = node else {
            unreachable!("node {:?} is not a function call", node);
        };
        let name = name.clone();

        let Some(sym_id) = self.scopes.lookup(self.current_scope, &name) else {
            self.record(CompileError::UndeclaredSymbol(name));
            return ValueType::Null;
        };
        if !self.scopes.symbol(sym_id).is_function() {
            self.record(CompileError::InvalidType(format!("'{}' is not a function", name)));
            return ValueType::Null;
        }
        *symbol = Some(sym_id);

        let (ret_type, param_types, param_dim_counts) = {
            let fun = self.scopes.symbol(sym_id).fun_data();
            (
                self.scopes.symbol(sym_id).vtype,
                fun.param_types.clone(),
                fun.param_dim_counts.clone(),
            )
        };

        // One frame per call keeps nested calls inside argument
        // expressions from mixing their slots.
        self.args.push();
        for arg in args.iter_mut() {
            let found = self.analyse_expr(arg);
            if found.is_array() {
                // A naked array contributes its dimensions before
                // itself; an indexed one was demoted to a scalar above.
                let dim_count = match arg {
                    ASTNode::VAR { symbol: Some(id), indices, .. } if indices.is_empty() => {
                        self.scopes.symbol(*id).dim_count()
                    }
                    _ => 0,
                };
                for _ in 0..dim_count {
                    self.args.add(ValueType::Int, 0);
                }
                self.args.add(found, dim_count);
            } else {
                self.args.add(found, 0);
            }
        }
        let pushed = self.args.pop();

        if pushed.len() != param_types.len() {
            self.record(CompileError::ArgumentCountMismatch {
                name,
                expected: param_types.len(),
                found: pushed.len(),
            });
            return ret_type;
        }

        for (i, arg) in pushed.iter().enumerate() {
            if arg.vtype == ValueType::Null {
                continue;
            }
            if arg.vtype != param_types[i] {
                self.record(CompileError::TypeMismatch {
                    context: format!("argument {} of call to '{}'", i + 1, name),
                    expected: param_types[i],
                    found: arg.vtype,
                });
                continue;
            }
            if arg.vtype.is_array() && arg.dim_count != param_dim_counts[i] {
                self.record(CompileError::ArrayShape(format!(
                    "argument has {} dimensions, but function parameter expects {}",
                    arg.dim_count, param_dim_counts[i]
                )));
            }
        }

        ret_type
    }
}

/// Shared helpers
impl TetraContextAnalyser {
    fn record(&mut self, error: CompileError) {
        debug!("analysis error: {}", error);
        self.errors.push(error);
    }

    fn insert_or_record(&mut self, scope: ScopeId, symbol: Symbol) -> Option<SymbolId> {
        match self.scopes.insert(scope, symbol) {
            Ok(id) => Some(id),
            Err(error) => {
                self.record(error);
                None
            }
        }
    }

    fn require_int(&mut self, found: ValueType, context: &str) {
        if found != ValueType::Int && found != ValueType::Null {
            self.record(CompileError::TypeMismatch {
                context: String::from(context),
                expected: ValueType::Int,
                found,
            });
        }
    }

    fn require_bool(&mut self, found: ValueType, context: &str) {
        if found != ValueType::Bool && found != ValueType::Null {
            self.record(CompileError::TypeMismatch {
                context: String::from(context),
                expected: ValueType::Bool,
                found,
            });
        }
    }

    /// Makes the conversion explicit when the found type does not match
    /// the expected one; arithmetic pairs get a cast node, everything
    /// else is an error.
    fn coerce(&mut self, node: &mut ASTNode, found: ValueType, expected: ValueType, context: &str) {
        if found == expected || found == ValueType::Null {
            return;
        }
        if found.is_arithmetic() && expected.is_arithmetic() {
            Self::insert_cast(node, Self::scalar_source_type(expected));
            return;
        }
        self.record(CompileError::TypeMismatch {
            context: String::from(context),
            expected,
            found,
        });
    }

    /// Wraps an expression node in a freshly built cast node.
    fn insert_cast(node: &mut ASTNode, target: SourceType) {
        let inner = mem::replace(node, ASTNode::LITERAL(Literal::BOOL(false)));
        *node = ASTNode::CAST {
            target,
            expr: Box::new(inner),
        };
    }

    fn scalar_source_type(vtype: ValueType) -> SourceType {
        match vtype {
            ValueType::Int => SourceType::Int,
            ValueType::Float => SourceType::Float,
            ValueType::Bool => SourceType::Bool,
            vtype => unreachable!("no source spelling for {}", vtype),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::test_support::*;

    fn analyse(tree: &mut AbstractSyntaxTree) -> Result<Analysis, CompileErrors> {
        <TetraContextAnalyser as ContextAnalyser>::default().analyse(tree)
    }

    fn analyse_ok(tree: &mut AbstractSyntaxTree) -> Analysis {
        analyse(tree).expect("analysis should succeed")
    }

    fn errors_of(tree: &mut AbstractSyntaxTree) -> Vec<CompileError> {
        analyse(tree).expect_err("analysis should fail").0
    }

    #[test]
    fn duplicate_globals_are_reported() {
        let mut tree = program(vec![
            glob_def_scalar("x", SourceType::Int, Some(int_lit(1))),
            glob_def_scalar("x", SourceType::Float, Some(float_lit(1.5))),
        ]);
        let errors = errors_of(&mut tree);
        assert!(matches!(errors[0], CompileError::DuplicateSymbol(ref n) if n == "x"));
    }

    #[test]
    fn undeclared_variables_are_reported_but_analysis_continues() {
        let mut tree = program(vec![void_main(vec![
            assign(var_let("y"), int_lit(1)),
            assign(var_let("z"), int_lit(2)),
            ret(None),
        ])]);
        let errors = errors_of(&mut tree);
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[1], CompileError::UndeclaredSymbol(ref n) if n == "z"));
    }

    #[test]
    fn mixed_arithmetic_inserts_a_cast_on_the_int_side() {
        // float y = x + 1.5; with int x
        let mut tree = program(vec![
            glob_def_scalar("x", SourceType::Int, Some(int_lit(3))),
            glob_def_scalar(
                "y",
                SourceType::Float,
                Some(bin_op(BinaryOperation::ADD, var("x"), float_lit(1.5))),
            ),
        ]);
        analyse_ok(&mut tree);

        let ASTNode::PROGRAM { decls } = tree.root() else { panic!() };
        let ASTNode::GLOB_DEF { init: Some(init), .. } = &decls[1] else { panic!() };
        let ASTNode::BIN_OP { left, .. } = init.as_ref() else { panic!() };
        assert!(
            matches!(left.as_ref(), ASTNode::CAST { target: SourceType::Float, .. }),
            "expected implicit cast around the int operand, got {:?}",
            left
        );
    }

    #[test]
    fn assignment_narrowing_casts_toward_the_target() {
        // int x; x = 1.5; narrows without a warning
        let mut tree = program(vec![void_main_with_decls(
            vec![var_decl_scalar("x", SourceType::Int, None)],
            vec![assign(var_let("x"), float_lit(1.5)), ret(None)],
        )]);
        analyse_ok(&mut tree);

        let stmt = first_main_stmt(&tree);
        let ASTNode::ASSIGN { expr, .. } = stmt else { panic!() };
        assert!(matches!(expr.as_ref(), ASTNode::CAST { target: SourceType::Int, .. }));
    }

    #[test]
    fn modulo_on_floats_is_rejected() {
        let mut tree = program(vec![glob_def_scalar(
            "x",
            SourceType::Float,
            Some(bin_op(BinaryOperation::MOD, float_lit(4.0), float_lit(2.0))),
        )]);
        let errors = errors_of(&mut tree);
        assert!(matches!(errors[0], CompileError::InvalidOperator { .. }));
    }

    #[test]
    fn non_void_functions_require_a_return_statement() {
        let mut tree = program(vec![fun_def(
            "f",
            SourceType::Int,
            vec![],
            Some(fun_body(vec![], vec![], vec![])),
            false,
        )]);
        let errors = errors_of(&mut tree);
        assert!(matches!(errors[0], CompileError::MissingReturn(ref n) if n == "f"));
    }

    #[test]
    fn return_type_must_match_the_function() {
        let mut tree = program(vec![fun_def(
            "f",
            SourceType::Int,
            vec![],
            Some(fun_body(vec![], vec![], vec![ret(Some(bool_lit(true)))])),
            false,
        )]);
        let errors = errors_of(&mut tree);
        assert!(matches!(errors[0], CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn call_arity_counts_array_dimension_slots() {
        // int sum(int[n] a) expects two slots; sum(xs) supplies them
        let mut tree = program(vec![
            fun_def(
                "sum",
                SourceType::Int,
                vec![param_array("a", SourceType::Int, vec!["n"])],
                Some(fun_body(vec![], vec![], vec![ret(Some(int_lit(0)))])),
                false,
            ),
            void_main_with_decls(
                vec![var_decl_array("xs", SourceType::Int, vec![int_lit(4)], None)],
                vec![expr_stmt(fun_call("sum", vec![var("xs")])), ret(None)],
            ),
        ]);
        let analysis = analyse_ok(&mut tree);

        let sum = analysis
            .scopes
            .lookup(analysis.global_scope, "sum")
            .expect("sum should be declared");
        assert_eq!(analysis.scopes.symbol(sum).param_count(), 2);
    }

    #[test]
    fn call_arity_mismatch_is_reported() {
        let mut tree = program(vec![
            fun_def(
                "f",
                SourceType::Void,
                vec![param_scalar("x", SourceType::Int)],
                Some(fun_body(vec![], vec![], vec![])),
                false,
            ),
            void_main(vec![expr_stmt(fun_call("f", vec![])), ret(None)]),
        ]);
        let errors = errors_of(&mut tree);
        assert!(matches!(
            errors[0],
            CompileError::ArgumentCountMismatch { expected: 1, found: 0, .. }
        ));
    }

    #[test]
    fn shadowed_uses_resolve_to_the_innermost_symbol() {
        // global int x; main declares its own x; the use inside main
        // must resolve to the local, the global init to the global.
        let mut tree = program(vec![
            glob_def_scalar("x", SourceType::Int, Some(int_lit(1))),
            void_main_with_decls(
                vec![var_decl_scalar("x", SourceType::Int, Some(int_lit(2)))],
                vec![assign(var_let("x"), int_lit(3)), ret(None)],
            ),
        ]);
        let analysis = analyse_ok(&mut tree);

        let global_x = analysis.scopes.lookup(analysis.global_scope, "x").unwrap();
        let stmt = first_main_stmt(&tree);
        let ASTNode::ASSIGN { var_let, .. } = stmt else { panic!() };
        let ASTNode::VAR_LET { symbol: Some(local_x), .. } = var_let.as_ref() else { panic!() };
        assert_ne!(*local_x, global_x);
        assert_eq!(analysis.scopes.symbol(*local_x).offset, 0);
    }

    #[test]
    fn for_loop_variables_share_the_function_frame() {
        let mut tree = program(vec![void_main(vec![
            for_loop("i", int_lit(0), int_lit(10), None, vec![]),
            ret(None),
        ])]);
        let analysis = analyse_ok(&mut tree);

        let main = analysis.scopes.lookup(analysis.global_scope, "main").unwrap();
        let main_scope = analysis.scopes.symbol(main).fun_data().scope;
        // induction, _cond and _step all live on main's frame
        assert_eq!(analysis.scopes.scope(main_scope).local_offset_counter, 3);

        let sentinel = analysis.scopes.lookup_local(main_scope, "0_i").unwrap();
        let loop_scope = analysis.scopes.symbol(sentinel).for_loop_data().scope;
        assert_eq!(
            analysis.scopes.scope(loop_scope).nesting_level,
            analysis.scopes.scope(main_scope).nesting_level
        );
        assert!(analysis.scopes.lookup_local(loop_scope, "_step").is_some());
    }

    #[test]
    fn missing_for_step_defaults_to_literal_one() {
        let mut tree = program(vec![void_main(vec![
            for_loop("i", int_lit(0), int_lit(3), None, vec![]),
            ret(None),
        ])]);
        analyse_ok(&mut tree);

        let stmt = first_main_stmt(&tree);
        let ASTNode::FOR { step: Some(step), .. } = stmt else { panic!() };
        assert_eq!(step.as_ref(), &ASTNode::LITERAL(Literal::INTEGER(1)));
    }

    #[test]
    fn nested_function_labels_chain_enclosing_names() {
        let mut tree = program(vec![fun_def(
            "h",
            SourceType::Void,
            vec![],
            Some(fun_body(
                vec![],
                vec![fun_def(
                    "g",
                    SourceType::Void,
                    vec![],
                    Some(fun_body(vec![], vec![], vec![])),
                    false,
                )],
                vec![],
            )),
            false,
        )]);
        let analysis = analyse_ok(&mut tree);

        let h = analysis.scopes.lookup(analysis.global_scope, "h").unwrap();
        let h_scope = analysis.scopes.symbol(h).fun_data().scope;
        let g = analysis.scopes.lookup_local(h_scope, "g").unwrap();
        assert_eq!(analysis.scopes.symbol(g).fun_data().label, "_h_g");
        assert_eq!(analysis.scopes.symbol(h).fun_data().label, "h");
    }

    #[test]
    fn globals_with_initialisers_require_the_init_function() {
        let mut with_global = program(vec![glob_def_scalar("x", SourceType::Int, Some(int_lit(1)))]);
        assert!(analyse_ok(&mut with_global).requires_init);

        let mut without_global = program(vec![void_main(vec![ret(None)])]);
        assert!(!analyse_ok(&mut without_global).requires_init);
    }

    #[test]
    fn analysis_is_deterministic_across_fresh_runs() {
        let build = || {
            program(vec![
                glob_def_scalar("x", SourceType::Int, Some(int_lit(3))),
                void_main_with_decls(
                    vec![var_decl_scalar("y", SourceType::Float, Some(var("x")))],
                    vec![assign(var_let("y"), float_lit(2.5)), ret(None)],
                ),
            ])
        };

        let mut first = build();
        let mut second = build();
        let first_analysis = analyse_ok(&mut first);
        let second_analysis = analyse_ok(&mut second);

        assert_eq!(first, second, "decorated trees must match");
        assert_eq!(first_analysis.scopes, second_analysis.scopes, "scope trees must match");
    }
}
