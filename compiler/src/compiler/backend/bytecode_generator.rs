use log::debug;

use tetra_common::{Assembly, Opcode, ValueType};

use super::super::analysis::Analysis;
use super::super::ast::{
    ASTNode, AbstractSyntaxTree, BinaryOperation, Literal, SourceType, UnaryOperation,
};
use super::super::symbol::{ScopeId, ScopeTree, SymbolId};
use super::BackEndGenerator;

/// How a variable is reached from the current scope, driving opcode
/// selection for every load and store.
#[derive(Debug, Clone, Copy, PartialEq)]
enum AddrMode {
    /// Resolved against the import table
    Imported,
    /// Lives in the global frame
    Global,
    /// Lives in the current frame
    Local,
    /// Local of an enclosing function, reached through a frame delta
    Free(usize),
}

/// TetraBytecodeGenerator is a concrete BackEndGenerator. It lowers the
/// decorated tree into typed stack instructions, reading the scope tree
/// that context analysis produced.
///
/// Instructions emitted while the global scope is active belong to the
/// program's initialisation code and are routed to the init queue; the
/// queue becomes the body of the exported `__init` function when the
/// program is sealed.
pub struct TetraBytecodeGenerator {
    asm: Assembly,
    scopes: ScopeTree,
    current_scope: ScopeId,
    requires_init: bool,

    /// Monotonic counter behind globally unique label names
    label_count: usize,

    /// Whether the body currently being emitted issued a return
    had_return: bool,
}

impl BackEndGenerator for TetraBytecodeGenerator {
    /// Creates a default configuration of TetraBytecodeGenerator
    fn default() -> Self {
        let scopes = ScopeTree::new();
        let current_scope = scopes.global_scope();
        Self {
            asm: Assembly::new(),
            scopes,
            current_scope,
            requires_init: false,
            label_count: 0,
            had_return: false,
        }
    }

    /// Generates Assembly from an analysed AbstractSyntaxTree
    fn generate(mut self, tree: &AbstractSyntaxTree, analysis: Analysis) -> Assembly {
        self.scopes = analysis.scopes;
        self.current_scope = analysis.global_scope;
        self.requires_init = analysis.requires_init;

        debug!("bytecode generation started");

        match tree.root() {
            ASTNode::PROGRAM { decls } => {
                // The init export always takes index zero when present
                if self.requires_init {
                    self.asm.emit_fun_export("__init", ValueType::Void, vec![], "__init");
                }

                // Tables first: a body may call an import declared
                // further down the file, and jsre needs its index.
                for decl in decls {
                    self.register_decl(decl);
                }

                for decl in decls {
                    self.generate_decl(decl);
                }
            }
            node => unreachable!("program root must be a PROGRAM node, got {:?}", node),
        }

        if self.requires_init {
            self.asm.seal_init_function("__init");
        }

        debug!("bytecode generation finished");
        self.asm
    }
}

/// Table registration
impl TetraBytecodeGenerator {
    fn register_decl(&mut self, node: &ASTNode) {
        match node {
            ASTNode::GLOB_DECL { name, .. } => {
                let sym_id = self.lookup_here(name);
                let symbol = self.scopes.symbol(sym_id);
                let dim_imports: Vec<String> = if symbol.is_array() {
                    symbol
                        .array_data()
                        .dims
                        .iter()
                        .map(|dim| self.scopes.symbol(*dim).name.clone())
                        .collect()
                } else {
                    vec![]
                };
                let vtype = symbol.vtype;

                for dim_name in dim_imports {
                    self.asm.emit_var_import(&dim_name, ValueType::Int);
                }
                self.asm.emit_var_import(name, vtype);
            }
            ASTNode::FUN_DEF { name, body, exported, .. } => {
                let sym_id = self.lookup_here(name);
                let symbol = self.scopes.symbol(sym_id);
                let fun = symbol.fun_data();
                let (ret_type, arg_types, label) =
                    (symbol.vtype, fun.param_types.clone(), fun.label.clone());

                if body.is_none() {
                    self.asm.emit_fun_import(name, ret_type, arg_types);
                } else if *exported {
                    self.asm.emit_fun_export(name, ret_type, arg_types, &label);
                }
            }
            ASTNode::GLOB_DEF { name, init, exported, .. } => {
                let sym_id = self.lookup_here(name);
                let symbol = self.scopes.symbol(sym_id);
                let dims: Vec<(String, usize)> = if symbol.is_array() {
                    symbol
                        .array_data()
                        .dims
                        .iter()
                        .map(|dim| {
                            let dim = self.scopes.symbol(*dim);
                            (dim.name.clone(), dim.offset)
                        })
                        .collect()
                } else {
                    vec![]
                };
                let (vtype, offset, is_array) = (symbol.vtype, symbol.offset, symbol.is_array());

                for _ in 0..dims.len() {
                    self.asm.emit_glob_var(ValueType::Int);
                }
                self.asm.emit_glob_var(vtype);

                // The broadcast helpers of a scalar-initialised array
                // occupy global slots of their own, directly after the
                // array.
                let scalar_init =
                    matches!(init.as_deref(), Some(e) if !matches!(e, ASTNode::ARR_EXPR { .. }));
                if is_array && scalar_init {
                    for prefix in ["_scalar_", "_counter_", "_size_"] {
                        let helper = self
                            .scopes
                            .lookup_local(self.current_scope, &format!("{}{}", prefix, name))
                            .expect("broadcast helper was not reserved during analysis");
                        self.asm.emit_glob_var(self.scopes.symbol(helper).vtype);
                    }
                }

                if *exported {
                    for (dim_name, dim_offset) in &dims {
                        self.asm.emit_var_export(dim_name, *dim_offset);
                    }
                    self.asm.emit_var_export(name, offset);
                }
            }
            node => unreachable!("node {:?} is not a top-level declaration", node),
        }
    }
}

/// Declaration and statement lowering
impl TetraBytecodeGenerator {
    fn generate_decl(&mut self, node: &ASTNode) {
        match node {
            ASTNode::GLOB_DECL { .. } => {
                // Imports carry no code
            }
            ASTNode::GLOB_DEF { name, dims, init, .. } => {
                self.generate_variable_decl(name, dims, init);
            }
            ASTNode::VAR_DECL { name, dims, init, .. } => {
                self.generate_variable_decl(name, dims, init);
            }
            ASTNode::FUN_DEF { .. } => self.generate_fun_def(node),
            node => unreachable!("node {:?} is not a declaration", node),
        }
    }

    /// Lowers a variable declaration: arrays store their dimensions and
    /// allocate before the initialiser runs; the initialiser is either
    /// a flattened literal, a broadcast scalar, or a plain store.
    fn generate_variable_decl(&mut self, name: &str, dims: &[ASTNode], init: &Option<Box<ASTNode>>) {
        let sym_id = self.lookup_here(name);

        if self.scopes.symbol(sym_id).is_array() {
            self.fill_array_dims(sym_id, dims);
            self.create_array_with_size(sym_id);

            match init.as_deref() {
                None => {}
                Some(node @ ASTNode::ARR_EXPR { .. }) => {
                    self.emit_arr_expr(node);
                    let count = Self::count_arr_expr(node);
                    self.init_array_with_arr_expr(sym_id, count);
                }
                Some(node) => {
                    let scalar_type = self.emit_expr(node);
                    self.init_array_with_scalar(sym_id, scalar_type);
                }
            }
        } else if let Some(node) = init.as_deref() {
            self.emit_expr(node);
            self.emit_store_sym(sym_id);
        }
    }

    fn generate_fun_def(&mut self, node: &ASTNode) {
        let ASTNode::FUN_DEF { name, body, .. } = node else {
            unreachable!("node {:?} is not a function definition", node);
        };
        let Some(body) = body else {
            // Imported functions have no body to emit
            return;
        };

        let fun_id = self.lookup_here(name);
        let fun_scope = self.scopes.symbol(fun_id).fun_data().scope;

        let saved_scope = self.current_scope;
        self.current_scope = fun_scope;
        self.generate_fun_body(fun_id, body);
        self.current_scope = saved_scope;
    }

    fn generate_fun_body(&mut self, fun_id: SymbolId, body: &ASTNode) {
        let ASTNode::FUN_BODY { decls, local_fun_defs, stmts } = body else {
            unreachable!("node {:?} is not a function body", body);
        };

        // Nested definitions are emitted first so function bodies do
        // not interleave in the instruction stream.
        for fun in local_fun_defs {
            self.generate_fun_def(fun);
        }

        self.had_return = false;

        let (label, param_count, ret_type) = {
            let symbol = self.scopes.symbol(fun_id);
            (symbol.fun_data().label.clone(), symbol.param_count(), symbol.vtype)
        };

        self.asm.emit_label(&label, true);

        // Reserve frame slots for locals beyond the parameters
        let local_count = self.scopes.scope(self.current_scope).local_offset_counter;
        if local_count > param_count {
            self.instr(Opcode::ESR, vec![(local_count - param_count).to_string()]);
        }

        for decl in decls {
            self.generate_decl(decl);
        }
        for stmt in stmts {
            self.emit_stmt(stmt);
        }

        // Fall-through return for void functions without an explicit one
        if ret_type == ValueType::Void && !self.had_return {
            self.instr(Opcode::RETURN, vec![]);
        }
    }

    fn emit_stmt(&mut self, node: &ASTNode) {
        match node {
            ASTNode::ASSIGN { var_let, expr } => {
                // The value must be on the stack before the target runs
                self.emit_expr(expr);
                self.emit_var_let(var_let);
            }
            ASTNode::EXPR_STMT { expr } => {
                let found = self.emit_expr(expr);
                match found {
                    ValueType::Int => self.instr(Opcode::IPOP, vec![]),
                    ValueType::Float => self.instr(Opcode::FPOP, vec![]),
                    ValueType::Bool => self.instr(Opcode::BPOP, vec![]),
                    // Void calls leave nothing to discard
                    ValueType::Void => {}
                    found => unreachable!("expression statement of type {}", found),
                }
            }
            ASTNode::RETURN { expr } => {
                if let Some(expr) = expr {
                    self.emit_expr(expr);
                }

                let fun_id = self
                    .scopes
                    .scope(self.current_scope)
                    .parent_fun
                    .expect("return statement outside of a function");
                let op = match self.scopes.symbol(fun_id).vtype {
                    ValueType::Int => Opcode::IRETURN,
                    ValueType::Float => Opcode::FRETURN,
                    ValueType::Bool => Opcode::BRETURN,
                    ValueType::Void => Opcode::RETURN,
                    vtype => unreachable!("function returning {}", vtype),
                };
                self.instr(op, vec![]);
                self.had_return = true;
            }
            ASTNode::IF_ELSE { cond, then_block, else_block } => {
                let else_label = self.new_label("else");
                let end_label = self.new_label("end");

                self.emit_expr(cond);
                self.instr(Opcode::BRANCH_F, vec![else_label.clone()]);

                for stmt in then_block {
                    self.emit_stmt(stmt);
                }
                self.instr(Opcode::JUMP, vec![end_label.clone()]);

                self.label(&else_label);
                for stmt in else_block {
                    self.emit_stmt(stmt);
                }
                self.label(&end_label);
            }
            ASTNode::WHILE { cond, block } => {
                let start_label = self.new_label("while_loop_start");
                let end_label = self.new_label("while_loop_end");

                self.label(&start_label);
                self.emit_expr(cond);
                self.instr(Opcode::BRANCH_F, vec![end_label.clone()]);

                for stmt in block {
                    self.emit_stmt(stmt);
                }
                self.instr(Opcode::JUMP, vec![start_label.clone()]);

                self.label(&end_label);
            }
            ASTNode::DO_WHILE { block, cond } => {
                let start_label = self.new_label("while_loop_start");

                self.label(&start_label);
                for stmt in block {
                    self.emit_stmt(stmt);
                }
                self.emit_expr(cond);
                self.instr(Opcode::BRANCH_T, vec![start_label.clone()]);
            }
            ASTNode::FOR { .. } => self.emit_for(node),
            node => unreachable!("node {:?} is not a statement", node),
        }
    }

    /// Lowers a counted loop. The sign of the step is only known at
    /// runtime, so the condition dispatches between an i< and an i>
    /// comparison; both paths feed the shared exit branch.
    fn emit_for(&mut self, node: &ASTNode) {
        let ASTNode::FOR { var, start, stop, step, block, symbol } = node else {
            unreachable!("node {:?} is not a for loop", node);
        };
        let step = step.as_ref().expect("analysis defaults a missing step");

        let sentinel = symbol.expect("for loop missing its sentinel decoration");
        let loop_scope = self.scopes.symbol(sentinel).for_loop_data().scope;

        let saved_scope = self.current_scope;
        self.current_scope = loop_scope;

        let induction_offset = self.loop_var_offset(loop_scope, var).to_string();
        let cond_offset = self.loop_var_offset(loop_scope, "_cond").to_string();
        let step_offset = self.loop_var_offset(loop_scope, "_step").to_string();

        // Place the loop bounds in their reserved slots
        self.emit_expr(start);
        self.instr(Opcode::ISTORE, vec![induction_offset.clone()]);
        self.emit_expr(stop);
        self.instr(Opcode::ISTORE, vec![cond_offset.clone()]);
        self.emit_expr(step);
        self.instr(Opcode::ISTORE, vec![step_offset.clone()]);

        let start_label = self.new_label("for_loop_start");
        let positive_label = self.new_label("positive_step_size");
        let negative_label = self.new_label("negative_step_size");
        let common_label = self.new_label("common_cond_check");
        let end_label = self.new_label("for_loop_end");

        self.label(&start_label);

        // Sign check on the step
        self.instr(Opcode::ILOAD, vec![step_offset.clone()]);
        self.instr(Opcode::ILOADC_0, vec![]);
        self.instr(Opcode::IGE, vec![]);
        self.instr(Opcode::BRANCH_T, vec![positive_label.clone()]);
        self.instr(Opcode::JUMP, vec![negative_label.clone()]);

        // Upward loop
        self.label(&positive_label);
        self.instr(Opcode::ILOAD, vec![induction_offset.clone()]);
        self.instr(Opcode::ILOAD, vec![cond_offset.clone()]);
        self.instr(Opcode::ILT, vec![]);
        self.instr(Opcode::JUMP, vec![common_label.clone()]);

        // Downward loop
        self.label(&negative_label);
        self.instr(Opcode::ILOAD, vec![induction_offset.clone()]);
        self.instr(Opcode::ILOAD, vec![cond_offset]);
        self.instr(Opcode::IGT, vec![]);

        // Both sign paths exit here when the bound is crossed
        self.label(&common_label);
        self.instr(Opcode::BRANCH_F, vec![end_label.clone()]);

        for stmt in block {
            self.emit_stmt(stmt);
        }

        // Advance the induction variable by the (re-evaluated) step
        self.emit_expr(step);
        self.instr(Opcode::ILOAD, vec![induction_offset.clone()]);
        self.instr(Opcode::IADD, vec![]);
        self.instr(Opcode::ISTORE, vec![induction_offset]);

        self.instr(Opcode::JUMP, vec![start_label.clone()]);
        self.label(&end_label);

        self.current_scope = saved_scope;
    }

    fn loop_var_offset(&self, loop_scope: ScopeId, name: &str) -> usize {
        let sym_id = self
            .scopes
            .lookup_local(loop_scope, name)
            .expect("loop scope is missing a reserved variable");
        self.scopes.symbol(sym_id).offset
    }
}

/// Expression lowering
impl TetraBytecodeGenerator {
    fn emit_expr(&mut self, node: &ASTNode) -> ValueType {
        match node {
            ASTNode::LITERAL(Literal::INTEGER(value)) => {
                self.emit_int_constant(*value);
                ValueType::Int
            }
            ASTNode::LITERAL(Literal::FLOAT(value)) => {
                self.emit_float_constant(*value);
                ValueType::Float
            }
            ASTNode::LITERAL(Literal::BOOL(value)) => {
                let op = if *value { Opcode::BLOADC_T } else { Opcode::BLOADC_F };
                self.instr(op, vec![]);
                ValueType::Bool
            }
            ASTNode::VAR { indices, symbol, .. } => {
                let sym_id = symbol.expect("variable use missing its symbol decoration");
                self.emit_var_load(sym_id, indices)
            }
            ASTNode::BIN_OP { op, left, right } => self.emit_bin_op(*op, left, right),
            ASTNode::MON_OP { op, expr } => {
                let found = self.emit_expr(expr);
                let opcode = match (op, found) {
                    (UnaryOperation::NEGATE, ValueType::Int) => Opcode::INEG,
                    (UnaryOperation::NEGATE, ValueType::Float) => Opcode::FNEG,
                    (UnaryOperation::NOT, ValueType::Bool) => Opcode::BNOT,
                    (op, found) => unreachable!("operator {} on {}", op.symbol(), found),
                };
                self.instr(opcode, vec![]);
                found
            }
            ASTNode::CAST { target, expr } => {
                let found = self.emit_expr(expr);
                let target = match target {
                    SourceType::Int => ValueType::Int,
                    SourceType::Float => ValueType::Float,
                    SourceType::Bool => ValueType::Bool,
                    SourceType::Void => unreachable!("cast to void survived analysis"),
                };
                self.emit_cast(found, target);
                target
            }
            ASTNode::FUN_CALL { .. } => self.emit_fun_call(node),
            node => unreachable!("node {:?} is not an expression", node),
        }
    }

    fn emit_var_load(&mut self, sym_id: SymbolId, indices: &[ASTNode]) -> ValueType {
        let vtype = self.scopes.symbol(sym_id).vtype;

        if let Some(element_type) = vtype.element_type() {
            if indices.is_empty() {
                // Naked use: sizes travel with the reference
                self.push_array_with_dims(sym_id);
                return vtype;
            }

            self.flatten_index_exprs(sym_id, indices);
            self.emit_load_sym(sym_id, false);
            let op = match element_type {
                ValueType::Int => Opcode::ILOADA,
                ValueType::Float => Opcode::FLOADA,
                ValueType::Bool => Opcode::BLOADA,
                element => unreachable!("array of {}", element),
            };
            self.instr(op, vec![]);
            return element_type;
        }

        self.emit_load_sym(sym_id, true);
        vtype
    }

    fn emit_var_let(&mut self, node: &ASTNode) {
        let ASTNode::VAR_LET { indices, symbol, .. } = node else {
            unreachable!("node {:?} is not an assignment target", node);
        };
        let sym_id = symbol.expect("assignment target missing its symbol decoration");
        let vtype = self.scopes.symbol(sym_id).vtype;

        if let Some(element_type) = vtype.element_type() {
            // The value is on the stack; add flat index and reference
            self.flatten_index_exprs(sym_id, indices);
            self.emit_load_sym(sym_id, false);
            self.instr(Self::elem_store_op(element_type), vec![]);
            return;
        }

        self.emit_store_sym(sym_id);
    }

    fn emit_bin_op(&mut self, op: BinaryOperation, left: &ASTNode, right: &ASTNode) -> ValueType {
        use BinaryOperation::*;

        // && and || evaluate the right operand only when needed
        if op == AND {
            let else_label = self.new_label("else");
            let end_label = self.new_label("end");

            self.emit_expr(left);
            self.instr(Opcode::BRANCH_F, vec![else_label.clone()]);
            self.emit_expr(right);
            self.instr(Opcode::JUMP, vec![end_label.clone()]);
            self.label(&else_label);
            self.instr(Opcode::BLOADC_F, vec![]);
            self.label(&end_label);

            return ValueType::Bool;
        }
        if op == OR {
            let else_label = self.new_label("else");
            let end_label = self.new_label("end");

            self.emit_expr(left);
            self.instr(Opcode::BRANCH_T, vec![else_label.clone()]);
            self.emit_expr(right);
            self.instr(Opcode::JUMP, vec![end_label.clone()]);
            self.label(&else_label);
            self.instr(Opcode::BLOADC_T, vec![]);
            self.label(&end_label);

            return ValueType::Bool;
        }

        let left_type = self.emit_expr(left);
        let right_type = self.emit_expr(right);
        debug_assert_eq!(left_type, right_type, "operand types diverged after analysis");

        let opcode = match (op, left_type) {
            (ADD, ValueType::Int) => Opcode::IADD,
            (ADD, ValueType::Float) => Opcode::FADD,
            (ADD, ValueType::Bool) => Opcode::BADD,
            (SUB, ValueType::Int) => Opcode::ISUB,
            (SUB, ValueType::Float) => Opcode::FSUB,
            (MUL, ValueType::Int) => Opcode::IMUL,
            (MUL, ValueType::Float) => Opcode::FMUL,
            (MUL, ValueType::Bool) => Opcode::BMUL,
            (DIV, ValueType::Int) => Opcode::IDIV,
            (DIV, ValueType::Float) => Opcode::FDIV,
            (MOD, ValueType::Int) => Opcode::IREM,
            (EQUAL, ValueType::Int) => Opcode::IEQ,
            (EQUAL, ValueType::Float) => Opcode::FEQ,
            (EQUAL, ValueType::Bool) => Opcode::BEQ,
            (NOT_EQUAL, ValueType::Int) => Opcode::INE,
            (NOT_EQUAL, ValueType::Float) => Opcode::FNE,
            (NOT_EQUAL, ValueType::Bool) => Opcode::BNE,
            (LESS_THAN, ValueType::Int) => Opcode::ILT,
            (LESS_THAN, ValueType::Float) => Opcode::FLT,
            (LESS_EQUAL, ValueType::Int) => Opcode::ILE,
            (LESS_EQUAL, ValueType::Float) => Opcode::FLE,
            (GREATER_THAN, ValueType::Int) => Opcode::IGT,
            (GREATER_THAN, ValueType::Float) => Opcode::FGT,
            (GREATER_EQUAL, ValueType::Int) => Opcode::IGE,
            (GREATER_EQUAL, ValueType::Float) => Opcode::FGE,
            (op, vtype) => unreachable!("operator {} on {}", op.symbol(), vtype),
        };
        self.instr(opcode, vec![]);

        if op.is_comparison() {
            ValueType::Bool
        } else {
            left_type
        }
    }

    /// Lowers a cast. Numeric casts are single opcodes; casts touching
    /// booleans become a branch on the operand that loads the matching
    /// constant on either path.
    fn emit_cast(&mut self, from: ValueType, to: ValueType) {
        match (from, to) {
            (ValueType::Int, ValueType::Float) => self.instr(Opcode::I2F, vec![]),
            (ValueType::Float, ValueType::Int) => self.instr(Opcode::F2I, vec![]),
            (ValueType::Int, ValueType::Bool) => {
                self.instr(Opcode::ILOADC_0, vec![]);
                self.instr(Opcode::INE, vec![]);
                self.emit_branchy_select(Opcode::BLOADC_T, Opcode::BLOADC_F);
            }
            (ValueType::Bool, ValueType::Int) => {
                self.emit_branchy_select(Opcode::ILOADC_1, Opcode::ILOADC_0);
            }
            (ValueType::Float, ValueType::Bool) => {
                self.instr(Opcode::FLOADC_0, vec![]);
                self.instr(Opcode::FNE, vec![]);
                self.emit_branchy_select(Opcode::BLOADC_T, Opcode::BLOADC_F);
            }
            (ValueType::Bool, ValueType::Float) => {
                self.emit_branchy_select(Opcode::FLOADC_1, Opcode::FLOADC_0);
            }
            (from, to) if from == to => {
                // Explicit cast to the same type is a no-op
            }
            (from, to) => unreachable!("cast from {} to {} survived analysis", from, to),
        }
    }

    /// Consumes the boolean on top of the stack and loads one of two
    /// constants through a pair of fresh labels.
    fn emit_branchy_select(&mut self, then_op: Opcode, else_op: Opcode) {
        let else_label = self.new_label("else");
        let end_label = self.new_label("end");

        self.instr(Opcode::BRANCH_F, vec![else_label.clone()]);
        self.instr(then_op, vec![]);
        self.instr(Opcode::JUMP, vec![end_label.clone()]);
        self.label(&else_label);
        self.instr(else_op, vec![]);
        self.label(&end_label);
    }

    fn emit_fun_call(&mut self, node: &ASTNode) -> ValueType {
        let ASTNode::FUN_CALL { name, args, symbol } = node else {
            unreachable!("node {:?} is not a function call", node);
        };
        let callee = symbol.expect("call missing its symbol decoration");

        // Linkage depends on where the callee is defined relative to
        // the scope the current function is defined in.
        let current_level = match self.scopes.scope(self.current_scope).parent_fun {
            Some(fun_id) => self.scopes.home_level(fun_id),
            None => 0,
        };
        let fun_level = self.scopes.home_level(callee);

        if fun_level == 0 {
            self.instr(Opcode::ISRG, vec![]);
        } else if fun_level == current_level + 1 {
            // Defined inside the current function
            self.instr(Opcode::ISRL, vec![]);
        } else if fun_level == current_level {
            // Sibling defined in the same scope
            self.instr(Opcode::ISR, vec![]);
        } else {
            debug_assert!(current_level > fun_level, "callee deeper than caller");
            self.instr(Opcode::ISRN, vec![(current_level - fun_level).to_string()]);
        }

        // Array arguments push their dimensions before the reference,
        // so slot counts line up with the callee's signature.
        for arg in args {
            self.emit_expr(arg);
        }

        let (imported, param_count, label, ret_type) = {
            let callee = self.scopes.symbol(callee);
            (
                callee.imported,
                callee.param_count(),
                callee.fun_data().label.clone(),
                callee.vtype,
            )
        };

        if imported {
            let (index, _) = self
                .asm
                .find_fun_import(name)
                .expect("imported function missing from the import table");
            self.instr(Opcode::JSRE, vec![index.to_string()]);
        } else {
            self.instr(Opcode::JSR, vec![param_count.to_string(), label]);
        }

        ret_type
    }

    fn emit_int_constant(&mut self, value: i64) {
        match value {
            -1 => self.instr(Opcode::ILOADC_M1, vec![]),
            0 => self.instr(Opcode::ILOADC_0, vec![]),
            1 => self.instr(Opcode::ILOADC_1, vec![]),
            value => {
                let literal = value.to_string();
                let index = match self.asm.find_constant(&literal) {
                    Some((index, _)) => index,
                    None => self.asm.emit_constant(ValueType::Int, literal),
                };
                self.instr(Opcode::ILOADC, vec![index.to_string()]);
            }
        }
    }

    fn emit_float_constant(&mut self, value: f64) {
        if value == 0.0 {
            self.instr(Opcode::FLOADC_0, vec![]);
        } else if value == 1.0 {
            self.instr(Opcode::FLOADC_1, vec![]);
        } else {
            let literal = value.to_string();
            let index = match self.asm.find_constant(&literal) {
                Some((index, _)) => index,
                None => self.asm.emit_constant(ValueType::Float, literal),
            };
            self.instr(Opcode::FLOADC, vec![index.to_string()]);
        }
    }
}

/// Array lowering
impl TetraBytecodeGenerator {
    /// Evaluates the declared dimension expressions into the reserved
    /// dimension scalars.
    fn fill_array_dims(&mut self, sym_id: SymbolId, dim_exprs: &[ASTNode]) {
        let dims = self.scopes.symbol(sym_id).array_data().dims.clone();
        debug_assert_eq!(dims.len(), dim_exprs.len());

        for (dim, expr) in dims.iter().zip(dim_exprs) {
            self.emit_expr(expr);
            self.emit_store_sym(*dim);
        }
    }

    /// Pushes the dimension scalars and multiplies them down to the
    /// flat element count.
    fn comp_array_size(&mut self, sym_id: SymbolId) {
        let dims = self.scopes.symbol(sym_id).array_data().dims.clone();
        for dim in &dims {
            self.emit_load_sym(*dim, false);
        }
        for _ in 1..dims.len() {
            self.instr(Opcode::IMUL, vec![]);
        }
    }

    /// Allocates the array at runtime and stores its reference at the
    /// array's slot.
    fn create_array_with_size(&mut self, sym_id: SymbolId) {
        self.comp_array_size(sym_id);

        let element_type = self
            .scopes
            .symbol(sym_id)
            .vtype
            .element_type()
            .expect("allocation of a non-array");
        let op = match element_type {
            ValueType::Int => Opcode::INEWA,
            ValueType::Float => Opcode::FNEWA,
            ValueType::Bool => Opcode::BNEWA,
            element => unreachable!("array of {}", element),
        };
        self.instr(op, vec![]);

        self.emit_store_sym(sym_id);
    }

    /// Flattens multi-dimensional index expressions into a single
    /// row-major element index on the stack.
    fn flatten_index_exprs(&mut self, sym_id: SymbolId, indices: &[ASTNode]) {
        let dims = self.scopes.symbol(sym_id).array_data().dims.clone();
        let dim_count = dims.len();
        debug_assert_eq!(indices.len(), dim_count, "index arity diverged after analysis");

        for (i, index) in indices.iter().enumerate() {
            self.emit_expr(index);

            // Scale by the product of all inner dimension sizes
            if i < dim_count - 1 {
                for dim in &dims[i + 1..] {
                    self.emit_load_sym(*dim, false);
                }
                for _ in i + 1..dim_count {
                    self.instr(Opcode::IMUL, vec![]);
                }
            }

            if i != 0 {
                self.instr(Opcode::IADD, vec![]);
            }
        }
    }

    /// Pushes every dimension scalar followed by the array reference,
    /// the shape a callee's array parameter expects.
    fn push_array_with_dims(&mut self, sym_id: SymbolId) {
        let dims = self.scopes.symbol(sym_id).array_data().dims.clone();
        for dim in &dims {
            self.emit_load_sym(*dim, false);
        }
        self.emit_load_sym(sym_id, false);
    }

    /// Counts the leaves of an array literal.
    fn count_arr_expr(node: &ASTNode) -> usize {
        match node {
            ASTNode::ARR_EXPR { exprs } => exprs.iter().map(Self::count_arr_expr).sum(),
            _ => 1,
        }
    }

    /// Evaluates every leaf of an array literal onto the stack in
    /// source order.
    fn emit_arr_expr(&mut self, node: &ASTNode) {
        let ASTNode::ARR_EXPR { exprs } = node else {
            unreachable!("node {:?} is not an array literal", node);
        };
        for expr in exprs {
            if matches!(expr, ASTNode::ARR_EXPR { .. }) {
                self.emit_arr_expr(expr);
            } else {
                self.emit_expr(expr);
            }
        }
    }

    /// Stores `count` stacked literal values into the array, walking
    /// indices from the last down to zero so each store consumes the
    /// value evaluated for it.
    fn init_array_with_arr_expr(&mut self, sym_id: SymbolId, count: usize) {
        let element_type = self
            .scopes
            .symbol(sym_id)
            .vtype
            .element_type()
            .expect("literal initialisation of a non-array");

        for index in (0..count).rev() {
            self.emit_int_constant(index as i64);
            self.emit_load_sym(sym_id, false);
            self.instr(Self::elem_store_op(element_type), vec![]);
        }
    }

    /// Lowers an array declaration initialised with a single scalar
    /// into a runtime broadcast loop over the reserved helper slots.
    fn init_array_with_scalar(&mut self, sym_id: SymbolId, scalar_type: ValueType) {
        let (name, decl_scope) = {
            let symbol = self.scopes.symbol(sym_id);
            (symbol.name.clone(), symbol.parent_scope.expect("unlinked symbol"))
        };

        let scalar = self.broadcast_helper(decl_scope, "_scalar_", &name);
        let counter = self.broadcast_helper(decl_scope, "_counter_", &name);
        let size = self.broadcast_helper(decl_scope, "_size_", &name);

        // The initialiser value is on the stack; stash it
        self.emit_store_sym(scalar);

        // counter = 0
        self.instr(Opcode::ILOADC_0, vec![]);
        self.emit_store_sym(counter);

        // size = product of all dimensions
        self.comp_array_size(sym_id);
        self.emit_store_sym(size);

        let start_label = self.new_label("for_loop_start");
        let end_label = self.new_label("for_loop_end");

        self.label(&start_label);

        // while counter < size
        self.emit_load_sym(counter, false);
        self.emit_load_sym(size, false);
        self.instr(Opcode::ILT, vec![]);
        self.instr(Opcode::BRANCH_F, vec![end_label.clone()]);

        // array[counter] = scalar
        self.emit_load_sym(scalar, false);
        self.emit_load_sym(counter, false);
        self.emit_load_sym(sym_id, false);
        self.instr(Self::elem_store_op(scalar_type), vec![]);

        // counter += 1; frame locals take the fast path
        if self.addressing(counter) == AddrMode::Local {
            let offset = self.scopes.symbol(counter).offset.to_string();
            self.instr(Opcode::IINC_1, vec![offset]);
        } else {
            self.emit_load_sym(counter, false);
            self.instr(Opcode::ILOADC_1, vec![]);
            self.instr(Opcode::IADD, vec![]);
            self.emit_store_sym(counter);
        }

        self.instr(Opcode::JUMP, vec![start_label.clone()]);
        self.label(&end_label);
    }

    fn broadcast_helper(&self, scope: ScopeId, prefix: &str, name: &str) -> SymbolId {
        self.scopes
            .lookup_local(scope, &format!("{}{}", prefix, name))
            .expect("broadcast helper was not reserved during analysis")
    }

    fn elem_store_op(element_type: ValueType) -> Opcode {
        match element_type {
            ValueType::Int => Opcode::ISTOREA,
            ValueType::Float => Opcode::FSTOREA,
            ValueType::Bool => Opcode::BSTOREA,
            element => unreachable!("array of {}", element),
        }
    }
}

/// Addressing-mode selection and emission plumbing
impl TetraBytecodeGenerator {
    fn addressing(&self, sym_id: SymbolId) -> AddrMode {
        let symbol = self.scopes.symbol(sym_id);
        if symbol.imported {
            return AddrMode::Imported;
        }

        let home_level = self.scopes.home_level(sym_id);
        let current_level = self.scopes.scope(self.current_scope).nesting_level;

        if home_level == 0 {
            AddrMode::Global
        } else if home_level == current_level {
            AddrMode::Local
        } else {
            debug_assert!(home_level < current_level, "variable reached upward");
            AddrMode::Free(current_level - home_level)
        }
    }

    /// Emits the load for a variable access. Small-offset
    /// specialisations only apply to frame-local scalars, and only
    /// where a plain variable use is being lowered.
    fn emit_load_sym(&mut self, sym_id: SymbolId, specialise_small: bool) {
        let (vtype, offset) = {
            let symbol = self.scopes.symbol(sym_id);
            (symbol.vtype, symbol.offset)
        };
        let mode = self.addressing(sym_id);

        if specialise_small && mode == AddrMode::Local && !vtype.is_array() && offset <= 3 {
            let op = match (vtype, offset) {
                (ValueType::Int, 0) => Opcode::ILOAD_0,
                (ValueType::Int, 1) => Opcode::ILOAD_1,
                (ValueType::Int, 2) => Opcode::ILOAD_2,
                (ValueType::Int, 3) => Opcode::ILOAD_3,
                (ValueType::Float, 0) => Opcode::FLOAD_0,
                (ValueType::Float, 1) => Opcode::FLOAD_1,
                (ValueType::Float, 2) => Opcode::FLOAD_2,
                (ValueType::Float, 3) => Opcode::FLOAD_3,
                (ValueType::Bool, 0) => Opcode::BLOAD_0,
                (ValueType::Bool, 1) => Opcode::BLOAD_1,
                (ValueType::Bool, 2) => Opcode::BLOAD_2,
                (ValueType::Bool, 3) => Opcode::BLOAD_3,
                (vtype, offset) => unreachable!("no specialised load for {} at {}", vtype, offset),
            };
            self.instr(op, vec![]);
            return;
        }

        let op = match (Self::type_prefix(vtype), mode) {
            (Prefix::I, AddrMode::Local) => Opcode::ILOAD,
            (Prefix::I, AddrMode::Global) => Opcode::ILOADG,
            (Prefix::I, AddrMode::Imported) => Opcode::ILOADE,
            (Prefix::I, AddrMode::Free(_)) => Opcode::ILOADN,
            (Prefix::F, AddrMode::Local) => Opcode::FLOAD,
            (Prefix::F, AddrMode::Global) => Opcode::FLOADG,
            (Prefix::F, AddrMode::Imported) => Opcode::FLOADE,
            (Prefix::F, AddrMode::Free(_)) => Opcode::FLOADN,
            (Prefix::B, AddrMode::Local) => Opcode::BLOAD,
            (Prefix::B, AddrMode::Global) => Opcode::BLOADG,
            (Prefix::B, AddrMode::Imported) => Opcode::BLOADE,
            (Prefix::B, AddrMode::Free(_)) => Opcode::BLOADN,
            (Prefix::A, AddrMode::Local) => Opcode::ALOAD,
            (Prefix::A, AddrMode::Global) => Opcode::ALOADG,
            (Prefix::A, AddrMode::Imported) => Opcode::ALOADE,
            (Prefix::A, AddrMode::Free(_)) => Opcode::ALOADN,
        };
        self.instr(op, Self::mode_args(mode, offset));
    }

    /// Emits the store for a variable access.
    fn emit_store_sym(&mut self, sym_id: SymbolId) {
        let (vtype, offset) = {
            let symbol = self.scopes.symbol(sym_id);
            (symbol.vtype, symbol.offset)
        };
        let mode = self.addressing(sym_id);

        let op = match (Self::type_prefix(vtype), mode) {
            (Prefix::I, AddrMode::Local) => Opcode::ISTORE,
            (Prefix::I, AddrMode::Global) => Opcode::ISTOREG,
            (Prefix::I, AddrMode::Imported) => Opcode::ISTOREE,
            (Prefix::I, AddrMode::Free(_)) => Opcode::ISTOREN,
            (Prefix::F, AddrMode::Local) => Opcode::FSTORE,
            (Prefix::F, AddrMode::Global) => Opcode::FSTOREG,
            (Prefix::F, AddrMode::Imported) => Opcode::FSTOREE,
            (Prefix::F, AddrMode::Free(_)) => Opcode::FSTOREN,
            (Prefix::B, AddrMode::Local) => Opcode::BSTORE,
            (Prefix::B, AddrMode::Global) => Opcode::BSTOREG,
            (Prefix::B, AddrMode::Imported) => Opcode::BSTOREE,
            (Prefix::B, AddrMode::Free(_)) => Opcode::BSTOREN,
            (Prefix::A, AddrMode::Local) => Opcode::ASTORE,
            (Prefix::A, AddrMode::Global) => Opcode::ASTOREG,
            (Prefix::A, AddrMode::Imported) => Opcode::ASTOREE,
            (Prefix::A, AddrMode::Free(_)) => Opcode::ASTOREN,
        };
        self.instr(op, Self::mode_args(mode, offset));
    }

    fn mode_args(mode: AddrMode, offset: usize) -> Vec<String> {
        match mode {
            AddrMode::Free(delta) => vec![delta.to_string(), offset.to_string()],
            _ => vec![offset.to_string()],
        }
    }

    fn type_prefix(vtype: ValueType) -> Prefix {
        match vtype {
            ValueType::Int => Prefix::I,
            ValueType::Float => Prefix::F,
            ValueType::Bool => Prefix::B,
            vtype if vtype.is_array() => Prefix::A,
            vtype => unreachable!("no instruction prefix for {}", vtype),
        }
    }

    /// Routes an instruction to the init queue while the global scope
    /// is active, otherwise to the main stream.
    fn instr(&mut self, op: Opcode, args: Vec<String>) {
        if self.scopes.scope(self.current_scope).nesting_level == 0 {
            self.asm.emit_init_instr(op, args);
        } else {
            self.asm.emit_instr(op, args);
        }
    }

    /// Labels follow the same routing as instructions, so init-time
    /// branches and their targets stay in one stream.
    fn label(&mut self, name: &str) {
        if self.scopes.scope(self.current_scope).nesting_level == 0 {
            self.asm.emit_init_label(name);
        } else {
            self.asm.emit_label(name, false);
        }
    }

    /// Generates a label name that is guaranteed not to collide with
    /// any other name in the program.
    fn new_label(&mut self, purpose: &str) -> String {
        let label = format!("_lab{}_{}", self.label_count, purpose);
        self.label_count += 1;
        label
    }

    fn lookup_here(&self, name: &str) -> SymbolId {
        self.scopes
            .lookup_local(self.current_scope, name)
            .expect("declared name missing from the current scope")
    }
}

/// Instruction type prefix of a value type.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Prefix {
    I,
    F,
    B,
    A,
}
