pub mod ops;
pub mod writer;

pub use self::ops::Opcode;

use crate::value_type::ValueType;

/// AsmItem is one entry of the linear instruction stream. Jump targets
/// live in the stream as pseudo items so that the writer can lay them
/// out in place; function labels are flagged separately because the
/// writer sets them apart with a blank line.
#[derive(Debug, Clone, PartialEq)]
pub enum AsmItem {
    /// A VM instruction with up to three textual arguments
    /// (offsets, frame deltas, constant indices or label names).
    Instr { op: Opcode, args: Vec<String> },

    /// A named position in the stream.
    Label { name: String, is_fun: bool },
}

/// An interned literal of the constant pool.
/// Constants are referenced by their insertion index.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub vtype: ValueType,
    pub value: String,
}

/// A function made visible to other translation units.
#[derive(Debug, Clone, PartialEq)]
pub struct FunExport {
    pub name: String,
    pub ret_type: ValueType,
    pub arg_types: Vec<ValueType>,
    pub label: String,
}

/// A global variable made visible to other translation units,
/// referenced by its index in the global table.
#[derive(Debug, Clone, PartialEq)]
pub struct VarExport {
    pub name: String,
    pub global_index: usize,
}

/// One slot of the global variable table.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobVar {
    pub vtype: ValueType,
}

/// A function resolved against another translation unit at link time.
#[derive(Debug, Clone, PartialEq)]
pub struct FunImport {
    pub name: String,
    pub ret_type: ValueType,
    pub arg_types: Vec<ValueType>,
}

/// A variable resolved against another translation unit at link time.
#[derive(Debug, Clone, PartialEq)]
pub struct VarImport {
    pub name: String,
    pub vtype: ValueType,
}

/// Assembly is the in-memory representation of one output file: the
/// main instruction stream, the instruction queue of the implicit
/// global-initialisation function, the constant pool, the global
/// variable table and the four import/export tables.
///
/// All sequences are append-only. Table indices are assigned in append
/// order and never change afterwards; the emitter relies on this when
/// it refers to constants and imports by index.
#[derive(Debug, Default, PartialEq)]
pub struct Assembly {
    instrs: Vec<AsmItem>,
    init_instrs: Vec<AsmItem>,
    consts: Vec<Constant>,
    glob_vars: Vec<GlobVar>,
    fun_exports: Vec<FunExport>,
    var_exports: Vec<VarExport>,
    fun_imports: Vec<FunImport>,
    var_imports: Vec<VarImport>,
}

impl Assembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an instruction to the main stream.
    pub fn emit_instr(&mut self, op: Opcode, args: Vec<String>) {
        debug_assert_eq!(args.len(), op.operand_count(), "bad operand count for {}", op);
        self.instrs.push(AsmItem::Instr { op, args });
    }

    /// Appends an instruction to the global-initialisation queue.
    pub fn emit_init_instr(&mut self, op: Opcode, args: Vec<String>) {
        debug_assert_eq!(args.len(), op.operand_count(), "bad operand count for {}", op);
        self.init_instrs.push(AsmItem::Instr { op, args });
    }

    /// Appends a label to the main stream.
    pub fn emit_label(&mut self, name: &str, is_fun: bool) {
        self.instrs.push(AsmItem::Label {
            name: String::from(name),
            is_fun,
        });
    }

    /// Appends a label to the global-initialisation queue. Labels used
    /// by init-time branches must live in the same stream as the
    /// instructions that reference them.
    pub fn emit_init_label(&mut self, name: &str) {
        self.init_instrs.push(AsmItem::Label {
            name: String::from(name),
            is_fun: false,
        });
    }

    /// Appends a constant and returns its pool index.
    /// Callers wanting interning behaviour query find_constant first.
    pub fn emit_constant(&mut self, vtype: ValueType, value: String) -> usize {
        self.consts.push(Constant { vtype, value });
        self.consts.len() - 1
    }

    /// Looks a literal up in the constant pool.
    /// Returns the first matching entry, so earlier indices win.
    pub fn find_constant(&self, value: &str) -> Option<(usize, &Constant)> {
        self.consts
            .iter()
            .enumerate()
            .find(|(_, c)| c.value == value)
    }

    pub fn emit_fun_export(
        &mut self,
        name: &str,
        ret_type: ValueType,
        arg_types: Vec<ValueType>,
        label: &str,
    ) -> usize {
        self.fun_exports.push(FunExport {
            name: String::from(name),
            ret_type,
            arg_types,
            label: String::from(label),
        });
        self.fun_exports.len() - 1
    }

    pub fn emit_var_export(&mut self, name: &str, global_index: usize) {
        self.var_exports.push(VarExport {
            name: String::from(name),
            global_index,
        });
    }

    pub fn emit_glob_var(&mut self, vtype: ValueType) {
        self.glob_vars.push(GlobVar { vtype });
    }

    pub fn emit_fun_import(
        &mut self,
        name: &str,
        ret_type: ValueType,
        arg_types: Vec<ValueType>,
    ) -> usize {
        self.fun_imports.push(FunImport {
            name: String::from(name),
            ret_type,
            arg_types,
        });
        self.fun_imports.len() - 1
    }

    pub fn emit_var_import(&mut self, name: &str, vtype: ValueType) {
        self.var_imports.push(VarImport {
            name: String::from(name),
            vtype,
        });
    }

    pub fn find_fun_export(&self, name: &str) -> Option<(usize, &FunExport)> {
        self.fun_exports
            .iter()
            .enumerate()
            .find(|(_, e)| e.name == name)
    }

    pub fn find_fun_import(&self, name: &str) -> Option<(usize, &FunImport)> {
        self.fun_imports
            .iter()
            .enumerate()
            .find(|(_, i)| i.name == name)
    }

    /// Moves the init queue into the main stream as the body of the
    /// global-initialisation function: its function label, the queued
    /// instructions, and a closing void return. Called once by the
    /// back end after the whole program has been generated.
    pub fn seal_init_function(&mut self, label: &str) {
        self.emit_label(label, true);
        let init = std::mem::take(&mut self.init_instrs);
        self.instrs.extend(init);
        self.emit_instr(Opcode::RETURN, vec![]);
    }

    pub fn has_init_code(&self) -> bool {
        !self.init_instrs.is_empty()
    }

    pub fn instructions(&self) -> &[AsmItem] {
        &self.instrs
    }

    pub fn constants(&self) -> &[Constant] {
        &self.consts
    }

    pub fn glob_vars(&self) -> &[GlobVar] {
        &self.glob_vars
    }

    pub fn fun_exports(&self) -> &[FunExport] {
        &self.fun_exports
    }

    pub fn var_exports(&self) -> &[VarExport] {
        &self.var_exports
    }

    pub fn fun_imports(&self) -> &[FunImport] {
        &self.fun_imports
    }

    pub fn var_imports(&self) -> &[VarImport] {
        &self.var_imports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_indices_follow_insertion_order() {
        let mut asm = Assembly::new();
        assert_eq!(asm.emit_constant(ValueType::Int, String::from("2")), 0);
        assert_eq!(asm.emit_constant(ValueType::Float, String::from("1.5")), 1);
        assert_eq!(asm.emit_constant(ValueType::Int, String::from("40")), 2);

        let values: Vec<&str> = asm.constants().iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["2", "1.5", "40"]);
    }

    #[test]
    fn find_constant_returns_first_match() {
        let mut asm = Assembly::new();
        asm.emit_constant(ValueType::Int, String::from("7"));
        asm.emit_constant(ValueType::Int, String::from("8"));

        let (idx, constant) = asm.find_constant("8").unwrap();
        assert_eq!(idx, 1);
        assert_eq!(constant.vtype, ValueType::Int);
        assert!(asm.find_constant("9").is_none());
    }

    #[test]
    fn import_indices_are_stable() {
        let mut asm = Assembly::new();
        assert_eq!(asm.emit_fun_import("a", ValueType::Bool, vec![]), 0);
        assert_eq!(
            asm.emit_fun_import("c", ValueType::Int, vec![ValueType::Int]),
            1
        );

        assert_eq!(asm.find_fun_import("c").unwrap().0, 1);
        assert_eq!(asm.find_fun_import("a").unwrap().0, 0);
        assert!(asm.find_fun_import("b").is_none());
    }

    #[test]
    fn seal_init_function_drains_the_init_queue() {
        let mut asm = Assembly::new();
        asm.emit_instr(Opcode::RETURN, vec![]);
        asm.emit_init_instr(Opcode::ILOADC_0, vec![]);
        asm.emit_init_instr(Opcode::ISTOREG, vec![String::from("0")]);
        assert!(asm.has_init_code());

        asm.seal_init_function("__init");
        assert!(!asm.has_init_code());

        let items = asm.instructions();
        assert_eq!(items.len(), 5);
        assert_eq!(
            items[1],
            AsmItem::Label {
                name: String::from("__init"),
                is_fun: true
            }
        );
        assert_eq!(
            items[4],
            AsmItem::Instr {
                op: Opcode::RETURN,
                args: vec![]
            }
        );
    }
}
