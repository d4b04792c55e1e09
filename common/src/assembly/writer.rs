use std::fmt;
use std::fs::File;
use std::io;
use std::io::Write;
use std::path::Path;

use super::{AsmItem, Assembly};

impl fmt::Display for Assembly {
    /// This allows assembly to be converted into its textual form.
    /// For files this format is stored with the extension .tas.
    ///
    /// # Format
    /// Instructions are written one per line, indented four spaces,
    /// with space-separated arguments. Labels are written flush left
    /// and end with a colon; function labels are preceded by a blank
    /// line except for the very first. The instruction stream is
    /// followed by a blank line and then the tables, one directive per
    /// line: `.const`, `.exportfun`, `.exportvar`, `.global`,
    /// `.importfun`, `.importvar`. Names in directives are quoted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut written_fun_label = false;

        for item in self.instructions() {
            match item {
                AsmItem::Label { name, is_fun } => {
                    if *is_fun {
                        if written_fun_label {
                            writeln!(f)?;
                        }
                        written_fun_label = true;
                    }
                    writeln!(f, "{}:", name)?;
                }
                AsmItem::Instr { op, args } => {
                    write!(f, "    {}", op)?;
                    for arg in args {
                        write!(f, " {}", arg)?;
                    }
                    writeln!(f)?;
                }
            }
        }

        // Separator between the instruction stream and the tables
        writeln!(f)?;

        for constant in self.constants() {
            writeln!(f, ".const {} {}", constant.vtype, constant.value)?;
        }

        for export in self.fun_exports() {
            write!(f, ".exportfun \"{}\" {}", export.name, export.ret_type)?;
            for arg_type in &export.arg_types {
                write!(f, " {}", arg_type)?;
            }
            writeln!(f, " {}", export.label)?;
        }

        for export in self.var_exports() {
            writeln!(f, ".exportvar \"{}\" {}", export.name, export.global_index)?;
        }

        for glob_var in self.glob_vars() {
            writeln!(f, ".global {}", glob_var.vtype)?;
        }

        for import in self.fun_imports() {
            write!(f, ".importfun \"{}\" {}", import.name, import.ret_type)?;
            for arg_type in &import.arg_types {
                write!(f, " {}", arg_type)?;
            }
            writeln!(f)?;
        }

        for import in self.var_imports() {
            writeln!(f, ".importvar \"{}\" {}", import.name, import.vtype)?;
        }

        Ok(())
    }
}

impl Assembly {
    /// Serialises the assembly into a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write!(writer, "{}", self)
    }

    /// Serialises the assembly into a file, creating or truncating it.
    pub fn save_to_file(&self, path: &Path) -> io::Result<()> {
        let mut file = File::create(path)?;
        self.write_to(&mut file)
    }
}

#[cfg(test)]
mod tests {
    use crate::assembly::{Assembly, Opcode};
    use crate::ValueType;

    #[test]
    fn writes_instructions_labels_and_tables_in_order() {
        let mut asm = Assembly::new();
        asm.emit_label("main", true);
        asm.emit_instr(Opcode::ILOADC_1, vec![]);
        asm.emit_instr(Opcode::ISTORE, vec![String::from("0")]);
        asm.emit_label("_lab0_end", false);
        asm.emit_instr(Opcode::RETURN, vec![]);
        asm.emit_constant(ValueType::Int, String::from("42"));
        asm.emit_fun_export("main", ValueType::Void, vec![], "main");
        asm.emit_glob_var(ValueType::Float);
        asm.emit_fun_import("a", ValueType::Bool, vec![ValueType::Int]);
        asm.emit_var_import("n", ValueType::Int);

        let expected = "\
main:
    iloadc_1
    istore 0
_lab0_end:
    return

.const int 42
.exportfun \"main\" void main
.global float
.importfun \"a\" bool int
.importvar \"n\" int
";
        assert_eq!(asm.to_string(), expected);
    }

    #[test]
    fn second_function_label_gets_a_blank_line() {
        let mut asm = Assembly::new();
        asm.emit_label("main", true);
        asm.emit_instr(Opcode::RETURN, vec![]);
        asm.emit_label("helper", true);
        asm.emit_instr(Opcode::RETURN, vec![]);

        let expected = "\
main:
    return

helper:
    return

";
        assert_eq!(asm.to_string(), expected);
    }

    #[test]
    fn exportvar_uses_global_index() {
        let mut asm = Assembly::new();
        asm.emit_glob_var(ValueType::Int);
        asm.emit_var_export("x", 0);

        assert!(asm.to_string().contains(".exportvar \"x\" 0"));
    }
}
