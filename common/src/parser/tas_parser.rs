use std::io::Error;
use std::str::FromStr;

use regex::Regex;

use super::AssemblyParser;
use crate::assembly::{Assembly, Opcode};
use crate::ValueType;

/// Text parser for Tetra assembly identified by the extension .tas.
/// Instruction lines are indented and consist of a mnemonic plus
/// space-separated arguments; label lines are flush left and end with a
/// colon; table lines start with a directive. Function labels carry no
/// marker of their own in the text, so they are reconstructed from the
/// blank line the writer places in front of them (the first label of a
/// file is always a function label).
pub struct AssemblyTextParser;

impl AssemblyTextParser {
    pub fn new() -> Self {
        Self
    }

    fn invalid(message: String) -> Error {
        Error::new(std::io::ErrorKind::InvalidInput, message)
    }

    fn parse_value_type(token: &str) -> Result<ValueType, Error> {
        ValueType::from_str(token)
            .map_err(|_| Self::invalid(format!("Unknown value type token '{}'.", token)))
    }

    fn parse_value_types(tokens: &[&str]) -> Result<Vec<ValueType>, Error> {
        tokens.iter().map(|t| Self::parse_value_type(t)).collect()
    }

    fn parse_instruction(line: &str, asm: &mut Assembly) -> Result<(), Error> {
        let mut tokens = line.split_whitespace();
        let mnemonic = tokens.next().unwrap(); // Caller guarantees a non-blank line

        let op = Opcode::from_str(mnemonic)
            .map_err(|_| Self::invalid(format!("Unknown instruction mnemonic '{}'.", mnemonic)))?;
        let args: Vec<String> = tokens.map(String::from).collect();

        if args.len() != op.operand_count() {
            return Err(Self::invalid(format!(
                "Instruction '{}' expects {} arguments but got {}.",
                op,
                op.operand_count(),
                args.len()
            )));
        }

        asm.emit_instr(op, args);
        Ok(())
    }

    fn parse_directive(line: &str, asm: &mut Assembly) -> Result<(), Error> {
        // Compiled fresh per parse; assembly files are parsed rarely
        let re_const = Regex::new(r#"^\.const\s+(\S+)\s+(\S+)$"#).unwrap();
        let re_exportfun = Regex::new(r#"^\.exportfun\s+"([^"]+)"\s+(.+)$"#).unwrap();
        let re_exportvar = Regex::new(r#"^\.exportvar\s+"([^"]+)"\s+([0-9]+)$"#).unwrap();
        let re_global = Regex::new(r#"^\.global\s+(\S+)$"#).unwrap();
        let re_importfun = Regex::new(r#"^\.importfun\s+"([^"]+)"\s+(.+)$"#).unwrap();
        let re_importvar = Regex::new(r#"^\.importvar\s+"([^"]+)"\s+(\S+)$"#).unwrap();

        if let Some(caps) = re_const.captures(line) {
            let vtype = Self::parse_value_type(&caps[1])?;
            asm.emit_constant(vtype, String::from(&caps[2]));
        } else if let Some(caps) = re_exportfun.captures(line) {
            let tokens: Vec<&str> = caps[2].split_whitespace().collect();
            if tokens.len() < 2 {
                return Err(Self::invalid(format!("Malformed .exportfun line '{}'.", line)));
            }
            let ret_type = Self::parse_value_type(tokens[0])?;
            let label = tokens[tokens.len() - 1];
            let arg_types = Self::parse_value_types(&tokens[1..tokens.len() - 1])?;
            asm.emit_fun_export(&caps[1], ret_type, arg_types, label);
        } else if let Some(caps) = re_exportvar.captures(line) {
            let index = caps[2].parse::<usize>().unwrap(); // Regex guarantees digits
            asm.emit_var_export(&caps[1], index);
        } else if let Some(caps) = re_global.captures(line) {
            asm.emit_glob_var(Self::parse_value_type(&caps[1])?);
        } else if let Some(caps) = re_importfun.captures(line) {
            let tokens: Vec<&str> = caps[2].split_whitespace().collect();
            let ret_type = Self::parse_value_type(tokens[0])?;
            let arg_types = Self::parse_value_types(&tokens[1..])?;
            asm.emit_fun_import(&caps[1], ret_type, arg_types);
        } else if let Some(caps) = re_importvar.captures(line) {
            asm.emit_var_import(&caps[1], Self::parse_value_type(&caps[2])?);
        } else {
            return Err(Self::invalid(format!("Unknown directive line '{}'.", line)));
        }

        Ok(())
    }
}

impl AssemblyParser for AssemblyTextParser {
    fn parse_str(&self, data: &str) -> Result<Assembly, Error> {
        let mut asm = Assembly::new();

        // Start-of-file counts as a preceding blank line, so the first
        // label of the file is recognised as a function label.
        let mut prev_blank = true;

        for line in data.lines() {
            if line.trim().is_empty() {
                prev_blank = true;
                continue;
            }

            if line.starts_with('.') {
                Self::parse_directive(line, &mut asm)?;
            } else if !line.starts_with(' ') && line.ends_with(':') {
                let name = &line[..line.len() - 1];
                asm.emit_label(name, prev_blank);
            } else if line.starts_with(' ') {
                Self::parse_instruction(line, &mut asm)?;
            } else {
                return Err(Self::invalid(format!(
                    "Unknown code line found while parsing '{}'.",
                    line
                )));
            }

            prev_blank = false;
        }

        Ok(asm)
    }
}

#[cfg(test)]
mod tests {
    use super::AssemblyTextParser;
    use crate::assembly::{Assembly, Opcode};
    use crate::{AssemblyParser, ValueType};

    fn example_assembly() -> Assembly {
        let mut asm = Assembly::new();
        asm.emit_label("inner", true);
        asm.emit_instr(Opcode::ILOAD_0, vec![]);
        asm.emit_instr(Opcode::IRETURN, vec![]);
        asm.emit_label("main", true);
        asm.emit_instr(Opcode::ILOADC, vec![String::from("0")]);
        asm.emit_instr(Opcode::ISTORE, vec![String::from("0")]);
        asm.emit_label("_lab0_while_loop_start", false);
        asm.emit_instr(Opcode::ILOAD, vec![String::from("0")]);
        asm.emit_instr(Opcode::BRANCH_F, vec![String::from("_lab1_while_loop_end")]);
        asm.emit_instr(Opcode::JUMP, vec![String::from("_lab0_while_loop_start")]);
        asm.emit_label("_lab1_while_loop_end", false);
        asm.emit_instr(Opcode::RETURN, vec![]);
        asm.emit_constant(ValueType::Int, String::from("12"));
        asm.emit_fun_export("main", ValueType::Void, vec![], "main");
        asm.emit_glob_var(ValueType::Int);
        asm.emit_fun_import("a", ValueType::Bool, vec![ValueType::Int, ValueType::Int]);
        asm.emit_var_import("n", ValueType::Int);
        asm
    }

    #[test]
    fn parses_own_writer_output() {
        let asm = example_assembly();
        let text = asm.to_string();

        let reparsed = AssemblyTextParser::new().parse_str(&text).unwrap();
        assert_eq!(reparsed, asm);
    }

    #[test]
    fn reserialising_is_byte_identical() {
        let text = example_assembly().to_string();
        let reparsed = AssemblyTextParser::new().parse_str(&text).unwrap();
        assert_eq!(reparsed.to_string(), text);
    }

    #[test]
    fn rejects_unknown_mnemonics() {
        AssemblyTextParser::new()
            .parse_str("main:\n    ifetch 3\n")
            .expect_err("Testing parser error");
    }

    #[test]
    fn rejects_wrong_operand_counts() {
        AssemblyTextParser::new()
            .parse_str("main:\n    iload\n")
            .expect_err("iload requires an offset");
    }

    #[test]
    fn rejects_malformed_directives() {
        AssemblyTextParser::new()
            .parse_str("\n.exportfun main void\n")
            .expect_err("name must be quoted");
    }

    #[test]
    fn function_labels_are_reconstructed() {
        let text = "first:\n    return\n\nsecond:\n    return\n_lab0_end:\n    return\n";
        let asm = AssemblyTextParser::new().parse_str(text).unwrap();
        assert_eq!(asm.to_string(), format!("{}\n", text));
    }
}
