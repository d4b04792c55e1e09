use enum_assoc::Assoc;
use strum_macros::{Display, EnumString};

/// Opcode is an enum of all instruction mnemonics of the Tetra VM.
/// Scalar instructions carry a type prefix (`i`, `f`, `b`) selecting the
/// integer, float or boolean variant of the operation; the `a` prefix
/// moves array references. Variable access comes in four addressing
/// modes: plain (local frame), `..g` (global frame), `..e` (imported)
/// and `..n` (relatively free, taking a frame-depth delta before the
/// offset). Refer to the VM instruction set documentation for the
/// operational semantics of each opcode.
///
/// The `operand_count` association records how many textual arguments
/// an instruction carries in assembly output.
#[allow(non_camel_case_types)]
#[derive(Debug,
         Eq, PartialEq,
         Copy, Clone,
         Display, EnumString,
         Assoc)]
#[func(pub const fn operand_count(&self) -> usize)]
#[strum(serialize_all = "lowercase")]
pub enum Opcode {
    // Integer variable access
    #[assoc(operand_count = 1)]
    ILOAD,
    #[assoc(operand_count = 0)]
    ILOAD_0,
    #[assoc(operand_count = 0)]
    ILOAD_1,
    #[assoc(operand_count = 0)]
    ILOAD_2,
    #[assoc(operand_count = 0)]
    ILOAD_3,
    #[assoc(operand_count = 2)]
    ILOADN,
    #[assoc(operand_count = 1)]
    ILOADG,
    #[assoc(operand_count = 1)]
    ILOADE,
    #[assoc(operand_count = 1)]
    ISTORE,
    #[assoc(operand_count = 2)]
    ISTOREN,
    #[assoc(operand_count = 1)]
    ISTOREG,
    #[assoc(operand_count = 1)]
    ISTOREE,

    // Float variable access
    #[assoc(operand_count = 1)]
    FLOAD,
    #[assoc(operand_count = 0)]
    FLOAD_0,
    #[assoc(operand_count = 0)]
    FLOAD_1,
    #[assoc(operand_count = 0)]
    FLOAD_2,
    #[assoc(operand_count = 0)]
    FLOAD_3,
    #[assoc(operand_count = 2)]
    FLOADN,
    #[assoc(operand_count = 1)]
    FLOADG,
    #[assoc(operand_count = 1)]
    FLOADE,
    #[assoc(operand_count = 1)]
    FSTORE,
    #[assoc(operand_count = 2)]
    FSTOREN,
    #[assoc(operand_count = 1)]
    FSTOREG,
    #[assoc(operand_count = 1)]
    FSTOREE,

    // Boolean variable access
    #[assoc(operand_count = 1)]
    BLOAD,
    #[assoc(operand_count = 0)]
    BLOAD_0,
    #[assoc(operand_count = 0)]
    BLOAD_1,
    #[assoc(operand_count = 0)]
    BLOAD_2,
    #[assoc(operand_count = 0)]
    BLOAD_3,
    #[assoc(operand_count = 2)]
    BLOADN,
    #[assoc(operand_count = 1)]
    BLOADG,
    #[assoc(operand_count = 1)]
    BLOADE,
    #[assoc(operand_count = 1)]
    BSTORE,
    #[assoc(operand_count = 2)]
    BSTOREN,
    #[assoc(operand_count = 1)]
    BSTOREG,
    #[assoc(operand_count = 1)]
    BSTOREE,

    // Array reference access
    #[assoc(operand_count = 1)]
    ALOAD,
    #[assoc(operand_count = 2)]
    ALOADN,
    #[assoc(operand_count = 1)]
    ALOADG,
    #[assoc(operand_count = 1)]
    ALOADE,
    #[assoc(operand_count = 1)]
    ASTORE,
    #[assoc(operand_count = 2)]
    ASTOREN,
    #[assoc(operand_count = 1)]
    ASTOREG,
    #[assoc(operand_count = 1)]
    ASTOREE,

    // Array allocation and element access. The element instructions
    // expect value, flat index and array reference on the stack.
    #[assoc(operand_count = 0)]
    INEWA,
    #[assoc(operand_count = 0)]
    FNEWA,
    #[assoc(operand_count = 0)]
    BNEWA,
    #[assoc(operand_count = 0)]
    ILOADA,
    #[assoc(operand_count = 0)]
    FLOADA,
    #[assoc(operand_count = 0)]
    BLOADA,
    #[assoc(operand_count = 0)]
    ISTOREA,
    #[assoc(operand_count = 0)]
    FSTOREA,
    #[assoc(operand_count = 0)]
    BSTOREA,

    // Constant loads
    #[assoc(operand_count = 1)]
    ILOADC,
    #[assoc(operand_count = 0)]
    ILOADC_M1,
    #[assoc(operand_count = 0)]
    ILOADC_0,
    #[assoc(operand_count = 0)]
    ILOADC_1,
    #[assoc(operand_count = 1)]
    FLOADC,
    #[assoc(operand_count = 0)]
    FLOADC_0,
    #[assoc(operand_count = 0)]
    FLOADC_1,
    #[assoc(operand_count = 0)]
    BLOADC_T,
    #[assoc(operand_count = 0)]
    BLOADC_F,

    // Arithmetic. badd and bmul double as boolean disjunction and
    // conjunction.
    #[assoc(operand_count = 0)]
    IADD,
    #[assoc(operand_count = 0)]
    ISUB,
    #[assoc(operand_count = 0)]
    IMUL,
    #[assoc(operand_count = 0)]
    IDIV,
    #[assoc(operand_count = 0)]
    IREM,
    #[assoc(operand_count = 0)]
    FADD,
    #[assoc(operand_count = 0)]
    FSUB,
    #[assoc(operand_count = 0)]
    FMUL,
    #[assoc(operand_count = 0)]
    FDIV,
    #[assoc(operand_count = 0)]
    BADD,
    #[assoc(operand_count = 0)]
    BMUL,
    #[assoc(operand_count = 0)]
    INEG,
    #[assoc(operand_count = 0)]
    FNEG,
    #[assoc(operand_count = 0)]
    BNOT,
    #[assoc(operand_count = 1)]
    IINC_1,

    // Comparisons; all leave a boolean on the stack.
    #[assoc(operand_count = 0)]
    IEQ,
    #[assoc(operand_count = 0)]
    INE,
    #[assoc(operand_count = 0)]
    ILT,
    #[assoc(operand_count = 0)]
    ILE,
    #[assoc(operand_count = 0)]
    IGT,
    #[assoc(operand_count = 0)]
    IGE,
    #[assoc(operand_count = 0)]
    FEQ,
    #[assoc(operand_count = 0)]
    FNE,
    #[assoc(operand_count = 0)]
    FLT,
    #[assoc(operand_count = 0)]
    FLE,
    #[assoc(operand_count = 0)]
    FGT,
    #[assoc(operand_count = 0)]
    FGE,
    #[assoc(operand_count = 0)]
    BEQ,
    #[assoc(operand_count = 0)]
    BNE,

    // Numeric casts
    #[assoc(operand_count = 0)]
    I2F,
    #[assoc(operand_count = 0)]
    F2I,

    // Jumps
    #[assoc(operand_count = 1)]
    JUMP,
    #[assoc(operand_count = 1)]
    BRANCH_T,
    #[assoc(operand_count = 1)]
    BRANCH_F,

    // Subroutine linkage. The isr family saves the scope register for
    // the callee before the arguments are pushed.
    #[assoc(operand_count = 0)]
    ISR,
    #[assoc(operand_count = 0)]
    ISRL,
    #[assoc(operand_count = 0)]
    ISRG,
    #[assoc(operand_count = 1)]
    ISRN,
    #[assoc(operand_count = 2)]
    JSR,
    #[assoc(operand_count = 1)]
    JSRE,
    #[assoc(operand_count = 1)]
    ESR,

    // Typed returns
    #[assoc(operand_count = 0)]
    IRETURN,
    #[assoc(operand_count = 0)]
    FRETURN,
    #[assoc(operand_count = 0)]
    BRETURN,
    #[assoc(operand_count = 0)]
    RETURN,

    // Typed pops for discarded expression results
    #[assoc(operand_count = 0)]
    IPOP,
    #[assoc(operand_count = 0)]
    FPOP,
    #[assoc(operand_count = 0)]
    BPOP,
}

#[cfg(test)]
mod tests {
    use super::Opcode;
    use std::str::FromStr;

    #[test]
    fn mnemonics_render_lowercase() {
        assert_eq!(Opcode::ILOAD.to_string(), "iload");
        assert_eq!(Opcode::ILOADC_M1.to_string(), "iloadc_m1");
        assert_eq!(Opcode::BRANCH_F.to_string(), "branch_f");
        assert_eq!(Opcode::I2F.to_string(), "i2f");
        assert_eq!(Opcode::FLOAD_3.to_string(), "fload_3");
    }

    #[test]
    fn mnemonics_parse_back() {
        assert_eq!(Opcode::from_str("istoren").unwrap(), Opcode::ISTOREN);
        assert_eq!(Opcode::from_str("jsre").unwrap(), Opcode::JSRE);
        assert_eq!(Opcode::from_str("bloadc_t").unwrap(), Opcode::BLOADC_T);
        Opcode::from_str("ifetch").expect_err("unknown mnemonic");
    }

    #[test]
    fn operand_counts() {
        assert_eq!(Opcode::IADD.operand_count(), 0);
        assert_eq!(Opcode::ILOAD.operand_count(), 1);
        assert_eq!(Opcode::ILOADN.operand_count(), 2);
        assert_eq!(Opcode::JSR.operand_count(), 2);
        assert_eq!(Opcode::JSRE.operand_count(), 1);
        assert_eq!(Opcode::ESR.operand_count(), 1);
        assert_eq!(Opcode::IINC_1.operand_count(), 1);
    }
}
