use strum_macros::{Display, EnumString};

/// ValueType is the set of runtime value shapes known to the Tetra VM.
/// The string spelling of each variant is stable: it is used both in
/// compiler error messages and as the type tokens of the textual
/// assembly format (`.const`, `.global`, import/export directives).
///
/// `Null` is an analysis-only sentinel meaning "no expression was
/// evaluated here"; it never reaches an assembly file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum ValueType {
    #[strum(serialize = "int")]
    Int,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "void")]
    Void,
    #[strum(serialize = "int[]")]
    IntArray,
    #[strum(serialize = "float[]")]
    FloatArray,
    #[strum(serialize = "bool[]")]
    BoolArray,
    #[strum(serialize = "null")]
    Null,
}

impl ValueType {
    /// Arithmetic types take part in numeric promotion.
    pub fn is_arithmetic(self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float)
    }

    pub fn is_array(self) -> bool {
        matches!(
            self,
            ValueType::IntArray | ValueType::FloatArray | ValueType::BoolArray
        )
    }

    /// Demotes an array type to its element type.
    /// Only defined for the three array types; everything else yields None.
    pub fn element_type(self) -> Option<ValueType> {
        match self {
            ValueType::IntArray => Some(ValueType::Int),
            ValueType::FloatArray => Some(ValueType::Float),
            ValueType::BoolArray => Some(ValueType::Bool),
            _ => None,
        }
    }

    /// Promotes a scalar type to the matching array type.
    /// `Void` has no array form.
    pub fn array_of(self) -> Option<ValueType> {
        match self {
            ValueType::Int => Some(ValueType::IntArray),
            ValueType::Float => Some(ValueType::FloatArray),
            ValueType::Bool => Some(ValueType::BoolArray),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ValueType;
    use std::str::FromStr;

    #[test]
    fn value_type_spelling_is_stable() {
        assert_eq!(ValueType::Int.to_string(), "int");
        assert_eq!(ValueType::Float.to_string(), "float");
        assert_eq!(ValueType::Bool.to_string(), "bool");
        assert_eq!(ValueType::Void.to_string(), "void");
        assert_eq!(ValueType::IntArray.to_string(), "int[]");
        assert_eq!(ValueType::FloatArray.to_string(), "float[]");
        assert_eq!(ValueType::BoolArray.to_string(), "bool[]");
    }

    #[test]
    fn value_type_parses_from_assembly_tokens() {
        assert_eq!(ValueType::from_str("int").unwrap(), ValueType::Int);
        assert_eq!(ValueType::from_str("float[]").unwrap(), ValueType::FloatArray);
        ValueType::from_str("long").expect_err("unknown type token");
    }

    #[test]
    fn demote_is_only_defined_for_arrays() {
        assert_eq!(ValueType::IntArray.element_type(), Some(ValueType::Int));
        assert_eq!(ValueType::BoolArray.element_type(), Some(ValueType::Bool));
        assert_eq!(ValueType::Int.element_type(), None);
        assert_eq!(ValueType::Void.element_type(), None);
    }

    #[test]
    fn void_has_no_array_form() {
        assert_eq!(ValueType::Int.array_of(), Some(ValueType::IntArray));
        assert_eq!(ValueType::Void.array_of(), None);
    }
}
