mod value_type;

pub use value_type::ValueType;

pub mod assembly;

pub use assembly::{AsmItem, Assembly, Opcode};

mod parser;

pub use parser::{tas_parser::AssemblyTextParser, AssemblyParser};
