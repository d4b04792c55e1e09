use tetra_common::ValueType;

use super::scope_tree::ScopeId;

/// Index of a symbol in the scope tree's symbol arena. All
/// cross-references between symbols (array dimensions, function
/// scopes) are held as indices, which keeps the symbol graph free of
/// ownership cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolId(pub(crate) usize);

/// Variant data of a symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    /// A scalar variable; everything it needs lives in the common fields.
    Scalar,
    Array(ArrayData),
    Function(FunData),
    ForLoop(ForLoopData),
}

/// Array symbols track the scalar symbols holding their runtime
/// dimension sizes, in dimension order. Dimensions are first-class
/// named integer variables of the same scope, which is what lets the
/// VM pass arrays together with their sizes.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayData {
    pub dims: Vec<SymbolId>,
}

/// Function symbols carry their full calling signature. Parameter types
/// are stored slot-expanded: the dimension scalars of an array
/// parameter appear as ints directly before the array itself, matching
/// what a caller pushes. param_dim_counts is aligned with param_types
/// and is non-zero only on array slots.
#[derive(Debug, Clone, PartialEq)]
pub struct FunData {
    pub param_types: Vec<ValueType>,
    pub param_dim_counts: Vec<usize>,
    /// The function's own scope
    pub scope: ScopeId,
    /// Emitted label; unique across the program
    pub label: String,
}

/// For-loop sentinels tie a loop statement to the scope holding its
/// induction, bound and step variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoopData {
    pub scope: ScopeId,
}

/// Symbol is one record per named entity in some scope.
///
/// A symbol belongs to exactly one scope; parent_scope is unset until
/// the symbol is inserted and must never be set twice. imported and
/// exported are mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub vtype: ValueType,
    /// Position within the owning frame (locals), the global table
    /// (globals), or the matching import/export table.
    pub offset: usize,
    pub imported: bool,
    pub exported: bool,
    pub parent_scope: Option<ScopeId>,
    pub kind: SymbolKind,
}

impl Symbol {
    fn new(name: &str, vtype: ValueType, kind: SymbolKind) -> Self {
        Self {
            name: String::from(name),
            vtype,
            offset: 0,
            imported: false,
            exported: false,
            parent_scope: None,
            kind,
        }
    }

    pub fn new_scalar(name: &str, vtype: ValueType) -> Self {
        Self::new(name, vtype, SymbolKind::Scalar)
    }

    pub fn new_array(name: &str, vtype: ValueType) -> Self {
        debug_assert!(vtype.is_array(), "array symbol with scalar type {}", vtype);
        Self::new(name, vtype, SymbolKind::Array(ArrayData { dims: vec![] }))
    }

    pub fn new_function(name: &str, return_type: ValueType, scope: ScopeId, label: &str) -> Self {
        Self::new(
            name,
            return_type,
            SymbolKind::Function(FunData {
                param_types: vec![],
                param_dim_counts: vec![],
                scope,
                label: String::from(label),
            }),
        )
    }

    pub fn new_for_loop(name: &str, scope: ScopeId) -> Self {
        Self::new(name, ValueType::Void, SymbolKind::ForLoop(ForLoopData { scope }))
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn imported(mut self) -> Self {
        debug_assert!(!self.exported);
        self.imported = true;
        self
    }

    pub fn exported(mut self) -> Self {
        debug_assert!(!self.imported);
        self.exported = true;
        self
    }

    /// Appends one parameter slot to a function signature.
    pub fn add_param(&mut self, vtype: ValueType, dim_count: usize) {
        match &mut self.kind {
            SymbolKind::Function(fun) => {
                fun.param_types.push(vtype);
                fun.param_dim_counts.push(dim_count);
            }
            _ => unreachable!("tried to add parameter to non-function symbol"),
        }
    }

    /// Attaches the next dimension scalar to an array symbol.
    pub fn add_dim(&mut self, dim: SymbolId) {
        match &mut self.kind {
            SymbolKind::Array(array) => array.dims.push(dim),
            _ => unreachable!("tried to add dimension to non-array symbol"),
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, SymbolKind::Function(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, SymbolKind::Array(_))
    }

    /// Number of value slots a call must push; array parameters count
    /// their dimension scalars as separate slots.
    pub fn param_count(&self) -> usize {
        self.fun_data().param_types.len()
    }

    pub fn dim_count(&self) -> usize {
        self.array_data().dims.len()
    }

    pub fn fun_data(&self) -> &FunData {
        match &self.kind {
            SymbolKind::Function(fun) => fun,
            _ => unreachable!("symbol '{}' is not a function", self.name),
        }
    }

    pub fn array_data(&self) -> &ArrayData {
        match &self.kind {
            SymbolKind::Array(array) => array,
            _ => unreachable!("symbol '{}' is not an array", self.name),
        }
    }

    pub fn for_loop_data(&self) -> &ForLoopData {
        match &self.kind {
            SymbolKind::ForLoop(data) => data,
            _ => unreachable!("symbol '{}' is not a for-loop sentinel", self.name),
        }
    }
}
