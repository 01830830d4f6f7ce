/// A source location carried by every variable for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Loc {
    pub line: u32,
    pub col: u32,
}

impl Loc {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl std::fmt::Display for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.col)
    }
}

/// Identifies the lexical scope a variable belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScopeId(pub u32);

/// A named variable in the function IR.
///
/// Identity is `(scope, name)`; the location is informational only and does
/// not take part in equality or hashing. Variables are not SSA values: the
/// same name may be assigned in several blocks.
#[derive(Debug, Clone)]
pub struct Var {
    pub scope: ScopeId,
    pub name: String,
    pub loc: Loc,
}

impl Var {
    pub fn new(scope: ScopeId, name: impl Into<String>, loc: Loc) -> Self {
        Self {
            scope,
            name: name.into(),
            loc,
        }
    }

    /// Compiler-generated temporaries start with `$`.
    pub fn is_temp(&self) -> bool {
        self.name.starts_with('$')
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.scope == other.scope && self.name == other.name
    }
}

impl Eq for Var {}

impl std::hash::Hash for Var {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.scope.hash(state);
        self.name.hash(state);
    }
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
