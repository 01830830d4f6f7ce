use thiserror::Error;

use crate::ir::Loc;

/// Top-level error type for the middle-end.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}", format_error_pretty("rewrite error", &.0.to_string()))]
    Pass(#[from] PassError),

    #[error("{}", format_error_pretty("lowering error", &.0.to_string()))]
    Lower(#[from] LowerError),

    #[error("{}", format_error_pretty("codegen error", &.0.to_string()))]
    Codegen(#[from] CodegenError),

    #[error("{}", format_error_pretty("runtime error", &.0.to_string()))]
    Runtime(#[from] RuntimeError),

    #[error("{}", format_error_pretty("catalog error", &.0.to_string()))]
    Catalog(#[from] CatalogError),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

fn format_error_pretty(category: &str, msg: &str) -> String {
    format!("[{}] {}", category, msg)
}

// ---------------------------------------------------------------------------
// Rewrite-pass errors. All of them abort compiling the enclosing function.
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PassError {
    #[error("in function '{func}' at {loc}: cannot determine the element type and rank of '{var}': {reason}. Declare its type explicitly")]
    TypeUnresolved {
        func: String,
        var: String,
        loc: Loc,
        reason: String,
    },

    #[error("in function '{func}' at {loc}: unsupported file operation: {detail}")]
    UnsupportedOperation {
        func: String,
        detail: String,
        loc: Loc,
    },

    #[error("in function '{func}' at {loc}: '{call}' requires the '{arg}' argument")]
    MissingRequiredArgument {
        func: String,
        call: String,
        arg: String,
        loc: Loc,
    },
}

impl PassError {
    /// Source location of the offending statement.
    pub fn loc(&self) -> Loc {
        match self {
            PassError::TypeUnresolved { loc, .. }
            | PassError::UnsupportedOperation { loc, .. }
            | PassError::MissingRequiredArgument { loc, .. } => *loc,
        }
    }
}

// ---------------------------------------------------------------------------
// Distributed lowering errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LowerError {
    #[error("'{primitive}' has no native entry point for values of type '{ty}'")]
    UnsupportedType { primitive: &'static str, ty: String },

    #[error("invalid operand for '{primitive}': {detail}")]
    InvalidOperand {
        primitive: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

// ---------------------------------------------------------------------------
// Codegen errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("symbol '{symbol}' already declared as '{existing}', cannot redeclare as '{requested}'")]
    SignatureConflict {
        symbol: String,
        existing: String,
        requested: String,
    },

    #[error("function '{0}' is already defined in this module")]
    DuplicateDefinition(String),

    #[error("formatting failed while writing LLVM text")]
    Fmt(#[from] std::fmt::Error),
}

// ---------------------------------------------------------------------------
// Runtime errors (reference runtime and interpreter)
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("native call '{entry}' failed with status {status}")]
    CallFailed { entry: &'static str, status: i64 },

    #[error("unknown handle {0}")]
    UnknownHandle(i64),

    #[error("collective mismatch on rank {rank}: {detail}")]
    CollectiveMismatch { rank: i32, detail: String },

    #[error("variable '{0}' used before assignment")]
    UndefinedVariable(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("not supported by the interpreter: {0}")]
    Unsupported(String),
}

// ---------------------------------------------------------------------------
// Compile-time dataset introspection errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot open source '{0}' for inspection")]
    SourceNotFound(String),

    #[error("source '{source_name}' has no dataset '{dataset}'")]
    DatasetNotFound {
        source_name: String,
        dataset: String,
    },

    #[error("malformed catalog description: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl Error {
    /// Returns a stable diagnostic code for this error.
    pub fn diagnostic_code(&self) -> &'static str {
        match self {
            Error::Pass(p) => match p {
                PassError::TypeUnresolved { .. } => "E0100",
                PassError::UnsupportedOperation { .. } => "E0101",
                PassError::MissingRequiredArgument { .. } => "E0102",
            },
            Error::Lower(l) => match l {
                LowerError::UnsupportedType { .. } => "E0200",
                LowerError::InvalidOperand { .. } => "E0201",
                LowerError::Codegen(_) => "E0300",
            },
            Error::Codegen(_) => "E0300",
            Error::Runtime(RuntimeError::CallFailed { .. }) => "E0400",
            Error::Runtime(_) => "E0401",
            Error::Catalog(_) => "E0500",
            Error::Config(_) => "E0600",
        }
    }
}
