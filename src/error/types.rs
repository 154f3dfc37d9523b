use thiserror::Error;

/// Unified result type for the builder core.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the builder core.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("component `{0}` not found")]
    ComponentNotFound(String),
    #[error("action `{0}` not found")]
    ActionNotFound(String),
    #[error("dispatch cascade exceeded {0} follow-up actions")]
    CascadeOverflow(usize),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("prop path error: {0}")]
    Path(#[from] PathError),
    #[error("grid error: {0}")]
    Grid(#[from] GridError),
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
    #[error("widget command error: {0}")]
    Command(#[from] CommandError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures while parsing or applying a typed prop path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty prop path")]
    Empty,
    #[error("malformed prop path `{0}`")]
    Malformed(String),
    #[error("cannot descend into scalar at `{0}`")]
    NotAContainer(String),
    #[error("index {index} at `{path}` is too far past the end of the list")]
    IndexOutOfRange { path: String, index: usize },
}

/// Grid placement failures. Reflow itself never fails; these come from
/// validating incoming geometry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("`{0}` has a zero-sized rectangle")]
    ZeroSized(String),
    #[error("`{a}` overlaps `{b}`")]
    Overlap { a: String, b: String },
}

/// Failures raised by the binding expression evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("`{0}` is not defined")]
    UnresolvedReference(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("cyclic dependency through {0:?}")]
    Cycle(Vec<String>),
}

/// Rejected controllable-widget commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("protocol version {found} is not supported (expected {expected})")]
    Version { expected: u32, found: u32 },
    #[error("{widget} does not support `{command}`")]
    Unsupported { widget: String, command: String },
    #[error("no view keyed `{0}`")]
    UnknownKey(String),
    #[error("index {index} is out of range for {len} entries")]
    OutOfRange { index: usize, len: usize },
}
