use std::path::PathBuf;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Syntax error: {message}")]
    Syntax { message: String },
    #[error("Function `{name}` not defined")]
    UndefinedFunction { name: String },
    #[error("Function `{name}` expected {expected} arguments but received {received}")]
    ArityMismatch {
        name: String,
        expected: usize,
        received: usize,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Unknown command `{command}`")]
    UnknownCommand { command: String },
    #[error("Failed to load library `{name}`: {message}")]
    LibraryLoad { name: String, message: String },
    #[error("Library `{name}` not loaded")]
    LibraryNotLoaded { name: String },
    #[error("Failed to find function `{symbol}` in library `{library}`: {message}")]
    SymbolNotFound {
        library: String,
        symbol: String,
        message: String,
    },
    #[error("Library function `{symbol}` in `{library}` returned null")]
    LibraryCallFailed { library: String, symbol: String },
    #[error("Return statement outside of function")]
    ReturnOutsideFunction,
    #[error("Invalid arguments for `{command}`: {message}")]
    InvalidMemoryArguments { command: String, message: String },
    #[error("Memory ledger: {message}")]
    Memory { message: String },
    #[error("`{command}` is only available in dynamic mode")]
    DynamicModeRequired { command: String },
    #[error("FlameMemory `{name}` not found")]
    UnknownContainer { name: String },
    #[error("Key `{key}` not found in FlameMemory `{container}`")]
    MissingKey { container: String, key: String },
    #[error("Call depth limit of {depth} reached")]
    RecursionLimit { depth: usize },
    #[error("{message}")]
    ScriptHalted { message: String },
    #[error("No script loaded")]
    NoScriptLoaded,
    #[error("Could not open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to access script {stream}: {source}")]
    Stream {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl RuntimeError {
    pub fn syntax(message: impl Into<String>) -> Self {
        RuntimeError::Syntax {
            message: message.into(),
        }
    }

    /// Fatal errors unwind every active block and function body up to the
    /// top-level run loop; everything else is reported and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeError::ReturnOutsideFunction | RuntimeError::ScriptHalted { .. }
        )
    }
}
