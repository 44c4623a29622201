//! Errors raised while resolving, compiling, or invoking a handler.

use basin_core::AppError;

#[derive(Debug)]
pub enum ScriptError {
    /// Neither a native nor a script handler file exists for this
    /// `(collection, event)` — not itself an error; callers treat it as a
    /// no-op handler. Kept distinct from `CompileFailed` for clarity at
    /// call sites that want to tell "absent" from "broken" apart.
    NotFound,
    CompileFailed { location: String, message: String },
    Runtime { location: String, message: String },
    TimedOut,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptError::NotFound => write!(f, "no handler registered"),
            ScriptError::CompileFailed { location, message } => {
                write!(f, "compile error at {location}: {message}")
            }
            ScriptError::Runtime { location, message } => {
                write!(f, "runtime error at {location}: {message}")
            }
            ScriptError::TimedOut => write!(f, "handler deadline exceeded"),
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<ScriptError> for AppError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::NotFound => AppError::handler_fault("handler not found", "bridge"),
            ScriptError::CompileFailed { location, message } => {
                AppError::handler_fault(message, location)
            }
            ScriptError::Runtime { location, message } => AppError::handler_fault(message, location),
            ScriptError::TimedOut => AppError::Timeout,
        }
    }
}
