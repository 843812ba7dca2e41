//! Error type shared by the scripting runtime

use std::any::Any;

/// Errors produced while declaring, loading or running scripts
///
/// Lifecycle failures never escape the component: they are converted into
/// `error` notifications and the offending instance is disabled.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("script name '{0}' is reserved, please change script name")]
    ReservedName(String),

    #[error("invalid script name '{0}'")]
    InvalidName(String),

    #[error("{0}")]
    Runtime(String),

    #[error("script panicked: {0}")]
    Panic(String),

    #[error("failed to read script file '{path}': {message}")]
    Io { path: String, message: String },

    #[error("{script}:{line}:{column} - {message}")]
    Compile {
        script: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("attribute declaration error at line {line}: {message}")]
    Declaration { line: usize, message: String },

    #[error("attribute conversion failed: {0}")]
    Conversion(String),
}

impl ScriptError {
    /// Convenience constructor for callback failures
    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime(message.into())
    }

    /// Build an error from a panic payload captured by `catch_unwind`
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        ScriptError::Panic(message)
    }
}
