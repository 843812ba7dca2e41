//! Configuration types for the scripting runtime

use crate::error::ScriptError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Runtime configuration shared by script components and the Rhai loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptingConfig {
    /// Contain panics raised inside lifecycle callbacks
    pub catch_panics: bool,
    /// Report callback errors to the log when no `error` listener is attached
    pub report_unhandled_errors: bool,
    /// Directory holding script sources
    pub scripts_dir: PathBuf,
    /// File extension of script sources, without the dot
    pub script_extension: String,
    /// Rhai operation budget per call
    pub max_operations: u64,
    /// Rhai call stack depth limit
    pub max_call_levels: usize,
    /// Rhai expression nesting limit
    pub max_expr_depth: usize,
}

impl ScriptingConfig {
    /// Create a config that loads scripts from a custom directory
    pub fn with_scripts_dir(scripts_dir: impl Into<PathBuf>) -> Self {
        let scripts_dir = scripts_dir.into();
        debug!(scripts_dir = ?scripts_dir, "Creating ScriptingConfig");
        Self {
            scripts_dir,
            ..Self::default()
        }
    }

    /// Parse a config from JSON text; missing fields take their defaults
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Get the full path to a script source file
    pub fn script_path(&self, name: &str) -> Result<PathBuf, ScriptError> {
        // Reject path traversal
        if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
            return Err(ScriptError::InvalidName(name.to_string()));
        }
        let path = self
            .scripts_dir
            .join(format!("{name}.{}", self.script_extension));
        debug!(name = name, path = ?path, "Generated script path");
        Ok(path)
    }
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            catch_panics: true,
            report_unhandled_errors: true,
            scripts_dir: PathBuf::from("assets/scripts"),
            script_extension: "rhai".to_string(),
            max_operations: 100_000,
            max_call_levels: 50,
            max_expr_depth: 100,
        }
    }
}
