//! Error types for promptvault-core
//!
//! This module defines the error taxonomy shared by the backends, the watcher
//! and the sync engine. Messages are phrased so they can be shown to the user
//! as-is through the command surface.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for promptvault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Main error type for promptvault
#[derive(Debug, Error)]
pub enum VaultError {
    /// Illegal sync-mode transition or missing required input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Directory unreadable or missing
    #[error("Cannot access '{}': {reason}", path.display())]
    Access { path: PathBuf, reason: String },

    /// A single prompt file could not be parsed
    #[error("Failed to parse '{}': {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// Secondary backend write failed
    #[error("Replication error: {0}")]
    Replication(String),

    /// Mutation target id absent
    #[error("Prompt not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Frontmatter serialization/deserialization error
    #[error("Frontmatter error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Native filesystem watch error
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Command not found in registry
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    /// Invalid command arguments
    #[error("Invalid arguments for command '{command}': {reason}")]
    InvalidArgs { command: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error (catch-all)
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for VaultError {
    fn from(err: anyhow::Error) -> Self {
        VaultError::Other(err.to_string())
    }
}

impl From<String> for VaultError {
    fn from(err: String) -> Self {
        VaultError::Other(err)
    }
}

impl From<&str> for VaultError {
    fn from(err: &str) -> Self {
        VaultError::Other(err.to_string())
    }
}

impl VaultError {
    /// Build an access error for a directory path
    pub fn access(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        VaultError::Access {
            path:   path.into(),
            reason: reason.to_string(),
        }
    }

    /// Get user-friendly error message for display in the UI
    pub fn user_message(&self) -> String {
        match self {
            VaultError::Access { path, reason } => {
                format!(
                    "The prompt folder '{}' cannot be read ({}). Reattach it or detach to use the app library.",
                    path.display(),
                    reason
                )
            },
            VaultError::CommandNotFound(cmd) => {
                format!("Command '{}' not found.", cmd)
            },
            VaultError::InvalidArgs { command, reason } => {
                format!("Invalid arguments for '{}': {}", command, reason)
            },
            VaultError::Database(err) => {
                format!("Database error: {}", err)
            },
            _ => self.to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            VaultError::Validation(_) => "validation",
            VaultError::Access { .. } => "access",
            VaultError::Parse { .. } => "parse",
            VaultError::Replication(_) => "replication",
            VaultError::NotFound(_) => "not_found",
            VaultError::Database(_) => "database",
            VaultError::Io(_) => "io",
            VaultError::Serde(_) => "serialization",
            VaultError::Yaml(_) => "frontmatter",
            VaultError::Watch(_) => "watch",
            VaultError::CommandNotFound(_) => "command",
            VaultError::InvalidArgs { .. } => "arguments",
            VaultError::Config(_) => "config",
            VaultError::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VaultError::NotFound("abc".to_string());
        assert_eq!(err.to_string(), "Prompt not found: abc");
    }

    #[test]
    fn test_access_user_message_names_path() {
        let err = VaultError::access("/tmp/prompts", "No such file or directory");
        let msg = err.user_message();
        assert!(msg.contains("/tmp/prompts"));
        assert!(msg.contains("No such file"));
    }

    #[test]
    fn test_error_category() {
        assert_eq!(VaultError::Validation("x".into()).category(), "validation");
        assert_eq!(VaultError::access("/x", "gone").category(), "access");
        assert_eq!(
            VaultError::InvalidArgs {
                command: "test".to_string(),
                reason:  "bad".to_string(),
            }
            .category(),
            "arguments"
        );
    }

    #[test]
    fn test_from_string() {
        let err: VaultError = "test error".into();
        assert_eq!(err.to_string(), "test error");
    }
}
