//! Schema error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that exclude a schema document at load time.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Schema file or directory could not be read.
    #[error("failed to read schema '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document is not valid YAML or has the wrong shape.
    #[error("failed to parse schema '{source_name}': {source}")]
    Parse {
        source_name: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Document parsed but failed validation.
    #[error("invalid schema '{source_name}': {}", .diagnostics.join("; "))]
    Invalid {
        source_name: String,
        diagnostics: Vec<String>,
    },
}

impl SchemaError {
    /// Validation messages, empty for I/O and parse failures.
    pub fn diagnostics(&self) -> &[String] {
        match self {
            Self::Invalid { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}
