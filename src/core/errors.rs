//! Error types for the speclens library.
//!
//! Library failures (unreadable files, malformed source, bad configuration,
//! corrupt artifacts) are reported through [`SpecLensError`]. Errors raised
//! *inside* the embedded runtime while fuzzing a unit are not library failures;
//! they live in [`crate::runtime::RuntimeError`] and become labels.

use std::io;
use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

/// Main result type for speclens operations.
pub type Result<T> = std::result::Result<T, SpecLensError>;

/// Error type for all speclens operations.
#[derive(Error, Debug)]
pub enum SpecLensError {
    /// I/O related errors (file operations, artifact writes, etc.)
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable error message
        message: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error description
        message: String,
        /// Configuration field that caused the error
        field: Option<String>,
    },

    /// Source text could not be parsed
    #[error("Parse error in {language}: {message}")]
    Parse {
        /// Language being parsed
        language: String,
        /// Error description
        message: String,
        /// File path where error occurred
        file_path: Option<String>,
        /// Line number (1-based, if available)
        line: Option<usize>,
        /// Column number (1-based, if available)
        column: Option<usize>,
    },

    /// A source file could not be executed as a module by the embedded runtime
    #[error("Failed to load module '{module}': {message}")]
    Load {
        /// Module (file stem) being loaded
        module: String,
        /// Error description
        message: String,
    },

    /// Classifier and artifact errors
    #[error("Model error: {message}")]
    Model {
        /// Error description
        message: String,
        /// Artifact path or name involved
        artifact: Option<String>,
    },

    /// Tabular dataset errors
    #[error("Dataset error: {message}")]
    Dataset {
        /// Error description
        message: String,
        /// 1-based row number (header is row 1)
        row: Option<usize>,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error description
        message: String,
        /// Data type being serialized
        data_type: Option<String>,
        /// Underlying serialization error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors for input data
    #[error("Validation error: {message}")]
    Validation {
        /// Error description
        message: String,
        /// Field or input that failed validation
        field: Option<String>,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal {
        /// Error description
        message: String,
        /// Additional context
        context: Option<String>,
    },
}

impl SpecLensError {
    /// Create a new I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new configuration error with field context
    pub fn config_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new parse error
    pub fn parse(language: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            language: language.into(),
            message: message.into(),
            file_path: None,
            line: None,
            column: None,
        }
    }

    /// Create a new parse error with file context
    pub fn parse_with_location(
        language: impl Into<String>,
        message: impl Into<String>,
        file_path: impl Into<String>,
        line: Option<usize>,
        column: Option<usize>,
    ) -> Self {
        Self::Parse {
            language: language.into(),
            message: message.into(),
            file_path: Some(file_path.into()),
            line,
            column,
        }
    }

    /// Create a new module load error
    pub fn load(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Create a new model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
            artifact: None,
        }
    }

    /// Create a new model error naming the artifact involved
    pub fn model_artifact(message: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
            artifact: Some(artifact.into()),
        }
    }

    /// Create a new dataset error
    pub fn dataset(message: impl Into<String>) -> Self {
        Self::Dataset {
            message: message.into(),
            row: None,
        }
    }

    /// Create a new dataset error pointing at a row
    pub fn dataset_row(message: impl Into<String>, row: usize) -> Self {
        Self::Dataset {
            message: message.into(),
            row: Some(row),
        }
    }

    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new validation error with field context
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            context: None,
        }
    }

    /// Add context to an existing error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        match &mut self {
            Self::Internal { context: ctx, .. } => {
                *ctx = Some(context.into());
            }
            Self::Io { message, .. }
            | Self::Model { message, .. }
            | Self::Dataset { message, .. } => {
                *message = format!("{}: {}", context.into(), message);
            }
            _ => {}
        }
        self
    }
}

impl From<io::Error> for SpecLensError {
    fn from(err: io::Error) -> Self {
        Self::io("I/O operation failed", err)
    }
}

impl From<serde_json::Error> for SpecLensError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: format!("JSON serialization failed: {err}"),
            data_type: Some("JSON".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml::Error> for SpecLensError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: format!("YAML serialization failed: {err}"),
            data_type: Some("YAML".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<ParseIntError> for SpecLensError {
    fn from(err: ParseIntError) -> Self {
        Self::validation(format!("Invalid integer: {err}"))
    }
}

impl From<ParseFloatError> for SpecLensError {
    fn from(err: ParseFloatError) -> Self {
        Self::validation(format!("Invalid float: {err}"))
    }
}

/// Result extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error result
    fn context(self, msg: &'static str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<SpecLensError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }

    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| e.into().with_context(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SpecLensError::config("Invalid configuration");
        assert!(matches!(err, SpecLensError::Config { .. }));

        let err = SpecLensError::parse("python", "Syntax error");
        assert!(matches!(err, SpecLensError::Parse { .. }));
    }

    #[test]
    fn test_internal_error_with_context() {
        let err = SpecLensError::internal("Something went wrong").with_context("During labelling");

        if let SpecLensError::Internal { context, .. } = err {
            assert_eq!(context, Some("During labelling".to_string()));
        } else {
            panic!("Expected Internal error");
        }
    }

    #[test]
    fn test_io_context_prefixes_message() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));

        let err = result.context("Failed to read dataset").unwrap_err();
        assert!(err.to_string().contains("Failed to read dataset"));
    }

    #[test]
    fn test_parse_with_location() {
        let err = SpecLensError::parse_with_location(
            "python",
            "unexpected token",
            "broken.py",
            Some(3),
            Some(7),
        );

        if let SpecLensError::Parse {
            language,
            file_path,
            line,
            column,
            ..
        } = err
        {
            assert_eq!(language, "python");
            assert_eq!(file_path.as_deref(), Some("broken.py"));
            assert_eq!(line, Some(3));
            assert_eq!(column, Some(7));
        } else {
            panic!("Expected Parse error");
        }
    }

    #[test]
    fn test_from_parse_int_error() {
        let err: SpecLensError = "abc".parse::<i32>().unwrap_err().into();
        assert!(matches!(err, SpecLensError::Validation { .. }));
    }
}
