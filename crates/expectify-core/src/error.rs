//! Error types and error code constants for expectify.
//!
//! This module provides a unified error type (`ExpectifyError`) that bridges
//! domain-specific errors from the engine's subsystems into a common format
//! suitable for JSON output and process exit codes.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments or configuration (bad input from caller)
//! - `3`: Resolution errors (input path not found)
//! - `4`: Apply errors (a file could not be parsed, rewritten or written)
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! ## Routine conditions
//!
//! [`ConversionContextError`] and [`ProbeExecutionError`] are expected during
//! a normal run. The engine recovers from them (declining a candidate, or
//! continuing without runtime facts) and they never become an
//! `ExpectifyError`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::rewrite::RewriteError;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output.
///
/// These codes map to CLI exit codes and appear in JSON error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad flags, invalid configuration).
    InvalidArguments = 2,
    /// Resolution errors (file not found).
    ResolutionError = 3,
    /// Apply errors (unparsable file, rewrite conflict, write failure).
    ApplyError = 4,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Per-file and per-candidate errors
// ============================================================================

/// A source file could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at {line}:{col}: {message}")]
pub struct ParseError {
    /// 1-indexed line of the first error node.
    pub line: u32,
    /// 1-indexed column of the first error node.
    pub col: u32,
    /// Short description of what was found.
    pub message: String,
}

/// A source file is not valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid UTF-8 at {line}:{col}")]
pub struct EncodingError {
    /// 1-indexed line of the first invalid byte.
    pub line: u32,
    /// 1-indexed byte column of the first invalid byte.
    pub col: u32,
}

impl EncodingError {
    /// Locate the first invalid sequence of `bytes`.
    pub fn locate(bytes: &[u8], err: &std::str::Utf8Error) -> Self {
        let valid = &bytes[..err.valid_up_to()];
        let line_start = valid
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);
        let lines = valid.iter().filter(|&&b| b == b'\n').count();
        EncodingError {
            line: u32::try_from(lines + 1).unwrap_or(u32::MAX),
            col: u32::try_from(valid.len() - line_start + 1).unwrap_or(u32::MAX),
        }
    }
}

/// Why a candidate's preconditions for conversion are not met.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionContextError {
    /// The target syntax is proven unavailable at the call site.
    #[error("`{syntax}` is not available in this context")]
    SyntaxUnavailable { syntax: &'static str },

    /// The candidate has a shape the conversion does not handle.
    #[error("unsupported form: {reason}")]
    UnsupportedForm { reason: &'static str },
}

/// The external spec run could not produce runtime facts.
#[derive(Debug, Error)]
pub enum ProbeExecutionError {
    /// The command could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish in time and was killed.
    #[error("spec run timed out after {}s", .timeout.as_secs())]
    Timeout { timeout: Duration },

    /// The run finished without leaving any fact file behind.
    #[error("no runtime facts were recorded (exit code {exit_code:?})")]
    MissingFacts { exit_code: Option<i32> },

    /// A fact file could not be decoded.
    #[error("invalid fact file {}: {message}", .path.display())]
    InvalidFacts { path: PathBuf, message: String },

    /// Sandbox preparation or cleanup failed.
    #[error("sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
#[derive(Debug, Error)]
pub enum ExpectifyError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// Invalid option combination.
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    /// An input path does not exist.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// The working tree has uncommitted changes and `--force` was not given.
    #[error("the current working tree is dirty; commit or stash changes, or use --force")]
    DirtyRepository,

    /// A file could not be parsed.
    #[error("{file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: ParseError,
    },

    /// A file is not valid UTF-8.
    #[error("{file}: {source}")]
    Encoding {
        file: String,
        #[source]
        source: EncodingError,
    },

    /// Edits for a file conflicted.
    #[error("{file}: {source}")]
    Rewrite {
        file: String,
        #[source]
        source: RewriteError,
    },

    /// Failed to write a converted file.
    #[error("apply error: {message}")]
    ApplyError { message: String, file: Option<String> },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&ExpectifyError> for OutputErrorCode {
    fn from(err: &ExpectifyError) -> Self {
        match err {
            ExpectifyError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            ExpectifyError::Configuration(_) => OutputErrorCode::InvalidArguments,
            ExpectifyError::DirtyRepository => OutputErrorCode::InvalidArguments,
            ExpectifyError::FileNotFound { .. } => OutputErrorCode::ResolutionError,
            ExpectifyError::Parse { .. } => OutputErrorCode::ApplyError,
            ExpectifyError::Encoding { .. } => OutputErrorCode::ApplyError,
            ExpectifyError::Rewrite { .. } => OutputErrorCode::ApplyError,
            ExpectifyError::ApplyError { .. } => OutputErrorCode::ApplyError,
            ExpectifyError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<ExpectifyError> for OutputErrorCode {
    fn from(err: ExpectifyError) -> Self {
        OutputErrorCode::from(&err)
    }
}

impl From<std::io::Error> for ExpectifyError {
    fn from(err: std::io::Error) -> Self {
        ExpectifyError::InternalError {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<serde_json::Error> for ExpectifyError {
    fn from(err: serde_json::Error) -> Self {
        ExpectifyError::InternalError {
            message: format!("JSON error: {}", err),
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl ExpectifyError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        ExpectifyError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        ExpectifyError::FileNotFound { path: path.into() }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ExpectifyError::InternalError {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::Span;

    mod error_code_mapping {
        use super::*;

        #[test]
        fn invalid_arguments_maps_to_invalid_arguments() {
            let err = ExpectifyError::invalid_args("unknown type `foo`");
            assert_eq!(
                OutputErrorCode::from(&err),
                OutputErrorCode::InvalidArguments
            );
            assert_eq!(err.error_code().code(), 2);
        }

        #[test]
        fn configuration_maps_to_invalid_arguments() {
            let err = ExpectifyError::from(ConfigurationError::EmptyCommand);
            assert_eq!(err.error_code(), OutputErrorCode::InvalidArguments);
        }

        #[test]
        fn file_not_found_maps_to_resolution_error() {
            let err = ExpectifyError::file_not_found("spec/missing_spec.rb");
            assert_eq!(
                OutputErrorCode::from(&err),
                OutputErrorCode::ResolutionError
            );
            assert_eq!(err.error_code().code(), 3);
        }

        #[test]
        fn parse_and_rewrite_map_to_apply_error() {
            let parse = ExpectifyError::Parse {
                file: "a_spec.rb".to_string(),
                source: ParseError {
                    line: 3,
                    col: 1,
                    message: "unexpected `end`".to_string(),
                },
            };
            let rewrite = ExpectifyError::Rewrite {
                file: "a_spec.rb".to_string(),
                source: RewriteError::OutOfBounds {
                    span: Span::new(0, 9),
                    source_len: 4,
                },
            };
            assert_eq!(parse.error_code().code(), 4);
            assert_eq!(rewrite.error_code().code(), 4);
        }

        #[test]
        fn internal_error_maps_to_internal_error() {
            let err = ExpectifyError::internal("unexpected state");
            assert_eq!(OutputErrorCode::from(&err), OutputErrorCode::InternalError);
            assert_eq!(err.error_code().code(), 10);
        }

        #[test]
        fn io_error_bridges_to_internal() {
            let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
            let err = ExpectifyError::from(io);
            assert_eq!(err.error_code(), OutputErrorCode::InternalError);
        }
    }

    mod error_display {
        use super::*;

        #[test]
        fn parse_error_display() {
            let err = ExpectifyError::Parse {
                file: "spec/a_spec.rb".to_string(),
                source: ParseError {
                    line: 2,
                    col: 5,
                    message: "unexpected token".to_string(),
                },
            };
            assert_eq!(
                err.to_string(),
                "spec/a_spec.rb: syntax error at 2:5: unexpected token"
            );
        }

        #[test]
        #[allow(invalid_from_utf8)]
        fn encoding_error_points_at_first_invalid_byte() {
            let bytes = b"ok\nab\xe9\n";
            let utf8 = std::str::from_utf8(bytes).unwrap_err();
            let err = ExpectifyError::Encoding {
                file: "spec/b_spec.rb".to_string(),
                source: EncodingError::locate(bytes, &utf8),
            };
            assert_eq!(err.to_string(), "spec/b_spec.rb: invalid UTF-8 at 2:3");
            assert_eq!(err.error_code(), OutputErrorCode::ApplyError);
        }

        #[test]
        fn context_error_display() {
            let err = ConversionContextError::SyntaxUnavailable { syntax: "expect" };
            assert_eq!(err.to_string(), "`expect` is not available in this context");
        }

        #[test]
        fn probe_timeout_display() {
            let err = ProbeExecutionError::Timeout {
                timeout: Duration::from_secs(300),
            };
            assert_eq!(err.to_string(), "spec run timed out after 300s");
        }
    }

    mod output_error_code {
        use super::*;

        #[test]
        fn code_values_are_stable() {
            assert_eq!(OutputErrorCode::InvalidArguments.code(), 2);
            assert_eq!(OutputErrorCode::ResolutionError.code(), 3);
            assert_eq!(OutputErrorCode::ApplyError.code(), 4);
            assert_eq!(OutputErrorCode::InternalError.code(), 10);
        }

        #[test]
        fn display_shows_code() {
            assert_eq!(format!("{}", OutputErrorCode::InvalidArguments), "2");
            assert_eq!(format!("{}", OutputErrorCode::InternalError), "10");
        }
    }
}
