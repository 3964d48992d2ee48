//! JSON output types for the CLI.
//!
//! Every invocation in `--format json` mode prints exactly one document:
//! a [`RunResponse`] on success (including runs where some files failed) or
//! an [`ErrorResponse`] when the run could not start.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{ExpectifyError, OutputErrorCode};
use crate::report::SummaryEntry;

/// Schema version of the JSON documents.
pub const SCHEMA_VERSION: &str = "1";

/// Outcome of the dynamic analysis phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// The spec run finished and facts were collected.
    Completed { facts: usize },
    /// Dynamic analysis was not requested or there was nothing to probe.
    Skipped,
    /// The spec run failed; all decisions used static information.
    Failed { message: String },
}

/// What happened to one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Converted,
    Unchanged,
    Failed,
}

/// Per-file entry of a [`RunResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub path: String,
    pub status: FileStatus,
    /// Number of conversions applied to the file.
    pub conversions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Error payload shared by file outcomes and error responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code (see [`OutputErrorCode`]).
    pub code: u8,
    pub message: String,
    /// 1-indexed `(line, col)` when the error points into a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub col: Option<u32>,
}

impl ErrorInfo {
    /// Create from an ExpectifyError.
    pub fn from_error(err: &ExpectifyError) -> Self {
        let (line, col) = match err {
            ExpectifyError::Parse { source, .. } => (Some(source.line), Some(source.col)),
            ExpectifyError::Encoding { source, .. } => (Some(source.line), Some(source.col)),
            _ => (None, None),
        };
        ErrorInfo {
            code: OutputErrorCode::from(err).code(),
            message: err.to_string(),
            line,
            col,
        }
    }
}

/// Successful run document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    /// Status: "ok".
    pub status: String,
    pub schema_version: String,
    /// RFC 3339 timestamp of the run.
    pub timestamp: String,
    pub dynamic_analysis: AnalysisStatus,
    /// Total number of conversions.
    pub conversions: usize,
    pub summary: Vec<SummaryEntry>,
    pub files: Vec<FileOutcome>,
    /// Path of the generated commit message, if one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_message_path: Option<String>,
}

impl RunResponse {
    pub fn new(
        timestamp: impl Into<String>,
        dynamic_analysis: AnalysisStatus,
        summary: Vec<SummaryEntry>,
        files: Vec<FileOutcome>,
    ) -> Self {
        RunResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: timestamp.into(),
            dynamic_analysis,
            conversions: files.iter().map(|f| f.conversions).sum(),
            summary,
            files,
            commit_message_path: None,
        }
    }

    /// Whether any file failed to parse or rewrite.
    pub fn has_failures(&self) -> bool {
        self.files.iter().any(|f| f.status == FileStatus::Failed)
    }
}

/// Document printed when a run cannot start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Status: "error".
    pub status: String,
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    /// Create an error response from an ExpectifyError.
    pub fn from_error(err: &ExpectifyError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

/// Emit a response as pretty-printed JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;

    fn outcome(path: &str, status: FileStatus, conversions: usize) -> FileOutcome {
        FileOutcome {
            path: path.to_string(),
            status,
            conversions,
            error: None,
        }
    }

    #[test]
    fn run_response_counts_conversions() {
        let response = RunResponse::new(
            "2026-01-01T00:00:00+00:00",
            AnalysisStatus::Skipped,
            vec![],
            vec![
                outcome("a.rb", FileStatus::Converted, 3),
                outcome("b.rb", FileStatus::Unchanged, 0),
            ],
        );
        assert_eq!(response.conversions, 3);
        assert!(!response.has_failures());
    }

    #[test]
    fn run_response_json_shape() {
        let response = RunResponse::new(
            "2026-01-01T00:00:00+00:00",
            AnalysisStatus::Completed { facts: 7 },
            vec![],
            vec![outcome("a.rb", FileStatus::Failed, 0)],
        );
        let json: serde_json::Value = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["dynamic_analysis"]["state"], "completed");
        assert_eq!(json["dynamic_analysis"]["facts"], 7);
        assert_eq!(json["files"][0]["status"], "failed");
        assert!(json.get("commit_message_path").is_none());
        assert!(response.has_failures());
    }

    #[test]
    fn parse_error_info_has_location() {
        let err = ExpectifyError::Parse {
            file: "a_spec.rb".to_string(),
            source: ParseError {
                line: 4,
                col: 2,
                message: "unexpected `end`".to_string(),
            },
        };
        let info = ErrorInfo::from_error(&err);
        assert_eq!(info.code, 4);
        assert_eq!(info.line, Some(4));
        assert_eq!(info.col, Some(2));
    }

    #[test]
    fn error_response_serializes() {
        let err = ExpectifyError::file_not_found("spec");
        let mut buf = Vec::new();
        emit_response(&ErrorResponse::from_error(&err), &mut buf).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["code"], 3);
        assert_eq!(json["error"]["message"], "file not found: spec");
    }
}
