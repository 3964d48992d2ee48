//! expectify - migrate RSpec specs to the expect/allow syntax.
//!
//! This crate provides the CLI binary.
//!
//! ## Modules
//!
//! - `cli` - Conversion run driver
//! - `git` - Repository state queries
//! - `summary` - Text summary and commit message

pub mod cli;
pub mod git;
pub mod summary;

// Re-export core types for convenience
pub use expectify_core::config::{Category, Configuration};
pub use expectify_core::error::{ExpectifyError, OutputErrorCode};
pub use expectify_core::output::{ErrorResponse, RunResponse, SCHEMA_VERSION};
