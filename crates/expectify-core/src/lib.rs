//! Core infrastructure for expectify.
//!
//! This crate provides the language-agnostic half of the engine:
//! - Span and edit IR, plus the single-pass rewriter
//! - Run configuration and its validation
//! - Runtime fact tables from the dynamic analysis run
//! - Conversion records and the merged run report
//! - Error types and error codes
//! - JSON output types for CLI responses
//! - Sandboxed project copies for running the suite
//! - Text position utilities

pub mod config;
pub mod error;
pub mod facts;
pub mod output;
pub mod patch;
pub mod report;
pub mod rewrite;
pub mod sandbox;
pub mod text;
