//! Ruby support for expectify.
//!
//! This crate detects legacy RSpec syntax in Ruby spec files and plans the
//! edits that move it to the `expect`/`allow` syntax. It includes:
//! - Concrete syntax tree construction on top of tree-sitter-ruby
//! - Static context analysis (is `expect` callable here?)
//! - One conversion per legacy construct, dispatched through [`construct::Construct`]
//! - Probe instrumentation and the sandboxed spec run that answers runtime questions
//! - The per-run engine and spec file collection

pub mod call;
pub mod construct;
pub mod context;
pub mod dynamic;
pub mod engine;
pub mod files;
pub mod tree;

pub use engine::{run, ConvertedFile, FileConversion, FileFailure, RunOutcome, SourceFile};
pub use tree::{NodeId, SyntaxTree};
