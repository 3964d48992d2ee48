//! Per-run conversion engine.
//!
//! A run has three phases:
//!
//! 1. **Analyze** (parallel, per file): parse, detect constructs, collect
//!    probe requests.
//! 2. **Dynamic analysis** (once): instrument the files that have probes and
//!    hand the batch to a [`FactProvider`]. Skipped when configured, when
//!    there is no provider, or when nothing needs probing. A failing run
//!    degrades to "no facts".
//! 3. **Convert** (parallel, per file): plan each construct in source order,
//!    feed the edits to a [`Rewriter`], and materialize the output.
//!
//! Files never share mutable state; per-file records are merged into one
//! [`Report`] in path order afterwards.

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use expectify_core::config::Configuration;
use expectify_core::error::{EncodingError, ParseError};
use expectify_core::facts::{FactTable, FileFacts};
use expectify_core::output::AnalysisStatus;
use expectify_core::patch::EditOrigin;
use expectify_core::report::{ConversionRecord, FileRecords, Report};
use expectify_core::rewrite::{RewriteError, Rewriter};

use crate::construct::{self, Construct, Declined, PlanContext};
use crate::dynamic::{self, FactProvider, ProbeBatch, ProbeRequest};
use crate::tree::SyntaxTree;

/// One input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the project root.
    pub path: String,
    /// Decoded content, or where decoding failed.
    pub content: Result<String, EncodingError>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        SourceFile {
            path: path.into(),
            content: Ok(content.into()),
        }
    }

    /// A file read from disk; invalid UTF-8 is kept as a per-file error.
    pub fn from_bytes(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        let content = String::from_utf8(bytes)
            .map_err(|e| EncodingError::locate(e.as_bytes(), &e.utf8_error()));
        SourceFile {
            path: path.into(),
            content,
        }
    }
}

/// Result of converting one parsed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedFile {
    pub output: String,
    /// Records in source position order.
    pub records: Vec<ConversionRecord>,
    pub changed: bool,
}

/// Why a file could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileFailure {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}

/// Outcome for one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConversion {
    pub path: String,
    /// Content as read; empty when it could not be decoded.
    pub original: String,
    pub result: Result<ConvertedFile, FileFailure>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// One entry per input file, sorted by path.
    pub files: Vec<FileConversion>,
    pub report: Report,
    pub analysis: AnalysisStatus,
}

/// A parsed file with its constructs and probe requests.
#[derive(Debug)]
pub struct AnalyzedFile {
    pub tree: SyntaxTree,
    pub constructs: Vec<Construct>,
    pub probes: Vec<ProbeRequest>,
}

/// Parse `source` and detect its constructs.
pub fn analyze(source: &str) -> Result<AnalyzedFile, ParseError> {
    let tree = SyntaxTree::parse(source)?;
    let constructs = construct::detect(&tree);
    let probes = construct::collect_probes(&tree, &constructs).into_requests();
    Ok(AnalyzedFile {
        tree,
        constructs,
        probes,
    })
}

/// Plan every construct of `file` and apply the accepted edits.
pub fn convert(
    file: &AnalyzedFile,
    config: &Configuration,
    facts: Option<&FileFacts>,
) -> Result<ConvertedFile, RewriteError> {
    let tree = &file.tree;
    let mut cx = PlanContext::new(tree, config, facts);
    let mut rewriter = Rewriter::new(tree.source());
    let mut records = Vec::new();

    for (index, construct) in file.constructs.iter().enumerate() {
        let line = tree.node(construct.node()).line;
        let planned = if cx.is_enclosed(construct.node()) {
            Err(Declined::EnclosedByRewrite)
        } else {
            construct.plan(&cx)
        };
        let plan = match planned {
            Ok(plan) => plan,
            Err(reason) => {
                debug!(construct = construct.name(), line, %reason, "declined");
                continue;
            }
        };

        let scope = tree.span(construct.scope(tree));
        let origin = EditOrigin {
            index,
            construct: construct.name(),
        };
        for edit in &plan.edits {
            rewriter.add_scoped(edit.clone().with_origin(origin), scope)?;
        }
        cx.accept(&plan);
        records.extend(plan.records);
    }

    let output = rewriter.apply()?;
    Ok(ConvertedFile {
        changed: output != tree.source(),
        output,
        records,
    })
}

/// Convert `files` with `config`, consulting `provider` for runtime facts.
pub fn run(
    mut files: Vec<SourceFile>,
    config: &Configuration,
    provider: Option<&dyn FactProvider>,
) -> RunOutcome {
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);

    let analyzed: Vec<(SourceFile, Result<AnalyzedFile, FileFailure>)> = files
        .into_par_iter()
        .map(|file| {
            let analysis = match &file.content {
                Ok(content) => analyze(content).map_err(FileFailure::from),
                Err(e) => Err(FileFailure::from(e.clone())),
            };
            (file, analysis)
        })
        .collect();

    for (file, analysis) in &analyzed {
        if let Err(e) = analysis {
            warn!(file = %file.path, error = %e, "skipping unreadable file");
        }
    }
    let candidates: usize = analyzed
        .iter()
        .filter_map(|(_, a)| a.as_ref().ok())
        .map(|a| a.constructs.len())
        .sum();
    info!(files = analyzed.len(), candidates, "analyzed spec files");

    let (facts, analysis) = collect_facts(&analyzed, config, provider);

    let files: Vec<FileConversion> = analyzed
        .into_par_iter()
        .map(|(file, analysis)| {
            let result = analysis.and_then(|analyzed| {
                convert(&analyzed, config, facts.for_file(&file.path)).map_err(FileFailure::from)
            });
            if let Err(FileFailure::Rewrite(e)) = &result {
                warn!(file = %file.path, error = %e, "conversion failed");
            }
            FileConversion {
                path: file.path,
                original: file.content.unwrap_or_default(),
                result,
            }
        })
        .collect();

    let report = Report::merge(
        files
            .iter()
            .filter_map(|f| {
                f.result.as_ref().ok().map(|converted| FileRecords {
                    path: f.path.clone(),
                    records: converted.records.clone(),
                })
            })
            .collect(),
    );
    info!(conversions = report.len(), "conversion finished");

    RunOutcome {
        files,
        report,
        analysis,
    }
}

fn collect_facts(
    analyzed: &[(SourceFile, Result<AnalyzedFile, FileFailure>)],
    config: &Configuration,
    provider: Option<&dyn FactProvider>,
) -> (FactTable, AnalysisStatus) {
    let provider = match provider {
        Some(provider) if !config.skip_dynamic_analysis => provider,
        _ => return (FactTable::new(), AnalysisStatus::Skipped),
    };

    let batch = ProbeBatch {
        files: analyzed
            .iter()
            .filter_map(|(file, analysis)| {
                let analysis = analysis.as_ref().ok()?;
                if analysis.probes.is_empty() {
                    return None;
                }
                dynamic::instrument(&analysis.tree, &file.path, &analysis.probes)
            })
            .collect(),
    };
    if batch.is_empty() {
        debug!("nothing to probe");
        return (FactTable::new(), AnalysisStatus::Skipped);
    }

    match provider.collect(&batch) {
        Ok(facts) => {
            info!(facts = facts.len(), "dynamic analysis completed");
            let status = AnalysisStatus::Completed { facts: facts.len() };
            (facts, status)
        }
        Err(e) => {
            warn!(error = %e, "dynamic analysis failed; continuing with static analysis only");
            (
                FactTable::new(),
                AnalysisStatus::Failed {
                    message: e.to_string(),
                },
            )
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
