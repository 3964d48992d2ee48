//! Conversion records and run report.
//!
//! Each successful conversion contributes one [`ConversionRecord`]. Files are
//! processed independently and their record lists are merged afterwards in
//! path order, so the report is deterministic regardless of scheduling.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A `(before, after)` sample describing one conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub original: String,
    pub converted: String,
}

impl ConversionRecord {
    pub fn new(original: impl Into<String>, converted: impl Into<String>) -> Self {
        ConversionRecord {
            original: original.into(),
            converted: converted.into(),
        }
    }
}

impl fmt::Display for ConversionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` -> `{}`", self.original, self.converted)
    }
}

/// Records produced for one file, in source position order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecords {
    pub path: String,
    pub records: Vec<ConversionRecord>,
}

/// One line of the grouped summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub original: String,
    pub converted: String,
    pub count: usize,
}

/// Ordered records for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    records: Vec<ConversionRecord>,
}

impl Report {
    /// Merge per-file record lists in path order.
    pub fn merge(mut files: Vec<FileRecords>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Report {
            records: files.into_iter().flat_map(|file| file.records).collect(),
        }
    }

    /// All records, file-then-position order.
    pub fn records(&self) -> &[ConversionRecord] {
        &self.records
    }

    /// Number of conversions.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing was converted.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Identical records grouped with counts, most frequent first; equal
    /// counts keep first-occurrence order.
    pub fn summary(&self) -> Vec<SummaryEntry> {
        let mut index: HashMap<&ConversionRecord, usize> = HashMap::new();
        let mut entries: Vec<SummaryEntry> = Vec::new();

        for record in &self.records {
            match index.get(record) {
                Some(&i) => entries[i].count += 1,
                None => {
                    index.insert(record, entries.len());
                    entries.push(SummaryEntry {
                        original: record.original.clone(),
                        converted: record.converted.clone(),
                        count: 1,
                    });
                }
            }
        }

        entries.sort_by(|a, b| b.count.cmp(&a.count));
        entries
    }
}

// ============================================================================
// Tests
// ============================================================================
