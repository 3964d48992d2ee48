//! Runtime facts recorded by the dynamic analysis run.
//!
//! A fact is addressed by `(file, node start offset, key)`. The instrumented
//! spec run writes one JSON fact file per process; [`FactTable::merge`]
//! combines them. Facts are looked up by the same address on the original,
//! uninstrumented tree; an absent fact is never invented.
//!
//! ## Fact file format
//!
//! ```json
//! {
//!   "version": 1,
//!   "facts": [
//!     { "file": "spec/a_spec.rb", "offset": 42, "key": "expect_available?", "value": true },
//!     { "file": "spec/a_spec.rb", "offset": 90, "key": "available_query_methods",
//!       "error": "NoMethodError: undefined method `methods'" }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version of the fact file format written by the probe helper.
pub const FACT_FILE_VERSION: u32 = 1;

/// One recorded probe result, as written by the probe helper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFact {
    /// Path relative to the project root.
    pub file: String,
    /// Start byte offset of the probed node in the original file.
    pub offset: usize,
    pub key: String,
    #[serde(default)]
    pub value: Value,
    /// Set when evaluating the probe raised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Top-level fact file document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactFile {
    pub version: u32,
    pub facts: Vec<RecordedFact>,
}

#[derive(Debug, Clone, PartialEq)]
enum Observation {
    Value(Value),
    Raised(String),
}

/// Facts for a single file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileFacts {
    entries: HashMap<(usize, String), Observation>,
}

impl FileFacts {
    /// The observed value, or `None` if absent or if the probe raised.
    pub fn get(&self, offset: usize, key: &str) -> Option<&Value> {
        match self.entries.get(&(offset, key.to_string()))? {
            Observation::Value(value) => Some(value),
            Observation::Raised(_) => None,
        }
    }

    /// A boolean fact.
    pub fn bool(&self, offset: usize, key: &str) -> Option<bool> {
        self.get(offset, key)?.as_bool()
    }

    /// A list-of-strings fact (symbols are recorded as strings).
    pub fn strings(&self, offset: usize, key: &str) -> Option<Vec<String>> {
        let items = self.get(offset, key)?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }

    /// The error message if the probe raised.
    pub fn raised(&self, offset: usize, key: &str) -> Option<&str> {
        match self.entries.get(&(offset, key.to_string()))? {
            Observation::Raised(message) => Some(message),
            Observation::Value(_) => None,
        }
    }

    /// Number of recorded facts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no facts were recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&mut self, offset: usize, key: String, observation: Observation) {
        // A probe inside a loop or a shared example runs many times; the
        // first observation is kept.
        self.entries.entry((offset, key)).or_insert(observation);
    }
}

/// All facts from one dynamic analysis run, grouped by file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactTable {
    files: BTreeMap<String, FileFacts>,
}

impl FactTable {
    /// Create an empty table.
    pub fn new() -> Self {
        FactTable::default()
    }

    /// Decode a fact file document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let document: FactFile = serde_json::from_str(json)?;
        let mut table = FactTable::new();
        for fact in document.facts {
            table.record(fact);
        }
        Ok(table)
    }

    /// Add one recorded fact; earlier observations win.
    pub fn record(&mut self, fact: RecordedFact) {
        let observation = match fact.error {
            Some(message) => Observation::Raised(message),
            None => Observation::Value(fact.value),
        };
        self.files
            .entry(fact.file)
            .or_default()
            .record(fact.offset, fact.key, observation);
    }

    /// Convenience for recording a successful observation.
    pub fn insert(
        &mut self,
        file: impl Into<String>,
        offset: usize,
        key: impl Into<String>,
        value: Value,
    ) {
        self.record(RecordedFact {
            file: file.into(),
            offset,
            key: key.into(),
            value,
            error: None,
        });
    }

    /// Merge another table into this one; facts already present win.
    pub fn merge(&mut self, other: FactTable) {
        for (file, facts) in other.files {
            let target = self.files.entry(file).or_default();
            for ((offset, key), observation) in facts.entries {
                target.record(offset, key, observation);
            }
        }
    }

    /// Facts for `file`, if any were recorded.
    pub fn for_file(&self, file: &str) -> Option<&FileFacts> {
        self.files.get(file)
    }

    /// Total number of facts.
    pub fn len(&self) -> usize {
        self.files.values().map(FileFacts::len).sum()
    }

    /// Check if the table holds no facts.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
