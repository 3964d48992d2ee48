//! Run configuration.
//!
//! [`Configuration`] is built once by the caller (the CLI maps its flags onto
//! it), validated, and then passed by reference into every conversion. The
//! engine never mutates it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default command used to run the suite for dynamic analysis.
pub const DEFAULT_RSPEC_COMMAND: &str = "bundle exec rspec";

/// Default upper bound for the dynamic analysis run.
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(300);

/// A group of conversions that can be left untouched with `--keep`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// `obj.should matcher`
    Should,
    /// `obj.should_receive(:message)`
    ShouldReceive,
    /// `obj.stub(:message)`
    Stub,
    /// `have(n).items`
    HaveItems,
    /// Deprecated aliases: `mock`, `stub!`, `be_true`, ...
    Deprecated,
}

impl Category {
    /// All categories, in declaration order.
    pub const ALL: [Category; 5] = [
        Category::Should,
        Category::ShouldReceive,
        Category::Stub,
        Category::HaveItems,
        Category::Deprecated,
    ];

    /// Name used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Category::Should => "should",
            Category::ShouldReceive => "should_receive",
            Category::Stub => "stub",
            Category::HaveItems => "have_items",
            Category::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.name() == s)
            .ok_or_else(|| ConfigurationError::UnknownCategory(s.to_string()))
    }
}

/// Negative form of the `to` keyword.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeForm {
    #[default]
    NotTo,
    ToNot,
}

impl NegativeForm {
    /// The keyword as it appears in converted code.
    pub fn keyword(self) -> &'static str {
        match self {
            NegativeForm::NotTo => "not_to",
            NegativeForm::ToNot => "to_not",
        }
    }
}

/// What `be_true` / `be_false` become.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanMatcherTarget {
    /// `be_truthy` / `be_falsey`
    #[default]
    Conditional,
    /// `be true` / `be false`
    Exact,
}

/// Invalid option combination, detected before any file is processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("the spec command must not be empty")]
    EmptyCommand,

    #[error("a spec command cannot be combined with skipping dynamic analysis")]
    CommandWithoutDynamicAnalysis,

    #[error("the analysis timeout must be greater than zero")]
    ZeroTimeout,

    #[error("every conversion category is kept; nothing would be converted")]
    NothingToConvert,

    #[error("unknown conversion type `{0}` (expected one of should, should_receive, stub, have_items, deprecated)")]
    UnknownCategory(String),
}

/// Options that control a conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Proceed even if the repository has uncommitted changes.
    pub force: bool,
    /// Decide every conversion from static information only.
    pub skip_dynamic_analysis: bool,
    /// Custom command for the dynamic analysis run.
    pub rspec_command: Option<String>,
    /// Write a commit message summarizing the conversions.
    pub generate_commit_message: bool,
    pub negative_form: NegativeForm,
    /// Parenthesize the argument of operator matchers (`eq(1)` vs `eq 1`).
    pub parenthesize_matcher_arg: bool,
    pub boolean_matcher: BooleanMatcherTarget,
    /// Categories left unconverted.
    pub keep: BTreeSet<Category>,
    /// Upper bound for the dynamic analysis run.
    pub analysis_timeout: Duration,
    /// Leave the dynamic analysis sandbox on disk for inspection.
    pub keep_sandbox: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            force: false,
            skip_dynamic_analysis: false,
            rspec_command: None,
            generate_commit_message: false,
            negative_form: NegativeForm::NotTo,
            parenthesize_matcher_arg: true,
            boolean_matcher: BooleanMatcherTarget::Conditional,
            keep: BTreeSet::new(),
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
            keep_sandbox: false,
        }
    }
}

impl Configuration {
    /// Check option combinations.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Some(command) = &self.rspec_command {
            if command.trim().is_empty() {
                return Err(ConfigurationError::EmptyCommand);
            }
            if self.skip_dynamic_analysis {
                return Err(ConfigurationError::CommandWithoutDynamicAnalysis);
            }
        }
        if self.analysis_timeout.is_zero() {
            return Err(ConfigurationError::ZeroTimeout);
        }
        if Category::ALL.iter().all(|c| self.keep.contains(c)) {
            return Err(ConfigurationError::NothingToConvert);
        }
        Ok(())
    }

    /// Whether conversions of `category` are enabled.
    pub fn converts(&self, category: Category) -> bool {
        !self.keep.contains(&category)
    }

    /// The command used for the dynamic analysis run.
    pub fn spec_command(&self) -> &str {
        self.rspec_command.as_deref().unwrap_or(DEFAULT_RSPEC_COMMAND)
    }
}

// ============================================================================
// Tests
// ============================================================================
