//! Legacy syntax constructs and their conversions.
//!
//! Detection is a single pre-order walk over the tree. Each node is offered
//! to the construct kinds in a fixed priority order and the first whose
//! [`Syntax::matches`] accepts it wins. Constructs therefore come out in
//! source order, outer before inner.
//!
//! Planning runs in the same order against a [`PlanContext`], which carries
//! configuration, runtime facts for the file, and what earlier plans did:
//! which `should` expectations became `expect(...)`, and which spans were
//! replaced or removed. A construct inside a claimed span is declined.

mod boolean_matcher;
mod deprecated_alias;
mod have;
mod method_stub;
mod should;
mod should_receive;

use std::collections::HashSet;

use thiserror::Error;

use expectify_core::config::{Category, Configuration};
use expectify_core::error::ConversionContextError;
use expectify_core::facts::FileFacts;
use expectify_core::patch::{Edit, Span};
use expectify_core::report::ConversionRecord;

use crate::context;
use crate::dynamic::ProbeSink;
use crate::tree::{NodeId, SyntaxTree};

pub use boolean_matcher::BooleanMatcher;
pub use deprecated_alias::DeprecatedAlias;
pub use have::Have;
pub use method_stub::MethodStub;
pub use should::Should;
pub use should_receive::ShouldReceive;

// ============================================================================
// Construct Protocol
// ============================================================================

/// Shared protocol of every legacy construct.
pub trait Syntax: Sized {
    /// Name used in edit origins and logs.
    const NAME: &'static str;

    /// Structural check only; cheap enough to run on every node.
    fn matches(tree: &SyntaxTree, node: NodeId) -> bool;

    /// Build the construct for a node that [`matches`](Self::matches).
    fn build(tree: &SyntaxTree, node: NodeId) -> Option<Self>;

    /// The matched node.
    fn node(&self) -> NodeId;

    /// The node whose range bounds every edit of this construct.
    fn scope(&self, _tree: &SyntaxTree) -> NodeId {
        self.node()
    }

    fn category(&self) -> Category;

    /// Register runtime questions for the dynamic analysis run.
    fn register_probes(&self, _tree: &SyntaxTree, _sink: &mut ProbeSink) {}

    /// Decide the conversion.
    fn plan(&self, cx: &PlanContext<'_>) -> Result<Plan, Declined>;
}

/// The edits and records of one accepted conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub edits: Vec<Edit>,
    pub records: Vec<ConversionRecord>,
    /// Set when a `should` expectation was turned into `expect(...)`.
    pub expectized: Option<NodeId>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    fn edit(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    fn record(&mut self, original: impl Into<String>, converted: impl Into<String>) {
        self.records.push(ConversionRecord::new(original, converted));
    }
}

/// Why a candidate was left alone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Declined {
    #[error("category `{0}` is kept")]
    CategoryKept(Category),

    #[error(transparent)]
    Context(#[from] ConversionContextError),

    #[error("enclosed by an earlier rewrite")]
    EnclosedByRewrite,
}

// ============================================================================
// Plan Context
// ============================================================================

/// Per-file planning state.
#[derive(Debug)]
pub struct PlanContext<'a> {
    pub tree: &'a SyntaxTree,
    pub config: &'a Configuration,
    facts: Option<&'a FileFacts>,
    expectized: HashSet<NodeId>,
    claimed: Vec<Span>,
}

impl<'a> PlanContext<'a> {
    pub fn new(
        tree: &'a SyntaxTree,
        config: &'a Configuration,
        facts: Option<&'a FileFacts>,
    ) -> Self {
        PlanContext {
            tree,
            config,
            facts,
            expectized: HashSet::new(),
            claimed: Vec::new(),
        }
    }

    /// Fail with [`Declined::CategoryKept`] unless `category` is converted.
    pub fn require(&self, category: Category) -> Result<(), Declined> {
        if self.config.converts(category) {
            Ok(())
        } else {
            Err(Declined::CategoryKept(category))
        }
    }

    /// A boolean runtime fact about `node`.
    pub fn fact_bool(&self, node: NodeId, key: &str) -> Option<bool> {
        self.facts?.bool(self.tree.span(node).start, key)
    }

    /// A list-of-strings runtime fact about `node`.
    pub fn fact_strings(&self, node: NodeId, key: &str) -> Option<Vec<String>> {
        self.facts?.strings(self.tree.span(node).start, key)
    }

    /// Whether the example helpers can be called at `node`. A runtime fact
    /// recorded under `key` wins over the static answer.
    pub fn syntax_available(&self, node: NodeId, key: &str) -> bool {
        match self.fact_bool(node, key) {
            Some(available) => available,
            None => context::example_helpers_at(self.tree, node).permits(),
        }
    }

    /// Whether `call` (a `should` call) was converted to `expect` form.
    pub fn is_expectized(&self, call: NodeId) -> bool {
        self.expectized.contains(&call)
    }

    /// Whether `node` lies inside a span an earlier plan replaced or removed.
    pub fn is_enclosed(&self, node: NodeId) -> bool {
        let span = self.tree.span(node);
        self.claimed.iter().any(|claimed| claimed.overlaps(&span))
    }

    /// Record an accepted plan.
    pub fn accept(&mut self, plan: &Plan) {
        self.claimed.extend(
            plan.edits
                .iter()
                .filter(|edit| edit.kind.is_destructive())
                .map(|edit| edit.span),
        );
        if let Some(call) = plan.expectized {
            self.expectized.insert(call);
        }
    }
}

// ============================================================================
// Construct
// ============================================================================

/// A detected legacy construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Construct {
    Should(Should),
    ShouldReceive(ShouldReceive),
    MethodStub(MethodStub),
    Have(Have),
    BooleanMatcher(BooleanMatcher),
    DeprecatedAlias(DeprecatedAlias),
}

macro_rules! dispatch {
    ($self:expr, $c:ident => $body:expr) => {
        match $self {
            Construct::Should($c) => $body,
            Construct::ShouldReceive($c) => $body,
            Construct::MethodStub($c) => $body,
            Construct::Have($c) => $body,
            Construct::BooleanMatcher($c) => $body,
            Construct::DeprecatedAlias($c) => $body,
        }
    };
}

fn try_build<S: Syntax>(
    tree: &SyntaxTree,
    node: NodeId,
    wrap: fn(S) -> Construct,
) -> Option<Construct> {
    if S::matches(tree, node) {
        S::build(tree, node).map(wrap)
    } else {
        None
    }
}

impl Construct {
    /// Classify one node; the first matching kind in priority order wins.
    pub fn classify(tree: &SyntaxTree, node: NodeId) -> Option<Construct> {
        try_build(tree, node, Construct::Should)
            .or_else(|| try_build(tree, node, Construct::ShouldReceive))
            .or_else(|| try_build(tree, node, Construct::MethodStub))
            .or_else(|| try_build(tree, node, Construct::Have))
            .or_else(|| try_build(tree, node, Construct::BooleanMatcher))
            .or_else(|| try_build(tree, node, Construct::DeprecatedAlias))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Construct::Should(_) => Should::NAME,
            Construct::ShouldReceive(_) => ShouldReceive::NAME,
            Construct::MethodStub(_) => MethodStub::NAME,
            Construct::Have(_) => Have::NAME,
            Construct::BooleanMatcher(_) => BooleanMatcher::NAME,
            Construct::DeprecatedAlias(_) => DeprecatedAlias::NAME,
        }
    }

    pub fn node(&self) -> NodeId {
        dispatch!(self, c => c.node())
    }

    pub fn scope(&self, tree: &SyntaxTree) -> NodeId {
        dispatch!(self, c => c.scope(tree))
    }

    pub fn category(&self) -> Category {
        dispatch!(self, c => c.category())
    }

    pub fn register_probes(&self, tree: &SyntaxTree, sink: &mut ProbeSink) {
        dispatch!(self, c => c.register_probes(tree, sink))
    }

    pub fn plan(&self, cx: &PlanContext<'_>) -> Result<Plan, Declined> {
        dispatch!(self, c => c.plan(cx))
    }
}

/// All constructs in `tree`, in source order.
pub fn detect(tree: &SyntaxTree) -> Vec<Construct> {
    tree.preorder()
        .filter_map(|node| Construct::classify(tree, node))
        .collect()
}

/// Register the probes of every construct.
pub fn collect_probes(tree: &SyntaxTree, constructs: &[Construct]) -> ProbeSink {
    let mut sink = ProbeSink::new();
    for construct in constructs {
        construct.register_probes(tree, &mut sink);
    }
    sink
}

// ============================================================================
// Shared Edit Builders
// ============================================================================

/// Wrap `subject` as `method(subject)`, or prepend `method` if the subject
/// is already parenthesized.
fn wrap_subject(plan: &mut Plan, tree: &SyntaxTree, subject: NodeId, method: &str) {
    let span = tree.span(subject);
    if crate::call::in_parentheses(tree, subject) {
        plan.edit(Edit::insert_before(span.start, method));
    } else {
        plan.edit(Edit::insert_before(span.start, format!("{method}(")));
        plan.edit(Edit::insert_after(span.end, ")"));
    }
}

/// Fail with [`ConversionContextError::SyntaxUnavailable`] unless the helper
/// named `syntax` is callable at `node`.
fn require_syntax(
    cx: &PlanContext<'_>,
    node: NodeId,
    key: &str,
    syntax: &'static str,
) -> Result<(), Declined> {
    if cx.syntax_available(node, key) {
        Ok(())
    } else {
        Err(ConversionContextError::SyntaxUnavailable { syntax }.into())
    }
}

// ============================================================================
// Tests
// ============================================================================
