//! `be_true` / `be_false` -> `be_truthy` / `be_falsey` (or `be true` /
//! `be false`).

use expectify_core::config::{BooleanMatcherTarget, Category};
use expectify_core::patch::Edit;

use super::{Declined, Plan, PlanContext, Syntax};
use crate::call;
use crate::tree::{NodeId, SyntaxTree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanMatcher {
    node: NodeId,
    /// The token to replace: the identifier itself, or the selector of a
    /// `be_true()` call.
    name: NodeId,
    truthy: bool,
}

fn matcher_name(tree: &SyntaxTree, node: NodeId) -> Option<NodeId> {
    match tree.kind(node) {
        "identifier" => Some(node),
        "call" if call::receiver(tree, node).is_none() && call::arguments(tree, node).is_empty() => {
            call::selector(tree, node)
        }
        _ => None,
    }
}

impl Syntax for BooleanMatcher {
    const NAME: &'static str = "boolean_matcher";

    fn matches(tree: &SyntaxTree, node: NodeId) -> bool {
        matcher_name(tree, node)
            .is_some_and(|name| matches!(tree.text(name), "be_true" | "be_false"))
            && call::expectation_of_matcher(tree, node).is_some()
    }

    fn build(tree: &SyntaxTree, node: NodeId) -> Option<Self> {
        let name = matcher_name(tree, node)?;
        Some(BooleanMatcher {
            node,
            name,
            truthy: tree.text(name) == "be_true",
        })
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn category(&self) -> Category {
        Category::Deprecated
    }

    fn plan(&self, cx: &PlanContext<'_>) -> Result<Plan, Declined> {
        cx.require(Category::Deprecated)?;
        let replacement = match (cx.config.boolean_matcher, self.truthy) {
            (BooleanMatcherTarget::Conditional, true) => "be_truthy",
            (BooleanMatcherTarget::Conditional, false) => "be_falsey",
            (BooleanMatcherTarget::Exact, true) => "be true",
            (BooleanMatcherTarget::Exact, false) => "be false",
        };
        let mut plan = Plan::default();
        plan.edit(Edit::replace(cx.tree.span(self.name), replacement));
        plan.record(
            if self.truthy { "be_true" } else { "be_false" },
            replacement,
        );
        Ok(plan)
    }
}
