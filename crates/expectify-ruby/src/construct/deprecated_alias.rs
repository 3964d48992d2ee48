//! `mock(...)` / receiverless `stub(...)` -> `double(...)`.

use expectify_core::config::Category;
use expectify_core::patch::Edit;

use super::{Declined, Plan, PlanContext, Syntax};
use crate::call;
use crate::tree::{NodeId, SyntaxTree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeprecatedAlias {
    node: NodeId,
    selector: NodeId,
}

impl Syntax for DeprecatedAlias {
    const NAME: &'static str = "deprecated_alias";

    fn matches(tree: &SyntaxTree, node: NodeId) -> bool {
        matches!(call::method_name(tree, node), Some("mock" | "stub"))
            && call::receiver(tree, node).is_none()
            && call::argument_list(tree, node).is_some()
    }

    fn build(tree: &SyntaxTree, node: NodeId) -> Option<Self> {
        Some(DeprecatedAlias {
            node,
            selector: call::selector(tree, node)?,
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
        let tree = cx.tree;
        let mut plan = Plan::default();
        plan.edit(Edit::replace(tree.span(self.selector), "double"));
        plan.record(
            format!("{}('something')", tree.text(self.selector)),
            "double('something')",
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expectify_core::config::Configuration;
    use expectify_core::rewrite::Rewriter;

    fn convert(source: &str) -> Option<(String, Plan)> {
        let tree = SyntaxTree::parse(source).unwrap();
        let node = tree
            .preorder()
            .find(|&id| DeprecatedAlias::matches(&tree, id))?;
        let alias = DeprecatedAlias::build(&tree, node).unwrap();
        let config = Configuration::default();
        let cx = PlanContext::new(&tree, &config, None);
        let plan = alias.plan(&cx).unwrap();
        let mut rewriter = Rewriter::new(tree.source());
        rewriter.add_all(plan.edits.clone()).unwrap();
        Some((rewriter.apply().unwrap(), plan))
    }

    #[test]
    fn mock_becomes_double() {
        let (out, plan) = convert("let(:user) { mock('user', name: 'x') }\n").unwrap();
        assert_eq!(out, "let(:user) { double('user', name: 'x') }\n");
        assert_eq!(plan.records[0].original, "mock('something')");
        assert_eq!(plan.records[0].converted, "double('something')");
    }

    #[test]
    fn receiverless_stub_becomes_double() {
        let (out, _) = convert("it { s = stub('thing') }\n").unwrap();
        assert_eq!(out, "it { s = double('thing') }\n");
    }

    #[test]
    fn bare_identifiers_are_ignored() {
        assert!(convert("it { mock }\n").is_none());
    }
}
