//! `obj.should_receive(:m)` -> `expect(obj).to receive(:m)`.

use expectify_core::config::Category;
use expectify_core::patch::Edit;

use super::{require_syntax, wrap_subject, Declined, Plan, PlanContext, Syntax};
use crate::call;
use crate::dynamic::ProbeSink;
use crate::tree::{NodeId, SyntaxTree};

const EXPECT_TO_RECEIVE_AVAILABLE: &str = "expect_to_receive_available?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShouldReceive {
    node: NodeId,
    subject: NodeId,
    selector: NodeId,
    positive: bool,
    /// `Klass` of a `Klass.any_instance` subject.
    any_instance_class: Option<NodeId>,
}

impl Syntax for ShouldReceive {
    const NAME: &'static str = "should_receive";

    fn matches(tree: &SyntaxTree, node: NodeId) -> bool {
        matches!(
            call::method_name(tree, node),
            Some("should_receive" | "should_not_receive")
        ) && call::receiver(tree, node).is_some()
    }

    fn build(tree: &SyntaxTree, node: NodeId) -> Option<Self> {
        let subject = call::receiver(tree, node)?;
        Some(ShouldReceive {
            node,
            subject,
            selector: call::selector(tree, node)?,
            positive: call::method_name(tree, node)? == "should_receive",
            any_instance_class: call::any_instance_class(tree, subject),
        })
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn category(&self) -> Category {
        Category::ShouldReceive
    }

    fn register_probes(&self, _tree: &SyntaxTree, sink: &mut ProbeSink) {
        sink.context(
            self.node,
            EXPECT_TO_RECEIVE_AVAILABLE,
            "respond_to?(:expect) && respond_to?(:receive)",
        );
    }

    fn plan(&self, cx: &PlanContext<'_>) -> Result<Plan, Declined> {
        cx.require(Category::ShouldReceive)?;
        require_syntax(cx, self.node, EXPECT_TO_RECEIVE_AVAILABLE, "expect")?;
        let tree = cx.tree;

        let mut plan = Plan::default();
        match self.any_instance_class {
            Some(class) => plan.edit(Edit::replace(
                tree.span(self.subject),
                format!("expect_any_instance_of({})", tree.text(class)),
            )),
            None => wrap_subject(&mut plan, tree, self.subject, "expect"),
        }
        let keyword = if self.positive {
            "to"
        } else {
            cx.config.negative_form.keyword()
        };
        plan.edit(Edit::replace(
            tree.span(self.selector),
            format!("{keyword} receive"),
        ));

        let (subject, expectation) = match self.any_instance_class {
            Some(_) => ("SomeClass.any_instance", "expect_any_instance_of(SomeClass)"),
            None => ("obj", "expect(obj)"),
        };
        let method = if self.positive {
            "should_receive"
        } else {
            "should_not_receive"
        };
        plan.record(
            format!("{subject}.{method}(:message)"),
            format!("{expectation}.{keyword} receive(:message)"),
        );
        Ok(plan)
    }
}

// ============================================================================
// Tests
// ============================================================================
