//! `subject.should matcher` -> `expect(subject).to matcher`.
//!
//! Operator matchers (`subject.should == 1`) are converted together with
//! their expectation, since the operator only means something after
//! `should`.

use expectify_core::config::Category;
use expectify_core::error::ConversionContextError;
use expectify_core::patch::{Edit, Span};

use super::{require_syntax, wrap_subject, Declined, Plan, PlanContext, Syntax};
use crate::call;
use crate::dynamic::ProbeSink;
use crate::tree::{NodeId, SyntaxTree};

const EXPECT_AVAILABLE: &str = "expect_available?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Matcher {
    /// `subject.should matcher`
    Argument,
    /// `subject.should == value`
    Operator {
        binary: NodeId,
        operator: NodeId,
        value: NodeId,
    },
    /// `subject.should` with nothing to match against.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Should {
    node: NodeId,
    subject: NodeId,
    selector: NodeId,
    positive: bool,
    matcher: Matcher,
}

impl Syntax for Should {
    const NAME: &'static str = "should";

    fn matches(tree: &SyntaxTree, node: NodeId) -> bool {
        matches!(call::method_name(tree, node), Some("should" | "should_not"))
            && call::receiver(tree, node).is_some()
    }

    fn build(tree: &SyntaxTree, node: NodeId) -> Option<Self> {
        let matcher = if !call::arguments(tree, node).is_empty() {
            Matcher::Argument
        } else {
            operator_matcher(tree, node).unwrap_or(Matcher::Missing)
        };
        Some(Should {
            node,
            subject: call::receiver(tree, node)?,
            selector: call::selector(tree, node)?,
            positive: call::method_name(tree, node)? == "should",
            matcher,
        })
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn scope(&self, _tree: &SyntaxTree) -> NodeId {
        match self.matcher {
            Matcher::Operator { binary, .. } => binary,
            _ => self.node,
        }
    }

    fn category(&self) -> Category {
        Category::Should
    }

    fn register_probes(&self, tree: &SyntaxTree, sink: &mut ProbeSink) {
        sink.context(self.scope(tree), EXPECT_AVAILABLE, "respond_to?(:expect)");
    }

    fn plan(&self, cx: &PlanContext<'_>) -> Result<Plan, Declined> {
        cx.require(Category::Should)?;
        let tree = cx.tree;

        let operator = match self.matcher {
            Matcher::Argument => None,
            Matcher::Missing => {
                return Err(ConversionContextError::UnsupportedForm {
                    reason: "`should` without a matcher",
                }
                .into())
            }
            Matcher::Operator {
                operator, value, ..
            } => Some(
                OperatorConversion::new(tree, operator, value, cx.config.parenthesize_matcher_arg)
                    .ok_or(ConversionContextError::UnsupportedForm {
                        reason: "operator has no matcher equivalent",
                    })?,
            ),
        };

        require_syntax(cx, self.scope(tree), EXPECT_AVAILABLE, "expect")?;

        let mut plan = Plan::default();
        let proc_head = call::proc_literal_head(tree, self.subject);
        match proc_head {
            Some(head) => plan.edit(Edit::replace(head, "expect")),
            None => wrap_subject(&mut plan, tree, self.subject, "expect"),
        }
        let keyword = if self.positive {
            "to"
        } else {
            cx.config.negative_form.keyword()
        };
        plan.edit(Edit::replace(tree.span(self.selector), keyword));
        plan.expectized = Some(self.node);

        let (original, converted) = if proc_head.is_some() {
            ("lambda { }.should", "expect { }.")
        } else {
            ("obj.should", "expect(obj).")
        };
        let suffix = if self.positive { "" } else { "_not" };
        plan.record(format!("{original}{suffix}"), format!("{converted}{keyword}"));

        if let Some(operator) = operator {
            operator.apply(&mut plan);
        }
        Ok(plan)
    }
}

fn operator_matcher(tree: &SyntaxTree, node: NodeId) -> Option<Matcher> {
    let binary = tree.parent(node)?;
    if tree.kind(binary) != "binary" || tree.field(node) != Some("left") {
        return None;
    }
    Some(Matcher::Operator {
        binary,
        operator: tree.child_by_field(binary, "operator")?,
        value: tree.child_by_field(binary, "right")?,
    })
}

// ============================================================================
// Operator Matchers
// ============================================================================

/// Edits turning `== value` style operators into matcher calls.
#[derive(Debug, Clone)]
struct OperatorConversion {
    edits: Vec<Edit>,
    original: String,
    converted: String,
}

impl OperatorConversion {
    fn new(tree: &SyntaxTree, operator: NodeId, value: NodeId, parenthesize: bool) -> Option<Self> {
        let op = tree.text(operator);
        let op_span = tree.span(operator);
        let value_span = tree.span(value);
        let sample = if tree.kind(value) == "array" {
            "[1, 2]"
        } else if tree.kind(value) == "regex" {
            "/pattern/"
        } else {
            "expected"
        };

        let mut edits = Vec::new();
        let (original, converted) = match op {
            "==" | "=~" => {
                let method = match (op, tree.kind(value)) {
                    ("==", _) => "eq",
                    (_, "array") => "match_array",
                    _ => "match",
                };
                let gap = Span::new(op_span.end, value_span.start);
                let needs_parens = parenthesize
                    || gap.is_empty()
                    || matches!(tree.kind(value), "hash");
                if needs_parens {
                    edits.push(Edit::replace(
                        Span::new(op_span.start, value_span.start),
                        format!("{method}("),
                    ));
                    edits.push(Edit::insert_after(value_span.end, ")"));
                    (format!("{op} {sample}"), format!("{method}({sample})"))
                } else {
                    edits.push(Edit::replace(op_span, method));
                    (format!("{op} {sample}"), format!("{method} {sample}"))
                }
            }
            "<" | "<=" | ">" | ">=" | "===" => {
                edits.push(Edit::insert_before(op_span.start, "be "));
                (format!("{op} {sample}"), format!("be {op} {sample}"))
            }
            _ => return None,
        };
        Some(OperatorConversion {
            edits,
            original,
            converted,
        })
    }

    fn apply(self, plan: &mut Plan) {
        plan.edits.extend(self.edits);
        plan.record(self.original, self.converted);
    }
}

// ============================================================================
// Tests
// ============================================================================
