//! `obj.stub(:m)` -> `allow(obj).to receive(:m)`.
//!
//! Besides the `allow` conversion this construct owns the deprecated parts
//! of a stub chain: `stub!`/`unstub!` become `stub`/`unstub`, and
//! `.any_number_of_times` / `.at_least(0)` (both no-ops on a stub) are
//! removed.

use expectify_core::config::Category;
use expectify_core::error::ConversionContextError;
use expectify_core::patch::{Edit, Span};
use expectify_core::text::indentation_of_line;

use super::{Declined, Plan, PlanContext, Syntax};
use crate::call;
use crate::dynamic::ProbeSink;
use crate::tree::{NodeId, SyntaxTree};

const ALLOW_TO_RECEIVE_AVAILABLE: &str = "allow_to_receive_available?";
const RECEIVE_MESSAGES_AVAILABLE: &str = "receive_messages_available?";

#[derive(Debug, Clone, PartialEq, Eq)]
enum StubArguments {
    /// A single message name.
    Message(NodeId),
    /// `key => value` pairs, bare or inside braces.
    Hash(Vec<NodeId>),
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodStub {
    node: NodeId,
    subject: NodeId,
    selector: NodeId,
    any_instance_class: Option<NodeId>,
    arguments: StubArguments,
    /// `.any_number_of_times` or `.at_least(0)` later in the chain.
    no_op_allowance: Option<NodeId>,
    chain_top: NodeId,
}

impl MethodStub {
    fn method<'t>(&self, tree: &'t SyntaxTree) -> &'t str {
        tree.text(self.selector)
    }

    fn is_hash(&self) -> bool {
        matches!(self.arguments, StubArguments::Hash(_))
    }

    fn allow_source(&self, tree: &SyntaxTree) -> String {
        match self.any_instance_class {
            Some(class) => format!("allow_any_instance_of({})", tree.text(class)),
            None => format!("allow({})", tree.text(self.subject)),
        }
    }

    fn deprecated_replacement(&self, tree: &SyntaxTree) -> Option<&'static str> {
        match self.method(tree) {
            "stub!" => Some("stub"),
            "unstub!" => Some("unstub"),
            _ => None,
        }
    }

    /// Text of the stub call with `allow` syntax, ending where the original
    /// arguments end.
    fn allow_expression(&self, cx: &PlanContext<'_>) -> String {
        let tree = cx.tree;
        let source = tree.source();
        let subject_end = tree.span(self.subject).end;
        let selector = tree.span(self.selector);
        let args_end = call::end_without_block(tree, self.node);
        let dot = &source[subject_end..selector.start];
        let allow = self.allow_source(tree);

        match &self.arguments {
            StubArguments::Message(arg) => {
                let arg_span = tree.span(*arg);
                format!(
                    "{allow}{dot}to receive{}{}{}",
                    &source[selector.end..arg_span.start],
                    message_source(tree, *arg),
                    &source[arg_span.end..args_end],
                )
            }
            StubArguments::Hash(_) if self.receive_messages_available(cx) => {
                format!(
                    "{allow}{dot}to receive_messages{}",
                    &source[selector.end..args_end]
                )
            }
            StubArguments::Hash(pairs) => {
                let indentation = indentation_of_line(source, tree.span(self.node).start);
                pairs
                    .iter()
                    .filter_map(|&pair| {
                        let key = tree.child_by_field(pair, "key")?;
                        let value = tree.child_by_field(pair, "value")?;
                        Some(format!(
                            "{allow}{dot}to receive({}).and_return({})",
                            message_source(tree, key),
                            tree.text(value)
                        ))
                    })
                    .enumerate()
                    .map(|(i, statement)| {
                        if i == 0 {
                            statement
                        } else {
                            format!("{indentation}{statement}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            StubArguments::Other => String::new(),
        }
    }

    fn receive_messages_available(&self, cx: &PlanContext<'_>) -> bool {
        cx.fact_bool(self.node, RECEIVE_MESSAGES_AVAILABLE)
            .unwrap_or(false)
    }

    /// Whether the `allow` conversion applies, or why not.
    fn allowize(&self, cx: &PlanContext<'_>) -> Result<(), Declined> {
        cx.require(Category::Stub)?;
        if !matches!(self.method(cx.tree), "stub" | "stub!") {
            return Err(ConversionContextError::UnsupportedForm {
                reason: "`unstub` has no `allow` equivalent",
            }
            .into());
        }
        if matches!(self.arguments, StubArguments::Other) {
            return Err(ConversionContextError::UnsupportedForm {
                reason: "stub without a message",
            }
            .into());
        }
        if !cx.syntax_available(self.node, ALLOW_TO_RECEIVE_AVAILABLE) {
            return Err(ConversionContextError::SyntaxUnavailable { syntax: "allow" }.into());
        }
        Ok(())
    }

    fn record_allow(&self, plan: &mut Plan, cx: &PlanContext<'_>) {
        let tree = cx.tree;
        let mut original = if self.any_instance_class.is_some() {
            "SomeClass.any_instance".to_string()
        } else {
            "obj".to_string()
        };
        original.push('.');
        original.push_str(self.method(tree));
        original.push_str(if self.is_hash() {
            "(:message => value)"
        } else {
            "(:message)"
        });

        let mut converted = if self.any_instance_class.is_some() {
            "allow_any_instance_of(SomeClass)".to_string()
        } else {
            "allow(obj)".to_string()
        };
        converted.push_str(".to ");
        if self.is_hash() && self.receive_messages_available(cx) {
            converted.push_str("receive_messages(:message => value)");
        } else {
            converted.push_str("receive(:message)");
            if self.is_hash() {
                converted.push_str(".and_return(value)");
            }
        }
        plan.record(original, converted);
    }
}

impl Syntax for MethodStub {
    const NAME: &'static str = "method_stub";

    fn matches(tree: &SyntaxTree, node: NodeId) -> bool {
        matches!(
            call::method_name(tree, node),
            Some("stub" | "unstub" | "stub!" | "unstub!")
        ) && call::receiver(tree, node).is_some()
    }

    fn build(tree: &SyntaxTree, node: NodeId) -> Option<Self> {
        let subject = call::receiver(tree, node)?;
        Some(MethodStub {
            node,
            subject,
            selector: call::selector(tree, node)?,
            any_instance_class: call::any_instance_class(tree, subject),
            arguments: classify_arguments(tree, node),
            no_op_allowance: find_no_op_allowance(tree, node),
            chain_top: call::chain_top(tree, node),
        })
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn scope(&self, _tree: &SyntaxTree) -> NodeId {
        self.chain_top
    }

    fn category(&self) -> Category {
        Category::Stub
    }

    fn register_probes(&self, _tree: &SyntaxTree, sink: &mut ProbeSink) {
        sink.context(
            self.node,
            ALLOW_TO_RECEIVE_AVAILABLE,
            "respond_to?(:allow) && respond_to?(:receive)",
        );
        if self.is_hash() {
            sink.context(
                self.node,
                RECEIVE_MESSAGES_AVAILABLE,
                "respond_to?(:receive_messages)",
            );
        }
    }

    fn plan(&self, cx: &PlanContext<'_>) -> Result<Plan, Declined> {
        let tree = cx.tree;
        let deprecated = cx.config.converts(Category::Deprecated);
        let mut plan = Plan::default();

        let allowized = self.allowize(cx);
        if allowized.is_ok() {
            let span = Span::new(
                tree.span(self.node).start,
                call::end_without_block(tree, self.node),
            );
            plan.edit(Edit::replace(span, self.allow_expression(cx)));
            self.record_allow(&mut plan, cx);
        } else if deprecated {
            if let Some(replacement) = self.deprecated_replacement(tree) {
                plan.edit(Edit::replace(tree.span(self.selector), replacement));
                plan.record(
                    format!("obj.{}(:message)", self.method(tree)),
                    format!("obj.{replacement}(:message)"),
                );
            }
        }

        if deprecated {
            if let Some(allowance) = self.no_op_allowance {
                if let Some(receiver) = call::receiver(tree, allowance) {
                    let span = Span::new(
                        tree.span(receiver).end,
                        call::end_without_block(tree, allowance),
                    );
                    plan.edit(Edit::remove(span));
                    let converted = if allowized.is_ok() {
                        "allow(obj).to receive(:message)"
                    } else {
                        "obj.stub(:message)"
                    };
                    plan.record(
                        format!("obj.stub(:message){}", tree.slice(span)),
                        converted,
                    );
                }
            }
        }

        if plan.is_empty() {
            return Err(match allowized {
                Err(declined) => declined,
                Ok(()) => ConversionContextError::UnsupportedForm {
                    reason: "nothing to convert",
                }
                .into(),
            });
        }
        Ok(plan)
    }
}

fn classify_arguments(tree: &SyntaxTree, node: NodeId) -> StubArguments {
    let args = call::arguments(tree, node);
    match args.as_slice() {
        [] => StubArguments::Other,
        [single] if tree.kind(*single) == "hash" => {
            let pairs: Vec<NodeId> = tree
                .named_children(*single)
                .filter(|&c| tree.kind(c) == "pair")
                .collect();
            if pairs.is_empty() {
                StubArguments::Other
            } else {
                StubArguments::Hash(pairs)
            }
        }
        [single] if tree.kind(*single) != "pair" => StubArguments::Message(*single),
        many if many.iter().all(|&a| tree.kind(a) == "pair") => StubArguments::Hash(many.to_vec()),
        _ => StubArguments::Other,
    }
}

/// The first `.any_number_of_times` or `.at_least(0)` call up the chain.
fn find_no_op_allowance(tree: &SyntaxTree, node: NodeId) -> Option<NodeId> {
    let mut current = node;
    while let Some(parent) = tree.parent(current) {
        if !call::is_call(tree, parent) || call::receiver(tree, parent) != Some(current) {
            return None;
        }
        let args = call::arguments(tree, parent);
        let is_no_op = match call::method_name(tree, parent) {
            Some("any_number_of_times") => args.is_empty(),
            Some("at_least") => matches!(args.as_slice(), [n] if tree.text(*n) == "0"),
            _ => false,
        };
        if is_no_op {
            return Some(parent);
        }
        current = parent;
    }
    None
}

/// Message name as a symbol literal; `key:` style keys get their colon.
fn message_source(tree: &SyntaxTree, node: NodeId) -> String {
    let text = tree.text(node);
    if tree.kind(node) == "hash_key_symbol" && !text.starts_with(':') {
        format!(":{text}")
    } else {
        text.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
