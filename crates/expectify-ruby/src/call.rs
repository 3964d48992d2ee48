//! Structural helpers over `call` nodes.
//!
//! tree-sitter-ruby represents every method invocation (`a.b`, `b(1)`,
//! `b 1`, `a.b { }`) as a `call` node with optional `receiver`, `method`,
//! `arguments` and `block` fields. These helpers read those fields and a few
//! shapes that recur across conversions.

use expectify_core::patch::Span;

use crate::tree::{NodeId, SyntaxTree};

/// Methods that create a deferred block (`lambda { }`, `proc { }`).
const PROC_METHODS: &[&str] = &["lambda", "proc"];

/// Node kinds that can take a method call without being parenthesized.
const PRIMARY_KINDS: &[&str] = &[
    "identifier",
    "constant",
    "scope_resolution",
    "call",
    "instance_variable",
    "class_variable",
    "global_variable",
    "parenthesized_statements",
    "array",
    "hash",
    "string",
    "simple_symbol",
    "integer",
    "float",
    "self",
    "element_reference",
];

pub fn is_call(tree: &SyntaxTree, id: NodeId) -> bool {
    tree.kind(id) == "call"
}

pub fn receiver(tree: &SyntaxTree, call: NodeId) -> Option<NodeId> {
    tree.child_by_field(call, "receiver")
}

/// The `method` field (the selector).
pub fn selector(tree: &SyntaxTree, call: NodeId) -> Option<NodeId> {
    tree.child_by_field(call, "method")
}

/// The selector's text, e.g. `should` or `stub!`.
pub fn method_name(tree: &SyntaxTree, call: NodeId) -> Option<&str> {
    if !is_call(tree, call) {
        return None;
    }
    selector(tree, call).map(|m| tree.text(m))
}

/// The `argument_list` node, if any.
pub fn argument_list(tree: &SyntaxTree, call: NodeId) -> Option<NodeId> {
    tree.child_by_field(call, "arguments")
}

/// Argument expressions in order (bare `key => value` pairs included).
pub fn arguments(tree: &SyntaxTree, call: NodeId) -> Vec<NodeId> {
    argument_list(tree, call)
        .map(|list| tree.named_children(list).collect())
        .unwrap_or_default()
}

pub fn block(tree: &SyntaxTree, call: NodeId) -> Option<NodeId> {
    tree.child_by_field(call, "block")
}

/// End of the call without its block: after the arguments, or after the
/// selector when there are none.
pub fn end_without_block(tree: &SyntaxTree, call: NodeId) -> usize {
    argument_list(tree, call)
        .or_else(|| selector(tree, call))
        .map(|n| tree.span(n).end)
        .unwrap_or_else(|| tree.span(call).end)
}

/// `::Foo::Bar` style constant name without the leading `::`.
pub fn const_name(tree: &SyntaxTree, id: NodeId) -> Option<&str> {
    match tree.kind(id) {
        "constant" | "scope_resolution" => Some(tree.text(id).trim_start_matches("::")),
        _ => None,
    }
}

/// If `id` is a deferred-block literal (`lambda { }`, `proc { }`,
/// `Kernel.lambda { }`, `Proc.new { }`, `-> { }`), the span of its head,
/// i.e. everything before the block.
pub fn proc_literal_head(tree: &SyntaxTree, id: NodeId) -> Option<Span> {
    match tree.kind(id) {
        "lambda" => {
            if tree.child_by_field(id, "parameters").is_some() {
                return None;
            }
            let arrow = tree.children(id).first().copied()?;
            (tree.text(arrow) == "->").then(|| tree.span(arrow))
        }
        "call" => {
            block(tree, id)?;
            if argument_list(tree, id).is_some() {
                return None;
            }
            let name = method_name(tree, id)?;
            let is_proc = match receiver(tree, id) {
                None => PROC_METHODS.contains(&name),
                Some(r) => match const_name(tree, r) {
                    Some("Kernel") => PROC_METHODS.contains(&name),
                    Some("Proc") => name == "new",
                    _ => false,
                },
            };
            let head_end = tree.span(selector(tree, id)?).end;
            is_proc.then(|| Span::new(tree.span(id).start, head_end))
        }
        _ => None,
    }
}

/// Whether `id` is a parenthesized expression, `( ... )`.
pub fn in_parentheses(tree: &SyntaxTree, id: NodeId) -> bool {
    tree.kind(id) == "parenthesized_statements"
}

/// Whether a method can be called on `id` without adding parentheses.
pub fn is_primary(tree: &SyntaxTree, id: NodeId) -> bool {
    PRIMARY_KINDS.contains(&tree.kind(id))
}

/// For `Klass.any_instance`, the `Klass` node.
pub fn any_instance_class(tree: &SyntaxTree, id: NodeId) -> Option<NodeId> {
    if method_name(tree, id)? != "any_instance" || argument_list(tree, id).is_some() {
        return None;
    }
    receiver(tree, id)
}

/// The call at the top of the method chain that `call` starts, e.g.
/// `a.stub(:x).and_return(1)` for the inner `a.stub(:x)`.
pub fn chain_top(tree: &SyntaxTree, call: NodeId) -> NodeId {
    let mut current = call;
    while let Some(parent) = tree.parent(current) {
        if is_call(tree, parent) && receiver(tree, parent) == Some(current) {
            current = parent;
        } else {
            break;
        }
    }
    current
}

/// How a matcher is attached to its expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// `subject.should matcher` / `subject.should_not matcher`
    Should { call: NodeId, subject: NodeId },
    /// `expect(subject).to matcher` / `not_to` / `to_not`
    Expect { call: NodeId, subject: NodeId },
}

impl Expectation {
    /// The call node that carries the matcher.
    pub fn call(self) -> NodeId {
        match self {
            Expectation::Should { call, .. } | Expectation::Expect { call, .. } => call,
        }
    }

    /// The expression under test.
    pub fn subject(self) -> NodeId {
        match self {
            Expectation::Should { subject, .. } | Expectation::Expect { subject, .. } => subject,
        }
    }
}

/// The expectation that takes `matcher` as its only argument.
pub fn expectation_of_matcher(tree: &SyntaxTree, matcher: NodeId) -> Option<Expectation> {
    let list = tree.parent(matcher)?;
    if tree.kind(list) != "argument_list" {
        return None;
    }
    let call = tree.parent(list)?;
    if arguments(tree, call) != [matcher] {
        return None;
    }
    let subject = receiver(tree, call)?;
    match method_name(tree, call)? {
        "should" | "should_not" => Some(Expectation::Should { call, subject }),
        "to" | "not_to" | "to_not" => {
            if method_name(tree, subject)? != "expect" || receiver(tree, subject).is_some() {
                return None;
            }
            if block(tree, subject).is_some() {
                return None;
            }
            match arguments(tree, subject).as_slice() {
                [inner] => Some(Expectation::Expect {
                    call,
                    subject: *inner,
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Quote `text` as a single-quoted Ruby string literal.
pub fn ruby_single_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

// ============================================================================
// Tests
// ============================================================================
