//! Static context analysis.
//!
//! Decides from the enclosing scopes alone whether the `expect`, `allow` and
//! `receive` helpers can be called at a node. Example bodies and hooks have
//! them; example group bodies, class bodies and top-level code do not.
//! Methods defined inside an example group are called from examples, so
//! they have them too. When the scopes cannot tell (e.g. inside
//! `instance_eval`), the result is [`Availability::Indeterminate`].

use crate::call;
use crate::tree::{NodeId, SyntaxTree};

/// Calls whose block is an example group body.
const EXAMPLE_GROUP_METHODS: &[&str] = &[
    "describe",
    "context",
    "feature",
    "example_group",
    "shared_examples",
    "shared_examples_for",
    "shared_context",
    "xdescribe",
    "xcontext",
    "fdescribe",
    "fcontext",
];

/// Calls whose block runs in example scope.
const EXAMPLE_METHODS: &[&str] = &[
    "it",
    "specify",
    "example",
    "scenario",
    "its",
    "focus",
    "fit",
    "fspecify",
    "fexample",
    "xit",
    "xspecify",
    "xexample",
    "pending",
    "skip",
    "before",
    "after",
    "around",
    "prepend_before",
    "prepend_after",
    "append_before",
    "append_after",
    "background",
    "let",
    "let!",
    "subject",
    "subject!",
    "given",
    "given!",
];

/// Calls that evaluate their block against another receiver.
const EVAL_METHODS: &[&str] = &[
    "instance_eval",
    "instance_exec",
    "class_eval",
    "class_exec",
    "module_eval",
    "module_exec",
];

/// Whether a helper method is callable at a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable,
    Indeterminate,
}

impl Availability {
    /// Indeterminate results are treated as available.
    pub fn permits(self) -> bool {
        !matches!(self, Availability::Unavailable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    ExampleGroup,
    Example,
    Eval,
    Def,
    Class,
    Module,
}

fn classify_block(tree: &SyntaxTree, block: NodeId) -> Option<Scope> {
    let owner = tree.parent(block)?;
    if tree.field(block) != Some("block") {
        return None;
    }
    let name = call::method_name(tree, owner)?;
    let rspec_receiver = match call::receiver(tree, owner) {
        None => true,
        Some(r) => call::const_name(tree, r) == Some("RSpec"),
    };
    if EXAMPLE_GROUP_METHODS.contains(&name) && rspec_receiver {
        Some(Scope::ExampleGroup)
    } else if EXAMPLE_METHODS.contains(&name) && call::receiver(tree, owner).is_none() {
        Some(Scope::Example)
    } else if EVAL_METHODS.contains(&name) {
        Some(Scope::Eval)
    } else {
        None
    }
}

fn scope_of(tree: &SyntaxTree, id: NodeId) -> Option<Scope> {
    match tree.kind(id) {
        "block" | "do_block" => classify_block(tree, id),
        "method" | "singleton_method" => Some(Scope::Def),
        "class" | "singleton_class" => Some(Scope::Class),
        "module" => Some(Scope::Module),
        _ => None,
    }
}

/// Enclosing scopes of `node`, innermost first.
fn scopes(tree: &SyntaxTree, node: NodeId) -> impl Iterator<Item = Scope> + '_ {
    tree.ancestors(node).filter_map(move |id| scope_of(tree, id))
}

/// Static availability of the example helpers at `node`.
pub fn example_helpers_at(tree: &SyntaxTree, node: NodeId) -> Availability {
    let mut enclosing = scopes(tree, node);
    match enclosing.next() {
        None => Availability::Unavailable,
        Some(Scope::Example) => Availability::Available,
        Some(Scope::Eval) => Availability::Indeterminate,
        Some(Scope::Def) => match enclosing.next() {
            Some(Scope::ExampleGroup) => Availability::Available,
            Some(Scope::Class) => Availability::Unavailable,
            _ => Availability::Indeterminate,
        },
        Some(Scope::ExampleGroup | Scope::Class | Scope::Module) => Availability::Unavailable,
    }
}

// ============================================================================
// Tests
// ============================================================================
