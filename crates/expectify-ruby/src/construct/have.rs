//! `have(n).items` -> a size query on the subject.
//!
//! `expect(team).to have(3).players` becomes
//! `expect(team.players.size).to eq(3)`. Which query method the collection
//! supports, whether the subject owns the collection (as opposed to being
//! the collection itself), and whether the accessor is private are runtime
//! questions; they are probed on the subject and fall back to "owner",
//! "public" and `size`.

use expectify_core::config::Category;
use expectify_core::patch::{Edit, Span};

use super::{Declined, Plan, PlanContext, Syntax};
use crate::call::{self, Expectation};
use crate::dynamic::ProbeSink;
use crate::tree::{NodeId, SyntaxTree};

/// Query methods in order of preference. `String#count` takes an argument,
/// so `size` is preferred over `count`.
pub const QUERY_METHOD_PRIORITIES: [&str; 3] = ["size", "count", "length"];

const OWNER_KEY: &str = "subject_is_owner_of_collection?";
const QUERY_KEY: &str = "available_query_methods";
const PRIVATE_KEY: &str = "collection_accessor_is_private?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HaveMethod {
    Exactly,
    AtLeast,
    AtMost,
}

impl HaveMethod {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "have" | "have_exactly" => Some(HaveMethod::Exactly),
            "have_at_least" => Some(HaveMethod::AtLeast),
            "have_at_most" => Some(HaveMethod::AtMost),
            _ => None,
        }
    }

    /// Text around the count expression in the should form.
    fn should_matcher(self) -> (&'static str, &'static str) {
        match self {
            HaveMethod::Exactly => ("== ", ""),
            HaveMethod::AtLeast => (">= ", ""),
            HaveMethod::AtMost => ("<= ", ""),
        }
    }

    /// Text around the count expression in the expect form.
    fn expect_matcher(self, parenthesize: bool) -> (&'static str, &'static str) {
        match self {
            HaveMethod::Exactly if parenthesize => ("eq(", ")"),
            HaveMethod::Exactly => ("eq ", ""),
            HaveMethod::AtLeast => ("be >= ", ""),
            HaveMethod::AtMost => ("be <= ", ""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Have {
    /// The `have(n).items` call.
    node: NodeId,
    have_call: NodeId,
    method: HaveMethod,
    size: NodeId,
    expectation: Expectation,
}

impl Have {
    fn have_name<'t>(&self, tree: &'t SyntaxTree) -> &'t str {
        call::method_name(tree, self.have_call).unwrap_or("have")
    }

    fn items_name<'t>(&self, tree: &'t SyntaxTree) -> &'t str {
        call::method_name(tree, self.node).unwrap_or("items")
    }

    fn is_owner(&self, cx: &PlanContext<'_>) -> bool {
        cx.fact_bool(self.expectation.subject(), OWNER_KEY)
            .unwrap_or(true)
    }

    fn is_private(&self, cx: &PlanContext<'_>) -> bool {
        cx.fact_bool(self.expectation.subject(), PRIVATE_KEY)
            .unwrap_or(false)
    }

    /// First supported query method by priority; `size` without facts.
    fn query_method(&self, cx: &PlanContext<'_>) -> &'static str {
        let available = cx
            .fact_strings(self.expectation.subject(), QUERY_KEY)
            .unwrap_or_default();
        QUERY_METHOD_PRIORITIES
            .into_iter()
            .find(|m| available.iter().any(|a| a.as_str() == *m))
            .unwrap_or(QUERY_METHOD_PRIORITIES[0])
    }

    fn expect_form(&self, cx: &PlanContext<'_>) -> bool {
        match self.expectation {
            Expectation::Expect { .. } => true,
            Expectation::Should { call, .. } => cx.is_expectized(call),
        }
    }
}

impl Syntax for Have {
    const NAME: &'static str = "have";

    fn matches(tree: &SyntaxTree, node: NodeId) -> bool {
        let Some(have_call) = call::receiver(tree, node) else {
            return false;
        };
        call::is_call(tree, node)
            && call::argument_list(tree, node).is_none()
            && call::block(tree, node).is_none()
            && call::receiver(tree, have_call).is_none()
            && call::method_name(tree, have_call)
                .and_then(HaveMethod::from_name)
                .is_some()
            && call::arguments(tree, have_call).len() == 1
    }

    fn build(tree: &SyntaxTree, node: NodeId) -> Option<Self> {
        let have_call = call::receiver(tree, node)?;
        Some(Have {
            node,
            have_call,
            method: HaveMethod::from_name(call::method_name(tree, have_call)?)?,
            size: call::arguments(tree, have_call).first().copied()?,
            expectation: call::expectation_of_matcher(tree, node)?,
        })
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn scope(&self, _tree: &SyntaxTree) -> NodeId {
        self.expectation.call()
    }

    fn category(&self) -> Category {
        Category::HaveItems
    }

    fn register_probes(&self, tree: &SyntaxTree, sink: &mut ProbeSink) {
        let subject = self.expectation.subject();
        let items = self.items_name(tree);
        let queries = "[:size, :count, :length]";
        let owner = format!("respond_to?(:{items}) || (methods & {queries}).empty?");
        sink.value(
            subject,
            QUERY_KEY,
            format!("target = ({owner}) ? {items} : self; target.methods & {queries}"),
        );
        sink.value(subject, OWNER_KEY, owner);
        sink.value(
            subject,
            PRIVATE_KEY,
            format!("private_methods.include?(:{items})"),
        );
    }

    fn plan(&self, cx: &PlanContext<'_>) -> Result<Plan, Declined> {
        cx.require(Category::HaveItems)?;
        let tree = cx.tree;
        let subject = self.expectation.subject();
        let subject_span = tree.span(subject);
        let items = self.items_name(tree);
        let query = self.query_method(cx);
        let owner = self.is_owner(cx);
        let private = self.is_private(cx);

        let accessor = match (owner, private) {
            (false, _) => String::new(),
            (true, true) => format!(".send(:{items})"),
            (true, false) => format!(".{items}"),
        };

        // A converted `(subject).should` lends its parentheses to `expect`,
        // so the query needs its own pair.
        let expect_form = self.expect_form(cx);
        let lends_parentheses = matches!(self.expectation, Expectation::Should { .. })
            && expect_form
            && call::in_parentheses(tree, subject);

        let mut plan = Plan::default();
        if call::is_primary(tree, subject) && !lends_parentheses {
            plan.edit(Edit::insert_after(
                subject_span.end,
                format!("{accessor}.{query}"),
            ));
        } else {
            plan.edit(Edit::insert_before(subject_span.start, "("));
            plan.edit(Edit::insert_after(
                subject_span.end,
                format!("){accessor}.{query}"),
            ));
        }

        let parenthesize = cx.config.parenthesize_matcher_arg;
        let (head, tail) = if expect_form {
            self.method.expect_matcher(parenthesize)
        } else {
            self.method.should_matcher()
        };
        // The count expression itself is left for other constructs.
        let matcher_span = tree.span(self.node);
        let size_span = tree.span(self.size);
        plan.edit(Edit::replace(
            Span::new(matcher_span.start, size_span.start),
            head,
        ));
        plan.edit(Edit::replace(Span::new(size_span.end, matcher_span.end), tail));

        let (original_subject, original_items) = if owner {
            ("obj", items)
        } else {
            ("collection", "items")
        };
        let converted_subject = match (owner, private) {
            (false, _) => format!("collection.{}", QUERY_METHOD_PRIORITIES[0]),
            (true, true) => format!("obj.send(:{items}).{query}"),
            (true, false) => format!("obj.{items}.{query}"),
        };
        let original_expectation = match self.expectation {
            Expectation::Should { .. } => format!("{original_subject}.should"),
            Expectation::Expect { .. } => format!("expect({original_subject}).to"),
        };
        let converted_expectation = if expect_form {
            format!("expect({converted_subject}).to")
        } else {
            format!("{converted_subject}.should")
        };
        let converted_matcher = format!("{head}n{tail}");
        plan.record(
            format!(
                "{original_expectation} {}(n).{original_items}",
                self.have_name(tree)
            ),
            format!("{converted_expectation} {converted_matcher}"),
        );
        Ok(plan)
    }
}

// ============================================================================
// Tests
// ============================================================================
