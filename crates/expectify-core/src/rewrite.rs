//! Single-pass source rewriter.
//!
//! [`Rewriter`] collects [`Edit`]s against one source buffer and applies them
//! all at once. Spans always refer to the original text, so edits never have
//! to account for each other's length changes.
//!
//! # Ordering
//!
//! Edits are sorted by `(position, kind rank, sequence)`:
//!
//! | Kind | Rank | Same-position order |
//! |------|------|---------------------|
//! | `InsertBefore` | 0 | insertion order |
//! | `Replace` / `Remove` | 1 | shorter span first |
//! | `InsertAfter` | 2 | reverse insertion order |
//!
//! Reversing trailing insertions makes nested wrappers close inside-out:
//! an outer `(`...`)` pair registered before an inner one at the same
//! boundaries yields `((x))`, never `((x)`-then-`)` interleavings.
//!
//! # Conflicts
//!
//! Two destructive edits whose spans overlap, or an insertion strictly
//! inside a destructive span, are a [`RewriteError::Conflict`]. Nothing is
//! silently dropped.
//!
//! # Example
//!
//! ```
//! use expectify_core::patch::{Edit, Span};
//! use expectify_core::rewrite::Rewriter;
//!
//! let source = "obj.should eq(1)";
//! let mut rewriter = Rewriter::new(source);
//! rewriter.add(Edit::insert_before(0, "expect(")).unwrap();
//! rewriter.add(Edit::replace(Span::new(3, 10), ").to")).unwrap();
//! assert_eq!(rewriter.apply().unwrap(), "expect(obj).to eq(1)");
//! ```

use thiserror::Error;
use tracing::trace;

use crate::patch::{Edit, EditKind, EditOrigin, Span};

/// Error type for rewrite operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    /// Two edits claim the same bytes.
    #[error("conflicting edits at {first} and {second}")]
    Conflict {
        first: Span,
        second: Span,
        first_origin: Option<EditOrigin>,
        second_origin: Option<EditOrigin>,
    },

    /// An edit span extends beyond source length.
    #[error("span {span} is out of bounds for source of length {source_len}")]
    OutOfBounds { span: Span, source_len: usize },

    /// An edit boundary splits a UTF-8 character.
    #[error("span {span} does not fall on character boundaries")]
    NotCharBoundary { span: Span },

    /// An edit escapes the node that bounds its construct.
    #[error("edit at {span} lies outside its scope {scope}")]
    OutsideScope { span: Span, scope: Span },
}

/// Result type for rewrite operations.
pub type RewriteResult<T> = Result<T, RewriteError>;

#[derive(Debug, Clone)]
struct Pending {
    edit: Edit,
    seq: usize,
}

impl Pending {
    fn sort_key(&self) -> (usize, u8, usize, usize) {
        let kind = self.edit.kind;
        let width = if kind.is_destructive() {
            self.edit.span.end
        } else {
            0
        };
        let order = if kind == EditKind::InsertAfter {
            usize::MAX - self.seq
        } else {
            self.seq
        };
        (self.edit.span.start, kind.rank(), width, order)
    }
}

/// Collects edits for one source buffer and materializes the result.
#[derive(Debug)]
pub struct Rewriter<'src> {
    source: &'src str,
    pending: Vec<Pending>,
}

impl<'src> Rewriter<'src> {
    /// Create a rewriter over `source`.
    pub fn new(source: &'src str) -> Self {
        Rewriter {
            source,
            pending: Vec::new(),
        }
    }

    /// Accept an edit after checking that its span is valid for the source.
    pub fn add(&mut self, edit: Edit) -> RewriteResult<()> {
        let span = edit.span;
        if span.end > self.source.len() {
            return Err(RewriteError::OutOfBounds {
                span,
                source_len: self.source.len(),
            });
        }
        if !self.source.is_char_boundary(span.start) || !self.source.is_char_boundary(span.end) {
            return Err(RewriteError::NotCharBoundary { span });
        }
        let seq = self.pending.len();
        self.pending.push(Pending { edit, seq });
        Ok(())
    }

    /// Accept an edit that must lie within `scope`.
    pub fn add_scoped(&mut self, edit: Edit, scope: Span) -> RewriteResult<()> {
        if !scope.contains(&edit.span) {
            return Err(RewriteError::OutsideScope {
                span: edit.span,
                scope,
            });
        }
        self.add(edit)
    }

    /// Accept several edits, stopping at the first invalid one.
    pub fn add_all(&mut self, edits: impl IntoIterator<Item = Edit>) -> RewriteResult<()> {
        for edit in edits {
            self.add(edit)?;
        }
        Ok(())
    }

    /// Number of accepted edits.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if no edits were accepted.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply all accepted edits in one walk over the source.
    ///
    /// With no edits the output is byte-identical to the input.
    pub fn apply(mut self) -> RewriteResult<String> {
        if self.pending.is_empty() {
            return Ok(self.source.to_string());
        }

        self.pending.sort_by_key(Pending::sort_key);

        let mut output = String::with_capacity(self.source.len() + self.source.len() / 4);
        let mut cursor = 0usize;
        let mut last_destructive: Option<&Edit> = None;

        for pending in &self.pending {
            let edit = &pending.edit;
            if edit.kind.is_destructive() {
                if edit.span.start < cursor {
                    return Err(conflict(last_destructive, edit));
                }
                output.push_str(&self.source[cursor..edit.span.start]);
                output.push_str(&edit.text);
                cursor = edit.span.end;
                last_destructive = Some(edit);
            } else {
                let position = edit.position();
                if position < cursor {
                    // Only a trailing insertion at the very start of a
                    // replaced range may land here without conflicting.
                    match last_destructive {
                        Some(prev) if position == prev.span.start => {}
                        _ => return Err(conflict(last_destructive, edit)),
                    }
                } else {
                    output.push_str(&self.source[cursor..position]);
                    cursor = position;
                }
                output.push_str(&edit.text);
            }
        }

        output.push_str(&self.source[cursor..]);
        trace!(edits = self.pending.len(), "applied edits");
        Ok(output)
    }
}

fn conflict(previous: Option<&Edit>, current: &Edit) -> RewriteError {
    let (first, first_origin) = match previous {
        Some(prev) => (prev.span, prev.origin),
        None => (current.span, None),
    };
    RewriteError::Conflict {
        first,
        second: current.span,
        first_origin,
        second_origin: current.origin,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(source: &str, edits: Vec<Edit>) -> RewriteResult<String> {
        let mut rewriter = Rewriter::new(source);
        rewriter.add_all(edits)?;
        rewriter.apply()
    }

    mod apply_tests {
        use super::*;

        #[test]
        fn test_no_edits_is_identity() {
            let source = "describe Foo do\n  # comment\t\n  it { }\nend\n";
            assert_eq!(rewrite(source, vec![]).unwrap(), source);
        }

        #[test]
        fn test_replace_single_span() {
            let out = rewrite("obj.stub(:foo)", vec![Edit::replace(Span::new(3, 8), ").to receive")])
                .unwrap();
            assert_eq!(out, "obj).to receive(:foo)");
        }

        #[test]
        fn test_wrap_and_replace() {
            let out = rewrite(
                "obj.should eq(1)",
                vec![
                    Edit::insert_before(0, "expect("),
                    Edit::replace(Span::new(3, 10), ").to"),
                ],
            )
            .unwrap();
            assert_eq!(out, "expect(obj).to eq(1)");
        }

        #[test]
        fn test_remove_span() {
            let source = "obj.stub(:a).any_number_of_times";
            let out = rewrite(source, vec![Edit::remove(Span::new(12, source.len()))]).unwrap();
            assert_eq!(out, "obj.stub(:a)");
        }

        #[test]
        fn test_edits_order_independent_of_insertion() {
            let a = rewrite(
                "a + b",
                vec![Edit::replace(Span::new(4, 5), "c"), Edit::replace(Span::new(0, 1), "z")],
            )
            .unwrap();
            assert_eq!(a, "z + c");
        }

        #[test]
        fn test_insert_before_precedes_replace_at_same_position() {
            let out = rewrite(
                "mock('x')",
                vec![
                    Edit::replace(Span::new(0, 4), "double"),
                    Edit::insert_before(0, "expect("),
                ],
            )
            .unwrap();
            assert_eq!(out, "expect(double('x')");
        }

        #[test]
        fn test_insert_before_at_replace_start_keeps_order() {
            let out = rewrite(
                "obj.should",
                vec![
                    Edit::replace(Span::new(3, 10), ").to"),
                    Edit::insert_before(3, ".items.size"),
                ],
            )
            .unwrap();
            assert_eq!(out, "obj.items.size).to");
        }

        #[test]
        fn test_insert_after_follows_replace_at_same_position() {
            let out = rewrite(
                "ab",
                vec![Edit::insert_after(1, "]"), Edit::replace(Span::new(1, 1), "[")],
            )
            .unwrap();
            assert_eq!(out, "a[]b");
        }

        #[test]
        fn test_nested_wrappers_close_inside_out() {
            let out = rewrite(
                "x",
                vec![
                    Edit::insert_before(0, "outer("),
                    Edit::insert_after(1, ")outer"),
                    Edit::insert_before(0, "inner("),
                    Edit::insert_after(1, ")inner"),
                ],
            )
            .unwrap();
            assert_eq!(out, "outer(inner(x)inner)outer");
        }

        #[test]
        fn test_insertions_at_destructive_boundaries_compose() {
            let out = rewrite(
                "abc",
                vec![
                    Edit::replace(Span::new(1, 2), "B"),
                    Edit::insert_before(1, "<"),
                    Edit::insert_after(2, ">"),
                ],
            )
            .unwrap();
            assert_eq!(out, "a<B>c");
        }

        #[test]
        fn test_unicode_multibyte_spans() {
            let source = "name = \"日本\"; obj.should";
            let start = source.find(".should").unwrap();
            let out = rewrite(source, vec![Edit::replace(Span::new(start, source.len()), "!")])
                .unwrap();
            assert_eq!(out, "name = \"日本\"; obj!");
        }
    }

    mod conflict_tests {
        use super::*;

        #[test]
        fn test_overlapping_replacements_conflict() {
            let err = rewrite(
                "obj.should eq(1)",
                vec![
                    Edit::replace(Span::new(0, 10), "x"),
                    Edit::replace(Span::new(4, 16), "y"),
                ],
            )
            .unwrap_err();
            assert_eq!(
                err,
                RewriteError::Conflict {
                    first: Span::new(0, 10),
                    second: Span::new(4, 16),
                    first_origin: None,
                    second_origin: None,
                }
            );
        }

        #[test]
        fn test_overlap_reports_origins() {
            let origin = |index| EditOrigin {
                index,
                construct: "should",
            };
            let err = rewrite(
                "abcdef",
                vec![
                    Edit::remove(Span::new(0, 4)).with_origin(origin(0)),
                    Edit::remove(Span::new(2, 6)).with_origin(origin(1)),
                ],
            )
            .unwrap_err();
            match err {
                RewriteError::Conflict {
                    first_origin,
                    second_origin,
                    ..
                } => {
                    assert_eq!(first_origin, Some(origin(0)));
                    assert_eq!(second_origin, Some(origin(1)));
                }
                other => panic!("expected conflict, got {other:?}"),
            }
        }

        #[test]
        fn test_insertion_inside_replacement_conflicts() {
            let err = rewrite(
                "abcdef",
                vec![Edit::replace(Span::new(1, 5), "x"), Edit::insert_before(3, "!")],
            )
            .unwrap_err();
            assert!(matches!(err, RewriteError::Conflict { .. }));
        }

        #[test]
        fn test_adjacent_replacements_allowed() {
            let out = rewrite(
                "abcdef",
                vec![Edit::replace(Span::new(0, 3), "X"), Edit::replace(Span::new(3, 6), "Y")],
            )
            .unwrap();
            assert_eq!(out, "XY");
        }

        #[test]
        fn test_contained_replacement_conflicts() {
            let err = rewrite(
                "abcdef",
                vec![Edit::remove(Span::new(0, 6)), Edit::replace(Span::new(2, 3), "z")],
            )
            .unwrap_err();
            assert!(matches!(err, RewriteError::Conflict { .. }));
        }
    }

    mod validation_tests {
        use super::*;

        #[test]
        fn test_span_out_of_bounds_error() {
            let mut rewriter = Rewriter::new("abc");
            let err = rewriter.add(Edit::remove(Span::new(1, 10))).unwrap_err();
            assert_eq!(
                err,
                RewriteError::OutOfBounds {
                    span: Span::new(1, 10),
                    source_len: 3,
                }
            );
            assert!(rewriter.is_empty());
        }

        #[test]
        fn test_char_boundary_rejected() {
            let mut rewriter = Rewriter::new("日本");
            let err = rewriter.add(Edit::insert_before(1, "x")).unwrap_err();
            assert!(matches!(err, RewriteError::NotCharBoundary { .. }));
        }

        #[test]
        fn test_scope_enforced() {
            let mut rewriter = Rewriter::new("foo(obj.should)");
            let scope = Span::new(4, 14);
            rewriter
                .add_scoped(Edit::insert_before(4, "expect("), scope)
                .unwrap();
            let err = rewriter
                .add_scoped(Edit::insert_after(15, ")"), scope)
                .unwrap_err();
            assert_eq!(
                err,
                RewriteError::OutsideScope {
                    span: Span::at(15),
                    scope,
                }
            );
            assert_eq!(rewriter.len(), 1);
        }
    }

    mod exactness_tests {
        use super::*;

        #[test]
        fn test_bytes_outside_edits_are_untouched() {
            let source = "before\nobj.should eq(1) # keep  \nafter\n";
            let start = source.find("obj").unwrap();
            let selector = Span::new(start + 3, start + 10);
            let out = rewrite(
                source,
                vec![
                    Edit::insert_before(start, "expect("),
                    Edit::replace(selector, ").to"),
                ],
            )
            .unwrap();
            assert!(out.starts_with(&source[..start]));
            assert!(out.ends_with(&source[selector.end..]));
            assert_eq!(out, "before\nexpect(obj).to eq(1) # keep  \nafter\n");
        }
    }
}
