//! Patch IR: spans, edits and content hashes.
//!
//! Every conversion is expressed as a list of [`Edit`]s against the original
//! source buffer. Edits are never applied one by one; the
//! [`Rewriter`](crate::rewrite::Rewriter) orders them, checks them for
//! conflicts and materializes the result in a single pass.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hash type for content verification (SHA-256, stored as hex string for JSON compatibility).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute SHA-256 hash of the given bytes, returning hex-encoded string.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Span
// ============================================================================

/// Byte offsets into a source buffer.
///
/// Spans are half-open intervals: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a new span.
    ///
    /// # Panics
    /// Panics if `start > end`.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(
            start <= end,
            "Span start ({}) must be <= end ({})",
            start,
            end
        );
        Span { start, end }
    }

    /// A zero-width span at `position`.
    pub fn at(position: usize) -> Self {
        Span {
            start: position,
            end: position,
        }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check if this span overlaps with another.
    ///
    /// Adjacent spans (one ends where another starts) do NOT overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Check if this span contains another span entirely.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Check if `position` lies within the span, boundaries included.
    pub fn contains_position(&self, position: usize) -> bool {
        self.start <= position && position <= self.end
    }

    /// The smallest span covering both spans.
    pub fn join(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// The text covered by this span, or `None` if it is out of bounds or
    /// does not fall on character boundaries.
    pub fn slice<'a>(&self, source: &'a str) -> Option<&'a str> {
        source.get(self.start..self.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ============================================================================
// Edits
// ============================================================================

/// The kind of an [`Edit`].
///
/// The declaration order is the tie-break order for edits at the same
/// position: a leading insertion applies before the content it decorates,
/// a trailing insertion after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    /// Insert text at `span.start` (zero-width span).
    InsertBefore,
    /// Replace the bytes in `span` with text.
    Replace,
    /// Remove the bytes in `span`.
    Remove,
    /// Insert text at `span.start` (zero-width span), after anything else
    /// anchored at that position.
    InsertAfter,
}

impl EditKind {
    /// Returns true if the edit consumes bytes of the original source.
    pub fn is_destructive(self) -> bool {
        matches!(self, EditKind::Replace | EditKind::Remove)
    }

    pub(crate) fn rank(self) -> u8 {
        match self {
            EditKind::InsertBefore => 0,
            EditKind::Replace | EditKind::Remove => 1,
            EditKind::InsertAfter => 2,
        }
    }
}

/// Which construct produced an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOrigin {
    /// Index of the construct in its file's detection order.
    pub index: usize,
    /// Short name of the construct variant (e.g. `should`).
    pub construct: &'static str,
}

/// A single text operation against the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// What the edit does.
    pub kind: EditKind,
    /// Target range; zero-width for insertions.
    pub span: Span,
    /// Inserted or replacement text (empty for removals).
    pub text: String,
    /// Producing construct, if any.
    pub origin: Option<EditOrigin>,
}

impl Edit {
    /// Replace `span` with `text`.
    pub fn replace(span: Span, text: impl Into<String>) -> Self {
        Edit {
            kind: EditKind::Replace,
            span,
            text: text.into(),
            origin: None,
        }
    }

    /// Remove `span`.
    pub fn remove(span: Span) -> Self {
        Edit {
            kind: EditKind::Remove,
            span,
            text: String::new(),
            origin: None,
        }
    }

    /// Insert `text` before anything else anchored at `position`.
    pub fn insert_before(position: usize, text: impl Into<String>) -> Self {
        Edit {
            kind: EditKind::InsertBefore,
            span: Span::at(position),
            text: text.into(),
            origin: None,
        }
    }

    /// Insert `text` after anything else anchored at `position`.
    pub fn insert_after(position: usize, text: impl Into<String>) -> Self {
        Edit {
            kind: EditKind::InsertAfter,
            span: Span::at(position),
            text: text.into(),
            origin: None,
        }
    }

    /// Tag the edit with the construct that produced it.
    pub fn with_origin(mut self, origin: EditOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// The byte position where this edit takes effect.
    pub fn position(&self) -> usize {
        self.span.start
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_overlap_excludes_adjacent() {
        let a = Span::new(0, 5);
        let b = Span::new(5, 8);
        let c = Span::new(4, 6);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn span_containment() {
        let outer = Span::new(2, 10);
        assert!(outer.contains(&Span::new(2, 10)));
        assert!(outer.contains(&Span::new(3, 4)));
        assert!(!outer.contains(&Span::new(1, 4)));
        assert!(outer.contains_position(10));
        assert!(!outer.contains_position(11));
    }

    #[test]
    fn span_join_and_slice() {
        let joined = Span::new(4, 6).join(&Span::new(0, 2));
        assert_eq!(joined, Span::new(0, 6));
        assert_eq!(joined.slice("obj.should"), Some("obj.sh"));
        assert_eq!(Span::new(0, 100).slice("obj"), None);
    }

    #[test]
    #[should_panic(expected = "must be <= end")]
    fn span_rejects_inverted_bounds() {
        let _ = Span::new(5, 2);
    }

    #[test]
    fn edit_kind_tie_break_order() {
        assert!(EditKind::InsertBefore.rank() < EditKind::Replace.rank());
        assert_eq!(EditKind::Replace.rank(), EditKind::Remove.rank());
        assert!(EditKind::Remove.rank() < EditKind::InsertAfter.rank());
        assert!(EditKind::Remove.is_destructive());
        assert!(!EditKind::InsertAfter.is_destructive());
    }

    #[test]
    fn content_hash_is_stable() {
        let a = ContentHash::compute(b"obj.should eq(1)\n");
        let b = ContentHash::compute(b"obj.should eq(1)\n");
        let c = ContentHash::compute(b"expect(obj).to eq(1)\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.0.len(), 64);
    }
}
