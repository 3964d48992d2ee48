//! Text position utilities for byte offsets, lines and indentation.
//!
//! ## Coordinate Conventions
//!
//! - Lines and columns are **1-indexed** (matching editor conventions)
//! - Byte offsets are **0-indexed**
//! - Columns count bytes, which is what the syntax tree reports

use crate::patch::Span;

/// Convert a byte offset to 1-indexed line and column.
///
/// If `offset` exceeds content length, returns position at end of content.
pub fn byte_offset_to_position(content: &[u8], offset: usize) -> (u32, u32) {
    let offset = offset.min(content.len());
    let mut line = 1u32;
    let mut col = 1u32;

    for &byte in &content[..offset] {
        if byte == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

/// The span of the line containing `offset`, excluding the line terminator.
pub fn line_span(source: &str, offset: usize) -> Span {
    let bytes = source.as_bytes();
    let offset = offset.min(bytes.len());
    let start = bytes[..offset]
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0);
    let end = bytes[offset..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| offset + p)
        .unwrap_or(bytes.len());
    Span::new(start, end)
}

/// The full text of every line touched by `span`.
///
/// Used for diagnostics: a range's "line text" is what a reader sees when
/// jumping to it.
pub fn line_text(source: &str, span: Span) -> &str {
    let first = line_span(source, span.start);
    let last = line_span(source, span.end.max(span.start));
    source.get(first.start..last.end).unwrap_or("")
}

/// Leading whitespace of the line containing `offset`.
pub fn indentation_of_line(source: &str, offset: usize) -> &str {
    let line = line_span(source, offset);
    let text = &source[line.start..line.end];
    let width = text
        .bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count();
    &text[..width]
}

// ============================================================================
// Tests
// ============================================================================
