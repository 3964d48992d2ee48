//! Immutable syntax tree for Ruby sources.
//!
//! The tree-sitter parse tree is copied into an arena of [`SyntaxNode`]s
//! addressed by [`NodeId`]. Nodes are stored in pre-order, so a node's
//! descendants occupy the contiguous id range right after it and iterating
//! ids in order is a top-down, left-to-right traversal. Parent links are
//! plain ids, which keeps the tree `Send + Sync` and free of lifetimes.

use expectify_core::error::ParseError;
use expectify_core::patch::Span;
use tree_sitter::{Node, Parser};

/// Handle to a node in a [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Position of the node in pre-order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node of the arena.
#[derive(Debug, Clone)]
pub struct SyntaxNode {
    /// Grammar kind name (`call`, `identifier`, `argument_list`, ...).
    pub kind: &'static str,
    /// False for anonymous tokens such as `.` or `(`.
    pub named: bool,
    /// Field name under which the parent holds this node.
    pub field: Option<&'static str>,
    pub span: Span,
    /// 1-indexed line.
    pub line: u32,
    /// 1-indexed byte column.
    pub col: u32,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// One past the last descendant id.
    subtree_end: u32,
}

/// A parsed source file.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    source: String,
    nodes: Vec<SyntaxNode>,
}

impl SyntaxTree {
    /// Parse `source`. Any error or missing node makes the whole file a
    /// [`ParseError`] located at the first such node.
    pub fn parse(source: impl Into<String>) -> Result<Self, ParseError> {
        let source = source.into();
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_ruby::LANGUAGE.into())
            .map_err(|e| ParseError {
                line: 1,
                col: 1,
                message: format!("parser setup failed: {e}"),
            })?;
        let ts_tree = parser.parse(&source, None).ok_or_else(|| ParseError {
            line: 1,
            col: 1,
            message: "parser produced no tree".to_string(),
        })?;

        let root = ts_tree.root_node();
        if root.has_error() {
            return Err(first_error(root, &source));
        }

        let nodes = copy_tree(root);
        Ok(SyntaxTree { source, nodes })
    }

    /// The full source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The `program` node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &'static str {
        self.node(id).kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    /// Source text covered by the node.
    pub fn text(&self, id: NodeId) -> &str {
        let span = self.span(id);
        self.source.get(span.start..span.end).unwrap_or("")
    }

    /// Source text of an arbitrary range.
    pub fn slice(&self, span: Span) -> &str {
        self.source.get(span.start..span.end).unwrap_or("")
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// All children, anonymous tokens included.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Named children, excluding comments.
    pub fn named_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).iter().copied().filter(move |&child| {
            let node = self.node(child);
            node.named && node.kind != "comment"
        })
    }

    /// The child stored under `field`.
    pub fn child_by_field(&self, id: NodeId, field: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&child| self.node(child).field == Some(field))
    }

    /// The field under which `id` is held by its parent.
    pub fn field(&self, id: NodeId) -> Option<&'static str> {
        self.node(id).field
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    /// Every node in pre-order.
    pub fn preorder(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Strict descendants of `id` in pre-order.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> {
        (id.0 + 1..self.node(id).subtree_end).map(NodeId)
    }

    /// Whether `id` or any descendant has the given kind.
    pub fn contains_kind(&self, id: NodeId, kind: &str) -> bool {
        self.kind(id) == kind || self.descendants(id).any(|d| self.kind(d) == kind)
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        ancestor <= id && id.0 < self.node(ancestor).subtree_end
    }
}

/// Iterator over a node's ancestors.
pub struct Ancestors<'t> {
    tree: &'t SyntaxTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

fn copy_tree(root: Node<'_>) -> Vec<SyntaxNode> {
    let mut nodes: Vec<SyntaxNode> = Vec::new();
    let mut open: Vec<NodeId> = Vec::new();
    let mut cursor = root.walk();

    'walk: loop {
        let node = cursor.node();
        let id = NodeId(nodes.len() as u32);
        let parent = open.last().copied();
        let start = node.start_position();
        nodes.push(SyntaxNode {
            kind: node.kind(),
            named: node.is_named(),
            field: cursor.field_name(),
            span: Span::new(node.start_byte(), node.end_byte()),
            line: start.row as u32 + 1,
            col: start.column as u32 + 1,
            parent,
            children: Vec::new(),
            subtree_end: id.0 + 1,
        });
        if let Some(parent) = parent {
            nodes[parent.index()].children.push(id);
        }

        if cursor.goto_first_child() {
            open.push(id);
            continue;
        }

        loop {
            if cursor.goto_next_sibling() {
                continue 'walk;
            }
            if !cursor.goto_parent() {
                break 'walk;
            }
            if let Some(closed) = open.pop() {
                nodes[closed.index()].subtree_end = nodes.len() as u32;
            }
        }
    }

    nodes
}

fn first_error(root: Node<'_>, source: &str) -> ParseError {
    let mut cursor = root.walk();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let position = node.start_position();
            let message = if node.is_missing() {
                format!("missing `{}`", node.kind())
            } else {
                let text = source
                    .get(node.start_byte()..node.end_byte())
                    .unwrap_or("")
                    .lines()
                    .next()
                    .unwrap_or("")
                    .trim();
                if text.is_empty() {
                    "unexpected end of input".to_string()
                } else {
                    format!("unexpected `{}`", truncate(text, 40))
                }
            };
            return ParseError {
                line: position.row as u32 + 1,
                col: position.column as u32 + 1,
                message,
            };
        }
        if node.has_error() {
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    ParseError {
        line: 1,
        col: 1,
        message: "syntax error".to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

// ============================================================================
// Tests
// ============================================================================
