use std::fmt;

use crate::error::Error;
use crate::tags::Renderable;
use crate::value::Value;

/// A parsed expression.
///
/// Expressions are produced by the markup parser and evaluated with
/// [`State::eval`](crate::State::eval).
#[derive(Debug, Clone)]
pub enum Expr {
    /// A literal value.
    Const(Value),
    /// A variable lookup like `product.variants[0].title`.
    Var(Box<VarLookup>),
    /// An inclusive range like `(1..limit)`.
    Range(Box<Expr>, Box<Expr>),
    /// The `empty` literal.
    Empty,
    /// The `blank` literal.
    Blank,
}

/// The root of a variable lookup.
#[derive(Debug, Clone)]
pub enum VarRoot {
    /// A plain name: `product`.
    Name(String),
    /// A computed name: `['product']` or `[key]`.
    Dynamic(Expr),
}

/// One step in a variable lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// `.name`
    Attr(String),
    /// `[expr]`
    Item(Expr),
}

#[derive(Debug, Clone)]
pub struct VarLookup {
    pub root: VarRoot,
    pub lookups: Vec<Lookup>,
}

impl VarLookup {
    /// Returns the root name if it's a plain name.
    pub fn name(&self) -> Option<&str> {
        match self.root {
            VarRoot::Name(ref name) => Some(name),
            VarRoot::Dynamic(_) => None,
        }
    }
}

/// A filter invocation: `| name: arg, key: value`.
#[derive(Debug, Clone)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub kwargs: Vec<(String, Expr)>,
}

/// An expression followed by a filter pipeline.
#[derive(Debug, Clone)]
pub struct Filtered {
    pub expr: Expr,
    pub filters: Vec<FilterCall>,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
}

/// A boolean condition as used by `if`, `unless` and `elsif`.
#[derive(Debug, Clone)]
pub enum Condition {
    /// A single expression or a comparison of two expressions.
    Compare {
        left: Expr,
        op: Option<(CompareOp, Expr)>,
    },
    /// Both conditions need to hold.
    And(Box<Condition>, Box<Condition>),
    /// One of the conditions needs to hold.
    Or(Box<Condition>, Box<Condition>),
}

/// A node in the template tree.
pub enum Node {
    /// Literal text.
    Text(String),
    /// The verbatim content of a raw block.
    Raw(String),
    /// An output block.
    Output { expr: Filtered, line: usize },
    /// A tag.
    Tag {
        name: String,
        line: usize,
        renderable: Box<dyn Renderable>,
    },
    /// A parse error kept in the tree to be rendered in its place.
    Error(Error),
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Node::Raw(text) => f.debug_tuple("Raw").field(text).finish(),
            Node::Output { expr, line } => f
                .debug_struct("Output")
                .field("expr", expr)
                .field("line", line)
                .finish(),
            Node::Tag { name, line, .. } => f
                .debug_struct("Tag")
                .field("name", name)
                .field("line", line)
                .finish(),
            Node::Error(err) => f.debug_tuple("Error").field(err).finish(),
        }
    }
}

/// A sequence of nodes, the body of a template or a block tag.
#[derive(Debug, Default)]
pub struct Body {
    pub(crate) nodes: Vec<Node>,
}

impl Body {
    pub(crate) fn new(nodes: Vec<Node>) -> Body {
        Body { nodes }
    }

    /// Returns `true` if the body has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if the body only renders whitespace.
    ///
    /// Text counts as blank if it is whitespace only, tags ask their
    /// renderable.
    pub fn is_blank(&self) -> bool {
        self.nodes.iter().all(|node| match node {
            Node::Text(text) => text.trim().is_empty(),
            Node::Tag { renderable, .. } => renderable.is_blank(),
            _ => false,
        })
    }

    /// Drops the text nodes.  Used for blank block bodies so that they
    /// render nothing at all.
    pub(crate) fn remove_blank_text(&mut self) {
        self.nodes.retain(|node| !matches!(node, Node::Text(_)));
    }
}
