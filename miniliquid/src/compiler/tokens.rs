use std::fmt;

/// A token of the template source.
///
/// Trim markers are only recorded here.  They are applied by the parser to
/// the neighboring text nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'s> {
    pub kind: TokenKind<'s>,
    /// The line the token starts on (1-based).
    pub line: usize,
    /// `{{-`, `{%-` or `{#-`: strip whitespace before the token.
    pub trim_left: bool,
    /// `-}}`, `-%}` or `-#}`: strip whitespace after the token.
    pub trim_right: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'s> {
    /// Literal template text.
    Text(&'s str),
    /// The markup of an output block (`{{ ... }}`).
    Output(&'s str),
    /// A tag (`{% name markup %}`).
    Tag { name: &'s str, markup: &'s str },
    /// The verbatim content of a raw block.
    Raw(&'s str),
    /// An inline comment (`{# ... #}`).
    Comment,
    /// An unterminated or empty delimiter.
    Malformed(&'s str),
}

/// A token of tag or output markup.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupToken<'a> {
    /// An identifier.  May contain dashes and end with a question mark.
    Ident(&'a str),
    /// A string literal without the quotes.
    Str(&'a str),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// `.`
    Dot,
    /// `..`
    DotDot,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `|`
    Pipe,
    /// `=`
    Assign,
    /// `==`
    Eq,
    /// `!=` or `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `[`
    BracketOpen,
    /// `]`
    BracketClose,
    /// `(`
    ParenOpen,
    /// `)`
    ParenClose,
}

impl fmt::Display for MarkupToken<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkupToken::Ident(_) => f.write_str("id"),
            MarkupToken::Str(_) => f.write_str("string"),
            MarkupToken::Int(_) | MarkupToken::Float(_) => f.write_str("number"),
            MarkupToken::Dot => f.write_str("dot"),
            MarkupToken::DotDot => f.write_str("dotdot"),
            MarkupToken::Comma => f.write_str("comma"),
            MarkupToken::Colon => f.write_str("colon"),
            MarkupToken::Pipe => f.write_str("pipe"),
            MarkupToken::Assign => f.write_str("equals"),
            MarkupToken::Eq
            | MarkupToken::Ne
            | MarkupToken::Lt
            | MarkupToken::Lte
            | MarkupToken::Gt
            | MarkupToken::Gte => f.write_str("comparison"),
            MarkupToken::BracketOpen => f.write_str("open_square"),
            MarkupToken::BracketClose => f.write_str("close_square"),
            MarkupToken::ParenOpen => f.write_str("open_round"),
            MarkupToken::ParenClose => f.write_str("close_round"),
        }
    }
}
