use std::borrow::Cow;

use crate::compiler::ast::{CompareOp, Condition, Expr, FilterCall, Filtered, Lookup, VarLookup, VarRoot};
use crate::compiler::lexer::tokenize_markup;
use crate::compiler::tokens::MarkupToken;
use crate::error::{Error, ErrorKind};
use crate::value::Value;

/// Bound for nested brackets and parentheses in markup.
pub const MAX_RECURSION: usize = 100;

macro_rules! syntax_error {
    ($parser:expr, $msg:expr) => {{
        return Err($parser.error(Cow::Borrowed($msg)));
    }};
    ($parser:expr, $msg:expr, $($tt:tt)*) => {{
        return Err($parser.error(Cow::Owned(format!($msg, $($tt)*))));
    }};
}

macro_rules! expect_token {
    ($parser:expr, $match:pat => $target:expr, $expectation:expr) => {{
        match $parser.next() {
            Some($match) => $target,
            Some(token) => syntax_error!($parser, "Expected {} but found {}", $expectation, token),
            None => syntax_error!($parser, "Expected {} but found end_of_string", $expectation),
        }
    }};
}

macro_rules! with_recursion_guard {
    ($parser:expr, $expr:expr) => {{
        $parser.depth += 1;
        if $parser.depth > MAX_RECURSION {
            return Err(Error::new(ErrorKind::StackLevel, "Nesting too deep").fatal());
        }
        let rv = $expr;
        $parser.depth -= 1;
        rv
    }};
}

/// Parses the markup of tags and output blocks.
///
/// Tags use this to parse their arguments:
///
/// ```
/// # use miniliquid::tags::MarkupParser;
/// let mut parser = MarkupParser::new("product in collection.products limit: 2").unwrap();
/// assert_eq!(parser.expect_ident().unwrap(), "product");
/// assert!(parser.skip_ident("in"));
/// let collection = parser.parse_expr().unwrap();
/// let attributes = parser.parse_attributes().unwrap();
/// assert_eq!(attributes.len(), 1);
/// parser.expect_eof().unwrap();
/// ```
pub struct MarkupParser<'a> {
    markup: &'a str,
    tokens: Vec<MarkupToken<'a>>,
    pos: usize,
    depth: usize,
}

impl<'a> MarkupParser<'a> {
    /// Tokenizes the markup and creates a parser for it.
    pub fn new(markup: &'a str) -> Result<MarkupParser<'a>, Error> {
        let tokens = match tokenize_markup(markup) {
            Ok(tokens) => tokens,
            Err(err) => {
                return Err(Error::new(
                    ErrorKind::SyntaxError,
                    format!("{} in \"{}\"", err.message(), markup.trim()),
                ))
            }
        };
        Ok(MarkupParser {
            markup,
            tokens,
            pos: 0,
            depth: 0,
        })
    }

    /// Creates a syntax error that quotes the markup.
    pub fn error(&self, msg: Cow<'static, str>) -> Error {
        Error::new(
            ErrorKind::SyntaxError,
            format!("{} in \"{}\"", msg, self.markup.trim()),
        )
    }

    /// Returns the markup this parser works on.
    pub fn markup(&self) -> &'a str {
        self.markup
    }

    /// Returns `true` if all tokens were consumed.
    pub fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Looks at the current token.
    pub fn peek(&self) -> Option<&MarkupToken<'a>> {
        self.tokens.get(self.pos)
    }

    /// Looks `n` tokens ahead.
    pub fn peek_nth(&self, n: usize) -> Option<&MarkupToken<'a>> {
        self.tokens.get(self.pos + n)
    }

    /// Returns the current identifier without consuming it.
    pub fn peek_ident(&self) -> Option<&'a str> {
        match self.peek() {
            Some(MarkupToken::Ident(ident)) => Some(ident),
            _ => None,
        }
    }

    /// Consumes the current token.
    pub fn next(&mut self) -> Option<MarkupToken<'a>> {
        let rv = self.tokens.get(self.pos).cloned();
        if rv.is_some() {
            self.pos += 1;
        }
        rv
    }

    /// Consumes the current token if it's equal to `token`.
    pub fn skip_token(&mut self, token: &MarkupToken<'_>) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes the current token if it's the given identifier.
    pub fn skip_ident(&mut self, name: &str) -> bool {
        if self.peek_ident() == Some(name) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes an identifier.
    pub fn expect_ident(&mut self) -> Result<&'a str, Error> {
        Ok(expect_token!(self, MarkupToken::Ident(ident) => ident, "id"))
    }

    /// Consumes a specific token.
    pub fn expect(&mut self, token: MarkupToken<'_>) -> Result<(), Error> {
        match self.next() {
            Some(ref found) if *found == token => Ok(()),
            Some(found) => syntax_error!(self, "Expected {} but found {}", token, found),
            None => syntax_error!(self, "Expected {} but found end_of_string", token),
        }
    }

    /// Fails unless all tokens were consumed.
    pub fn expect_eof(&self) -> Result<(), Error> {
        match self.peek() {
            None => Ok(()),
            Some(token) => syntax_error!(self, "Expected end_of_string but found {}", token),
        }
    }

    /// Parses an expression: a literal, a range or a variable lookup.
    pub fn parse_expr(&mut self) -> Result<Expr, Error> {
        with_recursion_guard!(self, self.parse_expr_inner())
    }

    fn parse_expr_inner(&mut self) -> Result<Expr, Error> {
        match self.next() {
            Some(MarkupToken::Str(s)) => Ok(Expr::Const(Value::from(s))),
            Some(MarkupToken::Int(i)) => Ok(Expr::Const(Value::from(i))),
            Some(MarkupToken::Float(f)) => Ok(Expr::Const(Value::from(f))),
            Some(MarkupToken::ParenOpen) => {
                let start = ok!(self.parse_expr());
                ok!(self.expect(MarkupToken::DotDot));
                let end = ok!(self.parse_expr());
                ok!(self.expect(MarkupToken::ParenClose));
                Ok(match (&start, &end) {
                    (Expr::Const(a), Expr::Const(b)) => match (a.as_i64(), b.as_i64()) {
                        (Some(a), Some(b)) => Expr::Const(Value::from_range(a, b)),
                        _ => Expr::Range(Box::new(start), Box::new(end)),
                    },
                    _ => Expr::Range(Box::new(start), Box::new(end)),
                })
            }
            Some(MarkupToken::Ident(ident)) => {
                if !matches!(
                    self.peek(),
                    Some(MarkupToken::Dot | MarkupToken::BracketOpen)
                ) {
                    match ident {
                        "nil" | "null" => return Ok(Expr::Const(Value::NIL)),
                        "true" => return Ok(Expr::Const(Value::from(true))),
                        "false" => return Ok(Expr::Const(Value::from(false))),
                        "empty" => return Ok(Expr::Empty),
                        "blank" => return Ok(Expr::Blank),
                        _ => {}
                    }
                }
                self.parse_lookups(VarRoot::Name(ident.to_string()))
            }
            Some(MarkupToken::BracketOpen) => {
                let root = ok!(self.parse_expr());
                ok!(self.expect(MarkupToken::BracketClose));
                self.parse_lookups(VarRoot::Dynamic(root))
            }
            Some(token) => syntax_error!(self, "{} is not a valid expression", token),
            None => syntax_error!(self, "Expected expression but found end_of_string"),
        }
    }

    fn parse_lookups(&mut self, root: VarRoot) -> Result<Expr, Error> {
        let mut lookups = Vec::new();
        loop {
            if self.skip_token(&MarkupToken::Dot) {
                lookups.push(Lookup::Attr(ok!(self.expect_ident()).to_string()));
            } else if self.skip_token(&MarkupToken::BracketOpen) {
                lookups.push(Lookup::Item(ok!(self.parse_expr())));
                ok!(self.expect(MarkupToken::BracketClose));
            } else {
                break;
            }
        }
        Ok(Expr::Var(Box::new(VarLookup { root, lookups })))
    }

    /// Parses an expression followed by filters.
    pub fn parse_filtered(&mut self) -> Result<Filtered, Error> {
        let expr = ok!(self.parse_expr());
        let filters = ok!(self.parse_filters());
        Ok(Filtered { expr, filters })
    }

    /// Parses a pipeline of filters: `| name: arg, key: value | other`.
    pub fn parse_filters(&mut self) -> Result<Vec<FilterCall>, Error> {
        let mut filters = Vec::new();
        while self.skip_token(&MarkupToken::Pipe) {
            let name = ok!(self.expect_ident()).to_string();
            let mut args = Vec::new();
            let mut kwargs = Vec::new();
            if self.skip_token(&MarkupToken::Colon) {
                loop {
                    match (self.peek(), self.peek_nth(1)) {
                        (Some(MarkupToken::Ident(key)), Some(MarkupToken::Colon)) => {
                            let key = key.to_string();
                            self.pos += 2;
                            kwargs.push((key, ok!(self.parse_expr())));
                        }
                        _ => args.push(ok!(self.parse_expr())),
                    }
                    if !self.skip_token(&MarkupToken::Comma) {
                        break;
                    }
                }
            }
            filters.push(FilterCall { name, args, kwargs });
        }
        Ok(filters)
    }

    /// Parses `key: value` pairs separated by optional commas until the end
    /// of the markup.
    pub fn parse_attributes(&mut self) -> Result<Vec<(String, Expr)>, Error> {
        let mut rv = Vec::new();
        loop {
            self.skip_token(&MarkupToken::Comma);
            match (self.peek(), self.peek_nth(1)) {
                (Some(MarkupToken::Ident(key)), Some(MarkupToken::Colon)) => {
                    let key = key.to_string();
                    self.pos += 2;
                    rv.push((key, ok!(self.parse_expr())));
                }
                _ => return Ok(rv),
            }
        }
    }

    /// Parses a condition.  `and` binds tighter than `or`.
    pub fn parse_condition(&mut self) -> Result<Condition, Error> {
        let mut left = ok!(self.parse_and());
        while self.skip_ident("or") {
            let right = ok!(self.parse_and());
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Condition, Error> {
        let mut left = ok!(self.parse_comparison());
        while self.skip_ident("and") {
            let right = ok!(self.parse_comparison());
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Condition, Error> {
        let left = ok!(self.parse_expr());
        let op = match self.peek() {
            Some(MarkupToken::Eq) => CompareOp::Eq,
            Some(MarkupToken::Ne) => CompareOp::Ne,
            Some(MarkupToken::Lt) => CompareOp::Lt,
            Some(MarkupToken::Lte) => CompareOp::Lte,
            Some(MarkupToken::Gt) => CompareOp::Gt,
            Some(MarkupToken::Gte) => CompareOp::Gte,
            Some(MarkupToken::Ident("contains")) => CompareOp::Contains,
            Some(MarkupToken::Ident("is")) => CompareOp::Eq,
            Some(MarkupToken::Ident("isnt")) => CompareOp::Ne,
            Some(MarkupToken::Ident("and" | "or")) | None => {
                return Ok(Condition::Compare { left, op: None })
            }
            Some(MarkupToken::Ident(other)) => {
                syntax_error!(self, "Unknown operator {}", other)
            }
            Some(token) => syntax_error!(self, "Expected comparison but found {}", token),
        };
        self.pos += 1;
        let right = ok!(self.parse_expr());
        Ok(Condition::Compare {
            left,
            op: Some((op, right)),
        })
    }
}

/// Parses the markup of an output block.
pub fn parse_output(markup: &str) -> Result<Filtered, Error> {
    let mut parser = ok!(MarkupParser::new(markup));
    let rv = ok!(parser.parse_filtered());
    ok!(parser.expect_eof());
    Ok(rv)
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    fn var_name(expr: &Expr) -> Option<&str> {
        match expr {
            Expr::Var(var) => var.name(),
            _ => None,
        }
    }

    #[test]
    fn test_literals() {
        assert!(matches!(parse_output("nil").unwrap().expr, Expr::Const(ref v) if v.is_nil()));
        assert!(matches!(parse_output("empty").unwrap().expr, Expr::Empty));
        assert!(matches!(parse_output("blank").unwrap().expr, Expr::Blank));
        assert_eq!(var_name(&parse_output("empty.size").unwrap().expr), Some("empty"));
        match parse_output("(1..3)").unwrap().expr {
            Expr::Const(value) => assert_eq!(value.to_string(), "1..3"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(parse_output("(1..n)").unwrap().expr, Expr::Range(..)));
    }

    #[test]
    fn test_lookups() {
        let filtered = parse_output("a.b[0]['c'][d.e]").unwrap();
        match filtered.expr {
            Expr::Var(var) => {
                assert_eq!(var.name(), Some("a"));
                assert_eq!(var.lookups.len(), 4);
                assert!(matches!(var.lookups[0], Lookup::Attr(ref x) if x == "b"));
                assert!(matches!(var.lookups[3], Lookup::Item(Expr::Var(_))));
            }
            other => panic!("unexpected {other:?}"),
        }
        let filtered = parse_output("['a b'].c").unwrap();
        assert!(matches!(
            filtered.expr,
            Expr::Var(ref var) if matches!(var.root, VarRoot::Dynamic(_))
        ));
    }

    #[test]
    fn test_filters() {
        let filtered = parse_output("x | a | b: 1, 2 | c: 'x', key: y").unwrap();
        let names: Vec<_> = filtered.filters.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(filtered.filters[1].args.len(), 2);
        assert_eq!(filtered.filters[2].args.len(), 1);
        assert_eq!(filtered.filters[2].kwargs[0].0, "key");
    }

    #[test]
    fn test_errors() {
        let err = parse_output("x | ").unwrap_err();
        assert_eq!(
            err.detail(),
            Some("Expected id but found end_of_string in \"x |\"")
        );
        let err = parse_output("x y").unwrap_err();
        assert_eq!(
            err.detail(),
            Some("Expected end_of_string but found id in \"x y\"")
        );
        let err = parse_output("| x").unwrap_err();
        assert_eq!(err.detail(), Some("pipe is not a valid expression in \"| x\""));
    }

    #[test]
    fn test_condition_precedence() {
        let mut parser = MarkupParser::new("a or b and c").unwrap();
        match parser.parse_condition().unwrap() {
            Condition::Or(left, right) => {
                assert!(matches!(*left, Condition::Compare { op: None, .. }));
                assert!(matches!(*right, Condition::And(..)));
            }
            other => panic!("unexpected {other:?}"),
        }
        let mut parser = MarkupParser::new("a contains 'x' and b != 2").unwrap();
        assert!(matches!(parser.parse_condition().unwrap(), Condition::And(..)));
        let mut parser = MarkupParser::new("a === b").unwrap();
        assert!(parser.parse_condition().is_err());
    }

    #[test]
    fn test_deep_nesting() {
        let markup = format!("{}x{}", "[".repeat(200), "]".repeat(200));
        let err = parse_output(&markup).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackLevel);
    }
}
