use crate::compiler::ast::{Body, Node};
use crate::compiler::lexer::tokenize;
use crate::compiler::markup::parse_output;
use crate::compiler::tokens::{Token, TokenKind};
use crate::environment::{Environment, ErrorMode};
use crate::error::{Error, ErrorKind};
use crate::tags::{Renderable, TagToken};

/// Bound for nested block tags.
pub const MAX_NESTING: usize = 100;

fn syntax_error(msg: String) -> Error {
    Error::new(ErrorKind::SyntaxError, msg)
}

fn trim_last_text(nodes: &mut Vec<Node>) {
    if let Some(Node::Text(text)) = nodes.last_mut() {
        let trimmed_len = text.trim_end().len();
        text.truncate(trimmed_len);
        if text.is_empty() {
            nodes.pop();
        }
    }
}

fn malformed(raw: &str) -> Error {
    if raw.starts_with("{{") {
        syntax_error(format!(
            "Variable '{raw}' was not properly terminated with regexp: /\\}}\\}}/"
        ))
    } else {
        syntax_error(format!(
            "Tag '{raw}' was not properly terminated with regexp: /\\%\\}}/"
        ))
    }
}

fn is_delimiter_like(name: &str) -> bool {
    matches!(name, "else" | "elsif" | "when") || name.starts_with("end")
}

/// Builds the node tree of a template from its tokens.
///
/// Tags receive the parser in [`Tag::parse`](crate::tags::Tag::parse) and
/// use it to parse their bodies.
pub struct Parser<'s, 'env> {
    env: &'env Environment,
    tokens: Vec<Token<'s>>,
    pos: usize,
    trim_next: bool,
    depth: usize,
    warnings: Vec<Error>,
}

impl<'s, 'env> Parser<'s, 'env> {
    /// Tokenizes the source.
    pub(crate) fn new(env: &'env Environment, source: &'s str) -> Result<Parser<'s, 'env>, Error> {
        let tokens = match tokenize(source) {
            Ok(tokens) => tokens,
            Err(mut err) => {
                if !env.line_numbers() {
                    err.clear_line();
                }
                return Err(err);
            }
        };
        Ok(Parser {
            env,
            tokens,
            pos: 0,
            trim_next: false,
            depth: 0,
            warnings: Vec::new(),
        })
    }

    /// Parses the whole template.  Returns the body and the warnings that
    /// were recorded in warn mode.
    pub(crate) fn parse_document(mut self) -> Result<(Body, Vec<Error>), Error> {
        let (nodes, _) = ok!(self.parse_nodes(None, &[]));
        Ok((Body::new(nodes), self.warnings))
    }

    /// Returns the environment the template is compiled for.
    pub fn env(&self) -> &'env Environment {
        self.env
    }

    /// Returns the error mode in effect.
    pub fn error_mode(&self) -> ErrorMode {
        self.env.error_mode()
    }

    /// Parses the body of a block tag.
    ///
    /// Parsing stops at `end<name>` or at any of the `delimiters`.  The tag
    /// that ended the body is returned; callers check its name to decide how
    /// to continue.  Reaching the end of the template fails.
    pub fn parse_body(
        &mut self,
        block: &TagToken<'s>,
        delimiters: &[&str],
    ) -> Result<(Body, TagToken<'s>), Error> {
        let (nodes, end) = ok!(self.parse_nodes(Some(block), delimiters));
        match end {
            Some(end) => Ok((Body::new(nodes), end)),
            None => Err(self.never_closed(block)),
        }
    }

    /// Skips everything up to the matching `end<name>` tag.
    ///
    /// Nested blocks of the same name are balanced.  Used by `comment` and
    /// to recover from blocks with invalid markup.
    pub fn skip_body(&mut self, block: &TagToken<'s>) -> Result<TagToken<'s>, Error> {
        let end_name = format!("end{}", block.name);
        let mut nesting = 0usize;
        while let Some(token) = self.tokens.get(self.pos) {
            self.pos += 1;
            if let TokenKind::Tag { name, markup } = token.kind {
                if name == block.name {
                    nesting += 1;
                } else if name == end_name {
                    if nesting == 0 {
                        self.trim_next = token.trim_right;
                        return Ok(TagToken {
                            name,
                            markup,
                            line: token.line,
                        });
                    }
                    nesting -= 1;
                }
            }
        }
        Err(self.never_closed(block))
    }

    /// Parses the markup of a `liquid` tag: one tag per line, without
    /// delimiters.
    pub fn parse_lines(&mut self, markup: &'s str, first_line: usize) -> Result<Body, Error> {
        let mut tokens = Vec::new();
        for (idx, line) in markup.lines().enumerate() {
            let line_str = line.trim();
            if line_str.is_empty() {
                continue;
            }
            let (name, rest) = match line_str.find(|c: char| c.is_whitespace()) {
                Some(pos) => (&line_str[..pos], line_str[pos..].trim()),
                None => (line_str, ""),
            };
            let (name, rest) = match name.strip_prefix('#') {
                Some(_) => ("#", line_str[1..].trim()),
                None => (name, rest),
            };
            tokens.push(Token {
                kind: TokenKind::Tag { name, markup: rest },
                line: first_line + idx,
                trim_left: false,
                trim_right: false,
            });
        }

        let old_tokens = std::mem::replace(&mut self.tokens, tokens);
        let old_pos = std::mem::replace(&mut self.pos, 0);
        let rv = self.parse_nodes(None, &[]);
        self.tokens = old_tokens;
        self.pos = old_pos;
        let (nodes, _) = ok!(rv);
        Ok(Body::new(nodes))
    }

    fn never_closed(&self, block: &TagToken<'s>) -> Error {
        let mut err =
            syntax_error(format!("'{}' tag was never closed", block.name)).fatal();
        if self.env.line_numbers() {
            err.set_line(block.line);
        }
        err
    }

    /// Decides what to do with a parse error according to the error mode.
    fn recover(&mut self, mut err: Error, line: usize) -> Result<Option<Node>, Error> {
        if self.env.line_numbers() {
            err.set_line(line);
        } else {
            err.clear_line();
        }
        if err.is_fatal() {
            return Err(err);
        }
        match self.error_mode() {
            ErrorMode::Strict => Err(err),
            ErrorMode::Warn => {
                debug!(warning = %err, "recorded parse warning");
                self.warnings.push(err);
                Ok(None)
            }
            ErrorMode::Lax => Ok(Some(Node::Error(err))),
        }
    }

    fn parse_tag(&mut self, tag: &TagToken<'s>) -> Result<Box<dyn Renderable>, Error> {
        let env = self.env;
        let handler = match env.get_tag(tag.name) {
            Some(handler) => handler,
            None => {
                return Err(syntax_error(format!("Unknown tag '{}'", tag.name)));
            }
        };
        if !handler.is_block() {
            return handler.parse(tag, self);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(Error::new(ErrorKind::StackLevel, "Nesting too deep").fatal());
        }
        let start = self.pos;
        let rv = handler.parse(tag, self);
        self.depth -= 1;
        match rv {
            Err(err)
                if !err.is_fatal()
                    && self.pos == start
                    && self.error_mode() != ErrorMode::Strict =>
            {
                ok!(self.skip_body(tag));
                Err(err)
            }
            rv => rv,
        }
    }

    fn parse_nodes(
        &mut self,
        block: Option<&TagToken<'s>>,
        delimiters: &[&str],
    ) -> Result<(Vec<Node>, Option<TagToken<'s>>), Error> {
        let mut nodes = Vec::new();

        while let Some(token) = self.tokens.get(self.pos).cloned() {
            self.pos += 1;
            if token.trim_left {
                trim_last_text(&mut nodes);
            }
            let trim_start = std::mem::replace(&mut self.trim_next, token.trim_right);

            match token.kind {
                TokenKind::Text(text) => {
                    let text = if trim_start { text.trim_start() } else { text };
                    if !text.is_empty() {
                        nodes.push(Node::Text(text.to_string()));
                    }
                }
                TokenKind::Raw(content) => nodes.push(Node::Raw(content.to_string())),
                TokenKind::Comment => {}
                TokenKind::Output(markup) => match parse_output(markup) {
                    Ok(expr) => nodes.push(Node::Output {
                        expr,
                        line: token.line,
                    }),
                    Err(err) => nodes.extend(ok!(self.recover(err, token.line))),
                },
                TokenKind::Malformed(raw) => {
                    nodes.extend(ok!(self.recover(malformed(raw), token.line)));
                }
                TokenKind::Tag { name, markup } => {
                    let tag = TagToken {
                        name,
                        markup,
                        line: token.line,
                    };
                    if let Some(block) = block {
                        if delimiters.contains(&name)
                            || name.strip_prefix("end") == Some(block.name)
                        {
                            return Ok((nodes, Some(tag)));
                        }
                    }
                    if is_delimiter_like(name) && self.env.get_tag(name).is_none() {
                        let err = match block {
                            Some(block) if name.starts_with("end") => {
                                let mut err = syntax_error(format!(
                                    "'{}' is not a valid delimiter for {} tags. use end{}",
                                    name, block.name, block.name
                                ))
                                .fatal();
                                if self.env.line_numbers() {
                                    err.set_line(token.line);
                                }
                                return Err(err);
                            }
                            Some(block) => syntax_error(format!(
                                "{} tag does not expect '{}' tag",
                                block.name, name
                            )),
                            None => syntax_error(format!("Unexpected outer '{name}' tag")),
                        };
                        nodes.extend(ok!(self.recover(err, token.line)));
                        continue;
                    }
                    match self.parse_tag(&tag) {
                        Ok(renderable) => {
                            trace!(tag = name, line = token.line, "parsed tag");
                            nodes.push(Node::Tag {
                                name: name.to_string(),
                                line: token.line,
                                renderable,
                            });
                        }
                        Err(err) => nodes.extend(ok!(self.recover(err, token.line))),
                    }
                }
            }
        }

        Ok((nodes, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    fn parse(env: &Environment, source: &str) -> Result<(Body, Vec<Error>), Error> {
        Parser::new(env, source).and_then(|parser| parser.parse_document())
    }

    fn texts(body: &Body) -> Vec<String> {
        body.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_trim_markers() {
        let env = Environment::new();
        let (body, _) = parse(&env, "a  \n {{- x -}} \n b {{ y }} c").unwrap();
        assert_eq!(texts(&body), vec!["a", "b ", " c"]);
        let (body, _) = parse(&env, "a {%- # note -%}  b").unwrap();
        assert_eq!(texts(&body), vec!["a", "b"]);
    }

    #[test]
    fn test_unclosed_block() {
        let mut env = Environment::new();
        env.set_line_numbers(true);
        let err = parse(&env, "\n{% if true %} ...").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Liquid syntax error (line 2): 'if' tag was never closed"
        );
        env.set_error_mode(ErrorMode::Lax);
        assert!(parse(&env, "{% for x in y %}").is_err());
    }

    #[test]
    fn test_mismatched_end() {
        let env = Environment::new();
        let err = parse(&env, "{% if true %}x{% endunless %}").unwrap_err();
        assert_eq!(
            err.detail(),
            Some("'endunless' is not a valid delimiter for if tags. use endif")
        );
    }

    #[test]
    fn test_error_modes() {
        let mut env = Environment::new();
        env.set_line_numbers(true);
        env.set_error_mode(ErrorMode::Strict);
        let err = parse(&env, "x\n{% nope %}").unwrap_err();
        assert_eq!(err.to_string(), "Liquid syntax error (line 2): Unknown tag 'nope'");

        env.set_error_mode(ErrorMode::Warn);
        let (body, warnings) = parse(&env, "x{% nope %}{{ a | }}y").unwrap();
        assert_eq!(texts(&body), vec!["x", "y"]);
        assert_eq!(warnings.len(), 2);

        env.set_error_mode(ErrorMode::Lax);
        let (body, warnings) = parse(&env, "x{% else %}y").unwrap();
        assert!(warnings.is_empty());
        assert!(matches!(body.nodes[1], Node::Error(ref err)
            if err.detail() == Some("Unexpected outer 'else' tag")));
    }

    #[test]
    fn test_malformed() {
        let env = Environment::new();
        let (body, _) = parse(&env, "a {{ b").unwrap();
        match body.nodes.last() {
            Some(Node::Error(err)) => assert_eq!(
                err.detail(),
                Some("Variable '{{ b' was not properly terminated with regexp: /\\}\\}/")
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_nesting_limit() {
        let env = Environment::new();
        let source = "{% if true %}".repeat(MAX_NESTING + 1);
        let err = parse(&env, &source).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackLevel);
    }

    #[test]
    fn test_invalid_block_markup_skips_body() {
        let env = Environment::new();
        let (body, _) = parse(&env, "{% for %}{% if x %}{% endif %}{% endfor %}after").unwrap();
        assert_eq!(body.nodes.len(), 2);
        assert!(matches!(body.nodes[0], Node::Error(_)));
        assert_eq!(texts(&body), vec!["after"]);
    }
}
