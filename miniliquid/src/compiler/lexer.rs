use std::ops::ControlFlow;

use crate::compiler::tokens::{MarkupToken, Token, TokenKind};
use crate::error::{Error, ErrorKind};
use crate::utils::memstr;

/// Tokenizes template source into text, output and tag tokens.
pub struct Tokenizer<'s> {
    rest: &'s str,
    current_line: usize,
}

fn find_start_marker(a: &str) -> Option<usize> {
    let bytes = a.as_bytes();
    let mut offset = 0;
    loop {
        let idx = some!(memchr(&bytes[offset..], b'{'));
        if let Some(b'{' | b'%' | b'#') = bytes.get(offset + idx + 1).copied() {
            return Some(offset + idx);
        }
        offset += idx + 1;
    }
}

#[inline(always)]
fn memchr(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&x| x == needle)
}

#[cfg(feature = "unicode")]
fn lex_identifier(s: &str) -> usize {
    s.chars()
        .enumerate()
        .map_while(|(idx, c)| {
            let cont = if c == '_' {
                true
            } else if idx == 0 {
                unicode_ident::is_xid_start(c)
            } else {
                c == '-' || unicode_ident::is_xid_continue(c)
            };
            cont.then(|| c.len_utf8())
        })
        .sum::<usize>()
}

#[cfg(not(feature = "unicode"))]
fn lex_identifier(s: &str) -> usize {
    s.as_bytes()
        .iter()
        .enumerate()
        .take_while(|&(idx, &c)| {
            if c == b'_' {
                true
            } else if idx == 0 {
                c.is_ascii_alphabetic()
            } else {
                c == b'-' || c.is_ascii_alphanumeric()
            }
        })
        .count()
}

/// Splits off a tag name.  Inline comments (`{% # ... %}`) use `#` as name.
fn split_tag_name(content: &str) -> (&str, &str) {
    if let Some(rest) = content.strip_prefix('#') {
        return ("#", rest.trim());
    }
    let name_len = content
        .bytes()
        .take_while(|&c| c == b'_' || c.is_ascii_alphanumeric())
        .count();
    let (name, rest) = content.split_at(name_len);
    (name, rest.trim())
}

/// Checks if a block is `{% name %}` and returns the length up to and
/// including the block end and whether it had a trim marker on the right.
fn skip_basic_tag(block_str: &str, name: &str) -> Option<(usize, bool)> {
    let mut ptr = block_str;

    if let Some(rest) = ptr.strip_prefix('-') {
        ptr = rest;
    }
    ptr = ptr.trim_start();
    ptr = some!(ptr.strip_prefix(name));
    ptr = ptr.trim_start();

    let trim = if let Some(rest) = ptr.strip_prefix('-') {
        ptr = rest;
        true
    } else {
        false
    };

    ptr.strip_prefix("%}")
        .map(|ptr| (block_str.len() - ptr.len(), trim))
}

fn strip_markers(inner: &str) -> (&str, bool, bool) {
    let (inner, trim_left) = match inner.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (inner, false),
    };
    let (inner, trim_right) = match inner.strip_suffix('-') {
        Some(rest) => (rest, true),
        None => (inner, false),
    };
    (inner, trim_left, trim_right)
}

fn never_closed(name: &str, line: usize) -> Error {
    let mut err = Error::new(
        ErrorKind::SyntaxError,
        format!("'{name}' tag was never closed"),
    )
    .fatal();
    err.set_line(line);
    err
}

impl<'s> Tokenizer<'s> {
    /// Creates a new tokenizer.
    pub fn new(input: &'s str) -> Tokenizer<'s> {
        Tokenizer {
            rest: input,
            current_line: 1,
        }
    }

    /// Creates a tokenizer that starts counting lines at `line`.
    pub fn with_line(input: &'s str, line: usize) -> Tokenizer<'s> {
        Tokenizer {
            rest: input,
            current_line: line,
        }
    }

    /// Produces the next token from the tokenizer.
    pub fn next_token(&mut self) -> Result<Option<Token<'s>>, Error> {
        loop {
            if self.rest.is_empty() {
                return Ok(None);
            }
            match ok!(self.tokenize_root()) {
                ControlFlow::Break(rv) => return Ok(Some(rv)),
                ControlFlow::Continue(()) => continue,
            }
        }
    }

    fn advance(&mut self, bytes: usize) -> &'s str {
        let (skipped, new_rest) = self.rest.split_at(bytes);
        self.current_line += skipped.bytes().filter(|&b| b == b'\n').count();
        self.rest = new_rest;
        skipped
    }

    fn token(&self, kind: TokenKind<'s>, line: usize, trim_left: bool, trim_right: bool) -> Token<'s> {
        Token {
            kind,
            line,
            trim_left,
            trim_right,
        }
    }

    fn tokenize_root(&mut self) -> Result<ControlFlow<Token<'s>>, Error> {
        let line = self.current_line;
        match find_start_marker(self.rest) {
            Some(0) => self.handle_start_marker(),
            Some(start) => {
                let text = self.advance(start);
                Ok(ControlFlow::Break(self.token(TokenKind::Text(text), line, false, false)))
            }
            None => {
                let text = self.advance(self.rest.len());
                Ok(ControlFlow::Break(self.token(TokenKind::Text(text), line, false, false)))
            }
        }
    }

    fn handle_start_marker(&mut self) -> Result<ControlFlow<Token<'s>>, Error> {
        let line = self.current_line;
        let bytes = self.rest.as_bytes();
        match bytes.get(1).copied() {
            Some(b'{') => match memstr(&bytes[2..], b"}}") {
                Some(end) => {
                    let (markup, trim_left, trim_right) = strip_markers(&self.rest[2..end + 2]);
                    self.advance(end + 4);
                    Ok(ControlFlow::Break(self.token(
                        TokenKind::Output(markup.trim()),
                        line,
                        trim_left,
                        trim_right,
                    )))
                }
                None => {
                    let raw = self.advance(self.rest.len());
                    Ok(ControlFlow::Break(self.token(
                        TokenKind::Malformed(raw),
                        line,
                        false,
                        false,
                    )))
                }
            },
            Some(b'#') => match memstr(&bytes[2..], b"#}") {
                Some(end) => {
                    let (_, trim_left, trim_right) = strip_markers(&self.rest[2..end + 2]);
                    self.advance(end + 4);
                    Ok(ControlFlow::Break(self.token(
                        TokenKind::Comment,
                        line,
                        trim_left,
                        trim_right,
                    )))
                }
                None => Err(never_closed("#", line)),
            },
            _ => match memstr(&bytes[2..], b"%}") {
                Some(end) => {
                    let raw = &self.rest[..end + 4];
                    let (content, trim_left, trim_right) = strip_markers(&self.rest[2..end + 2]);
                    let (name, markup) = split_tag_name(content.trim());
                    self.advance(end + 4);
                    if name.is_empty() {
                        return Ok(ControlFlow::Break(self.token(
                            TokenKind::Malformed(raw),
                            line,
                            trim_left,
                            trim_right,
                        )));
                    }
                    if name == "raw" {
                        return self.handle_raw_tag(line, trim_left);
                    }
                    Ok(ControlFlow::Break(self.token(
                        TokenKind::Tag { name, markup },
                        line,
                        trim_left,
                        trim_right,
                    )))
                }
                None => {
                    let raw = self.advance(self.rest.len());
                    Ok(ControlFlow::Break(self.token(
                        TokenKind::Malformed(raw),
                        line,
                        false,
                        false,
                    )))
                }
            },
        }
    }

    /// Everything up to the first `{% endraw %}` is emitted verbatim, no
    /// matter what delimiters appear in between.
    fn handle_raw_tag(&mut self, line: usize, trim_left: bool) -> Result<ControlFlow<Token<'s>>, Error> {
        let mut ptr = 0;
        while let Some(block) = memstr(&self.rest.as_bytes()[ptr..], b"{%") {
            ptr += block + 2;
            if let Some((endraw, trim_right)) = skip_basic_tag(&self.rest[ptr..], "endraw") {
                let content = self.advance(ptr - 2);
                self.advance(2 + endraw);
                return Ok(ControlFlow::Break(self.token(
                    TokenKind::Raw(content),
                    line,
                    trim_left,
                    trim_right,
                )));
            }
        }
        Err(never_closed("raw", line))
    }
}

/// Tokenizes a whole template.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, Error> {
    let mut tokenizer = Tokenizer::new(input);
    let mut rv = Vec::new();
    while let Some(token) = ok!(tokenizer.next_token()) {
        rv.push(token);
    }
    Ok(rv)
}

fn unexpected_character(c: char) -> Error {
    Error::new(ErrorKind::SyntaxError, format!("Unexpected character {c}"))
}

fn eat_number(s: &str) -> (MarkupToken<'_>, usize) {
    let bytes = s.as_bytes();
    let mut end = usize::from(bytes.first() == Some(&b'-'));
    while bytes.get(end).map_or(false, |c| c.is_ascii_digit()) {
        end += 1;
    }
    let mut is_float = false;
    if bytes.get(end) == Some(&b'.') && bytes.get(end + 1).map_or(false, |c| c.is_ascii_digit()) {
        is_float = true;
        end += 1;
        while bytes.get(end).map_or(false, |c| c.is_ascii_digit()) {
            end += 1;
        }
    }
    let num = &s[..end];
    let token = if is_float {
        MarkupToken::Float(num.parse().unwrap_or(0.0))
    } else {
        match num.parse() {
            Ok(val) => MarkupToken::Int(val),
            Err(_) => MarkupToken::Float(num.parse().unwrap_or(0.0)),
        }
    };
    (token, end)
}

/// Tokenizes the markup of a tag or output block.
pub fn tokenize_markup(markup: &str) -> Result<Vec<MarkupToken<'_>>, Error> {
    let mut rv = Vec::new();
    let mut rest = markup;
    loop {
        rest = rest.trim_start();
        let c = match rest.chars().next() {
            Some(c) => c,
            None => return Ok(rv),
        };
        let next = rest.as_bytes().get(1).copied();
        let (token, len) = match c {
            '0'..='9' => eat_number(rest),
            '-' if next.map_or(false, |c| c.is_ascii_digit()) => eat_number(rest),
            '\'' | '"' => match rest[1..].find(c) {
                Some(end) => (MarkupToken::Str(&rest[1..end + 1]), end + 2),
                None => return Err(unexpected_character(c)),
            },
            '.' if next == Some(b'.') => (MarkupToken::DotDot, 2),
            '.' => (MarkupToken::Dot, 1),
            '=' if next == Some(b'=') => (MarkupToken::Eq, 2),
            '=' => (MarkupToken::Assign, 1),
            '!' if next == Some(b'=') => (MarkupToken::Ne, 2),
            '<' if next == Some(b'>') => (MarkupToken::Ne, 2),
            '<' if next == Some(b'=') => (MarkupToken::Lte, 2),
            '<' => (MarkupToken::Lt, 1),
            '>' if next == Some(b'=') => (MarkupToken::Gte, 2),
            '>' => (MarkupToken::Gt, 1),
            '|' => (MarkupToken::Pipe, 1),
            ',' => (MarkupToken::Comma, 1),
            ':' => (MarkupToken::Colon, 1),
            '[' => (MarkupToken::BracketOpen, 1),
            ']' => (MarkupToken::BracketClose, 1),
            '(' => (MarkupToken::ParenOpen, 1),
            ')' => (MarkupToken::ParenClose, 1),
            _ => {
                let mut len = lex_identifier(rest);
                if len == 0 {
                    return Err(unexpected_character(c));
                }
                if rest[len..].starts_with('?') {
                    len += 1;
                }
                (MarkupToken::Ident(&rest[..len]), len)
            }
        };
        rv.push(token);
        rest = &rest[len..];
    }
}
