use std::ops::ControlFlow;

use crate::compiler::ast::{Body, Filtered};
use crate::compiler::markup::MarkupParser;
use crate::error::{Error, ErrorKind};
use crate::output::Output;
use crate::tags::{Interrupt, Parser, Renderable, Tag, TagToken};
use crate::vm::State;

/// Renders nothing.
struct Nothing;

impl Renderable for Nothing {
    fn render(&self, _state: &mut State, _out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        Ok(ControlFlow::Continue(()))
    }

    fn is_blank(&self) -> bool {
        true
    }
}

/// `{% comment %}...{% endcomment %}`
pub(crate) struct Comment;

impl Tag for Comment {
    fn is_block(&self) -> bool {
        true
    }

    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        ok!(parser.skip_body(tag));
        Ok(Box::new(Nothing))
    }
}

/// `{% # a comment %}`
///
/// Comments spanning multiple lines need a `#` on every line.
pub(crate) struct InlineComment;

impl Tag for InlineComment {
    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        _parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let unprefixed = tag.markup.lines().skip(1).any(|line| {
            let line = line.trim_start();
            !line.is_empty() && !line.starts_with('#')
        });
        if unprefixed {
            return Err(Error::new(
                ErrorKind::SyntaxError,
                "Syntax error in tag '#' - Each line of comments must be prefixed by the '#' character",
            ));
        }
        Ok(Box::new(Nothing))
    }
}

/// `{% echo expr | filter %}` works like an output block.
pub(crate) struct Echo;

struct EchoNode {
    expr: Option<Filtered>,
}

impl Tag for Echo {
    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        _parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let mut markup = ok!(MarkupParser::new(tag.markup));
        if markup.is_eof() {
            return Ok(Box::new(EchoNode { expr: None }));
        }
        let expr = ok!(markup.parse_filtered());
        ok!(markup.expect_eof());
        Ok(Box::new(EchoNode { expr: Some(expr) }))
    }
}

impl Renderable for EchoNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        if let Some(ref expr) = self.expr {
            let value = ok!(state.eval_filtered(expr));
            ok!(write!(out, "{value}").map_err(Error::from));
        }
        Ok(ControlFlow::Continue(()))
    }
}

/// `{% liquid %}` holds one tag per line without delimiters.
pub(crate) struct LiquidTag;

struct LiquidBlock {
    body: Body,
}

impl Tag for LiquidTag {
    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let body = ok!(parser.parse_lines(tag.markup, tag.line));
        Ok(Box::new(LiquidBlock { body }))
    }
}

impl Renderable for LiquidBlock {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        state.render_body(&self.body, out)
    }

    fn is_blank(&self) -> bool {
        self.body.is_blank()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use crate::{context, Environment};

    #[test]
    fn test_comments() {
        let env = Environment::new();
        let rv = env
            .render_str(
                "a{% comment %}{% if %}{% comment %}x{% endcomment %}{% endcomment %}b{% # note %}c{# inline #}d",
                context! {},
            )
            .unwrap();
        assert_eq!(rv, "abcd");
        let rv = env
            .render_str("{% #a\n b %}", context! {})
            .unwrap();
        assert_eq!(
            rv,
            "Liquid syntax error: Syntax error in tag '#' - Each line of comments must be prefixed by the '#' character"
        );
    }

    #[test]
    fn test_raw() {
        let env = Environment::new();
        let rv = env
            .render_str("{% raw %}{{ x }}{% if %}{% endraw %}{{ 'y' }}", context! { x => 1 })
            .unwrap();
        assert_eq!(rv, "{{ x }}{% if %}y");
    }

    #[test]
    fn test_echo() {
        let env = Environment::new();
        let rv = env
            .render_str("{% echo name | upcase %}{% echo %}", context! { name => "bob" })
            .unwrap();
        assert_eq!(rv, "BOB");
    }

    #[test]
    fn test_liquid_tag() {
        let env = Environment::new();
        let source = "{% liquid\n  assign xs = 'a,b,c' | split: ','\n  for x in xs\n    # the items\n    echo x | upcase\n  endfor\n%}";
        let rv = env.render_str(source, context! {}).unwrap();
        assert_eq!(rv, "ABC");
    }
}
