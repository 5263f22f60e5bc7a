use std::ops::ControlFlow;

use crate::compiler::ast::{Body, Filtered};
use crate::compiler::markup::MarkupParser;
use crate::compiler::tokens::MarkupToken;
use crate::error::{Error, ErrorKind};
use crate::output::Output;
use crate::tags::{Interrupt, Parser, Renderable, Tag, TagToken};
use crate::value::{ops, Value};
use crate::vm::{assign_score_of, State};

fn invalid_syntax(tag: &str, usage: &str) -> Error {
    Error::new(
        ErrorKind::SyntaxError,
        format!("Syntax Error in '{tag}' - Valid syntax: {usage}"),
    )
}

/// `{% assign name = value | filter %}`
pub(crate) struct Assign;

struct AssignNode {
    to: String,
    from: Filtered,
}

impl Tag for Assign {
    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        _parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let mut markup = ok!(MarkupParser::new(tag.markup));
        let to = match (markup.next(), markup.next()) {
            (Some(MarkupToken::Ident(to)), Some(MarkupToken::Assign)) => to.to_string(),
            _ => return Err(invalid_syntax("assign", "assign [var] = [source]")),
        };
        let from = ok!(markup.parse_filtered());
        ok!(markup.expect_eof());
        Ok(Box::new(AssignNode { to, from }))
    }
}

impl Renderable for AssignNode {
    fn render(&self, state: &mut State, _out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        let value = ok!(state.eval_filtered(&self.from));
        ok!(state.limits().increment_assign_score(assign_score_of(&value)));
        state.assign(&self.to, value);
        Ok(ControlFlow::Continue(()))
    }

    fn is_blank(&self) -> bool {
        true
    }
}

/// `{% capture name %}...{% endcapture %}`
pub(crate) struct Capture;

struct CaptureNode {
    to: String,
    body: Body,
}

impl Tag for Capture {
    fn is_block(&self) -> bool {
        true
    }

    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let mut markup = ok!(MarkupParser::new(tag.markup));
        let to = match markup.next() {
            Some(MarkupToken::Ident(to)) | Some(MarkupToken::Str(to)) => to.to_string(),
            _ => return Err(invalid_syntax("capture", "capture [var]")),
        };
        let (body, _) = ok!(parser.parse_body(tag, &[]));
        Ok(Box::new(CaptureNode { to, body }))
    }
}

impl Renderable for CaptureNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        out.begin_capture();
        let rv = state.render_body(&self.body, out);
        let captured = out.end_capture();
        let flow = ok!(rv);
        ok!(state.limits().increment_assign_score(1 + captured.len()));
        state.assign(&self.to, Value::from(captured));
        Ok(flow)
    }

    fn is_blank(&self) -> bool {
        true
    }
}

/// `{% increment name %}` and `{% decrement name %}`.
///
/// Counters live apart from assigned variables.  They start at the value
/// of a render assign of the same name or at zero.
pub(crate) struct Counter {
    pub step: i64,
}

struct CounterNode {
    name: String,
    step: i64,
}

impl Tag for Counter {
    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        _parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let mut markup = ok!(MarkupParser::new(tag.markup));
        let name = ok!(markup.expect_ident()).to_string();
        ok!(markup.expect_eof());
        Ok(Box::new(CounterNode {
            name,
            step: self.step,
        }))
    }
}

impl Renderable for CounterNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        let current = match state.ctx.counter(&self.name) {
            Some(value) => value.clone(),
            None => state.ctx.assigns().get_attr(&self.name),
        };
        let current = ops::to_number(&current);
        let next = ok!(ops::add(&current, &Value::from(self.step)));
        if self.step > 0 {
            ok!(write!(out, "{current}").map_err(Error::from));
        } else {
            ok!(write!(out, "{next}").map_err(Error::from));
        }
        state.ctx.set_counter(&self.name, next);
        Ok(ControlFlow::Continue(()))
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use crate::{context, Environment};

    #[test]
    fn test_assign_and_capture() {
        let env = Environment::new();
        let rv = env
            .render_str(
                "{% assign x = 'a,b' | split: ',' %}{{ x.size }}{% capture y %}{{ x.last }}!{% endcapture %}{{ y }}",
                context! {},
            )
            .unwrap();
        assert_eq!(rv, "2b!");
    }

    #[test]
    fn test_assign_syntax() {
        let env = Environment::new();
        let rv = env.render_str("{% assign = 1 %}", context! {}).unwrap();
        assert_eq!(
            rv,
            "Liquid syntax error: Syntax Error in 'assign' - Valid syntax: assign [var] = [source]"
        );
    }

    #[test]
    fn test_counters() {
        let env = Environment::new();
        let rv = env
            .render_str(
                "{% increment a %}{% increment a %}{% decrement b %}{% decrement b %}{{ a }}|{% assign a = 'x' %}{{ a }}{% increment a %}",
                context! {},
            )
            .unwrap();
        assert_eq!(rv, "01-1-22|x2");
        let rv = env
            .render_str("{% increment n %}{% increment n %}", context! { n => 10 })
            .unwrap();
        assert_eq!(rv, "1011");
    }
}
