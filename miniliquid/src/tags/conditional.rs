use std::ops::ControlFlow;

use crate::compiler::ast::{Body, Condition, Expr};
use crate::compiler::markup::MarkupParser;
use crate::compiler::tokens::MarkupToken;
use crate::environment::ErrorMode;
use crate::error::Error;
use crate::output::Output;
use crate::tags::{Interrupt, Parser, Renderable, Tag, TagToken};
use crate::value::{ops, Value};
use crate::vm::State;

fn parse_condition(markup: &str) -> Result<Condition, Error> {
    let mut parser = ok!(MarkupParser::new(markup));
    let rv = ok!(parser.parse_condition());
    ok!(parser.expect_eof());
    Ok(rv)
}

/// Fails in the middle of a block.  Outside of strict mode the rest of the
/// block is skipped so that parsing resumes after its end tag.
fn fail_in_block<'s>(
    parser: &mut Parser<'s, '_>,
    tag: &TagToken<'s>,
    err: Error,
) -> Result<Box<dyn Renderable>, Error> {
    if parser.error_mode() != ErrorMode::Strict {
        ok!(parser.skip_body(tag));
    }
    Err(err)
}

fn strip_blank(bodies: &mut [&mut Body]) -> bool {
    let blank = bodies.iter().all(|body| body.is_blank());
    if blank {
        for body in bodies.iter_mut() {
            body.remove_blank_text();
        }
    }
    blank
}

/// `if` and `unless` with `elsif` and `else` branches.
pub(crate) struct If {
    pub negate: bool,
}

struct IfBlock {
    negate: bool,
    branches: Vec<(Condition, Body)>,
    else_body: Option<Body>,
    blank: bool,
}

impl Tag for If {
    fn is_block(&self) -> bool {
        true
    }

    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let mut condition = ok!(parse_condition(tag.markup));
        let mut branches = Vec::new();
        let mut else_body = None;
        loop {
            let (body, end) = ok!(parser.parse_body(tag, &["elsif", "else"]));
            branches.push((condition, body));
            match end.name {
                "elsif" => match parse_condition(end.markup) {
                    Ok(next) => condition = next,
                    Err(err) => return fail_in_block(parser, tag, err),
                },
                "else" => {
                    let (body, _) = ok!(parser.parse_body(tag, &[]));
                    else_body = Some(body);
                    break;
                }
                _ => break,
            }
        }

        let mut bodies: Vec<&mut Body> = branches.iter_mut().map(|(_, body)| body).collect();
        bodies.extend(else_body.as_mut());
        let blank = strip_blank(&mut bodies);

        Ok(Box::new(IfBlock {
            negate: self.negate,
            branches,
            else_body,
            blank,
        }))
    }
}

impl Renderable for IfBlock {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        for (idx, (condition, body)) in self.branches.iter().enumerate() {
            let mut truth = ok!(state.eval_condition(condition));
            if idx == 0 && self.negate {
                truth = !truth;
            }
            if truth {
                return state.render_body(body, out);
            }
        }
        match self.else_body {
            Some(ref body) => state.render_body(body, out),
            None => Ok(ControlFlow::Continue(())),
        }
    }

    fn is_blank(&self) -> bool {
        self.blank
    }
}

/// `{% case subject %}{% when a, b %}...{% else %}...{% endcase %}`
pub(crate) struct Case;

struct CaseBlock {
    subject: Expr,
    branches: Vec<(Vec<Expr>, Body)>,
    else_body: Option<Body>,
    blank: bool,
}

fn parse_when(markup: &str) -> Result<Vec<Expr>, Error> {
    let mut parser = ok!(MarkupParser::new(markup));
    let mut values = vec![ok!(parser.parse_expr())];
    while parser.skip_token(&MarkupToken::Comma) || parser.skip_ident("or") {
        values.push(ok!(parser.parse_expr()));
    }
    ok!(parser.expect_eof());
    Ok(values)
}

fn matches_subject(state: &State, subject: &Value, expr: &Expr) -> Result<bool, Error> {
    Ok(match expr {
        Expr::Empty => subject.is_empty(),
        Expr::Blank => subject.is_blank(),
        expr => ops::equals(subject, &ok!(state.eval(expr))),
    })
}

impl Tag for Case {
    fn is_block(&self) -> bool {
        true
    }

    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let mut markup = ok!(MarkupParser::new(tag.markup));
        let subject = ok!(markup.parse_expr());
        ok!(markup.expect_eof());

        // anything before the first `when` is dropped
        let (_, mut end) = ok!(parser.parse_body(tag, &["when", "else"]));
        let mut branches = Vec::new();
        let mut else_body = None;
        loop {
            match end.name {
                "when" => {
                    let values = match parse_when(end.markup) {
                        Ok(values) => values,
                        Err(err) => return fail_in_block(parser, tag, err),
                    };
                    let (body, next) = ok!(parser.parse_body(tag, &["when", "else"]));
                    branches.push((values, body));
                    end = next;
                }
                "else" => {
                    let (body, _) = ok!(parser.parse_body(tag, &[]));
                    else_body = Some(body);
                    break;
                }
                _ => break,
            }
        }

        let mut bodies: Vec<&mut Body> = branches.iter_mut().map(|(_, body)| body).collect();
        bodies.extend(else_body.as_mut());
        let blank = strip_blank(&mut bodies);

        Ok(Box::new(CaseBlock {
            subject,
            branches,
            else_body,
            blank,
        }))
    }
}

impl Renderable for CaseBlock {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        let subject = ok!(state.eval(&self.subject));
        for (values, body) in &self.branches {
            for value in values {
                if ok!(matches_subject(state, &subject, value)) {
                    return state.render_body(body, out);
                }
            }
        }
        match self.else_body {
            Some(ref body) => state.render_body(body, out),
            None => Ok(ControlFlow::Continue(())),
        }
    }

    fn is_blank(&self) -> bool {
        self.blank
    }
}

/// `{% ifchanged %}...{% endifchanged %}` renders its body only if the
/// result differs from the previous rendering.
pub(crate) struct IfChanged;

struct IfChangedBlock {
    body: Body,
}

impl Tag for IfChanged {
    fn is_block(&self) -> bool {
        true
    }

    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let (body, _) = ok!(parser.parse_body(tag, &[]));
        Ok(Box::new(IfChangedBlock { body }))
    }
}

impl Renderable for IfChangedBlock {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        out.begin_capture();
        let rv = state.render_body(&self.body, out);
        let captured = out.end_capture();
        let flow = ok!(rv);
        let previous = state.registers().get("ifchanged");
        if previous.as_ref().and_then(|x| x.as_str()) != Some(captured.as_str()) {
            ok!(out.write_str(&captured).map_err(Error::from));
            state.registers().set("ifchanged", Value::from(captured));
        }
        Ok(flow)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use crate::{context, Environment, ErrorMode};

    fn render(source: &str, ctx: crate::value::Value) -> String {
        let env = Environment::new();
        env.render_str(source, ctx).unwrap()
    }

    #[test]
    fn test_if_branches() {
        let source = "{% if x > 2 %}big{% elsif x == 2 %}two{% else %}small{% endif %}";
        assert_eq!(render(source, context! { x => 3 }), "big");
        assert_eq!(render(source, context! { x => 2 }), "two");
        assert_eq!(render(source, context! { x => 1 }), "small");
        assert_eq!(render(source, context! {}), "small");
    }

    #[test]
    fn test_unless() {
        let source = "{% unless a %}no{% elsif b %}b{% else %}a{% endunless %}";
        assert_eq!(render(source, context! {}), "no");
        assert_eq!(render(source, context! { a => true, b => true }), "b");
        assert_eq!(render(source, context! { a => true }), "a");
    }

    #[test]
    fn test_empty_and_blank() {
        let source = "{% if x == empty %}e{% endif %}{% if x == blank %}b{% endif %}";
        assert_eq!(render(source, context! { x => "" }), "eb");
        assert_eq!(render(source, context! { x => "  " }), "b");
        assert_eq!(render(source, context! { x => Vec::<i32>::new() }), "eb");
        assert_eq!(render(source, context! { x => "x" }), "");
    }

    #[test]
    fn test_blank_body_drops_whitespace() {
        let rv = render("{% if true %}\n  {% assign a = 1 %}\n{% endif %}{{ a }}", context! {});
        assert_eq!(rv, "1");
        let rv = render("{% if true %}\n  x\n{% endif %}", context! {});
        assert_eq!(rv, "\n  x\n");
    }

    #[test]
    fn test_case() {
        let source = "{% case x %}ignored{% when 1, 2 %}low{% when 'a' or 3 %}mid{% when 3 %}dup{% else %}other{% endcase %}";
        assert_eq!(render(source, context! { x => 2 }), "low");
        assert_eq!(render(source, context! { x => 3 }), "mid");
        assert_eq!(render(source, context! { x => "a" }), "mid");
        assert_eq!(render(source, context! { x => "2" }), "other");
        assert_eq!(
            render("{% case 2 %}{% when 1 %}a{% when 2 %}b{% endcase %}", context! {}),
            "b"
        );
        assert_eq!(
            render("{% case 5 %}{% when 1 %}a{% endcase %}", context! {}),
            ""
        );
    }

    #[test]
    fn test_invalid_elsif_skips_block() {
        let mut env = Environment::new();
        env.set_error_mode(ErrorMode::Warn);
        let tmpl = env
            .template_from_str("{% if a %}x{% elsif %}y{% endif %}after")
            .unwrap();
        assert_eq!(tmpl.render(context! {}).unwrap(), "after");
        assert_eq!(tmpl.warnings().len(), 1);
    }

    #[test]
    fn test_ifchanged() {
        let rv = render(
            "{% for x in items %}{% ifchanged %}{{ x }}{% endifchanged %}{% endfor %}",
            context! { items => vec![1, 1, 2, 2, 1] },
        );
        assert_eq!(rv, "121");
    }
}
