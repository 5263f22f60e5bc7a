use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::compiler::ast::{Body, Expr};
use crate::compiler::markup::MarkupParser;
use crate::compiler::tokens::MarkupToken;
use crate::error::{Error, ErrorKind};
use crate::output::Output;
use crate::tags::include::PartialArgs;
use crate::tags::{Interrupt, Parser, Renderable, Tag, TagToken};
use crate::vm::State;

fn parse_block_name(markup: &str) -> Result<String, Error> {
    let mut parser = ok!(MarkupParser::new(markup));
    let name = match parser.next() {
        Some(MarkupToken::Ident(name)) | Some(MarkupToken::Str(name)) => name.to_string(),
        _ => {
            return Err(Error::new(
                ErrorKind::SyntaxError,
                "Syntax Error in 'block' - Valid syntax: block [name]",
            ))
        }
    };
    ok!(parser.expect_eof());
    Ok(name)
}

/// `{% embed 'layout' %}{% block name %}...{% endblock %}{% endembed %}`
///
/// Renders a layout in an isolated context like `render` does.  The blocks
/// inside the embed replace the blocks of the same name in the layout.
/// Everything outside of blocks is ignored.
pub(crate) struct Embed;

struct EmbedNode {
    template_name: String,
    args: PartialArgs,
    overrides: Arc<BTreeMap<String, Arc<Body>>>,
}

impl Tag for Embed {
    fn is_block(&self) -> bool {
        true
    }

    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let args = ok!(PartialArgs::parse(tag.markup));
        let template_name = match args.name {
            Expr::Const(ref value) if value.as_str().is_some() && !args.is_for => {
                value.to_string()
            }
            _ => {
                return Err(Error::new(
                    ErrorKind::SyntaxError,
                    "Syntax error in tag 'embed' - Template name must be a quoted string",
                ));
            }
        };

        let mut overrides = BTreeMap::new();
        let (_, mut end) = ok!(parser.parse_body(tag, &["block"]));
        while end.name == "block" {
            let name = ok!(parse_block_name(end.markup));
            let (body, _) = ok!(parser.parse_body(&end, &[]));
            overrides.insert(name, Arc::new(body));
            let (_, next) = ok!(parser.parse_body(tag, &["block"]));
            end = next;
        }

        Ok(Box::new(EmbedNode {
            template_name,
            args,
            overrides: Arc::new(overrides),
        }))
    }
}

impl Renderable for EmbedNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        let layout = ok!(state.partial_cache().load(state, &self.template_name));
        let attributes = ok!(self.args.eval_attributes(state));
        let variable = match self.args.variable {
            Some(ref expr) => ok!(state.eval(expr)),
            None => crate::value::Value::NIL,
        };

        let mut child = state.isolated(layout.name.clone());
        ok!(child.ctx.check_depth());
        child.ctx.disable_tags(&["include"]);
        child.block_overrides.push(self.overrides.clone());
        for (key, value) in attributes {
            child.set(key, value);
        }
        if !variable.is_nil() {
            child.set(self.args.variable_name(&self.template_name), variable);
        }
        let rv = child.render_body(&layout.body, out);
        state.errors.append(&mut child.errors);
        // interrupts stay inside the layout
        rv.map(|_| ControlFlow::Continue(()))
    }
}

/// `{% block name %}default{% endblock %}` marks a replaceable region of
/// a layout.
pub(crate) struct Block;

struct BlockNode {
    name: String,
    body: Body,
}

impl Tag for Block {
    fn is_block(&self) -> bool {
        true
    }

    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let name = ok!(parse_block_name(tag.markup));
        let (body, _) = ok!(parser.parse_body(tag, &[]));
        Ok(Box::new(BlockNode { name, body }))
    }
}

impl Renderable for BlockNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        let found = state
            .block_overrides
            .iter()
            .rposition(|overrides| overrides.contains_key(&self.name));
        let idx = match found {
            Some(idx) => idx,
            None => return state.render_body(&self.body, out),
        };
        let body = match state.block_overrides[idx].get(&self.name) {
            Some(body) => body.clone(),
            None => return state.render_body(&self.body, out),
        };
        // an override that contains the same block falls back to the default
        let outer = state.block_overrides.split_off(idx);
        let rv = state.render_body(&body, out);
        state.block_overrides.extend(outer);
        rv
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use crate::loader::MemoryFileSystem;
    use crate::{context, Environment};

    fn env() -> Environment {
        let mut fs = MemoryFileSystem::new();
        fs.insert(
            "card",
            "<div>{% block title %}Untitled{% endblock %}|{% block body %}{{ body }}{% endblock %}</div>",
        );
        fs.insert("nested", "{% include 'card' %}");
        let mut env = Environment::new();
        env.set_file_system(fs);
        env
    }

    #[test]
    fn test_embed_overrides_blocks() {
        let rv = env()
            .render_str(
                "{% embed 'card', body: 'text' %}ignored{% block title %}{{ 'Hi' | upcase }}{% endblock %}{% endembed %}",
                context! {},
            )
            .unwrap();
        assert_eq!(rv, "<div>HI|text</div>");
    }

    #[test]
    fn test_embed_is_isolated() {
        let rv = env()
            .render_str(
                "{% embed 'card' %}{% block body %}{{ secret }}{% endblock %}{% endembed %}",
                context! { secret => "s", body => "b" },
            )
            .unwrap();
        assert_eq!(rv, "<div>Untitled|</div>");
    }

    #[test]
    fn test_block_without_embed() {
        let rv = env()
            .render_str("{% block title %}default{% endblock %}", context! {})
            .unwrap();
        assert_eq!(rv, "default");
    }

    #[test]
    fn test_embed_disables_include() {
        let rv = env()
            .render_str("{% embed 'nested' %}{% endembed %}", context! {})
            .unwrap();
        assert_eq!(rv, "Liquid error: include usage is not allowed in this context");
    }
}
