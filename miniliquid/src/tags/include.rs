use std::ops::ControlFlow;
use std::sync::Arc;

use crate::compiler::ast::Expr;
use crate::compiler::markup::MarkupParser;
use crate::error::{Error, ErrorKind};
use crate::output::Output;
use crate::tags::{Interrupt, Parser, Renderable, Tag, TagToken};
use crate::template::CompiledTemplate;
use crate::value::{Value, ValueKind};
use crate::vm::{ForLoop, State};

/// The markup shared by `include` and `render`:
/// `'name' (with|for) expr (as alias) key: value, ...`
pub(super) struct PartialArgs {
    pub name: Expr,
    pub variable: Option<Expr>,
    pub is_for: bool,
    pub alias: Option<String>,
    pub attributes: Vec<(String, Expr)>,
}

impl PartialArgs {
    pub fn parse(markup: &str) -> Result<PartialArgs, Error> {
        let mut parser = ok!(MarkupParser::new(markup));
        let name = ok!(parser.parse_expr());
        let mut variable = None;
        let mut is_for = false;
        if parser.skip_ident("with") {
            variable = Some(ok!(parser.parse_expr()));
        } else if parser.skip_ident("for") {
            variable = Some(ok!(parser.parse_expr()));
            is_for = true;
        }
        let alias = if parser.skip_ident("as") {
            Some(ok!(parser.expect_ident()).to_string())
        } else {
            None
        };
        let attributes = ok!(parser.parse_attributes());
        ok!(parser.expect_eof());
        Ok(PartialArgs {
            name,
            variable,
            is_for,
            alias,
            attributes,
        })
    }

    /// The variable the partial sees its object under.
    pub fn variable_name<'a>(&'a self, template_name: &'a str) -> &'a str {
        match self.alias {
            Some(ref alias) => alias,
            None => template_name.rsplit('/').next().unwrap_or(template_name),
        }
    }

    pub fn eval_attributes(&self, state: &State) -> Result<Vec<(&str, Value)>, Error> {
        let mut rv = Vec::with_capacity(self.attributes.len());
        for (key, expr) in &self.attributes {
            rv.push((key.as_str(), ok!(state.eval(expr))));
        }
        Ok(rv)
    }
}

/// `{% include 'name' %}` renders a partial in the scope of the includer.
pub(crate) struct Include;

struct IncludeNode {
    args: PartialArgs,
}

impl Tag for Include {
    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        _parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let args = ok!(PartialArgs::parse(tag.markup));
        Ok(Box::new(IncludeNode { args }))
    }
}

impl IncludeNode {
    fn render_partial(
        &self,
        state: &mut State,
        out: &mut Output,
        partial: &CompiledTemplate,
        template_name: &str,
        variable: Value,
    ) -> Result<ControlFlow<Interrupt>, Error> {
        for (key, value) in ok!(self.args.eval_attributes(state)) {
            state.set(key, value);
        }
        let var_name = self.args.variable_name(template_name);
        match variable.as_slice() {
            Some(items) => {
                for item in items {
                    state.set(var_name, item.clone());
                    if let flow @ ControlFlow::Break(_) = ok!(state.render_body(&partial.body, out)) {
                        return Ok(flow);
                    }
                }
                Ok(ControlFlow::Continue(()))
            }
            None => {
                state.set(var_name, variable);
                state.render_body(&partial.body, out)
            }
        }
    }
}

impl Renderable for IncludeNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        let template_name = match ok!(state.eval(&self.args.name)).as_str() {
            Some(name) => name.to_string(),
            None => {
                return Err(Error::new(
                    ErrorKind::ArgumentError,
                    "Argument error in tag 'include' - Illegal template name",
                ))
            }
        };
        let partial = ok!(state.partial_cache().load(state, &template_name));
        let variable = match self.args.variable {
            Some(ref expr) => ok!(state.eval(expr)),
            None => state.lookup(&template_name).unwrap_or_default(),
        };

        ok!(state.push_scope());
        let old_name = std::mem::replace(&mut state.name, partial.name.clone());
        let rv = self.render_partial(state, out, &partial, &template_name, variable);
        state.name = old_name;
        ok!(state.pop_scope());
        rv
    }
}

/// `{% render 'name' %}` renders a partial in an isolated context.
///
/// The partial does not see the variables of the caller and cannot use
/// `include`.
pub(crate) struct RenderTag;

struct RenderNode {
    template_name: String,
    args: PartialArgs,
}

impl Tag for RenderTag {
    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        _parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let args = ok!(PartialArgs::parse(tag.markup));
        let template_name = match args.name {
            Expr::Const(ref value) if value.as_str().is_some() => value.to_string(),
            _ => {
                return Err(Error::new(
                    ErrorKind::SyntaxError,
                    "Syntax error in tag 'render' - Template name must be a quoted string",
                ))
            }
        };
        Ok(Box::new(RenderNode {
            template_name,
            args,
        }))
    }
}

impl RenderNode {
    fn render_isolated(
        &self,
        state: &mut State,
        out: &mut Output,
        partial: &CompiledTemplate,
        attributes: &[(&str, Value)],
        variable: Option<Value>,
        forloop: Option<&Arc<ForLoop>>,
    ) -> Result<(), Error> {
        let mut child = state.isolated(partial.name.clone());
        ok!(child.ctx.check_depth());
        child.ctx.disable_tags(&["include"]);
        if let Some(forloop) = forloop {
            let value = Value::from(forloop.clone());
            child.ctx.set_current_loop(value.clone());
            child.set("forloop", value);
        }
        for (key, value) in attributes {
            child.set(key, value.clone());
        }
        if let Some(variable) = variable {
            if !variable.is_nil() {
                child.set(self.args.variable_name(&self.template_name), variable);
            }
        }
        let rv = child.render_body(&partial.body, out);
        state.errors.append(&mut child.errors);
        rv.map(|_| ())
    }
}

impl Renderable for RenderNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        let partial = ok!(state.partial_cache().load(state, &self.template_name));
        let attributes = ok!(self.args.eval_attributes(state));
        let variable = match self.args.variable {
            Some(ref expr) => Some(ok!(state.eval(expr))),
            None => None,
        };

        match variable {
            Some(variable)
                if self.args.is_for
                    && matches!(
                        variable.kind(),
                        ValueKind::Seq | ValueKind::Range | ValueKind::Map
                    ) =>
            {
                let items = variable.iter_items();
                let forloop = ForLoop::new(self.template_name.clone(), items.len(), None);
                for item in items {
                    ok!(self.render_isolated(
                        state,
                        out,
                        &partial,
                        &attributes,
                        Some(item),
                        Some(&forloop)
                    ));
                    forloop.advance();
                }
            }
            variable => {
                ok!(self.render_isolated(state, out, &partial, &attributes, variable, None));
            }
        }
        Ok(ControlFlow::Continue(()))
    }
}
