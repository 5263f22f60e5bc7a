use std::ops::ControlFlow;

use crate::compiler::ast::{Body, Expr};
use crate::compiler::markup::MarkupParser;
use crate::compiler::tokens::MarkupToken;
use crate::error::{Error, ErrorKind};
use crate::output::Output;
use crate::tags::{Interrupt, Parser, Renderable, Tag, TagToken};
use crate::utils::split_whitespace;
use crate::value::{ops, Value, ValueRepr};
use crate::vm::{ForLoop, State, TableRowLoop};

fn invalid_syntax(tag: &str, usage: &str) -> Error {
    Error::new(
        ErrorKind::SyntaxError,
        format!("Syntax Error in '{tag}' - Valid syntax: {usage}"),
    )
}

/// Where a loop starts.
enum Offset {
    Expr(Expr),
    Continue,
}

/// The shared `item in collection attr: value` header of `for` and
/// `tablerow`.
struct LoopHeader {
    var: String,
    name: String,
    collection: Expr,
    reversed: bool,
    limit: Option<Expr>,
    offset: Option<Offset>,
    cols: Option<Expr>,
}

fn parse_header(markup: &str, label: &str, usage: &str) -> Result<LoopHeader, Error> {
    let mut parser = ok!(MarkupParser::new(markup));
    let var = match (parser.next(), parser.next()) {
        (Some(MarkupToken::Ident(var)), Some(MarkupToken::Ident("in"))) => var.to_string(),
        _ => return Err(invalid_syntax(label, usage)),
    };
    let collection = ok!(parser.parse_expr());
    let reversed = parser.skip_ident("reversed");
    let mut header = LoopHeader {
        name: format!("{}-{}", var, split_whitespace(markup).nth(2).unwrap_or_default()),
        var,
        collection,
        reversed,
        limit: None,
        offset: None,
        cols: None,
    };
    for (key, expr) in ok!(parser.parse_attributes()) {
        match key.as_str() {
            "limit" => header.limit = Some(expr),
            "cols" => header.cols = Some(expr),
            "offset" => {
                header.offset = Some(match expr {
                    Expr::Var(ref var) if var.name() == Some("continue") && var.lookups.is_empty() => {
                        Offset::Continue
                    }
                    expr => Offset::Expr(expr),
                })
            }
            _ => {}
        }
    }
    ok!(parser.expect_eof());
    Ok(header)
}

/// Converts a loop attribute into a count.  `nil` means no value.
fn to_count(value: &Value) -> Option<usize> {
    if value.is_nil() {
        return None;
    }
    Some(match ops::to_number(value).0 {
        ValueRepr::I64(v) => v.max(0) as usize,
        ValueRepr::F64(v) => v.max(0.0) as usize,
        _ => 0,
    })
}

fn eval_count(state: &State, expr: Option<&Expr>) -> Result<Option<usize>, Error> {
    match expr {
        Some(expr) => Ok(to_count(&ok!(state.eval(expr)))),
        None => Ok(None),
    }
}

/// The items a loop walks over.  Ranges are not materialized.
enum LoopItems {
    Range(i64, i64),
    Seq(Vec<Value>),
}

impl LoopItems {
    fn len(&self) -> usize {
        match *self {
            LoopItems::Range(first, last) => (last.abs_diff(first) as usize).saturating_add(1),
            LoopItems::Seq(ref items) => items.len(),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(*self, LoopItems::Seq(ref items) if items.is_empty())
    }

    fn into_iter(self, reversed: bool) -> Box<dyn Iterator<Item = Value>> {
        match (self, reversed) {
            (LoopItems::Range(first, last), false) => Box::new((first..=last).map(Value::from)),
            (LoopItems::Range(first, last), true) => {
                Box::new((first..=last).rev().map(Value::from))
            }
            (LoopItems::Seq(items), false) => Box::new(items.into_iter()),
            (LoopItems::Seq(items), true) => Box::new(items.into_iter().rev()),
        }
    }
}

/// Selects the items of a collection between `from` and `from + limit`.
fn slice_collection(collection: &Value, from: usize, limit: Option<usize>) -> LoopItems {
    match collection.0 {
        ValueRepr::Range(start, end) => {
            let first = start.saturating_add(from.min(i64::MAX as usize) as i64);
            let last = match limit {
                Some(0) => return LoopItems::Seq(Vec::new()),
                Some(limit) => end.min(first.saturating_add(limit.min(i64::MAX as usize) as i64 - 1)),
                None => end,
            };
            if first > last {
                LoopItems::Seq(Vec::new())
            } else {
                LoopItems::Range(first, last)
            }
        }
        _ => LoopItems::Seq(
            collection
                .iter_items()
                .into_iter()
                .skip(from)
                .take(limit.unwrap_or(usize::MAX))
                .collect(),
        ),
    }
}

fn offset_register(name: &str) -> String {
    format!("for:{name}")
}

/// `{% for item in collection %}...{% else %}...{% endfor %}`
pub(crate) struct For;

struct ForBlock {
    header: LoopHeader,
    body: Body,
    else_body: Option<Body>,
}

impl Tag for For {
    fn is_block(&self) -> bool {
        true
    }

    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let header = ok!(parse_header(
            tag.markup,
            "for loop",
            "for [item] in [collection]"
        ));
        let (body, end) = ok!(parser.parse_body(tag, &["else"]));
        let else_body = if end.name == "else" {
            Some(ok!(parser.parse_body(tag, &[])).0)
        } else {
            None
        };
        Ok(Box::new(ForBlock {
            header,
            body,
            else_body,
        }))
    }
}

impl ForBlock {
    fn render_items(
        &self,
        state: &mut State,
        out: &mut Output,
        items: LoopItems,
    ) -> Result<(), Error> {
        let forloop = ForLoop::new(self.header.name.clone(), items.len(), state.current_loop());
        state.ctx.set_current_loop(Value::from(forloop.clone()));
        state.set("forloop", Value::from(forloop.clone()));
        for item in items.into_iter(self.header.reversed) {
            ok!(state.limits().increment_render_score(1));
            ok!(state.push_scope());
            state.set(&self.header.var, item);
            let flow = state.render_body(&self.body, out);
            ok!(state.pop_scope());
            if let ControlFlow::Break(Interrupt::Break) = ok!(flow) {
                break;
            }
            forloop.advance();
        }
        Ok(())
    }
}

impl Renderable for ForBlock {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        let collection = ok!(state.eval(&self.header.collection));
        let register = offset_register(&self.header.name);
        let from = match self.header.offset {
            Some(Offset::Continue) => state
                .registers()
                .get(&register)
                .and_then(|x| to_count(&x))
                .unwrap_or(0),
            Some(Offset::Expr(ref expr)) => ok!(eval_count(state, Some(expr))).unwrap_or(0),
            None => 0,
        };
        let limit = ok!(eval_count(state, self.header.limit.as_ref()));
        let items = slice_collection(&collection, from, limit);
        state
            .registers()
            .set(&register, Value::from(from.saturating_add(items.len())));

        if items.is_empty() {
            return match self.else_body {
                Some(ref body) => state.render_body(body, out),
                None => Ok(ControlFlow::Continue(())),
            };
        }

        ok!(state.push_scope());
        let rv = self.render_items(state, out, items);
        ok!(state.pop_scope());
        ok!(rv);
        Ok(ControlFlow::Continue(()))
    }
}

/// `{% break %}` and `{% continue %}`.
pub(crate) struct LoopControl {
    pub interrupt: Interrupt,
}

struct LoopControlNode(Interrupt);

impl Tag for LoopControl {
    fn parse<'s>(
        &self,
        _tag: &TagToken<'s>,
        _parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        Ok(Box::new(LoopControlNode(self.interrupt)))
    }
}

impl Renderable for LoopControlNode {
    fn render(&self, _state: &mut State, _out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        Ok(ControlFlow::Break(self.0))
    }
}

/// `{% cycle 'a', 'b' %}` and `{% cycle group: 'a', 'b' %}`.
pub(crate) struct Cycle;

struct CycleNode {
    group: Option<Expr>,
    markup: String,
    values: Vec<Expr>,
}

impl Tag for Cycle {
    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        _parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let usage = "cycle [name :] var [, var2, var3 ...]";
        let mut parser = ok!(MarkupParser::new(tag.markup));
        if parser.is_eof() {
            return Err(invalid_syntax("cycle", usage));
        }
        let first = ok!(parser.parse_expr());
        let (group, mut values) = if parser.skip_token(&MarkupToken::Colon) {
            (Some(first), vec![ok!(parser.parse_expr())])
        } else {
            (None, vec![first])
        };
        while parser.skip_token(&MarkupToken::Comma) {
            values.push(ok!(parser.parse_expr()));
        }
        ok!(parser.expect_eof());
        Ok(Box::new(CycleNode {
            group,
            markup: tag.markup.to_string(),
            values,
        }))
    }
}

impl CycleNode {
    fn key(&self, state: &State) -> Result<String, Error> {
        let group = match self.group {
            None => return Ok(format!("cycle:{}", self.markup)),
            Some(Expr::Var(ref var)) if var.lookups.is_empty() => match var.name() {
                Some(name) => state
                    .lookup(name)
                    .map_or_else(|| name.to_string(), |x| x.to_string()),
                None => ok!(state.eval(&Expr::Var(var.clone()))).to_string(),
            },
            Some(ref expr) => ok!(state.eval(expr)).to_string(),
        };
        Ok(format!("cycle:{group}:"))
    }
}

impl Renderable for CycleNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        let key = ok!(self.key(state));
        let len = self.values.len() as i64;
        let position = state.registers().update(&key, |old| {
            let idx = old.and_then(|x| x.as_i64()).unwrap_or(0);
            Value::from((idx + 1) % len)
        });
        let idx = (position.as_i64().unwrap_or(0) + len - 1) % len;
        let value = ok!(state.eval(&self.values[idx as usize]));
        ok!(write!(out, "{value}").map_err(Error::from));
        Ok(ControlFlow::Continue(()))
    }
}

/// `{% tablerow item in collection cols: 3 %}...{% endtablerow %}`
pub(crate) struct TableRow;

struct TableRowBlock {
    header: LoopHeader,
    body: Body,
}

impl Tag for TableRow {
    fn is_block(&self) -> bool {
        true
    }

    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error> {
        let header = ok!(parse_header(
            tag.markup,
            "table_row loop",
            "table_row [item] in [collection] cols=3"
        ));
        if matches!(header.offset, Some(Offset::Continue)) {
            return Err(invalid_syntax(
                "table_row loop",
                "table_row [item] in [collection] cols=3",
            ));
        }
        let (body, _) = ok!(parser.parse_body(tag, &[]));
        Ok(Box::new(TableRowBlock { header, body }))
    }
}

impl TableRowBlock {
    fn render_rows(
        &self,
        state: &mut State,
        out: &mut Output,
        items: LoopItems,
        cols: Option<usize>,
    ) -> Result<(), Error> {
        let len = items.len();
        let tablerowloop = TableRowLoop::new(len, cols);
        state.set("tablerowloop", Value::from(tablerowloop.clone()));
        ok!(out.write_str("<tr class=\"row1\">\n").map_err(Error::from));
        for (idx, item) in items.into_iter(false).enumerate() {
            ok!(state.limits().increment_render_score(1));
            ok!(write!(out, "<td class=\"col{}\">", tablerowloop.col0() + 1).map_err(Error::from));
            ok!(state.push_scope());
            state.set(&self.header.var, item);
            let flow = state.render_body(&self.body, out);
            ok!(state.pop_scope());
            let flow = ok!(flow);
            ok!(out.write_str("</td>").map_err(Error::from));
            if flow == ControlFlow::Break(Interrupt::Break) {
                break;
            }
            if tablerowloop.col_last() && idx + 1 != len {
                ok!(write!(out, "</tr>\n<tr class=\"row{}\">", tablerowloop.row() + 1)
                    .map_err(Error::from));
            }
            tablerowloop.advance();
        }
        ok!(out.write_str("</tr>\n").map_err(Error::from));
        Ok(())
    }
}

impl Renderable for TableRowBlock {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
        let collection = ok!(state.eval(&self.header.collection));
        let from = ok!(eval_count(state, match self.header.offset {
            Some(Offset::Expr(ref expr)) => Some(expr),
            _ => None,
        }))
        .unwrap_or(0);
        let limit = ok!(eval_count(state, self.header.limit.as_ref()));
        let cols = ok!(eval_count(state, self.header.cols.as_ref()));
        let items = slice_collection(&collection, from, limit);

        ok!(state.push_scope());
        let rv = self.render_rows(state, out, items, cols);
        ok!(state.pop_scope());
        ok!(rv);
        Ok(ControlFlow::Continue(()))
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use crate::value::Value;
    use crate::{context, Environment, ErrorKind, ResourceLimits};

    fn render(source: &str, ctx: Value) -> String {
        Environment::new().render_str(source, ctx).unwrap()
    }

    #[test]
    fn test_for_basics() {
        let ctx = context! { items => vec![1, 2, 3, 4] };
        assert_eq!(render("{% for x in items %}{{ x }}{% endfor %}", ctx.clone()), "1234");
        assert_eq!(
            render("{% for x in items reversed %}{{ x }}{% endfor %}", ctx.clone()),
            "4321"
        );
        assert_eq!(
            render("{% for x in items limit: 2 offset: 1 %}{{ x }}{% endfor %}", ctx.clone()),
            "23"
        );
        assert_eq!(
            render("{% for x in (1..3) %}{{ x }}{% endfor %}{{ x }}", ctx.clone()),
            "123"
        );
        assert_eq!(
            render("{% for x in missing %}{{ x }}{% else %}none{% endfor %}", ctx),
            "none"
        );
    }

    #[test]
    fn test_forloop_drop() {
        let rv = render(
            "{% for x in (1..3) %}{{ forloop.index }}{{ forloop.rindex0 }}{% if forloop.last %}!{% endif %} {% endfor %}",
            context! {},
        );
        assert_eq!(rv, "12 21 30! ");
        let rv = render(
            "{% for a in (1..2) %}{% for b in (1..2) %}{{ forloop.parentloop.index }}{{ forloop.index }},{% endfor %}{% endfor %}",
            context! {},
        );
        assert_eq!(rv, "11,12,21,22,");
        let rv = render("{% for x in (1..1) %}{{ forloop.name }}{% endfor %}", context! {});
        assert_eq!(rv, "x-(1..1)");
    }

    #[test]
    fn test_break_and_continue() {
        let rv = render(
            "{% for x in (1..6) %}{% if x == 2 %}{% continue %}{% endif %}{% if x == 5 %}{% break %}{% endif %}{{ x }}{% endfor %}",
            context! {},
        );
        assert_eq!(rv, "134");
        let rv = render(
            "{% for a in (1..2) %}{% for b in (1..3) %}{% if b == 2 %}{% break %}{% endif %}{{ a }}{{ b }} {% endfor %}{% endfor %}",
            context! {},
        );
        assert_eq!(rv, "11 21 ");
    }

    #[test]
    fn test_offset_continue() {
        let rv = render(
            "{% for x in items limit: 2 %}{{ x }}{% endfor %}|{% for x in items offset: continue limit: 2 %}{{ x }}{% endfor %}|{% for x in items offset: continue %}{{ x }}{% endfor %}",
            context! { items => vec![1, 2, 3, 4, 5] },
        );
        assert_eq!(rv, "12|34|5");
    }

    #[test]
    fn test_for_syntax_error() {
        let rv = render("{% for x of y %}{% endfor %}", context! {});
        assert_eq!(
            rv,
            "Liquid syntax error: Syntax Error in 'for loop' - Valid syntax: for [item] in [collection]"
        );
    }

    #[test]
    fn test_assign_in_loop_is_global() {
        let rv = render(
            "{% for x in (1..3) %}{% assign last = x %}{% endfor %}{{ last }}",
            context! {},
        );
        assert_eq!(rv, "3");
    }

    #[test]
    fn test_huge_ranges() {
        let rv = render(
            "{% for x in (1..30000000) reversed %}{{ x }}{% break %}{% endfor %}\
             {% for x in (1..30000000) limit: 2 %}{{ forloop.length }}{% endfor %}",
            context! {},
        );
        assert_eq!(rv, "3000000022");

        let mut env = Environment::new();
        env.set_resource_limits(ResourceLimits::default().with_render_score_limit(100));
        let tmpl = env
            .template_from_str("{% for x in (1..30000000) %}{% endfor %}")
            .unwrap();
        let (rv, state) = tmpl.render_and_return_state(context! {}).unwrap();
        assert_eq!(rv, "Liquid error: Memory limits exceeded");
        assert!(state.limits().reached());
        assert_eq!(state.errors()[0].kind(), ErrorKind::MemoryLimit);
    }

    #[test]
    fn test_loop_scope_per_iteration() {
        let rv = render(
            "{% for x in (1..3) %}{{ x }}{% for y in (1..2) %}{{ forloop.parentloop.index }}{% endfor %}{% endfor %}{{ x }}",
            context! {},
        );
        assert_eq!(rv, "111222333");
    }

    #[test]
    fn test_cycle() {
        let rv = render(
            "{% for x in (1..4) %}{% cycle 'a', 'b', 'c' %}{% endfor %}",
            context! {},
        );
        assert_eq!(rv, "abca");
        let rv = render(
            "{% cycle 'g1': 1, 2 %}{% cycle 'g2': 1, 2 %}{% cycle 'g1': 1, 2 %}",
            context! {},
        );
        assert_eq!(rv, "112");
    }

    #[test]
    fn test_tablerow() {
        let rv = render(
            "{% tablerow x in items cols: 2 %}{{ x }}{% endtablerow %}",
            context! { items => vec![1, 2, 3] },
        );
        assert_eq!(
            rv,
            "<tr class=\"row1\">\n<td class=\"col1\">1</td><td class=\"col2\">2</td></tr>\n<tr class=\"row2\"><td class=\"col1\">3</td></tr>\n"
        );
        let rv = render(
            "{% tablerow x in (1..3) limit: 2 %}{{ tablerowloop.col }}{{ tablerowloop.col_last }}{% endtablerow %}",
            context! {},
        );
        assert_eq!(
            rv,
            "<tr class=\"row1\">\n<td class=\"col1\">1false</td><td class=\"col2\">2true</td></tr>\n"
        );
    }
}
