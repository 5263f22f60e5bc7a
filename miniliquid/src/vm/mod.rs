use std::ops::ControlFlow;

use crate::compiler::ast::{Body, Node};
use crate::error::{Error, ErrorKind};
use crate::output::Output;
use crate::tags::Interrupt;
use crate::utils::ensure_sufficient_stack;

pub use crate::vm::context::{Registers, MAX_RENDER_DEPTH};
pub use crate::vm::limits::{LimitTracker, ResourceLimits};
pub use crate::vm::state::State;

pub(crate) use crate::vm::limits::assign_score_of;
pub(crate) use crate::vm::loop_object::{ForLoop, TableRowLoop};
pub(crate) use crate::vm::state::{RenderSettings, Shared};

mod context;
mod limits;
mod loop_object;
mod state;

fn locate(mut err: Error, state: &State, line: usize) -> Error {
    if state.env().line_numbers() {
        err.set_line(line);
        if let Some(name) = state.name() {
            err.set_name(name);
        }
    }
    err
}

fn disabled_tag(name: &str) -> Error {
    Error::new(
        ErrorKind::DisabledTag,
        format!("{name} usage is not allowed in this context"),
    )
}

fn render_node(
    state: &mut State,
    node: &Node,
    out: &mut Output,
) -> Result<ControlFlow<Interrupt>, Error> {
    match node {
        Node::Text(text) | Node::Raw(text) => {
            ok!(out.write_str(text).map_err(Error::from));
        }
        Node::Output { expr, line } => {
            let value = match state.eval_filtered(expr) {
                Ok(value) => value,
                Err(err) => return Err(locate(err, state, *line)),
            };
            ok!(write!(out, "{value}").map_err(Error::from));
        }
        Node::Tag {
            name,
            line,
            renderable,
        } => {
            if state.ctx.is_tag_disabled(name) {
                return Err(locate(disabled_tag(name), state, *line));
            }
            return renderable
                .render(state, out)
                .map_err(|err| locate(err, state, *line));
        }
        Node::Error(err) => {
            ok!(write!(out, "{err}").map_err(Error::from));
        }
    }
    Ok(ControlFlow::Continue(()))
}

/// Renders the nodes of a body in order.
pub(crate) fn render_body(
    state: &mut State,
    body: &Body,
    out: &mut Output,
) -> Result<ControlFlow<Interrupt>, Error> {
    ensure_sufficient_stack(|| {
        for node in &body.nodes {
            ok!(state.limits().increment_render_score(1));
            match render_node(state, node, out) {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(interrupt)) => return Ok(ControlFlow::Break(interrupt)),
                Err(err) => ok!(state.handle_error(err, out)),
            }
            ok!(state.limits().check_render_length(out.written()));
        }
        Ok(ControlFlow::Continue(()))
    })
}
