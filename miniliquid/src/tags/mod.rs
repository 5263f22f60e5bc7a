//! Tags and the interfaces to write custom ones.
//!
//! A tag is registered under a name with
//! [`add_tag`](crate::Environment::add_tag).  When the parser encounters
//! `{% name markup %}` it hands the [`TagToken`] to [`Tag::parse`] which
//! returns a [`Renderable`].  Block tags parse their body through the
//! [`Parser`] and keep the resulting [`Body`] around to render it later.
//!
//! # Custom Tags
//!
//! The following tag renders its body twice:
//!
//! ```
//! use std::ops::ControlFlow;
//! use miniliquid::tags::{Body, Interrupt, Parser, Renderable, Tag, TagToken};
//! use miniliquid::{Environment, Error, Output, State};
//!
//! struct Twice;
//!
//! struct TwiceBlock {
//!     body: Body,
//! }
//!
//! impl Tag for Twice {
//!     fn is_block(&self) -> bool {
//!         true
//!     }
//!
//!     fn parse<'s>(
//!         &self,
//!         tag: &TagToken<'s>,
//!         parser: &mut Parser<'s, '_>,
//!     ) -> Result<Box<dyn Renderable>, Error> {
//!         let (body, _) = parser.parse_body(tag, &[])?;
//!         Ok(Box::new(TwiceBlock { body }))
//!     }
//! }
//!
//! impl Renderable for TwiceBlock {
//!     fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error> {
//!         for _ in 0..2 {
//!             if let ControlFlow::Break(interrupt) = state.render_body(&self.body, out)? {
//!                 return Ok(ControlFlow::Break(interrupt));
//!             }
//!         }
//!         Ok(ControlFlow::Continue(()))
//!     }
//! }
//!
//! let mut env = Environment::new();
//! env.add_tag("twice", Twice);
//! let rv = env.render_str("{% twice %}{{ x }}{% endtwice %}", miniliquid::context!{ x => 1 });
//! assert_eq!(rv.unwrap(), "11");
//! ```
//!
//! # Built-in Tags
//!
//! `assign`, `capture`, `increment`, `decrement`, `if`, `unless`, `case`,
//! `ifchanged`, `for`, `break`, `continue`, `cycle`, `tablerow`, `comment`,
//! `#`, `raw`, `echo`, `liquid`, `include`, `render`, `embed` and `block`.
use std::ops::ControlFlow;

use crate::error::Error;
use crate::output::Output;
use crate::vm::State;

pub use crate::compiler::ast::Body;
pub use crate::compiler::markup::MarkupParser;
pub use crate::compiler::parser::Parser;

mod assign;
mod conditional;
mod embed;
mod include;
mod iteration;
mod text;

pub(crate) use self::assign::{Assign, Capture, Counter};
pub(crate) use self::conditional::{Case, If, IfChanged};
pub(crate) use self::embed::{Block, Embed};
pub(crate) use self::include::{Include, RenderTag};
pub(crate) use self::iteration::{Cycle, For, LoopControl, TableRow};
pub(crate) use self::text::{Comment, Echo, InlineComment, LiquidTag};

/// A tag as the parser hands it to [`Tag::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagToken<'s> {
    /// The name of the tag.
    pub name: &'s str,
    /// Everything after the name, trimmed.
    pub markup: &'s str,
    /// The line the tag starts on.
    pub line: usize,
}

/// Interrupts of the regular control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// `{% break %}`
    Break,
    /// `{% continue %}`
    Continue,
}

/// The parse half of a tag.
pub trait Tag: Send + Sync + 'static {
    /// Block tags have a body that ends with `end<name>`.
    fn is_block(&self) -> bool {
        false
    }

    /// Parses the tag.
    ///
    /// Block tags call [`Parser::parse_body`] to parse their body.
    fn parse<'s>(
        &self,
        tag: &TagToken<'s>,
        parser: &mut Parser<'s, '_>,
    ) -> Result<Box<dyn Renderable>, Error>;
}

/// A parsed tag that can be rendered.
pub trait Renderable: Send + Sync {
    /// Renders into the output.
    ///
    /// `ControlFlow::Break` hands a `break` or `continue` to the enclosing
    /// loop.
    fn render(&self, state: &mut State, out: &mut Output) -> Result<ControlFlow<Interrupt>, Error>;

    /// Is the tag free of output?
    ///
    /// Bodies that only consist of blank tags and whitespace drop the
    /// whitespace.
    fn is_blank(&self) -> bool {
        false
    }
}
