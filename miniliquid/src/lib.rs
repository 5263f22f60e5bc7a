//! miniliquid is a [Liquid](https://shopify.github.io/liquid/) template engine
//! for Rust with minimal dependencies.  It's implemented on top of [`serde`]:
//! any serializable value can be passed to a template.
//!
//! ```liquid
//! {% for product in products %}
//!   <li>{{ product.title | upcase }}</li>
//! {% endfor %}
//! ```
//!
//! # Template Usage
//!
//! To use miniliquid one creates an [`Environment`], compiles templates from
//! strings (or loads them through a [`FileSystem`](loader::FileSystem)) and
//! renders them with a context.  The [`context!`] macro is the most
//! convenient way to create one:
//!
//! ```
//! use miniliquid::{Environment, context};
//!
//! let mut env = Environment::new();
//! env.add_template("hello", "Hello {{ name }}!").unwrap();
//! let tmpl = env.get_template("hello").unwrap();
//! println!("{}", tmpl.render(context!(name => "John")).unwrap());
//! ```
//!
//! ```plain
//! Hello John!
//! ```
//!
//! For one-off templates [`Environment::render_str`] parses and renders in one
//! go, and the [`render!`] macro does not even need an environment.
//!
//! # Error Modes
//!
//! Liquid is forgiving by default.  In [`ErrorMode::Lax`] a broken tag or a
//! failing filter does not fail the render, the error message is written into
//! the output in its place instead:
//!
//! ```
//! # use miniliquid::{Environment, context};
//! let env = Environment::new();
//! let rv = env.render_str("a{{ 1 | divided_by: 0 }}b", context!{}).unwrap();
//! assert_eq!(rv, "aLiquid error: divided by 0b");
//! ```
//!
//! [`ErrorMode::Warn`] additionally collects parse problems on
//! [`Template::warnings`] and [`ErrorMode::Strict`] turns every error into an
//! [`Err`].  Strict variables and strict filters can be enabled separately.
//!
//! # Partials
//!
//! `include`, `render` and `embed` load other templates by name.  Templates
//! added to the environment are found first, everything else is read through
//! the file system set with [`Environment::set_file_system`].  Without one
//! these tags fail with an error.  With the `loader` feature `path_loader`
//! reads `_name.liquid` files from a directory.
//!
//! # Learn more
//!
//! - [`Environment`]: the main API entry point.  Teaches you how to configure
//!   the environment.
//! - [`Template`]: the template object API.  Shows you how templates can be
//!   rendered.
//! - [`filters`]: tells you how to write custom filters and lists the
//!   built-in ones.
//! - [`tags`]: tells you how to write custom tags.
//! - [`value`]: explains the value type and how to expose custom objects
//!   (drops) to templates.
//!
//! # Optional Features
//!
//! There are some additional features that can be enabled:
//!
//! - `builtins`: the standard filters.  On by default.
//! - `preserve_order`: keeps hashes in insertion order.  On by default.
//! - `loader`: the local file system loader.  On by default.
//! - `json`: the `json` filter.  On by default.
//! - `urlencode`: the `url_encode` and `url_decode` filters.  On by default.
//! - `unicode`: unicode identifiers and unicode aware `sort_natural`.
//! - `speedups`: faster HTML escaping through `v_htmlescape`.
//! - `stacker`: grows the stack on deep recursion instead of failing.
//! - `tracing`: logs compilation, partial loading and swallowed errors
//!   through `tracing`.
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::get_first)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

#[macro_use]
mod macros;

mod compiler;
mod defaults;
mod environment;
mod error;
mod output;
mod template;
mod utils;
mod vm;

pub mod filters;
pub mod loader;
pub mod tags;
pub mod value;

#[cfg(feature = "loader")]
pub use self::loader::path_loader;

pub use self::environment::{Environment, ErrorMode};
pub use self::error::{Error, ErrorKind};
pub use self::output::Output;
pub use self::template::{RenderOptions, Template};
pub use self::utils::HtmlEscape;
pub use self::value::Value;
pub use self::vm::{LimitTracker, Registers, ResourceLimits, State, MAX_RENDER_DEPTH};

#[doc(hidden)]
pub use self::macros::__context;
