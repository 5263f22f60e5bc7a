use std::collections::BTreeMap;
use std::sync::Arc;
use std::{fmt, io};

use serde::Serialize;

use crate::compiler::ast::Body;
use crate::compiler::parser::Parser;
use crate::environment::{Environment, ErrorMode};
use crate::error::{Error, ErrorKind};
use crate::filters::{BoxedFilter, Filter};
use crate::loader::PartialCache;
use crate::output::{Output, WriteWrapper};
use crate::value::{FunctionArgs, FunctionResult, Value};
use crate::vm::{LimitTracker, Registers, RenderSettings, ResourceLimits, Shared, State};

/// Represents a compiled template in memory.
pub(crate) struct CompiledTemplate {
    /// The name of the template if it has one.
    pub name: Option<Arc<str>>,
    /// The node tree.
    pub body: Body,
    /// Problems found while parsing in warn mode.
    pub warnings: Vec<Error>,
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .field("warnings", &self.warnings)
            .finish()
    }
}

impl CompiledTemplate {
    /// Compiles a template with the settings of the environment.
    pub fn new(
        env: &Environment,
        name: Option<Arc<str>>,
        source: &str,
    ) -> Result<CompiledTemplate, Error> {
        let rv = Parser::new(env, source).and_then(|parser| parser.parse_document());
        let (body, warnings) = match rv {
            Ok(rv) => rv,
            Err(mut err) => {
                if let (true, Some(name)) = (err.line().is_some(), name.as_deref()) {
                    err.set_name(name);
                }
                return Err(err);
            }
        };
        debug!(
            name = name.as_deref().unwrap_or("<string>"),
            warnings = warnings.len(),
            "compiled template"
        );
        Ok(CompiledTemplate {
            name,
            body,
            warnings,
        })
    }
}

/// Per render overrides of the environment settings.
///
/// ```
/// # use miniliquid::{context, Environment, ErrorMode, RenderOptions};
/// let env = Environment::new();
/// let tmpl = env.template_from_str("{{ missing }}").unwrap();
/// let options = RenderOptions::default()
///     .with_strict_variables(true)
///     .with_error_mode(ErrorMode::Strict);
/// assert!(tmpl.render_with_options(context! {}, &options).is_err());
/// ```
#[derive(Clone, Default)]
pub struct RenderOptions {
    strict_variables: Option<bool>,
    strict_filters: Option<bool>,
    error_mode: Option<ErrorMode>,
    resource_limits: Option<ResourceLimits>,
    registers: Option<Arc<Registers>>,
    partial_cache: Option<Arc<PartialCache>>,
    filters: BTreeMap<String, BoxedFilter>,
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("strict_variables", &self.strict_variables)
            .field("strict_filters", &self.strict_filters)
            .field("error_mode", &self.error_mode)
            .field("resource_limits", &self.resource_limits)
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RenderOptions {
    /// Makes unknown variables an error for this render.
    pub fn with_strict_variables(mut self, yes: bool) -> Self {
        self.strict_variables = Some(yes);
        self
    }

    /// Makes unknown filters an error for this render.
    pub fn with_strict_filters(mut self, yes: bool) -> Self {
        self.strict_filters = Some(yes);
        self
    }

    /// Overrides the error mode for rendering.
    ///
    /// The error mode the template was parsed with is not affected.
    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = Some(mode);
        self
    }

    /// Overrides the resource limits.
    pub fn with_resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = Some(limits);
        self
    }

    /// Passes registers in.  They are shared with every partial.
    pub fn with_registers(mut self, registers: Arc<Registers>) -> Self {
        self.registers = Some(registers);
        self
    }

    /// Uses a partial cache that outlives the render.
    pub fn with_partial_cache(mut self, cache: Arc<PartialCache>) -> Self {
        self.partial_cache = Some(cache);
        self
    }

    /// Adds a filter for this render only.
    ///
    /// Filters of the render win over filters of the environment.
    pub fn with_filter<N, F, Rv, Args>(mut self, name: N, f: F) -> Self
    where
        N: Into<String>,
        // the crazy bounds here exist to enable borrowing in closures
        F: Filter<Rv, Args> + for<'a> Filter<Rv, <Args as FunctionArgs<'a>>::Output>,
        Rv: FunctionResult,
        Args: for<'a> FunctionArgs<'a>,
    {
        self.filters.insert(name.into(), BoxedFilter::new(f));
        self
    }
}

/// Represents a handle to a template.
///
/// Templates are compiled by [`Environment::template_from_str`] or loaded
/// with [`Environment::get_template`].  The handle is cheap to clone and
/// can be rendered any number of times.
#[derive(Clone)]
pub struct Template<'env> {
    env: &'env Environment,
    compiled: Arc<CompiledTemplate>,
}

impl fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name())
            .field("warnings", &self.compiled.warnings)
            .finish()
    }
}

impl<'env> Template<'env> {
    pub(crate) fn new(env: &'env Environment, compiled: Arc<CompiledTemplate>) -> Template<'env> {
        Template { env, compiled }
    }

    /// Returns the name of the template.
    pub fn name(&self) -> Option<&str> {
        self.compiled.name.as_deref()
    }

    /// Returns the problems that were found while parsing in
    /// [`ErrorMode::Warn`].
    pub fn warnings(&self) -> &[Error] {
        &self.compiled.warnings
    }

    /// Renders the template into a string.
    ///
    /// The provided value is used as the assigns of the render.  It can be
    /// any object that implements [`Serialize`](serde::Serialize).  You can
    /// either create your own struct and derive `Serialize` for it or the
    /// [`context!`](crate::context) macro can be used to create an ad-hoc
    /// context.
    ///
    /// ```
    /// # use miniliquid::{Environment, context};
    /// # let mut env = Environment::new();
    /// # env.add_template("hello", "Hello {{ name }}!").unwrap();
    /// let tmpl = env.get_template("hello").unwrap();
    /// println!("{}", tmpl.render(context!(name => "John")).unwrap());
    /// ```
    ///
    /// Outside of [`ErrorMode::Strict`] failing nodes render their error
    /// message in place and the render succeeds.
    ///
    /// **Note on values:** The [`Value`] type implements `Serialize` and can be
    /// efficiently passed to render.  It does not undergo actual serialization.
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, Error> {
        self._render(Value::from_serialize(&ctx), &RenderOptions::default())
            .map(|x| x.0)
    }

    /// Like [`render`](Self::render) but with per render options.
    pub fn render_with_options<S: Serialize>(
        &self,
        ctx: S,
        options: &RenderOptions,
    ) -> Result<String, Error> {
        self._render(Value::from_serialize(&ctx), options)
            .map(|x| x.0)
    }

    /// Like [`render`](Self::render) but also return the evaluated [`State`].
    ///
    /// This can be used to inspect the errors that were rendered in place,
    /// the resource usage or the variables that were assigned.
    ///
    /// ```
    /// # use miniliquid::{Environment, context, value::Value};
    /// # let mut env = Environment::new();
    /// let tmpl = env.template_from_str("{% assign x = 42 %}{{ 1 | divided_by: 0 }}").unwrap();
    /// let (rv, state) = tmpl.render_and_return_state(context!{}).unwrap();
    /// assert_eq!(rv, "Liquid error: divided by 0");
    /// assert_eq!(state.lookup("x"), Some(Value::from(42)));
    /// assert_eq!(state.errors().len(), 1);
    /// ```
    pub fn render_and_return_state<S: Serialize>(
        &self,
        ctx: S,
    ) -> Result<(String, State<'env>), Error> {
        self._render(Value::from_serialize(&ctx), &RenderOptions::default())
    }

    fn _render(&self, root: Value, options: &RenderOptions) -> Result<(String, State<'env>), Error> {
        let mut rv = String::new();
        self._eval(root, options, &mut Output::new(&mut rv))
            .map(|state| (rv, state))
    }

    /// Renders the template into an [`io::Write`].
    ///
    /// This works exactly like [`render`](Self::render) but instead writes
    /// the template as it's evaluating into an [`io::Write`].  It also
    /// returns the [`State`] like
    /// [`render_and_return_state`](Self::render_and_return_state) does.
    ///
    /// ```
    /// # use miniliquid::{Environment, context};
    /// # let mut env = Environment::new();
    /// # env.add_template("hello", "Hello {{ name }}!").unwrap();
    /// use std::io::stdout;
    ///
    /// let tmpl = env.get_template("hello").unwrap();
    /// tmpl.render_to_write(context!(name => "John"), &mut stdout()).unwrap();
    /// ```
    pub fn render_to_write<S: Serialize, W: io::Write>(
        &self,
        ctx: S,
        w: W,
    ) -> Result<State<'env>, Error> {
        let mut wrapper = WriteWrapper { w, err: None };
        self._eval(
            Value::from_serialize(&ctx),
            &RenderOptions::default(),
            &mut Output::new(&mut wrapper),
        )
        .map_err(|err| wrapper.take_err(err))
    }

    fn _eval(
        &self,
        root: Value,
        options: &RenderOptions,
        out: &mut Output,
    ) -> Result<State<'env>, Error> {
        let env = self.env;
        let shared = Arc::new(Shared {
            settings: RenderSettings {
                strict_variables: options
                    .strict_variables
                    .unwrap_or_else(|| env.strict_variables()),
                strict_filters: options
                    .strict_filters
                    .unwrap_or_else(|| env.strict_filters()),
                error_mode: options.error_mode.unwrap_or_else(|| env.error_mode()),
            },
            limits: LimitTracker::new(
                options
                    .resource_limits
                    .unwrap_or_else(|| env.resource_limits()),
            ),
            registers: options.registers.clone().unwrap_or_default(),
            filters: options.filters.clone(),
            file_system: env.file_system(),
            partial_cache: options.partial_cache.clone().unwrap_or_default(),
        });
        let mut state = State::new(env, self.compiled.name.clone(), root, shared);
        match state.render_body(&self.compiled.body, out) {
            Ok(_) => Ok(state),
            Err(err)
                if state.error_mode() != ErrorMode::Strict
                    && err.kind() != ErrorKind::WriteFailure =>
            {
                debug!(error = %err, "render stopped");
                ok!(write!(out, "{err}").map_err(Error::from));
                state.record_error(err);
                Ok(state)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    use crate::context;

    #[test]
    fn test_render_options() {
        let env = Environment::new();
        let tmpl = env.template_from_str("{{ x | shout }}").unwrap();
        assert_eq!(tmpl.render(context! { x => "a" }).unwrap(), "a");

        let options = RenderOptions::default()
            .with_filter("shout", |value: String| format!("{}!", value.to_uppercase()));
        assert_eq!(
            tmpl.render_with_options(context! { x => "a" }, &options)
                .unwrap(),
            "A!"
        );

        let options = RenderOptions::default()
            .with_strict_filters(true)
            .with_error_mode(ErrorMode::Strict);
        let err = tmpl
            .render_with_options(context! { x => "a" }, &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedFilter);
        assert_eq!(err.to_string(), "Liquid error: undefined filter shout");
    }

    #[test]
    fn test_registers_are_passed_in() {
        let env = Environment::new();
        let registers = Arc::new(Registers::new());
        let options = RenderOptions::default().with_registers(registers.clone());
        let tmpl = env.template_from_str("{% cycle 'a', 'b' %}").unwrap();
        assert_eq!(tmpl.render_with_options((), &options).unwrap(), "a");
        assert_eq!(tmpl.render_with_options((), &options).unwrap(), "b");
        assert_eq!(tmpl.render(()).unwrap(), "a");
    }

    #[test]
    fn test_limits_stop_rendering() {
        let env = Environment::new();
        let tmpl = env
            .template_from_str("{% for i in (1..10) %}{{ i }}{% endfor %}")
            .unwrap();
        let options = RenderOptions::default()
            .with_resource_limits(ResourceLimits::default().with_render_length_limit(5));
        let rv = tmpl.render_with_options((), &options).unwrap();
        assert_eq!(rv, "123456Liquid error: Memory limits exceeded");

        let options = options.with_error_mode(ErrorMode::Strict);
        let err = tmpl.render_with_options((), &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemoryLimit);
    }

    #[test]
    fn test_render_to_write() {
        let env = Environment::new();
        let tmpl = env.template_from_str("{{ a }}-{{ b }}").unwrap();
        let mut buf = Vec::new();
        let state = tmpl
            .render_to_write(context! { a => 1, b => 2 }, &mut buf)
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "1-2");
        assert!(state.errors().is_empty());
    }

    #[test]
    fn test_break_at_top_level() {
        let env = Environment::new();
        assert_eq!(env.render_str("a{% break %}b", ()).unwrap(), "a");
    }
}
