use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use memo_map::MemoMap;
use serde::Serialize;

use crate::defaults;
use crate::error::{Error, ErrorKind};
use crate::filters::{BoxedFilter, Filter};
use crate::loader::{BlankFileSystem, FileSystem};
use crate::tags::Tag;
use crate::template::{CompiledTemplate, Template};
use crate::value::{FunctionArgs, FunctionResult, Value, DENIED_MEMBERS};
use crate::vm::ResourceLimits;

/// Controls how problems in templates are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Parse problems render as error messages in place of the broken
    /// markup.  Render errors render in place of the failing node.
    #[default]
    Lax,
    /// Parse problems are collected on
    /// [`Template::warnings`](crate::Template::warnings) and the broken
    /// markup renders nothing.  Render errors render in place.
    Warn,
    /// The first problem fails parsing or rendering.
    Strict,
}

struct KeysDebug<'a, K: fmt::Debug, V>(&'a BTreeMap<K, V>);

impl<K: fmt::Debug, V> fmt::Debug for KeysDebug<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.keys()).finish()
    }
}

/// An abstraction that holds the engine configuration.
///
/// This object holds the central configuration state for templates.  It is
/// also the container for the templates, filters and tags that are made
/// available to them.
///
/// There are generally two ways to construct an environment:
///
/// * [`Environment::new`] creates an environment preconfigured with the
///   built-in tags and filters.
/// * [`Environment::empty`] creates an environment without any tags or
///   filters.  Only plain text and output blocks work there until tags are
///   added.
///
/// ```
/// # use miniliquid::{Environment, context};
/// let mut env = Environment::new();
/// env.add_template("hello", "Hello {{ name }}!").unwrap();
/// let tmpl = env.get_template("hello").unwrap();
/// assert_eq!(tmpl.render(context!{ name => "World" }).unwrap(), "Hello World!");
/// ```
#[derive(Clone)]
pub struct Environment {
    templates: MemoMap<Arc<str>, Arc<CompiledTemplate>>,
    loaded: MemoMap<Arc<str>, Arc<CompiledTemplate>>,
    filters: BTreeMap<String, BoxedFilter>,
    tags: BTreeMap<String, Arc<dyn Tag>>,
    globals: BTreeMap<String, Value>,
    file_system: Arc<dyn FileSystem>,
    error_mode: ErrorMode,
    line_numbers: bool,
    strict_variables: bool,
    strict_filters: bool,
    resource_limits: ResourceLimits,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::empty()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("globals", &self.globals)
            .field("tags", &KeysDebug(&self.tags))
            .field("filters", &KeysDebug(&self.filters))
            .field("templates", &self.templates.keys().collect::<Vec<_>>())
            .field("error_mode", &self.error_mode)
            .field("line_numbers", &self.line_numbers)
            .finish()
    }
}

impl Environment {
    /// Creates a new environment with sensible defaults.
    ///
    /// This environment does not yet contain any templates but it will have
    /// all the default tags and filters loaded.  Partials cannot be loaded
    /// until a file system is set with
    /// [`set_file_system`](Self::set_file_system).
    pub fn new() -> Environment {
        Environment {
            filters: defaults::get_builtin_filters(),
            tags: defaults::get_builtin_tags(),
            ..Environment::empty()
        }
    }

    /// Creates a completely empty environment.
    ///
    /// This environment has no tags and no filters.
    pub fn empty() -> Environment {
        Environment {
            templates: MemoMap::new(),
            loaded: MemoMap::new(),
            filters: BTreeMap::new(),
            tags: BTreeMap::new(),
            globals: BTreeMap::new(),
            file_system: Arc::new(BlankFileSystem),
            error_mode: ErrorMode::default(),
            line_numbers: false,
            strict_variables: false,
            strict_filters: false,
            resource_limits: ResourceLimits::default(),
        }
    }

    /// Compiles and adds a template under the given name.
    ///
    /// Templates added this way are also found by `include`, `render` and
    /// `embed` before the file system is asked.  The template is compiled
    /// with the current error mode.
    pub fn add_template<N: Into<Arc<str>>>(&mut self, name: N, source: &str) -> Result<(), Error> {
        let name = name.into();
        let compiled = ok!(CompiledTemplate::new(self, Some(name.clone()), source));
        self.templates.replace(name, Arc::new(compiled));
        Ok(())
    }

    /// Removes a template by name.
    pub fn remove_template(&mut self, name: &str) {
        self.templates.remove(name);
        self.loaded.remove(name);
    }

    /// Removes all stored templates.
    ///
    /// This also forgets the templates that were loaded through the file
    /// system by [`get_template`](Self::get_template).
    pub fn clear_templates(&mut self) {
        self.templates.clear();
        self.loaded.clear();
    }

    /// Fetches a template by name.
    ///
    /// Templates added with [`add_template`](Self::add_template) are
    /// returned directly.  Other templates are read through the file system
    /// and kept on the environment.  Partials never reuse these, they are
    /// loaded through the [`PartialCache`](crate::loader::PartialCache) of
    /// the render.
    pub fn get_template(&self, name: &str) -> Result<Template<'_>, Error> {
        if let Some(compiled) = self.templates.get(name) {
            return Ok(Template::new(self, compiled.clone()));
        }
        let key: Arc<str> = name.into();
        let compiled = ok!(self
            .loaded
            .get_or_try_insert(&key, || -> Result<_, Error> {
                let source = ok!(self.file_system.read_template_file(name));
                CompiledTemplate::new(self, Some(key.clone()), &source).map(Arc::new)
            }));
        Ok(Template::new(self, compiled.clone()))
    }

    pub(crate) fn get_compiled(&self, name: &str) -> Option<Arc<CompiledTemplate>> {
        self.templates.get(name).cloned()
    }

    /// Compiles a template from a string without storing it.
    ///
    /// ```
    /// # use miniliquid::{Environment, context};
    /// let env = Environment::new();
    /// let tmpl = env.template_from_str("Hello {{ name }}").unwrap();
    /// let rv = tmpl.render(context! { name => "World" });
    /// println!("{}", rv.unwrap());
    /// ```
    pub fn template_from_str(&self, source: &str) -> Result<Template<'_>, Error> {
        let compiled = ok!(CompiledTemplate::new(self, None, source));
        Ok(Template::new(self, Arc::new(compiled)))
    }

    /// Like [`template_from_str`](Self::template_from_str) but with a name
    /// that shows up in errors.
    pub fn template_from_named_str<N: Into<Arc<str>>>(
        &self,
        name: N,
        source: &str,
    ) -> Result<Template<'_>, Error> {
        let compiled = ok!(CompiledTemplate::new(self, Some(name.into()), source));
        Ok(Template::new(self, Arc::new(compiled)))
    }

    /// Parses and renders a template from a string in one go.
    ///
    /// ```
    /// # use miniliquid::{Environment, context};
    /// let env = Environment::new();
    /// let rv = env.render_str("Hello {{ name }}", context! { name => "World" });
    /// println!("{}", rv.unwrap());
    /// ```
    ///
    /// **Note on values:** The [`Value`] type implements `Serialize` and can be
    /// efficiently passed to render.  It does not undergo actual serialization.
    pub fn render_str<S: Serialize>(&self, source: &str, ctx: S) -> Result<String, Error> {
        ok!(self.template_from_str(source)).render(ctx)
    }

    /// Parses and renders a template from a string with a name.
    pub fn render_named_str<S: Serialize>(
        &self,
        name: &str,
        source: &str,
        ctx: S,
    ) -> Result<String, Error> {
        ok!(self.template_from_named_str(name, source)).render(ctx)
    }

    /// Sets the error mode.
    ///
    /// The mode applies to templates compiled afterwards and to every
    /// render that does not override it.
    pub fn set_error_mode(&mut self, mode: ErrorMode) {
        self.error_mode = mode;
    }

    /// Returns the error mode.
    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }

    /// Enables line numbers in errors.
    ///
    /// With line numbers errors display as `Liquid error (line 3): ...`.
    /// Errors raised inside partials also carry the name of the partial.
    pub fn set_line_numbers(&mut self, yes: bool) {
        self.line_numbers = yes;
    }

    /// Are line numbers enabled?
    pub fn line_numbers(&self) -> bool {
        self.line_numbers
    }

    /// Makes looking up unknown variables an error.
    pub fn set_strict_variables(&mut self, yes: bool) {
        self.strict_variables = yes;
    }

    /// Are unknown variables an error?
    pub fn strict_variables(&self) -> bool {
        self.strict_variables
    }

    /// Makes using unknown filters an error.  Otherwise they pass their
    /// input through unchanged.
    pub fn set_strict_filters(&mut self, yes: bool) {
        self.strict_filters = yes;
    }

    /// Are unknown filters an error?
    pub fn strict_filters(&self) -> bool {
        self.strict_filters
    }

    /// Sets the resource limits of renders.
    ///
    /// ```
    /// # use miniliquid::{Environment, ResourceLimits};
    /// let mut env = Environment::new();
    /// env.set_resource_limits(ResourceLimits::default().with_assign_score_limit(10));
    /// let rv = env.render_str("{% assign x = 'this is too long' %}", ()).unwrap();
    /// assert_eq!(rv, "Liquid error: Memory limits exceeded");
    /// ```
    pub fn set_resource_limits(&mut self, limits: ResourceLimits) {
        self.resource_limits = limits;
    }

    /// Returns the resource limits.
    pub fn resource_limits(&self) -> ResourceLimits {
        self.resource_limits
    }

    /// Sets the file system partials are read from.
    ///
    /// See [`loader`](crate::loader) for the available file systems.
    pub fn set_file_system<F: FileSystem>(&mut self, fs: F) {
        self.file_system = Arc::new(fs);
        self.loaded.clear();
    }

    pub(crate) fn file_system(&self) -> Arc<dyn FileSystem> {
        self.file_system.clone()
    }

    /// Adds a new filter function.
    ///
    /// Filters can be functions of up to five arguments whose first
    /// argument receives the filtered value.  For details about filters
    /// have a look at [`filters`](crate::filters).  Names that are reserved
    /// for drop internals cannot be used.
    pub fn add_filter<N, F, Rv, Args>(&mut self, name: N, f: F) -> Result<(), Error>
    where
        N: Into<String>,
        // the crazy bounds here exist to enable borrowing in closures
        F: Filter<Rv, Args> + for<'a> Filter<Rv, <Args as FunctionArgs<'a>>::Output>,
        Rv: FunctionResult,
        Args: for<'a> FunctionArgs<'a>,
    {
        let name = name.into();
        if DENIED_MEMBERS.contains(&name.as_str()) {
            return Err(Error::new(
                ErrorKind::MethodOverride,
                format!("Filter overrides registered public methods as non public: {name}"),
            ));
        }
        self.filters.insert(name, BoxedFilter::new(f));
        Ok(())
    }

    /// Removes a filter by name.
    pub fn remove_filter(&mut self, name: &str) {
        self.filters.remove(name);
    }

    pub(crate) fn get_filter(&self, name: &str) -> Option<&BoxedFilter> {
        self.filters.get(name)
    }

    /// Adds a tag.
    ///
    /// A tag of the same name is replaced.  See [`tags`](crate::tags) for
    /// how to write tags.
    pub fn add_tag<N: Into<String>, T: Tag>(&mut self, name: N, tag: T) {
        self.tags.insert(name.into(), Arc::new(tag));
    }

    /// Removes a tag by name.
    pub fn remove_tag(&mut self, name: &str) {
        self.tags.remove(name);
    }

    pub(crate) fn get_tag(&self, name: &str) -> Option<&dyn Tag> {
        self.tags.get(name).map(|tag| &**tag)
    }

    /// Adds a global variable.
    ///
    /// Globals are the static environment of every render.  They are looked
    /// up after the assigns of the render.
    pub fn add_global<N: Into<String>, V: Into<Value>>(&mut self, name: N, value: V) {
        self.globals.insert(name.into(), value.into());
    }

    /// Removes a global variable by name.
    pub fn remove_global(&mut self, name: &str) {
        self.globals.remove(name);
    }

    pub(crate) fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    use crate::context;

    #[test]
    fn test_empty_environment() {
        let env = Environment::empty();
        assert_eq!(
            env.render_str("{{ x | upcase }}", context! { x => "a" }).unwrap(),
            "a"
        );
        assert_eq!(
            env.render_str("{% if x %}", ()).unwrap(),
            "Liquid syntax error: Unknown tag 'if'"
        );
    }

    #[test]
    fn test_globals_have_lowest_priority() {
        let mut env = Environment::new();
        env.add_global("shop", "global");
        env.add_global("currency", "EUR");
        let rv = env
            .render_str("{{ shop }} {{ currency }}", context! { shop => "local" })
            .unwrap();
        assert_eq!(rv, "local EUR");
    }

    #[test]
    fn test_denied_filter_names() {
        let mut env = Environment::new();
        let err = env.add_filter("instance_eval", |v: Value| v).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MethodOverride);
        env.add_filter("shout", |v: String| v.to_uppercase()).unwrap();
        assert_eq!(env.render_str("{{ 'a' | shout }}", ()).unwrap(), "A");
    }

    #[test]
    fn test_get_template_from_file_system() {
        let mut env = Environment::new();
        let mut fs = crate::loader::MemoryFileSystem::new();
        fs.insert("page", "{{ 'x' }}");
        env.set_file_system(fs);
        let tmpl = env.get_template("page").unwrap();
        assert_eq!(tmpl.name(), Some("page"));
        assert_eq!(tmpl.render(()).unwrap(), "x");
        assert_eq!(
            env.get_template("missing").unwrap_err().kind(),
            ErrorKind::TemplateNotFound
        );
    }

    #[test]
    fn test_line_numbers_in_errors() {
        let mut env = Environment::new();
        env.set_line_numbers(true);
        let rv = env
            .render_str("a\n{{ 1 | divided_by: 0 }}\n{% foo %}", ())
            .unwrap();
        assert_eq!(
            rv,
            "a\nLiquid error (line 2): divided by 0\nLiquid syntax error (line 3): Unknown tag 'foo'"
        );
    }
}
