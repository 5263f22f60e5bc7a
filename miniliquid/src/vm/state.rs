use std::collections::BTreeMap;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::compiler::ast::{
    Body, CompareOp, Condition, Expr, FilterCall, Filtered, Lookup, VarLookup, VarRoot,
};
use crate::environment::{Environment, ErrorMode};
use crate::error::{Error, ErrorKind};
use crate::filters::BoxedFilter;
use crate::loader::{FileSystem, PartialCache};
use crate::output::Output;
use crate::tags::Interrupt;
use crate::value::{invoke_member, ops, value_map_with_capacity, Value, ValueRepr};
use crate::vm::context::{Context, Registers};
use crate::vm::limits::LimitTracker;

/// Settings of a render that can be overridden per call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RenderSettings {
    pub strict_variables: bool,
    pub strict_filters: bool,
    pub error_mode: ErrorMode,
}

/// Everything a render shares with its isolated partials.
pub(crate) struct Shared {
    pub settings: RenderSettings,
    pub limits: Arc<LimitTracker>,
    pub registers: Arc<Registers>,
    pub filters: BTreeMap<String, BoxedFilter>,
    pub file_system: Arc<dyn FileSystem>,
    pub partial_cache: Arc<PartialCache>,
}

/// Provides access to the current execution state of the engine.
///
/// A read only reference is passed to filter functions and drops to allow
/// limited interfacing with the engine.  Tags get a mutable reference and
/// use it to evaluate expressions, manage scopes and render bodies.
///
/// **Notes on lifetimes:** the state object exposes some of the internal
/// lifetimes through the type.  You should always elide these lifetimes
/// as there might be lifetimes added or removed between releases.
pub struct State<'env> {
    pub(crate) env: &'env Environment,
    pub(crate) name: Option<Arc<str>>,
    pub(crate) ctx: Context,
    pub(crate) shared: Arc<Shared>,
    pub(crate) errors: Vec<Error>,
    pub(crate) block_overrides: Vec<Arc<BTreeMap<String, Arc<Body>>>>,
}

impl fmt::Debug for State<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("ctx", &self.ctx)
            .field("errors", &self.errors)
            .finish()
    }
}

fn undefined_variable(name: &str) -> Error {
    Error::new(
        ErrorKind::UndefinedVariable,
        format!("Unknown variable '{name}'"),
    )
}

fn range_bound(value: &Value) -> Result<i64, Error> {
    match ops::to_number(value).0 {
        ValueRepr::I64(v) => Ok(v),
        ValueRepr::F64(v) => Ok(v as i64),
        _ => Err(Error::new(ErrorKind::ArgumentError, "invalid integer")),
    }
}

impl<'env> State<'env> {
    pub(crate) fn new(
        env: &'env Environment,
        name: Option<Arc<str>>,
        assigns: Value,
        shared: Arc<Shared>,
    ) -> State<'env> {
        State {
            env,
            name,
            ctx: Context::new(assigns, 0),
            shared,
            errors: Vec::new(),
            block_overrides: Vec::new(),
        }
    }

    /// Creates an isolated context for a partial.
    ///
    /// The new state sees none of the variables of this one but shares the
    /// environment, the limits, the registers and the filters.
    pub(crate) fn isolated(&self, name: Option<Arc<str>>) -> State<'env> {
        State {
            env: self.env,
            name,
            ctx: Context::new(Value::UNDEFINED, self.ctx.depth()),
            shared: self.shared.clone(),
            errors: Vec::new(),
            block_overrides: Vec::new(),
        }
    }

    /// Returns a reference to the current environment.
    #[inline(always)]
    pub fn env(&self) -> &'env Environment {
        self.env
    }

    /// Returns the name of the template or partial being rendered.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Are unknown variables an error?
    pub fn strict_variables(&self) -> bool {
        self.shared.settings.strict_variables
    }

    /// Are unknown filters an error?
    pub fn strict_filters(&self) -> bool {
        self.shared.settings.strict_filters
    }

    /// Returns the error mode of the render.
    pub fn error_mode(&self) -> ErrorMode {
        self.shared.settings.error_mode
    }

    /// Returns the registers shared by all contexts of the render.
    pub fn registers(&self) -> &Registers {
        &self.shared.registers
    }

    /// Returns the resource usage of the render.
    pub fn limits(&self) -> &LimitTracker {
        &self.shared.limits
    }

    /// Returns the errors that were rendered in place of failing nodes.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Returns the depth of scopes, includes and partials.
    pub fn scope_depth(&self) -> usize {
        self.ctx.depth()
    }

    /// Returns the innermost `forloop` drop.
    pub fn current_loop(&self) -> Option<Value> {
        self.ctx.current_loop().cloned()
    }

    /// Pushes a new scope.
    pub fn push_scope(&mut self) -> Result<(), Error> {
        self.ctx.push_frame()
    }

    /// Pops the innermost scope.
    pub fn pop_scope(&mut self) -> Result<(), Error> {
        self.ctx.pop_frame()
    }

    /// Sets a variable in the innermost scope.
    pub fn set(&mut self, name: &str, value: Value) {
        self.ctx.set_local(name, value);
    }

    /// Sets a variable in the root scope like `assign` does.
    pub fn assign(&mut self, name: &str, value: Value) {
        self.ctx.set_root(name, value);
    }

    /// Records an error that was rendered in place of a node.
    pub fn record_error(&mut self, err: Error) {
        self.errors.push(err);
    }

    pub(crate) fn file_system(&self) -> &dyn FileSystem {
        &*self.shared.file_system
    }

    pub(crate) fn partial_cache(&self) -> &PartialCache {
        &self.shared.partial_cache
    }

    /// Looks up a variable by name.
    ///
    /// This looks through the scopes, the counters, the render assigns and
    /// the globals of the environment.  Strict variables do not apply.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        match self.find_variable(name) {
            Ok((_, value)) if !value.is_undefined() => Some(value.resolved()),
            _ => None,
        }
    }

    fn find_variable(&self, name: &str) -> Result<(usize, Value), Error> {
        if let Some((frame_id, value)) = self.ctx.find(name) {
            return Ok((frame_id, value.clone()));
        }
        let assigns = self.ctx.assigns();
        let value = match assigns.0 {
            ValueRepr::Map(..) => assigns.get_attr(name),
            ValueRepr::Object(ref obj) => ok!(invoke_member(&**obj, self, name)),
            _ => Value::UNDEFINED,
        };
        if !value.is_undefined() {
            return Ok((0, value));
        }
        if let Some(value) = self.env.get_global(name) {
            return Ok((0, value));
        }
        Ok((0, Value::UNDEFINED))
    }

    fn memoized(&self, frame_id: usize, path: &str, value: Value) -> Value {
        if !value.is_lazy() && !value.is_container() {
            return value;
        }
        if let Some(rv) = self.ctx.memo_get(frame_id, path) {
            return rv;
        }
        trace!(path, "resolving deferred value");
        let rv = value.resolved_deep();
        self.ctx.memo_insert(frame_id, path.to_string(), rv.clone());
        rv
    }

    /// Looks up a member of a value like `value.key` does in a template.
    ///
    /// Drops are asked through their member whitelist, hashes by key and
    /// arrays by index.  `size`, `first` and `last` work on arrays, hashes
    /// and strings, `length` is an alias of `size`.
    pub fn lookup_member(&self, value: &Value, key: &Value) -> Result<Value, Error> {
        self.lookup_step(value, key, true)
    }

    fn lookup_step(&self, value: &Value, key: &Value, dotted: bool) -> Result<Value, Error> {
        let command = if dotted { key.as_str() } else { None };
        let rv = match value.0 {
            ValueRepr::Map(ref map, _) => {
                let rv = match key.as_str() {
                    Some(key) => map.get(key).cloned(),
                    None => map.get(&*key.to_string()).cloned(),
                };
                match (rv, command) {
                    (Some(rv), _) => rv,
                    (None, Some("size" | "length")) => Value::from(map.len()),
                    (None, Some("first")) => value.first(),
                    (None, Some("last")) => value.last(),
                    (None, _) => {
                        if self.strict_variables() {
                            return Err(undefined_variable(&key.to_string()));
                        }
                        Value::UNDEFINED
                    }
                }
            }
            ValueRepr::Seq(_) | ValueRepr::Range(..) => match (key.as_i64(), command) {
                (Some(idx), _) => value.get_item_by_index(idx),
                (None, Some("size" | "length")) => Value::from(value.len().unwrap_or(0)),
                (None, Some("first")) => value.first(),
                (None, Some("last")) => value.last(),
                _ => Value::UNDEFINED,
            },
            ValueRepr::String(ref s) => match command {
                Some("size" | "length") => Value::from(s.chars().count()),
                Some("first") => s.chars().next().map_or(Value::NIL, |c| Value::from(c.to_string())),
                Some("last") => s.chars().next_back().map_or(Value::NIL, |c| Value::from(c.to_string())),
                _ => Value::UNDEFINED,
            },
            ValueRepr::Object(ref obj) => match key.as_str() {
                Some(name) => ok!(invoke_member(&**obj, self, name)),
                None => ok!(obj.get_item(self, key)),
            },
            ValueRepr::Lazy(_) => {
                let resolved = value.clone().resolved();
                return self.lookup_step(&resolved, key, dotted);
            }
            _ => Value::UNDEFINED,
        };
        Ok(rv)
    }

    fn resolve_var(&self, var: &VarLookup) -> Result<Value, Error> {
        let name = match var.root {
            VarRoot::Name(ref name) => name.clone(),
            VarRoot::Dynamic(ref expr) => ok!(self.eval(expr)).to_string(),
        };
        let (frame_id, value) = ok!(self.find_variable(&name));
        if value.is_undefined() && self.strict_variables() {
            return Err(undefined_variable(&name));
        }
        let mut path = name;
        let mut value = self.memoized(frame_id, &path, value);
        for lookup in &var.lookups {
            let (key, dotted) = match lookup {
                Lookup::Attr(attr) => (Value::from(attr.as_str()), true),
                Lookup::Item(expr) => (ok!(self.eval(expr)), false),
            };
            path.push('.');
            path.push_str(&key.to_string());
            let member = ok!(self.lookup_step(&value, &key, dotted));
            value = self.memoized(frame_id, &path, member);
        }
        Ok(value)
    }

    /// Evaluates an expression.
    pub fn eval(&self, expr: &Expr) -> Result<Value, Error> {
        match expr {
            Expr::Const(value) => Ok(value.clone()),
            Expr::Var(var) => self.resolve_var(var),
            Expr::Range(start, end) => {
                let start = ok!(range_bound(&ok!(self.eval(start))));
                let end = ok!(range_bound(&ok!(self.eval(end))));
                Ok(Value::from_range(start, end))
            }
            Expr::Empty | Expr::Blank => Ok(Value::from("")),
        }
    }

    /// Evaluates an expression and applies its filters.
    pub fn eval_filtered(&self, filtered: &Filtered) -> Result<Value, Error> {
        let mut value = ok!(self.eval(&filtered.expr));
        for call in &filtered.filters {
            value = ok!(self.apply_filter(call, value));
        }
        Ok(value)
    }

    fn apply_filter(&self, call: &FilterCall, input: Value) -> Result<Value, Error> {
        let filter = match self
            .shared
            .filters
            .get(&call.name)
            .or_else(|| self.env.get_filter(&call.name))
        {
            Some(filter) => filter,
            None if self.strict_filters() => {
                return Err(Error::new(
                    ErrorKind::UndefinedFilter,
                    format!("undefined filter {}", call.name),
                ))
            }
            None => return Ok(input),
        };
        let mut args = Vec::with_capacity(call.args.len() + 2);
        args.push(input);
        for arg in &call.args {
            args.push(ok!(self.eval(arg)));
        }
        if !call.kwargs.is_empty() {
            let mut kwargs = value_map_with_capacity(call.kwargs.len());
            for (key, expr) in &call.kwargs {
                kwargs.insert(key.as_str().into(), ok!(self.eval(expr)));
            }
            args.push(Value::from_kwargs(kwargs));
        }
        filter.apply_to(self, &args)
    }

    /// Evaluates a condition.
    pub fn eval_condition(&self, condition: &Condition) -> Result<bool, Error> {
        match condition {
            Condition::And(left, right) => {
                Ok(ok!(self.eval_condition(left)) && ok!(self.eval_condition(right)))
            }
            Condition::Or(left, right) => {
                Ok(ok!(self.eval_condition(left)) || ok!(self.eval_condition(right)))
            }
            Condition::Compare { left, op: None } => Ok(ok!(self.eval(left)).is_true()),
            Condition::Compare {
                left,
                op: Some((op, right)),
            } => self.compare(left, *op, right),
        }
    }

    fn compare(&self, left: &Expr, op: CompareOp, right: &Expr) -> Result<bool, Error> {
        if matches!(op, CompareOp::Eq | CompareOp::Ne) {
            let literal = match (left, right) {
                (other, Expr::Empty) | (Expr::Empty, other) => {
                    Some(ok!(self.eval(other)).is_empty())
                }
                (other, Expr::Blank) | (Expr::Blank, other) => {
                    Some(ok!(self.eval(other)).is_blank())
                }
                _ => None,
            };
            if let Some(rv) = literal {
                return Ok(if op == CompareOp::Eq { rv } else { !rv });
            }
        }

        let left = ok!(self.eval(left));
        let right = ok!(self.eval(right));
        Ok(match op {
            CompareOp::Eq => ops::equals(&left, &right),
            CompareOp::Ne => !ops::equals(&left, &right),
            CompareOp::Contains => ops::contains(&left, &right),
            CompareOp::Lt => ok!(ops::compare(&left, &right)).map_or(false, |x| x.is_lt()),
            CompareOp::Lte => ok!(ops::compare(&left, &right)).map_or(false, |x| x.is_le()),
            CompareOp::Gt => ok!(ops::compare(&left, &right)).map_or(false, |x| x.is_gt()),
            CompareOp::Gte => ok!(ops::compare(&left, &right)).map_or(false, |x| x.is_ge()),
        })
    }

    /// Renders a body into the output.
    ///
    /// Errors of individual nodes are rendered in place unless the error mode
    /// is strict.  A `break` or `continue` stops the body and is handed to
    /// the caller.
    pub fn render_body(
        &mut self,
        body: &Body,
        out: &mut Output<'_>,
    ) -> Result<ControlFlow<Interrupt>, Error> {
        crate::vm::render_body(self, body, out)
    }

    /// Deals with an error of a node according to the error mode.
    pub(crate) fn handle_error(&mut self, err: Error, out: &mut Output<'_>) -> Result<(), Error> {
        if self.error_mode() == ErrorMode::Strict
            || matches!(err.kind(), ErrorKind::MemoryLimit | ErrorKind::WriteFailure)
        {
            return Err(err);
        }
        debug!(error = %err, "rendering error in place");
        ok!(write!(out, "{}", err).map_err(Error::from));
        self.errors.push(err.detached());
        Ok(())
    }
}
