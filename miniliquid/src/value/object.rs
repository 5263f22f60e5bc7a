use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::value::Value;
use crate::vm::State;

/// Member names that are never reachable from a template.
///
/// A lookup of any of these names on a drop yields undefined, even if the
/// drop lists the name in [`Object::invokable_members`].
pub const DENIED_MEMBERS: &[&str] = &[
    "__proto__",
    "__send__",
    "class",
    "clone",
    "constructor",
    "define_method",
    "display",
    "dup",
    "eval",
    "extend",
    "freeze",
    "instance_eval",
    "instance_exec",
    "instance_variable_get",
    "instance_variable_set",
    "instance_variables",
    "method",
    "methods",
    "object_id",
    "prototype",
    "public_send",
    "send",
    "singleton_class",
    "tap",
];

/// A drop: a host object that exposes a whitelisted set of members.
///
/// The engine uses the [`Value`] type to represent values that the engine
/// knows about.  Most of these values are primitives such as integers,
/// strings or maps which are created through serde.  A drop is a custom type
/// that is handed to the engine directly with
/// [`Value::from_object`](crate::value::Value::from_object).  The ownership
/// of the object moves into the value.
///
/// Templates can only reach the members named by
/// [`invokable_members`](Self::invokable_members).  For these the engine calls
/// [`invoke`](Self::invoke).  Every other name goes to
/// [`liquid_method_missing`](Self::liquid_method_missing) which by default
/// yields undefined (or an error with strict variables).  Names in
/// [`DENIED_MEMBERS`] are rejected before either method is consulted.
///
/// Drop members are invoked on every access and the results are not cached,
/// so a drop can hand out a fresh value each time:
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use miniliquid::value::{Object, Value};
/// use miniliquid::{context, Environment, Error, State};
///
/// #[derive(Debug, Default)]
/// struct Counter(AtomicUsize);
///
/// impl Object for Counter {
///     fn invokable_members(&self) -> &[&str] {
///         &["count"]
///     }
///
///     fn invoke(&self, _state: &State, name: &str) -> Result<Value, Error> {
///         match name {
///             "count" => Ok(Value::from(self.0.fetch_add(1, Ordering::Relaxed) + 1)),
///             _ => Ok(Value::UNDEFINED),
///         }
///     }
/// }
///
/// let env = Environment::new();
/// let ctx = context! { counter => Value::from_object(Counter::default()) };
/// let rv = env.render_str("{{ counter.count }}{{ counter.count }}", ctx).unwrap();
/// assert_eq!(rv, "12");
/// ```
///
/// The engine uses reference counted objects so all trait methods take
/// `&self` and types like [`Mutex`](std::sync::Mutex) or atomics need to be
/// used for mutability.  The [`State`] handed to the methods gives access to
/// the render it is invoked from, for instance to the current loop or the
/// scope depth.  It is only borrowed for the call.
pub trait Object: fmt::Debug + Any + Sync + Send {
    /// The names of the members a template may access.
    fn invokable_members(&self) -> &[&str] {
        &[]
    }

    /// Called for a member listed in [`invokable_members`](Self::invokable_members).
    fn invoke(&self, state: &State, name: &str) -> Result<Value, Error> {
        let _state = state;
        let _name = name;
        Ok(Value::UNDEFINED)
    }

    /// Called for a member that is not on the whitelist.
    ///
    /// The default implementation returns undefined, unless strict variables
    /// are enabled in which case it fails.
    fn liquid_method_missing(&self, state: &State, name: &str) -> Result<Value, Error> {
        if state.strict_variables() {
            Err(Error::new(
                ErrorKind::UndefinedVariable,
                format!("undefined method {name}"),
            ))
        } else {
            Ok(Value::UNDEFINED)
        }
    }

    /// Called for bracket lookups like `drop[1]`.
    ///
    /// String keys are routed through the member lookup before this is
    /// consulted.  The default implementation yields undefined.
    fn get_item(&self, state: &State, key: &Value) -> Result<Value, Error> {
        let _state = state;
        let _key = key;
        Ok(Value::UNDEFINED)
    }

    /// Returns the items if the drop can be iterated by `for` and filters.
    fn iterate(&self) -> Option<Vec<Value>> {
        None
    }

    /// Is the drop truthy?  Defaults to `true`.
    fn is_true(&self) -> bool {
        true
    }

    /// Renders the drop into the output.
    ///
    /// Defaults to the name of the type.
    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = std::any::type_name::<Self>();
        f.write_str(name.rsplit("::").next().unwrap_or(name))
    }
}

impl dyn Object {
    /// Returns some reference to the boxed object if it is of type `T`, or None if it isn’t.
    ///
    /// This is basically the "reverse" of [`from_object`](Value::from_object).
    ///
    /// # Example
    ///
    /// ```rust
    /// # use miniliquid::value::{Value, Object};
    /// #[derive(Debug)]
    /// struct Thing {
    ///     id: usize,
    /// }
    ///
    /// impl Object for Thing {}
    ///
    /// let x_value = Value::from_object(Thing { id: 42 });
    /// let value_as_obj = x_value.as_object().unwrap();
    /// let thing = value_as_obj.downcast_ref::<Thing>().unwrap();
    /// assert_eq!(thing.id, 42);
    /// ```
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        if (*self).type_id() == TypeId::of::<T>() {
            // SAFETY: type type id check ensures this type cast is correct
            Some(unsafe { &*(self as *const dyn Object as *const T) })
        } else {
            None
        }
    }

    /// Checks if the object is of a specific type.
    pub fn is<T: 'static>(&self) -> bool {
        (*self).type_id() == TypeId::of::<T>()
    }

    /// Checks if a member is reachable from templates.
    pub fn is_invokable(&self, name: &str) -> bool {
        !DENIED_MEMBERS.contains(&name) && self.invokable_members().contains(&name)
    }
}

impl<T: Object> Object for Arc<T> {
    #[inline]
    fn invokable_members(&self) -> &[&str] {
        T::invokable_members(self)
    }

    #[inline]
    fn invoke(&self, state: &State, name: &str) -> Result<Value, Error> {
        T::invoke(self, state, name)
    }

    #[inline]
    fn liquid_method_missing(&self, state: &State, name: &str) -> Result<Value, Error> {
        T::liquid_method_missing(self, state, name)
    }

    #[inline]
    fn get_item(&self, state: &State, key: &Value) -> Result<Value, Error> {
        T::get_item(self, state, key)
    }

    #[inline]
    fn iterate(&self) -> Option<Vec<Value>> {
        T::iterate(self)
    }

    #[inline]
    fn is_true(&self) -> bool {
        T::is_true(self)
    }

    #[inline]
    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        T::render(self, f)
    }
}

/// Resolves a member on a drop, honoring the whitelist and the denylist.
pub(crate) fn invoke_member(obj: &dyn Object, state: &State, name: &str) -> Result<Value, Error> {
    if DENIED_MEMBERS.contains(&name) {
        trace!(member = name, "rejected denied drop member");
        Ok(Value::UNDEFINED)
    } else if obj.invokable_members().contains(&name) {
        obj.invoke(state, name)
    } else {
        obj.liquid_method_missing(state, name)
    }
}
