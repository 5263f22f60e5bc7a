//! Provides a dynamic value type abstraction.
//!
//! This module gives access to a dynamically typed value which is used by
//! the template engine during execution.
//!
//! For the most part the existence of the value type can be ignored as
//! the engine converts every [`Serialize`](serde::Serialize) value into a
//! [`Value`] automatically.  However there are situations where one wants
//! to construct values directly:
//!
//! * drops: objects that expose a whitelisted set of members to templates
//!   (see [`Object`])
//! * deferred values: values that are computed on first use during a render
//!   (see [`Value::from_lazy`])
//!
//! # Truthiness
//!
//! Only `nil` (and undefined values) as well as `false` are falsy.  Empty
//! strings, `0` and empty arrays are all truthy.  Use the `empty` and `blank`
//! literals in conditions to test for emptiness.
//!
//! # Equality
//!
//! Values compare without type coercion: `1 == "1"` is false.  Integers and
//! floats compare numerically so `1 == 1.0` is true.
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, Serializer};

use crate::utils::OnDrop;
use crate::value::serialize::transform;

pub use crate::value::argtypes::{from_args, ArgType, FunctionArgs, FunctionResult, Kwargs, Rest};
pub use crate::value::object::{Object, DENIED_MEMBERS};

pub(crate) use crate::value::object::invoke_member;

mod argtypes;
mod object;
pub(crate) mod ops;
mod serialize;

// We use in-band signalling to roundtrip some internal values.  This is
// not ideal but unfortunately there is no better system in serde today.
const VALUE_HANDLE_MARKER: &str = "\x01__miniliquid_ValueHandle";

/// The map type used by values.
///
/// With the `preserve_order` feature this is an [`IndexMap`](indexmap::IndexMap)
/// which keeps insertion order, otherwise a [`BTreeMap`].
#[cfg(feature = "preserve_order")]
pub type ValueMap = indexmap::IndexMap<Arc<str>, Value>;

/// The map type used by values.
#[cfg(not(feature = "preserve_order"))]
pub type ValueMap = BTreeMap<Arc<str>, Value>;

#[inline(always)]
pub(crate) fn value_map_with_capacity(capacity: usize) -> ValueMap {
    #[cfg(not(feature = "preserve_order"))]
    {
        let _ = capacity;
        ValueMap::new()
    }
    #[cfg(feature = "preserve_order")]
    {
        ValueMap::with_capacity(crate::utils::untrusted_size_hint(capacity))
    }
}

thread_local! {
    static INTERNAL_SERIALIZATION: Cell<bool> = const { Cell::new(false) };

    // This should be an AtomicU64 but sadly 32bit targets do not necessarily have
    // AtomicU64 available.
    static LAST_VALUE_HANDLE: Cell<u32> = const { Cell::new(0) };
    static VALUE_HANDLES: RefCell<BTreeMap<u32, Value>> = RefCell::new(BTreeMap::new());
}

/// Function that returns true when serialization for [`Value`] is taking place.
///
/// The engine creates [`Value`] objects from all values passed to it by going
/// through the regular serde serialization trait.  This function returns `true`
/// while that happens which lets a [`Serialize`] implementation tune its output
/// for templates.
pub fn serializing_for_value() -> bool {
    INTERNAL_SERIALIZATION.with(|flag| flag.get())
}

fn mark_internal_serialization() -> impl Drop {
    let old = INTERNAL_SERIALIZATION.with(|flag| {
        let old = flag.get();
        flag.set(true);
        old
    });
    OnDrop::new(move || {
        if !old {
            INTERNAL_SERIALIZATION.with(|flag| flag.set(false));
        }
    })
}

/// Describes the kind of value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[non_exhaustive]
pub enum ValueKind {
    /// The value is undefined
    Undefined,
    /// The value is `nil`
    None,
    /// The value is a [`bool`]
    Bool,
    /// The value is an integer or a float.
    Number,
    /// The value is a string.
    String,
    /// The value is an array of other values.
    Seq,
    /// The value is a key/value mapping.
    Map,
    /// The value is an inclusive integer range.
    Range,
    /// The value is a drop.
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            ValueKind::Undefined => "undefined",
            ValueKind::None => "nil",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Seq => "array",
            ValueKind::Map => "hash",
            ValueKind::Range => "range",
            ValueKind::Object => "drop",
        })
    }
}

/// Marks maps that carry keyword arguments.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum MapType {
    Normal,
    Kwargs,
}

/// A deferred value.  The callback is invoked on first use.
pub(crate) struct Lazy(Box<dyn Fn() -> Value + Send + Sync>);

impl Lazy {
    pub(crate) fn resolve(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for Lazy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<lazy>")
    }
}

#[derive(Clone)]
pub(crate) enum ValueRepr {
    Undefined,
    None,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(Arc<str>),
    Seq(Arc<Vec<Value>>),
    Map(Arc<ValueMap>, MapType),
    Range(i64, i64),
    Object(Arc<dyn Object>),
    Lazy(Arc<Lazy>),
}

impl fmt::Debug for ValueRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRepr::Undefined => f.write_str("undefined"),
            ValueRepr::None => f.write_str("nil"),
            ValueRepr::Bool(val) => fmt::Debug::fmt(val, f),
            ValueRepr::I64(val) => fmt::Debug::fmt(val, f),
            ValueRepr::F64(val) => fmt::Debug::fmt(val, f),
            ValueRepr::String(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Seq(val) => f.debug_list().entries(val.iter()).finish(),
            ValueRepr::Map(val, _) => f.debug_map().entries(val.iter()).finish(),
            ValueRepr::Range(start, end) => write!(f, "{start}..{end}"),
            ValueRepr::Object(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Lazy(val) => fmt::Debug::fmt(val, f),
        }
    }
}

/// Represents a dynamically typed value in the template engine.
#[derive(Clone)]
pub struct Value(pub(crate) ValueRepr);

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        ops::equals(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

fn fmt_float(val: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if val.is_nan() {
        f.write_str("NaN")
    } else if val.is_infinite() {
        write!(f, "{}Infinity", if val.is_sign_negative() { "-" } else { "" })
    } else {
        let mut num = val.to_string();
        if !num.contains('.') {
            num.push_str(".0");
        }
        f.write_str(&num)
    }
}

/// Writes the inspect form used for values nested in hashes.
fn fmt_inspect(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value.0 {
        ValueRepr::Undefined | ValueRepr::None => f.write_str("nil"),
        ValueRepr::String(ref s) => write!(f, "{s:?}"),
        ValueRepr::Seq(ref items) => {
            ok!(f.write_str("["));
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    ok!(f.write_str(", "));
                }
                ok!(fmt_inspect(item, f));
            }
            f.write_str("]")
        }
        ValueRepr::Map(ref map, _) => fmt_map(map, f),
        _ => fmt::Display::fmt(value, f),
    }
}

fn fmt_map(map: &ValueMap, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    ok!(f.write_str("{"));
    for (idx, (key, value)) in map.iter().enumerate() {
        if idx > 0 {
            ok!(f.write_str(", "));
        }
        ok!(write!(f, "{:?}=>", key as &str));
        ok!(fmt_inspect(value, f));
    }
    f.write_str("}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::None => Ok(()),
            ValueRepr::Bool(val) => val.fmt(f),
            ValueRepr::I64(val) => val.fmt(f),
            ValueRepr::F64(val) => fmt_float(val, f),
            ValueRepr::String(ref val) => f.write_str(val),
            ValueRepr::Seq(ref items) => {
                for item in items.iter() {
                    ok!(fmt::Display::fmt(item, f));
                }
                Ok(())
            }
            ValueRepr::Map(ref map, _) => fmt_map(map, f),
            ValueRepr::Range(start, end) => write!(f, "{start}..{end}"),
            ValueRepr::Object(ref obj) => obj.render(f),
            ValueRepr::Lazy(ref lazy) => fmt::Display::fmt(&lazy.resolve(), f),
        }
    }
}

impl Default for Value {
    fn default() -> Value {
        ValueRepr::Undefined.into()
    }
}

impl From<ValueRepr> for Value {
    #[inline(always)]
    fn from(val: ValueRepr) -> Value {
        Value(val)
    }
}

#[allow(clippy::len_without_is_empty)]
impl Value {
    /// The undefined value.
    ///
    /// Looking up a variable or member that does not exist produces this
    /// value.  It renders as the empty string and is falsy.
    pub const UNDEFINED: Value = Value(ValueRepr::Undefined);

    /// The `nil` value.
    pub const NIL: Value = Value(ValueRepr::None);

    /// Creates a value from something that can be serialized.
    ///
    /// This is the method the engine uses whenever a serializable object is
    /// passed to one of the APIs that internally want to create a value.  For
    /// instance this is what [`context!`](crate::context) and
    /// [`render`](crate::Template::render) use.
    ///
    /// ```
    /// # use miniliquid::value::Value;
    /// let val = Value::from_serialize(&vec![1, 2, 3]);
    /// ```
    ///
    /// Map keys are converted to strings.  Values that cannot be represented
    /// become `nil`.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Value {
        let _serialization_guard = mark_internal_serialization();
        transform(value)
    }

    /// Creates a value from a drop.
    ///
    /// ```
    /// # use miniliquid::value::{Object, Value};
    /// #[derive(Debug)]
    /// struct Product;
    ///
    /// impl Object for Product {}
    ///
    /// let value = Value::from_object(Product);
    /// ```
    pub fn from_object<T: Object>(value: T) -> Value {
        Value::from(Arc::new(value) as Arc<dyn Object>)
    }

    /// Creates a deferred value.
    ///
    /// The callback is invoked the first time the value is resolved through a
    /// variable path during a render.  The result is memoized for the rest of
    /// that render pass, so `{{ x }}{{ x }}` invokes the callback once.
    ///
    /// ```
    /// # use miniliquid::value::Value;
    /// let value = Value::from_lazy(|| "expensive");
    /// ```
    pub fn from_lazy<F, V>(f: F) -> Value
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        ValueRepr::Lazy(Arc::new(Lazy(Box::new(move || f().into())))).into()
    }

    /// Creates a value from a map.
    pub fn from_map(map: ValueMap) -> Value {
        ValueRepr::Map(Arc::new(map), MapType::Normal).into()
    }

    /// Creates an inclusive integer range.
    pub fn from_range(start: i64, end: i64) -> Value {
        ValueRepr::Range(start, end).into()
    }

    pub(crate) fn from_kwargs(map: ValueMap) -> Value {
        ValueRepr::Map(Arc::new(map), MapType::Kwargs).into()
    }

    /// Returns the kind of the value.
    pub fn kind(&self) -> ValueKind {
        match self.0 {
            ValueRepr::Undefined => ValueKind::Undefined,
            ValueRepr::None => ValueKind::None,
            ValueRepr::Bool(_) => ValueKind::Bool,
            ValueRepr::I64(_) | ValueRepr::F64(_) => ValueKind::Number,
            ValueRepr::String(_) => ValueKind::String,
            ValueRepr::Seq(_) => ValueKind::Seq,
            ValueRepr::Map(..) => ValueKind::Map,
            ValueRepr::Range(..) => ValueKind::Range,
            ValueRepr::Object(_) => ValueKind::Object,
            ValueRepr::Lazy(ref lazy) => lazy.resolve().kind(),
        }
    }

    /// Is this value considered true?
    ///
    /// Only `nil`, undefined and `false` are falsy.
    pub fn is_true(&self) -> bool {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::None => false,
            ValueRepr::Bool(val) => val,
            ValueRepr::Object(ref obj) => obj.is_true(),
            ValueRepr::Lazy(ref lazy) => lazy.resolve().is_true(),
            _ => true,
        }
    }

    /// Returns `true` if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self.0, ValueRepr::Undefined)
    }

    /// Returns `true` if this value is `nil` or undefined.
    pub fn is_nil(&self) -> bool {
        matches!(self.0, ValueRepr::None | ValueRepr::Undefined)
    }

    /// Returns `true` if this value is a number.
    pub fn is_number(&self) -> bool {
        matches!(self.0, ValueRepr::I64(_) | ValueRepr::F64(_))
    }

    /// Returns `true` if the value carries keyword arguments.
    pub fn is_kwargs(&self) -> bool {
        matches!(self.0, ValueRepr::Map(_, MapType::Kwargs))
    }

    pub(crate) fn is_lazy(&self) -> bool {
        matches!(self.0, ValueRepr::Lazy(_))
    }

    /// Returns `true` for empty strings, arrays and hashes.
    ///
    /// This is what comparisons against the `empty` literal test.
    pub fn is_empty(&self) -> bool {
        match self.0 {
            ValueRepr::String(ref s) => s.is_empty(),
            ValueRepr::Seq(ref items) => items.is_empty(),
            ValueRepr::Map(ref map, _) => map.is_empty(),
            _ => false,
        }
    }

    /// Returns `true` for values that compare equal to the `blank` literal.
    ///
    /// These are `nil`, `false`, whitespace only strings and empty
    /// collections.
    pub fn is_blank(&self) -> bool {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::None => true,
            ValueRepr::Bool(val) => !val,
            ValueRepr::String(ref s) => s.trim().is_empty(),
            _ => self.is_empty(),
        }
    }

    /// If the value is a string, return it.
    pub fn as_str(&self) -> Option<&str> {
        match self.0 {
            ValueRepr::String(ref s) => Some(s),
            _ => None,
        }
    }

    /// If the value is an integer, return it.
    pub fn as_i64(&self) -> Option<i64> {
        match self.0 {
            ValueRepr::I64(val) => Some(val),
            _ => None,
        }
    }

    /// If the value is an array, returns its items.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self.0 {
            ValueRepr::Seq(ref items) => Some(&items[..]),
            _ => None,
        }
    }

    /// If the value is a hash, returns the map.
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self.0 {
            ValueRepr::Map(ref map, _) => Some(map),
            _ => None,
        }
    }

    /// If the value is a drop, returns it.
    pub fn as_object(&self) -> Option<&Arc<dyn Object>> {
        match self.0 {
            ValueRepr::Object(ref obj) => Some(obj),
            _ => None,
        }
    }

    /// Downcasts a drop to a concrete type.
    pub fn downcast_object_ref<T: Object>(&self) -> Option<&T> {
        self.as_object().and_then(|obj| obj.downcast_ref::<T>())
    }

    /// Returns the length of the value.
    ///
    /// Strings report their length in characters.
    pub fn len(&self) -> Option<usize> {
        match self.0 {
            ValueRepr::String(ref s) => Some(s.chars().count()),
            ValueRepr::Seq(ref items) => Some(items.len()),
            ValueRepr::Map(ref map, _) => Some(map.len()),
            ValueRepr::Range(start, end) => Some(if end >= start {
                (end - start) as usize + 1
            } else {
                0
            }),
            _ => None,
        }
    }

    /// Resolves deferred values without memoizing them.
    pub(crate) fn resolved(self) -> Value {
        match self.0 {
            ValueRepr::Lazy(ref lazy) => lazy.resolve(),
            _ => self,
        }
    }

    /// Resolves deferred values including the ones nested in arrays and
    /// hashes.
    pub(crate) fn resolved_deep(self) -> Value {
        match self.0 {
            ValueRepr::Lazy(ref lazy) => lazy.resolve().resolved_deep(),
            ValueRepr::Seq(ref items) if items.iter().any(Value::has_lazy) => items
                .iter()
                .cloned()
                .map(Value::resolved_deep)
                .collect::<Vec<_>>()
                .into(),
            ValueRepr::Map(ref map, map_type) if map.values().any(Value::has_lazy) => {
                let map = map
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone().resolved_deep()))
                    .collect();
                ValueRepr::Map(Arc::new(map), map_type).into()
            }
            _ => self,
        }
    }

    fn has_lazy(&self) -> bool {
        match self.0 {
            ValueRepr::Lazy(_) => true,
            ValueRepr::Seq(ref items) => items.iter().any(Value::has_lazy),
            ValueRepr::Map(ref map, _) => map.values().any(Value::has_lazy),
            _ => false,
        }
    }

    pub(crate) fn is_container(&self) -> bool {
        matches!(self.0, ValueRepr::Seq(_) | ValueRepr::Map(..))
    }

    /// Looks up a key in a hash.
    ///
    /// Drops are not consulted here since member access needs the render
    /// state.  See [`State::lookup_member`](crate::State::lookup_member).
    pub fn get_attr(&self, key: &str) -> Value {
        match self.0 {
            ValueRepr::Map(ref map, _) => map.get(key).cloned().unwrap_or_default(),
            _ => Value::UNDEFINED,
        }
    }

    /// Returns the item at an index.  Negative indices count from the end.
    pub fn get_item_by_index(&self, idx: i64) -> Value {
        match self.0 {
            ValueRepr::Seq(ref items) => {
                let idx = if idx < 0 {
                    items.len() as i64 + idx
                } else {
                    idx
                };
                if idx < 0 {
                    Value::UNDEFINED
                } else {
                    items.get(idx as usize).cloned().unwrap_or_default()
                }
            }
            ValueRepr::Range(start, end) => {
                let len = end - start + 1;
                let idx = if idx < 0 { len + idx } else { idx };
                if idx < 0 || idx >= len {
                    Value::UNDEFINED
                } else {
                    Value::from(start + idx)
                }
            }
            _ => Value::UNDEFINED,
        }
    }

    /// Returns the first item of an array or range.
    pub fn first(&self) -> Value {
        match self.0 {
            ValueRepr::Seq(_) | ValueRepr::Range(..) => self.get_item_by_index(0),
            _ => Value::UNDEFINED,
        }
    }

    /// Returns the last item of an array or range.
    pub fn last(&self) -> Value {
        match self.0 {
            ValueRepr::Seq(_) | ValueRepr::Range(..) => self.get_item_by_index(-1),
            _ => Value::UNDEFINED,
        }
    }

    /// Converts the value into a list of items for iteration.
    ///
    /// Hashes iterate as `[key, value]` pairs, strings and other scalars
    /// iterate as a single item and `nil` iterates as nothing.  Drops
    /// iterate if they implement [`Object::iterate`].
    pub(crate) fn iter_items(&self) -> Vec<Value> {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::None => Vec::new(),
            ValueRepr::Seq(ref items) => items.iter().cloned().map(Value::resolved).collect(),
            ValueRepr::Map(ref map, _) => map
                .iter()
                .map(|(key, value)| Value::from(vec![Value::from(key.clone()), value.clone()]))
                .collect(),
            ValueRepr::Range(start, end) => (start..=end).map(Value::from).collect(),
            ValueRepr::Object(ref obj) => obj.iterate().unwrap_or_else(|| vec![self.clone()]),
            ValueRepr::String(ref s) if s.is_empty() => Vec::new(),
            ValueRepr::Lazy(ref lazy) => lazy.resolve().iter_items(),
            _ => vec![self.clone()],
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // enable round tripping of values
        if serializing_for_value() {
            let handle = LAST_VALUE_HANDLE.with(|x| {
                // we are okay with overflowing the handle here because these values only
                // live for a very short period of time.
                let rv = x.get().wrapping_add(1);
                x.set(rv);
                rv
            });
            VALUE_HANDLES.with(|handles| handles.borrow_mut().insert(handle, self.clone()));
            return serializer.serialize_unit_variant(
                VALUE_HANDLE_MARKER,
                handle,
                VALUE_HANDLE_MARKER,
            );
        }

        match self.0 {
            ValueRepr::Bool(b) => serializer.serialize_bool(b),
            ValueRepr::I64(i) => serializer.serialize_i64(i),
            ValueRepr::F64(f) => serializer.serialize_f64(f),
            ValueRepr::None | ValueRepr::Undefined => serializer.serialize_unit(),
            ValueRepr::String(ref s) => serializer.serialize_str(s),
            ValueRepr::Seq(ref items) => items.serialize(serializer),
            ValueRepr::Map(ref map, _) => {
                use serde::ser::SerializeMap;
                let mut m = ok!(serializer.serialize_map(Some(map.len())));
                for (key, value) in map.iter() {
                    ok!(m.serialize_entry(key as &str, value));
                }
                m.end()
            }
            ValueRepr::Range(start, end) => {
                use serde::ser::SerializeSeq;
                let mut seq = ok!(serializer.serialize_seq(None));
                for item in start..=end {
                    ok!(seq.serialize_element(&item));
                }
                seq.end()
            }
            ValueRepr::Object(ref obj) => match obj.iterate() {
                Some(items) => items.serialize(serializer),
                None => serializer.serialize_str(&self.to_string()),
            },
            ValueRepr::Lazy(ref lazy) => lazy.resolve().serialize(serializer),
        }
    }
}

pub(crate) fn take_value_handle(handle: u32) -> Option<Value> {
    VALUE_HANDLES.with(|handles| handles.borrow_mut().remove(&handle))
}

pub(crate) fn is_value_handle_marker(name: &str, variant: &str) -> bool {
    name == VALUE_HANDLE_MARKER && variant == VALUE_HANDLE_MARKER
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_truthiness() {
        assert!(!Value::UNDEFINED.is_true());
        assert!(!Value::NIL.is_true());
        assert!(!Value::from(false).is_true());
        assert!(Value::from(0).is_true());
        assert!(Value::from("").is_true());
        assert!(Value::from(Vec::<Value>::new()).is_true());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(1.0).to_string(), "1.0");
        assert_eq!(Value::from(0.5).to_string(), "0.5");
        assert_eq!(Value::NIL.to_string(), "");
        assert_eq!(Value::from(vec![1, 2, 3]).to_string(), "123");
        assert_eq!(Value::from_range(1, 5).to_string(), "1..5");
        let value = Value::from_serialize(&serde_json::json!({"a": 1, "b": "x"}));
        assert_eq!(value.to_string(), r#"{"a"=>1, "b"=>"x"}"#);
    }

    #[test]
    fn test_blank_and_empty() {
        assert!(Value::from("").is_empty());
        assert!(!Value::from(" ").is_empty());
        assert!(Value::from(" \n").is_blank());
        assert!(Value::NIL.is_blank());
        assert!(!Value::NIL.is_empty());
        assert!(Value::from(false).is_blank());
    }

    #[test]
    fn test_index_lookup() {
        let value = Value::from(vec![1, 2, 3]);
        assert_eq!(value.get_item_by_index(-1), Value::from(3));
        assert_eq!(value.get_item_by_index(5), Value::UNDEFINED);
        assert_eq!(value.get_item_by_index(-4), Value::UNDEFINED);
        assert_eq!(Value::from_range(3, 6).last(), Value::from(6));
    }
}
