use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::value::ops::to_number;
use crate::value::{value_map_with_capacity, Object, Value, ValueKind, ValueMap, ValueRepr};
use crate::vm::State;

/// A utility trait that represents the return value of filters.
///
/// It's implemented for the following types:
///
/// * `Rv` where `Rv` implements `Into<Value>`
/// * `Result<Rv, Error>` where `Rv` implements `Into<Value>`
pub trait FunctionResult {
    #[doc(hidden)]
    fn into_result(self) -> Result<Value, Error>;
}

impl<I: Into<Value>> FunctionResult for Result<I, Error> {
    fn into_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<I: Into<Value>> FunctionResult for I {
    fn into_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// Helper trait representing valid filter arguments.
///
/// Since it's more convenient to write filters with concrete types instead
/// of values, this helper trait exists to automatically perform this
/// conversion.  It is implemented for functions up to an arity of 5
/// parameters.  The first parameter receives the filter input, the others
/// receive the positional arguments in order.
///
/// For each argument the conversion is performed via the [`ArgType`]
/// trait which is implemented for many common types.  For manual
/// conversions the [`from_args`] utility should be used.
pub trait FunctionArgs<'a> {
    /// The output type of the function arguments.
    type Output;

    /// Converts to function arguments from a slice of values.
    #[doc(hidden)]
    fn from_values(state: Option<&'a State>, values: &'a [Value]) -> Result<Self::Output, Error>;
}

/// Utility function to convert a slice of values into arguments.
///
/// This performs the same conversion that [`Filter`](crate::filters::Filter)
/// performs.
///
/// ```
/// use miniliquid::value::from_args;
/// # use miniliquid::value::Value;
/// # fn foo() -> Result<(), miniliquid::Error> {
/// # let args = vec![Value::from("foo"), Value::from(42i64)]; let args = &args[..];
///
/// // args is &[Value]
/// let (string, num): (&str, i64) = from_args(args)?;
/// # Ok(()) } fn main() { foo().unwrap(); }
/// ```
///
/// Note that only value conversions are supported which means that `&State` is not
/// a valid conversion type.
#[inline(always)]
pub fn from_args<'a, Args>(values: &'a [Value]) -> Result<Args, Error>
where
    Args: FunctionArgs<'a, Output = Args>,
{
    Args::from_values(None, values)
}

/// A trait implemented by all filter argument types.
///
/// This trait is used by [`FunctionArgs`].  It's implemented for the
/// following types:
///
/// * render state: [`&State`](crate::State) (does not consume an argument)
/// * integers: [`i32`], [`i64`], [`usize`] (numeric strings are parsed)
/// * floats: [`f64`]
/// * bool: [`bool`]
/// * string: [`String`], [`&str`], `Cow<'_, str>`
/// * values: [`Value`], `&Value`
/// * vectors: [`Vec<T>`]
/// * keyword arguments: [`Kwargs`]
///
/// The type is also implemented for optional values (`Option<T>`) which is used
/// to encode optional parameters.  Additionally it's implemented for [`Rest<T>`]
/// which is used to encode the remaining arguments of a filter call.
///
/// `String` accepts every value and converts it with [`ToString`], `&str`
/// only accepts values which are already strings.  `Cow<'_, str>` borrows
/// when possible and converts otherwise.
pub trait ArgType<'a> {
    /// The output type of this argument.
    type Output;

    #[doc(hidden)]
    fn from_value(value: Option<&'a Value>) -> Result<Self::Output, Error>;

    #[doc(hidden)]
    fn from_value_owned(_value: Value) -> Result<Self::Output, Error> {
        Err(Error::new(
            ErrorKind::ArgumentError,
            "type conversion is not legal in this situation (implicit borrow)",
        ))
    }

    #[doc(hidden)]
    fn from_state_and_value(
        _state: Option<&'a State>,
        value: Option<&'a Value>,
    ) -> Result<(Self::Output, usize), Error> {
        Ok((ok!(Self::from_value(value)), 1))
    }

    #[doc(hidden)]
    #[inline(always)]
    fn from_state_and_values(
        state: Option<&'a State>,
        values: &'a [Value],
        offset: usize,
    ) -> Result<(Self::Output, usize), Error> {
        Self::from_state_and_value(state, values.get(offset))
    }
}

fn wrong_number_of_arguments(given: usize, expected: usize) -> Error {
    Error::new(
        ErrorKind::ArgumentError,
        format!(
            "wrong number of arguments (given {}, expected {})",
            given.saturating_sub(1),
            expected.saturating_sub(1)
        ),
    )
}

fn missing_argument() -> Error {
    Error::new(ErrorKind::ArgumentError, "missing argument")
}

macro_rules! tuple_impls {
    ( $( $name:ident )* * $rest_name:ident ) => {
        impl<'a, $($name,)* $rest_name> FunctionArgs<'a> for ($($name,)* $rest_name,)
            where $($name: ArgType<'a>,)* $rest_name: ArgType<'a>
        {
            type Output = ($($name::Output,)* $rest_name::Output ,);

            fn from_values(state: Option<&'a State>, values: &'a [Value]) -> Result<Self::Output, Error> {
                #![allow(non_snake_case, unused)]
                let mut idx = 0;
                $(
                    let ($name, offset) = ok!($name::from_state_and_values(state, values, idx));
                    idx += offset;
                )*
                let ($rest_name, offset) = ok!($rest_name::from_state_and_values(state, values, idx));
                idx += offset;
                if values.get(idx).is_some() {
                    Err(wrong_number_of_arguments(values.len(), idx))
                } else {
                    Ok(( $($name,)* $rest_name,))
                }
            }
        }
    };
}

impl<'a> FunctionArgs<'a> for () {
    type Output = ();

    fn from_values(_state: Option<&'a State>, values: &'a [Value]) -> Result<Self::Output, Error> {
        if values.is_empty() {
            Ok(())
        } else {
            Err(wrong_number_of_arguments(values.len(), 0))
        }
    }
}

tuple_impls! { *A }
tuple_impls! { A *B }
tuple_impls! { A B *C }
tuple_impls! { A B C *D }
tuple_impls! { A B C D *E }

impl<'a> From<&'a str> for Value {
    #[inline(always)]
    fn from(val: &'a str) -> Self {
        ValueRepr::String(Arc::from(val)).into()
    }
}

impl From<String> for Value {
    #[inline(always)]
    fn from(val: String) -> Self {
        ValueRepr::String(Arc::from(val)).into()
    }
}

impl<'a> From<Cow<'a, str>> for Value {
    #[inline(always)]
    fn from(val: Cow<'a, str>) -> Self {
        match val {
            Cow::Borrowed(x) => x.into(),
            Cow::Owned(x) => x.into(),
        }
    }
}

impl From<Arc<str>> for Value {
    #[inline(always)]
    fn from(val: Arc<str>) -> Self {
        ValueRepr::String(val).into()
    }
}

impl From<()> for Value {
    #[inline(always)]
    fn from(_: ()) -> Self {
        ValueRepr::None.into()
    }
}

impl From<bool> for Value {
    #[inline(always)]
    fn from(val: bool) -> Self {
        ValueRepr::Bool(val).into()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    #[inline(always)]
    fn from(val: Option<T>) -> Self {
        match val {
            Some(val) => val.into(),
            None => Value::NIL,
        }
    }
}

impl<V: Into<Value>> FromIterator<V> for Value {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        let vec = iter.into_iter().map(|v| v.into()).collect::<Vec<Value>>();
        ValueRepr::Seq(Arc::new(vec)).into()
    }
}

impl<K: Into<Arc<str>>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let mut map = value_map_with_capacity(iter.size_hint().0);
        for (k, v) in iter {
            map.insert(k.into(), v.into());
        }
        Value::from_map(map)
    }
}

impl<K: Into<Arc<str>>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(val: BTreeMap<K, V>) -> Self {
        val.into_iter().collect()
    }
}

impl<K: Into<Arc<str>>, V: Into<Value>> From<HashMap<K, V>> for Value {
    fn from(val: HashMap<K, V>) -> Self {
        val.into_iter().collect()
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(val: Vec<T>) -> Self {
        val.into_iter().collect()
    }
}

impl<T: Object> From<Arc<T>> for Value {
    fn from(object: Arc<T>) -> Self {
        Value::from(object as Arc<dyn Object>)
    }
}

impl From<Arc<dyn Object>> for Value {
    #[inline(always)]
    fn from(val: Arc<dyn Object>) -> Self {
        ValueRepr::Object(val).into()
    }
}

macro_rules! value_from {
    ($src:ty, $dst:ident) => {
        impl From<$src> for Value {
            #[inline(always)]
            fn from(val: $src) -> Self {
                ValueRepr::$dst(val as _).into()
            }
        }
    };
}

value_from!(u8, I64);
value_from!(u16, I64);
value_from!(u32, I64);
value_from!(i8, I64);
value_from!(i16, I64);
value_from!(i32, I64);
value_from!(i64, I64);
value_from!(f32, F64);
value_from!(f64, F64);

impl From<u64> for Value {
    #[inline(always)]
    fn from(val: u64) -> Self {
        match i64::try_from(val) {
            Ok(val) => ValueRepr::I64(val).into(),
            Err(_) => ValueRepr::F64(val as f64).into(),
        }
    }
}

impl From<usize> for Value {
    #[inline(always)]
    fn from(val: usize) -> Self {
        Value::from(val as u64)
    }
}

fn unsupported_conversion(kind: ValueKind, target: &str) -> Error {
    Error::new(
        ErrorKind::ArgumentError,
        format!("cannot convert {kind} to {target}"),
    )
}

macro_rules! primitive_try_from {
    ($ty:ident, $convert:expr) => {
        impl TryFrom<Value> for $ty {
            type Error = Error;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                let convert: fn(&Value) -> Option<$ty> = $convert;
                convert(&value).ok_or_else(|| unsupported_conversion(value.kind(), stringify!($ty)))
            }
        }

        impl<'a> ArgType<'a> for $ty {
            type Output = Self;

            fn from_value(value: Option<&Value>) -> Result<Self, Error> {
                match value {
                    Some(value) => TryFrom::try_from(value.clone()),
                    None => Err(missing_argument()),
                }
            }

            fn from_value_owned(value: Value) -> Result<Self, Error> {
                TryFrom::try_from(value)
            }
        }
    };
}

/// Integer conversion.  Integral floats and numeric strings are accepted.
fn to_integer(value: &Value) -> Option<i64> {
    match value.0 {
        ValueRepr::I64(val) => Some(val),
        ValueRepr::F64(val) if val.fract() == 0.0 && val.is_finite() => Some(val as i64),
        ValueRepr::String(ref s) => s.trim().parse().ok(),
        ValueRepr::Lazy(ref lazy) => to_integer(&lazy.resolve()),
        _ => None,
    }
}

primitive_try_from!(i64, to_integer);
primitive_try_from!(i32, |v| to_integer(v).and_then(|x| i32::try_from(x).ok()));
primitive_try_from!(usize, |v| to_integer(v).and_then(|x| usize::try_from(x).ok()));
primitive_try_from!(f64, |v| match v.0 {
    ValueRepr::I64(val) => Some(val as f64),
    ValueRepr::F64(val) => Some(val),
    ValueRepr::String(_) => match to_number(v) {
        Value(ValueRepr::I64(val)) => Some(val as f64),
        Value(ValueRepr::F64(val)) => Some(val),
        _ => None,
    },
    _ => None,
});
primitive_try_from!(bool, |v| match v.0 {
    ValueRepr::Bool(val) => Some(val),
    _ => None,
});

impl<'a> ArgType<'a> for &str {
    type Output = &'a str;

    fn from_value(value: Option<&'a Value>) -> Result<Self::Output, Error> {
        match value {
            Some(value) => value
                .as_str()
                .ok_or_else(|| Error::new(ErrorKind::ArgumentError, "value is not a string")),
            None => Err(missing_argument()),
        }
    }
}

impl<'a, T: ArgType<'a>> ArgType<'a> for Option<T> {
    type Output = Option<T::Output>;

    fn from_value(value: Option<&'a Value>) -> Result<Self::Output, Error> {
        match value {
            Some(value) => {
                if value.is_nil() || value.is_kwargs() {
                    Ok(None)
                } else {
                    T::from_value(Some(value)).map(Some)
                }
            }
            None => Ok(None),
        }
    }

    fn from_value_owned(value: Value) -> Result<Self::Output, Error> {
        if value.is_nil() {
            Ok(None)
        } else {
            T::from_value_owned(value).map(Some)
        }
    }

    fn from_state_and_value(
        _state: Option<&'a State>,
        value: Option<&'a Value>,
    ) -> Result<(Self::Output, usize), Error> {
        // keyword arguments are left for a trailing `Kwargs` parameter
        match value {
            Some(value) if value.is_kwargs() => Ok((None, 0)),
            Some(_) => Ok((ok!(Self::from_value(value)), 1)),
            None => Ok((None, 0)),
        }
    }
}

impl<'a> ArgType<'a> for Cow<'_, str> {
    type Output = Cow<'a, str>;

    #[inline(always)]
    fn from_value(value: Option<&'a Value>) -> Result<Cow<'a, str>, Error> {
        match value {
            Some(value) => Ok(match value.0 {
                ValueRepr::String(ref s) => Cow::Borrowed(s as &str),
                _ => Cow::Owned(value.to_string()),
            }),
            None => Err(missing_argument()),
        }
    }
}

impl<'a> ArgType<'a> for &Value {
    type Output = &'a Value;

    #[inline(always)]
    fn from_value(value: Option<&'a Value>) -> Result<&'a Value, Error> {
        match value {
            Some(value) => Ok(value),
            None => Err(missing_argument()),
        }
    }
}

impl<'a> ArgType<'a> for &State<'_> {
    type Output = &'a State<'a>;

    fn from_value(_value: Option<&'a Value>) -> Result<Self::Output, Error> {
        Err(Error::new(
            ErrorKind::TypeError,
            "cannot use state type in this position",
        ))
    }

    fn from_state_and_value(
        state: Option<&'a State>,
        _value: Option<&'a Value>,
    ) -> Result<(Self::Output, usize), Error> {
        match state {
            None => Err(Error::new(ErrorKind::TypeError, "state unavailable")),
            Some(state) => Ok((state, 0)),
        }
    }
}

/// Utility type to capture remaining arguments.
///
/// In some cases you might want to have a variadic filter.  In that case
/// you can define the last argument to a [`Filter`](crate::filters::Filter)
/// this way.  The `Rest<T>` type will collect all the remaining positional
/// arguments here.  It's implemented for all [`ArgType`]s.  The type itself
/// deref's into the inner vector.
///
/// ```
/// use miniliquid::value::Rest;
///
/// fn sum(input: i64, values: Rest<i64>) -> i64 {
///     input + values.iter().sum::<i64>()
/// }
/// ```
#[derive(Debug)]
pub struct Rest<T>(pub Vec<T>);

impl<T> Deref for Rest<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Rest<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'a, T: ArgType<'a, Output = T>> ArgType<'a> for Rest<T> {
    type Output = Self;

    fn from_value(value: Option<&'a Value>) -> Result<Self, Error> {
        Ok(Rest(ok!(value
            .iter()
            .map(|v| T::from_value(Some(v)))
            .collect::<Result<_, _>>())))
    }

    fn from_state_and_values(
        _state: Option<&'a State>,
        values: &'a [Value],
        offset: usize,
    ) -> Result<(Self, usize), Error> {
        let args = values.get(offset..).unwrap_or_default();
        let args = match args.last() {
            Some(last) if last.is_kwargs() => &args[..args.len() - 1],
            _ => args,
        };
        Ok((
            Rest(ok!(args
                .iter()
                .map(|v| T::from_value(Some(v)))
                .collect::<Result<_, _>>())),
            args.len(),
        ))
    }
}

/// Utility type to capture keyword arguments.
///
/// Filters are invoked with positional arguments and optionally keyword
/// arguments: `{{ list | sort_natural: 'title', reverse: true }}`.  The
/// keyword arguments arrive as the last value.  If a filter declares
/// `Kwargs` as its last parameter they are collected here, otherwise
/// passing keyword arguments is an error.
///
/// ```
/// use miniliquid::value::Kwargs;
/// use miniliquid::Error;
///
/// fn truncate_words(input: String, kwargs: Kwargs) -> Result<String, Error> {
///     let limit: Option<usize> = kwargs.get("limit")?;
///     let limit = limit.unwrap_or(15);
///     Ok(input.split_whitespace().take(limit).collect::<Vec<_>>().join(" "))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Kwargs {
    values: Arc<ValueMap>,
}

impl Kwargs {
    /// Returns a keyword argument converted into the requested type.
    ///
    /// Ask for an `Option<T>` to make the argument optional.
    pub fn get<'a, T>(&'a self, key: &str) -> Result<T, Error>
    where
        T: ArgType<'a, Output = T>,
    {
        T::from_value(self.values.get(key)).map_err(|mut err| {
            if err.kind() == ErrorKind::ArgumentError && self.values.get(key).is_none() {
                err = Error::new(
                    ErrorKind::ArgumentError,
                    format!("missing keyword argument '{key}'"),
                );
            }
            err
        })
    }

    /// Checks if a keyword argument was passed.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterates over the names of the passed keyword arguments.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|x| x as &str)
    }
}

impl<'a> ArgType<'a> for Kwargs {
    type Output = Self;

    fn from_value(value: Option<&'a Value>) -> Result<Self, Error> {
        match value {
            Some(Value(ValueRepr::Map(map, _))) => Ok(Kwargs {
                values: map.clone(),
            }),
            Some(_) => Err(Error::new(
                ErrorKind::ArgumentError,
                "expected keyword arguments",
            )),
            None => Ok(Kwargs {
                values: Arc::new(ValueMap::default()),
            }),
        }
    }

    fn from_state_and_value(
        _state: Option<&'a State>,
        value: Option<&'a Value>,
    ) -> Result<(Self, usize), Error> {
        match value {
            Some(value) if value.is_kwargs() => Ok((ok!(Self::from_value(Some(value))), 1)),
            _ => Ok((ok!(Self::from_value(None)), 0)),
        }
    }
}

impl<'a> ArgType<'a> for Value {
    type Output = Self;

    fn from_value(value: Option<&'a Value>) -> Result<Self, Error> {
        match value {
            Some(value) => Ok(value.clone()),
            None => Err(missing_argument()),
        }
    }

    fn from_value_owned(value: Value) -> Result<Self, Error> {
        Ok(value)
    }
}

impl<'a> ArgType<'a> for String {
    type Output = Self;

    fn from_value(value: Option<&'a Value>) -> Result<Self, Error> {
        match value {
            Some(value) => Ok(value.to_string()),
            None => Err(missing_argument()),
        }
    }

    fn from_value_owned(value: Value) -> Result<Self, Error> {
        Ok(value.to_string())
    }
}

impl<'a, T: ArgType<'a, Output = T>> ArgType<'a> for Vec<T> {
    type Output = Vec<T>;

    fn from_value(value: Option<&'a Value>) -> Result<Self, Error> {
        match value {
            None => Ok(Vec::new()),
            Some(value) => Self::from_value_owned(value.clone()),
        }
    }

    fn from_value_owned(value: Value) -> Result<Self, Error> {
        let mut rv = Vec::new();
        for value in value.iter_items() {
            rv.push(ok!(T::from_value_owned(value)));
        }
        Ok(rv)
    }
}

impl From<Value> for String {
    fn from(val: Value) -> Self {
        val.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_integer_conversion() {
        assert_eq!(i64::try_from(Value::from("42")).unwrap(), 42);
        assert_eq!(i64::try_from(Value::from(3.0)).unwrap(), 3);
        assert!(i64::try_from(Value::from(3.5)).is_err());
        assert!(i64::try_from(Value::from("abc")).is_err());
    }

    #[test]
    fn test_optional_skips_kwargs() {
        let mut map = ValueMap::default();
        map.insert("reverse".into(), Value::from(true));
        let args = vec![Value::from("x"), Value::from_kwargs(map)];
        let (input, opt, kwargs): (String, Option<String>, Kwargs) = from_args(&args).unwrap();
        assert_eq!(input, "x");
        assert_eq!(opt, None);
        assert!(kwargs.get::<bool>("reverse").unwrap());
        assert!(kwargs.get::<Option<bool>>("missing").unwrap().is_none());
    }

    #[test]
    fn test_state_is_only_available_in_renders() {
        let err = <&State as ArgType>::from_state_and_value(None, None)
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeError);
        assert_eq!(err.detail(), Some("state unavailable"));
    }

    #[test]
    fn test_too_many_arguments() {
        let args = vec![Value::from(1), Value::from(2), Value::from(3)];
        let err = from_args::<(i64, i64)>(&args).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentError);
        assert_eq!(
            err.detail(),
            Some("wrong number of arguments (given 2, expected 1)")
        );
    }
}
