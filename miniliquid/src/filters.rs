//! Filter functions and abstractions.
//!
//! Liquid filters are functions which are applied to values to modify them.
//! For example the expression `{{ 'hello' | append: ' world' }}` invokes the
//! filter `append` with the input `'hello'` and the argument `' world'`.
//! Filters chain from left to right, each filter receiving the output of the
//! previous one.
//!
//! miniliquid comes with the standard Liquid filters listed below.  To create
//! a custom filter write a function that takes at least the input value and
//! register it with [`add_filter`](crate::Environment::add_filter).  Filters
//! only available for a single render can be passed with
//! [`RenderOptions::with_filter`](crate::RenderOptions::with_filter).
//!
//! # Custom Filters
//!
//! A custom filter is a plain function which accepts its inputs as parameters
//! and returns a new value.  The following filter replaces whitespace with
//! dashes and converts the input to lowercase:
//!
//! ```
//! # use miniliquid::Environment;
//! # let mut env = Environment::new();
//! fn slugify(value: String) -> String {
//!     value.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
//! }
//!
//! env.add_filter("slugify", slugify).unwrap();
//! ```
//!
//! Arguments are converted automatically through the
//! [`ArgType`](crate::value::ArgType) trait.  Optional arguments are declared
//! as `Option<T>` and keyword arguments (`{{ x | f: a, key: value }}`) are
//! received through a trailing [`Kwargs`](crate::value::Kwargs) parameter.
//!
//! # Accessing State
//!
//! A borrowed [`State`] can be requested as a parameter.  It does not consume
//! an argument.  The following filter looks up a variable to change its
//! behavior:
//!
//! ```
//! # use miniliquid::Environment;
//! # let mut env = Environment::new();
//! use miniliquid::State;
//!
//! fn money(state: &State, cents: i64) -> String {
//!     let currency = state.lookup("currency");
//!     let symbol = currency.as_ref().and_then(|x| x.as_str()).unwrap_or("$");
//!     format!("{}{}.{:02}", symbol, cents / 100, cents % 100)
//! }
//!
//! env.add_filter("money", money).unwrap();
//! ```
//!
//! # Built-in Filters
//!
//! When the `builtins` feature is enabled the standard Liquid filters are
//! added to every [`Environment::new`](crate::Environment::new).  Their
//! functions are exported from this module but are not meant to be called
//! from Rust code as their signatures might change between releases.
//!
//! `json` requires the `json` feature, `url_encode` and `url_decode`
//! require the `urlencode` feature.
use std::sync::Arc;

use crate::error::Error;
use crate::value::{FunctionArgs, FunctionResult, Value};
use crate::vm::State;

#[doc(hidden)]
pub struct SealedMarker;

/// A utility trait that represents filters.
///
/// This trait is implemented for all functions and closures that take up to
/// five [`ArgType`](crate::value::ArgType) parameters and return a
/// [`FunctionResult`].  The first parameter receives the filter input.
pub trait Filter<Rv, Args>: Send + Sync + 'static {
    /// Applies a filter to value with the given arguments.
    #[doc(hidden)]
    fn apply_to(&self, args: Args, _: SealedMarker) -> Rv;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, Rv, $($name),*> Filter<Rv, ($($name,)*)> for Func
        where
            Func: Fn($($name),*) -> Rv + Send + Sync + 'static,
            Rv: FunctionResult,
        {
            fn apply_to(&self, args: ($($name,)*), _: SealedMarker) -> Rv {
                #[allow(non_snake_case)]
                let ($($name,)*) = args;
                (self)($($name,)*)
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }
tuple_impls! { A B C D E }

type FilterFunc = dyn Fn(&State, &[Value]) -> Result<Value, Error> + Sync + Send + 'static;

/// A boxed filter with its argument conversion erased.
#[derive(Clone)]
pub(crate) struct BoxedFilter(Arc<FilterFunc>);

impl BoxedFilter {
    /// Creates a new boxed filter.
    pub fn new<F, Rv, Args>(f: F) -> BoxedFilter
    where
        F: Filter<Rv, Args> + for<'a> Filter<Rv, <Args as FunctionArgs<'a>>::Output>,
        Rv: FunctionResult,
        Args: for<'a> FunctionArgs<'a>,
    {
        BoxedFilter(Arc::new(move |state, args| -> Result<Value, Error> {
            f.apply_to(ok!(Args::from_values(Some(state), args)), SealedMarker)
                .into_result()
        }))
    }

    /// Applies the filter.  The first value is the input.
    pub fn apply_to(&self, state: &State, args: &[Value]) -> Result<Value, Error> {
        (self.0)(state, args)
    }
}

impl std::fmt::Debug for BoxedFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BoxedFilter")
    }
}

#[cfg(feature = "builtins")]
mod builtins {
    use super::*;

    use std::cmp::Ordering;

    use crate::error::ErrorKind;
    use crate::utils::{split_whitespace, HtmlEscape};
    use crate::value::ops;
    use crate::value::{invoke_member, Kwargs, ValueRepr};

    /// Flattens the input into a list of items.
    ///
    /// Arrays are flattened recursively, `nil` is empty and every other value
    /// (hashes included) is a list of one.
    fn input_items(value: &Value) -> Vec<Value> {
        fn flatten_into(value: &Value, rv: &mut Vec<Value>) {
            match value.0 {
                ValueRepr::Seq(ref items) => {
                    for item in items.iter() {
                        flatten_into(item, rv);
                    }
                }
                ValueRepr::Lazy(_) => flatten_into(&value.clone().resolved(), rv),
                _ => rv.push(value.clone()),
            }
        }

        match value.0 {
            ValueRepr::Undefined | ValueRepr::None => Vec::new(),
            ValueRepr::Range(..) => value.iter_items(),
            ValueRepr::Object(ref obj) => obj.iterate().unwrap_or_else(|| vec![value.clone()]),
            ValueRepr::Lazy(_) => input_items(&value.clone().resolved()),
            _ => {
                let mut rv = Vec::new();
                flatten_into(value, &mut rv);
                rv
            }
        }
    }

    fn property_error(property: &str) -> Error {
        Error::new(
            ErrorKind::ArgumentError,
            format!("cannot select the property '{property}'"),
        )
    }

    /// Reads a property of an item the way `item[property]` does.
    fn item_property(state: &State, item: &Value, property: &str) -> Result<Value, Error> {
        match item.0 {
            ValueRepr::Map(ref map, _) => Ok(map.get(property).cloned().unwrap_or_default()),
            ValueRepr::Object(ref obj) => invoke_member(&**obj, state, property),
            ValueRepr::I64(_) | ValueRepr::F64(_) => Err(property_error(property)),
            _ => Ok(Value::NIL),
        }
    }

    fn to_integer(value: &Value) -> Result<i64, Error> {
        match ops::to_number(value).0 {
            ValueRepr::I64(val) => Ok(val),
            ValueRepr::F64(val) if val.is_finite() => Ok(val as i64),
            _ => Err(Error::new(ErrorKind::ArgumentError, "invalid integer")),
        }
    }

    fn nil_safe_compare(a: &Value, b: &Value) -> Result<Ordering, Error> {
        match (a.is_nil(), b.is_nil()) {
            (true, true) => return Ok(Ordering::Equal),
            (true, false) => return Ok(Ordering::Greater),
            (false, true) => return Ok(Ordering::Less),
            (false, false) => {}
        }
        if ops::equals(a, b) {
            return Ok(Ordering::Equal);
        }
        match (&a.0, &b.0) {
            (ValueRepr::String(_), ValueRepr::String(_))
            | (
                ValueRepr::I64(_) | ValueRepr::F64(_),
                ValueRepr::I64(_) | ValueRepr::F64(_),
            ) => {
                if let Ok(Some(ordering)) = ops::compare(a, b) {
                    return Ok(ordering);
                }
            }
            _ => {}
        }
        Err(Error::new(
            ErrorKind::ArgumentError,
            "cannot sort values of incompatible types",
        ))
    }

    fn nil_safe_casecmp(a: &Value, b: &Value) -> Ordering {
        match (a.is_nil(), b.is_nil()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let (a, b) = (a.to_string(), b.to_string());
                #[cfg(feature = "unicode")]
                {
                    unicase::UniCase::new(a).cmp(&unicase::UniCase::new(b))
                }
                #[cfg(not(feature = "unicode"))]
                {
                    a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase())
                }
            }
        }
    }

    /// Sorts with a fallible comparison, reporting the first failure.
    fn try_sort<T, F>(items: &mut [T], mut cmp: F) -> Result<(), Error>
    where
        F: FnMut(&T, &T) -> Result<Ordering, Error>,
    {
        let mut failure = None;
        items.sort_by(|a, b| match cmp(a, b) {
            Ok(ordering) => ordering,
            Err(err) => {
                failure.get_or_insert(err);
                Ordering::Equal
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Pairs every item with the value its sort or dedup key is taken from.
    fn keyed_items(
        state: &State,
        items: Vec<Value>,
        property: Option<&str>,
    ) -> Result<Vec<(Value, Value)>, Error> {
        let mut rv = Vec::with_capacity(items.len());
        for item in items {
            let key = match property {
                Some(property) => ok!(item_property(state, &item, property)),
                None => item.clone(),
            };
            rv.push((key, item));
        }
        Ok(rv)
    }

    fn replace_last_occurrence(input: &str, needle: &str, replacement: &str) -> String {
        match input.rfind(needle) {
            Some(idx) => {
                let mut rv = String::with_capacity(input.len());
                rv.push_str(&input[..idx]);
                rv.push_str(replacement);
                rv.push_str(&input[idx + needle.len()..]);
                rv
            }
            None => input.to_string(),
        }
    }

    /// Returns the absolute value of a number.
    ///
    /// ```liquid
    /// {{ -17 | abs }} -> 17
    /// ```
    pub fn abs(input: &Value) -> Value {
        match ops::to_number(input).0 {
            ValueRepr::I64(val) => match val.checked_abs() {
                Some(val) => Value::from(val),
                None => Value::from((val as f64).abs()),
            },
            ValueRepr::F64(val) => Value::from(val.abs()),
            _ => Value::from(0),
        }
    }

    /// Appends a string.
    pub fn append(input: String, suffix: String) -> String {
        input + &suffix
    }

    /// Prepends a string.
    pub fn prepend(input: String, prefix: String) -> String {
        prefix + &input
    }

    /// Limits a number to a minimum value.
    ///
    /// ```liquid
    /// {{ 4 | at_least: 5 }} -> 5
    /// ```
    pub fn at_least(input: &Value, min: &Value) -> Value {
        let (input, min) = (ops::to_number(input), ops::to_number(min));
        match ops::compare(&input, &min) {
            Ok(Some(Ordering::Less)) => min,
            _ => input,
        }
    }

    /// Limits a number to a maximum value.
    pub fn at_most(input: &Value, max: &Value) -> Value {
        let (input, max) = (ops::to_number(input), ops::to_number(max));
        match ops::compare(&input, &max) {
            Ok(Some(Ordering::Greater)) => max,
            _ => input,
        }
    }

    /// Uppercases the first character and lowercases the rest.
    pub fn capitalize(input: String) -> String {
        let mut chars = input.chars();
        match chars.next() {
            None => String::new(),
            Some(f) => f.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        }
    }

    /// Rounds a number up to the nearest integer.
    pub fn ceil(input: &Value) -> Value {
        match ops::to_number(input).0 {
            ValueRepr::F64(val) => Value::from(val.ceil() as i64),
            repr => Value(repr),
        }
    }

    /// Rounds a number down to the nearest integer.
    pub fn floor(input: &Value) -> Value {
        match ops::to_number(input).0 {
            ValueRepr::F64(val) => Value::from(val.floor() as i64),
            repr => Value(repr),
        }
    }

    /// Rounds a number to the given number of decimals.
    ///
    /// ```liquid
    /// {{ 1.2 | round }} -> 1
    /// {{ 183.357 | round: 2 }} -> 183.36
    /// ```
    pub fn round(input: &Value, digits: Option<&Value>) -> Value {
        let digits = match digits {
            Some(digits) => to_integer(digits).unwrap_or(0),
            None => 0,
        };
        let exp = 10f64.powi(digits.unsigned_abs().min(300) as i32);
        match ops::to_number(input).0 {
            ValueRepr::I64(val) if digits >= 0 => Value::from(val),
            ValueRepr::I64(val) => Value::from(((val as f64 / exp).round() * exp) as i64),
            ValueRepr::F64(val) if digits == 0 => Value::from(val.round() as i64),
            ValueRepr::F64(val) if digits > 0 => Value::from((val * exp).round() / exp),
            ValueRepr::F64(val) => Value::from(((val / exp).round() * exp) as i64),
            repr => Value(repr),
        }
    }

    /// Removes `nil` items from an array.
    ///
    /// With a property the items whose property is `nil` are removed.
    pub fn compact(state: &State, input: &Value, property: Option<&str>) -> Result<Value, Error> {
        let mut rv = Vec::new();
        for (key, item) in ok!(keyed_items(state, input_items(input), property)) {
            if !key.is_nil() {
                rv.push(item);
            }
        }
        Ok(Value::from(rv))
    }

    /// Concatenates two arrays.
    pub fn concat(input: &Value, other: &Value) -> Result<Value, Error> {
        let other = match other.as_slice() {
            Some(other) => other,
            None => {
                return Err(Error::new(
                    ErrorKind::ArgumentError,
                    "concat filter requires an array argument",
                ))
            }
        };
        let mut rv = input_items(input);
        rv.extend(other.iter().cloned());
        Ok(Value::from(rv))
    }

    /// Returns a default if the input is `nil`, `false` or empty.
    ///
    /// With `allow_false: true` a `false` input is kept.
    ///
    /// ```liquid
    /// {{ product.title | default: 'Untitled' }}
    /// {{ settings.enabled | default: true, allow_false: true }}
    /// ```
    pub fn default(input: Value, default_value: Option<Value>, kwargs: Kwargs) -> Result<Value, Error> {
        let allow_false = ok!(kwargs.get::<Option<Value>>("allow_false"))
            .map_or(false, |x| x.is_true());
        let missing = if allow_false {
            input.is_nil()
        } else {
            !input.is_true()
        };
        if missing || input.is_empty() {
            Ok(default_value.unwrap_or_else(|| Value::from("")))
        } else {
            Ok(input)
        }
    }

    /// Adds a number.
    pub fn plus(input: &Value, operand: &Value) -> Result<Value, Error> {
        ops::add(input, operand)
    }

    /// Subtracts a number.
    pub fn minus(input: &Value, operand: &Value) -> Result<Value, Error> {
        ops::sub(input, operand)
    }

    /// Multiplies by a number.
    pub fn times(input: &Value, operand: &Value) -> Result<Value, Error> {
        ops::mul(input, operand)
    }

    /// Divides by a number.  Integer division rounds down.
    ///
    /// ```liquid
    /// {{ 20 | divided_by: 7 }} -> 2
    /// {{ 20 | divided_by: 7.0 }} -> 2.857142857142857
    /// ```
    pub fn divided_by(input: &Value, operand: &Value) -> Result<Value, Error> {
        ops::div(input, operand)
    }

    /// Returns the remainder of a division.
    pub fn modulo(input: &Value, operand: &Value) -> Result<Value, Error> {
        ops::rem(input, operand)
    }

    /// Lowercases a string.
    pub fn downcase(input: String) -> String {
        input.to_lowercase()
    }

    /// Uppercases a string.
    pub fn upcase(input: String) -> String {
        input.to_uppercase()
    }

    /// HTML escapes a string.  `nil` stays `nil`.
    ///
    /// Also registered as `h`.
    pub fn escape(input: &Value) -> Option<String> {
        if input.is_nil() {
            None
        } else {
            Some(HtmlEscape(&input.to_string()).to_string())
        }
    }

    fn is_entity(rest: &str) -> bool {
        let body = match rest.find(';') {
            Some(idx) => &rest[..idx],
            None => return false,
        };
        match body.strip_prefix('#') {
            Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
            None => !body.is_empty() && body.bytes().all(|b| b.is_ascii_alphabetic()),
        }
    }

    /// HTML escapes a string without escaping existing entities again.
    ///
    /// ```liquid
    /// {{ '1 &lt; 2 & 3' | escape_once }} -> 1 &lt; 2 &amp; 3
    /// ```
    pub fn escape_once(input: String) -> String {
        let mut rv = String::with_capacity(input.len());
        for (idx, c) in input.char_indices() {
            match c {
                '&' if is_entity(&input[idx + 1..]) => rv.push('&'),
                '&' => rv.push_str("&amp;"),
                '<' => rv.push_str("&lt;"),
                '>' => rv.push_str("&gt;"),
                '"' => rv.push_str("&quot;"),
                '\'' => rv.push_str("&#39;"),
                c => rv.push(c),
            }
        }
        rv
    }

    /// Returns the first item of an array.
    pub fn first(input: &Value) -> Value {
        match input.0 {
            ValueRepr::Map(ref map, _) => map
                .iter()
                .next()
                .map(|(key, value)| Value::from(vec![Value::from(key.clone()), value.clone()]))
                .unwrap_or_default(),
            _ => input.first(),
        }
    }

    /// Returns the last item of an array.
    pub fn last(input: &Value) -> Value {
        input.last()
    }

    /// Joins the items of an array with a separator (a space by default).
    pub fn join(input: &Value, glue: Option<String>) -> String {
        let glue = glue.unwrap_or_else(|| " ".into());
        input_items(input)
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join(&glue)
    }

    /// Strips leading whitespace.
    pub fn lstrip(input: String) -> String {
        input.trim_start().to_string()
    }

    /// Strips trailing whitespace.
    pub fn rstrip(input: String) -> String {
        input.trim_end().to_string()
    }

    /// Strips leading and trailing whitespace.
    pub fn strip(input: String) -> String {
        input.trim().to_string()
    }

    /// Picks a property from every item.
    ///
    /// ```liquid
    /// {{ site.pages | map: 'category' | join: ', ' }}
    /// ```
    pub fn map(state: &State, input: &Value, property: String) -> Result<Value, Error> {
        let mut rv = Vec::new();
        for item in input_items(input) {
            if property == "to_liquid" {
                rv.push(item);
            } else {
                rv.push(ok!(item_property(state, &item, &property)));
            }
        }
        Ok(Value::from(rv))
    }

    fn replace_newlines(input: &str, replacement: &str) -> String {
        input.replace("\r\n", "\n").replace('\n', replacement)
    }

    /// Inserts a `<br />` before every newline.
    pub fn newline_to_br(input: String) -> String {
        replace_newlines(&input, "<br />\n")
    }

    /// Removes all newlines.
    pub fn strip_newlines(input: String) -> String {
        replace_newlines(&input, "")
    }

    /// Removes every occurrence of a substring.
    pub fn remove(input: String, needle: String) -> String {
        input.replace(&needle, "")
    }

    /// Removes the first occurrence of a substring.
    pub fn remove_first(input: String, needle: String) -> String {
        input.replacen(&needle, "", 1)
    }

    /// Removes the last occurrence of a substring.
    pub fn remove_last(input: String, needle: String) -> String {
        replace_last_occurrence(&input, &needle, "")
    }

    /// Replaces every occurrence of a substring.
    ///
    /// ```liquid
    /// {{ 'Take my protein pills' | replace: 'my', 'your' }}
    /// ```
    pub fn replace(input: String, needle: String, replacement: Option<String>) -> String {
        input.replace(&needle, &replacement.unwrap_or_default())
    }

    /// Replaces the first occurrence of a substring.
    pub fn replace_first(input: String, needle: String, replacement: Option<String>) -> String {
        input.replacen(&needle, &replacement.unwrap_or_default(), 1)
    }

    /// Replaces the last occurrence of a substring.
    pub fn replace_last(input: String, needle: String, replacement: String) -> String {
        replace_last_occurrence(&input, &needle, &replacement)
    }

    /// Reverses the order of the items of an array.
    ///
    /// Strings are not reversed, `{{ s | split: '' | reverse | join: '' }}`
    /// does that.
    pub fn reverse(input: &Value) -> Value {
        let mut items = input_items(input);
        items.reverse();
        Value::from(items)
    }

    /// Returns the number of characters of a string or items of an array.
    pub fn size(input: &Value) -> usize {
        input.len().unwrap_or(0)
    }

    /// Returns a substring or a subarray.
    ///
    /// The offset may be negative to count from the end, the length
    /// defaults to one.
    ///
    /// ```liquid
    /// {{ 'Liquid' | slice: 2, 5 }} -> quid
    /// {{ 'Liquid' | slice: -3, 2 }} -> ui
    /// ```
    pub fn slice(input: &Value, offset: &Value, length: Option<&Value>) -> Result<Value, Error> {
        let offset = ok!(to_integer(offset));
        let length = match length {
            Some(length) => ok!(to_integer(length)),
            None => 1,
        };

        fn bounds(len: usize, offset: i64, length: i64) -> Option<(usize, usize)> {
            let len = len as i64;
            let start = if offset < 0 { offset + len } else { offset };
            if start < 0 || start > len || length < 0 {
                return None;
            }
            Some((start as usize, (start + length).min(len) as usize))
        }

        match input.0 {
            ValueRepr::Seq(ref items) => Ok(match bounds(items.len(), offset, length) {
                Some((start, end)) => Value::from(items[start..end].to_vec()),
                None => Value::from(Vec::<Value>::new()),
            }),
            _ => {
                let s = input.to_string();
                let chars = s.chars().collect::<Vec<_>>();
                Ok(match bounds(chars.len(), offset, length) {
                    Some((start, end)) => Value::from(chars[start..end].iter().collect::<String>()),
                    None => Value::from(""),
                })
            }
        }
    }

    /// Sorts an array, optionally by a property.
    ///
    /// Values of different types cannot be sorted together.  `nil` sorts
    /// last.
    pub fn sort(state: &State, input: &Value, property: Option<&str>) -> Result<Value, Error> {
        let mut keyed = ok!(keyed_items(state, input_items(input), property));
        ok!(try_sort(&mut keyed, |a, b| nil_safe_compare(&a.0, &b.0)));
        Ok(Value::from(
            keyed.into_iter().map(|(_, item)| item).collect::<Vec<_>>(),
        ))
    }

    /// Sorts an array case insensitively, optionally by a property.
    pub fn sort_natural(state: &State, input: &Value, property: Option<&str>) -> Result<Value, Error> {
        let mut keyed = ok!(keyed_items(state, input_items(input), property));
        keyed.sort_by(|a, b| nil_safe_casecmp(&a.0, &b.0));
        Ok(Value::from(
            keyed.into_iter().map(|(_, item)| item).collect::<Vec<_>>(),
        ))
    }

    /// Splits a string into an array.
    ///
    /// A single space splits on runs of whitespace and an empty pattern
    /// splits into characters.  Trailing empty strings are dropped.
    ///
    /// ```liquid
    /// {% assign beatles = 'John, Paul, George, Ringo' | split: ', ' %}
    /// ```
    pub fn split(input: String, pattern: Option<String>) -> Value {
        let pattern = pattern.unwrap_or_else(|| " ".into());
        let mut parts: Vec<Value> = if pattern == " " {
            split_whitespace(&input).map(Value::from).collect()
        } else if pattern.is_empty() {
            input.chars().map(|c| Value::from(c.to_string())).collect()
        } else {
            input.split(&pattern as &str).map(Value::from).collect()
        };
        while parts.last().map_or(false, |x| x.is_empty()) {
            parts.pop();
        }
        Value::from(parts)
    }

    fn remove_blocks(input: &str) -> String {
        const BLOCKS: [(&str, &str); 3] = [
            ("<script", "</script>"),
            ("<!--", "-->"),
            ("<style", "</style>"),
        ];
        let mut rv = String::with_capacity(input.len());
        let mut rest = input;
        loop {
            let found = BLOCKS
                .iter()
                .filter_map(|(start, end)| {
                    let idx = some!(rest.find(start));
                    let close = some!(rest[idx + start.len()..].find(end));
                    Some((idx, idx + start.len() + close + end.len()))
                })
                .min_by_key(|(idx, _)| *idx);
            match found {
                Some((start, end)) => {
                    rv.push_str(&rest[..start]);
                    rest = &rest[end..];
                }
                None => {
                    rv.push_str(rest);
                    return rv;
                }
            }
        }
    }

    /// Removes HTML tags, scripts, styles and comments.
    pub fn strip_html(input: String) -> String {
        let input = remove_blocks(&input);
        let mut rv = String::with_capacity(input.len());
        let mut rest = &input as &str;
        while let Some(start) = rest.find('<') {
            match rest[start..].find('>') {
                Some(end) => {
                    rv.push_str(&rest[..start]);
                    rest = &rest[start + end + 1..];
                }
                None => break,
            }
        }
        rv.push_str(rest);
        rv
    }

    /// Sums the items of an array, optionally by a property.
    ///
    /// Numeric strings are converted, everything else counts as zero.
    pub fn sum(state: &State, input: &Value, property: Option<&str>) -> Result<Value, Error> {
        let mut rv = Value::from(0);
        for item in input_items(input) {
            let value = match property {
                None => item,
                Some(property) => match item.0 {
                    ValueRepr::Map(..) | ValueRepr::Object(_) => {
                        ok!(item_property(state, &item, property))
                    }
                    _ => Value::from(0),
                },
            };
            rv = ok!(ops::add(&rv, &ops::to_number(&value)));
        }
        Ok(rv)
    }

    /// Shortens a string to a number of characters.
    ///
    /// The ellipsis (`...` by default) counts towards the length.
    ///
    /// ```liquid
    /// {{ 'Ground control to Major Tom.' | truncate: 20 }} -> Ground control to...
    /// ```
    pub fn truncate(
        input: &Value,
        length: Option<&Value>,
        ellipsis: Option<String>,
    ) -> Result<Option<String>, Error> {
        if input.is_nil() {
            return Ok(None);
        }
        let input = input.to_string();
        let length = match length {
            Some(length) => ok!(to_integer(length)),
            None => 50,
        };
        let ellipsis = ellipsis.unwrap_or_else(|| "...".into());
        if input.chars().count() as i64 <= length {
            return Ok(Some(input));
        }
        let keep = (length - ellipsis.chars().count() as i64).max(0) as usize;
        let mut rv = input.chars().take(keep).collect::<String>();
        rv.push_str(&ellipsis);
        Ok(Some(rv))
    }

    /// Shortens a string to a number of words.
    pub fn truncatewords(
        input: &Value,
        words: Option<&Value>,
        ellipsis: Option<String>,
    ) -> Result<Option<String>, Error> {
        if input.is_nil() {
            return Ok(None);
        }
        let input = input.to_string();
        let words = match words {
            Some(words) => ok!(to_integer(words)).max(1) as usize,
            None => 15,
        };
        let wordlist = split_whitespace(&input).take(words + 1).collect::<Vec<_>>();
        if wordlist.len() <= words {
            return Ok(Some(input));
        }
        let mut rv = wordlist[..words].join(" ");
        rv.push_str(&ellipsis.unwrap_or_else(|| "...".into()));
        Ok(Some(rv))
    }

    /// Removes duplicates from an array, optionally by a property.
    pub fn uniq(state: &State, input: &Value, property: Option<&str>) -> Result<Value, Error> {
        let mut seen: Vec<Value> = Vec::new();
        let mut rv = Vec::new();
        for (key, item) in ok!(keyed_items(state, input_items(input), property)) {
            if !seen.iter().any(|x| ops::equals(x, &key)) {
                seen.push(key);
                rv.push(item);
            }
        }
        Ok(Value::from(rv))
    }

    /// Selects the items whose property equals a value.
    ///
    /// Without a value the items with a truthy property are selected.
    ///
    /// ```liquid
    /// {% assign kitchen_products = products | where: 'type', 'kitchen' %}
    /// {% assign available_products = products | where: 'available' %}
    /// ```
    pub fn r#where(
        state: &State,
        input: &Value,
        property: String,
        target: Option<&Value>,
    ) -> Result<Value, Error> {
        let mut rv = Vec::new();
        for item in input_items(input) {
            let value = ok!(item_property(state, &item, &property));
            let keep = match target {
                Some(target) => ops::equals(&value, target),
                None => value.is_true(),
            };
            if keep {
                rv.push(item);
            }
        }
        Ok(Value::from(rv))
    }

    /// Percent encodes a string for use in URLs.  Spaces become `+`.
    #[cfg(feature = "urlencode")]
    pub fn url_encode(input: &Value) -> Option<String> {
        const SET: &percent_encoding::AsciiSet = &percent_encoding::NON_ALPHANUMERIC
            .remove(b'_')
            .remove(b'.')
            .remove(b'-')
            .remove(b'~');

        if input.is_nil() {
            return None;
        }
        Some(
            percent_encoding::utf8_percent_encode(&input.to_string(), SET)
                .to_string()
                .replace("%20", "+"),
        )
    }

    /// Decodes a percent encoded string.
    #[cfg(feature = "urlencode")]
    pub fn url_decode(input: &Value) -> Result<Option<String>, Error> {
        if input.is_nil() {
            return Ok(None);
        }
        let input = input.to_string().replace('+', " ");
        percent_encoding::percent_decode_str(&input)
            .decode_utf8()
            .map(|x| Some(x.into_owned()))
            .map_err(|err| {
                Error::new(ErrorKind::ArgumentError, "invalid byte sequence in UTF-8")
                    .with_source(err)
            })
    }

    /// Serializes a value to JSON.
    ///
    /// ```liquid
    /// <script>var product = {{ product | json }};</script>
    /// ```
    #[cfg(feature = "json")]
    pub fn json(input: &Value) -> Result<String, Error> {
        serde_json::to_string(input).map_err(|err| {
            Error::new(ErrorKind::BadSerialization, "cannot serialize to JSON").with_source(err)
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        use similar_asserts::assert_eq;

        #[test]
        fn test_input_items_flattens() {
            let value = Value::from(vec![
                Value::from(1),
                Value::from(vec![Value::from(2), Value::from(vec![3])]),
                Value::NIL,
            ]);
            let items = input_items(&value);
            assert_eq!(items.len(), 4);
            assert!(items[3].is_nil());
            assert_eq!(input_items(&Value::NIL).len(), 0);
            assert_eq!(input_items(&Value::from_range(1, 3)).len(), 3);
            assert_eq!(input_items(&Value::from("abc")).len(), 1);
        }

        #[test]
        fn test_nil_safe_compare() {
            assert_eq!(
                nil_safe_compare(&Value::from(1), &Value::from(2.5)).unwrap(),
                Ordering::Less
            );
            assert_eq!(
                nil_safe_compare(&Value::NIL, &Value::from("a")).unwrap(),
                Ordering::Greater
            );
            let err = nil_safe_compare(&Value::from(1), &Value::from("a")).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ArgumentError);
        }

        #[test]
        fn test_try_sort_reports_failure() {
            let mut items = vec![Value::from(2), Value::from(1)];
            try_sort(&mut items, |a, b| nil_safe_compare(a, b)).unwrap();
            assert_eq!(items, vec![Value::from(1), Value::from(2)]);
            let mut items = vec![Value::from(true), Value::from(1)];
            assert!(try_sort(&mut items, |a, b| nil_safe_compare(a, b)).is_err());
        }

        #[test]
        fn test_string_filters() {
            assert_eq!(capitalize("my GREAT title".into()), "My great title");
            assert_eq!(escape_once("1 &lt; 2 & 3 &#39;".into()), "1 &lt; 2 &amp; 3 &#39;");
            assert_eq!(
                strip_html("<p>hi<script>x</script><!-- c --> <b>there</b></p>".into()),
                "hi there"
            );
            assert_eq!(strip_html("a < b".into()), "a < b");
            assert_eq!(newline_to_br("a\r\nb\nc".into()), "a<br />\nb<br />\nc");
            assert_eq!(remove_last("a-b-c".into(), "-".into()), "a-bc");
            assert_eq!(
                replace_last("a-b-c".into(), "-".into(), "+".into()),
                "a-b+c"
            );
        }

        #[test]
        fn test_split() {
            assert_eq!(
                split("  a  b ".into(), None),
                Value::from(vec!["a", "b"])
            );
            assert_eq!(split("abc".into(), Some("".into())), Value::from(vec!["a", "b", "c"]));
            assert_eq!(
                split(",a,,b,,".into(), Some(",".into())),
                Value::from(vec!["", "a", "", "b"])
            );
            assert_eq!(split("".into(), Some(",".into())), Value::from(Vec::<Value>::new()));
        }

        #[test]
        fn test_slice() {
            let s = Value::from("Liquid");
            assert_eq!(slice(&s, &Value::from(0), None).unwrap(), Value::from("L"));
            assert_eq!(
                slice(&s, &Value::from(2), Some(&Value::from(5))).unwrap(),
                Value::from("quid")
            );
            assert_eq!(
                slice(&s, &Value::from(-3), Some(&Value::from(2))).unwrap(),
                Value::from("ui")
            );
            assert_eq!(slice(&s, &Value::from(10), None).unwrap(), Value::from(""));
            let a = Value::from(vec![1, 2, 3]);
            assert_eq!(
                slice(&a, &Value::from(1), Some(&Value::from(5))).unwrap(),
                Value::from(vec![2, 3])
            );
        }

        #[test]
        fn test_truncate() {
            let s = Value::from("Ground control to Major Tom.");
            assert_eq!(
                truncate(&s, Some(&Value::from(20)), None).unwrap().unwrap(),
                "Ground control to..."
            );
            assert_eq!(
                truncate(&s, Some(&Value::from(2)), Some("....".into()))
                    .unwrap()
                    .unwrap(),
                "...."
            );
            assert_eq!(
                truncatewords(&s, Some(&Value::from(3)), Some("--".into()))
                    .unwrap()
                    .unwrap(),
                "Ground control to--"
            );
            assert_eq!(truncate(&Value::NIL, None, None).unwrap(), None);
        }

        #[test]
        fn test_numbers() {
            assert_eq!(abs(&Value::from("-3.5")), Value::from(3.5));
            assert_eq!(ceil(&Value::from(1.2)), Value::from(2));
            assert_eq!(floor(&Value::from("3.7")), Value::from(3));
            assert_eq!(round(&Value::from(183.357), Some(&Value::from(2))), Value::from(183.36));
            assert_eq!(round(&Value::from(2.5), None), Value::from(3));
            assert_eq!(at_least(&Value::from(4), &Value::from(5)), Value::from(5));
            assert_eq!(at_most(&Value::from(4), &Value::from("3")), Value::from(3));
        }

        #[test]
        #[cfg(feature = "urlencode")]
        fn test_url_encoding() {
            assert_eq!(
                url_encode(&Value::from("john@liquid.com a~b")).unwrap(),
                "john%40liquid.com+a~b"
            );
            assert_eq!(
                url_decode(&Value::from("%27Stop%21%27+said+Fred")).unwrap().unwrap(),
                "'Stop!' said Fred"
            );
            let err = url_decode(&Value::from("%ff")).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ArgumentError);
        }
    }
}

#[cfg(feature = "builtins")]
pub use self::builtins::*;
