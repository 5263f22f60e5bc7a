use miniliquid::value::{Kwargs, Rest, Value};
use miniliquid::{context, Environment, Error, ErrorKind, ErrorMode, State};

use similar_asserts::assert_eq;

fn render(source: &str, ctx: Value) -> String {
    Environment::new().render_str(source, ctx).unwrap()
}

#[test]
fn test_custom_filter() {
    fn shout(value: String, times: Option<usize>) -> String {
        let mut rv = value.to_uppercase();
        rv.push_str(&"!".repeat(times.unwrap_or(1)));
        rv
    }

    let mut env = Environment::new();
    env.add_filter("shout", shout).unwrap();
    let rv = env
        .render_str("{{ name | shout }} {{ name | shout: 3 }}", context! { name => "hey" })
        .unwrap();
    assert_eq!(rv, "HEY! HEY!!!");
}

#[test]
fn test_filter_with_state() {
    fn with_currency(state: &State, value: &Value) -> String {
        let currency = state.lookup("currency").unwrap_or_default();
        format!("{value} {currency}")
    }

    let mut env = Environment::new();
    env.add_filter("with_currency", with_currency).unwrap();
    let rv = env
        .render_str(
            "{{ 10 | with_currency }}",
            context! { currency => "EUR" },
        )
        .unwrap();
    assert_eq!(rv, "10 EUR");
}

#[test]
fn test_filter_kwargs_and_rest() {
    fn wrap(value: String, parts: Rest<String>, kwargs: Kwargs) -> Result<String, Error> {
        let sep: Option<String> = kwargs.get("sep")?;
        let sep = sep.unwrap_or_else(|| "-".into());
        let mut rv = vec![value];
        rv.extend(parts.0);
        Ok(rv.join(&sep))
    }

    let mut env = Environment::new();
    env.add_filter("wrap", wrap).unwrap();
    let rv = env
        .render_str("{{ 'a' | wrap: 'b', 'c', sep: '+' }}|{{ 'a' | wrap }}", context! {})
        .unwrap();
    assert_eq!(rv, "a+b+c|a");
}

#[test]
fn test_filter_errors_are_rendered() {
    fn fail(_value: &Value) -> Result<Value, Error> {
        Err(Error::new(ErrorKind::StandardError, "no good"))
    }

    let mut env = Environment::new();
    env.add_filter("fail", fail).unwrap();
    assert_eq!(
        env.render_str("a{{ 1 | fail }}b", context! {}).unwrap(),
        "aLiquid error: no goodb"
    );
    env.set_error_mode(ErrorMode::Strict);
    let err = env.render_str("a{{ 1 | fail }}b", context! {}).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StandardError);
}

#[test]
fn test_unknown_filters() {
    let mut env = Environment::new();
    assert_eq!(
        env.render_str("{{ 'x' | nope | upcase }}", context! {}).unwrap(),
        "X"
    );
    env.set_strict_filters(true);
    assert_eq!(
        env.render_str("{{ 'x' | nope }}", context! {}).unwrap(),
        "Liquid error: undefined filter nope"
    );
}

#[test]
fn test_last_registration_wins() {
    let mut env = Environment::new();
    env.add_filter("upcase", |value: String| format!("<{value}>"))
        .unwrap();
    assert_eq!(env.render_str("{{ 'a' | upcase }}", context! {}).unwrap(), "<a>");
}

#[test]
fn test_wrong_argument_count() {
    let rv = render("{{ 'a' | upcase: 1 }}", context! {});
    assert_eq!(
        rv,
        "Liquid error: wrong number of arguments (given 1, expected 0)"
    );
}

#[test]
fn test_array_filters() {
    let ctx = context! {
        items => vec![3, 1, 2],
        words => vec!["b", "A", "c"],
        nested => vec![vec![1, 2], vec![3]],
    };
    assert_eq!(render("{{ items | sort | join: ',' }}", ctx.clone()), "1,2,3");
    assert_eq!(
        render("{{ words | sort | join: ',' }}", ctx.clone()),
        "A,b,c"
    );
    assert_eq!(
        render("{{ words | sort_natural | join: ',' }}", ctx.clone()),
        "A,b,c"
    );
    assert_eq!(render("{{ nested | join: ',' }}", ctx.clone()), "1,2,3");
    assert_eq!(render("{{ items | reverse | first }}", ctx.clone()), "2");
    assert_eq!(
        render("{{ items | concat: nested | uniq | size }}", ctx.clone()),
        "3"
    );
    assert_eq!(
        render("{{ items | concat: 1 }}", ctx),
        "Liquid error: concat filter requires an array argument"
    );
}

#[test]
fn test_sort_incompatible_types() {
    let rv = render(
        "{{ items | sort }}",
        context! { items => vec![Value::from(1), Value::from("a")] },
    );
    assert_eq!(rv, "Liquid error: cannot sort values of incompatible types");
}

#[test]
fn test_map_on_numbers() {
    let rv = render("{{ items | map: 'title' }}", context! { items => vec![1] });
    assert_eq!(rv, "Liquid error: cannot select the property 'title'");
}

#[test]
fn test_default_allow_false() {
    let ctx = context! { off => false, title => "" };
    assert_eq!(render("{{ off | default: 'x' }}", ctx.clone()), "x");
    assert_eq!(
        render("{{ off | default: 'x', allow_false: true }}", ctx.clone()),
        "false"
    );
    assert_eq!(render("{{ title | default: 'x' }}", ctx), "x");
}

#[test]
fn test_math() {
    assert_eq!(render("{{ 4 | plus: '2' }}", context! {}), "6");
    assert_eq!(render("{{ 4.5 | minus: 1 }}", context! {}), "3.5");
    assert_eq!(render("{{ 3 | times: 2.0 }}", context! {}), "6.0");
    assert_eq!(render("{{ -7 | divided_by: 2 }}", context! {}), "-4");
    assert_eq!(render("{{ -7 | modulo: 3 }}", context! {}), "2");
    assert_eq!(render("{{ 1.5 | ceil }}{{ 1.5 | floor }}", context! {}), "21");
}

#[test]
#[cfg(feature = "json")]
fn test_json() {
    let rv = render(
        "{{ product | json }}",
        context! { product => context! { title => "Hat", tags => vec!["a"] } },
    );
    assert_eq!(rv, r#"{"title":"Hat","tags":["a"]}"#);
}
