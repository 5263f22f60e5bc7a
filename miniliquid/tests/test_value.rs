use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use miniliquid::value::{Object, Value, DENIED_MEMBERS};
use miniliquid::{context, Environment, Error, ErrorKind, ErrorMode, State};

use similar_asserts::assert_eq;

#[derive(Debug)]
struct Product {
    title: &'static str,
    price: i64,
}

impl Object for Product {
    fn invokable_members(&self) -> &[&str] {
        &["title", "price", "class"]
    }

    fn invoke(&self, _state: &State, name: &str) -> Result<Value, Error> {
        Ok(match name {
            "title" => Value::from(self.title),
            "price" => Value::from(self.price),
            _ => Value::from("leaked"),
        })
    }
}

#[derive(Debug)]
struct Catchall;

impl Object for Catchall {
    fn liquid_method_missing(&self, _state: &State, name: &str) -> Result<Value, Error> {
        Ok(Value::from(format!("<{name}>")))
    }

    fn render(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("catchall")
    }
}

#[derive(Debug)]
struct Shelf(Vec<Value>);

impl Object for Shelf {
    fn iterate(&self) -> Option<Vec<Value>> {
        Some(self.0.clone())
    }

    fn is_true(&self) -> bool {
        !self.0.is_empty()
    }
}

fn product() -> Value {
    Value::from_object(Product {
        title: "Hat",
        price: 12,
    })
}

#[test]
fn test_drop_whitelist() {
    let env = Environment::new();
    let rv = env
        .render_str(
            "{{ p.title }}:{{ p.price | plus: 1 }}:{{ p.secret }}:{{ p.class }}",
            context! { p => product() },
        )
        .unwrap();
    assert_eq!(rv, "Hat:13::");
    assert!(DENIED_MEMBERS.contains(&"class"));
}

#[test]
fn test_drop_missing_member_strict() {
    let mut env = Environment::new();
    env.set_strict_variables(true);
    env.set_error_mode(ErrorMode::Strict);
    let err = env
        .render_str("{{ p.secret }}", context! { p => product() })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedVariable);
}

#[test]
fn test_drop_method_missing() {
    let env = Environment::new();
    let rv = env
        .render_str(
            "{{ c }} {{ c.anything }} {{ c.send }}",
            context! { c => Value::from_object(Catchall) },
        )
        .unwrap();
    assert_eq!(rv, "catchall <anything> ");
}

#[test]
fn test_iterable_drop() {
    let env = Environment::new();
    let ctx = context! {
        shelf => Value::from_object(Shelf(vec![product(), product()])),
        empty_shelf => Value::from_object(Shelf(vec![])),
    };
    let rv = env
        .render_str(
            "{% for p in shelf %}{{ p.title }}{% endfor %}|{{ shelf | map: 'price' | sum }}\
             |{% if empty_shelf %}yes{% else %}no{% endif %}",
            ctx,
        )
        .unwrap();
    assert_eq!(rv, "HatHat|24|no");
}

#[test]
fn test_lazy_values_resolve_once_per_render() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let env = Environment::new();
    let tmpl = env
        .template_from_str("{{ x }}{{ x }}{% if x == 'v' %}!{% endif %}")
        .unwrap();
    let make_ctx = || {
        let counter = counter.clone();
        context! {
            x => Value::from_lazy(move || {
                counter.fetch_add(1, Ordering::Relaxed);
                "v"
            })
        }
    };
    assert_eq!(tmpl.render(make_ctx()).unwrap(), "vv!");
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(tmpl.render(make_ctx()).unwrap(), "vv!");
    assert_eq!(calls.load(Ordering::Relaxed), 2);
}

#[test]
fn test_nested_lazy_values_resolve_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let env = Environment::new();
    let ctx = context! {
        items => vec![Value::from_lazy(move || counter.fetch_add(1, Ordering::Relaxed) + 1)],
    };
    let rv = env
        .render_str(
            "{{ items }}{{ items }}{{ items.first }}{% for i in items %}{{ i }}{% endfor %}",
            ctx,
        )
        .unwrap();
    assert_eq!(rv, "1111");
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn test_drop_members_are_not_cached() {
    #[derive(Debug, Default)]
    struct Ticker(AtomicUsize);

    impl Object for Ticker {
        fn invokable_members(&self) -> &[&str] {
            &["next"]
        }

        fn invoke(&self, _state: &State, _name: &str) -> Result<Value, Error> {
            Ok(Value::from(self.0.fetch_add(1, Ordering::Relaxed)))
        }
    }

    let env = Environment::new();
    let rv = env
        .render_str(
            "{{ t.next }}{{ t.next }}{{ t.next }}",
            context! { t => Value::from_object(Ticker::default()) },
        )
        .unwrap();
    assert_eq!(rv, "012");
}

#[test]
fn test_serialized_values() {
    #[derive(serde::Serialize)]
    struct Line {
        sku: &'static str,
        quantity: u32,
        price: f64,
    }

    let env = Environment::new();
    let ctx = context! {
        lines => vec![
            Line { sku: "a", quantity: 2, price: 1.5 },
            Line { sku: "b", quantity: 1, price: 2.0 },
        ],
        note => Option::<String>::None,
    };
    let rv = env
        .render_str(
            "{% for l in lines %}{{ l.sku }}={{ l.price | times: l.quantity }};{% endfor %}\
             {{ lines.size }}{% if note == nil %} no note{% endif %}",
            ctx,
        )
        .unwrap();
    assert_eq!(rv, "a=3.0;b=2.0;2 no note");
}

#[test]
fn test_value_api() {
    assert!(Value::from(0).is_true());
    assert!(Value::from("").is_true());
    assert!(!Value::NIL.is_true());
    assert!(!Value::from(false).is_true());
    assert!(Value::from("  \n").is_blank());
    assert!(Value::from(Vec::<Value>::new()).is_empty());
    assert_eq!(Value::from(1.0).to_string(), "1.0");
    assert_eq!(Value::from(vec![1, 2]).to_string(), "12");
    assert_eq!(Value::NIL.to_string(), "");
    assert_eq!(Value::from("héllo").len(), Some(5));
    assert_eq!(Value::from(1), Value::from(1.0));
}
