use std::fs;

use miniliquid::loader::MemoryFileSystem;
use miniliquid::{context, Environment, ErrorKind, ErrorMode, RenderOptions, ResourceLimits};

use similar_asserts::assert_eq;

fn load_partials() -> MemoryFileSystem {
    let mut fs = MemoryFileSystem::new();
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/inputs/partials");
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_stem().unwrap().to_str().unwrap().to_string();
        fs.insert(name, fs::read_to_string(&path).unwrap());
    }
    fs
}

/// Every input file holds a JSON context, the template and the expected
/// output, separated by `---` lines.
#[test]
fn test_inputs() {
    insta::glob!("inputs/*.txt", |path| {
        let contents = fs::read_to_string(path).unwrap();
        let mut iter = contents.splitn(3, "\n---\n");
        let ctx: serde_json::Value = serde_json::from_str(iter.next().unwrap()).unwrap();
        let source = iter.next().unwrap();
        let expected = iter.next().unwrap();
        let expected = expected.strip_suffix('\n').unwrap_or(expected);

        let mut env = Environment::new();
        env.set_file_system(load_partials());
        let rendered = match env.render_str(source, &ctx) {
            Ok(rendered) => rendered,
            Err(err) => format!("!!!ERROR!!! {err:#}"),
        };
        assert_eq!(
            rendered,
            expected,
            "{}",
            path.file_name().unwrap().to_str().unwrap()
        );
    });
}

#[test]
fn test_warn_mode_collects_warnings() {
    let mut env = Environment::new();
    env.set_error_mode(ErrorMode::Warn);
    env.set_line_numbers(true);
    let tmpl = env
        .template_from_str("a\n{% if 1 =! 2 %}x{% endif %}\n{{ 'ok' }}")
        .unwrap();
    assert_eq!(tmpl.warnings().len(), 1);
    assert_eq!(tmpl.warnings()[0].kind(), ErrorKind::SyntaxError);
    assert_eq!(tmpl.warnings()[0].line(), Some(2));
}

#[test]
fn test_strict_mode_fails_parsing() {
    let mut env = Environment::new();
    env.set_error_mode(ErrorMode::Strict);
    let err = env.template_from_str("{% nope %}").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    insta::assert_snapshot!(err.to_string(), @"Liquid syntax error: Unknown tag 'nope'");
}

#[test]
fn test_unclosed_block_is_fatal_in_lax_mode() {
    let env = Environment::new();
    let err = env.template_from_str("{% if true %}open").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
}

#[test]
fn test_strict_variables_per_render() {
    let env = Environment::new();
    let tmpl = env.template_from_str("{{ missing }}").unwrap();
    assert_eq!(tmpl.render(context! {}).unwrap(), "");
    let err = tmpl
        .render_with_options(
            context! {},
            &RenderOptions::default()
                .with_strict_variables(true)
                .with_error_mode(ErrorMode::Strict),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedVariable);
}

#[test]
fn test_errors_are_recorded_on_state() {
    let env = Environment::new();
    let tmpl = env
        .template_from_str("{{ 1 | divided_by: 0 }}{{ 2 | modulo: 0 }}")
        .unwrap();
    let (rv, state) = tmpl.render_and_return_state(context! {}).unwrap();
    assert_eq!(rv, "Liquid error: divided by 0Liquid error: divided by 0");
    assert_eq!(state.errors().len(), 2);
    assert!(state
        .errors()
        .iter()
        .all(|err| err.kind() == ErrorKind::ZeroDivision));
}

#[test]
fn test_globals_are_lowest_priority() {
    let mut env = Environment::new();
    env.add_global("shop", "global");
    env.add_global("currency", "EUR");
    let rv = env
        .render_str(
            "{{ shop }} {{ currency }}",
            context! { shop => "assigned" },
        )
        .unwrap();
    assert_eq!(rv, "assigned EUR");
}

#[test]
fn test_assign_score_limit() {
    let source = "{% assign foo = 42 %}{% assign bar = 23 %}";
    let mut env = Environment::new();
    env.set_resource_limits(ResourceLimits::default().with_assign_score_limit(1));
    let tmpl = env.template_from_str(source).unwrap();
    let (rv, state) = tmpl.render_and_return_state(context! {}).unwrap();
    assert_eq!(rv, "Liquid error: Memory limits exceeded");
    assert!(state.limits().reached());

    env.set_resource_limits(ResourceLimits::default().with_assign_score_limit(2));
    let tmpl = env.template_from_str(source).unwrap();
    let (rv, state) = tmpl.render_and_return_state(context! {}).unwrap();
    assert_eq!(rv, "");
    assert!(!state.limits().reached());
    assert_eq!(state.limits().assign_score(), 2);
}

#[test]
fn test_assign_score_of_strings_and_arrays() {
    let mut env = Environment::new();
    env.set_resource_limits(ResourceLimits::default().with_assign_score_limit(100));
    let tmpl = env
        .template_from_str(
            "{% assign x = 'hello' %}{% assign e = '' | split: ',' %}\
             {% assign a = 'ab,c' | split: ',' %}{% capture c %}abc{% endcapture %}",
        )
        .unwrap();
    let (_, state) = tmpl.render_and_return_state(context! {}).unwrap();
    assert_eq!(state.limits().assign_score(), 6 + 1 + 6 + 4);
}

#[test]
fn test_whitespace_control() {
    let env = Environment::new();
    assert_eq!(
        env.render_str("<p>\n  {{- 'John' -}}\n</p>", context! {}).unwrap(),
        "<p>John</p>"
    );
    assert_eq!(
        env.render_str("<p>\n  {{ 'John' }}\n</p>", context! {}).unwrap(),
        "<p>\n  John\n</p>"
    );
}
