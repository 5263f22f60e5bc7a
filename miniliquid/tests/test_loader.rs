#![cfg(feature = "loader")]
use std::path::PathBuf;

use miniliquid::loader::LocalFileSystem;
use miniliquid::{context, path_loader, Environment, ErrorKind, ErrorMode};

use similar_asserts::assert_eq;

fn partials_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/inputs/partials")
}

#[test]
fn test_local_file_system() {
    let mut env = Environment::new();
    env.set_file_system(LocalFileSystem::new(partials_dir()).with_pattern("%s.liquid"));
    let rv = env
        .render_str(
            "{% render 'product' for products as product %}",
            context! {
                products => vec![
                    context! { title => "Hat", price => 10 },
                    context! { title => "Cap", price => 5 },
                ]
            },
        )
        .unwrap();
    assert_eq!(rv, "Hat:10Cap:5");
}

#[test]
fn test_path_loader() {
    let mut env = Environment::new();
    env.set_file_system(path_loader(partials_dir()));
    let tmpl = env.get_template("product.liquid").unwrap();
    assert_eq!(
        tmpl.render(context! { product => context! { title => "Hat", price => 1 } })
            .unwrap(),
        "Hat:1"
    );
    let err = env.get_template("missing.liquid").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
}

#[test]
fn test_illegal_names() {
    let mut env = Environment::new();
    env.set_error_mode(ErrorMode::Strict);
    env.set_file_system(LocalFileSystem::new(partials_dir()));
    let err = env
        .render_str("{% include '../secret' %}", context! {})
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileSystem);
}
