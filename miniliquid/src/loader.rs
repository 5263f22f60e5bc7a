//! Loading of partials.
//!
//! `include`, `render` and `embed` look partials up by name.  Templates
//! added to the [`Environment`](crate::Environment) with
//! [`add_template`](crate::Environment::add_template) win, everything else
//! is read through the [`FileSystem`] of the environment.
//!
//! Within one render a partial is read and compiled at most once.  The
//! compiled partials are kept by a [`PartialCache`] which can be shared
//! between renders through
//! [`RenderOptions::with_partial_cache`](crate::RenderOptions::with_partial_cache).
use std::collections::BTreeMap;
use std::fmt;
#[cfg(feature = "loader")]
use std::fs;
#[cfg(feature = "loader")]
use std::io;
#[cfg(feature = "loader")]
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memo_map::MemoMap;

use crate::error::{Error, ErrorKind};
use crate::template::CompiledTemplate;
use crate::vm::State;

/// Reads the source of partials.
///
/// Closures of the form `Fn(&str) -> Result<Option<String>, Error>` are file
/// systems too.  They return `Ok(None)` if there is no such template.
///
/// ```rust
/// # use miniliquid::{Environment, Error};
/// let mut env = Environment::new();
/// env.set_file_system(|name: &str| -> Result<Option<String>, Error> {
///     Ok(match name {
///         "greeting" => Some("Hello {{ name }}!".to_string()),
///         _ => None,
///     })
/// });
/// ```
pub trait FileSystem: Send + Sync + 'static {
    /// Returns the source of the template with the given name.
    fn read_template_file(&self, name: &str) -> Result<String, Error>;
}

impl<F> FileSystem for F
where
    F: Fn(&str) -> Result<Option<String>, Error> + Send + Sync + 'static,
{
    fn read_template_file(&self, name: &str) -> Result<String, Error> {
        match ok!(self(name)) {
            Some(source) => Ok(source),
            None => Err(Error::new_not_found(name)),
        }
    }
}

/// The default file system which does not allow partials at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlankFileSystem;

impl FileSystem for BlankFileSystem {
    fn read_template_file(&self, _name: &str) -> Result<String, Error> {
        Err(Error::new(
            ErrorKind::FileSystem,
            "This liquid context does not allow includes.",
        ))
    }
}

/// A file system that holds its templates in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileSystem {
    templates: BTreeMap<String, String>,
}

impl MemoryFileSystem {
    /// Creates an empty file system.
    pub fn new() -> MemoryFileSystem {
        MemoryFileSystem::default()
    }

    /// Adds a template.
    pub fn insert<N: Into<String>, S: Into<String>>(&mut self, name: N, source: S) {
        self.templates.insert(name.into(), source.into());
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_template_file(&self, name: &str) -> Result<String, Error> {
        match self.templates.get(name) {
            Some(source) => Ok(source.clone()),
            None => Err(Error::new_not_found(name)),
        }
    }
}

/// Loads partials from a directory with the file naming of Liquid.
///
/// The template `product` is read from `_product.liquid` and
/// `shop/product` from `shop/_product.liquid`.  The pattern can be changed
/// with [`with_pattern`](Self::with_pattern) where `%s` stands for the
/// base name of the template.
#[cfg(feature = "loader")]
#[cfg_attr(docsrs, doc(cfg(feature = "loader")))]
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
    pattern: String,
}

#[cfg(feature = "loader")]
impl LocalFileSystem {
    /// Creates a file system rooted at the given directory.
    pub fn new<P: AsRef<Path>>(root: P) -> LocalFileSystem {
        LocalFileSystem {
            root: root.as_ref().to_path_buf(),
            pattern: "_%s.liquid".into(),
        }
    }

    /// Changes the pattern of the file names.
    pub fn with_pattern<S: Into<String>>(mut self, pattern: S) -> LocalFileSystem {
        self.pattern = pattern.into();
        self
    }

    /// Returns the path a template is read from.
    pub fn full_path(&self, name: &str) -> Result<PathBuf, Error> {
        let legal = !name.is_empty()
            && !name.starts_with(['.', '/'])
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/');
        if !legal {
            return Err(illegal_name(name));
        }
        let file = match name.rsplit_once('/') {
            Some((dir, base)) => format!("{}/{}", dir, self.pattern.replace("%s", base)),
            None => self.pattern.replace("%s", name),
        };
        safe_join(&self.root, &file).ok_or_else(|| illegal_name(name))
    }
}

#[cfg(feature = "loader")]
fn illegal_name(name: &str) -> Error {
    Error::new(
        ErrorKind::FileSystem,
        format!("Illegal template name '{name}'"),
    )
}

#[cfg(feature = "loader")]
fn read_file(path: PathBuf) -> Result<Option<String>, Error> {
    match fs::read_to_string(path) {
        Ok(result) => Ok(Some(result)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(Error::new(ErrorKind::FileSystem, "could not read template").with_source(err))
        }
    }
}

#[cfg(feature = "loader")]
impl FileSystem for LocalFileSystem {
    fn read_template_file(&self, name: &str) -> Result<String, Error> {
        let path = ok!(self.full_path(name));
        match ok!(read_file(path)) {
            Some(source) => Ok(source),
            None => Err(Error::new_not_found(name)),
        }
    }
}

/// Safely joins two paths.
#[cfg(feature = "loader")]
pub fn safe_join(base: &Path, template: &str) -> Option<PathBuf> {
    let mut rv = base.to_path_buf();
    for segment in template.split('/') {
        if segment.starts_with('.') || segment.contains('\\') {
            return None;
        }
        rv.push(segment);
    }
    Some(rv)
}

/// Helper to load templates from a given directory by their plain name.
///
/// Unlike [`LocalFileSystem`] no naming pattern is applied: `{% include
/// 'shop/product.liquid' %}` reads `shop/product.liquid`.  Templates that
/// start with a dot (`.`) or are contained in a folder starting with a dot
/// cannot be loaded.
///
/// ```rust
/// # use miniliquid::{path_loader, Environment};
/// fn create_env() -> Environment {
///     let mut env = Environment::new();
///     env.set_file_system(path_loader("path/to/templates"));
///     env
/// }
/// ```
#[cfg(feature = "loader")]
#[cfg_attr(docsrs, doc(cfg(feature = "loader")))]
pub fn path_loader<P: AsRef<Path>>(
    dir: P,
) -> impl Fn(&str) -> Result<Option<String>, Error> + Send + Sync + 'static {
    let dir = dir.as_ref().to_path_buf();
    move |name| match safe_join(&dir, name) {
        Some(path) => read_file(path),
        None => Ok(None),
    }
}

/// Compiled partials of one or more renders.
///
/// Every partial is read from the file system and compiled at most once per
/// cache.  A fresh cache is created for every render unless one is passed
/// in with the [`RenderOptions`](crate::RenderOptions).
#[derive(Default)]
pub struct PartialCache {
    templates: MemoMap<String, Arc<CompiledTemplate>>,
}

impl fmt::Debug for PartialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.templates.keys()).finish()
    }
}

impl PartialCache {
    /// Creates an empty cache.
    pub fn new() -> PartialCache {
        PartialCache::default()
    }

    /// Returns the number of cached partials.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns `true` if nothing was loaded yet.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub(crate) fn load(&self, state: &State, name: &str) -> Result<Arc<CompiledTemplate>, Error> {
        if let Some(rv) = state.env().get_compiled(name) {
            return Ok(rv);
        }
        if let Some(rv) = self.templates.get(name) {
            trace!(name, "partial cache hit");
            return Ok(rv.clone());
        }
        self.templates
            .get_or_try_insert(&name.to_string(), || -> Result<_, Error> {
                debug!(name, "partial cache miss");
                let source = ok!(state.file_system().read_template_file(name));
                CompiledTemplate::new(state.env(), Some(name.into()), &source).map(Arc::new)
            })
            .map(|rv| rv.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use similar_asserts::assert_eq;

    use crate::{context, Environment, RenderOptions};

    #[cfg(feature = "loader")]
    #[test]
    fn test_safe_join() {
        assert_eq!(
            safe_join(Path::new("foo"), "bar/baz"),
            Some(PathBuf::from("foo").join("bar").join("baz"))
        );
        assert_eq!(safe_join(Path::new("foo"), ".bar/baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar/.baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar/../baz"), None);
    }

    #[cfg(feature = "loader")]
    #[test]
    fn test_local_file_system_paths() {
        let fs = LocalFileSystem::new("/templates");
        assert_eq!(
            fs.full_path("product").unwrap(),
            PathBuf::from("/templates/_product.liquid")
        );
        assert_eq!(
            fs.full_path("shop/product").unwrap(),
            PathBuf::from("/templates/shop/_product.liquid")
        );
        let err = fs.full_path("../secret").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileSystem);
        assert_eq!(err.to_string(), "Liquid error: Illegal template name '../secret'");
        assert!(fs.full_path("/etc/passwd").is_err());

        let fs = LocalFileSystem::new("/t").with_pattern("%s.html");
        assert_eq!(fs.full_path("a").unwrap(), PathBuf::from("/t/a.html"));
    }

    #[test]
    fn test_closure_file_system() {
        let fs = |name: &str| -> Result<Option<String>, Error> {
            Ok((name == "a").then(|| "A".to_string()))
        };
        assert_eq!(fs.read_template_file("a").unwrap(), "A");
        let err = fs.read_template_file("b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
        assert_eq!(err.to_string(), "Liquid error: No such template 'b'");
    }

    #[test]
    fn test_reads_at_most_once_per_cache() {
        let reads = Arc::new(AtomicUsize::new(0));
        let mut env = Environment::new();
        env.set_file_system({
            let reads = reads.clone();
            move |_name: &str| -> Result<Option<String>, Error> {
                reads.fetch_add(1, Ordering::Relaxed);
                Ok(Some("x".into()))
            }
        });
        let tmpl = env
            .template_from_str("{% include 'a' %}{% render 'a' %}{% include 'b' %}")
            .unwrap();
        assert_eq!(tmpl.render(context! {}).unwrap(), "xxx");
        assert_eq!(reads.load(Ordering::Relaxed), 2);

        // every render starts with a fresh cache
        assert_eq!(tmpl.render(context! {}).unwrap(), "xxx");
        assert_eq!(reads.load(Ordering::Relaxed), 4);

        let cache = Arc::new(PartialCache::new());
        let options = RenderOptions::default().with_partial_cache(cache.clone());
        tmpl.render_with_options(context! {}, &options).unwrap();
        tmpl.render_with_options(context! {}, &options).unwrap();
        assert_eq!(reads.load(Ordering::Relaxed), 6);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_loaded_templates_are_not_shared_with_partials() {
        let reads = Arc::new(AtomicUsize::new(0));
        let mut env = Environment::new();
        env.set_file_system({
            let reads = reads.clone();
            move |_name: &str| -> Result<Option<String>, Error> {
                reads.fetch_add(1, Ordering::Relaxed);
                Ok(Some("p".into()))
            }
        });
        env.get_template("part").unwrap();
        env.get_template("part").unwrap();
        assert_eq!(reads.load(Ordering::Relaxed), 1);

        let tmpl = env.template_from_str("{% render 'part' %}").unwrap();
        for _ in 0..2 {
            let cache = Arc::new(PartialCache::new());
            let options = RenderOptions::default().with_partial_cache(cache.clone());
            assert_eq!(tmpl.render_with_options(context! {}, &options).unwrap(), "p");
            assert_eq!(cache.len(), 1);
        }
        assert_eq!(reads.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_environment_templates_win() {
        let mut fs = MemoryFileSystem::new();
        fs.insert("a", "from fs");
        let mut env = Environment::new();
        env.set_file_system(fs);
        assert_eq!(env.render_str("{% include 'a' %}", ()).unwrap(), "from fs");
        env.add_template("a", "from env").unwrap();
        assert_eq!(env.render_str("{% include 'a' %}", ()).unwrap(), "from env");
    }
}
