use std::borrow::Cow;
use std::fmt;

/// Represents template errors.
///
/// Every error carries an [`ErrorKind`] and usually a detail message.  When
/// line numbers are enabled on the [`Environment`](crate::Environment) the
/// error also remembers the 1-based line it was raised on and, for errors
/// raised while rendering a partial, the name of that partial.
///
/// The display form is fixed and parseable:
///
/// ```text
/// Liquid error (line 3): divided by 0
/// Liquid syntax error (line 1): 'if' tag was never closed
/// Liquid error (product line 1): Memory limits exceeded
/// ```
///
/// # Example
///
/// ```rust
/// # let env = miniliquid::Environment::new();
/// match env.render_str("{{ 1 | divided_by: 0 }}", ()) {
///     Ok(result) => println!("{}", result),
///     Err(err) => eprintln!("could not render template: {}", err),
/// }
/// ```
pub struct Error {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    name: Option<String>,
    lineno: Option<usize>,
    fatal: bool,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut err = f.debug_struct("Error");
        err.field("kind", &self.kind);
        if let Some(ref detail) = self.detail {
            err.field("detail", detail);
        }
        if let Some(ref name) = self.name {
            err.field("name", name);
        }
        if let Some(line) = self.lineno {
            err.field("line", &line);
        }
        if let Some(ref source) = self.source {
            err.field("source", source);
        }
        err.finish()
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

impl Eq for Error {}

/// An enum describing the error kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Malformed markup, unknown tags or unclosed blocks.
    SyntaxError,
    /// A filter or tag was invoked with bad arguments.
    ArgumentError,
    /// Division or modulo by zero.
    ZeroDivision,
    /// A value of the wrong kind was handed to an engine API.
    TypeError,
    /// A reserved name was about to be redefined.
    MethodOverride,
    /// Rendering nested too deeply.
    StackLevel,
    /// A resource limit was exceeded.
    MemoryLimit,
    /// A variable was not defined and strict variables are on.
    UndefinedVariable,
    /// A filter was not defined and strict filters are on.
    UndefinedFilter,
    /// A partial could not be found.
    TemplateNotFound,
    /// The file system collaborator failed.
    FileSystem,
    /// A tag was used where it has been disabled.
    DisabledTag,
    /// The scope stack was misused.
    ContextError,
    /// A generic error raised by drops or filters.
    StandardError,
    /// A value could not be serialized.
    BadSerialization,
    /// Writing the output failed.
    WriteFailure,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::ArgumentError => "invalid arguments",
            ErrorKind::ZeroDivision => "divided by 0",
            ErrorKind::TypeError => "type error",
            ErrorKind::MethodOverride => "method override",
            ErrorKind::StackLevel => "Nesting too deep",
            ErrorKind::MemoryLimit => "Memory limits exceeded",
            ErrorKind::UndefinedVariable => "undefined variable",
            ErrorKind::UndefinedFilter => "undefined filter",
            ErrorKind::TemplateNotFound => "template not found",
            ErrorKind::FileSystem => "file system error",
            ErrorKind::DisabledTag => "disabled tag",
            ErrorKind::ContextError => "context error",
            ErrorKind::StandardError => "standard error",
            ErrorKind::BadSerialization => "could not serialize to value",
            ErrorKind::WriteFailure => "failed to write output",
        }
    }

    fn category(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "Liquid syntax error",
            _ => "Liquid error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ok!(f.write_str(self.kind.category()));
        if let Some(lineno) = self.lineno {
            match self.name {
                Some(ref name) => ok!(write!(f, " ({} line {})", name, lineno)),
                None => ok!(write!(f, " (line {})", lineno)),
            }
        }
        write!(f, ": {}", self.message())
    }
}

impl Error {
    /// Creates a new error with kind and detail.
    pub fn new<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Error {
        Error {
            kind,
            detail: Some(detail.into()),
            name: None,
            lineno: None,
            fatal: false,
            source: None,
        }
    }

    /// Marks the error as one that no error mode can recover from.
    pub(crate) fn fatal(mut self) -> Error {
        self.fatal = true;
        self
    }

    pub(crate) fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Attaches a line number unless one is attached already.
    pub(crate) fn set_line(&mut self, lineno: usize) {
        if self.lineno.is_none() {
            self.lineno = Some(lineno);
        }
    }

    pub(crate) fn clear_line(&mut self) {
        self.lineno = None;
    }

    /// Attaches the name of the partial the error was raised in.
    pub(crate) fn set_name(&mut self, name: &str) {
        if self.name.is_none() {
            self.name = Some(name.into());
        }
    }

    /// Attaches another error as source to this error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error detail
    ///
    /// The detail is an error message that provides further details about
    /// the error kind.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the message without the category and location prefix.
    pub fn message(&self) -> Cow<'_, str> {
        match self.detail {
            Some(ref detail) => Cow::Borrowed(detail),
            None => Cow::Borrowed(self.kind.description()),
        }
    }

    /// Returns the name of the partial the error was raised in.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the line number if line numbers are enabled.
    pub fn line(&self) -> Option<usize> {
        self.lineno
    }

    pub(crate) fn new_not_found(name: &str) -> Error {
        Error::new(
            ErrorKind::TemplateNotFound,
            format!("No such template '{name}'"),
        )
    }

    /// Copies the error without its source.
    pub(crate) fn detached(&self) -> Error {
        Error {
            kind: self.kind,
            detail: self.detail.clone(),
            name: self.name.clone(),
            lineno: self.lineno,
            fatal: self.fatal,
            source: None,
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|err| err.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            detail: None,
            name: None,
            lineno: None,
            fatal: false,
            source: None,
        }
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::new(ErrorKind::WriteFailure, "formatting failed")
    }
}

impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: fmt::Display,
    {
        Error::new(ErrorKind::BadSerialization, msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_display_forms() {
        let err = Error::new(ErrorKind::ZeroDivision, "divided by 0");
        assert_eq!(err.to_string(), "Liquid error: divided by 0");

        let mut err = Error::new(ErrorKind::SyntaxError, "Unknown tag 'foo'");
        err.set_line(3);
        assert_eq!(err.to_string(), "Liquid syntax error (line 3): Unknown tag 'foo'");

        let mut err = Error::from(ErrorKind::MemoryLimit);
        err.set_line(1);
        err.set_name("product");
        assert_eq!(
            err.to_string(),
            "Liquid error (product line 1): Memory limits exceeded"
        );
    }

    #[test]
    fn test_first_location_wins() {
        let mut err = Error::new(ErrorKind::ArgumentError, "bad");
        err.set_line(2);
        err.set_line(7);
        assert_eq!(err.line(), Some(2));
    }
}
