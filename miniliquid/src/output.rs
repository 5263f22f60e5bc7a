use std::{fmt, io};

use crate::error::{Error, ErrorKind};

/// An abstraction over [`fmt::Write`](std::fmt::Write) for the rendering.
///
/// This is a utility type used in the engine which can be written into like one
/// can write into an [`std::fmt::Write`] value.  Tags write their output into
/// it.  It keeps a stack of capture buffers for tags such as `capture` which
/// render their body into a string instead of the output, and it tracks how
/// many bytes were written in total so the render length can be bounded.
pub struct Output<'a> {
    w: &'a mut (dyn fmt::Write + 'a),
    capture_stack: Vec<String>,
    written: usize,
}

impl<'a> Output<'a> {
    /// Creates a new output.
    pub(crate) fn new(w: &'a mut (dyn fmt::Write + 'a)) -> Self {
        Self {
            w,
            capture_stack: Vec::new(),
            written: 0,
        }
    }

    /// Begins capturing into a string.
    pub fn begin_capture(&mut self) {
        self.capture_stack.push(String::new());
    }

    /// Ends capturing and returns the captured string.
    ///
    /// Calling this without a matching [`begin_capture`](Self::begin_capture)
    /// returns an empty string.
    pub fn end_capture(&mut self) -> String {
        self.capture_stack.pop().unwrap_or_default()
    }

    /// Returns the number of bytes written so far, captures included.
    pub fn written(&self) -> usize {
        self.written
    }

    #[inline(always)]
    fn target(&mut self) -> &mut dyn fmt::Write {
        match self.capture_stack.last_mut() {
            Some(buf) => buf as &mut dyn fmt::Write,
            None => &mut *self.w,
        }
    }

    /// Writes some data to the underlying buffer contained within this output.
    #[inline]
    pub fn write_str(&mut self, s: &str) -> fmt::Result {
        self.written += s.len();
        self.target().write_str(s)
    }

    /// Writes some formatted information into this instance.
    #[inline]
    pub fn write_fmt(&mut self, a: fmt::Arguments<'_>) -> fmt::Result {
        fmt::Write::write_fmt(self, a)
    }
}

impl fmt::Write for Output<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Output::write_str(self, s)
    }

    #[inline]
    fn write_char(&mut self, c: char) -> fmt::Result {
        self.written += c.len_utf8();
        self.target().write_char(c)
    }
}

/// Adapts an [`io::Write`] into a [`fmt::Write`] and holds on to the
/// first I/O error.
pub struct WriteWrapper<W> {
    pub w: W,
    pub err: Option<io::Error>,
}

impl<W> WriteWrapper<W> {
    /// Replaces the given error with the held error if available.
    pub fn take_err(&mut self, original: Error) -> Error {
        self.err
            .take()
            .map(|io_err| {
                Error::new(ErrorKind::WriteFailure, "I/O error during rendering")
                    .with_source(io_err)
            })
            .unwrap_or(original)
    }
}

impl<W: io::Write> fmt::Write for WriteWrapper<W> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.w.write_all(s.as_bytes()).map_err(|e| {
            self.err = Some(e);
            fmt::Error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_capture_stack() {
        let mut buf = String::new();
        let mut out = Output::new(&mut buf);
        out.write_str("a").unwrap();
        out.begin_capture();
        out.write_str("bc").unwrap();
        out.begin_capture();
        write!(out, "{}", 42).unwrap();
        assert_eq!(out.end_capture(), "42");
        assert_eq!(out.end_capture(), "bc");
        out.write_str("d").unwrap();
        assert_eq!(out.written(), 6);
        drop(out);
        assert_eq!(buf, "ad");
    }
}
