use std::fmt;

/// Runs a closure when dropped.
pub struct OnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> OnDrop<F> {
    pub fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

pub fn memstr(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Helper for dealing with untrusted size hints.
#[inline(always)]
pub(crate) fn untrusted_size_hint(value: usize) -> usize {
    value.min(1024)
}

/// Grows the stack on demand when the `stacker` feature is enabled.
#[inline(always)]
pub(crate) fn ensure_sufficient_stack<R, F: FnOnce() -> R>(f: F) -> R {
    #[cfg(feature = "stacker")]
    {
        stacker::maybe_grow(32 * 1024, 1024 * 1024, f)
    }
    #[cfg(not(feature = "stacker"))]
    {
        f()
    }
}

/// Helper to HTML escape a string.
///
/// Escapes `&`, `<`, `>`, `"` and `'`.  With the `speedups` feature the
/// escaping is delegated to `v_htmlescape` which additionally escapes `/`.
pub struct HtmlEscape<'a>(pub &'a str);

impl fmt::Display for HtmlEscape<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(feature = "v_htmlescape")]
        {
            fmt::Display::fmt(&v_htmlescape::escape(self.0), f)
        }
        #[cfg(not(feature = "v_htmlescape"))]
        {
            let mut start = 0;
            for (idx, c) in self.0.char_indices() {
                let replacement = match c {
                    '<' => "&lt;",
                    '>' => "&gt;",
                    '&' => "&amp;",
                    '"' => "&quot;",
                    '\'' => "&#39;",
                    _ => continue,
                };
                if start < idx {
                    ok!(f.write_str(&self.0[start..idx]));
                }
                ok!(f.write_str(replacement));
                start = idx + 1;
            }
            f.write_str(&self.0[start..])
        }
    }
}

/// Splits a string on runs of whitespace, dropping leading and trailing
/// whitespace.
pub fn split_whitespace(s: &str) -> impl Iterator<Item = &str> + '_ {
    s.split(|c: char| c.is_whitespace()).filter(|x| !x.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    #[cfg(not(feature = "speedups"))]
    fn test_html_escape() {
        assert_eq!(
            HtmlEscape("<a href='x'>Tom & \"Jerry\"</a>").to_string(),
            "&lt;a href=&#39;x&#39;&gt;Tom &amp; &quot;Jerry&quot;&lt;/a&gt;"
        );
        assert_eq!(HtmlEscape("plain").to_string(), "plain");
    }

    #[test]
    fn test_memstr() {
        assert_eq!(memstr(b"foo {% endraw %}", b"{%"), Some(4));
        assert_eq!(memstr(b"foo", b"{%"), None);
    }
}
