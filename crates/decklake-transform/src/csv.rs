use std::borrow::Cow;

/// Quotes a field when it holds a delimiter, quote or line break.
pub(crate) fn field(raw: &str) -> Cow<'_, str> {
    if raw.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", raw.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(raw)
    }
}
