//! Decoding of `application/x-www-form-urlencoded` payloads
//!
//! Decoding is permissive, the way browsers and most CGI libraries treat
//! form data: a broken escape is kept as literal text rather than failing
//! the whole request.

use crate::filesystem::{is_hexit, from_hexit};

use std::slice;

/// Decoded form fields, in the order they arrived
///
/// Duplicate keys are kept; whether the first or the last one wins is up to
/// whoever looks them up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormParams {
    pairs: Vec<(String, String)>
}

impl FormParams {
    pub fn new() -> FormParams {
        FormParams { pairs: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<(String, String)> {
        self.pairs.iter()
    }

    /// The value of the first field called `key`
    pub fn first(&self, key: &str) -> Option<&str> {
        self.pairs.iter()
            .find(|&&(ref k, _)| k == key)
            .map(|&(_, ref v)| v.as_str())
    }

    /// The value of the last field called `key`
    pub fn last(&self, key: &str) -> Option<&str> {
        self.pairs.iter()
            .rev()
            .find(|&&(ref k, _)| k == key)
            .map(|&(_, ref v)| v.as_str())
    }

    /// Every value given for `key`, in arrival order
    pub fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs.iter()
            .filter(move |&&(ref k, _)| k == key)
            .map(|&(_, ref v)| v.as_str())
    }
}

impl IntoIterator for FormParams {
    type Item = (String, String);
    type IntoIter = ::std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

impl<'a> IntoIterator for &'a FormParams {
    type Item = &'a (String, String);
    type IntoIter = slice::Iter<'a, (String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

/// Decodes a raw urlencoded payload.
///
/// Tokens are split on the raw `&` and `=` delimiters first and each side is
/// percent-decoded afterwards, so an encoded `%3D` never acts as a separator.
/// A token without `=` is a key with an empty value; empty tokens are
/// skipped.
pub fn decode(raw: &[u8]) -> FormParams {
    let mut params = FormParams::new();

    for token in raw.split(|&b| b == b'&') {
        if token.is_empty() {
            continue;
        }

        let (key, value) = match token.iter().position(|&b| b == b'=') {
            Some(i) => (&token[.. i], &token[i + 1 ..]),
            None => (token, &b""[..])
        };

        params.pairs.push((decode_component(key), decode_component(value)));
    }

    params
}

/// Percent-decodes a single key or value. `+` is a space; escapes that
/// aren't two hex digits are copied through untouched.
fn decode_component(raw: &[u8]) -> String {
    let mut buffer = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        match raw[i] {
            b'+' => {
                buffer.push(b' ');
                i += 1;
            },
            b'%' if i + 2 < raw.len() && is_hexit(raw[i + 1])
                && is_hexit(raw[i + 2]) => {
                buffer.push(from_hexit(raw[i + 1]) << 4 | from_hexit(raw[i + 2]));
                i += 3;
            },
            b => {
                buffer.push(b);
                i += 1;
            }
        }
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned()
    }
}
