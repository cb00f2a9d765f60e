//! Process CGI/1.1 response documents
//!
//! A script answers with a block of header lines, a blank line, and then
//! the body. A few headers are special: `Status` carries the HTTP status,
//! `Location` asks for a redirect, and `Content-Type` describes the body.

pub mod parser;

/// A status line
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Status {
    pub code: u16,
    pub reason_phrase: Vec<u8>
}

/// Other headers
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Header {
    pub name: Vec<u8>,
    pub content: Vec<u8>
}

/// The header portion of a document
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct DocumentHeaders {
    pub content_type: Option<Vec<u8>>,
    pub status: Option<Status>,
    pub location: Option<Vec<u8>>,
    pub headers: Vec<Header>
}

impl DocumentHeaders {
    /// The HTTP status the document asks for.
    ///
    /// An explicit `Status` wins; a bare `Location` is a redirect; anything
    /// else is a plain 200.
    pub fn http_status(&self) -> (u16, Vec<u8>) {
        match self.status {
            Some(Status { code, ref reason_phrase }) =>
                (code, reason_phrase.clone()),
            None if self.location.is_some() =>
                (302, Vec::from(&b"Found"[..])),
            None => (200, Vec::from(&b"OK"[..]))
        }
    }
}

#[test]
fn bare_location_redirects() {
    let doc = DocumentHeaders {
        location: Some(Vec::from(&b"/elsewhere"[..])),
        ..Default::default()
    };
    assert_eq!(doc.http_status(), (302, Vec::from(&b"Found"[..])));

    let doc = DocumentHeaders {
        location: Some(Vec::from(&b"/elsewhere"[..])),
        status: Some(Status { code: 303, reason_phrase: Vec::from(&b"See Other"[..]) }),
        ..Default::default()
    };
    assert_eq!(doc.http_status(), (303, Vec::from(&b"See Other"[..])));

    assert_eq!(DocumentHeaders::default().http_status(),
               (200, Vec::from(&b"OK"[..])));
}
