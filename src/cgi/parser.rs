//! Parsers for CGI/1.1 responses
//!
//! These are streaming parsers: fed a prefix of a script's output they
//! answer `Incomplete` until the blank line ending the header block shows
//! up.

use crate::cgi::{Status, Header, DocumentHeaders};

use nom::bytes::complete::take_while_m_n;
use nom::bytes::streaming::{tag, take_till, take_while, take_while1};
use nom::character::complete::space0;
use nom::character::is_digit;
use nom::character::streaming::line_ending;
use nom::combinator::map_res;
use nom::error::{Error, ErrorKind};
use nom::multi::many0;
use nom::{Err, IResult};

use std::str::{self, FromStr};

/// `token` characters from RFC 7230, which is all a header name may contain
fn is_token(x: u8) -> bool {
    x.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&x)
}

fn cr_or_lf(x: u8) -> bool {
    x == b'\n' || x == b'\r'
}

fn lwsp(x: u8) -> bool {
    x == b' ' || x == b'\t'
}

/// A single `Name: content` line, including its line ending
pub fn header(input: &[u8]) -> IResult<&[u8], Header> {
    let (input, name) = take_while1(is_token)(input)?;
    let (input, _) = tag(":")(input)?;
    let (input, _) = take_while(lwsp)(input)?;
    let (input, content) = take_till(cr_or_lf)(input)?;
    let (input, _) = line_ending(input)?;

    Ok((input, Header { name: Vec::from(name), content: Vec::from(content) }))
}

/// The value of a `Status` header: three digits and a reason phrase
pub fn status(input: &[u8]) -> IResult<&[u8], Status> {
    let (input, code) = map_res(
        map_res(take_while_m_n(3, 3, is_digit), str::from_utf8),
        u16::from_str
    )(input)?;
    let (reason, _) = space0(input)?;

    Ok((&reason[reason.len() ..], Status {
        code: code,
        reason_phrase: Vec::from(reason)
    }))
}

/// The whole header block, up to and including the blank line
pub fn doc_headers(input: &[u8]) -> IResult<&[u8], DocumentHeaders> {
    let (rest, lines) = many0(header)(input)?;
    let (rest, _) = line_ending(rest)?;

    if lines.is_empty() {
        return Err(Err::Error(Error::new(input, ErrorKind::Verify)));
    }

    let mut doc = DocumentHeaders::default();
    for line in lines {
        if line.name.eq_ignore_ascii_case(b"Status") {
            match status(&line.content) {
                Ok((_, s)) => doc.status = Some(s),
                Err(_) => return Err(Err::Error(Error::new(input, ErrorKind::Digit)))
            }
        }
        else if line.name.eq_ignore_ascii_case(b"Location") {
            doc.location = Some(line.content);
        }
        else if line.name.eq_ignore_ascii_case(b"Content-Type") {
            doc.content_type = Some(line.content);
        }
        else {
            doc.headers.push(line);
        }
    }

    Ok((rest, doc))
}

#[test]
fn header_works() {
    let input: &[u8] = b"Foo: bar\r\n\r\n";
    let expected = Header {
        name: Vec::from(&b"Foo"[..]),
        content: Vec::from(&b"bar"[..])
    };

    match header(input) {
        Ok((rest, res)) => {
            assert_eq!(expected, res);
            assert_eq!(b"\r\n", rest);
        },
        other => panic!("{:?}", other)
    }
}

#[test]
fn header_empty() {
    match header(b"") {
        Err(Err::Incomplete(_)) => (),
        other => panic!("{:?}", other)
    }
}

#[test]
fn status_works() {
    let (_, s) = status(b"404 Not Found").unwrap();
    assert_eq!(s, Status { code: 404, reason_phrase: Vec::from(&b"Not Found"[..]) });

    let (_, s) = status(b"204").unwrap();
    assert_eq!(s, Status { code: 204, reason_phrase: Vec::new() });

    assert!(status(b"2x4 Nope").is_err());
    assert!(status(b"").is_err());
}

#[test]
fn doc_headers_lf_only() {
    let input: &[u8] = b"Content-Type: text/plain\nX-Thing:  yes\n\nbody";

    match doc_headers(input) {
        Ok((body, doc)) => {
            assert_eq!(body, b"body");
            assert_eq!(doc.content_type, Some(Vec::from(&b"text/plain"[..])));
            assert_eq!(doc.headers, vec![Header {
                name: Vec::from(&b"X-Thing"[..]),
                content: Vec::from(&b"yes"[..])
            }]);
        },
        other => panic!("{:?}", other)
    }
}

#[test]
fn doc_headers_as_ruby_puts_writes_them() {
    // `puts "Content-Type: text/html\r\n\r\n"` adds a newline of its own
    let input: &[u8] = b"Content-Type: text/html\r\n\r\n\n<!DOCTYPE html>";

    match doc_headers(input) {
        Ok((body, doc)) => {
            assert_eq!(body, b"\n<!DOCTYPE html>");
            assert_eq!(doc.content_type, Some(Vec::from(&b"text/html"[..])));
        },
        other => panic!("{:?}", other)
    }
}

#[test]
fn doc_headers_wants_more_input() {
    for input in &[&b"Content-Type: text/html"[..],
                   &b"Content-Type: text/html\r\n"[..],
                   &b"Content-Type: text/html\r\nStat"[..],
                   &b""[..]] {
        match doc_headers(input) {
            Err(Err::Incomplete(_)) => (),
            other => panic!("{:?}: {:?}", input, other)
        }
    }
}

#[test]
fn doc_headers_rejects_bodies_without_headers() {
    for input in &[&b"<!DOCTYPE html>\n<html>"[..],
                   &b"\r\n<html>"[..],
                   &b"Status: abc\r\n\r\n"[..]] {
        match doc_headers(input) {
            Err(Err::Error(_)) => (),
            other => panic!("{:?}: {:?}", input, other)
        }
    }
}

#[test]
fn doc_headers_on_captured_traffic() {
    let input: &[u8] = b"Status: 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nDate: Thu, 07 Apr 2016 20:42:43 GMT\r\nLocation: /guestbook\r\n\r\n<!DOCTYPE html>\n<html>\n  <head>\n    <title>Guestbook</title>\n  </head>\n</html>\n";

    let expected = DocumentHeaders {
        content_type: Some(Vec::from(&b"text/html; charset=utf-8"[..])),
        status: Some(Status {
            code: 200,
            reason_phrase: Vec::from(&b"OK"[..])
        }),
        location: Some(Vec::from(&b"/guestbook"[..])),
        headers: vec![
            Header {
                name: Vec::from(&b"Date"[..]),
                content: Vec::from(&b"Thu, 07 Apr 2016 20:42:43 GMT"[..])
            }
        ]
    };

    match doc_headers(input) {
        Ok((body, actual)) => {
            assert_eq!(expected, actual);
            assert!(body.starts_with(b"<!DOCTYPE html>"));
        },
        other => panic!("{:?}", other)
    }
}
