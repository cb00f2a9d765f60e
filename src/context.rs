//! Per-request metadata handed to a handler
//!
//! A `RequestContext` is built once per request, before the handler starts,
//! and never changes afterwards. Everything a handler can learn about the
//! request is in here: the method, the body, and the metavariables the host
//! chose to expose.

use crate::errors::{Result, Error};
use crate::form::{self, FormParams};

use mime::Mime;

use std::cmp;
use std::fmt;
use std::io::{self, Read};
use std::slice;
use std::time::{Duration, Instant};

/// Request methods a handler is likely to care about
///
/// Anything else is kept verbatim in `Other`; an unusual method is the
/// handler's problem, not the host's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
    Other(String)
}

impl Method {
    pub fn parse(raw: &str) -> Method {
        match raw {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            other => Method::Other(String::from(other))
        }
    }

    pub fn as_str(&self) -> &str {
        match *self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Other(ref raw) => raw
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which metavariables a handler gets to see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExposurePolicy {
    /// Everything the transport offers
    All,
    /// Names starting with one of `prefixes`, or equal to one of `names`
    Filter {
        prefixes: Vec<String>,
        names: Vec<String>
    }
}

impl ExposurePolicy {
    pub fn allows(&self, name: &str) -> bool {
        match *self {
            ExposurePolicy::All => true,
            ExposurePolicy::Filter { ref prefixes, ref names } =>
                prefixes.iter().any(|p| name.starts_with(p.as_str())) ||
                names.iter().any(|n| n == name)
        }
    }
}

impl Default for ExposurePolicy {
    fn default() -> ExposurePolicy {
        ExposurePolicy::All
    }
}

/// Read-only, ordered view of the variables exposed to a handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: Vec<(String, String)>
}

impl Environment {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.iter()
            .find(|&&(ref n, _)| n == name)
            .map(|&(_, ref v)| v.as_str())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<(String, String)> {
        self.vars.iter()
    }

    fn push(&mut self, name: &str, value: &str) {
        if !self.contains(name) {
            self.vars.push((String::from(name), String::from(value)));
        }
    }
}

impl<'a> IntoIterator for &'a Environment {
    type Item = &'a (String, String);
    type IntoIter = slice::Iter<'a, (String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.vars.iter()
    }
}

/// Immutable snapshot of one request
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    content_type: Option<String>,
    content_length: usize,
    body: Vec<u8>,
    environment: Environment
}

impl RequestContext {
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_ref().map(String::as_str)
    }

    #[inline]
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[inline]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Decodes the body as form data, if it was declared as such
    pub fn form(&self) -> Option<FormParams> {
        let mime: Mime = match self.content_type() {
            Some(ct) => match ct.parse() {
                Ok(m) => m,
                Err(_) => return None
            },
            None => return None
        };

        if mime.essence_str() ==
            mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
            Some(form::decode(&self.body))
        }
        else {
            None
        }
    }
}

/// Everything the transport knows about a request before its body is read
#[derive(Debug)]
pub struct Inbound<R> {
    pub method: String,
    pub content_type: Option<String>,
    /// The `Content-Length` header exactly as received
    pub content_length: Option<String>,
    /// Candidate metavariables, in the order they should appear
    pub variables: Vec<(String, String)>,
    pub body: R
}

/// Builds `RequestContext`s under a fixed policy
#[derive(Debug, Clone, Default)]
pub struct Builder {
    exposure: ExposurePolicy,
    fixed: Vec<(String, String)>,
    max_body: Option<usize>,
    read_deadline: Option<Duration>
}

impl Builder {
    pub fn new(exposure: ExposurePolicy) -> Builder {
        Builder {
            exposure: exposure,
            fixed: Vec::new(),
            max_body: None,
            read_deadline: None
        }
    }

    /// Variables set for every request, whatever the exposure policy says
    pub fn fixed(mut self, vars: Vec<(String, String)>) -> Builder {
        self.fixed = vars;
        self
    }

    /// Refuse bodies declared longer than `limit` bytes
    pub fn max_body(mut self, limit: usize) -> Builder {
        self.max_body = Some(limit);
        self
    }

    /// Give up on the body if it hasn't fully arrived within `deadline`
    pub fn read_deadline(mut self, deadline: Duration) -> Builder {
        self.read_deadline = Some(deadline);
        self
    }

    /// Reads the whole body and assembles the context.
    ///
    /// Fails with `TruncatedBody` if fewer than the declared number of bytes
    /// show up before EOF, a read timeout, or the read deadline.
    pub fn build<R: Read>(&self, inbound: Inbound<R>) -> Result<RequestContext> {
        let Inbound { method, content_type, content_length, variables, body } =
            inbound;

        let declared = parse_content_length(
            content_length.as_ref().map(String::as_str)
        )?;

        if let Some(limit) = self.max_body {
            if declared > limit {
                return Err(Error::BodyTooLarge { declared: declared, limit: limit });
            }
        }

        let deadline = self.read_deadline.map(|d| Instant::now() + d);
        let body = read_body(body, declared, deadline)?;

        let method = Method::parse(&method);
        let mut environment = Environment::default();
        environment.push("REQUEST_METHOD", method.as_str());
        environment.push("CONTENT_LENGTH", &declared.to_string());
        if let Some(ref ct) = content_type {
            environment.push("CONTENT_TYPE", ct);
        }

        for &(ref name, ref value) in &self.fixed {
            environment.push(name, value);
        }

        for (name, value) in variables {
            if self.exposure.allows(&name) {
                environment.push(&name, &value);
            }
        }

        Ok(RequestContext {
            method: method,
            content_type: content_type,
            content_length: declared,
            body: body,
            environment: environment
        })
    }
}

/// Interprets a raw `Content-Length` header.
///
/// Missing or non-numeric values count as `0`; only a negative number is an
/// error.
pub fn parse_content_length(raw: Option<&str>) -> Result<usize> {
    let raw = match raw {
        Some(r) => r.trim(),
        None => return Ok(0)
    };

    if let Ok(n) = raw.parse::<usize>() {
        return Ok(n);
    }

    match raw.strip_prefix('-') {
        Some(digits) if digits.bytes().all(|b| b.is_ascii_digit())
            && digits.bytes().any(|b| b != b'0') =>
            Err(Error::InvalidLength(String::from(raw))),
        _ => Ok(0)
    }
}

fn read_body<R: Read>(mut source: R, declared: usize,
                      deadline: Option<Instant>) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(cmp::min(declared, 64 * 1024));
    let mut chunk = [0u8; 8192];

    while body.len() < declared {
        if deadline.map_or(false, |d| Instant::now() >= d) {
            break;
        }

        let wanted = cmp::min(chunk.len(), declared - body.len());
        match source.read(&mut chunk[.. wanted]) {
            Ok(0) => break,
            Ok(n) => body.extend_from_slice(&chunk[.. n]),
            Err(e) => match e.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => break,
                _ => return Err(Error::from(e))
            }
        }
    }

    if body.len() < declared {
        return Err(Error::TruncatedBody {
            declared: declared,
            received: body.len()
        });
    }

    Ok(body)
}

#[cfg(test)]
mod test {
    use super::*;

    use std::io::Cursor;
    use std::thread;

    fn inbound<'a>(method: &str, content_type: Option<&str>,
                   content_length: Option<&str>, body: &'a [u8])
                   -> Inbound<Cursor<&'a [u8]>> {
        Inbound {
            method: String::from(method),
            content_type: content_type.map(String::from),
            content_length: content_length.map(String::from),
            variables: vec![
                (String::from("HTTP_HOST"), String::from("localhost")),
                (String::from("PATH_INFO"), String::from("/extra")),
                (String::from("SERVER_PORT"), String::from("8080")),
                (String::from("REQUEST_METHOD"), String::from("FORGED"))
            ],
            body: Cursor::new(body)
        }
    }

    /// Hands out one byte per read, then times out
    struct Trickle {
        left: usize
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.left == 0 {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "slow client"));
            }
            self.left -= 1;
            buf[0] = b'x';
            Ok(1)
        }
    }

    /// Never runs dry, but takes its time about it
    struct Slow;

    impl Read for Slow {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(20));
            buf[0] = b'y';
            Ok(1)
        }
    }

    #[test]
    fn content_length_parsing_is_permissive() {
        assert_eq!(parse_content_length(None).unwrap(), 0);
        assert_eq!(parse_content_length(Some("")).unwrap(), 0);
        assert_eq!(parse_content_length(Some("abc")).unwrap(), 0);
        assert_eq!(parse_content_length(Some(" 12 ")).unwrap(), 12);
        assert_eq!(parse_content_length(Some("1.5")).unwrap(), 0);
        match parse_content_length(Some("-3")) {
            Err(Error::InvalidLength(raw)) => assert_eq!(raw, "-3"),
            other => panic!("{:?}", other)
        }
        match parse_content_length(Some("-99999999999999999999")) {
            Err(Error::InvalidLength(raw)) => assert_eq!(raw, "-99999999999999999999"),
            other => panic!("{:?}", other)
        }
        assert_eq!(parse_content_length(Some("-")).unwrap(), 0);
        assert_eq!(parse_content_length(Some("-0")).unwrap(), 0);
        assert_eq!(parse_content_length(Some("-1.5")).unwrap(), 0);
    }

    #[test]
    fn body_is_exactly_content_length() {
        let builder = Builder::default();
        let ctx = builder.build(inbound("POST", None, Some("5"),
                                        b"hello world")).unwrap();
        assert_eq!(ctx.body(), b"hello");
        assert_eq!(ctx.content_length(), 5);

        let ctx = builder.build(inbound("POST", None, Some("11"),
                                        b"hello world")).unwrap();
        assert_eq!(ctx.body(), b"hello world");
    }

    #[test]
    fn missing_length_means_no_body() {
        let ctx = Builder::default()
            .build(inbound("POST", None, None, b"ignored")).unwrap();
        assert!(ctx.body().is_empty());
        assert_eq!(ctx.environment().get("CONTENT_LENGTH"), Some("0"));
    }

    #[test]
    fn short_body_is_truncated() {
        match Builder::default().build(inbound("POST", None, Some("20"), b"short")) {
            Err(Error::TruncatedBody { declared: 20, received: 5 }) => (),
            other => panic!("{:?}", other)
        }
    }

    #[test]
    fn read_timeout_is_truncated() {
        let request = Inbound {
            method: String::from("POST"),
            content_type: None,
            content_length: Some(String::from("10")),
            variables: Vec::new(),
            body: Trickle { left: 3 }
        };
        match Builder::default().build(request) {
            Err(Error::TruncatedBody { declared: 10, received: 3 }) => (),
            other => panic!("{:?}", other)
        }
    }

    #[test]
    fn read_deadline_bounds_slow_clients() {
        let request = Inbound {
            method: String::from("POST"),
            content_type: None,
            content_length: Some(String::from("1000000")),
            variables: Vec::new(),
            body: Slow
        };
        let started = Instant::now();
        let result = Builder::default()
            .read_deadline(Duration::from_millis(100))
            .build(request);
        match result {
            Err(Error::TruncatedBody { declared: 1000000, .. }) => (),
            other => panic!("{:?}", other)
        }
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn oversized_body_is_refused_up_front() {
        match Builder::default().max_body(4)
            .build(inbound("POST", None, Some("5"), b"hello")) {
            Err(Error::BodyTooLarge { declared: 5, limit: 4 }) => (),
            other => panic!("{:?}", other)
        }
    }

    #[test]
    fn unknown_methods_are_kept_verbatim() {
        let ctx = Builder::default()
            .build(inbound("BREW", None, None, b"")).unwrap();
        assert_eq!(ctx.method(), &Method::Other(String::from("BREW")));
        assert_eq!(ctx.environment().get("REQUEST_METHOD"), Some("BREW"));

        assert_eq!(Method::parse("get"), Method::Other(String::from("get")));
        assert_eq!(Method::parse("POST"), Method::Post);
    }

    #[test]
    fn content_type_absence_differs_from_empty() {
        let builder = Builder::default();
        let ctx = builder.build(inbound("GET", None, None, b"")).unwrap();
        assert_eq!(ctx.content_type(), None);
        assert!(!ctx.environment().contains("CONTENT_TYPE"));

        let ctx = builder.build(inbound("GET", Some(""), None, b"")).unwrap();
        assert_eq!(ctx.content_type(), Some(""));
        assert_eq!(ctx.environment().get("CONTENT_TYPE"), Some(""));
    }

    #[test]
    fn exposure_policy_filters_variables() {
        let policy = ExposurePolicy::Filter {
            prefixes: vec![String::from("HTTP_"), String::from("REQUEST_"),
                           String::from("SERVER_")],
            names: Vec::new()
        };
        let ctx = Builder::new(policy)
            .build(inbound("GET", Some("text/plain"), None, b"")).unwrap();
        let env = ctx.environment();

        assert_eq!(env.get("HTTP_HOST"), Some("localhost"));
        assert_eq!(env.get("SERVER_PORT"), Some("8080"));
        assert_eq!(env.get("PATH_INFO"), None);
        // Mandatory variables survive the filter and can't be overridden
        assert_eq!(env.get("REQUEST_METHOD"), Some("GET"));
        assert_eq!(env.get("CONTENT_LENGTH"), Some("0"));
        assert_eq!(env.get("CONTENT_TYPE"), Some("text/plain"));

        let names: Vec<_> = env.iter().map(|&(ref n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["REQUEST_METHOD", "CONTENT_LENGTH",
                               "CONTENT_TYPE", "HTTP_HOST", "SERVER_PORT"]);
    }

    #[test]
    fn fixed_variables_bypass_the_policy() {
        let policy = ExposurePolicy::Filter {
            prefixes: vec![String::from("HTTP_")],
            names: Vec::new()
        };
        let ctx = Builder::new(policy)
            .fixed(vec![(String::from("PATH"), String::from("/usr/bin:/bin"))])
            .build(inbound("GET", None, None, b"")).unwrap();
        assert_eq!(ctx.environment().get("PATH"), Some("/usr/bin:/bin"));
        assert_eq!(ctx.environment().get("SERVER_PORT"), None);
    }

    #[test]
    fn exposure_policy_by_name() {
        let policy = ExposurePolicy::Filter {
            prefixes: Vec::new(),
            names: vec![String::from("PATH_INFO")]
        };
        assert!(policy.allows("PATH_INFO"));
        assert!(!policy.allows("PATH_INFO_X"));
        assert!(!policy.allows("HTTP_HOST"));
        assert!(ExposurePolicy::All.allows("anything"));
    }

    #[test]
    fn form_is_decoded_only_for_urlencoded_bodies() {
        let builder = Builder::default();
        let body = b"name=Testuser&email=test%40example.com";
        let len = body.len().to_string();

        let ctx = builder.build(inbound(
            "POST", Some("application/x-www-form-urlencoded; charset=utf-8"),
            Some(&len), body)).unwrap();
        let form = ctx.form().unwrap();
        assert_eq!(form.first("name"), Some("Testuser"));
        assert_eq!(form.first("email"), Some("test@example.com"));

        let ctx = builder.build(inbound("POST", Some("text/plain"),
                                        Some(&len), body)).unwrap();
        assert!(ctx.form().is_none());

        let ctx = builder.build(inbound("POST", None, Some(&len), body)).unwrap();
        assert!(ctx.form().is_none());
    }
}
