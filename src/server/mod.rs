//! Server functionality

mod gateway;
mod router;

use crate::config::Config;
use crate::errors::{Result, Error};
use crate::filesystem::normalize_path;
use crate::server::gateway::Gateway;
use crate::server::router::Router;

use std::collections::HashMap;
use std::collections::hash_map::{self, Entry};
use std::ffi::OsStr;
use std::fs::canonicalize;
use std::io::{self, Cursor, Read, Write, BufWriter, ErrorKind};
use std::marker::PhantomData;
use std::net::{Shutdown, TcpListener, TcpStream, SocketAddr};
use std::os::unix::ffi::OsStrExt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Largest request head (request line plus headers) we are willing to buffer
const MAX_HEAD_BYTES: usize = 16 * 1024;

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Binds the configured port and serves scripts from the CGI root.
///
/// Every connection gets a thread of its own and carries exactly one
/// request.
pub fn serve(mut config: Config) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", config.port))?;
    config.cgi.root = match canonicalize(&config.cgi.root) {
        Ok(root) => root,
        Err(e) => {
            error!("CGI root {:?} is unusable: {}", config.cgi.root, e);
            return Err(Error::Io(e));
        }
    };

    info!("Serving {:?} under {:?}", config.cgi.root, config.cgi.public_prefix);

    let router = Arc::new(build_router(&config));
    let read_timeout = config.limits.body_read_timeout;

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let router = Arc::clone(&router);
                thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, &router,
                                                      read_timeout) {
                        warn!("Error handling a connection: {}", e);
                    }
                });
            },
            Err(e) => {
                warn!("Failed connection: {}", e);
            }
        };
    }

    Ok(())
}

fn build_router(config: &Config) -> Router {
    let gateway = Gateway::new(config.clone());
    let prefix = config.cgi.public_prefix.clone();
    let mut router = Router::new();

    if config.cgi.allow_methods.is_empty() {
        router.route_any(prefix, gateway);
    }
    else {
        for method in &config.cgi.allow_methods {
            router.route(prefix.clone(), method.clone(), gateway.clone());
        }
    }

    router
}

fn handle_connection(stream: TcpStream, router: &Router,
                     read_timeout: Duration) -> Result<()> {
    stream.set_read_timeout(Some(read_timeout))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;

    let remote_addr = stream.peer_addr()?;
    let local_port = stream.local_addr()?.port();
    let response = Response::new(stream.try_clone()?);

    let closer = stream.try_clone()?;

    match Request::parse(stream, remote_addr, local_port) {
        Ok(req) => {
            router.serve(req, response);
            // A response left behind on a stuck write must not end cleanly
            // once that write returns
            let _ = closer.shutdown(Shutdown::Write);
            Ok(())
        },
        Err(Error::Parse(_)) |
        Err(Error::PathNotInOriginForm) |
        Err(Error::IllegalPercentEncoding) |
        Err(Error::HeadTooLarge) => {
            error_messages::error_400(response)?;
            Ok(())
        },
        Err(Error::RequestIncomplete) => {
            debug!("{} hung up before sending a request", remote_addr);
            Ok(())
        },
        Err(e) => Err(e)
    }
}

/// Values which can handle requests
pub trait Handler: Send + Sync {
    fn serve(&self, req: Request, res: Response<Fresh>);
}

impl<F> Handler for F where F: Fn(Request, Response<Fresh>) + Send + Sync {
    fn serve(&self, req: Request, res: Response<Fresh>) {
        self(req, res)
    }
}

/// An incoming request from the client
///
/// Reading from a `Request` yields the body; bytes the client sent along
/// with the head are not lost.
pub struct Request {
    method: String,
    target: String,
    path: Vec<u8>,
    query: String,
    headers: Headers,
    body: Box<dyn Read + Send>,
    pub remote_addr: SocketAddr,
    pub local_port: u16
}

struct Head {
    method: String,
    target: String,
    headers: Headers
}

impl Request {
    pub fn parse<R>(mut stream: R, remote_addr: SocketAddr, local_port: u16)
                    -> Result<Request>
        where R: Read + Send + 'static
    {
        let (head, leftover) = read_head(&mut stream)?;
        let (path, query) = split_target(&head.target);

        let mut normalized = vec![b'/'];
        normalized.append(&mut normalize_path(path.as_bytes())?);

        Ok(Request {
            method: head.method,
            path: normalized,
            query: String::from(query),
            target: head.target,
            headers: head.headers,
            body: Box::new(Cursor::new(leftover).chain(stream)),
            remote_addr: remote_addr,
            local_port: local_port
        })
    }

    /// The decoded request path, with duplicate slashes collapsed
    pub fn request_uri(&self) -> &OsStr {
        OsStr::from_bytes(self.path.as_slice())
    }

    /// The request target exactly as the client sent it
    #[inline]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Everything after the first `?`, still encoded
    #[inline]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}

impl Read for Request {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

/// Reads until a complete request head is buffered. Returns the head along
/// with whatever body bytes came in behind it.
fn read_head<R: Read>(source: &mut R) -> Result<(Head, Vec<u8>)> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        if let Some((head, consumed)) = parse_head(&buffer)? {
            return Ok((head, buffer.split_off(consumed)));
        }

        if buffer.len() > MAX_HEAD_BYTES {
            return Err(Error::HeadTooLarge);
        }

        let read = match source.read(&mut chunk) {
            Ok(0) => return Err(Error::RequestIncomplete),
            Ok(n) => n,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::from(e))
        };
        buffer.extend_from_slice(&chunk[.. read]);
    }
}

fn parse_head(buffer: &[u8]) -> Result<Option<(Head, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; 100];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(buffer)? {
        httparse::Status::Complete(consumed) => {
            let mut parsed = Headers::new();
            for header in req.headers.iter() {
                parsed.insert(header.name, Vec::from(header.value));
            }

            Ok(Some((Head {
                method: String::from(req.method.unwrap_or("")),
                target: String::from(req.path.unwrap_or("")),
                headers: parsed
            }, consumed)))
        },
        httparse::Status::Partial => Ok(None)
    }
}

/// Splits a request target into its path and query parts
fn split_target(target: &str) -> (&str, &str) {
    match target.find('?') {
        Some(i) => (&target[.. i], &target[i + 1 ..]),
        None => (target, "")
    }
}

#[test]
fn parse_request_basic() {
    let request: &[u8] = b"GET / HTTP/1.1\r\nHost: google.com\r\nUser-Agent: curl/7.47.1\r\nAccept: */*\r\n\r\n";

    let (head, consumed) = parse_head(request).unwrap().unwrap();

    assert_eq!(head.method, "GET");
    assert_eq!(head.target, "/");
    assert_eq!(consumed, request.len());
    assert_eq!(head.headers.get("host"), Some(&Vec::from(&b"google.com"[..])));
}

#[test]
fn parse_request_does_not_percent_decode() {
    let request: &[u8] = b"GET /%20 HTTP/1.1\r\n\r\n";

    let (head, _) = parse_head(request).unwrap().unwrap();

    assert_eq!(head.target, "/%20");
}

#[test]
fn parse_request_does_not_fail_on_illegal_percent_decoding() {
    let request: &[u8] = b"GET /bogus%zz HTTP/1.1\r\n\r\n";

    let (head, _) = parse_head(request).unwrap().unwrap();

    assert_eq!(head.target, "/bogus%zz");
}

#[test]
fn parse_request_fails_on_bad_bytes() {
    let request: &[u8] = b"GET /bogon\x01 HTTP/1.1\r\n\r\n";

    assert!(parse_head(request).is_err());
}

#[test]
fn parse_request_partial() {
    let request: &[u8] = b"GET / HTTP/1.1\r\nHost: goo";

    assert!(parse_head(request).unwrap().is_none());
}

#[test]
fn read_head_keeps_body_bytes() {
    let request: &[u8] = b"POST /x HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc";

    let (head, leftover) = read_head(&mut Cursor::new(request)).unwrap();

    assert_eq!(head.method, "POST");
    assert_eq!(leftover, b"abc");
}

#[test]
fn read_head_across_many_reads() {
    // Hands out one byte per read, like a very slow client
    struct Trickle(Cursor<&'static [u8]>);
    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[.. len])
        }
    }

    let mut source = Trickle(Cursor::new(&b"GET /slow HTTP/1.1\r\nHost: x\r\n\r\n"[..]));
    let (head, leftover) = read_head(&mut source).unwrap();

    assert_eq!(head.target, "/slow");
    assert!(leftover.is_empty());
}

#[test]
fn read_head_gives_up() {
    match read_head(&mut Cursor::new(&b"GET / HTTP/1.1\r\n"[..])) {
        Err(Error::RequestIncomplete) => (),
        Err(e) => panic!("{:?}", e),
        Ok(_) => panic!("parsed a truncated head")
    }

    let mut huge = Vec::from(&b"GET / HTTP/1.1\r\nX-Big: "[..]);
    huge.extend(std::iter::repeat(b'a').take(MAX_HEAD_BYTES * 2));
    match read_head(&mut Cursor::new(huge)) {
        Err(Error::HeadTooLarge) => (),
        Err(e) => panic!("{:?}", e),
        Ok(_) => panic!("buffered an oversized head")
    }
}

#[test]
fn split_target_query() {
    assert_eq!(split_target("/cgi-bin/a.py?x=1&y=2"), ("/cgi-bin/a.py", "x=1&y=2"));
    assert_eq!(split_target("/cgi-bin/a.py"), ("/cgi-bin/a.py", ""));
    assert_eq!(split_target("/a?b?c"), ("/a", "b?c"));
}

#[test]
fn request_is_normalized_and_reads_body() {
    let raw: &'static [u8] =
        b"POST //cgi-bin//echo%20me?q=%20 HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
    let mut req = Request::parse(Cursor::new(raw), "127.0.0.1:4000".parse().unwrap(),
                                 8080).unwrap();

    assert_eq!(req.request_uri(), OsStr::new("/cgi-bin/echo me"));
    assert_eq!(req.query(), "q=%20");
    assert_eq!(req.target(), "//cgi-bin//echo%20me?q=%20");

    let mut body = String::new();
    req.read_to_string(&mut body).unwrap();
    assert_eq!(body, "hello");
}

/// The response being constructed by a `Handler`
///
/// The type parameter represents where in the cycle this response is. When
/// `Status = Fresh`, nothing has been sent to the client, headers can be
/// modified, and if the entire response-body is available at once it’s
/// possible to write the response in one shot.
///
/// When `Status = Streaming`, headers have already been sent, and use of the
/// `io::Write` interface will buffer chunks (as in Transfer-Encoding: Chunked)
/// to be sent to the client as they become available.
pub struct Response<Status> {
    inner: InnerResponse,
    _status: PhantomData<Status>
}

/// A marker for `Response`, indicating nothing has been sent to the client
pub enum Fresh {}

/// A marker for `Response`, indicating headers have been sent and writes will
/// be sent in chunks
pub enum Streaming {}

struct InnerResponse {
    writer: BufWriter<Box<dyn Write + Send>>,
    buffer: Vec<u8>,
    status: ResponseStatus,
    headers: Headers,
    streaming: bool,
    /// Skip the last chunk on drop, so the client can tell the body is cut off
    aborted: bool
}

struct ResponseStatus {
    code: u16,
    reason: String
}

/// A map of HTTP headers
///
/// This is just a newtype wrapper around a `HashMap<String, Vec<u8>>`, but
/// the keys are case-normalized on input. The first word, and any words after
/// a hyphen, are capitalized, with all other letters lowercased.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    map: HashMap<String, Vec<u8>>
}

fn normalize_header_name(name: &str) -> String {
    let lowercased = name.to_ascii_lowercase();
    let mut lower_chars = lowercased.chars();

    let mut normalized = String::with_capacity(lowercased.len());
    if let Some(ch) = lower_chars.next() {
        normalized.push(ch.to_ascii_uppercase());
    }
    else {
        return normalized;
    }

    let mut after_hyphen = false;
    for ch in lower_chars {
        if ch == '-' {
            after_hyphen = true;
            normalized.push(ch);
        }
        else if after_hyphen {
            normalized.push(ch.to_ascii_uppercase());
            after_hyphen = false;
        }
        else {
            normalized.push(ch);
        }
    }

    normalized
}

#[test]
fn normalize_content_type() {
    let expected = "Content-Type";
    assert_eq!(expected, &normalize_header_name("Content-Type"));
    assert_eq!(expected, &normalize_header_name("content-type"));
    assert_eq!(expected, &normalize_header_name("CONTENT-TYPE"));
    assert_eq!(expected, &normalize_header_name("cOnTeNt-TyPe"));
}

impl Headers {
    pub fn new() -> Headers {
        Headers {
            map: HashMap::new()
        }
    }

    /// Adds a header; repeated names are folded into one comma-separated
    /// value
    pub fn insert(&mut self, key: &str, mut value: Vec<u8>) {
        match self.map.entry(normalize_header_name(key)) {
            Entry::Vacant(e) => { e.insert(value); },
            Entry::Occupied(mut e) => {
                let entry = e.get_mut();
                entry.reserve(value.len() + 1);
                entry.push(b',');
                entry.append(&mut value);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Vec<u8>> {
        self.map.get(&normalize_header_name(key))
    }
}

#[test]
fn headers_fold_repeats() {
    let mut headers = Headers::new();
    headers.insert("accept", Vec::from(&b"text/html"[..]));
    headers.insert("ACCEPT", Vec::from(&b"text/plain"[..]));
    assert_eq!(headers.get("Accept"), Some(&Vec::from(&b"text/html,text/plain"[..])));
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a String, &'a Vec<u8>);
    type IntoIter = hash_map::Iter<'a, String, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter()
    }
}

impl Response<Fresh> {
    pub fn new<W: Write + Send + 'static>(stream: W) -> Self {
        let stream: Box<dyn Write + Send> = Box::new(stream);
        let mut headers = Headers::new();
        headers.insert("Connection", Vec::from(&b"close"[..]));

        Response {
            inner: InnerResponse {
                writer: BufWriter::new(stream),
                buffer: Vec::new(),
                status: ResponseStatus {
                    code: 200,
                    reason: String::from("OK")
                },
                headers: headers,
                streaming: false,
                aborted: false
            },
            _status: PhantomData
        }
    }

    pub fn of_stream<R: Read>(mut self, mut stream: R) -> io::Result<()> {
        self.inner.write_headers()?;
        io::copy(&mut stream, &mut self.inner.writer)?;
        self.inner.writer.flush()
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.inner.headers
    }

    pub fn set_status(&mut self, code: u16, reason: String) {
        self.inner.status = ResponseStatus {
            code: code,
            reason: reason
        };
    }

    pub fn start(mut self) -> io::Result<Response<Streaming>> {
        self.inner.headers.insert("Transfer-Encoding",
                                  Vec::from(&b"chunked"[..]));

        self.inner.write_headers()?;
        self.inner.writer.flush()?;
        self.inner.buffer = Vec::with_capacity(4096);
        self.inner.streaming = true;

        Ok(Response {
            inner: self.inner,
            _status: PhantomData
        })
    }
}

impl InnerResponse {
    fn write_headers(&mut self) -> io::Result<()> {
        // Status line
        write!(self.writer, "HTTP/1.1 {} {}\r\n",
               self.status.code, self.status.reason)?;

        for (header, content) in &self.headers {
            write!(self.writer, "{}: ", header)?;
            self.writer.write_all(content)?;
            self.writer.write_all(b"\r\n")?;
        }

        self.writer.write_all(b"\r\n")
    }

    /// Writes a single chunk in the chunked transfer-encoding, clearing out
    /// all buffers.
    fn write_chunk(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        write_chunk_raw(&mut self.writer, self.buffer.as_slice())?;
        self.buffer.clear();
        Ok(())
    }
}

impl Response<Streaming> {
    /// Ends the response without the terminating chunk.
    ///
    /// Whatever is buffered still goes out, but the client sees a body that
    /// never finished.
    pub fn abort(mut self) {
        self.inner.aborted = true;
    }
}

fn write_chunk_raw<W: Write>(sink: &mut W, chunk_content: &[u8])
                             -> io::Result<()>
{
    write!(sink, "{:x}\r\n", chunk_content.len())?;
    sink.write_all(chunk_content)?;
    sink.write_all(b"\r\n")?;
    sink.flush()
}

impl Write for Response<Streaming> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let inner = &mut self.inner;
        let buffer_cap_remaining = inner.buffer.capacity() - inner.buffer.len();

        if buf.len() > buffer_cap_remaining {
            if buf.len() > inner.buffer.capacity() {
                inner.write_chunk()?;
                write_chunk_raw(&mut inner.writer, buf)?;
            }
            else {
                inner.buffer.extend_from_slice(&buf[.. buffer_cap_remaining]);
                inner.write_chunk()?;
                inner.buffer.extend_from_slice(&buf[buffer_cap_remaining ..]);
            }
        }
        else {
            inner.buffer.extend_from_slice(buf);
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.write_chunk()
    }
}

impl Drop for InnerResponse {
    fn drop(&mut self) {
        if self.streaming {
            let _ = self.write_chunk();
            if !self.aborted {
                let _ = self.writer.write_all(b"0\r\n\r\n"); // last chunk
            }
        }
        let _ = self.writer.flush();
    }
}

pub mod error_messages {
    use super::Response;
    use super::Fresh;

    use std::io;

    fn page(mut res: Response<Fresh>, code: u16, reason: &str,
            body: &'static [u8]) -> io::Result<()> {
        res.set_status(code, String::from(reason));
        {
            let headers = res.headers_mut();
            headers.insert("Content-Type", Vec::from(&b"text/html"[..]));
            headers.insert("Content-Length", body.len().to_string().into_bytes());
        }

        res.of_stream(body)
    }

    pub fn error_504(res: Response<Fresh>) -> io::Result<()> {
        page(res, 504, "Gateway Timeout", ERROR_504)
    }

    const ERROR_504: &'static [u8] = b"<!doctype html><html><head><title>Error</title></head><body><h1>Gateway Timeout</h1><p>The script took too long to answer and was stopped.</p></body></html>";

    pub fn error_502(res: Response<Fresh>) -> io::Result<()> {
        page(res, 502, "Bad Gateway", ERROR_502)
    }

    const ERROR_502: &'static [u8] = b"<!doctype html><html><head><title>Error</title></head><body><h1>Bad Gateway</h1><p>The script failed before it produced a response.</p></body></html>";

    pub fn error_500(res: Response<Fresh>) -> io::Result<()> {
        page(res, 500, "Internal Error", ERROR_500)
    }

    const ERROR_500: &'static [u8] = b"<!doctype html><html><head><title>Error</title></head><body><h1>Internal Error</h1><p>Something went wrong on my side.</p><p>There's nothing you can do; maybe come back later.</p></body></html>";

    pub fn error_413(res: Response<Fresh>) -> io::Result<()> {
        page(res, 413, "Payload Too Large", ERROR_413)
    }

    const ERROR_413: &'static [u8] = b"<!doctype html><html><head><title>Error</title></head><body><h1>Payload Too Large</h1><p>That request body is bigger than I'm willing to read.</p></body></html>";

    pub fn error_405(res: Response<Fresh>) -> io::Result<()> {
        page(res, 405, "Method Not Allowed", ERROR_405)
    }

    const ERROR_405: &'static [u8] = b"<!doctype html><html><head><title>Error</title></head><body><h1>Method Not Allowed</h1><p>These scripts can't be called with that method. Sorry about that.</p></body></html>";

    pub fn error_404(res: Response<Fresh>) -> io::Result<()> {
        page(res, 404, "Not Found", ERROR_404)
    }

    const ERROR_404: &'static [u8] = b"<!doctype html><html><head><title>Error</title></head><body><h1>Not Found</h1><p>I couldn't find that script. Sorry.</p></body></html>";

    pub fn error_403(res: Response<Fresh>) -> io::Result<()> {
        page(res, 403, "Forbidden", ERROR_403)
    }

    const ERROR_403: &'static [u8] = b"<!doctype html><html><head><title>Error</title></head><body><h1>Forbidden</h1><p>You don't have permission to run that. Sorry.</p></body></html>";

    pub fn error_400(res: Response<Fresh>) -> io::Result<()> {
        page(res, 400, "Bad Request", ERROR_400)
    }

    const ERROR_400: &'static [u8] = b"<!doctype html><html><head><title>Error</title></head><body><h1>Bad Request</h1><p>Your request had some kind of bad syntax. Are you using netcat?</p></body></html>";
}

/// A `Write` that can be cloned and inspected after a `Response` is done
/// with it
#[cfg(test)]
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuf {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Splits a raw response into head and body, undoing chunked encoding
#[cfg(test)]
pub fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let end = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
    let head = String::from_utf8(raw[.. end].to_vec()).unwrap();
    let mut rest = &raw[end + 4 ..];

    if !head.contains("Transfer-Encoding: chunked") {
        return (head, rest.to_vec());
    }

    let mut body = Vec::new();
    while let Some(line_end) = rest.windows(2).position(|w| w == b"\r\n") {
        let size = std::str::from_utf8(&rest[.. line_end]).unwrap();
        let size = usize::from_str_radix(size, 16).unwrap();
        if size == 0 {
            break;
        }
        body.extend_from_slice(&rest[line_end + 2 .. line_end + 2 + size]);
        rest = &rest[line_end + 2 + size + 2 ..];
    }

    (head, body)
}

#[test]
fn error_pages_have_matching_lengths() {
    let sink = SharedBuf::default();
    error_messages::error_404(Response::new(sink.clone())).unwrap();

    let (head, body) = split_response(&sink.contents());
    assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(head.contains(&format!("Content-Length: {}", body.len())));
    assert!(head.contains("Connection: close"));
}

#[test]
fn streaming_response_is_chunked() {
    let sink = SharedBuf::default();
    {
        let mut res = Response::new(sink.clone()).start().unwrap();
        res.write_all(b"hello, ").unwrap();
        res.flush().unwrap();
        res.write_all(b"world").unwrap();
    }

    let raw = sink.contents();
    assert!(raw.ends_with(b"7\r\nhello, \r\n5\r\nworld\r\n0\r\n\r\n"));

    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"hello, world");
}

#[test]
fn started_response_sends_its_head_at_once() {
    let sink = SharedBuf::default();
    let res = Response::new(sink.clone()).start().unwrap();

    let raw = sink.contents();
    assert!(raw.starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert!(raw.ends_with(b"\r\n\r\n"));
    drop(res);
    assert!(sink.contents().ends_with(b"\r\n\r\n0\r\n\r\n"));
}

#[test]
fn aborted_response_has_no_last_chunk() {
    let sink = SharedBuf::default();
    let mut res = Response::new(sink.clone()).start().unwrap();
    res.write_all(b"partial").unwrap();
    res.abort();

    let raw = sink.contents();
    assert!(raw.ends_with(b"7\r\npartial\r\n"));
}

#[test]
fn big_writes_skip_the_buffer() {
    let sink = SharedBuf::default();
    {
        let mut res = Response::new(sink.clone()).start().unwrap();
        res.write_all(&[b'x'; 5000]).unwrap();
    }

    let (_, body) = split_response(&sink.contents());
    assert_eq!(body.len(), 5000);
}
