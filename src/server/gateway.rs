//! Runs CGI scripts on behalf of HTTP requests
//!
//! The gateway maps the request path onto a script under the CGI root,
//! builds the request context, and hands both to the supervisor. The
//! script's output is parsed as a CGI document; once its header block is
//! complete the rest is streamed to the client in chunks.

use crate::cgi::{Header, DocumentHeaders};
use crate::cgi::parser::doc_headers;
use crate::config::Config;
use crate::context::{self, Inbound};
use crate::errors::{Result, Error};
use crate::filesystem::{resolve_script, ResolvedScript};
use crate::invoker::Script;
use crate::server::{Handler, Headers, Request, Response, Fresh, Streaming};
use crate::server::error_messages::*;
use crate::supervisor::{Control, FailureKind, InvocationResult, KillReason,
                        Supervisor};

use std::ffi::OsStr;
use std::io::{self, Write};
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// How much script output may precede the end of its header block
const MAX_HEADER_BYTES: usize = 16 * 1024;

const SERVER_SOFTWARE: &'static str = concat!("cgi-host/", env!("CARGO_PKG_VERSION"));

/// Request headers that don't become `HTTP_*` metavariables
const SKIPPED_HEADERS: [&'static str; 3] = ["Content-Type", "Content-Length", "Proxy"];

/// Headers the script doesn't get to set, since they describe our framing
const FRAMING_HEADERS: [&'static str; 3] =
    ["Connection", "Content-Length", "Transfer-Encoding"];

#[derive(Clone)]
pub struct Gateway {
    config: Config,
    builder: context::Builder,
    supervisor: Supervisor
}

impl Gateway {
    /// `config.cgi.root` is expected to be canonical already
    pub fn new(config: Config) -> Gateway {
        Gateway {
            builder: config.context_builder(),
            supervisor: Supervisor::new(config.limits.supervisor_limits()),
            config: config
        }
    }

    fn serve_inner(&self, mut req: Request, res: Response<Fresh>) -> Result<()> {
        let relative = match Path::new(req.request_uri())
            .strip_prefix(&self.config.cgi.public_prefix) {
            Ok(r) => Vec::from(r.as_os_str().as_bytes()),
            Err(_) => return refuse(res, Error::NotFound)
        };

        let script = match resolve_script(&self.config.cgi.root, &relative) {
            Ok(s) => s,
            Err(e) => {
                info!("No script for {:?}: {}", req.request_uri(), e);
                return refuse(res, e);
            }
        };

        let inbound = Inbound {
            method: String::from(req.method()),
            content_type: header_string(req.headers(), "Content-Type"),
            content_length: header_string(req.headers(), "Content-Length"),
            variables: self.metavariables(&req, &script),
            body: &mut req
        };

        let ctx = match self.builder.build(inbound) {
            Ok(c) => c,
            Err(e) => {
                warn!("Rejecting request for {:?}: {}", script.script_name, e);
                return refuse(res, e);
            }
        };

        let mut handler = Script::new(&script.path);
        if let Some(interpreter) = self.config.cgi.interpreter_for(&script.path) {
            handler = handler.interpreter(interpreter);
        }

        let control = Control::new();
        let outcome = self.supervisor.run(&handler, &ctx, CgiResponse::new(res),
                                          &control);

        match outcome.result {
            InvocationResult::Completed { .. } =>
                info!("{} {:?}: {}, {} bytes", ctx.method(), script.script_name,
                      outcome.result, outcome.output_bytes),
            _ =>
                warn!("{} {:?}: {}, {} bytes", ctx.method(), script.script_name,
                      outcome.result, outcome.output_bytes)
        }

        match outcome.sink {
            Some(sink) => sink.finish(&outcome.result)?,
            None => info!("Client for {:?} stopped reading, abandoning the response",
                          script.script_name)
        }
        Ok(())
    }

    /// The CGI/1.1 metavariables for `req`, minus the ones the context
    /// builder derives itself
    fn metavariables(&self, req: &Request, script: &ResolvedScript)
                     -> Vec<(String, String)> {
        let lossy = |b: &[u8]| String::from_utf8_lossy(b).into_owned();
        let remote_addr = req.remote_addr.ip().to_string();
        let server_name = req.headers().get("Host")
            .map(|host| lossy(host.as_slice()))
            .map(|host| match host.rfind(':') {
                Some(i) if !host.ends_with(']') => String::from(&host[.. i]),
                _ => host
            })
            .unwrap_or_default();

        let mut metavars = Vec::new();
        let mut push = |name: &str, value: String| {
            metavars.push((String::from(name), value));
        };

        push("GATEWAY_INTERFACE", String::from("CGI/1.1"));
        push("SERVER_SOFTWARE", String::from(SERVER_SOFTWARE));
        push("SERVER_PROTOCOL", String::from("HTTP/1.1"));
        push("SERVER_NAME", server_name);
        push("SERVER_PORT", req.local_port.to_string());
        push("REQUEST_URI", String::from(req.target()));
        push("SCRIPT_NAME", lossy(self.config.cgi.public_prefix
                                  .join(&script.script_name)
                                  .as_os_str().as_bytes()));
        push("SCRIPT_FILENAME", lossy(script.path.as_os_str().as_bytes()));
        push("PATH_INFO", lossy(&script.path_info[..]));
        if !script.path_info.is_empty() {
            let translated = self.config.cgi.root
                .join(OsStr::from_bytes(&script.path_info[1 ..]));
            push("PATH_TRANSLATED", lossy(translated.as_os_str().as_bytes()));
        }
        push("QUERY_STRING", String::from(req.query()));
        push("REMOTE_ADDR", remote_addr.clone());
        push("REMOTE_HOST", remote_addr);
        push("REDIRECT_STATUS", String::from("200"));

        // Content-Type and Content-Length travel as CONTENT_TYPE and
        // CONTENT_LENGTH. Proxy must never become HTTP_PROXY (httpoxy).
        let mut headers: Vec<_> = req.headers().into_iter()
            .filter(|&(name, _)| !SKIPPED_HEADERS.contains(&name.as_str()))
            .map(|(name, value)|
                 (format!("HTTP_{}", name.replace("-", "_").to_ascii_uppercase()),
                  lossy(value.as_slice())))
            .collect();
        headers.sort();
        metavars.extend(headers);

        metavars
    }
}

impl Handler for Gateway {
    fn serve(&self, req: Request, res: Response<Fresh>) {
        if let Err(e) = self.serve_inner(req, res) {
            warn!("Error serving CGI: {}", e);
        }
    }
}

fn header_string(headers: &Headers, name: &str) -> Option<String> {
    headers.get(name).map(|v| String::from_utf8_lossy(v).into_owned())
}

/// Answers with the error page matching a request that never reached a
/// script
fn refuse(res: Response<Fresh>, e: Error) -> Result<()> {
    match e {
        Error::NotFound => error_404(res)?,
        Error::PermissionDenied => error_403(res)?,
        Error::TruncatedBody { .. } | Error::InvalidLength(_) => error_400(res)?,
        Error::BodyTooLarge { .. } => error_413(res)?,
        other => {
            error_500(res)?;
            return Err(other);
        }
    }
    Ok(())
}

enum Phase {
    /// Collecting output until the header block is complete
    Head(Response<Fresh>, Vec<u8>),
    Body(Response<Streaming>),
    Done
}

/// Where a script's output goes: a CGI document turned into an HTTP response
pub struct CgiResponse {
    phase: Phase
}

impl CgiResponse {
    pub fn new(res: Response<Fresh>) -> CgiResponse {
        CgiResponse { phase: Phase::Head(res, Vec::new()) }
    }

    /// Ends the response according to how the script ended.
    ///
    /// Before the header block was complete, a failure or kill turns into an
    /// error page; a cancel means the client is gone and gets nothing. After
    /// that only a kill leaves its mark: the body is cut off without its last
    /// chunk.
    pub fn finish(mut self, result: &InvocationResult) -> io::Result<()> {
        match mem::replace(&mut self.phase, Phase::Done) {
            Phase::Head(res, buffer) => match *result {
                InvocationResult::Completed { .. } => {
                    if !buffer.is_empty() {
                        warn!("Script output ended inside its header block");
                    }
                    self.phase = Phase::Head(res, buffer);
                    self.start(None, 0)
                },
                InvocationResult::Failed { kind: FailureKind::Spawn, .. } =>
                    error_500(res),
                InvocationResult::Failed { .. } => error_502(res),
                InvocationResult::Killed { reason: KillReason::Timeout } =>
                    error_504(res),
                InvocationResult::Killed {
                    reason: KillReason::OutputLimitExceeded
                } => error_502(res),
                InvocationResult::Killed {
                    reason: KillReason::ExternalCancel
                } => Ok(())
            },
            Phase::Body(res) => {
                if let InvocationResult::Killed { .. } = *result {
                    res.abort();
                }
                Ok(())
            },
            Phase::Done => Ok(())
        }
    }

    /// Looks for a complete header block in what has been collected so far
    fn try_start(&mut self) -> io::Result<()> {
        let parsed = match self.phase {
            Phase::Head(_, ref buffer) => match doc_headers(buffer) {
                Ok((body, doc)) => Some((Some(doc), buffer.len() - body.len())),
                Err(nom::Err::Incomplete(_)) if buffer.len() <= MAX_HEADER_BYTES =>
                    None,
                Err(nom::Err::Incomplete(_)) => {
                    warn!("Script header block is over {} bytes, serving it as the body",
                          MAX_HEADER_BYTES);
                    Some((None, 0))
                },
                Err(_) => {
                    warn!("Script output has no header block, serving it as text/html");
                    Some((None, 0))
                }
            },
            _ => None
        };

        match parsed {
            Some((doc, consumed)) => self.start(doc, consumed),
            None => Ok(())
        }
    }

    /// Sends the HTTP headers, then everything collected past the header
    /// block
    fn start(&mut self, doc: Option<DocumentHeaders>, consumed: usize)
             -> io::Result<()> {
        let (mut res, buffer) = match mem::replace(&mut self.phase, Phase::Done) {
            Phase::Head(res, buffer) => (res, buffer),
            other => {
                self.phase = other;
                return Ok(());
            }
        };

        apply_document(&mut res, doc);

        let mut res = res.start()?;
        res.write_all(&buffer[consumed ..])?;
        self.phase = Phase::Body(res);
        Ok(())
    }
}

fn apply_document(res: &mut Response<Fresh>, doc: Option<DocumentHeaders>) {
    let doc = match doc {
        Some(d) => d,
        None => {
            res.headers_mut().insert("Content-Type", Vec::from(&b"text/html"[..]));
            return;
        }
    };

    let (code, reason) = doc.http_status();
    res.set_status(code, String::from_utf8_lossy(&reason).into_owned());

    let DocumentHeaders { content_type, location, headers, .. } = doc;
    if let Some(content_type) = content_type {
        res.headers_mut().insert("Content-Type", content_type);
    }
    if let Some(location) = location {
        res.headers_mut().insert("Location", location);
    }

    for Header { name, content } in headers {
        let name = String::from_utf8_lossy(&name).into_owned();
        if FRAMING_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            debug!("Dropping {} header set by script", name);
            continue;
        }
        res.headers_mut().insert(&name, content);
    }
}

impl Write for CgiResponse {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.phase {
            Phase::Body(ref mut res) => return res.write(buf),
            Phase::Head(_, ref mut buffer) => buffer.extend_from_slice(buf),
            Phase::Done => return Ok(buf.len())
        }

        self.try_start()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.phase {
            Phase::Body(ref mut res) => res.flush(),
            _ => Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::server::{split_response, SharedBuf};

    use std::fs;
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn scripts(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for &(name, body) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, body).unwrap();
        }
        dir
    }

    fn config(root: &TempDir) -> Config {
        let mut config = Config::default();
        config.cgi.root = fs::canonicalize(root.path()).unwrap();
        config.cgi.interpreters = vec![(String::from(".sh"), PathBuf::from("/bin/sh"))];
        config.limits.timeout = Duration::from_secs(5);
        config.limits.kill_grace = Duration::from_millis(100);
        config
    }

    fn exchange(gateway: &Gateway, raw: &'static [u8]) -> (String, Vec<u8>, Vec<u8>) {
        let sink = SharedBuf::default();
        let req = Request::parse(Cursor::new(raw), "10.0.0.7:41000".parse().unwrap(),
                                 8080).unwrap();
        gateway.serve(req, Response::new(sink.clone()));

        let raw = sink.contents();
        let (head, body) = split_response(&raw);
        (head, body, raw)
    }

    #[test]
    fn script_output_streams_through() {
        let root = scripts(&[("hello.sh",
            "printf 'Content-Type: text/plain\\r\\nX-Greeting: hi\\r\\n\\r\\n'\n\
             printf 'hello %s' \"$QUERY_STRING\"\n")]);
        let gateway = Gateway::new(config(&root));

        let (head, body, raw) = exchange(&gateway,
            b"GET /cgi-bin/hello.sh?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n");

        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{}", head);
        assert!(head.contains("Content-Type: text/plain"));
        assert!(head.contains("X-Greeting: hi"));
        assert!(head.contains("Transfer-Encoding: chunked"));
        assert_eq!(body, b"hello x=1");
        assert!(raw.ends_with(b"0\r\n\r\n"));
    }

    #[test]
    fn metavariables_reach_the_script() {
        let root = scripts(&[("env.sh",
            "printf 'Content-Type: text/plain\\r\\n\\r\\n'\n\
             printf '%s|%s|%s|%s|%s|%s' \"$SCRIPT_NAME\" \"$PATH_INFO\" \
             \"$SERVER_NAME\" \"$HTTP_X_TOKEN\" \"$REMOTE_ADDR\" \"$GATEWAY_INTERFACE\"\n")]);
        let gateway = Gateway::new(config(&root));

        let (_, body, _) = exchange(&gateway,
            b"GET /cgi-bin/env.sh/extra/bits HTTP/1.1\r\nHost: example.org:8080\r\nX-Token: abc\r\n\r\n");

        assert_eq!(String::from_utf8(body).unwrap(),
                   "/cgi-bin/env.sh|/extra/bits|example.org|abc|10.0.0.7|CGI/1.1");
    }

    #[test]
    fn proxy_header_is_not_exposed() {
        let root = scripts(&[("proxy.sh",
            "printf 'Content-Type: text/plain\\r\\n\\r\\n%s' \"${HTTP_PROXY:-unset}\"\n")]);
        let gateway = Gateway::new(config(&root));

        let (_, body, _) = exchange(&gateway,
            b"GET /cgi-bin/proxy.sh HTTP/1.1\r\nProxy: http://evil.example:3128\r\n\r\n");

        assert_eq!(body, b"unset");
    }

    #[test]
    fn post_body_reaches_the_script() {
        let root = scripts(&[("post.sh",
            "IFS= read -r line\n\
             printf 'Content-Type: text/plain\\r\\n\\r\\n%s|%s|%s' \
             \"$CONTENT_LENGTH\" \"$CONTENT_TYPE\" \"$line\"\n")]);
        let gateway = Gateway::new(config(&root));

        let (_, body, _) = exchange(&gateway,
            b"POST /cgi-bin/post.sh HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 10\r\n\r\nname=x&y=2");

        assert_eq!(String::from_utf8(body).unwrap(),
                   "10|application/x-www-form-urlencoded|name=x&y=2");
    }

    #[test]
    fn status_and_location_are_honoured() {
        let root = scripts(&[
            ("gone.sh", "printf 'Status: 410 Gone\\r\\nContent-Type: text/plain\\r\\n\\r\\nbye'\n"),
            ("moved.sh", "printf 'Location: /elsewhere\\n\\n'\n")
        ]);
        let gateway = Gateway::new(config(&root));

        let (head, body, _) = exchange(&gateway, b"GET /cgi-bin/gone.sh HTTP/1.1\r\n\r\n");
        assert!(head.starts_with("HTTP/1.1 410 Gone\r\n"), "{}", head);
        assert_eq!(body, b"bye");

        let (head, _, _) = exchange(&gateway, b"GET /cgi-bin/moved.sh HTTP/1.1\r\n\r\n");
        assert!(head.starts_with("HTTP/1.1 302 Found\r\n"), "{}", head);
        assert!(head.contains("Location: /elsewhere"));
    }

    #[test]
    fn output_without_headers_is_html() {
        let root = scripts(&[("bare.sh", "printf '<p>no headers</p>'\n")]);
        let gateway = Gateway::new(config(&root));

        let (head, body, _) = exchange(&gateway, b"GET /cgi-bin/bare.sh HTTP/1.1\r\n\r\n");
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{}", head);
        assert!(head.contains("Content-Type: text/html"));
        assert_eq!(body, b"<p>no headers</p>");
    }

    #[test]
    fn failing_script_is_a_bad_gateway() {
        let root = scripts(&[("fail.sh", "echo 'something broke' >&2\nexit 3\n")]);
        let gateway = Gateway::new(config(&root));

        let (head, _, _) = exchange(&gateway, b"GET /cgi-bin/fail.sh HTTP/1.1\r\n\r\n");
        assert!(head.starts_with("HTTP/1.1 502 Bad Gateway\r\n"), "{}", head);
    }

    #[test]
    fn failure_after_headers_still_ends_the_stream() {
        let root = scripts(&[("half.sh",
            "printf 'Content-Type: text/plain\\r\\n\\r\\npartial'\nexit 1\n")]);
        let gateway = Gateway::new(config(&root));

        let (head, body, raw) = exchange(&gateway, b"GET /cgi-bin/half.sh HTTP/1.1\r\n\r\n");
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(body, b"partial");
        assert!(raw.ends_with(b"0\r\n\r\n"));
    }

    #[test]
    fn silent_slow_script_times_out() {
        let root = scripts(&[("slow.sh", "while :; do :; done\n")]);
        let mut config = config(&root);
        config.limits.timeout = Duration::from_millis(200);
        let gateway = Gateway::new(config);

        let (head, _, _) = exchange(&gateway, b"GET /cgi-bin/slow.sh HTTP/1.1\r\n\r\n");
        assert!(head.starts_with("HTTP/1.1 504 Gateway Timeout\r\n"), "{}", head);
    }

    #[test]
    fn timeout_after_headers_cuts_the_body() {
        let root = scripts(&[("stall.sh",
            "printf 'Content-Type: text/plain\\r\\n\\r\\nstarted'\nwhile :; do :; done\n")]);
        let mut config = config(&root);
        config.limits.timeout = Duration::from_millis(200);
        let gateway = Gateway::new(config);

        let sink = SharedBuf::default();
        let req = Request::parse(Cursor::new(&b"GET /cgi-bin/stall.sh HTTP/1.1\r\n\r\n"[..]),
                                 "10.0.0.7:41000".parse().unwrap(), 8080).unwrap();
        gateway.serve(req, Response::new(sink.clone()));

        let raw = sink.contents();
        assert!(raw.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(raw.ends_with(b"7\r\nstarted\r\n"));
    }

    #[test]
    fn header_block_reaches_the_client_while_the_script_runs() {
        let root = scripts(&[("busy.sh",
            "printf 'Content-Type: text/plain\\r\\n\\r\\n'\nwhile :; do :; done\n")]);
        let mut config = config(&root);
        config.limits.timeout = Duration::from_secs(3);
        let gateway = Gateway::new(config);

        let sink = SharedBuf::default();
        let req = Request::parse(Cursor::new(&b"GET /cgi-bin/busy.sh HTTP/1.1\r\n\r\n"[..]),
                                 "10.0.0.7:41000".parse().unwrap(), 8080).unwrap();
        let serving = {
            let sink = sink.clone();
            thread::spawn(move || gateway.serve(req, Response::new(sink)))
        };

        let give_up = Instant::now() + Duration::from_secs(2);
        while sink.contents().is_empty() && Instant::now() < give_up {
            thread::sleep(Duration::from_millis(10));
        }
        let early = sink.contents();
        serving.join().unwrap();

        assert!(early.starts_with(b"HTTP/1.1 200 OK\r\n"),
                "{:?}", String::from_utf8_lossy(&early));
        assert!(early.ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn missing_and_escaping_paths() {
        let root = scripts(&[("real.sh", "printf 'Content-Type: text/plain\\r\\n\\r\\n'\n")]);
        let gateway = Gateway::new(config(&root));

        let (head, _, _) = exchange(&gateway, b"GET /cgi-bin/nope.sh HTTP/1.1\r\n\r\n");
        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"), "{}", head);

        let (head, _, _) = exchange(&gateway, b"GET /cgi-bin/ HTTP/1.1\r\n\r\n");
        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"), "{}", head);

        let (head, _, _) = exchange(&gateway, b"GET /cgi-bin/../etc/passwd HTTP/1.1\r\n\r\n");
        assert!(head.starts_with("HTTP/1.1 403 Forbidden\r\n"), "{}", head);
    }

    #[test]
    fn bad_bodies_are_refused() {
        let root = scripts(&[("post.sh", "printf 'Content-Type: text/plain\\r\\n\\r\\n'\n")]);
        let mut config = config(&root);
        config.limits.max_body_bytes = Some(8);
        let gateway = Gateway::new(config);

        let (head, _, _) = exchange(&gateway,
            b"POST /cgi-bin/post.sh HTTP/1.1\r\nContent-Length: 50\r\n\r\ntoo big");
        assert!(head.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{}", head);

        let (head, _, _) = exchange(&gateway,
            b"POST /cgi-bin/post.sh HTTP/1.1\r\nContent-Length: 6\r\n\r\nshort");
        assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{}", head);

        let (head, _, _) = exchange(&gateway,
            b"POST /cgi-bin/post.sh HTTP/1.1\r\nContent-Length: -1\r\n\r\n");
        assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{}", head);
    }

    #[test]
    fn header_block_split_across_writes() {
        let sink = SharedBuf::default();
        let mut cgi = CgiResponse::new(Response::new(sink.clone()));

        cgi.write_all(b"Content-Type: text/pl").unwrap();
        cgi.flush().unwrap();
        assert!(sink.contents().is_empty());
        cgi.write_all(b"ain\r\n\r\nbody").unwrap();
        cgi.flush().unwrap();
        assert!(sink.contents().starts_with(b"HTTP/1.1 200 OK\r\n"));
        cgi.finish(&InvocationResult::Completed {
            exit: crate::supervisor::ExitInfo { code: 0, elapsed: Duration::from_millis(1) }
        }).unwrap();

        let (head, body) = split_response(&sink.contents());
        assert!(head.contains("Content-Type: text/plain"));
        assert_eq!(body, b"body");
    }

    #[test]
    fn scripts_cannot_set_framing_headers() {
        let sink = SharedBuf::default();
        let mut cgi = CgiResponse::new(Response::new(sink.clone()));

        cgi.write_all(b"Content-Type: text/plain\nContent-Length: 3\nConnection: keep-alive\n\nabc")
            .unwrap();
        drop(cgi);

        let (head, _) = split_response(&sink.contents());
        assert!(!head.contains("Content-Length"));
        assert!(head.contains("Connection: close\r\n"));
    }

    #[test]
    fn cancelled_before_headers_sends_nothing() {
        let sink = SharedBuf::default();
        let cgi = CgiResponse::new(Response::new(sink.clone()));

        cgi.finish(&InvocationResult::Killed { reason: KillReason::ExternalCancel })
            .unwrap();

        assert!(sink.contents().is_empty());
    }
}
