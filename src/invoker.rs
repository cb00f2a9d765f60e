//! Running a handler against one request
//!
//! A handler is a separate process. It gets the request's metavariables as
//! its environment, exactly `CONTENT_LENGTH` body bytes on stdin, and writes
//! its response to stdout. Whatever it flushes shows up on the host's side
//! of the pipe right away, so the host can stream it along before the
//! handler is done.
//!
//! Handlers aren't expected to cooperate with cancellation. Stopping one
//! means signalling its whole process group, which is a hard dependency on
//! a Unix platform.

use crate::context::RequestContext;
use crate::filesystem::split_script_path;
use crate::log_util::{ascii_escape, Tail};

use std::io::{self, BufRead, BufReader, Read, Write};
use std::mem;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// How much of a handler's stderr is kept for failure reports
const STDERR_TAIL: usize = 2048;

/// How often a dying handler is checked on
const REAP_POLL: Duration = Duration::from_millis(10);

/// Values which know how to start a handler for a request
///
/// The returned command only needs its program, arguments and working
/// directory filled in; environment and standard streams are the invoker's
/// business.
pub trait Handler: Send + Sync {
    fn command(&self, ctx: &RequestContext) -> Command;
}

impl<F> Handler for F where F: Fn(&RequestContext) -> Command + Send + Sync {
    fn command(&self, ctx: &RequestContext) -> Command {
        self(ctx)
    }
}

/// A CGI script on disk
///
/// The script runs in its own directory. With an interpreter, the interpreter
/// gets the bare file name as its argument; without one the script is
/// executed directly (it had better have a shebang line).
#[derive(Debug, Clone)]
pub struct Script {
    path: PathBuf,
    interpreter: Option<PathBuf>
}

impl Script {
    pub fn new<P: Into<PathBuf>>(path: P) -> Script {
        Script { path: path.into(), interpreter: None }
    }

    pub fn interpreter<P: Into<PathBuf>>(mut self, interpreter: P) -> Script {
        self.interpreter = Some(interpreter.into());
        self
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Handler for Script {
    fn command(&self, _ctx: &RequestContext) -> Command {
        let (dir, name) = split_script_path(&self.path);

        let mut command = match self.interpreter {
            Some(ref interpreter) => {
                let mut c = Command::new(interpreter);
                c.arg(&name);
                c
            },
            None => Command::new(&self.path)
        };
        command.current_dir(dir);
        command
    }
}

/// Things the pump threads report back
#[derive(Debug)]
pub enum Event {
    /// A chunk of stdout, in order
    Output(Vec<u8>),
    /// stdout hit EOF; the handler closed it or exited
    Closed,
    /// Reading stdout failed; treated like `Closed` after logging
    ReadFailed(io::Error)
}

/// Where a handler's output goes
///
/// Append-only: every chunk is written through and flushed immediately, so
/// nothing the handler flushed sits in a host-side buffer.
pub struct OutputSink<W> {
    inner: W,
    written: u64
}

impl<W: Write> OutputSink<W> {
    pub fn new(inner: W) -> OutputSink<W> {
        OutputSink { inner: inner, written: 0 }
    }

    pub fn deliver(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.inner.write_all(chunk)?;
        self.inner.flush()?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    #[inline]
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Counts output against an optional ceiling
#[derive(Debug, Clone, Copy)]
pub struct Ceiling {
    limit: Option<u64>,
    seen: u64
}

impl Ceiling {
    pub fn new(limit: Option<u64>) -> Ceiling {
        Ceiling { limit: limit, seen: 0 }
    }

    /// How much of a `len`-byte chunk still fits. Anything less than `len`
    /// means the ceiling was crossed.
    pub fn admit(&mut self, len: usize) -> usize {
        let allowed = match self.limit {
            Some(limit) => {
                let room = limit.saturating_sub(self.seen);
                if (len as u64) > room { room as usize } else { len }
            },
            None => len
        };
        self.seen += allowed as u64;
        allowed
    }

    #[inline]
    pub fn seen(&self) -> u64 {
        self.seen
    }
}

/// A handler process and the threads attached to it
///
/// Dropping a `Spawned` kills the whole process group and reaps the child,
/// whatever state the invocation ended in.
pub struct Spawned {
    child: Child,
    pgid: libc::pid_t,
    events: Receiver<Event>,
    stderr: Arc<Mutex<Tail>>,
    /// Disconnects once stderr hits EOF
    stderr_done: Receiver<()>,
    status: Option<ExitStatus>,
    signalled: bool
}

/// Starts `handler` for `ctx`.
///
/// The child's environment is exactly `ctx.environment()`; it runs as the
/// leader of a fresh process group so anything it forks can be killed along
/// with it.
pub fn spawn<H: Handler + ?Sized>(handler: &H, ctx: &RequestContext)
                                  -> io::Result<Spawned> {
    let mut command = handler.command(ctx);
    command.env_clear()
        .envs(ctx.environment().iter().map(|&(ref k, ref v)| (k, v)))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    let mut child = command.spawn()?;
    let pgid = child.id() as libc::pid_t;
    debug!("Spawned handler {:?} as pid {}", command.get_program(), pgid);

    let (tx, rx) = mpsc::channel();
    let stderr = Arc::new(Mutex::new(Tail::new(STDERR_TAIL)));
    let (done_tx, done_rx) = mpsc::channel();

    if let Some(stdin) = child.stdin.take() {
        let body = ctx.body().to_vec();
        thread::spawn(move || feed_stdin(stdin, body));
    }

    if let Some(stdout) = child.stdout.take() {
        thread::spawn(move || pump_stdout(stdout, tx));
    }

    if let Some(pipe) = child.stderr.take() {
        let tail = stderr.clone();
        thread::spawn(move || {
            drain_stderr(pipe, pgid, tail);
            drop(done_tx);
        });
    }

    Ok(Spawned {
        child: child,
        pgid: pgid,
        events: rx,
        stderr: stderr,
        stderr_done: done_rx,
        status: None,
        signalled: false
    })
}

fn feed_stdin<W: Write>(mut stdin: W, body: Vec<u8>) {
    // A handler that doesn't care about its body may exit without reading
    // it; that's a broken pipe here and nobody's fault.
    if let Err(e) = stdin.write_all(&body) {
        if e.kind() != io::ErrorKind::BrokenPipe {
            warn!("Error writing request body to handler: {}", e);
        }
    }
}

fn pump_stdout(mut stdout: ChildStdout, events: Sender<Event>) {
    let mut buffer = [0u8; 4096];
    loop {
        match stdout.read(&mut buffer) {
            Ok(0) => {
                let _ = events.send(Event::Closed);
                return;
            },
            Ok(n) => {
                if events.send(Event::Output(buffer[.. n].to_vec())).is_err() {
                    // The supervisor is gone; nobody wants the rest
                    return;
                }
            },
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = events.send(Event::ReadFailed(e));
                return;
            }
        }
    }
}

fn drain_stderr<R: Read>(pipe: R, pid: libc::pid_t, tail: Arc<Mutex<Tail>>) {
    let mut reader = BufReader::new(pipe);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {
                warn!("Error message from handler {}: \"{}\"", pid,
                      ascii_escape(line.strip_suffix(b"\n").unwrap_or(&line)));
                if let Ok(mut t) = tail.lock() {
                    t.push(&line);
                }
            }
        }
    }
}

impl Spawned {
    #[inline]
    pub fn pid(&self) -> libc::pid_t {
        self.pgid
    }

    #[inline]
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    /// Whatever the handler last said on stderr
    pub fn stderr_tail(&self) -> Vec<u8> {
        match self.stderr.lock() {
            Ok(t) => t.bytes().to_vec(),
            Err(_) => Vec::new()
        }
    }

    /// Waits up to `timeout` for the handler's stderr to reach EOF, so the
    /// tail is complete. Returns whether it did.
    pub fn wait_for_stderr(&self, timeout: Duration) -> bool {
        match self.stderr_done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            _ => true
        }
    }

    /// Checks for exit without blocking
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }

        if self.leader_exited(false)? {
            self.reap().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Blocks until the handler exits on its own
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        self.leader_exited(true)?;
        self.reap()
    }

    /// Stops the handler, whatever it's doing.
    ///
    /// The process group gets `SIGTERM`, then `SIGKILL` if the leader is
    /// still around after `grace`. Returns once the child is reaped.
    pub fn terminate(&mut self, grace: Duration) -> io::Result<ExitStatus> {
        if let Some(status) = self.try_wait()? {
            return Ok(status);
        }

        self.signalled = true;
        if grace > Duration::from_millis(0) {
            self.signal(libc::SIGTERM);
            let give_up = Instant::now() + grace;
            while Instant::now() < give_up {
                if let Some(status) = self.try_wait()? {
                    return Ok(status);
                }
                thread::sleep(REAP_POLL);
            }
        }

        self.signal(libc::SIGKILL);
        self.wait()
    }

    /// Whether the leader has exited, leaving it unreaped either way
    fn leader_exited(&self, block: bool) -> io::Result<bool> {
        let mut options = libc::WEXITED | libc::WNOWAIT;
        if !block {
            options |= libc::WNOHANG;
        }

        loop {
            // SAFETY: siginfo_t is plain data and all zeroes is a valid value;
            // waitid(2) only writes through the pointer we hand it.
            let mut info: libc::siginfo_t = unsafe { mem::zeroed() };
            let result = unsafe {
                libc::waitid(libc::P_PID, self.pgid as libc::id_t, &mut info, options)
            };
            if result == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            // With WNOHANG and nothing to report, si_pid stays zero
            // SAFETY: waitid filled in a SIGCHLD siginfo or left it zeroed.
            return Ok(unsafe { info.si_pid() } != 0);
        }
    }

    /// Reaps a leader that is known to have exited.
    ///
    /// Until it is reaped the leader's zombie keeps the group id from being
    /// reused, so whatever it left running in the group is killed first.
    fn reap(&mut self) -> io::Result<ExitStatus> {
        self.signal(libc::SIGKILL);
        let status = self.child.wait()?;
        self.status = Some(status);
        Ok(status)
    }

    /// Whether the host sent the handler a signal
    #[inline]
    pub fn was_signalled(&self) -> bool {
        self.signalled
    }

    fn signal(&self, signal: libc::c_int) {
        // SAFETY: kill(2) with a negative pid only signals the group the
        // child leads; it has no memory-safety preconditions.
        let result = unsafe { libc::kill(-self.pgid, signal) };
        if result == -1 {
            let err = io::Error::last_os_error();
            // ESRCH: the group is already gone
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!("Failed to signal handler group {}: {}", self.pgid, err);
            }
        }
    }
}

impl Drop for Spawned {
    fn drop(&mut self) {
        // A reaped leader already took its group down with it
        if self.status.is_none() {
            self.signal(libc::SIGKILL);
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::context::{Builder, Inbound};

    use std::fs;
    use std::io::Cursor;

    fn context(body: &[u8]) -> RequestContext {
        Builder::default().build(Inbound {
            method: String::from("POST"),
            content_type: Some(String::from("text/plain")),
            content_length: Some(body.len().to_string()),
            variables: vec![(String::from("QUERY_STRING"), String::from("a=1"))],
            body: Cursor::new(body)
        }).unwrap()
    }

    fn sh(script: &'static str) -> impl Handler {
        move |_: &RequestContext| {
            let mut c = Command::new("/bin/sh");
            c.arg("-c").arg(script);
            c
        }
    }

    /// Counts flushes so tests can see write-through behaviour
    #[derive(Default)]
    struct Recorder {
        data: Vec<u8>,
        flushes: usize
    }

    impl Write for Recorder {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    fn collect(spawned: &Spawned) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            match spawned.events().recv_timeout(Duration::from_secs(10)) {
                Ok(Event::Output(chunk)) => out.extend_from_slice(&chunk),
                Ok(Event::Closed) => return out,
                other => panic!("{:?}", other)
            }
        }
    }

    #[test]
    fn sink_flushes_every_chunk() {
        let mut sink = OutputSink::new(Recorder::default());
        sink.deliver(b"one").unwrap();
        sink.deliver(b"two").unwrap();
        assert_eq!(sink.written(), 6);
        let recorder = sink.into_inner();
        assert_eq!(recorder.data, b"onetwo");
        assert_eq!(recorder.flushes, 2);
    }

    #[test]
    fn ceiling_cuts_the_chunk_that_crosses_it() {
        let mut ceiling = Ceiling::new(Some(5));
        assert_eq!(ceiling.admit(3), 3);
        assert_eq!(ceiling.admit(4), 2);
        assert_eq!(ceiling.admit(1), 0);
        assert_eq!(ceiling.seen(), 5);

        let mut unlimited = Ceiling::new(None);
        assert_eq!(unlimited.admit(1 << 20), 1 << 20);
    }

    #[test]
    fn script_runs_in_its_directory() {
        let ctx = context(b"");
        let command = Script::new("/srv/cgi-bin/post.rb").command(&ctx);
        assert_eq!(command.get_program(), Path::new("/srv/cgi-bin/post.rb"));
        assert_eq!(command.get_current_dir(), Some(Path::new("/srv/cgi-bin")));

        let command = Script::new("/srv/cgi-bin/hello.py")
            .interpreter("/usr/bin/python3")
            .command(&ctx);
        assert_eq!(command.get_program(), Path::new("/usr/bin/python3"));
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, vec![Path::new("hello.py").as_os_str()]);
    }

    #[test]
    fn handler_sees_only_the_exposed_environment() {
        let ctx = context(b"");
        let mut spawned = spawn(
            &sh("printf '%s|%s|%s|%s' \"$REQUEST_METHOD\" \"$CONTENT_TYPE\" \
                 \"$QUERY_STRING\" \"${HOME:-unset}\""),
            &ctx).unwrap();
        assert_eq!(collect(&spawned), b"POST|text/plain|a=1|unset");
        assert!(spawned.wait().unwrap().success());
        assert!(!spawned.was_signalled());
    }

    #[test]
    fn handler_reads_the_body_from_stdin() {
        let ctx = context(b"name=Testuser");
        let spawned = spawn(
            &sh("IFS= read -r line; printf '%s' \"$line\""), &ctx).unwrap();
        assert_eq!(collect(&spawned), b"name=Testuser");
    }

    #[test]
    fn stderr_tail_is_kept() {
        let ctx = context(b"");
        let mut spawned = spawn(&sh("echo oops >&2; exit 4"), &ctx).unwrap();
        collect(&spawned);
        assert_eq!(spawned.wait().unwrap().code(), Some(4));
        assert!(spawned.wait_for_stderr(Duration::from_secs(5)));
        assert_eq!(spawned.stderr_tail(), b"oops\n");
    }

    #[test]
    fn terminate_stops_a_busy_handler() {
        let ctx = context(b"");
        let mut spawned = spawn(&sh("while :; do :; done"), &ctx).unwrap();
        let status = spawned.terminate(Duration::from_millis(0)).unwrap();
        assert!(!status.success());
        assert!(spawned.was_signalled());
    }

    /// Whether `pid` is gone, or only waiting to be reaped by whoever
    /// inherited it
    fn dead(pid: &str) -> bool {
        match fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat.rsplit(')').next()
                .map_or(false, |rest| rest.trim_start().starts_with('Z')),
            Err(_) => true
        }
    }

    #[test]
    fn reaping_clears_out_the_group() {
        let ctx = context(b"");
        let mut spawned = spawn(
            &sh("sleep 30 >/dev/null 2>&1 & printf '%s' $!"), &ctx).unwrap();
        let straggler = String::from_utf8(collect(&spawned)).unwrap();
        assert!(spawned.wait().unwrap().success());

        let give_up = Instant::now() + Duration::from_secs(5);
        while !dead(&straggler) && Instant::now() < give_up {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(dead(&straggler), "pid {} outlived its group leader", straggler);
    }

    #[test]
    fn terminate_after_exit_returns_the_exit_status() {
        let ctx = context(b"");
        let mut spawned = spawn(&sh("exit 5"), &ctx).unwrap();
        collect(&spawned);
        assert_eq!(spawned.wait().unwrap().code(), Some(5));
        let status = spawned.terminate(Duration::from_millis(100)).unwrap();
        assert_eq!(status.code(), Some(5));
        assert!(!spawned.was_signalled());
    }
}
