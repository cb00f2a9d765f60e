//! Watching over handler invocations
//!
//! Every invocation moves `Pending → Running` and then into exactly one of
//! `Completed`, `Failed` or `Killed`. The supervisor's job is to make sure
//! the last step always happens, including for handlers that never return:
//! once the deadline passes the handler is killed, and the caller gets
//! control back within `timeout + kill_grace`, plus a short window to
//! collect output the handler had already written.
//!
//! Output goes to the sink from a delivery thread of its own. The watchdog
//! only forwards chunks to it, so a sink that blocks can't hold up a kill.

use crate::context::RequestContext;
use crate::invoker::{self, Ceiling, Event, Handler, OutputSink, Spawned};

use std::cmp;
use std::fmt;
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on how long the watchdog goes without looking at the clock
/// and the cancel flag
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long output left in the pipe is collected after a kill, and how long
/// a handler's stderr gets to reach EOF after it exits
const DRAIN_WINDOW: Duration = Duration::from_millis(100);

/// Execution limits for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Wall-clock budget, measured from dispatch
    pub timeout: Duration,
    /// How long a handler gets between `SIGTERM` and `SIGKILL`
    pub kill_grace: Duration,
    /// Output ceiling in bytes, if any
    pub max_output_bytes: Option<u64>
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            timeout: Duration::from_secs(30),
            kill_grace: Duration::from_secs(2),
            max_output_bytes: None
        }
    }
}

/// How a normally-finished handler exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: i32,
    pub elapsed: Duration
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The handler ran and faulted
    Handler,
    /// The handler couldn't be started at all
    Spawn
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FailureKind::Handler => f.write_str("HandlerError"),
            FailureKind::Spawn => f.write_str("SpawnError")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    Timeout,
    OutputLimitExceeded,
    ExternalCancel
}

impl fmt::Display for KillReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            KillReason::Timeout => f.write_str("Timeout"),
            KillReason::OutputLimitExceeded => f.write_str("OutputLimitExceeded"),
            KillReason::ExternalCancel => f.write_str("ExternalCancel")
        }
    }
}

/// The terminal state of an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationResult {
    Completed { exit: ExitInfo },
    Failed { kind: FailureKind, message: String },
    Killed { reason: KillReason }
}

impl fmt::Display for InvocationResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            InvocationResult::Completed { exit } =>
                write!(f, "completed with status {} after {:?}",
                       exit.code, exit.elapsed),
            InvocationResult::Failed { kind, ref message } =>
                write!(f, "failed ({}): {}", kind, message),
            InvocationResult::Killed { reason } =>
                write!(f, "killed ({})", reason)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Pending,
    Running,
    Finished(InvocationResult)
}

/// Shared handle on one invocation
///
/// The transport keeps one of these (usually in an `Arc`) to cancel the
/// invocation from another thread, or to ask how it's doing.
#[derive(Debug)]
pub struct Control {
    cancelled: AtomicBool,
    state: Mutex<State>,
    changed: Condvar
}

impl Default for Control {
    fn default() -> Control {
        Control::new()
    }
}

impl Control {
    pub fn new() -> Control {
        Control {
            cancelled: AtomicBool::new(false),
            state: Mutex::new(State::Pending),
            changed: Condvar::new()
        }
    }

    /// Ask for the invocation to be killed. Has no effect once it finished.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn state(&self) -> State {
        self.lock().clone()
    }

    /// Blocks until the invocation reaches its terminal state
    pub fn wait(&self) -> InvocationResult {
        let mut state = self.lock();
        loop {
            if let State::Finished(ref result) = *state {
                return result.clone();
            }
            state = match self.changed.wait(state) {
                Ok(s) => s,
                Err(poisoned) => poisoned.into_inner()
            };
        }
    }

    /// Like `wait`, giving up after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<InvocationResult> {
        let give_up = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let State::Finished(ref result) = *state {
                return Some(result.clone());
            }
            let now = Instant::now();
            if now >= give_up {
                return None;
            }
            state = match self.changed.wait_timeout(state, give_up - now) {
                Ok((s, _)) => s,
                Err(poisoned) => poisoned.into_inner().0
            };
        }
    }

    fn lock(&self) -> MutexGuard<State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner()
        }
    }

    fn begin(&self) {
        let mut state = self.lock();
        if *state == State::Pending {
            *state = State::Running;
            self.changed.notify_all();
        }
    }

    /// Records the terminal state. Only the first call has any effect.
    fn finish(&self, result: InvocationResult) -> InvocationResult {
        let mut state = self.lock();
        if let State::Finished(ref earlier) = *state {
            return earlier.clone();
        }
        *state = State::Finished(result.clone());
        self.changed.notify_all();
        result
    }
}

/// Everything a caller gets back from `Supervisor::run`
#[derive(Debug)]
pub struct Outcome<W> {
    pub result: InvocationResult,
    /// The sink passed to `run`, with all delivered output in it. `None`
    /// if a write to it was still stuck when the invocation ended; it is
    /// dropped once that write returns.
    pub sink: Option<W>,
    pub output_bytes: u64,
    pub elapsed: Duration,
    /// The last bit of what the handler wrote to stderr
    pub stderr: Vec<u8>
}

/// Enforces `Limits` on handler invocations
#[derive(Debug, Clone, Copy, Default)]
pub struct Supervisor {
    limits: Limits
}

/// Why the watchdog stopped pumping output
enum Stop {
    Exited(ExitStatus),
    Kill(KillReason)
}

impl Supervisor {
    pub fn new(limits: Limits) -> Supervisor {
        Supervisor { limits: limits }
    }

    #[inline]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Runs `handler` against `ctx`, streaming its output into `sink`.
    ///
    /// Always returns a terminal result; never blocks much longer than
    /// `timeout + kill_grace`. No retries: a failed or killed invocation is
    /// reported, not re-run.
    pub fn run<H, W>(&self, handler: &H, ctx: &RequestContext, sink: W,
                     control: &Control) -> Outcome<W>
        where H: Handler + ?Sized, W: Write + Send + 'static
    {
        let started = Instant::now();

        if control.is_cancelled() {
            let result = control.finish(
                InvocationResult::Killed { reason: KillReason::ExternalCancel });
            return unstarted(result, sink, started);
        }

        control.begin();
        let deadline = started + self.limits.timeout;

        let mut spawned = match invoker::spawn(handler, ctx) {
            Ok(s) => s,
            Err(e) => {
                warn!("Could not start handler: {}", e);
                let result = control.finish(InvocationResult::Failed {
                    kind: FailureKind::Spawn,
                    message: e.to_string()
                });
                return unstarted(result, sink, started);
            }
        };

        let delivery = Delivery::start(sink, spawned.pid());
        let mut ceiling = Ceiling::new(self.limits.max_output_bytes);

        let stop = self.watch(&mut spawned, &delivery, &mut ceiling, deadline,
                              control);

        let (result, give_up) = match stop {
            Stop::Exited(status) => {
                if !spawned.wait_for_stderr(DRAIN_WINDOW) {
                    debug!("stderr of handler {} is still open", spawned.pid());
                }
                let result = classify(status, started.elapsed(),
                                      &spawned.stderr_tail());
                // Delivery is held to the same bound as the handler
                let give_up = cmp::max(deadline + self.limits.kill_grace,
                                       Instant::now());
                (result, give_up + DRAIN_WINDOW)
            },
            Stop::Kill(reason) => {
                warn!("Killing handler {}: {}", spawned.pid(), reason);
                if let Err(e) = spawned.terminate(self.limits.kill_grace) {
                    error!("Could not reap handler {}: {}", spawned.pid(), e);
                }
                drain(&spawned, &delivery, &mut ceiling);
                (InvocationResult::Killed { reason: reason },
                 Instant::now() + DRAIN_WINDOW)
            }
        };

        let stderr = spawned.stderr_tail();
        let pid = spawned.pid();
        // Reaps and clears out the process group
        drop(spawned);

        let result = control.finish(result);
        let (sink, output_bytes) = delivery.finish(give_up);
        if sink.is_none() {
            warn!("Output sink for handler {} is stuck, leaving it behind", pid);
        }

        Outcome {
            result: result,
            sink: sink,
            output_bytes: output_bytes,
            elapsed: started.elapsed(),
            stderr: stderr
        }
    }

    /// The watchdog loop: forwards output until the handler exits or one of
    /// the limits trips.
    fn watch<W>(&self, spawned: &mut Spawned, delivery: &Delivery<W>,
                ceiling: &mut Ceiling, deadline: Instant, control: &Control)
                -> Stop {
        let mut stdout_open = true;

        loop {
            if control.is_cancelled() {
                return Stop::Kill(KillReason::ExternalCancel);
            }

            if delivery.failed() {
                // Nobody is listening anymore
                return Stop::Kill(KillReason::ExternalCancel);
            }

            let now = Instant::now();
            if now >= deadline {
                return Stop::Kill(KillReason::Timeout);
            }
            let tick = cmp::min(deadline - now, POLL_INTERVAL);

            if !stdout_open {
                // Output is done; wait for the exit status
                match spawned.try_wait() {
                    Ok(Some(status)) => return Stop::Exited(status),
                    Ok(None) => {
                        thread::sleep(cmp::min(tick, Duration::from_millis(5)));
                        continue;
                    },
                    Err(e) => {
                        error!("Lost track of handler {}: {}", spawned.pid(), e);
                        return Stop::Kill(KillReason::ExternalCancel);
                    }
                }
            }

            match spawned.events().recv_timeout(tick) {
                Ok(Event::Output(chunk)) => {
                    if !forward(delivery, ceiling, chunk) {
                        return Stop::Kill(KillReason::OutputLimitExceeded);
                    }
                },
                Ok(Event::Closed) => stdout_open = false,
                Ok(Event::ReadFailed(e)) => {
                    warn!("Error reading output of handler {}: {}",
                          spawned.pid(), e);
                    stdout_open = false;
                },
                Err(RecvTimeoutError::Timeout) => (),
                Err(RecvTimeoutError::Disconnected) => stdout_open = false
            }
        }
    }
}

/// Hands as much of `chunk` to the delivery thread as the ceiling allows.
/// Returns false if the ceiling was crossed.
fn forward<W>(delivery: &Delivery<W>, ceiling: &mut Ceiling,
              mut chunk: Vec<u8>) -> bool {
    let len = chunk.len();
    let allowed = ceiling.admit(len);
    chunk.truncate(allowed);
    if !chunk.is_empty() {
        delivery.send(chunk);
    }
    allowed == len
}

/// Collects output the handler wrote before it was killed, for at most
/// `DRAIN_WINDOW` in total.
fn drain<W>(spawned: &Spawned, delivery: &Delivery<W>, ceiling: &mut Ceiling) {
    let give_up = Instant::now() + DRAIN_WINDOW;
    loop {
        let now = Instant::now();
        if now >= give_up {
            return;
        }
        match spawned.events().recv_timeout(give_up - now) {
            Ok(Event::Output(chunk)) => {
                if !forward(delivery, ceiling, chunk) {
                    return;
                }
            },
            _ => return
        }
    }
}

/// How the delivery thread is getting on
#[derive(Debug, Default)]
struct Progress {
    written: AtomicU64,
    failed: AtomicBool,
    abandoned: AtomicBool
}

/// The sink, living on a thread of its own
struct Delivery<W> {
    chunks: Sender<Vec<u8>>,
    progress: Arc<Progress>,
    returned: Receiver<W>
}

impl<W: Write + Send + 'static> Delivery<W> {
    fn start(sink: W, pid: libc::pid_t) -> Delivery<W> {
        let (chunks, queue) = mpsc::channel();
        let (give_back, returned) = mpsc::channel();
        let progress = Arc::new(Progress::default());

        let shared = progress.clone();
        thread::spawn(move || {
            let sink = deliver(OutputSink::new(sink), queue, &shared, pid);
            // Nobody to give it to if the supervisor stopped waiting
            let _ = give_back.send(sink);
        });

        Delivery { chunks: chunks, progress: progress, returned: returned }
    }

    /// Stops taking chunks and waits until `give_up` for everything already
    /// sent to be written. Returns the sink, if it came back in time, and
    /// how many bytes reached it.
    fn finish(self, give_up: Instant) -> (Option<W>, u64) {
        let Delivery { chunks, progress, returned } = self;
        drop(chunks);

        let timeout = give_up.saturating_duration_since(Instant::now());
        let sink = returned.recv_timeout(timeout).ok();
        if sink.is_none() {
            progress.abandoned.store(true, Ordering::Release);
        }
        (sink, progress.written.load(Ordering::Acquire))
    }
}

impl<W> Delivery<W> {
    fn send(&self, chunk: Vec<u8>) {
        // Only fails once the thread is gone, which `failed` reports
        let _ = self.chunks.send(chunk);
    }

    #[inline]
    fn failed(&self) -> bool {
        self.progress.failed.load(Ordering::Acquire)
    }
}

fn deliver<W: Write>(mut sink: OutputSink<W>, queue: Receiver<Vec<u8>>,
                     progress: &Progress, pid: libc::pid_t) -> W {
    for chunk in queue.iter() {
        if progress.failed.load(Ordering::Acquire)
            || progress.abandoned.load(Ordering::Acquire) {
            continue;
        }
        match sink.deliver(&chunk) {
            Ok(()) => progress.written.store(sink.written(), Ordering::Release),
            Err(e) => {
                info!("Output sink for handler {} failed: {}", pid, e);
                progress.failed.store(true, Ordering::Release);
            }
        }
    }
    sink.into_inner()
}

fn classify(status: ExitStatus, elapsed: Duration, stderr: &[u8])
            -> InvocationResult {
    let mut message = match (status.code(), status.signal()) {
        (Some(0), _) => return InvocationResult::Completed {
            exit: ExitInfo { code: 0, elapsed: elapsed }
        },
        (Some(code), _) => format!("handler exited with status {}", code),
        (None, Some(signal)) => format!("handler terminated by signal {}", signal),
        (None, None) => format!("handler ended with {}", status)
    };

    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        message.push_str(": ");
        message.push_str(stderr);
    }

    InvocationResult::Failed { kind: FailureKind::Handler, message: message }
}

/// The outcome of an invocation that never got a handler running
fn unstarted<W>(result: InvocationResult, sink: W, started: Instant) -> Outcome<W> {
    Outcome {
        result: result,
        sink: Some(sink),
        output_bytes: 0,
        elapsed: started.elapsed(),
        stderr: Vec::new()
    }
}
