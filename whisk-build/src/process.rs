use std::{
    ffi::OsStr,
    fmt,
    io::{self, Read},
    panic,
    process::{self, Child, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use log::debug;

/// Exit code of a process terminated by `SIGTERM`, which is what the watchdog sends once a timeout
/// has elapsed.
pub const TIMEOUT_EXIT_CODE: i32 = 143;

/// How often a running child is checked for completion while a timeout is in effect.
const POLLING_INTERVAL: Duration = Duration::from_millis(100);

/// How long a timed out child gets to exit after `SIGTERM` before it is killed outright.
const TERMINATION_GRACE_PERIOD: Duration = Duration::from_secs(5);

pub struct Command(process::Command);

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self(process::Command::new(program))
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.0.args(args);
        self
    }

    /// Runs the command with inherited stdio and waits for it to exit. If it is still running once
    /// `timeout` has elapsed, it is asked to stop and eventually killed.
    pub fn status_with_timeout(mut self, timeout: Duration) -> Result<Completion, Error> {
        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "running `{command:?}` with a timeout of {timeout:?}...",
                command = &self.0
            );
        }

        let mut child = match self.0.spawn() {
            Ok(child) => child,
            Err(error) => {
                return Err(Error {
                    command: self,
                    kind: error.into(),
                })
            }
        };

        match supervise(&mut child, timeout) {
            Ok((status, timed_out)) => Ok(Completion {
                exit_code: exit_code(status),
                timed_out,
            }),
            Err(error) => Err(Error {
                command: self,
                kind: error.into(),
            }),
        }
    }

    /// Runs the command and captures its stdout, stderr is inherited. Fails if the command does not
    /// exit successfully within `timeout`.
    pub fn output(mut self, timeout: Duration) -> Result<Output, Error> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("capturing `{command:?}`...", command = &self.0);
        }

        self.0.stdout(Stdio::piped());
        let mut child = match self.0.spawn() {
            Ok(child) => child,
            Err(error) => {
                return Err(Error {
                    command: self,
                    kind: error.into(),
                })
            }
        };

        // Drained on its own thread so a chatty child can not block on a full pipe while the
        // watchdog waits for it.
        let stdout = child.stdout.take();
        let reader = thread::spawn(move || -> io::Result<Vec<u8>> {
            let mut buffer = Vec::new();
            if let Some(mut stdout) = stdout {
                stdout.read_to_end(&mut buffer)?;
            }
            Ok(buffer)
        });

        let status = match supervise(&mut child, timeout) {
            Ok((status, false)) => status,
            // The reader is left behind, a grandchild may still hold the pipe open.
            Ok((_, true)) => {
                return Err(Error {
                    command: self,
                    kind: ErrorKind::TimedOut(timeout),
                })
            }
            Err(error) => {
                return Err(Error {
                    command: self,
                    kind: error.into(),
                })
            }
        };

        let stdout = match reader.join() {
            Ok(Ok(stdout)) => stdout,
            Ok(Err(error)) => {
                return Err(Error {
                    command: self,
                    kind: error.into(),
                })
            }
            Err(payload) => panic::resume_unwind(payload),
        };

        Output {
            command: self,
            output: process::Output {
                status,
                stdout,
                stderr: Vec::new(),
            },
        }
        .require_success()
    }
}

/// Waits for `child` to exit. Once `timeout` has elapsed it is asked to stop with `SIGTERM` and
/// killed if it is still around after [`TERMINATION_GRACE_PERIOD`]. Returns the exit status and
/// whether the timeout was hit. A timeout too large to represent never expires.
fn supervise(child: &mut Child, timeout: Duration) -> io::Result<(ExitStatus, bool)> {
    if let Some(status) = wait_until(child, Instant::now().checked_add(timeout))? {
        return Ok((status, false));
    }

    debug!(
        "terminating process {pid} after {timeout:?}",
        pid = child.id()
    );
    Ok((terminate(child)?, true))
}

/// Polls `child` until it exits or `deadline` passes, in which case `None` is returned.
fn wait_until(child: &mut Child, deadline: Option<Instant>) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                POLLING_INTERVAL.min(deadline - now)
            }
            None => POLLING_INTERVAL,
        };
        thread::sleep(pause);
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<ExitStatus> {
    use nix::{
        sys::signal::{kill, Signal},
        unistd::Pid,
    };

    // Fails only if the child is already gone, waiting below reaps it.
    if kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).is_ok() {
        let deadline = Instant::now().checked_add(TERMINATION_GRACE_PERIOD);
        if let Some(status) = wait_until(child, deadline)? {
            return Ok(status);
        }
        debug!(
            "process {pid} ignored SIGTERM, killing it",
            pid = child.id()
        );
    }

    kill_and_wait(child)
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<ExitStatus> {
    kill_and_wait(child)
}

fn kill_and_wait(child: &mut Child) -> io::Result<ExitStatus> {
    // The child may exit on its own before the kill, in which case there is nothing left to kill and
    // waiting reaps it.
    let _ = child.kill();
    child.wait()
}

/// Maps an exit status onto a single exit code the way a shell does: processes terminated by a
/// signal report `128 + signal`.
fn exit_code(status: process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub exit_code: i32,
    /// Whether the watchdog had to stop the process. Its exit code is whatever the process reported
    /// afterwards.
    pub timed_out: bool,
}

#[derive(Debug)]
pub struct Output {
    pub command: Command,
    pub output: process::Output,
}

impl Output {
    pub fn require_success(self) -> Result<Output, Error> {
        let Output { command, output } = self;
        if output.status.success() {
            Ok(Output { command, output })
        } else {
            Err(Error {
                command,
                kind: ErrorKind::NonZeroExitStatus(exit_code(output.status)),
            })
        }
    }
}

impl std::ops::Deref for Output {
    type Target = process::Output;

    fn deref(&self) -> &Self::Target {
        &self.output
    }
}

#[derive(Debug)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    NonZeroExitStatus(i32),
    TimedOut(Duration),
    Io(io::Error),
}

impl From<io::Error> for ErrorKind {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::Io(value),
        }
    }
}

#[derive(Debug)]
pub struct Error {
    pub command: Command,
    pub kind: ErrorKind,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to run `{command:?}`: ",
            command = &self.command.0
        )?;
        match &self.kind {
            ErrorKind::NotFound => {
                let program = self.command.0.get_program().to_string_lossy();
                write!(f, "the `{program}` command is required but not available on your system, please install it")
            }
            ErrorKind::PermissionDenied => {
                let program = self.command.0.get_program().to_string_lossy();
                write!(f, "the `{program}` command is available but does not have the right permissions, please make sure the binary is executable")
            }
            ErrorKind::NonZeroExitStatus(code) => {
                write!(f, "exited with non-zero exit code `{code}`")
            }
            ErrorKind::TimedOut(timeout) => write!(f, "did not finish within {timeout:?}"),
            ErrorKind::Io(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            _ => None,
        }
    }
}
