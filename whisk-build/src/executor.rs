use std::{fmt, time::Duration};

use log::{debug, error, info, warn};

use crate::{
    docker::CommandLine,
    process::{self, TIMEOUT_EXIT_CODE},
    Result,
};

/// The outcome of a single attempt at running a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub killed_by_timeout: bool,
}

impl ExecutionResult {
    /// Exit code 143 is classified as a timeout kill no matter how long the process ran.
    pub fn from_exit_code(exit_code: i32) -> Self {
        ExecutionResult {
            exit_code,
            killed_by_timeout: exit_code == TIMEOUT_EXIT_CODE,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs commands on behalf of the pipeline.
pub trait Runner {
    /// Runs the command with its output forwarded, stopping it once `timeout` has elapsed.
    fn run(
        &self,
        command: &CommandLine,
        timeout: Duration,
    ) -> Result<ExecutionResult, process::Error>;

    /// Runs the command to completion and returns what it wrote to stdout. Not finishing within
    /// `timeout` is an error.
    fn capture(
        &self,
        command: &CommandLine,
        timeout: Duration,
    ) -> Result<String, process::Error>;
}

/// Runs commands as child processes of this one.
pub struct ProcessRunner;

impl Runner for ProcessRunner {
    fn run(
        &self,
        command: &CommandLine,
        timeout: Duration,
    ) -> Result<ExecutionResult, process::Error> {
        let completion = command.to_command().status_with_timeout(timeout)?;
        if completion.timed_out {
            // Recorded as a timeout kill whatever the process reported once asked to stop.
            debug!(
                "`{command}` exited with code {code} after running out of time",
                code = completion.exit_code
            );
            return Ok(ExecutionResult::from_exit_code(TIMEOUT_EXIT_CODE));
        }
        Ok(ExecutionResult::from_exit_code(completion.exit_code))
    }

    fn capture(
        &self,
        command: &CommandLine,
        timeout: Duration,
    ) -> Result<String, process::Error> {
        let output = command.to_command().output(timeout)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[derive(Debug)]
pub struct ExecutionFailed {
    pub command: CommandLine,
    pub exit_code: i32,
    pub killed_by_timeout: bool,
    pub timeout: Duration,
}

impl fmt::Display for ExecutionFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.killed_by_timeout {
            write!(
                f,
                "command `{command}` was killed after {timeout} seconds",
                command = self.command,
                timeout = self.timeout.as_secs()
            )
        } else {
            write!(
                f,
                "command `{command}` failed with exit code `{code}`",
                command = self.command,
                code = self.exit_code
            )
        }
    }
}

impl std::error::Error for ExecutionFailed {}

/// Runs `command` until it succeeds, at most `retries` times in total. Attempts follow each other
/// immediately and each one gets the full `timeout`. A command that can not be started at all is
/// not retried.
pub fn execute<R: Runner + ?Sized>(
    runner: &R,
    command: &CommandLine,
    retries: u32,
    timeout: Duration,
) -> Result<()> {
    let attempts = retries.max(1);
    let mut attempt = 1;

    loop {
        info!("executing `{command}`");
        let result = runner.run(command, timeout)?;
        if result.success() {
            return Ok(());
        }

        let failed = ExecutionFailed {
            command: command.clone(),
            exit_code: result.exit_code,
            killed_by_timeout: result.killed_by_timeout,
            timeout,
        };

        if attempt >= attempts {
            error!("{failed}, no more retries left, aborting...");
            return Err(failed.into());
        }

        warn!(
            "{failed}, {retries_left} retries left, retrying...",
            retries_left = attempts - attempt
        );
        attempt += 1;
    }
}
