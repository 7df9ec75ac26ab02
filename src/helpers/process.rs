//! Time-bounded execution of external converter processes.

use std::io;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use std::thread;
use std::time::Duration;
use std::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a bounded child process ended.
#[derive(Debug)]
pub(crate) enum ProcessOutcome {
    Exited(ExitStatus),
    TimedOut,
}

/// Runs `command` with stdio detached, killing it once `timeout` elapses.
///
/// Spawn failures (binary missing, permission denied) come back as `Err` so
/// callers can tell an absent backend from a failing one.
pub(crate) fn run_with_timeout(command: &mut Command, timeout: Duration) -> io::Result<ProcessOutcome> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait()? {
            Some(status) => return Ok(ProcessOutcome::Exited(status)),
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(ProcessOutcome::TimedOut);
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn reports_exit_status() {
        let outcome = run_with_timeout(&mut Command::new("true"), Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, ProcessOutcome::Exited(status) if status.success()));
    }

    #[test]
    fn kills_on_timeout() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let started = Instant::now();
        let outcome = run_with_timeout(&mut command, Duration::from_millis(200)).unwrap();
        assert!(matches!(outcome, ProcessOutcome::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_binary_is_an_error() {
        let mut command = Command::new("definitely-not-a-real-converter-binary");
        assert!(run_with_timeout(&mut command, Duration::from_secs(1)).is_err());
    }
}
