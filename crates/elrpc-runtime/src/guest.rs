//! The guest collaborator: spawns the child process and exposes its
//! stdout/stdin as the transport halves the reader loop drives (spec §1
//! "process-spawning glue", §6 "host's stdin ← guest's stdout"). Grounded
//! on `runtime/guest.go`'s `ProcessGuest`.

use std::ffi::OsStr;
use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// A not-yet-spawned (or spawned) guest child process. Stdin/stdout are
/// piped for the RPC transport; stderr is inherited so the guest's error
/// output passes through to the host's stderr unchanged (spec §6).
pub struct ProcessGuest {
    command: Command,
    child: Option<Child>,
}

impl ProcessGuest {
    pub fn new<I, A>(program: impl AsRef<OsStr>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        ProcessGuest {
            command,
            child: None,
        }
    }

    /// Spawn the child process. Idempotent per instance: calling this
    /// twice on the same `ProcessGuest` will panic, matching the
    /// single-use lifecycle of `Runtime::start`.
    pub fn start(&mut self) -> io::Result<()> {
        assert!(self.child.is_none(), "guest already started");
        self.child = Some(self.command.spawn()?);
        Ok(())
    }

    /// Take ownership of the piped stdout/stdin halves. Must be called
    /// exactly once, after [`Self::start`].
    pub fn take_stdio(&mut self) -> (ChildStdout, ChildStdin) {
        let child = self.child.as_mut().expect("guest not started");
        let stdout = child.stdout.take().expect("stdout was not piped");
        let stdin = child.stdin.take().expect("stdin was not piped");
        (stdout, stdin)
    }

    /// Block until the guest process exits.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.as_mut().expect("guest not started").wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawns_and_waits_for_a_trivial_command() {
        let mut guest = ProcessGuest::new("true", std::iter::empty::<&str>());
        guest.start().unwrap();
        let status = guest.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn stdio_round_trips_through_the_child() {
        // `cat` echoes stdin back on stdout, which is exactly the shape
        // the reader loop drives against a real guest.
        let mut guest = ProcessGuest::new("cat", std::iter::empty::<&str>());
        guest.start().unwrap();
        let (mut stdout, mut stdin) = guest.take_stdio();

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stdin.write_all(b"hello").await.unwrap();
        drop(stdin);

        let mut out = Vec::new();
        stdout.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");

        guest.wait().await.unwrap();
    }
}
