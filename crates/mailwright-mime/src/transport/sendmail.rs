//! Delivery through a local mail transfer agent.

use super::{MessageSource, Sender};
use crate::error::{Error, Result};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Pipes messages into a sendmail-compatible program.
///
/// The program reads recipients from the message headers, so the envelope
/// sender and recipients passed to [`Sender::send`] are not used and `Bcc`
/// is kept in the stream for the agent to strip.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SendmailSender {
    program: PathBuf,
    args: Vec<OsString>,
}

impl SendmailSender {
    /// Default program location.
    pub const DEFAULT_PROGRAM: &'static str = "/usr/sbin/sendmail";

    /// Creates a sender running `program` without arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends a command line argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Returns the program path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Returns the command line arguments.
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

impl Default for SendmailSender {
    /// `/usr/sbin/sendmail -i -t`
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROGRAM).arg("-i").arg("-t")
    }
}

impl Sender for SendmailSender {
    fn send(&self, _from: &str, _to: &[String], message: &mut dyn MessageSource) -> Result<()> {
        debug!(program = %self.program.display(), "Spawning mail transfer agent");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .spawn()?;

        let written = match child.stdin.take() {
            Some(mut stdin) => message.write_message(&mut stdin, &[]),
            None => Err(io::Error::other("child stdin was not captured").into()),
        };
        // stdin is closed here so the agent sees end of input

        match written {
            Ok(bytes) => debug!(bytes, "Message piped to mail transfer agent"),
            Err(err) => {
                warn!(error = %err, "Writing to mail transfer agent failed");
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(Error::SendmailStatus(status));
        }
        Ok(())
    }
}
