//! Delivery sinks.
//!
//! A [`Sender`] takes an envelope sender, envelope recipients and a
//! [`MessageSource`] that streams the serialized message. This crate ships
//! the local [`SendmailSender`]; the SMTP relay lives in `mailwright-smtp`.

mod sendmail;

pub use sendmail::SendmailSender;

use crate::error::Result;
use crate::part::Part;
use std::io::Write;

/// Something that can stream a serialized message.
pub trait MessageSource {
    /// Writes the message to `out`, omitting the named top-level header
    /// fields, and returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be serialized or `out` fails.
    fn write_message(&mut self, out: &mut dyn Write, exclude: &[&str]) -> Result<u64>;
}

impl MessageSource for Part {
    fn write_message(&mut self, out: &mut dyn Write, exclude: &[&str]) -> Result<u64> {
        self.write_to_excluding(out, exclude)
    }
}

/// A delivery mechanism for serialized messages.
pub trait Sender {
    /// Delivers `message` from `from` to every address in `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails. Foreign transport errors are
    /// wrapped in [`Error::Transport`](crate::Error::Transport).
    fn send(&self, from: &str, to: &[String], message: &mut dyn MessageSource) -> Result<()>;
}

impl<S: Sender + ?Sized> Sender for &S {
    fn send(&self, from: &str, to: &[String], message: &mut dyn MessageSource) -> Result<()> {
        (**self).send(from, to, message)
    }
}

impl<S: Sender + ?Sized> Sender for Box<S> {
    fn send(&self, from: &str, to: &[String], message: &mut dyn MessageSource) -> Result<()> {
        (**self).send(from, to, message)
    }
}
