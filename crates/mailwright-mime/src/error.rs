//! Error types for MIME construction, serialization and local delivery.

use std::io;
use std::process::ExitStatus;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error while writing a message or talking to a subprocess.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The operating system random source failed.
    #[error("Random source failure: {0}")]
    Entropy(#[from] rand::Error),

    /// A leaf part has neither a body nor a body producer.
    #[error("Email part has no body")]
    PartHasNoBody,

    /// A leaf part's buffered body was already written and no producer is set.
    #[error("Email part body was already consumed")]
    BodyConsumed,

    /// The body producer callback failed.
    #[error("Body producer failed: {0}")]
    Producer(#[source] io::Error),

    /// The message has no sender.
    #[error("Email is not valid: missing sender")]
    MissingSender,

    /// The message has no primary recipient.
    #[error("Email is not valid: no recipients")]
    NoRecipients,

    /// The message body is empty.
    #[error("Email is not valid: empty body")]
    EmptyBody,

    /// The message tree has no `multipart/alternative` container.
    #[error("Cannot set a body without a multipart/alternative container")]
    NoAlternativeContainer,

    /// The message tree has no `multipart/mixed` container.
    #[error("Cannot attach without a multipart/mixed container")]
    NoMixedContainer,

    /// Missing required header.
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// Invalid date header value.
    #[error("Invalid date: {0}")]
    InvalidDate(#[from] chrono::ParseError),

    /// Invalid email address or address list.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// The local mail transfer agent exited unsuccessfully.
    #[error("Mail transfer agent exited with {0}")]
    SendmailStatus(ExitStatus),

    /// A delivery sink failed.
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps a foreign delivery error.
    #[must_use]
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(err))
    }

    /// Returns true if the message was rejected before any I/O took place.
    #[must_use]
    pub const fn is_invalid_message(&self) -> bool {
        matches!(
            self,
            Self::MissingSender | Self::NoRecipients | Self::EmptyBody
        )
    }
}
