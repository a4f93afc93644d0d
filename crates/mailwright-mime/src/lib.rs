//! # mailwright-mime
//!
//! Build MIME email messages as a tree of parts and serialize them to the
//! exact byte stream mail transports expect.
//!
//! ## Features
//!
//! - **Part tree**: multipart containers and leaf bodies with derived
//!   `Content-Type` and `Content-Transfer-Encoding` headers
//! - **Deterministic serialization**: sorted, canonical headers, CRLF line
//!   endings, boundary delimiting and single-child flattening
//! - **Streaming encoders**: quoted-printable and line-wrapped base64
//! - **Header encoding**: RFC 2047 encoded words and line folding per field
//! - **Delivery**: a [`Sender`](transport::Sender) contract and a local
//!   sendmail sink
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailwright_mime::Mail;
//! use mailwright_mime::transport::SendmailSender;
//!
//! # fn main() -> mailwright_mime::Result<()> {
//! let mut mail = Mail::new()?;
//! mail.set_from("alice@example.com", "Alice")?;
//! mail.add_to("bob@example.com", "Bob")?;
//! mail.set_subject("Lunch");
//! mail.set_body_text("Noon at the usual place?")?;
//! mail.set_body_html("<p>Noon at the usual place?</p>")?;
//!
//! mail.send(&SendmailSender::default())?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Writing a message
//!
//! ```
//! use mailwright_mime::Mail;
//!
//! # fn main() -> mailwright_mime::Result<()> {
//! let mut mail = Mail::new()?;
//! mail.set_from("alice@example.com", "")?;
//! mail.add_to("bob@example.com", "")?;
//! mail.set_body_text("Hello")?;
//!
//! let mut out = Vec::new();
//! mail.write_to(&mut out)?;
//! assert!(out.ends_with(b"\r\n\r\nHello"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod content_type;
mod error;
mod mail;
mod part;

pub mod boundary;
pub mod crlf;
pub mod encoding;
pub mod header;
pub mod transport;

pub use address::Mailbox;
pub use content_type::{
    ALTERNATIVE, ContentType, MESSAGE_RFC822, MIXED, RELATED, TEXT_HTML, TEXT_PLAIN,
};
pub use encoding::TransferEncoding;
pub use error::{Error, Result};
pub use header::Headers;
pub use mail::Mail;
pub use part::{BodyProducer, PREAMBLE, Part};
