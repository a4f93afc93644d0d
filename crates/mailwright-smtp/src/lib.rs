//! # mailwright-smtp
//!
//! Blocking SMTP client and the relay delivery sink for `mailwright-mime`
//! messages.
//!
//! ## Features
//!
//! - **Relay sink**: [`RelaySender`] implements
//!   [`mailwright_mime::transport::Sender`], one connection per message
//! - **Type-state connection management**: compile-time enforcement of valid
//!   SMTP state transitions
//! - **TLS**: STARTTLS (opportunistic or required) and implicit TLS with
//!   rustls
//! - **Authentication**: PLAIN, or LOGIN when it is the only mechanism offered
//! - **Transparency**: dot-stuffing and CRLF normalization while streaming
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailwright_mime::Mail;
//! use mailwright_smtp::{Credentials, RelayConfig, RelaySender, Security};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::builder("smtp.example.com")
//!     .security(Security::Required)
//!     .credentials(Credentials::new("alice", "secret"))
//!     .build();
//! let relay = RelaySender::new(config);
//!
//! let mut mail = Mail::new()?;
//! mail.set_from("alice@example.com", "Alice")?;
//! mail.add_to("bob@example.com", "Bob")?;
//! mail.set_body_text("Hello Bob")?;
//! mail.send(&relay)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌──────────────┐
//! │  Connected   │ ─── auth_plain() / auth_login() ───→ Authenticated
//! └──────────────┘                                          │
//!        │                                                  │
//!        └─── mail_from() ───→ MailTransaction ←────────────┘
//!                                   │
//!                                rcpt_to() ───→ RecipientAdded ─── data() ───→ Data
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`config`]: Relay configuration
//! - [`connection`]: Connection management and type-state client
//! - [`parser`]: Response parser
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod config;
pub mod connection;
mod error;
pub mod parser;
mod relay;
pub mod types;

pub use config::{Credentials, RelayConfig, RelayConfigBuilder, Security, TlsParameters};
pub use connection::{
    Authenticated, Client, Connected, Data, DataWriter, MailTransaction, RecipientAdded,
    ServerInfo, SmtpConnection,
};
pub use error::{Error, Result};
pub use relay::RelaySender;
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
