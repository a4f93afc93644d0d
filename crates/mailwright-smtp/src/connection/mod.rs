//! SMTP connection management with type-state pattern.

mod client;
mod data;
mod stream;

pub use client::{
    Authenticated, Client, Connected, Data, MailTransaction, RecipientAdded, SmtpConnection,
};
pub use data::DataWriter;
pub use stream::{SmtpStream, connect, connect_tls};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;

/// Server capabilities from EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns the advertised authentication mechanisms this client
    /// implements, in server order.
    #[must_use]
    pub fn auth_mechanisms(&self) -> &[AuthMechanism] {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        let info = ServerInfo {
            hostname: "mx.example.com".into(),
            extensions: ["STARTTLS", "AUTH LOGIN", "8BITMIME"]
                .into_iter()
                .map(Extension::parse)
                .collect(),
        };
        assert!(info.supports_starttls());
        assert!(info.supports(&Extension::EightBitMime));
        assert_eq!(info.auth_mechanisms(), [AuthMechanism::Login]);
    }

    #[test]
    fn test_no_auth_advertised() {
        assert!(ServerInfo::default().auth_mechanisms().is_empty());
    }
}
