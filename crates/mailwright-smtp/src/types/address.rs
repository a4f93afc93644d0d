//! Envelope addresses.

use crate::error::{Error, Result};

/// Bare address used in `MAIL FROM` and `RCPT TO` paths.
///
/// Header display names never reach the envelope, so this only holds the
/// `local@domain` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is empty, lacks a local part or
    /// domain, or contains characters that would break the command line.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(addr: &str) -> Result<()> {
        if addr.is_empty() {
            return Err(Error::InvalidAddress("Address cannot be empty".into()));
        }

        if addr
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>')
        {
            return Err(Error::InvalidAddress(format!(
                "Address contains forbidden characters: {addr:?}"
            )));
        }

        match addr.rsplit_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            Some(_) => Err(Error::InvalidAddress(
                "Local and domain parts cannot be empty".into(),
            )),
            None => Err(Error::InvalidAddress("Address must contain @".into())),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&mailwright_mime::Mailbox> for Address {
    type Error = Error;

    fn try_from(mailbox: &mailwright_mime::Mailbox) -> Result<Self> {
        Self::new(mailbox.address())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.to_string(), "user@example.com");
    }

    #[test]
    fn test_quoted_local_part_with_at() {
        assert!(Address::new("\"a@b\"@example.com").is_ok());
    }

    #[test]
    fn test_invalid_addresses() {
        for addr in ["", "userexample.com", "@example.com", "user@"] {
            assert!(Address::new(addr).is_err(), "{addr:?} accepted");
        }
    }

    #[test]
    fn test_rejects_command_injection() {
        assert!(Address::new("a@example.com>\r\nRCPT TO:<b@example.com").is_err());
        assert!(Address::new("a b@example.com").is_err());
    }

    #[test]
    fn test_from_mailbox() {
        let mailbox = mailwright_mime::Mailbox::with_name("Bob", "bob@example.com").unwrap();
        let addr = Address::try_from(&mailbox).unwrap();
        assert_eq!(addr.as_str(), "bob@example.com");
    }
}
