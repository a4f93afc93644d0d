//! SMTP relay delivery sink.

use crate::config::{Credentials, RelayConfig, Security};
use crate::connection::{self, Authenticated, Client, Connected, SmtpConnection};
use crate::error::{Error, Result};
use crate::types::{Address, AuthMechanism};
use mailwright_mime::transport::{MessageSource, Sender};
use std::net::IpAddr;
use tracing::{debug, warn};

/// Delivers messages through an SMTP relay, one connection per message.
///
/// The `Bcc` header is stripped from the transmitted content; its
/// addresses only appear as envelope recipients.
#[derive(Debug, Clone)]
pub struct RelaySender {
    config: RelayConfig,
}

impl RelaySender {
    /// Creates a relay sender.
    #[must_use]
    pub const fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Returns the relay configuration.
    #[must_use]
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Runs one complete SMTP session for a message.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the connection is closed on every path.
    pub fn deliver(
        &self,
        from: &str,
        to: &[String],
        message: &mut dyn MessageSource,
    ) -> Result<()> {
        let from = Address::new(from)?;
        let recipients = to
            .iter()
            .map(|addr| Address::new(addr.as_str()))
            .collect::<Result<Vec<_>>>()?;
        let (first, rest) = recipients
            .split_first()
            .ok_or_else(|| Error::InvalidAddress("No envelope recipients".into()))?;

        let client = self.open()?;
        let client = match &self.config.credentials {
            Some(credentials) => self.authenticate(client, credentials)?.mail_from(from)?,
            None => client.mail_from(from)?,
        };

        let mut client = client.rcpt_to(first.clone())?;
        for rcpt in rest {
            client = client.rcpt_to(rcpt.clone())?;
        }
        debug!(recipients = recipients.len(), "Recipients accepted");

        let client = client.data()?.stream_message(|out| {
            message.write_message(out, &["Bcc"])?;
            Ok(())
        })?;

        if let Err(err) = client.quit() {
            warn!(error = %err, "QUIT failed after the message was accepted");
        }
        Ok(())
    }

    fn open(&self) -> Result<Client<Connected>> {
        let config = &self.config;
        debug!(host = %config.host, port = config.port, security = ?config.security, "Connecting to relay");

        let stream = if config.security == Security::Implicit {
            connection::connect_tls(
                &config.host,
                config.port,
                config.timeout,
                &config.tls_parameters()?,
            )?
        } else {
            connection::connect(&config.host, config.port, config.timeout)?
        };

        let client = Client::from_stream(stream)?.ehlo(&config.helo_name)?;
        if client.is_tls() {
            return Ok(client);
        }

        if client.server_info().supports_starttls() {
            client.starttls(&config.tls_parameters()?, &config.helo_name)
        } else if config.security == Security::Required {
            Err(Error::TlsRequired {
                host: config.host.clone(),
            })
        } else {
            debug!("Server does not offer STARTTLS; continuing in plaintext");
            Ok(client)
        }
    }

    fn authenticate(
        &self,
        client: Client<Connected>,
        credentials: &Credentials,
    ) -> Result<Client<Authenticated>> {
        if !client.is_tls() && !is_local_host(&self.config.host) {
            return Err(Error::InsecureAuth {
                host: self.config.host.clone(),
            });
        }

        let mechanisms = client.server_info().auth_mechanisms();
        if mechanisms == [AuthMechanism::Login] {
            client.auth_login(&credentials.username, &credentials.password)
        } else {
            client.auth_plain(&credentials.username, &credentials.password)
        }
    }
}

impl Sender for RelaySender {
    fn send(
        &self,
        from: &str,
        to: &[String],
        message: &mut dyn MessageSource,
    ) -> mailwright_mime::Result<()> {
        self.deliver(from, to, message).map_err(Into::into)
    }
}

fn is_local_host(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_local_hosts() {
        assert!(is_local_host("localhost"));
        assert!(is_local_host("LOCALHOST"));
        assert!(is_local_host("127.0.0.1"));
        assert!(is_local_host("::1"));
        assert!(is_local_host("[::1]"));
        assert!(!is_local_host("smtp.example.com"));
        assert!(!is_local_host("10.0.0.1"));
    }

    #[test]
    fn test_invalid_envelope_fails_before_connecting() {
        // port 9 on a documentation address; never contacted
        let sender = RelaySender::new(RelayConfig::builder("192.0.2.1").port(9).build());
        let mut part = mailwright_mime::Part::new("text/plain").unwrap();
        part.set_body("x");

        let err = sender
            .deliver("not an address", &["to@example.com".to_string()], &mut part)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));

        let err = sender.deliver("from@example.com", &[], &mut part).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }
}
