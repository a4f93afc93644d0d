//! Relay configuration types.

use crate::error::Result;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Security {
    /// Upgrade with STARTTLS when the server offers it, otherwise stay in
    /// plaintext (port 587).
    #[default]
    Opportunistic,
    /// Fail unless the server offers STARTTLS (port 587).
    Required,
    /// TLS from the first byte (port 465).
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Opportunistic | Self::Required => 587,
            Self::Implicit => 465,
        }
    }
}

/// Username and password for SMTP AUTH.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Credentials {
    /// Login name.
    pub username: String,
    /// Secret.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// TLS settings: the name the certificate must match and the rustls
/// client configuration.
#[derive(Debug, Clone)]
pub struct TlsParameters {
    server_name: ServerName<'static>,
    config: Arc<ClientConfig>,
}

impl TlsParameters {
    /// Verifies `host` against the webpki root store.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not a valid DNS name or IP address.
    pub fn new(host: &str) -> Result<Self> {
        let root_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        Self::with_config(host, Arc::new(config))
    }

    /// Uses a caller-supplied rustls configuration, e.g. with private roots.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not a valid DNS name or IP address.
    pub fn with_config(host: &str, config: Arc<ClientConfig>) -> Result<Self> {
        Ok(Self {
            server_name: ServerName::try_from(host.to_string())?,
            config,
        })
    }

    /// Returns the name the server certificate is checked against.
    #[must_use]
    pub const fn server_name(&self) -> &ServerName<'static> {
        &self.server_name
    }

    /// Returns the rustls client configuration.
    #[must_use]
    pub const fn config(&self) -> &Arc<ClientConfig> {
        &self.config
    }
}

/// SMTP relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Relay hostname.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Credentials; no AUTH is attempted without them.
    pub credentials: Option<Credentials>,
    /// TLS settings; defaults to webpki roots pinned to `host`.
    pub tls: Option<TlsParameters>,
    /// Name sent with EHLO.
    pub helo_name: String,
    /// Bound on connect and on each socket read or write.
    pub timeout: Option<Duration>,
}

impl RelayConfig {
    /// Creates a configuration with opportunistic STARTTLS on port 587.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        RelayConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> RelayConfigBuilder {
        RelayConfigBuilder::new(host)
    }

    /// Returns the configured TLS settings, or defaults for `host`.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not a valid server name.
    pub fn tls_parameters(&self) -> Result<TlsParameters> {
        match &self.tls {
            Some(tls) => Ok(tls.clone()),
            None => TlsParameters::new(&self.host),
        }
    }
}

/// Builder for relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    credentials: Option<Credentials>,
    tls: Option<TlsParameters>,
    helo_name: Option<String>,
    timeout: Option<Duration>,
}

impl RelayConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::default(),
            credentials: None,
            tls: None,
            helo_name: None,
            timeout: None,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the AUTH credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the TLS parameters.
    #[must_use]
    pub fn tls(mut self, tls: TlsParameters) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Sets the name sent with EHLO.
    #[must_use]
    pub fn helo_name(mut self, name: impl Into<String>) -> Self {
        self.helo_name = Some(name.into());
        self
    }

    /// Sets the connect and I/O timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> RelayConfig {
        RelayConfig {
            host: self.host,
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            security: self.security,
            credentials: self.credentials,
            tls: self.tls,
            helo_name: self.helo_name.unwrap_or_else(local_hostname),
            timeout: self.timeout,
        }
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(Security::Opportunistic.default_port(), 587);
        assert_eq!(Security::Required.default_port(), 587);
        assert_eq!(Security::Implicit.default_port(), 465);
    }

    #[test]
    fn test_config_new() {
        let config = RelayConfig::new("smtp.example.com");
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.security, Security::Opportunistic);
        assert!(config.credentials.is_none());
        assert!(config.timeout.is_none());
        assert!(!config.helo_name.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = RelayConfig::builder("smtp.example.com")
            .security(Security::Implicit)
            .credentials(Credentials::new("user", "secret"))
            .helo_name("client.example.com")
            .timeout(Duration::from_secs(10))
            .build();

        assert_eq!(config.port, 465);
        assert_eq!(config.helo_name, "client.example.com");
        assert_eq!(config.timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.credentials.unwrap().username, "user");
    }

    #[test]
    fn test_explicit_port_wins() {
        let config = RelayConfig::builder("smtp.example.com")
            .security(Security::Implicit)
            .port(2465)
            .build();
        assert_eq!(config.port, 2465);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let debug = format!("{:?}", Credentials::new("user", "hunter2"));
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_tls_parameters() {
        let tls = TlsParameters::new("smtp.example.com").unwrap();
        assert_eq!(
            tls.server_name(),
            &ServerName::try_from("smtp.example.com").unwrap()
        );
        assert!(TlsParameters::new("not a host name").is_err());
    }

    #[test]
    fn test_default_tls_parameters_follow_host() {
        let config = RelayConfig::new("mx.example.org");
        let tls = config.tls_parameters().unwrap();
        assert_eq!(
            tls.server_name(),
            &ServerName::try_from("mx.example.org").unwrap()
        );
    }
}
