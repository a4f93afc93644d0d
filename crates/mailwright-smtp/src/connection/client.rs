//! Type-state SMTP client.

use super::{DataWriter, ServerInfo, SmtpStream};
use crate::command::Command;
use crate::config::TlsParameters;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashSet;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use tracing::{debug, trace};

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// SMTP client with type-state pattern.
///
/// Dropping a client in any state closes the connection.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    _state: PhantomData<State>,
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;
}

impl<S> SmtpConnection for Client<S> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or if the server returns an error.
    pub fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        let greeting = read_reply(&mut stream)?.expect_code(ReplyCode::SERVICE_READY)?;

        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        debug!(server = %hostname, "SMTP greeting received");

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            _state: PhantomData,
        })
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command fails.
    pub fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        self.refresh_extensions(client_hostname)?;
        Ok(self)
    }

    /// Upgrades the connection to TLS using STARTTLS and repeats EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not supported or if the upgrade fails.
    pub fn starttls(mut self, tls: &TlsParameters, client_hostname: &str) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        self.send_command(&Command::StartTls)?
            .expect_code(ReplyCode::SERVICE_READY)?;

        self.stream = self.stream.upgrade_to_tls(tls)?;
        debug!("Connection upgraded to TLS");

        // Capabilities may differ once encrypted
        self.refresh_extensions(client_hostname)?;
        Ok(self)
    }

    /// Authenticates using the PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub fn auth_plain(mut self, username: &str, password: &str) -> Result<Client<Authenticated>> {
        let credentials = format!("\0{username}\0{password}");
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(STANDARD.encode(credentials.as_bytes())),
        };

        self.send_command(&cmd)?.expect_success()?;
        debug!(mechanism = "PLAIN", "Authenticated");
        Ok(self.transition())
    }

    /// Authenticates using the LOGIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects either challenge response.
    pub fn auth_login(mut self, username: &str, password: &str) -> Result<Client<Authenticated>> {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        self.send_command(&cmd)?
            .expect_code(ReplyCode::AUTH_CONTINUE)?;

        let cmd = Command::AuthResponse(STANDARD.encode(username.as_bytes()));
        self.send_command(&cmd)?
            .expect_code(ReplyCode::AUTH_CONTINUE)?;

        let cmd = Command::AuthResponse(STANDARD.encode(password.as_bytes()));
        self.send_command(&cmd)?.expect_success()?;
        debug!(mechanism = "LOGIN", "Authenticated");
        Ok(self.transition())
    }

    /// Starts a mail transaction without authentication (if server allows).
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub fn mail_from(self, from: Address) -> Result<Client<MailTransaction>> {
        self.start_transaction(from)
    }

    fn refresh_extensions(&mut self, client_hostname: &str) -> Result<()> {
        let cmd = Command::Ehlo {
            hostname: client_hostname.to_string(),
        };
        let reply = self.send_command(&cmd)?.expect_success()?;

        // First line is the server's greeting, the rest are keywords
        self.server_info.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
        Ok(())
    }
}

impl Client<Authenticated> {
    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub fn mail_from(self, from: Address) -> Result<Client<MailTransaction>> {
        self.start_transaction(from)
    }
}

impl Client<MailTransaction> {
    /// Adds the first recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub fn rcpt_to(mut self, to: Address) -> Result<Client<RecipientAdded>> {
        self.add_recipient(to)?;
        Ok(self.transition())
    }

    /// Resets the transaction and returns to connected state.
    ///
    /// # Errors
    ///
    /// Returns an error if the RSET command fails.
    pub fn reset(self) -> Result<Client<Connected>> {
        self.reset_transaction()
    }
}

impl Client<RecipientAdded> {
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub fn rcpt_to(mut self, to: Address) -> Result<Self> {
        self.add_recipient(to)?;
        Ok(self)
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error if the DATA command fails.
    pub fn data(mut self) -> Result<Client<Data>> {
        self.send_command(&Command::Data)?
            .expect_code(ReplyCode::START_DATA)?;
        Ok(self.transition())
    }

    /// Resets the transaction and returns to connected state.
    ///
    /// # Errors
    ///
    /// Returns an error if the RSET command fails.
    pub fn reset(self) -> Result<Client<Connected>> {
        self.reset_transaction()
    }
}

impl Client<Data> {
    /// Streams the message content and completes the transaction.
    ///
    /// `write` receives a writer that applies dot-stuffing and CRLF
    /// normalization; the terminating `.` line is added afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if `write` fails, the connection fails or the server
    /// rejects the message.
    pub fn stream_message<F>(mut self, write: F) -> Result<Client<Connected>>
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        {
            let mut data = DataWriter::new(BufWriter::new(self.stream.writer()));
            write(&mut data)?;
            data.finish()?;
        }

        read_reply(&mut self.stream)?.expect_success()?;
        debug!("Message accepted");
        Ok(self.transition())
    }

    /// Sends an already serialized message and completes the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if sending the message fails or server rejects it.
    pub fn send_message(self, message: &[u8]) -> Result<Client<Connected>> {
        self.stream_message(|out| Ok(out.write_all(message)?))
    }
}

// Common implementation for all states
impl<S> Client<S> {
    fn send_command(&mut self, cmd: &Command) -> Result<Reply> {
        debug!(command = cmd.verb(), "Sending SMTP command");
        self.stream.write_all(&cmd.serialize())?;
        read_reply(&mut self.stream)
    }

    fn transition<T>(self) -> Client<T> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            _state: PhantomData,
        }
    }

    fn start_transaction(mut self, from: Address) -> Result<Client<MailTransaction>> {
        let body = self
            .server_info
            .supports(&Extension::EightBitMime)
            .then(|| "8BITMIME".to_string());
        self.send_command(&Command::MailFrom { from, body })?
            .expect_success()?;
        Ok(self.transition())
    }

    fn add_recipient(&mut self, to: Address) -> Result<()> {
        self.send_command(&Command::RcptTo { to })?
            .expect_success()?;
        Ok(())
    }

    fn reset_transaction(mut self) -> Result<Client<Connected>> {
        self.send_command(&Command::Rset)?.expect_success()?;
        Ok(self.transition())
    }

    /// Returns true if the connection is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub fn quit(mut self) -> Result<()> {
        let reply = self.send_command(&Command::Quit)?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        Ok(())
    }
}

fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line()?;
        trace!(line = %line, "SMTP reply line");
        let is_last = is_last_reply_line(&line);
        lines.push(line);
        if is_last {
            break;
        }
    }
    parse_reply(&lines)
}
