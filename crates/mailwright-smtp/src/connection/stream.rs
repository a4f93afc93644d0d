//! Low-level SMTP stream handling.

use crate::config::TlsParameters;
use crate::error::{Error, Result};
use rustls::{ClientConnection, StreamOwned};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<TlsStream>>),
}

impl SmtpStream {
    /// Reads a line from the stream, without the line terminator.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the server closed the
    /// connection.
    pub fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = match self {
            Self::Tcp(reader) => reader.read_line(&mut line)?,
            Self::Tls(reader) => reader.read_line(&mut line)?,
        };
        if read == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer();
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    /// Returns the underlying writer, bypassing the read buffer.
    pub(crate) fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Tcp(reader) => reader.get_mut(),
            Self::Tls(reader) => reader.get_mut(),
        }
    }

    /// Returns true if the stream is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Upgrades a TCP stream to TLS.
    ///
    /// The handshake runs lazily on the first read or write.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted or the TLS
    /// session cannot be created.
    pub fn upgrade_to_tls(self, tls: &TlsParameters) -> Result<Self> {
        let tcp_stream = match self {
            Self::Tcp(reader) => {
                if !reader.buffer().is_empty() {
                    return Err(Error::Protocol(
                        "Server sent data before the TLS handshake".into(),
                    ));
                }
                reader.into_inner()
            }
            Self::Tls(_) => return Err(Error::Protocol("Already using TLS".into())),
        };
        wrap_tls(tcp_stream, tls)
    }
}

/// Connects to an SMTP server over plain TCP.
///
/// With a timeout, each resolved address gets the full connect timeout and
/// the socket's read and write timeouts are set to it as well.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub fn connect(hostname: &str, port: u16, timeout: Option<Duration>) -> Result<SmtpStream> {
    Ok(SmtpStream::Tcp(BufReader::new(open(hostname, port, timeout)?)))
}

/// Connects to an SMTP server over TLS (implicit TLS on port 465).
///
/// # Errors
///
/// Returns an error if the connection or TLS setup fails.
pub fn connect_tls(
    hostname: &str,
    port: u16,
    timeout: Option<Duration>,
    tls: &TlsParameters,
) -> Result<SmtpStream> {
    wrap_tls(open(hostname, port, timeout)?, tls)
}

fn open(hostname: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream> {
    let Some(timeout) = timeout else {
        return Ok(TcpStream::connect((hostname, port))?);
    };

    let mut last_err = None;
    for addr in (hostname, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(Error::Io(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{hostname} did not resolve to any address"),
        )
    })))
}

fn wrap_tls(tcp_stream: TcpStream, tls: &TlsParameters) -> Result<SmtpStream> {
    let connection = ClientConnection::new(tls.config().clone(), tls.server_name().clone())?;
    Ok(SmtpStream::Tls(Box::new(BufReader::new(StreamOwned::new(
        connection, tcp_stream,
    )))))
}
