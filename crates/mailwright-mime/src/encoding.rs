//! Content-transfer-encoding writers.
//!
//! Bodies are encoded while they stream to the output; nothing here buffers
//! more than one output line.

use base64::engine::GeneralPurpose;
use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderWriter;
use std::fmt;
use std::io::{self, Write};

/// Maximum quoted-printable line length, excluding CRLF (RFC 2045 section 6.7).
const QP_LINE_MAX: usize = 76;

/// Base64 line width used for bodies.
pub const BASE64_LINE_WIDTH: usize = 78;

/// Content transfer encoding of a leaf part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }

    /// Returns the header value for this encoding.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
            Self::Binary => "binary",
        }
    }

    /// Returns true if bodies are copied without transformation.
    #[must_use]
    pub const fn is_identity(self) -> bool {
        matches!(self, Self::SevenBit | Self::EightBit | Self::Binary)
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Streaming RFC 2045 quoted-printable encoder in text mode.
///
/// CR, LF and CRLF in the input all become a single CRLF. Trailing spaces
/// and tabs before a line break are encoded. Lines never exceed 76
/// characters. No line break is added at the end of the data.
#[derive(Debug)]
pub struct QuotedPrintableWriter<W: Write> {
    inner: W,
    line: [u8; QP_LINE_MAX + 2],
    len: usize,
    cr: bool,
}

impl<W: Write> QuotedPrintableWriter<W> {
    /// Creates an encoder writing to `inner`.
    pub const fn new(inner: W) -> Self {
        Self {
            inner,
            line: [0; QP_LINE_MAX + 2],
            len: 0,
            cr: false,
        }
    }

    /// Writes any pending output and returns the inner writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the inner writer fails.
    pub fn finish(mut self) -> io::Result<W> {
        self.encode_trailing_whitespace()?;
        self.flush_line()?;
        Ok(self.inner)
    }

    fn put_literal(&mut self, b: u8) -> io::Result<()> {
        if self.len == QP_LINE_MAX - 1 {
            self.soft_break()?;
        }
        self.line[self.len] = b;
        self.len += 1;
        self.cr = false;
        Ok(())
    }

    fn put_encoded(&mut self, b: u8) -> io::Result<()> {
        const HEX: &[u8; 16] = b"0123456789ABCDEF";

        if QP_LINE_MAX - 1 - self.len < 3 {
            self.soft_break()?;
        }
        self.line[self.len] = b'=';
        self.line[self.len + 1] = HEX[usize::from(b >> 4)];
        self.line[self.len + 2] = HEX[usize::from(b & 0x0f)];
        self.len += 3;
        self.cr = false;
        Ok(())
    }

    fn put_break(&mut self, b: u8) -> io::Result<()> {
        if self.cr && b == b'\n' {
            self.cr = false;
            return Ok(());
        }
        self.encode_trailing_whitespace()?;
        self.crlf()?;
        // set last, encoding the trailing whitespace clears it
        self.cr = b == b'\r';
        Ok(())
    }

    fn encode_trailing_whitespace(&mut self) -> io::Result<()> {
        if self.len == 0 {
            return Ok(());
        }
        let last = self.line[self.len - 1];
        if last == b' ' || last == b'\t' {
            self.len -= 1;
            self.put_encoded(last)?;
        }
        Ok(())
    }

    fn soft_break(&mut self) -> io::Result<()> {
        self.line[self.len] = b'=';
        self.len += 1;
        self.crlf()
    }

    fn crlf(&mut self) -> io::Result<()> {
        self.line[self.len] = b'\r';
        self.line[self.len + 1] = b'\n';
        self.len += 2;
        self.flush_line()
    }

    fn flush_line(&mut self) -> io::Result<()> {
        self.inner.write_all(&self.line[..self.len])?;
        self.len = 0;
        Ok(())
    }
}

impl<W: Write> Write for QuotedPrintableWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &b in buf {
            match b {
                b'=' => self.put_encoded(b)?,
                b'!'..=b'~' | b' ' | b'\t' => self.put_literal(b)?,
                b'\r' | b'\n' => self.put_break(b)?,
                _ => self.put_encoded(b)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // a partial line may still need its trailing whitespace encoded
        self.inner.flush()
    }
}

/// Writer that inserts CRLF after every `width` bytes.
///
/// `finish` terminates a final partial line with CRLF.
#[derive(Debug)]
pub struct LineWrapper<W: Write> {
    inner: W,
    width: usize,
    line: Vec<u8>,
}

impl<W: Write> LineWrapper<W> {
    /// Creates a wrapper emitting lines of `width` bytes.
    ///
    /// A zero width is treated as one.
    #[must_use]
    pub fn new(inner: W, width: usize) -> Self {
        let width = width.max(1);
        Self {
            inner,
            width,
            line: Vec::with_capacity(width),
        }
    }

    /// Writes the final partial line and returns the inner writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the inner writer fails.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.line.is_empty() {
            self.inner.write_all(&self.line)?;
            self.inner.write_all(b"\r\n")?;
            self.line.clear();
        }
        Ok(self.inner)
    }
}

impl<W: Write> Write for LineWrapper<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while self.line.len() + rest.len() >= self.width {
            let take = self.width - self.line.len();
            self.inner.write_all(&self.line)?;
            self.line.clear();
            self.inner.write_all(&rest[..take])?;
            self.inner.write_all(b"\r\n")?;
            rest = &rest[take..];
        }
        self.line.extend_from_slice(rest);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Standard-alphabet base64 encoder producing 78-column lines.
pub type Base64Writer<W> = EncoderWriter<'static, GeneralPurpose, LineWrapper<W>>;

/// Creates a [`Base64Writer`] over `inner`.
pub fn base64_writer<W: Write>(inner: W) -> Base64Writer<W> {
    EncoderWriter::new(LineWrapper::new(inner, BASE64_LINE_WIDTH), &STANDARD)
}

/// Transfer encoder selected for one leaf body.
#[derive(Debug)]
pub enum BodyEncoder<W: Write> {
    /// Bytes are copied unchanged.
    Identity(W),
    /// Quoted-printable text encoding.
    QuotedPrintable(QuotedPrintableWriter<W>),
    /// Line-wrapped base64.
    Base64(Base64Writer<W>),
}

impl<W: Write> BodyEncoder<W> {
    /// Wraps `inner` in the encoder for `encoding`.
    pub fn new(encoding: TransferEncoding, inner: W) -> Self {
        match encoding {
            TransferEncoding::QuotedPrintable => {
                Self::QuotedPrintable(QuotedPrintableWriter::new(inner))
            }
            TransferEncoding::Base64 => Self::Base64(base64_writer(inner)),
            TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
                Self::Identity(inner)
            }
        }
    }

    /// Flushes trailing encoder state and returns the inner writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the inner writer fails.
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::Identity(inner) => Ok(inner),
            Self::QuotedPrintable(qp) => qp.finish(),
            Self::Base64(mut b64) => b64.finish()?.finish(),
        }
    }
}

impl<W: Write> Write for BodyEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Identity(inner) => inner.write(buf),
            Self::QuotedPrintable(qp) => qp.write(buf),
            Self::Base64(b64) => b64.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Identity(inner) => inner.flush(),
            Self::QuotedPrintable(qp) => qp.flush(),
            Self::Base64(b64) => b64.flush(),
        }
    }
}
