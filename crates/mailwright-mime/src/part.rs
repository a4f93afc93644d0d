//! The MIME part tree and its serializer.

use crate::boundary;
use crate::content_type::ContentType;
use crate::encoding::{BodyEncoder, TransferEncoding};
use crate::error::{Error, Result};
use crate::header::{Headers, encoded_words, needs_encoded_words};
use std::fmt;
use std::io::{self, Cursor, Read, Write};

/// Text written before the first boundary of a multipart message.
pub const PREAMBLE: &str =
    "This is a message in Mime Format.  If you see this, your mail reader does not support this format.\r\n\r\n";

/// Callback producing a fresh body reader for every serialization pass.
pub type BodyProducer = Box<dyn FnMut() -> io::Result<Box<dyn Read + Send>> + Send>;

/// Body source of a leaf part.
enum Body {
    /// No body was ever assigned.
    Empty,
    /// A buffered body waiting to be written.
    Unread(Box<dyn Read + Send>),
    /// The buffered body has been written.
    Consumed,
}

impl Body {
    const fn state(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Unread(_) => "unread",
            Self::Consumed => "consumed",
        }
    }
}

/// A node in a MIME message tree.
///
/// A part is either a container holding child parts or a leaf holding a
/// body. Defaults for `Content-Type` and `Content-Transfer-Encoding` are
/// derived from the type when the part is created:
///
/// - `multipart/*` gets a random boundary and `7bit`
/// - `message/rfc822` gets no defaults
/// - `text/*` gets `quoted-printable`
/// - anything else gets `base64`
pub struct Part {
    content_type: ContentType,
    children: Vec<Self>,
    body: Body,
    producer: Option<BodyProducer>,
    headers: Headers,
    boundary: Option<String>,
    encoding: TransferEncoding,
}

impl Part {
    /// Creates a part of the given type.
    ///
    /// A `boundary` parameter on a multipart type is used instead of a
    /// generated one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContentType`] if `content_type` does not parse,
    /// or [`Error::Entropy`] if no boundary could be generated.
    pub fn new(content_type: &str) -> Result<Self> {
        let mut content_type = ContentType::parse(content_type)?;
        let mut headers = Headers::new();
        let mut boundary = None;

        let encoding = if content_type.is_multipart() {
            let token = match content_type.boundary() {
                Some(given) => given.to_string(),
                None => boundary::generate()?,
            };
            content_type.parameters.retain(|(key, _)| key != "boundary");
            headers.set("Content-Type", with_boundary(&content_type, &token));
            boundary = Some(token);
            TransferEncoding::SevenBit
        } else if content_type.is_message() {
            TransferEncoding::SevenBit
        } else if content_type.is_text() {
            headers.set("Content-Type", content_type.to_string());
            TransferEncoding::QuotedPrintable
        } else {
            headers.set("Content-Type", content_type.to_string());
            TransferEncoding::Base64
        };

        if !content_type.is_message() {
            headers.set("Content-Transfer-Encoding", encoding.as_str());
        }

        Ok(Self {
            content_type,
            children: Vec::new(),
            body: Body::Empty,
            producer: None,
            headers,
            boundary,
            encoding,
        })
    }

    /// Creates a leaf part holding `data`.
    ///
    /// # Errors
    ///
    /// Same as [`Part::new`].
    pub fn with_body(content_type: &str, data: impl Into<Vec<u8>>) -> Result<Self> {
        let mut part = Self::new(content_type)?;
        part.set_body(data);
        Ok(part)
    }

    /// Creates an attachment part with a `Content-Disposition` naming the file.
    ///
    /// # Errors
    ///
    /// Same as [`Part::new`].
    pub fn attachment(content_type: &str, filename: &str) -> Result<Self> {
        let mut part = Self::new(content_type)?;
        let quoted = quote_filename(filename);
        part.headers
            .set("Content-Type", format!("{}; name={quoted}", part.content_type));
        part.headers
            .set("Content-Disposition", format!("attachment; filename={quoted}"));
        Ok(part)
    }

    /// Returns the parsed type of this part.
    #[must_use]
    pub const fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    /// Returns true for `multipart/*` parts.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.content_type.is_multipart()
    }

    /// Returns true for `message/rfc822` parts.
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.content_type.is_message()
    }

    /// Returns true if the part may hold children.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.is_multipart() || self.is_message()
    }

    /// Returns true if serializing this part would produce no content.
    ///
    /// A single child is looked through; a part with several children is
    /// never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self.children.as_slice() {
            [only] => only.is_empty(),
            [] => self.producer.is_none() && !matches!(self.body, Body::Unread(_)),
            _ => false,
        }
    }

    /// Returns true if some part in the tree has neither children nor a
    /// body left to write.
    ///
    /// Writing such a tree fails with [`Error::PartHasNoBody`] or
    /// [`Error::BodyConsumed`] once that part is reached.
    #[must_use]
    pub fn has_missing_body(&self) -> bool {
        if self.children.is_empty() {
            self.producer.is_none() && !matches!(self.body, Body::Unread(_))
        } else {
            self.children.iter().any(Self::has_missing_body)
        }
    }

    /// Appends a child part.
    pub fn append(&mut self, child: Self) {
        self.children.push(child);
    }

    /// Returns the child parts.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    /// Returns the child parts mutably.
    pub fn children_mut(&mut self) -> &mut Vec<Self> {
        &mut self.children
    }

    /// Returns the part headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the part headers mutably.
    pub const fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Returns the multipart boundary.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    /// Replaces the multipart boundary and the `Content-Type` header.
    pub fn set_boundary(&mut self, boundary: impl Into<String>) {
        let boundary = boundary.into();
        self.headers.set(
            "Content-Type",
            with_boundary(&self.content_type, &boundary),
        );
        self.boundary = Some(boundary);
    }

    /// Returns the transfer encoding applied to the body.
    #[must_use]
    pub const fn transfer_encoding(&self) -> TransferEncoding {
        self.encoding
    }

    /// Overrides the transfer encoding and its header.
    pub fn set_transfer_encoding(&mut self, encoding: TransferEncoding) {
        self.encoding = encoding;
        self.headers
            .set("Content-Transfer-Encoding", encoding.as_str());
    }

    /// Sets a buffered body, replacing any unread one.
    pub fn set_body(&mut self, data: impl Into<Vec<u8>>) {
        self.body = Body::Unread(Box::new(Cursor::new(data.into())));
    }

    /// Sets a reader as the body. It is drained by the next serialization.
    pub fn set_reader(&mut self, reader: impl Read + Send + 'static) {
        self.body = Body::Unread(Box::new(reader));
    }

    /// Sets a callback producing the body whenever no buffered body is unread.
    ///
    /// A producer lets the same part be serialized more than once.
    pub fn set_body_producer<F>(&mut self, producer: F)
    where
        F: FnMut() -> io::Result<Box<dyn Read + Send>> + Send + 'static,
    {
        self.producer = Some(Box::new(producer));
    }

    /// Finds the first child with the given `type/subtype`.
    ///
    /// Direct children are searched first; with `recursive`, the children of
    /// container parts are then searched depth-first.
    #[must_use]
    pub fn find_type(&self, essence: &str, recursive: bool) -> Option<&Self> {
        if let Some(child) = self
            .children
            .iter()
            .find(|child| child.content_type.matches(essence))
        {
            return Some(child);
        }
        if !recursive {
            return None;
        }
        self.children
            .iter()
            .filter(|child| child.is_container())
            .find_map(|child| child.find_type(essence, true))
    }

    /// Mutable variant of [`Part::find_type`].
    pub fn find_type_mut(&mut self, essence: &str, recursive: bool) -> Option<&mut Self> {
        if let Some(index) = self
            .children
            .iter()
            .position(|child| child.content_type.matches(essence))
        {
            return self.children.get_mut(index);
        }
        if !recursive {
            return None;
        }
        self.children
            .iter_mut()
            .filter(|child| child.is_container())
            .find_map(|child| child.find_type_mut(essence, true))
    }

    /// Serializes the part, returning the number of bytes written.
    ///
    /// A buffered body is consumed; writing the part again needs a body
    /// producer.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered: a leaf without a body, a failing
    /// producer, or an I/O error from `out`.
    pub fn write_to<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64> {
        self.write_to_excluding(out, &[])
    }

    /// Like [`Part::write_to`], omitting the named top-level header fields.
    ///
    /// # Errors
    ///
    /// Same as [`Part::write_to`].
    pub fn write_to_excluding<W: Write + ?Sized>(
        &mut self,
        out: &mut W,
        exclude: &[&str],
    ) -> Result<u64> {
        let mut counter = CountingWriter { inner: out, count: 0 };
        self.serialize(&mut counter, exclude, true)?;
        Ok(counter.count)
    }

    fn serialize(&mut self, out: &mut dyn Write, exclude: &[&str], root: bool) -> Result<()> {
        let is_message = self.is_message();
        let mut headers = self.merged_headers();
        let node = self.flatten_mut();

        if node.children.len() > 1 {
            if node.boundary.is_none() {
                node.boundary = Some(boundary::generate()?);
            }
            let token = node.boundary.as_deref().unwrap_or_default();
            headers.set("Content-Type", with_boundary(&node.content_type, token));
        }

        tracing::trace!(
            content_type = %node.content_type,
            children = node.children.len(),
            body = node.body.state(),
            "Writing part"
        );

        out.write_all(&headers.encode(exclude))?;
        out.write_all(b"\r\n")?;

        let multipart_root = root
            && is_message
            && ContentType::parse(headers.get("Content-Type")).is_ok_and(|ct| ct.is_multipart());
        if multipart_root {
            out.write_all(PREAMBLE.as_bytes())?;
        }

        if node.children.is_empty() {
            let mut reader = node.take_body()?;
            let mut encoder = BodyEncoder::new(node.encoding, &mut *out);
            io::copy(&mut reader, &mut encoder)?;
            encoder.finish()?;
            return Ok(());
        }

        let token = node.boundary.clone().unwrap_or_default();
        for child in &mut node.children {
            write!(out, "\r\n--{token}\r\n")?;
            child.serialize(out, &[], false)?;
        }
        write!(out, "\r\n--{token}--\r\n")?;

        Ok(())
    }

    /// Headers of the single-child chain starting here, deeper parts winning.
    fn merged_headers(&self) -> Headers {
        let mut headers = self.headers.clone();
        let mut node = self;
        while let [only] = node.children.as_slice() {
            headers = headers.merge(&only.headers);
            node = only;
        }
        headers
    }

    /// End of the single-child chain starting here.
    fn flatten_mut(&mut self) -> &mut Self {
        let mut node = self;
        while node.children.len() == 1 {
            node = &mut node.children[0];
        }
        node
    }

    fn take_body(&mut self) -> Result<Box<dyn Read + Send>> {
        match std::mem::replace(&mut self.body, Body::Consumed) {
            Body::Unread(reader) => Ok(reader),
            Body::Empty => {
                if let Some(producer) = self.producer.as_mut() {
                    return producer().map_err(Error::Producer);
                }
                self.body = Body::Empty;
                Err(Error::PartHasNoBody)
            }
            Body::Consumed => match self.producer.as_mut() {
                Some(producer) => producer().map_err(Error::Producer),
                None => Err(Error::BodyConsumed),
            },
        }
    }
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("content_type", &self.content_type.essence())
            .field("headers", &self.headers)
            .field("boundary", &self.boundary)
            .field("encoding", &self.encoding)
            .field("body", &self.body.state())
            .field("producer", &self.producer.is_some())
            .field("children", &self.children)
            .finish()
    }
}

fn with_boundary(content_type: &ContentType, boundary: &str) -> String {
    content_type
        .clone()
        .with_parameter("boundary", boundary)
        .to_string()
}

/// Quoted `filename` parameter value; non-ASCII names become encoded words.
fn quote_filename(filename: &str) -> String {
    if needs_encoded_words(filename) {
        format!("\"{}\"", encoded_words(filename, usize::MAX).join(""))
    } else {
        format!("\"{}\"", escape_quoted(filename))
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

struct CountingWriter<'a, W: Write + ?Sized> {
    inner: &'a mut W,
    count: u64,
}

impl<W: Write + ?Sized> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
