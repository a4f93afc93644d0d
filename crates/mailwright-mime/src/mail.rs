//! The message envelope.

use crate::address::Mailbox;
use crate::boundary;
use crate::content_type::{ALTERNATIVE, MESSAGE_RFC822, MIXED, TEXT_HTML, TEXT_PLAIN};
use crate::error::{Error, Result};
use crate::part::Part;
use crate::transport::{MessageSource, Sender};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::fmt;
use std::io::Write;

/// An email ready to be composed, serialized and sent.
///
/// The body starts out as `message/rfc822` wrapping `multipart/mixed`
/// wrapping an empty `multipart/alternative`. Text and HTML bodies go into
/// the alternative container, attachments into the mixed one. Containers
/// with a single child are flattened away when the message is written, so a
/// text-only email serializes as a single part.
#[derive(Debug)]
pub struct Mail {
    from: Option<Mailbox>,
    reply_to: Vec<Mailbox>,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
    body: Part,
    date: DateTime<FixedOffset>,
    message_id: Option<String>,
}

impl Mail {
    /// Creates an empty email dated now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Entropy`] if no boundary could be generated.
    pub fn new() -> Result<Self> {
        let date = Utc::now().fixed_offset();
        let mut body = Part::new(MESSAGE_RFC822)?;
        body.headers_mut().set("MIME-Version", "1.0");
        body.headers_mut().set_date(&date);

        let mut mixed = Part::new(MIXED)?;
        mixed.append(Part::new(ALTERNATIVE)?);
        body.append(mixed);

        Ok(Self {
            from: None,
            reply_to: Vec::new(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            body,
            date,
            message_id: None,
        })
    }

    /// Sets the sender. An empty `name` means no display name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address is invalid.
    pub fn set_from(&mut self, address: &str, name: &str) -> Result<()> {
        self.from = Some(Mailbox::with_name(name, address)?);
        Ok(())
    }

    /// Adds a `Reply-To` mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address is invalid.
    pub fn add_reply_to(&mut self, address: &str, name: &str) -> Result<()> {
        self.reply_to.push(Mailbox::with_name(name, address)?);
        Ok(())
    }

    /// Adds a primary recipient.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address is invalid.
    pub fn add_to(&mut self, address: &str, name: &str) -> Result<()> {
        self.to.push(Mailbox::with_name(name, address)?);
        Ok(())
    }

    /// Adds a carbon-copy recipient.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address is invalid.
    pub fn add_cc(&mut self, address: &str, name: &str) -> Result<()> {
        self.cc.push(Mailbox::with_name(name, address)?);
        Ok(())
    }

    /// Adds a blind carbon-copy recipient.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address is invalid.
    pub fn add_bcc(&mut self, address: &str, name: &str) -> Result<()> {
        self.bcc.push(Mailbox::with_name(name, address)?);
        Ok(())
    }

    /// Returns the sender.
    #[must_use]
    pub const fn from(&self) -> Option<&Mailbox> {
        self.from.as_ref()
    }

    /// Returns the `Reply-To` mailboxes.
    #[must_use]
    pub fn reply_to(&self) -> &[Mailbox] {
        &self.reply_to
    }

    /// Returns the primary recipients.
    #[must_use]
    pub fn to(&self) -> &[Mailbox] {
        &self.to
    }

    /// Returns the carbon-copy recipients.
    #[must_use]
    pub fn cc(&self) -> &[Mailbox] {
        &self.cc
    }

    /// Returns the blind carbon-copy recipients.
    #[must_use]
    pub fn bcc(&self) -> &[Mailbox] {
        &self.bcc
    }

    /// Sets the subject.
    pub fn set_subject(&mut self, subject: &str) {
        self.body.headers_mut().set("Subject", subject);
    }

    /// Replaces the date recorded when the email was created.
    pub fn set_date<Tz: TimeZone>(&mut self, date: &DateTime<Tz>)
    where
        Tz::Offset: fmt::Display,
    {
        self.date = date.fixed_offset();
        self.body.headers_mut().set_date(&self.date);
    }

    /// Sets the message identifier, without angle brackets.
    pub fn set_message_id(&mut self, id: impl Into<String>) {
        self.message_id = Some(id.into());
    }

    /// Returns the message identifier, if set or already generated.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Returns the root part.
    #[must_use]
    pub const fn body(&self) -> &Part {
        &self.body
    }

    /// Returns the root part mutably.
    pub const fn body_mut(&mut self) -> &mut Part {
        &mut self.body
    }

    /// Sets the `text/plain` alternative.
    ///
    /// # Errors
    ///
    /// Same as [`Mail::set_alternative`].
    pub fn set_body_text(&mut self, text: &str) -> Result<()> {
        self.set_alternative(TEXT_PLAIN, text)
    }

    /// Sets the `text/html` alternative.
    ///
    /// # Errors
    ///
    /// Same as [`Mail::set_alternative`].
    pub fn set_body_html(&mut self, html: &str) -> Result<()> {
        self.set_alternative(TEXT_HTML, html)
    }

    /// Sets the body of the alternative of the given type.
    ///
    /// An existing alternative of that type gets its body replaced;
    /// otherwise a new part is appended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAlternativeContainer`] if the tree has no
    /// `multipart/alternative` part, or an error from [`Part::new`].
    pub fn set_alternative(&mut self, content_type: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        let alternative = self
            .body
            .find_type_mut(ALTERNATIVE, true)
            .ok_or(Error::NoAlternativeContainer)?;

        if let Some(existing) = alternative.find_type_mut(content_type, false) {
            existing.set_body(data);
            return Ok(());
        }

        alternative.append(Part::with_body(content_type, data)?);
        Ok(())
    }

    /// Appends a part, usually an attachment, to the mixed container.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMixedContainer`] if the tree has no
    /// `multipart/mixed` part.
    pub fn attach(&mut self, part: Part) -> Result<()> {
        self.body
            .find_type_mut(MIXED, true)
            .ok_or(Error::NoMixedContainer)?
            .append(part);
        Ok(())
    }

    /// Returns true if the email can be sent.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Checks that the email has a sender, a primary recipient and a body
    /// for every part that will be written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSender`], [`Error::NoRecipients`] or
    /// [`Error::EmptyBody`].
    pub fn validate(&self) -> Result<()> {
        if self.from.is_none() {
            return Err(Error::MissingSender);
        }
        if self.to.is_empty() {
            return Err(Error::NoRecipients);
        }
        if self.body.has_missing_body() {
            return Err(Error::EmptyBody);
        }
        Ok(())
    }

    /// Envelope recipients: To, Cc and Bcc addresses in that order.
    #[must_use]
    pub fn recipients(&self) -> Vec<String> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(|mailbox| mailbox.address().to_string())
            .collect()
    }

    /// Writes the transport headers from the envelope fields and the date.
    ///
    /// Empty fields remove their header. The message id is generated on
    /// first use from a random token and the sender's domain. Called
    /// automatically when the email is written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Entropy`] if a message id had to be generated and the
    /// random source failed.
    pub fn prepare_headers(&mut self) -> Result<()> {
        let headers = self.body.headers_mut();
        headers.set_date(&self.date);

        match &self.from {
            Some(from) => headers.set_address_list("From", std::slice::from_ref(from)),
            None => headers.remove("From"),
        }
        for (name, list) in [
            ("Reply-To", &self.reply_to),
            ("To", &self.to),
            ("Cc", &self.cc),
            // kept for agents that read recipients from headers
            ("Bcc", &self.bcc),
        ] {
            if list.is_empty() {
                headers.remove(name);
            } else {
                headers.set_address_list(name, list);
            }
        }

        let id = match &self.message_id {
            Some(id) => id.clone(),
            None => {
                let id = format!(
                    "{}@{}",
                    boundary::generate()?,
                    message_id_host(self.from.as_ref())
                );
                self.message_id = Some(id.clone());
                id
            }
        };
        self.body.headers_mut().set("Message-Id", format!("<{id}>"));

        Ok(())
    }

    /// Serializes the email, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Same as [`Part::write_to`].
    pub fn write_to<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64> {
        self.write_to_excluding(out, &[])
    }

    /// Serializes the email without the named top-level header fields.
    ///
    /// # Errors
    ///
    /// Same as [`Part::write_to`].
    pub fn write_to_excluding<W: Write + ?Sized>(
        &mut self,
        out: &mut W,
        exclude: &[&str],
    ) -> Result<u64> {
        self.prepare_headers()?;
        self.body.write_to_excluding(out, exclude)
    }

    /// Validates the email and hands it to `sender`.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any I/O, or the sender's error.
    pub fn send(&mut self, sender: &dyn Sender) -> Result<()> {
        self.validate()?;

        let from = self
            .from
            .as_ref()
            .map(|mailbox| mailbox.address().to_string())
            .ok_or(Error::MissingSender)?;
        let to = self.recipients();

        tracing::debug!(from = %from, recipients = to.len(), "Sending message");
        sender.send(&from, &to, self)
    }
}

impl MessageSource for Mail {
    fn write_message(&mut self, out: &mut dyn Write, exclude: &[&str]) -> Result<u64> {
        self.write_to_excluding(out, exclude)
    }
}

fn message_id_host(from: Option<&Mailbox>) -> String {
    let domain = from.map_or("", Mailbox::domain);
    if !domain.is_empty() && domain != "localhost" {
        return domain.to_string();
    }

    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
