//! MIME header handling.
//!
//! Field names are canonicalized on every access, so `content-type`,
//! `CONTENT-TYPE` and `Content-Type` address the same field. Serialization
//! is deterministic: fields are emitted in lexical order of their canonical
//! names, values in insertion order.

mod field;

pub use field::{
    AddressList, FieldEncoder, FieldEncoders, MAX_LINE_LENGTH, UnstructuredText, Verbatim,
    decode_encoded_word, encoded_words, needs_encoded_words,
};
pub(crate) use field::split_top_level;

use crate::address::Mailbox;
use crate::error::Result;
use chrono::{DateTime, FixedOffset, TimeZone};
use std::collections::BTreeMap;
use std::fmt;

/// Returns the canonical form of a header field name.
///
/// The first letter and every letter following a hyphen are upper-cased,
/// all others lower-cased: `message-id` becomes `Message-Id`. Names
/// containing bytes that are not valid in a field name are returned unchanged.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    if !name.bytes().all(is_token_byte) {
        return name.to_string();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}

const fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

/// Collection of email headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: BTreeMap<String, Vec<String>>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value to a field.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.fields
            .entry(canonical_name(name))
            .or_default()
            .push(value.into());
    }

    /// Sets a field, replacing any existing values.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(canonical_name(name), vec![value.into()]);
    }

    /// Gets the first value of a field, or `""` if it is absent.
    #[must_use]
    pub fn get(&self, name: &str) -> &str {
        self.fields
            .get(&canonical_name(name))
            .and_then(|values| values.first())
            .map_or("", String::as_str)
    }

    /// Gets all values of a field.
    #[must_use]
    pub fn get_all(&self, name: &str) -> &[String] {
        self.fields
            .get(&canonical_name(name))
            .map_or(&[], Vec::as_slice)
    }

    /// Removes all values of a field.
    pub fn remove(&mut self, name: &str) {
        self.fields.remove(&canonical_name(name));
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(&canonical_name(name))
    }

    /// Returns true if no field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns an iterator over `(name, value)` pairs in serialization order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    /// Parses the `Date` field as an RFC 5322 date-time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHeader`](crate::Error::MissingHeader) if there
    /// is no `Date` field, or [`Error::InvalidDate`](crate::Error::InvalidDate)
    /// if it does not parse.
    pub fn date(&self) -> Result<DateTime<FixedOffset>> {
        let value = self.get("Date");
        if value.is_empty() {
            return Err(crate::Error::MissingHeader("Date".to_string()));
        }
        Ok(DateTime::parse_from_rfc2822(value)?)
    }

    /// Sets the `Date` field.
    pub fn set_date<Tz: TimeZone>(&mut self, date: &DateTime<Tz>)
    where
        Tz::Offset: fmt::Display,
    {
        self.set("Date", date.to_rfc2822());
    }

    /// Sets a field to a comma separated list of mailboxes.
    pub fn set_address_list(&mut self, name: &str, mailboxes: &[Mailbox]) {
        self.set(name, Mailbox::format_list(mailboxes));
    }

    /// Parses all values of a field as mailbox lists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHeader`](crate::Error::MissingHeader) if the
    /// field is absent, or [`Error::InvalidAddress`](crate::Error::InvalidAddress)
    /// if any value is not a valid mailbox list.
    pub fn address_list(&self, name: &str) -> Result<Vec<Mailbox>> {
        let values = self.get_all(name);
        if values.is_empty() {
            return Err(crate::Error::MissingHeader(canonical_name(name)));
        }

        let mut mailboxes = Vec::new();
        for value in values {
            mailboxes.extend(Mailbox::parse_list(value)?);
        }
        Ok(mailboxes)
    }

    /// Returns a new collection holding the fields of `self` overridden by
    /// the fields of `other`.
    ///
    /// A field present in `other` replaces all values of that field in
    /// `self`; fields only in `self` are kept.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (name, values) in &other.fields {
            merged.fields.insert(name.clone(), values.clone());
        }
        merged
    }

    /// Serializes the header block with the standard field encoders.
    ///
    /// Fields named in `exclude` are skipped. The result does not include the
    /// blank line separating headers from the body.
    #[must_use]
    pub fn encode(&self, exclude: &[&str]) -> Vec<u8> {
        self.encode_with(FieldEncoders::standard(), exclude)
    }

    /// Serializes the header block with a custom encoder registry.
    #[must_use]
    pub fn encode_with(&self, encoders: &FieldEncoders, exclude: &[&str]) -> Vec<u8> {
        let excluded: Vec<String> = exclude.iter().map(|name| canonical_name(name)).collect();

        let mut out = Vec::new();
        for (name, values) in &self.fields {
            if excluded.contains(name) {
                continue;
            }
            let encoder = encoders.encoder_for(name);
            for value in values {
                encoder.encode(name, value, &mut out);
            }
        }
        out
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.encode(&[])))
    }
}
