//! Per-field header encoding strategies.
//!
//! Every header line is produced by a [`FieldEncoder`] picked by field name.
//! Unknown fields are written verbatim; `Subject` gets RFC 2047 encoded words
//! and whitespace folding, address fields are folded between mailboxes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use super::canonical_name;

/// Maximum header line length, excluding CRLF (RFC 5322 section 2.1.1).
pub const MAX_LINE_LENGTH: usize = 78;

const WORD_PREFIX: &str = "=?utf-8?B?";
const WORD_SUFFIX: &str = "?=";

/// Strategy that writes one complete header field.
pub trait FieldEncoder: Send + Sync + fmt::Debug {
    /// Appends `name: value` to `out`, including the terminating CRLF.
    fn encode(&self, name: &str, value: &str, out: &mut Vec<u8>);
}

/// Writes `name: value` unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl FieldEncoder for Verbatim {
    fn encode(&self, name: &str, value: &str, out: &mut Vec<u8>) {
        push_field_start(name, out);
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
}

/// Unstructured text such as `Subject`.
///
/// Printable ASCII is folded at whitespace; anything else becomes a run of
/// base64 encoded words.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnstructuredText;

impl FieldEncoder for UnstructuredText {
    fn encode(&self, name: &str, value: &str, out: &mut Vec<u8>) {
        if needs_encoded_words(value) {
            push_field_start(name, out);
            let first = MAX_LINE_LENGTH.saturating_sub(name.len() + 2);
            let words = encoded_words(value, first);
            out.extend_from_slice(words.join("\r\n ").as_bytes());
            out.extend_from_slice(b"\r\n");
        } else {
            fold_at_whitespace(name, value, out);
        }
    }
}

/// Comma separated mailbox lists such as `To` or `From`.
///
/// Lines break after the separating comma. A mailbox too wide for a line of
/// its own is folded at the whitespace inside it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressList;

impl FieldEncoder for AddressList {
    fn encode(&self, name: &str, value: &str, out: &mut Vec<u8>) {
        push_field_start(name, out);

        let items: Vec<&str> = split_top_level(value, ',')
            .into_iter()
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect();

        let mut line_len = name.len() + 2;
        for (i, item) in items.iter().enumerate() {
            // room for the comma that follows every item but the last
            let comma = usize::from(i + 1 < items.len());
            if i > 0 {
                if line_len + 2 + item.len() + comma > MAX_LINE_LENGTH {
                    out.extend_from_slice(b",\r\n ");
                    line_len = 1;
                } else {
                    out.extend_from_slice(b", ");
                    line_len += 2;
                }
            }
            line_len = push_folded(item, line_len, comma, out);
        }

        out.extend_from_slice(b"\r\n");
    }
}

/// Appends `item` starting at column `line_len`, folding before a
/// whitespace token that would overflow the line with `reserve` columns kept
/// free. Returns the new line length.
fn push_folded(item: &str, mut line_len: usize, reserve: usize, out: &mut Vec<u8>) -> usize {
    for (i, token) in whitespace_tokens(item).into_iter().enumerate() {
        if i > 0 && line_len + token.len() + reserve > MAX_LINE_LENGTH {
            out.extend_from_slice(b"\r\n");
            line_len = 0;
        }
        out.extend_from_slice(token.as_bytes());
        line_len += token.len();
    }
    line_len
}

/// Registry mapping field names to encoding strategies.
#[derive(Debug)]
pub struct FieldEncoders {
    by_name: BTreeMap<String, Box<dyn FieldEncoder>>,
    fallback: Box<dyn FieldEncoder>,
}

impl FieldEncoders {
    /// Creates a registry that writes every field verbatim.
    #[must_use]
    pub fn verbatim() -> Self {
        Self {
            by_name: BTreeMap::new(),
            fallback: Box::new(Verbatim),
        }
    }

    /// Binds `encoder` to the field `name`, replacing any previous binding.
    #[must_use]
    pub fn with(mut self, name: &str, encoder: impl FieldEncoder + 'static) -> Self {
        self.by_name.insert(canonical_name(name), Box::new(encoder));
        self
    }

    /// Replaces the strategy used for unregistered fields.
    #[must_use]
    pub fn with_fallback(mut self, encoder: impl FieldEncoder + 'static) -> Self {
        self.fallback = Box::new(encoder);
        self
    }

    /// Returns the strategy for a field.
    #[must_use]
    pub fn encoder_for(&self, name: &str) -> &dyn FieldEncoder {
        self.by_name
            .get(&canonical_name(name))
            .map_or(self.fallback.as_ref(), |encoder| encoder.as_ref())
    }

    /// Returns the shared default registry.
    pub fn standard() -> &'static Self {
        static STANDARD_ENCODERS: LazyLock<FieldEncoders> = LazyLock::new(FieldEncoders::default);
        &STANDARD_ENCODERS
    }
}

impl Default for FieldEncoders {
    fn default() -> Self {
        Self::verbatim()
            .with("Subject", UnstructuredText)
            .with("From", AddressList)
            .with("To", AddressList)
            .with("Cc", AddressList)
            .with("Reply-To", AddressList)
    }
}

fn push_field_start(name: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
}

/// Returns true if `text` cannot be written as a plain header value.
#[must_use]
pub fn needs_encoded_words(text: &str) -> bool {
    text.contains("=?")
        || text
            .chars()
            .any(|c| !(c == ' ' || c == '\t' || c.is_ascii_graphic()))
}

/// Encodes `text` as RFC 2047 base64 encoded words.
///
/// The first word fits in `first_line_room` columns, the following ones in a
/// continuation line. Words never split a UTF-8 character.
#[must_use]
pub fn encoded_words(text: &str, first_line_room: usize) -> Vec<String> {
    let overhead = WORD_PREFIX.len() + WORD_SUFFIX.len();
    let capacity = |room: usize| (room.saturating_sub(overhead) / 4 * 3).max(4);

    let mut words = Vec::new();
    let mut max_bytes = capacity(first_line_room);
    let mut start = 0;

    while start < text.len() {
        let mut end = start;
        for (offset, c) in text[start..].char_indices() {
            let next = start + offset + c.len_utf8();
            if next - start > max_bytes && end > start {
                break;
            }
            end = next;
        }

        words.push(format!(
            "{WORD_PREFIX}{}{WORD_SUFFIX}",
            STANDARD.encode(&text.as_bytes()[start..end])
        ));
        start = end;
        max_bytes = capacity(MAX_LINE_LENGTH - 1);
    }

    words
}

/// Decodes a single `=?charset?B|Q?text?=` encoded word.
///
/// Returns `None` if `word` is not a well-formed encoded word.
#[must_use]
pub fn decode_encoded_word(word: &str) -> Option<String> {
    let inner = word.strip_prefix("=?")?.strip_suffix("?=")?;
    let mut parts = inner.splitn(3, '?');
    let _charset = parts.next()?;
    let encoding = parts.next()?;
    let encoded = parts.next()?;

    let bytes = match encoding {
        "B" | "b" => STANDARD.decode(encoded).ok()?,
        "Q" | "q" => decode_q(encoded)?,
        _ => return None,
    };

    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn decode_q(encoded: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(encoded.len());
    let mut bytes = encoded.bytes();

    while let Some(b) = bytes.next() {
        match b {
            b'_' => out.push(b' '),
            b'=' => {
                let hi = char::from(bytes.next()?).to_digit(16)?;
                let lo = char::from(bytes.next()?).to_digit(16)?;
                out.push(u8::try_from(hi * 16 + lo).ok()?);
            }
            _ => out.push(b),
        }
    }

    Some(out)
}

/// Splits `value` on `separator` outside quoted strings, comments and angle
/// brackets.
pub(crate) fn split_top_level(value: &str, separator: char) -> Vec<&str> {
    let mut items = Vec::new();
    let mut in_quote = false;
    let mut escaped = false;
    let mut comment_depth = 0usize;
    let mut in_angle = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quote || comment_depth > 0 => escaped = true,
            '"' if comment_depth == 0 => in_quote = !in_quote,
            '(' if !in_quote => comment_depth += 1,
            ')' if !in_quote => comment_depth = comment_depth.saturating_sub(1),
            '<' if !in_quote && comment_depth == 0 => in_angle = true,
            '>' if !in_quote && comment_depth == 0 => in_angle = false,
            c if c == separator && !in_quote && !in_angle && comment_depth == 0 => {
                items.push(&value[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    items.push(&value[start..]);

    items
}

fn fold_at_whitespace(name: &str, value: &str, out: &mut Vec<u8>) {
    push_field_start(name, out);

    let mut line_len = name.len() + 2;
    for (i, token) in whitespace_tokens(value).into_iter().enumerate() {
        let foldable = i > 0 && token.trim_start().len() < token.len() && !token.trim().is_empty();
        if foldable && line_len + token.len() > MAX_LINE_LENGTH {
            out.extend_from_slice(b"\r\n");
            line_len = 0;
        }
        out.extend_from_slice(token.as_bytes());
        line_len += token.len();
    }

    out.extend_from_slice(b"\r\n");
}

/// Splits text into words, each carrying the whitespace that precedes it.
fn whitespace_tokens(value: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut prev_ws = true;

    for (i, c) in value.char_indices() {
        let ws = c == ' ' || c == '\t';
        if ws && !prev_ws {
            tokens.push(&value[start..i]);
            start = i;
        }
        prev_ws = ws;
    }
    if start < value.len() {
        tokens.push(&value[start..]);
    }

    tokens
}
