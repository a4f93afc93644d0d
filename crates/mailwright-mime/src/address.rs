//! Mailboxes and RFC 5322 mailbox lists.

use crate::error::{Error, Result};
use crate::header::{MAX_LINE_LENGTH, decode_encoded_word, encoded_words, needs_encoded_words};
use std::fmt;

/// A mailbox: an optional display name and an email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mailbox {
    name: Option<String>,
    address: String,
}

impl Mailbox {
    /// Creates a mailbox with just an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        validate(&address)?;
        Ok(Self {
            name: None,
            address,
        })
    }

    /// Creates a mailbox with a display name and address.
    ///
    /// An empty name is treated as no name.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Result<Self> {
        let mut mailbox = Self::new(address)?;
        let name = name.into();
        if !name.is_empty() {
            mailbox.name = Some(name);
        }
        Ok(mailbox)
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the bare address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the domain part of the address.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map_or("", |(_, domain)| domain)
    }

    /// Formats mailboxes as a comma separated list.
    #[must_use]
    pub fn format_list(mailboxes: &[Self]) -> String {
        mailboxes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Parses a single mailbox.
    ///
    /// Accepts `addr`, `<addr>`, `Name <addr>`, `"Quoted Name" <addr>` and
    /// encoded-word display names. Comments are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly one valid mailbox.
    pub fn parse(input: &str) -> Result<Self> {
        let mut mailboxes = Self::parse_list(input)?;
        if mailboxes.len() != 1 {
            return Err(Error::InvalidAddress(format!(
                "expected one mailbox, found {}",
                mailboxes.len()
            )));
        }
        Ok(mailboxes.remove(0))
    }

    /// Parses a comma separated mailbox list.
    ///
    /// Groups (`Team: a@example.com, b@example.com;`) are flattened into
    /// their members.
    ///
    /// # Errors
    ///
    /// Returns an error if any item is malformed.
    pub fn parse_list(input: &str) -> Result<Vec<Self>> {
        split_list(input)?
            .iter()
            .map(|item| parse_mailbox(item))
            .collect()
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name.as_deref() {
            None => write!(f, "<{}>", self.address),
            Some(name) if needs_encoded_words(name) => {
                // short enough to follow the widest address field name
                let words = encoded_words(name, MAX_LINE_LENGTH - "Reply-To: ".len() - 1);
                write!(f, "{} <{}>", words.join(" "), self.address)
            }
            Some(name) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{escaped}\" <{}>", self.address)
            }
        }
    }
}

impl std::str::FromStr for Mailbox {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
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

    let Some((local, domain)) = addr.rsplit_once('@') else {
        return Err(Error::InvalidAddress(format!(
            "Address must contain @: {addr}"
        )));
    };

    if local.is_empty() || domain.is_empty() {
        return Err(Error::InvalidAddress(
            "Local and domain parts cannot be empty".into(),
        ));
    }

    Ok(())
}

/// Splits a list into raw mailbox items, dropping comments and group names.
fn split_list(input: &str) -> Result<Vec<String>> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut escaped = false;
    let mut in_angle = false;
    let mut comment_depth = 0usize;
    let mut in_group = false;

    let mut flush = |current: &mut String| {
        let item = current.trim();
        if !item.is_empty() {
            items.push(item.to_string());
        }
        current.clear();
    };

    for c in input.chars() {
        if comment_depth > 0 {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '(' => comment_depth += 1,
                ')' => {
                    comment_depth -= 1;
                    if comment_depth == 0 {
                        current.push(' ');
                    }
                }
                _ => {}
            }
            continue;
        }

        if in_quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quote = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_quote = true;
                current.push(c);
            }
            '(' => comment_depth = 1,
            '<' if !in_angle => {
                in_angle = true;
                current.push(c);
            }
            '>' if in_angle => {
                in_angle = false;
                current.push(c);
            }
            ':' if !in_angle && !in_group => {
                in_group = true;
                current.clear();
            }
            ';' if !in_angle && in_group => {
                in_group = false;
                flush(&mut current);
            }
            ',' if !in_angle => flush(&mut current),
            _ => current.push(c),
        }
    }

    if in_quote || in_angle || comment_depth > 0 || in_group {
        return Err(Error::InvalidAddress(format!(
            "unterminated construct in address list: {input}"
        )));
    }
    flush(&mut current);

    Ok(items)
}

fn parse_mailbox(item: &str) -> Result<Mailbox> {
    let Some(open) = find_unquoted(item, '<') else {
        return Mailbox::new(item.trim());
    };

    let rest = &item[open + 1..];
    let close = rest
        .find('>')
        .ok_or_else(|| Error::InvalidAddress(format!("missing '>' in {item}")))?;
    if !rest[close + 1..].trim().is_empty() {
        return Err(Error::InvalidAddress(format!(
            "unexpected text after '>' in {item}"
        )));
    }

    let name = decode_phrase(item[..open].trim());
    Mailbox::with_name(name, rest[..close].trim())
}

fn find_unquoted(text: &str, target: char) -> Option<usize> {
    let mut in_quote = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            c if c == target && !in_quote => return Some(i),
            _ => {}
        }
    }
    None
}

/// Turns a display-name phrase into plain text.
fn decode_phrase(phrase: &str) -> String {
    let mut out = String::new();
    let mut chars = phrase.chars().peekable();
    let mut pending_space = false;
    let mut last_was_word = false;

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            pending_space = !out.is_empty();
            continue;
        }

        if c == '"' {
            chars.next();
            if pending_space {
                out.push(' ');
            }
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => out.push(c),
                }
            }
            pending_space = false;
            last_was_word = false;
            continue;
        }

        let mut atom = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '"' {
                break;
            }
            atom.push(c);
            chars.next();
        }

        match decode_encoded_word(&atom) {
            Some(decoded) => {
                // whitespace between adjacent encoded words is not displayed
                if pending_space && !last_was_word {
                    out.push(' ');
                }
                out.push_str(&decoded);
                last_was_word = true;
            }
            None => {
                if pending_space {
                    out.push(' ');
                }
                out.push_str(&atom);
                last_was_word = false;
            }
        }
        pending_space = false;
    }

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_address() {
        let mailbox = Mailbox::new("user@example.com").unwrap();
        assert_eq!(mailbox.address(), "user@example.com");
        assert_eq!(mailbox.name(), None);
        assert_eq!(mailbox.domain(), "example.com");
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(Mailbox::new("").is_err());
        assert!(Mailbox::new("userexample.com").is_err());
        assert!(Mailbox::new("@example.com").is_err());
        assert!(Mailbox::new("user@").is_err());
        assert!(Mailbox::new("us er@example.com").is_err());
        assert!(Mailbox::new("user@example.com\r\nBcc: x@y").is_err());
    }

    #[test]
    fn test_display() {
        let plain = Mailbox::new("bob@example.com").unwrap();
        assert_eq!(plain.to_string(), "<bob@example.com>");

        let named = Mailbox::with_name("Bob Test", "bob@example.com").unwrap();
        assert_eq!(named.to_string(), "\"Bob Test\" <bob@example.com>");

        let escaped = Mailbox::with_name("Say \"Hi\"", "bob@example.com").unwrap();
        assert_eq!(escaped.to_string(), "\"Say \\\"Hi\\\"\" <bob@example.com>");
    }

    #[test]
    fn test_display_non_ascii_name() {
        let mailbox = Mailbox::with_name("Zoë", "zoe@example.com").unwrap();
        assert_eq!(mailbox.to_string(), "=?utf-8?B?Wm/Dqw==?= <zoe@example.com>");
    }

    #[test]
    fn test_empty_name_is_none() {
        let mailbox = Mailbox::with_name("", "bob@example.com").unwrap();
        assert_eq!(mailbox.name(), None);
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            Mailbox::parse("bob@example.com").unwrap(),
            Mailbox::new("bob@example.com").unwrap()
        );
        assert_eq!(
            Mailbox::parse("<bob@example.com>").unwrap(),
            Mailbox::new("bob@example.com").unwrap()
        );
        assert_eq!(
            Mailbox::parse("Bob Test <bob@example.com>").unwrap(),
            Mailbox::with_name("Bob Test", "bob@example.com").unwrap()
        );
        assert_eq!(
            Mailbox::parse("\"Test, Bob\" <bob@example.com>").unwrap(),
            Mailbox::with_name("Test, Bob", "bob@example.com").unwrap()
        );
        assert_eq!(
            Mailbox::parse("bob@example.com (Bob at work)").unwrap(),
            Mailbox::new("bob@example.com").unwrap()
        );
    }

    #[test]
    fn test_parse_encoded_name() {
        let mailbox = Mailbox::parse("=?utf-8?B?Wm/Dqw==?= <zoe@example.com>").unwrap();
        assert_eq!(mailbox.name(), Some("Zoë"));

        let split = Mailbox::parse("=?utf-8?q?Zo?= =?utf-8?q?=C3=AB?= <zoe@example.com>").unwrap();
        assert_eq!(split.name(), Some("Zoë"));
    }

    #[test]
    fn test_display_parse_round_trip() {
        for mailbox in [
            Mailbox::new("a@example.com").unwrap(),
            Mailbox::with_name("Plain Name", "b@example.com").unwrap(),
            Mailbox::with_name("Quote \" and \\ slash", "c@example.com").unwrap(),
            Mailbox::with_name("Überraschung für alle", "d@example.com").unwrap(),
        ] {
            assert_eq!(Mailbox::parse(&mailbox.to_string()).unwrap(), mailbox);
        }
    }

    #[test]
    fn test_parse_list() {
        let list = Mailbox::parse_list(
            "\"Doe, Jane\" <jane@example.com>, bob@example.com,, <carol@example.com>",
        )
        .unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].name(), Some("Doe, Jane"));
        assert_eq!(list[1].address(), "bob@example.com");
        assert_eq!(list[2].address(), "carol@example.com");
    }

    #[test]
    fn test_parse_group() {
        let list =
            Mailbox::parse_list("Team: a@example.com, B <b@example.com>;, c@example.com").unwrap();
        let addresses: Vec<_> = list.iter().map(Mailbox::address).collect();
        assert_eq!(
            addresses,
            ["a@example.com", "b@example.com", "c@example.com"]
        );

        let empty_group = Mailbox::parse_list("undisclosed-recipients:;").unwrap();
        assert!(empty_group.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Mailbox::parse("\"unterminated <a@example.com>").is_err());
        assert!(Mailbox::parse("Name <a@example.com").is_err());
        assert!(Mailbox::parse("a@example.com, b@example.com").is_err());
        assert!(Mailbox::parse("").is_err());
        assert!(Mailbox::parse("<a@example.com> trailing").is_err());
    }

    #[test]
    fn test_format_list() {
        let list = [
            Mailbox::with_name("A", "a@example.com").unwrap(),
            Mailbox::new("b@example.com").unwrap(),
        ];
        assert_eq!(
            Mailbox::format_list(&list),
            "\"A\" <a@example.com>, <b@example.com>"
        );
        assert_eq!(Mailbox::parse_list(&Mailbox::format_list(&list)).unwrap(), list);
    }
}
