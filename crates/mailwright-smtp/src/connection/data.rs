//! Message content writer for the DATA phase.

use std::io::{self, Write};

/// Writes message content in SMTP transparency format.
///
/// Lines starting with `.` get an extra `.` and bare LF line endings become
/// CRLF. [`finish`](Self::finish) terminates the content with `.` on a line
/// of its own.
#[derive(Debug)]
pub struct DataWriter<W: Write> {
    inner: W,
    at_line_start: bool,
    after_cr: bool,
}

impl<W: Write> DataWriter<W> {
    /// Wraps `inner`.
    pub const fn new(inner: W) -> Self {
        Self {
            inner,
            at_line_start: true,
            after_cr: false,
        }
    }

    /// Ends the last line if needed, writes the terminator and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the inner writer fails.
    pub fn finish(mut self) -> io::Result<W> {
        if self.after_cr {
            self.inner.write_all(b"\n")?;
        } else if !self.at_line_start {
            self.inner.write_all(b"\r\n")?;
        }
        self.inner.write_all(b".\r\n")?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for DataWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = Vec::with_capacity(buf.len() + 8);
        for &byte in buf {
            match byte {
                b'\n' => {
                    if !self.after_cr {
                        out.push(b'\r');
                    }
                    out.push(b'\n');
                    self.at_line_start = true;
                }
                _ => {
                    if self.at_line_start && byte == b'.' {
                        out.push(b'.');
                    }
                    out.push(byte);
                    self.at_line_start = false;
                }
            }
            self.after_cr = byte == b'\r';
        }
        self.inner.write_all(&out)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn transparent(chunks: &[&[u8]]) -> Vec<u8> {
        let mut writer = DataWriter::new(Vec::new());
        for chunk in chunks {
            writer.write_all(chunk).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_plain_lines_pass_through() {
        assert_eq!(transparent(&[b"a\r\nb\r\n"]), b"a\r\nb\r\n.\r\n");
    }

    #[test]
    fn test_leading_dots_are_doubled() {
        assert_eq!(
            transparent(&[b".hidden\r\nmid.dle\r\n..two\r\n"]),
            b"..hidden\r\nmid.dle\r\n...two\r\n.\r\n"
        );
    }

    #[test]
    fn test_lone_line_feeds_become_crlf() {
        assert_eq!(transparent(&[b"a\nb"]), b"a\r\nb\r\n.\r\n");
    }

    #[test]
    fn test_state_survives_chunk_edges() {
        assert_eq!(transparent(&[b"a\r", b"\n", b".b"]), b"a\r\n..b\r\n.\r\n");
        assert_eq!(transparent(&[b"x\r"]), b"x\r\n.\r\n");
    }

    #[test]
    fn test_empty_content() {
        assert_eq!(transparent(&[]), b".\r\n");
    }

    proptest! {
        #[test]
        fn prop_no_line_is_a_lone_dot(content in "[a-z.\r\n]{0,200}") {
            let out = transparent(&[content.as_bytes()]);
            let body = &out[..out.len() - 3];
            for line in body.split(|&b| b == b'\n') {
                prop_assert_ne!(line, b".\r");
            }
            prop_assert!(out.ends_with(b"\r\n.\r\n") || out == b".\r\n");
        }
    }
}
