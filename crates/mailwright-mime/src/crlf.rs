//! CR/LF discipline for message bodies.
//!
//! RFC 5322 section 2.3: CR and LF MUST only occur together as CRLF; they
//! MUST NOT appear independently in the body.

/// Returns true if every CR and LF in `buf` belongs to a CRLF pair.
#[must_use]
pub fn is_crlf_clean(buf: &[u8]) -> bool {
    let mut prev = 0u8;

    for &b in buf {
        if b == b'\n' && prev != b'\r' {
            return false;
        }
        if prev == b'\r' && b != b'\n' {
            return false;
        }
        prev = b;
    }

    // CR at end of buffer
    prev != b'\r'
}

/// Rewrites every lone CR or lone LF in `buf` as CRLF.
///
/// Existing CRLF pairs are kept as they are.
#[must_use]
pub fn fix_crlf(buf: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len() + buf.len() / 50);
    let mut prev = 0u8;

    for &b in buf {
        match b {
            b'\n' => out.extend_from_slice(b"\r\n"),
            // held until we know what follows
            b'\r' => {
                if prev == b'\r' {
                    out.extend_from_slice(b"\r\n");
                }
            }
            _ => {
                if prev == b'\r' {
                    out.extend_from_slice(b"\r\n");
                }
                out.push(b);
            }
        }
        prev = b;
    }

    if prev == b'\r' {
        out.extend_from_slice(b"\r\n");
    }

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clean_input() {
        assert!(is_crlf_clean(b""));
        assert!(is_crlf_clean(b"Hello"));
        assert!(is_crlf_clean(b"Hello\r\nWorld\r\n"));
    }

    #[test]
    fn test_lone_lf() {
        assert!(!is_crlf_clean(b"Hello\nWorld"));
        assert_eq!(fix_crlf(b"Hello\nWorld"), b"Hello\r\nWorld");
    }

    #[test]
    fn test_lone_cr() {
        assert!(!is_crlf_clean(b"Hello\rWorld"));
        assert_eq!(fix_crlf(b"Hello\rWorld"), b"Hello\r\nWorld");
    }

    #[test]
    fn test_trailing_cr() {
        assert!(!is_crlf_clean(b"Hello\r"));
        assert_eq!(fix_crlf(b"Hello\r"), b"Hello\r\n");
    }

    #[test]
    fn test_mixed_breaks() {
        assert_eq!(fix_crlf(b"a\r\rb\n\nc\r\n"), b"a\r\n\r\nb\r\n\r\nc\r\n");
        assert_eq!(fix_crlf(b"\n\r"), b"\r\n\r\n");
    }

    fn clean_bytes() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(
            prop_oneof![
                (0u8..=255)
                    .prop_filter("no CR/LF", |b| *b != b'\r' && *b != b'\n')
                    .prop_map(|b| vec![b]),
                Just(b"\r\n".to_vec()),
            ],
            0..64,
        )
        .prop_map(|chunks| chunks.concat())
    }

    proptest! {
        #[test]
        fn crlf_only_input_is_untouched(buf in clean_bytes()) {
            prop_assert!(is_crlf_clean(&buf));
            prop_assert_eq!(fix_crlf(&buf), buf);
        }

        #[test]
        fn lone_breaks_are_repaired(
            head in clean_bytes(),
            lone in prop_oneof![Just(b'\r'), Just(b'\n')],
            tail in clean_bytes(),
        ) {
            // avoid forming a CRLF pair with the neighbours
            prop_assume!(!(lone == b'\r' && tail.first() == Some(&b'\n')));
            let mut buf = head;
            buf.push(lone);
            buf.extend_from_slice(&tail);

            prop_assert!(!is_crlf_clean(&buf));
            prop_assert!(is_crlf_clean(&fix_crlf(&buf)));
        }
    }
}
