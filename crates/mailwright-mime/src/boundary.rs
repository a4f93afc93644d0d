//! Random multipart boundaries and message id tokens.

use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;

/// Number of random bytes behind each token.
const TOKEN_BYTES: usize = 28;

/// Generates a fresh boundary token from the operating system random source.
///
/// The token is 38 characters drawn from the URL-safe base64 alphabet, which
/// is valid as an unquoted MIME parameter value.
///
/// # Errors
///
/// Returns [`Error::Entropy`](crate::Error::Entropy) if the random source fails.
pub fn generate() -> Result<String> {
    let mut random_bytes = [0u8; TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut random_bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(random_bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_length() {
        let boundary = generate().unwrap();
        assert_eq!(boundary.len(), 38);
    }

    #[test]
    fn test_boundary_alphabet() {
        let boundary = generate().unwrap();
        assert!(
            boundary
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        );
    }

    #[test]
    fn test_boundaries_unique() {
        let a = generate().unwrap();
        let b = generate().unwrap();
        assert_ne!(a, b);
    }
}
