// pour-net/src/validation.rs
use pour_common::capability::ChecksumVerifier;
use pour_common::error::{PourError, Result};
use sha2::{Digest, Sha256};
use url::Url;

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Verifier;

impl ChecksumVerifier for Sha256Verifier {
    fn digest(&self, bytes: &[u8]) -> String {
        sha256_hex(bytes)
    }
}

/// Validates a URL, ensuring it uses the HTTPS scheme.
pub fn validate_url(url_str: &str) -> Result<()> {
    let url = Url::parse(url_str)
        .map_err(|e| PourError::Generic(format!("Failed to parse URL '{url_str}': {e}")))?;
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(PourError::Network {
            url: url_str.to_string(),
            message: format!("Invalid URL scheme: must be https, but got '{}'", url.scheme()),
            retryable: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn digests_known_input() {
        assert_eq!(Sha256Verifier.digest(b"hello"), HELLO_SHA256);
    }

    #[test]
    fn only_https_is_accepted() {
        assert!(validate_url("https://example.org/a.zip").is_ok());
        let err = validate_url("http://example.org/a.zip").unwrap_err();
        assert!(!err.is_retryable());
        assert!(validate_url("not a url").is_err());
    }
}
