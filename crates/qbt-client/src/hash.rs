//! Torrent-hash validation.
//!
//! Every operation that addresses torrents runs its inputs through these
//! gates before a request is built, so a malformed hash never reaches the
//! network layer. Hashes are matched case-insensitively and never
//! normalized in place.

use crate::error::{Error, Result};

/// Exact length of a torrent info-hash in hex characters.
pub const HASH_LEN: usize = 40;

/// True iff `s` is exactly 40 hexadecimal characters.
pub fn is_valid_hash(s: &str) -> bool {
    s.len() == HASH_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Fails with `InvalidArgument` unless `s` is a well-formed hash.
pub fn validate_hash(s: &str) -> Result<()> {
    if is_valid_hash(s) {
        Ok(())
    } else {
        Err(Error::invalid(format!("malformed torrent hash: {s:?}")))
    }
}

/// Validates every element, rejecting empty input and the first offender.
pub fn validate_hashes<S: AsRef<str>>(hashes: &[S]) -> Result<()> {
    if hashes.is_empty() {
        return Err(Error::invalid("at least one torrent hash is required"));
    }
    for hash in hashes {
        validate_hash(hash.as_ref())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "8c212779b4abde7c6bc608063a0d008b7e40ce32";

    #[test]
    fn accepts_forty_hex_chars_any_case() {
        assert!(is_valid_hash(HASH));
        assert!(is_valid_hash(&HASH.to_uppercase()));
        assert!(is_valid_hash("ABCDEFabcdef0123456789ABCDEFabcdef012345"));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!is_valid_hash(""));
        assert!(!is_valid_hash(&HASH[..39]));
        assert!(!is_valid_hash(&format!("{HASH}0")));
    }

    #[test]
    fn rejects_non_hex_characters() {
        assert!(!is_valid_hash("8c212779b4abde7c6bc608063a0d008b7e40ce3g"));
        assert!(!is_valid_hash("8c212779b4abde7c6bc608063a0d008b7e40ce3 "));
        // Unicode digits must not slip through the byte-level check.
        assert!(!is_valid_hash("8c212779b4abde7c6bc608063a0d008b7e40ce٣٢"));
    }

    #[test]
    fn validate_reports_invalid_argument() {
        assert!(matches!(
            validate_hash("not-a-hash"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(validate_hash(HASH).is_ok());
    }

    #[test]
    fn validate_hashes_rejects_empty_and_first_offender() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            validate_hashes(&empty),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            validate_hashes(&[HASH, "bogus"]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(validate_hashes(&[HASH]).is_ok());
    }
}
