//! PEM handling for notary public keys.
//!
//! The notary advertises its ML-DSA-65 key as a `PUBLIC KEY` PEM block. The
//! base64 body is either the raw 1952-byte key or the canonical 1974-byte
//! ML-DSA-65 SPKI encoding of it. Anything else is refused.

use crate::error::ConfigError;
use base64::Engine as _;
use bytes::Bytes;

/// ML-DSA-65 public key size in bytes.
pub const PUBLIC_KEY_SIZE: usize = 1952;

/// DER header of an ML-DSA-65 `SubjectPublicKeyInfo` (OID 2.16.840.1.101.3.4.3.18).
pub const SPKI_PREFIX: [u8; 22] = [
    0x30, 0x82, 0x07, 0xb2, 0x30, 0x0b, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04,
    0x03, 0x12, 0x03, 0x82, 0x07, 0xa1, 0x00,
];

const SPKI_SIZE: usize = SPKI_PREFIX.len() + PUBLIC_KEY_SIZE;

const PEM_BEGIN: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_END: &str = "-----END PUBLIC KEY-----";
const LINE_WIDTH: usize = 64;

/// Decode a `PUBLIC KEY` PEM block to raw ML-DSA-65 key bytes.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidNotaryKey`] if the armor or base64 is
/// malformed, or the body is neither a raw key nor an ML-DSA-65 SPKI.
pub fn decode_public_key(pem: &str) -> Result<Bytes, ConfigError> {
    let pem = pem.trim();
    let body = pem
        .strip_prefix(PEM_BEGIN)
        .and_then(|rest| rest.strip_suffix(PEM_END))
        .ok_or_else(|| ConfigError::InvalidNotaryKey("missing PUBLIC KEY armor".to_string()))?;

    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let der = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ConfigError::InvalidNotaryKey(format!("bad base64: {e}")))?;

    match der.len() {
        PUBLIC_KEY_SIZE => Ok(Bytes::from(der)),
        SPKI_SIZE => der
            .strip_prefix(SPKI_PREFIX.as_slice())
            .map(Bytes::copy_from_slice)
            .ok_or_else(|| {
                ConfigError::InvalidNotaryKey("SPKI is not an ML-DSA-65 key".to_string())
            }),
        len => Err(ConfigError::InvalidNotaryKey(format!(
            "expected {PUBLIC_KEY_SIZE} key bytes or a {SPKI_SIZE} byte SPKI, got {len}"
        ))),
    }
}

/// Encode raw key bytes as a `PUBLIC KEY` PEM block.
#[must_use]
pub fn encode_public_key(key: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(key);
    let mut pem = String::with_capacity(encoded.len() + 64);
    pem.push_str(PEM_BEGIN);
    pem.push('\n');
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str(PEM_END);
    pem.push('\n');
    pem
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_starts_with_armor() {
        let pem = encode_public_key(&[7u8; PUBLIC_KEY_SIZE]);
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(pem.lines().all(|line| line.len() <= LINE_WIDTH));
    }

    #[test]
    fn test_decode_raw_key() {
        let key = vec![3u8; PUBLIC_KEY_SIZE];
        let decoded = decode_public_key(&encode_public_key(&key)).unwrap();
        assert_eq!(decoded.as_ref(), key.as_slice());
    }

    #[test]
    fn test_decode_spki_wrapped_key() {
        let key = vec![9u8; PUBLIC_KEY_SIZE];
        let mut der = SPKI_PREFIX.to_vec();
        der.extend_from_slice(&key);
        assert_eq!(der.len(), 1974);
        let decoded = decode_public_key(&encode_public_key(&der)).unwrap();
        assert_eq!(decoded.as_ref(), key.as_slice());
    }

    #[test]
    fn test_decode_rejects_other_long_blobs() {
        // Longer than a key but not an SPKI
        let err = decode_public_key(&encode_public_key(&[9u8; PUBLIC_KEY_SIZE + 100])).unwrap_err();
        assert!(err.to_string().contains("got 2052"));

        // Right length, wrong algorithm identifier
        let mut der = SPKI_PREFIX.to_vec();
        der[16] = 0x11;
        der.extend_from_slice(&[9u8; PUBLIC_KEY_SIZE]);
        let err = decode_public_key(&encode_public_key(&der)).unwrap_err();
        assert!(err.to_string().contains("not an ML-DSA-65"));
    }

    #[test]
    fn test_decode_rejects_short_key() {
        let err = decode_public_key(&encode_public_key(&[1u8; 32])).unwrap_err();
        assert!(err.to_string().contains("expected 1952 key bytes"));
    }

    #[test]
    fn test_decode_rejects_missing_armor() {
        assert!(decode_public_key("not a pem").is_err());
        assert!(decode_public_key("-----BEGIN PUBLIC KEY-----\n!!!\n-----END PUBLIC KEY-----").is_err());
    }
}
