//! Role identities.
//!
//! An [`Identity`] is an opaque principal naming a cooperating role
//! (caller, processor, verifier). It is used for trust-chain bindings and
//! for cost attribution.
//!
//! # Text Form
//!
//! ```text
//! base32_lower_no_pad(checksum || bytes), grouped by 5 with '-'
//! ```
//!
//! `checksum` is the first 4 bytes of SHA-256 over `bytes`. A 10-byte
//! identity renders as 27 characters, e.g. `bkyz2-fmaaa-aaaaa-qaaaq-cai`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Maximum identity length in bytes.
pub const MAX_IDENTITY_LEN: usize = 29;

/// Length of identities produced by [`Identity::derive`].
pub const DERIVED_IDENTITY_LEN: usize = 10;

const CHECKSUM_LEN: usize = 4;
const GROUP_LEN: usize = 5;
const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Domain separation for derived identities.
const DERIVE_DOMAIN: &[u8] = b"adc-oracle:identity:v1\0";

/// Errors from parsing an identity's text form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// Empty or oversized identity.
    #[error("identity must be 1..={MAX_IDENTITY_LEN} bytes, got {0}")]
    InvalidLength(usize),
    /// Character outside the base32 alphabet.
    #[error("invalid character {0:?} in identity text")]
    InvalidCharacter(char),
    /// Dashes are not where the grouping puts them.
    #[error("malformed identity grouping")]
    BadGrouping,
    /// Checksum does not match the bytes.
    #[error("identity checksum mismatch")]
    ChecksumMismatch,
    /// Trailing padding bits are set or a trailing character carries no data.
    #[error("non-canonical identity encoding")]
    NonCanonical,
}

/// An opaque, immutable role principal.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    bytes: Vec<u8>,
}

impl Identity {
    /// Construct from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is empty or longer than [`MAX_IDENTITY_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        if bytes.is_empty() || bytes.len() > MAX_IDENTITY_LEN {
            return Err(IdentityError::InvalidLength(bytes.len()));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Derive a stable identity from a role label.
    #[must_use]
    pub fn derive(label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DERIVE_DOMAIN);
        hasher.update(label.as_bytes());
        let hash = hasher.finalize();
        Self {
            bytes: hash[..DERIVED_IDENTITY_LEN].to_vec(),
        }
    }

    /// Raw identity bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Canonical text form.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut payload = Vec::with_capacity(CHECKSUM_LEN + self.bytes.len());
        payload.extend_from_slice(&checksum(&self.bytes));
        payload.extend_from_slice(&self.bytes);

        let encoded = encode_base32(&payload);
        let mut text = String::with_capacity(encoded.len() + encoded.len() / GROUP_LEN);
        for (i, c) in encoded.chars().enumerate() {
            if i > 0 && i % GROUP_LEN == 0 {
                text.push('-');
            }
            text.push(c);
        }
        text
    }

    /// Parse the canonical text form.
    ///
    /// # Errors
    ///
    /// Returns an error on bad characters, grouping, length or checksum.
    pub fn parse_text(input: &str) -> Result<Self, IdentityError> {
        let groups: Vec<&str> = input.split('-').collect();
        let last = groups.len() - 1;
        let mut encoded = String::with_capacity(input.len());
        for (i, group) in groups.iter().enumerate() {
            // Only the final group may be short
            let full = group.len() == GROUP_LEN;
            let short_tail = i == last && !group.is_empty() && group.len() < GROUP_LEN;
            if !full && !short_tail {
                return Err(IdentityError::BadGrouping);
            }
            encoded.push_str(group);
        }

        let payload = decode_base32(&encoded)?;
        if payload.len() <= CHECKSUM_LEN {
            return Err(IdentityError::InvalidLength(0));
        }
        let (check, bytes) = payload.split_at(CHECKSUM_LEN);
        let identity = Self::from_bytes(bytes)?;
        if check != checksum(bytes) {
            return Err(IdentityError::ChecksumMismatch);
        }
        Ok(identity)
    }
}

fn checksum(bytes: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = Sha256::digest(bytes);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&hash[..CHECKSUM_LEN]);
    out
}

fn encode_base32(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(char::from(ALPHABET[((buffer >> bits) & 0x1f) as usize]));
        }
    }
    if bits > 0 {
        out.push(char::from(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize]));
    }
    out
}

fn decode_base32(text: &str) -> Result<Vec<u8>, IdentityError> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for c in text.chars() {
        let value = ALPHABET
            .iter()
            .position(|&a| char::from(a) == c)
            .ok_or(IdentityError::InvalidCharacter(c))?;
        #[allow(clippy::cast_possible_truncation)]
        let value = value as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            #[allow(clippy::cast_possible_truncation)]
            out.push((buffer >> bits) as u8);
        }
    }
    if bits >= 5 || buffer & ((1 << bits) - 1) != 0 {
        return Err(IdentityError::NonCanonical);
    }
    Ok(out)
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.to_text()).finish()
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_text(s)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse_text(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_derived_identity_text_length() {
        let id = Identity::derive("adc-verifier");
        let text = id.to_text();
        assert_eq!(text.len(), 27, "unexpected text form {text}");
        assert_eq!(text.matches('-').count(), 4);
    }

    #[test]
    fn test_derive_is_stable_and_label_sensitive() {
        assert_eq!(Identity::derive("caller"), Identity::derive("caller"));
        assert_ne!(Identity::derive("caller"), Identity::derive("processor"));
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let text = Identity::derive("caller").to_text();
        // Swap the first character for a different valid one
        let first = text.chars().next().unwrap();
        let replacement = if first == 'a' { 'b' } else { 'a' };
        let tampered = format!("{replacement}{}", &text[1..]);
        assert!(Identity::parse_text(&tampered).is_err());
    }

    #[test]
    fn test_parse_rejects_invalid_characters() {
        assert_eq!(
            Identity::parse_text("bkyz2-fmaaa-aaaaa-qaaaq-ca1"),
            Err(IdentityError::InvalidCharacter('1'))
        );
    }

    #[test]
    fn test_parse_rejects_nonzero_padding_bits() {
        let text = Identity::derive("caller").to_text();
        let last = text.chars().last().unwrap();
        let value = ALPHABET.iter().position(|&a| char::from(a) == last).unwrap();
        // 14 payload bytes in 23 characters leave 3 padding bits in the last one
        let tampered = char::from(ALPHABET[value ^ 1]);
        let forged = format!("{}{tampered}", &text[..text.len() - 1]);

        assert_eq!(Identity::parse_text(&forged), Err(IdentityError::NonCanonical));
        assert_eq!(decode_base32("ab"), Err(IdentityError::NonCanonical));
        assert_eq!(decode_base32("aa").unwrap(), vec![0]);
    }

    #[test]
    fn test_parse_rejects_bad_grouping() {
        let text = Identity::derive("caller").to_text().replace('-', "");
        assert_eq!(Identity::parse_text(&text), Err(IdentityError::BadGrouping));
    }

    #[test]
    fn test_from_bytes_length_bounds() {
        assert!(Identity::from_bytes(&[]).is_err());
        assert!(Identity::from_bytes(&[7u8; MAX_IDENTITY_LEN]).is_ok());
        assert!(Identity::from_bytes(&[7u8; MAX_IDENTITY_LEN + 1]).is_err());
    }

    #[test]
    fn test_serde_uses_text_form() {
        let id = Identity::derive("processor");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    proptest! {
        #[test]
        fn prop_text_form_parses_back(bytes in proptest::collection::vec(any::<u8>(), 1..=MAX_IDENTITY_LEN)) {
            let id = Identity::from_bytes(&bytes).unwrap();
            prop_assert_eq!(Identity::parse_text(&id.to_text()).unwrap(), id);
        }
    }
}
