//! Notary wire types: info, attestation and the signed transcript.

use crate::request::{FetchSpec, Header, HttpMethod, Redaction};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness and identity of a notary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotaryInfo {
    /// Public key exactly as advertised (PEM).
    pub public_key_pem: String,
    /// Decoded ML-DSA-65 public key.
    pub public_key: Bytes,
    /// Whether the notary answered its info endpoint.
    pub live: bool,
}

/// A notarized transcript plus the notary's signature over it.
///
/// Produced by the notary, consumed once by the proof verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    /// Canonical transcript bytes (JSON [`Transcript`]).
    pub transcript: Bytes,
    /// ML-DSA-65 signature over `transcript`.
    pub signature: Bytes,
    /// Key the notary claims to have signed with.
    pub signer_public_key: Bytes,
}

/// What the notary observed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// Request as sent to the target.
    pub request: TranscriptRequest,
    /// Response as received from the target.
    pub response: TranscriptResponse,
    /// When the notary completed the session.
    pub notarized_at: DateTime<Utc>,
}

/// Request half of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRequest {
    /// Method.
    pub method: HttpMethod,
    /// URL actually requested.
    pub url: String,
    /// Ordered headers.
    pub headers: Vec<Header>,
    /// Body.
    #[serde(with = "base64_bytes")]
    pub body: Bytes,
}

/// Response half of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptResponse {
    /// HTTP status.
    pub status: u16,
    /// Ordered headers.
    pub headers: Vec<Header>,
    /// Body.
    #[serde(with = "base64_bytes")]
    pub body: Bytes,
}

impl TranscriptRequest {
    /// The request a notary is expected to observe for `spec`.
    #[must_use]
    pub fn from_spec(spec: &FetchSpec) -> Self {
        Self {
            method: spec.method,
            url: spec.url.clone(),
            headers: spec.headers.clone(),
            body: spec.body.clone(),
        }
    }
}

/// JSON body of `POST /notarize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotarizeRequest {
    /// Target URL.
    pub url: String,
    /// Method.
    pub method: HttpMethod,
    /// Ordered headers.
    pub headers: Vec<Header>,
    /// Body.
    #[serde(with = "base64_bytes")]
    pub body: Bytes,
    /// Redaction selectors in string form.
    pub redacted: String,
}

impl From<&FetchSpec> for NotarizeRequest {
    fn from(spec: &FetchSpec) -> Self {
        Self {
            url: spec.url.clone(),
            method: spec.method,
            headers: spec.headers.clone(),
            body: spec.body.clone(),
            redacted: Redaction::format_list(&spec.redaction),
        }
    }
}

/// JSON body returned by `POST /notarize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotarizeResponse {
    /// Transcript bytes.
    #[serde(with = "base64_bytes")]
    pub transcript: Bytes,
    /// Signature bytes.
    #[serde(with = "base64_bytes")]
    pub signature: Bytes,
    /// Signer key (PEM).
    pub public_key: String,
}

/// JSON body returned by `GET /notaryinfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotaryInfoResponse {
    /// Notary public key (PEM).
    pub public_key: String,
}

/// Serde adapter: `Bytes` as standard base64 strings.
pub mod base64_bytes {
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as base64.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Deserialize from base64.
    ///
    /// # Errors
    ///
    /// Fails on invalid base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(text.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
