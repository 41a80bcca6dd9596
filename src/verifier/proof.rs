//! Attestation verification against a pinned notary key.
//!
//! Verification is a pure function of `(spec, attestation, trusted_key)`:
//!
//! 1. The signer key must be the trusted key and the signature must verify
//! 2. The transcript's request must equal the submitted spec
//! 3. Redactions are applied to the response
//!
//! Any failure rejects the whole attestation. There is no partial success.

use super::signature::verify_signature;
use crate::error::VerificationError;
use crate::notary::{Attestation, Transcript, TranscriptRequest, TranscriptResponse};
use crate::request::{FetchSpec, Header, Redaction};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Byte used to mask redacted body ranges.
pub const REDACTION_MASK: u8 = b'*';

/// A response the oracle vouches for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedResponse {
    /// HTTP status observed by the notary.
    pub status: u16,
    /// Response headers minus redacted ones.
    pub headers: Vec<Header>,
    /// Response body with redacted ranges masked.
    pub body: Bytes,
    /// When the notary completed the session.
    pub notarized_at: DateTime<Utc>,
}

/// Verifies attestations against one pinned notary key.
#[derive(Debug, Clone)]
pub struct ProofVerifier {
    trusted_key: Bytes,
}

impl ProofVerifier {
    /// Create a verifier that trusts `trusted_key`.
    #[must_use]
    pub fn new(trusted_key: Bytes) -> Self {
        Self { trusted_key }
    }

    /// The pinned notary key.
    #[must_use]
    pub fn trusted_key(&self) -> &Bytes {
        &self.trusted_key
    }

    /// Verify an attestation for `spec`.
    ///
    /// # Errors
    ///
    /// See [`verify`].
    pub fn verify(
        &self,
        spec: &FetchSpec,
        attestation: &Attestation,
    ) -> Result<VerifiedResponse, VerificationError> {
        verify(spec, attestation, &self.trusted_key)
    }
}

/// Verify `attestation` for `spec` against `trusted_key`.
///
/// # Errors
///
/// - [`VerificationError::SignatureInvalid`] - key mismatch or bad signature
/// - [`VerificationError::TranscriptMismatch`] - the notary saw a different request
/// - [`VerificationError::RedactionViolation`] - a redaction does not apply
pub fn verify(
    spec: &FetchSpec,
    attestation: &Attestation,
    trusted_key: &[u8],
) -> Result<VerifiedResponse, VerificationError> {
    if attestation.signer_public_key.as_ref() != trusted_key {
        warn!("Attestation for {} signed by an unpinned key", spec.url);
        return Err(VerificationError::SignatureInvalid(
            "signer key does not match the pinned notary key".to_string(),
        ));
    }

    verify_signature(&attestation.transcript, &attestation.signature, trusted_key)?;

    let transcript: Transcript = serde_json::from_slice(&attestation.transcript).map_err(|e| {
        VerificationError::TranscriptMismatch {
            field: "transcript",
            detail: format!("malformed transcript: {e}"),
        }
    })?;

    match_request(spec, &transcript.request)?;

    let verified = apply_redactions(transcript.response, &spec.redaction, transcript.notarized_at)?;
    debug!(
        "Verified {} {} ({} body bytes, status {})",
        spec.method,
        spec.url,
        verified.body.len(),
        verified.status
    );
    Ok(verified)
}

fn match_request(spec: &FetchSpec, observed: &TranscriptRequest) -> Result<(), VerificationError> {
    let mismatch = |field: &'static str, detail: String| VerificationError::TranscriptMismatch {
        field,
        detail,
    };

    if observed.method != spec.method {
        return Err(mismatch(
            "method",
            format!("requested {}, notary observed {}", spec.method, observed.method),
        ));
    }
    if observed.url != spec.url {
        return Err(mismatch(
            "url",
            format!("requested {}, notary observed {}", spec.url, observed.url),
        ));
    }
    if observed.headers != spec.headers {
        return Err(mismatch(
            "headers",
            format!(
                "requested {} headers, notary observed {}",
                spec.headers.len(),
                observed.headers.len()
            ),
        ));
    }
    if observed.body != spec.body {
        return Err(mismatch(
            "body",
            format!(
                "requested {} body bytes, notary observed {}",
                spec.body.len(),
                observed.body.len()
            ),
        ));
    }
    Ok(())
}

fn apply_redactions(
    response: TranscriptResponse,
    redactions: &[Redaction],
    notarized_at: DateTime<Utc>,
) -> Result<VerifiedResponse, VerificationError> {
    let TranscriptResponse {
        status,
        mut headers,
        body,
    } = response;

    if redactions.is_empty() {
        return Ok(VerifiedResponse {
            status,
            headers,
            body,
            notarized_at,
        });
    }

    let mut masked = body.to_vec();
    for redaction in redactions {
        match redaction {
            Redaction::BodyRange { start, end } => {
                if start >= end || *end > masked.len() {
                    return Err(VerificationError::RedactionViolation(format!(
                        "range {start}-{end} does not fit a {} byte body",
                        masked.len()
                    )));
                }
                masked[*start..*end].fill(REDACTION_MASK);
            }
            Redaction::ResponseHeader { name } => {
                let before = headers.len();
                headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
                if headers.len() == before {
                    return Err(VerificationError::RedactionViolation(format!(
                        "response has no header {name:?} to redact"
                    )));
                }
            }
        }
    }

    Ok(VerifiedResponse {
        status,
        headers,
        body: Bytes::from(masked),
        notarized_at,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_support::{response, TestKeys};
    use proptest::prelude::*;

    fn spec() -> FetchSpec {
        FetchSpec::get("https://api.example.com/v1/txns?cursor=0")
    }

    #[test]
    fn test_accepts_valid_attestation() {
        let keys = TestKeys::generate();
        let attestation = keys.attest(&spec(), response(200, b"{\"txns\":[]}"));

        let verified = verify(&spec(), &attestation, &keys.public_key).unwrap();
        assert_eq!(verified.status, 200);
        assert_eq!(verified.body.as_ref(), b"{\"txns\":[]}");
    }

    #[test]
    fn test_verdict_is_deterministic() {
        let keys = TestKeys::generate();
        let attestation = keys.attest(&spec(), response(200, b"payload"));

        let first = verify(&spec(), &attestation, &keys.public_key);
        let second = verify(&spec(), &attestation, &keys.public_key);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_unpinned_signer() {
        let keys = TestKeys::generate();
        let other = TestKeys::generate();
        let attestation = keys.attest(&spec(), response(200, b"payload"));

        let err = verify(&spec(), &attestation, &other.public_key).unwrap_err();
        assert!(matches!(err, VerificationError::SignatureInvalid(_)));
    }

    #[test]
    fn test_rejects_redirected_request() {
        let keys = TestKeys::generate();
        let redirected = FetchSpec::get("https://evil.example.com/v1/txns?cursor=0");
        let attestation = keys.attest(&redirected, response(200, b"payload"));

        let err = verify(&spec(), &attestation, &keys.public_key).unwrap_err();
        assert_eq!(
            err,
            VerificationError::TranscriptMismatch {
                field: "url",
                detail: format!(
                    "requested {}, notary observed {}",
                    spec().url,
                    redirected.url
                ),
            }
        );
    }

    #[test]
    fn test_rejects_header_mismatch() {
        let keys = TestKeys::generate();
        let observed = spec().with_header(Header::new("Authorization", "Bearer x"));
        let attestation = keys.attest(&observed, response(200, b"payload"));

        let err = verify(&spec(), &attestation, &keys.public_key).unwrap_err();
        assert!(matches!(
            err,
            VerificationError::TranscriptMismatch { field: "headers", .. }
        ));
    }

    #[test]
    fn test_rejects_unsigned_garbage_transcript() {
        let keys = TestKeys::generate();
        let mut attestation = keys.attest(&spec(), response(200, b"payload"));
        attestation.transcript = Bytes::from_static(b"not json");

        // Signature no longer covers the transcript
        let err = verify(&spec(), &attestation, &keys.public_key).unwrap_err();
        assert!(matches!(err, VerificationError::SignatureInvalid(_)));
    }

    #[test]
    fn test_masks_body_range() {
        let keys = TestKeys::generate();
        let redacted = spec().with_redaction(Redaction::BodyRange { start: 2, end: 5 });
        let attestation = keys.attest(&redacted, response(200, b"secret-data"));

        let verified = verify(&redacted, &attestation, &keys.public_key).unwrap();
        assert_eq!(verified.body.as_ref(), b"se***t-data");
    }

    #[test]
    fn test_out_of_range_redaction_is_violation() {
        let keys = TestKeys::generate();
        let redacted = spec().with_redaction(Redaction::BodyRange { start: 5, end: 500 });
        let attestation = keys.attest(&redacted, response(200, b"short"));

        let err = verify(&redacted, &attestation, &keys.public_key).unwrap_err();
        assert!(matches!(err, VerificationError::RedactionViolation(_)));
    }

    #[test]
    fn test_withholds_redacted_header() {
        let keys = TestKeys::generate();
        let redacted = spec().with_redaction(Redaction::ResponseHeader {
            name: "set-cookie".to_string(),
        });
        let mut resp = response(200, b"ok");
        resp.headers = vec![
            Header::new("Content-Type", "application/json"),
            Header::new("Set-Cookie", "session=abc"),
        ];
        let attestation = keys.attest(&redacted, resp);

        let verified = verify(&redacted, &attestation, &keys.public_key).unwrap();
        assert_eq!(
            verified.headers,
            vec![Header::new("Content-Type", "application/json")]
        );
    }

    #[test]
    fn test_missing_redacted_header_is_violation() {
        let keys = TestKeys::generate();
        let redacted = spec().with_redaction(Redaction::ResponseHeader {
            name: "x-api-key".to_string(),
        });
        let attestation = keys.attest(&redacted, response(200, b"ok"));

        let err = verify(&redacted, &attestation, &keys.public_key).unwrap_err();
        assert!(matches!(err, VerificationError::RedactionViolation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_any_signature_byte_flip_is_rejected(index in 0usize..crate::verifier::SIGNATURE_SIZE, flip in 1u8..=255) {
            let keys = TestKeys::shared();
            let attestation = keys.attest(&spec(), response(200, b"{\"txns\":[1,2,3]}"));
            prop_assert!(verify(&spec(), &attestation, &keys.public_key).is_ok());

            let mut tampered = attestation.signature.to_vec();
            tampered[index] ^= flip;
            let tampered = Attestation {
                signature: Bytes::from(tampered),
                ..attestation
            };
            let verdict = verify(&spec(), &tampered, &keys.public_key);
            prop_assert!(matches!(verdict, Err(VerificationError::SignatureInvalid(_))));
        }
    }
}
