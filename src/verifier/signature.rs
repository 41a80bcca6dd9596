//! ML-DSA signature verification for notary attestations.
//!
//! Notaries sign the transcript bytes with FIPS 204 ML-DSA-65 under a fixed
//! signing context.

use crate::error::VerificationError;
use saorsa_pqc::api::sig::{ml_dsa_65, MlDsaPublicKey, MlDsaSignature, MlDsaVariant};
use tracing::debug;

/// Signing context for attestation signatures.
pub const ATTESTATION_CONTEXT: &[u8] = b"adc-notary-attestation-v1";

/// ML-DSA-65 signature size in bytes.
pub const SIGNATURE_SIZE: usize = 3309;

/// Verify `signature` over `message` with an ML-DSA-65 public key.
///
/// # Errors
///
/// Returns [`VerificationError::SignatureInvalid`] if:
/// - The public key cannot be parsed
/// - The signature has an invalid size or format
/// - The signature does not verify
pub fn verify_signature(
    message: &[u8],
    signature: &[u8],
    public_key: &[u8],
) -> Result<(), VerificationError> {
    let public_key = MlDsaPublicKey::from_bytes(MlDsaVariant::MlDsa65, public_key)
        .map_err(|e| VerificationError::SignatureInvalid(format!("invalid notary key: {e}")))?;

    if signature.len() != SIGNATURE_SIZE {
        return Err(VerificationError::SignatureInvalid(format!(
            "Invalid signature size: expected {SIGNATURE_SIZE}, got {}",
            signature.len()
        )));
    }

    let sig = MlDsaSignature::from_bytes(MlDsaVariant::MlDsa65, signature).map_err(|e| {
        VerificationError::SignatureInvalid(format!("Invalid signature format: {e}"))
    })?;

    let dsa = ml_dsa_65();
    let valid = dsa
        .verify_with_context(&public_key, message, &sig, ATTESTATION_CONTEXT)
        .map_err(|e| {
            VerificationError::SignatureInvalid(format!("Signature verification error: {e}"))
        })?;

    if valid {
        debug!("Attestation signature verified ({} bytes)", message.len());
        Ok(())
    } else {
        Err(VerificationError::SignatureInvalid(
            "signature does not match transcript".to_string(),
        ))
    }
}
