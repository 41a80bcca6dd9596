//! Attestation verification.
//!
//! [`ProofVerifier`] is the pure check of one attestation against a pinned
//! key. [`VerifierNode`] is the verifier role built around it.

mod node;
mod proof;
mod signature;

pub use node::{VerifierConfig, VerifierNode, VerifierStats};
pub use proof::{verify, ProofVerifier, VerifiedResponse, REDACTION_MASK};
pub use signature::{verify_signature, ATTESTATION_CONTEXT, SIGNATURE_SIZE};
