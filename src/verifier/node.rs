//! The verifier role.
//!
//! A [`VerifierNode`] owns a notary handle and the key it pinned at connect
//! time. Each attestation it accepts is checked against that pin, never
//! against the key the attestation itself carries.

use super::proof::{ProofVerifier, VerifiedResponse};
use crate::error::{ConfigError, Result};
use crate::identity::Identity;
use crate::ledger::{Meter, NoopMeter};
use crate::notary::{decode_public_key, encode_public_key, Attestation, Notary};
use crate::request::FetchSpec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Verifier role configuration.
#[derive(Debug, Clone, Default)]
pub struct VerifierConfig {
    /// Expected notary key. When set, a notary advertising any other key
    /// is refused at connect time.
    pub pinned_key_pem: Option<String>,
    /// Cost charged to the verifier per verification.
    pub verify_fee: u128,
}

/// Verification counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VerifierStats {
    /// Attestations accepted.
    pub verified: u64,
    /// Attestations rejected.
    pub rejected: u64,
}

/// The verifier role: pinned notary key plus the notary it was pinned from.
pub struct VerifierNode {
    identity: Identity,
    notary: Arc<dyn Notary>,
    public_key_pem: String,
    proof: ProofVerifier,
    meter: Arc<dyn Meter>,
    verify_fee: u128,
    verified: AtomicU64,
    rejected: AtomicU64,
}

impl VerifierNode {
    /// Query the notary and pin its key.
    ///
    /// # Errors
    ///
    /// - `NotaryUnreachable` if the notary cannot be queried
    /// - `InvalidNotaryKey` if the configured pin is not a valid key
    /// - `PinnedKeyMismatch` if the notary key differs from the pin
    pub async fn connect(
        identity: Identity,
        notary: Arc<dyn Notary>,
        config: VerifierConfig,
    ) -> Result<Self> {
        Self::connect_metered(identity, notary, config, Arc::new(NoopMeter)).await
    }

    /// Like [`connect`](Self::connect), charging verifications to `meter`.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn connect_metered(
        identity: Identity,
        notary: Arc<dyn Notary>,
        config: VerifierConfig,
        meter: Arc<dyn Meter>,
    ) -> Result<Self> {
        let info = notary.get_info().await?;

        if let Some(pinned) = &config.pinned_key_pem {
            let pinned = decode_public_key(pinned)?;
            if pinned != info.public_key {
                warn!("Notary key for {identity} does not match the configured pin");
                return Err(ConfigError::PinnedKeyMismatch.into());
            }
        }

        info!(
            "Verifier {identity} pinned notary key {}",
            hex::encode(&info.public_key[..8.min(info.public_key.len())])
        );

        Ok(Self {
            identity,
            notary,
            public_key_pem: encode_public_key(&info.public_key),
            proof: ProofVerifier::new(info.public_key),
            meter,
            verify_fee: config.verify_fee,
            verified: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        })
    }

    /// This verifier's identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The notary this verifier trusts.
    #[must_use]
    pub fn notary(&self) -> &Arc<dyn Notary> {
        &self.notary
    }

    /// Pinned key as PEM.
    #[must_use]
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    /// Verify an attestation for `spec` against the pinned key.
    ///
    /// # Errors
    ///
    /// Returns a verification error if the attestation must not be trusted.
    pub fn verify(&self, spec: &FetchSpec, attestation: &Attestation) -> Result<VerifiedResponse> {
        self.meter.charge(&self.identity, self.verify_fee, "verify");
        match self.proof.verify(spec, attestation) {
            Ok(verified) => {
                self.verified.fetch_add(1, Ordering::Relaxed);
                Ok(verified)
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Verifier {} rejected attestation for {}: {e}", self.identity, spec.url);
                Err(e.into())
            }
        }
    }

    /// Notarize `spec` through this verifier's notary, then verify it.
    ///
    /// # Errors
    ///
    /// Transport errors from the notary, or verification errors.
    pub async fn notarize_and_verify(&self, spec: &FetchSpec) -> Result<VerifiedResponse> {
        debug!("Verifier {} notarizing {}", self.identity, spec.url);
        let attestation = self.notary.notarize(spec).await?;
        self.verify(spec, &attestation)
    }

    /// Verification counters.
    #[must_use]
    pub fn stats(&self) -> VerifierStats {
        VerifierStats {
            verified: self.verified.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for VerifierNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierNode")
            .field("identity", &self.identity)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
