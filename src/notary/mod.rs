//! Notary access for adc-oracle.
//!
//! A notary observes a TLS session with the target endpoint and returns a
//! transcript signed with its ML-DSA-65 key. The oracle treats it as an
//! opaque service behind the [`Notary`] trait.
//!
//! # Flow
//!
//! ```text
//! setup                         per request
//!   │                               │
//!   ▼                               ▼
//! GET /notaryinfo              POST /notarize
//!   │                               │
//!   ▼                               ▼
//! pin public key              Attestation {transcript, signature, key}
//!                                   │
//!                                   ▼
//!                             ProofVerifier
//! ```

mod client;
mod pem;
mod types;

pub use client::{NotaryClient, NotaryConfig, DEFAULT_NOTARY_TIMEOUT, DEFAULT_NOTARY_URL};
pub use pem::{decode_public_key, encode_public_key, PUBLIC_KEY_SIZE};
pub use types::{
    base64_bytes, Attestation, NotarizeRequest, NotarizeResponse, NotaryInfo,
    NotaryInfoResponse, Transcript, TranscriptRequest, TranscriptResponse,
};

use crate::error::Result;
use crate::request::FetchSpec;
use async_trait::async_trait;

/// An attestation service.
///
/// Implementations hold no per-request mutable state: concurrent
/// notarizations against the same notary are independent.
#[async_trait]
pub trait Notary: Send + Sync {
    /// Liveness and public key.
    ///
    /// # Errors
    ///
    /// `NotaryUnreachable` if the notary does not answer within its bound;
    /// `InvalidNotaryKey` if the advertised key is malformed.
    async fn get_info(&self) -> Result<NotaryInfo>;

    /// Perform the fetch described by `spec` and return a signed transcript.
    ///
    /// Not idempotent: each call hits the target endpoint once.
    ///
    /// # Errors
    ///
    /// `NotarizationFailed` on any transport or notary-side failure.
    async fn notarize(&self, spec: &FetchSpec) -> Result<Attestation>;
}
