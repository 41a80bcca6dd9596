//! Error types for adc-oracle.
//!
//! Errors are grouped so a caller can tell "try again later"
//! ([`ErrorKind::Transport`]) from "do not trust this response"
//! ([`ErrorKind::Verification`]) from "fix your setup"
//! ([`ErrorKind::Configuration`]).
//!
//! [`Error`] is `Clone`: a failed request record hands the same error to
//! every poller and blocking waiter.

use crate::identity::Identity;
use std::time::Duration;
use thiserror::Error;

/// Result type for adc-oracle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Trust chain or setup problem.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A remote collaborator could not be reached or failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The attestation must not be trusted.
    #[error("verification error: {0}")]
    Verification(#[from] VerificationError),

    /// A blocking wait exceeded its bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The submitted request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No record was ever issued under this id.
    #[error("request not found: {0}")]
    NotFound(String),

    /// The record existed but was dropped by the retention policy.
    #[error("request expired from retention: {0}")]
    Expired(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Configuration errors. Fatal at setup, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No binding exists for the role.
    #[error("{0} is not bound to a downstream role")]
    Unbound(Identity),

    /// The role is already bound to a different target.
    #[error("{source_id} is already bound to {existing}, refusing to bind to {requested}")]
    AlreadyBound {
        /// Role being configured.
        source_id: Identity,
        /// Current target.
        existing: Identity,
        /// Rejected target.
        requested: Identity,
    },

    /// The binding would make the chain reach its own origin.
    #[error("binding {source_id} -> {target} would create a cycle")]
    CycleDetected {
        /// Role being configured.
        source_id: Identity,
        /// Rejected target.
        target: Identity,
    },

    /// The identity does not resolve to a registered component.
    #[error("{0} does not resolve to a live component")]
    NotLive(Identity),

    /// The notary advertised an unusable public key.
    #[error("invalid notary public key: {0}")]
    InvalidNotaryKey(String),

    /// The notary key differs from the configured pin.
    #[error("notary public key does not match the pinned key")]
    PinnedKeyMismatch,

    /// An owner-only operation was attempted by someone else.
    #[error("{0} is not the owner of this processor")]
    NotOwner(Identity),

    /// The origin is not on the processor's whitelist.
    #[error("{0} is not allowed to submit requests")]
    NotWhitelisted(Identity),

    /// Configuration file or value problem.
    #[error("{0}")]
    Invalid(String),
}

/// Transport errors. Fatal to the in-flight operation only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The notary did not answer within its bound, or answered non-200.
    #[error("notary unreachable: {0}")]
    NotaryUnreachable(String),

    /// The notary failed to produce an attestation.
    #[error("notarization failed: {0}")]
    NotarizationFailed(String),

    /// A balance could not be read.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
}

/// Verification errors. Security relevant, never downgraded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Key mismatch or malformed/invalid signature.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// The notary observed a different request than the one submitted.
    #[error("transcript mismatch on {field}: {detail}")]
    TranscriptMismatch {
        /// Transcript field that disagreed.
        field: &'static str,
        /// Human-readable detail.
        detail: String,
    },

    /// A redaction could not be applied cleanly.
    #[error("redaction violation: {0}")]
    RedactionViolation(String),
}

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Fix your setup.
    Configuration,
    /// Try again later.
    Transport,
    /// Do not trust this response.
    Verification,
    /// Blocking wait elapsed.
    Timeout,
    /// Bad input from the caller.
    InvalidRequest,
    /// Unknown or expired request id.
    NotFound,
    /// Local I/O or encoding problem.
    Internal,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Verification(_) => ErrorKind::Verification,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::NotFound(_) | Self::Expired(_) => ErrorKind::NotFound,
            Self::Io(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Whether a caller-side retry may succeed.
    ///
    /// Only transport failures qualify. The core itself never retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
