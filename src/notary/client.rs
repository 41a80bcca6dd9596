//! HTTP client for an external notary service.
//!
//! The notary is an opaque attestation service. This client only knows two
//! endpoints:
//!
//! - `GET  {base}/notaryinfo`: liveness and the PEM public key
//! - `POST {base}/notarize`: perform a fetch and return a signed transcript
//!
//! A notarization consumes the target's real HTTP response once per call, so
//! the client never retries.

use super::pem::decode_public_key;
use super::types::{
    Attestation, NotarizeRequest, NotarizeResponse, NotaryInfo, NotaryInfoResponse,
};
use super::Notary;
use crate::error::{Error, Result, TransportError};
use crate::request::FetchSpec;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default notary base URL.
pub const DEFAULT_NOTARY_URL: &str = "http://127.0.0.1:8080";

/// Default bound for a notary round trip.
pub const DEFAULT_NOTARY_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the notary client.
#[derive(Debug, Clone)]
pub struct NotaryConfig {
    /// Base URL of the notary.
    pub base_url: String,
    /// Timeout for a single notarization round trip.
    pub timeout: Duration,
    /// Timeout for the info endpoint.
    pub info_timeout: Duration,
}

impl Default for NotaryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_NOTARY_URL.to_string(),
            timeout: DEFAULT_NOTARY_TIMEOUT,
            info_timeout: Duration::from_secs(10),
        }
    }
}

/// reqwest-backed [`Notary`].
#[derive(Debug, Clone)]
pub struct NotaryClient {
    config: NotaryConfig,
    http: reqwest::Client,
}

impl NotaryClient {
    /// Create a new notary client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: NotaryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::NotaryUnreachable(format!("http client: {e}")))?;
        debug!("Creating notary client for {}", config.base_url);
        Ok(Self { config, http })
    }

    /// Create a notary client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_defaults() -> Result<Self> {
        Self::new(NotaryConfig::default())
    }

    /// Base URL this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Notary for NotaryClient {
    async fn get_info(&self) -> Result<NotaryInfo> {
        let url = self.endpoint("notaryinfo");
        debug!("Querying notary info at {url}");

        let response = self
            .http
            .get(&url)
            .timeout(self.config.info_timeout)
            .send()
            .await
            .map_err(|e| TransportError::NotaryUnreachable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Notary info returned {status}");
            return Err(TransportError::NotaryUnreachable(format!("{url} returned {status}")).into());
        }

        let body: NotaryInfoResponse = response
            .json()
            .await
            .map_err(|e| TransportError::NotaryUnreachable(format!("malformed info body: {e}")))?;
        let public_key = decode_public_key(&body.public_key)?;

        info!(
            "Notary at {} is live (key fingerprint {})",
            self.config.base_url,
            hex::encode(&public_key[..8])
        );

        Ok(NotaryInfo {
            public_key_pem: body.public_key,
            public_key,
            live: true,
        })
    }

    async fn notarize(&self, spec: &FetchSpec) -> Result<Attestation> {
        let url = self.endpoint("notarize");
        debug!("Notarizing {} {} via {url}", spec.method, spec.url);

        let failed = |detail: String| Error::from(TransportError::NotarizationFailed(detail));

        let response = self
            .http
            .post(&url)
            .json(&NotarizeRequest::from(spec))
            .send()
            .await
            .map_err(|e| failed(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!("Notarization of {} returned {status}", spec.url);
            return Err(failed(format!("notary returned {status}: {detail}")));
        }

        let body: NotarizeResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("malformed notarize body: {e}")))?;

        // A notary that cannot name its own key produced nothing verifiable
        let signer_public_key = decode_public_key(&body.public_key)
            .map_err(|e| failed(format!("attestation key: {e}")))?;

        debug!(
            "Notary returned {} transcript bytes for {}",
            body.transcript.len(),
            spec.url
        );

        Ok(Attestation {
            transcript: body.transcript,
            signature: body.signature,
            signer_public_key,
        })
    }
}
