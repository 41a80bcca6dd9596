//! The caller role.
//!
//! A caller trusts one processor, named by its registry binding. It offers
//! both calling conventions over the processor's single record table:
//!
//! - [`Caller::send_http_request`] waits inline for the verified body
//! - [`Caller::submit_http_request`] returns an id to poll with
//!   [`Caller::get_adc_response`]
//!
//! [`Caller::submit_adc_request`] asks for currency pair prices; the result
//! is read back with [`Caller::get_adc_prices`].

use crate::error::Result;
use crate::identity::Identity;
use crate::ledger::{Meter, NoopMeter};
use crate::orchestrator::{RequestOrchestrator, RequestStatus};
use crate::price::PriceResponse;
use crate::registry::{ConfigRegistry, Directory};
use crate::request::{FetchSpec, Header, RequestId};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default bound on a blocking request.
pub const DEFAULT_BLOCKING_TIMEOUT: Duration = Duration::from_secs(60);

/// The caller role.
pub struct Caller {
    identity: Identity,
    registry: Arc<ConfigRegistry>,
    processors: Arc<Directory<RequestOrchestrator>>,
    meter: Arc<dyn Meter>,
    blocking_surcharge: u128,
    blocking_timeout: Duration,
}

impl Caller {
    /// Create a caller that resolves its processor through `registry`.
    #[must_use]
    pub fn new(
        identity: Identity,
        registry: Arc<ConfigRegistry>,
        processors: Arc<Directory<RequestOrchestrator>>,
    ) -> Self {
        Self {
            identity,
            registry,
            processors,
            meter: Arc::new(NoopMeter),
            blocking_surcharge: 0,
            blocking_timeout: DEFAULT_BLOCKING_TIMEOUT,
        }
    }

    /// Charge blocking requests `surcharge` on `meter`.
    #[must_use]
    pub fn with_meter(mut self, meter: Arc<dyn Meter>, surcharge: u128) -> Self {
        self.meter = meter;
        self.blocking_surcharge = surcharge;
        self
    }

    /// Bound blocking requests by `timeout`.
    #[must_use]
    pub fn with_blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = timeout;
        self
    }

    /// This caller's identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The processor this caller trusts, if bound.
    #[must_use]
    pub fn get_adc_address(&self) -> Option<Identity> {
        self.registry.get(&self.identity)
    }

    /// Resolve caller → processor → verifier to live components.
    ///
    /// # Errors
    ///
    /// `Unbound` or `NotLive` for the first link that does not resolve.
    pub fn ensure_ready(&self) -> Result<Arc<RequestOrchestrator>> {
        let processor_id = self.registry.resolve(&self.identity)?;
        let processor = self.processors.lookup(&processor_id)?;
        processor.ensure_ready()?;
        Ok(processor)
    }

    /// Fetch `url` and wait for the verified body.
    ///
    /// `redaction` is the comma separated selector list, empty for none.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for malformed arguments, configuration errors if
    /// the chain is not live, `Timeout`, or whatever failed the request.
    pub async fn send_http_request(
        &self,
        url: &str,
        method: &str,
        redaction: &str,
        headers: Vec<Header>,
        body: impl Into<Bytes>,
    ) -> Result<Bytes> {
        let spec = FetchSpec::from_parts(url, method, redaction, headers, body)?;
        self.send(spec).await
    }

    /// Blocking request for a prepared spec.
    ///
    /// The blocking surcharge is only taken once the processor has
    /// admitted the request.
    ///
    /// # Errors
    ///
    /// As [`send_http_request`](Self::send_http_request).
    pub async fn send(&self, spec: FetchSpec) -> Result<Bytes> {
        let processor = self.ensure_ready()?;
        let url = spec.url.clone();
        let id = processor.submit_from(&self.identity, spec)?;
        info!("{} blocking on {id} for {url}", self.identity);
        self.meter
            .charge(&self.identity, self.blocking_surcharge, "blocking_request");
        processor.wait(&id, self.blocking_timeout).await?.into_body()
    }

    /// Submit a fetch of `url` and return its request id immediately.
    ///
    /// # Errors
    ///
    /// As [`send_http_request`](Self::send_http_request), minus `Timeout`.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime: the pipeline is spawned on
    /// the current one.
    pub fn submit_http_request(
        &self,
        url: &str,
        method: &str,
        redaction: &str,
        headers: Vec<Header>,
        body: impl Into<Bytes>,
    ) -> Result<RequestId> {
        let spec = FetchSpec::from_parts(url, method, redaction, headers, body)?;
        self.submit(spec)
    }

    /// Non-blocking request for a prepared spec.
    ///
    /// # Errors
    ///
    /// As [`submit_http_request`](Self::submit_http_request).
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime: the pipeline is spawned on
    /// the current one.
    pub fn submit(&self, spec: FetchSpec) -> Result<RequestId> {
        let processor = self.ensure_ready()?;
        let id = processor.submit_from(&self.identity, spec)?;
        debug!("{} submitted {id}", self.identity);
        Ok(id)
    }

    /// Request prices for `currency_pairs`, e.g. `BTC/ETH,SOL`, and return
    /// the request id immediately.
    ///
    /// # Errors
    ///
    /// Configuration errors if the chain is not live, `NotWhitelisted`, or
    /// `InvalidRequest` for a malformed or oversized pair list.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime: the pipeline is spawned on
    /// the current one.
    pub fn submit_adc_request(&self, currency_pairs: &str) -> Result<RequestId> {
        let processor = self.ensure_ready()?;
        let id = processor.submit_prices(&self.identity, currency_pairs)?;
        info!("{} requested prices for {currency_pairs} as {id}", self.identity);
        Ok(id)
    }

    /// Pair prices for `id`, once the price request completed.
    ///
    /// `None` in the same cases as [`get_adc_response`](Self::get_adc_response),
    /// and when the completed body is not a price response.
    #[must_use]
    pub fn get_adc_prices(&self, id: &RequestId) -> Option<PriceResponse> {
        let body = self.get_adc_response(id)?;
        match PriceResponse::from_body(&body) {
            Ok(prices) => Some(prices),
            Err(e) => {
                debug!("{id} is not a price response: {e}");
                None
            }
        }
    }

    /// The verified body for `id`, once it completed.
    ///
    /// `None` while pending, after failure, or for unknown ids.
    /// [`poll_adc_response`](Self::poll_adc_response) tells these apart and
    /// carries the failure reason.
    #[must_use]
    pub fn get_adc_response(&self, id: &RequestId) -> Option<Bytes> {
        match self.poll_adc_response(id) {
            Ok(RequestStatus::Completed(body)) => Some(body),
            _ => None,
        }
    }

    /// Current status of `id`.
    ///
    /// # Errors
    ///
    /// Configuration errors if the chain is not live, `NotFound` or
    /// `Expired` for unknown ids.
    pub fn poll_adc_response(&self, id: &RequestId) -> Result<RequestStatus> {
        let processor_id = self.registry.resolve(&self.identity)?;
        self.processors.lookup(&processor_id)?.poll(id)
    }
}

impl std::fmt::Debug for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Caller")
            .field("identity", &self.identity)
            .field("processor", &self.get_adc_address())
            .finish_non_exhaustive()
    }
}
