//! The processor role: admission, dispatch and retrieval.

use super::records::{RecordStats, RecordStore, DEFAULT_RETENTION_CAPACITY};
use super::status::{OracleRequest, RequestRecord, RequestStatus};
use crate::error::{ConfigError, Error, Result};
use crate::event::{create_event_channel, OracleEvent, OracleEventsChannel, OracleEventsSender};
use crate::identity::Identity;
use crate::ledger::{Meter, NoopMeter};
use crate::price::{self, CurrencyPair, PairPrice, PriceConfig, PriceError, PriceResponse};
use crate::registry::{ConfigRegistry, Directory};
use crate::request::{FetchSpec, RequestId};
use crate::verifier::{VerifiedResponse, VerifierNode};
use bytes::Bytes;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default fee a caller pays the processor per request.
pub const DEFAULT_TRANSACTION_FEE: u64 = 2_000_000_000;

/// What each role is charged per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Paid by the caller to the processor on admission.
    #[serde(default = "default_transaction_fee")]
    pub transaction_fee: u64,
    /// Charged to the processor per notarization.
    #[serde(default = "default_notarize_fee")]
    pub notarize: u64,
    /// Charged to the verifier per verification.
    #[serde(default = "default_verify_fee")]
    pub verify: u64,
    /// Charged to the caller for holding a blocking call open.
    #[serde(default = "default_blocking_surcharge")]
    pub blocking_surcharge: u64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            transaction_fee: default_transaction_fee(),
            notarize: default_notarize_fee(),
            verify: default_verify_fee(),
            blocking_surcharge: default_blocking_surcharge(),
        }
    }
}

const fn default_transaction_fee() -> u64 {
    DEFAULT_TRANSACTION_FEE
}

const fn default_notarize_fee() -> u64 {
    400_000_000
}

const fn default_verify_fee() -> u64 {
    150_000_000
}

const fn default_blocking_surcharge() -> u64 {
    250_000_000
}

/// Processor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Terminal records kept for polling.
    #[serde(default = "default_retention_capacity")]
    pub retention_capacity: usize,

    /// Fail a record still pending after this long. `None` waits on the
    /// notary's own timeout.
    #[serde(default, with = "optional_secs")]
    pub pending_timeout: Option<Duration>,

    /// Only whitelisted callers may submit through [`RequestOrchestrator::submit_from`].
    #[serde(default = "default_true")]
    pub whitelist_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retention_capacity: default_retention_capacity(),
            pending_timeout: None,
            whitelist_enabled: true,
        }
    }
}

const fn default_retention_capacity() -> usize {
    DEFAULT_RETENTION_CAPACITY
}

const fn default_true() -> bool {
    true
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

/// Everything a spawned pipeline task needs.
#[derive(Clone)]
struct Pipeline {
    identity: Identity,
    registry: Arc<ConfigRegistry>,
    verifiers: Arc<Directory<VerifierNode>>,
    records: Arc<RecordStore>,
    meter: Arc<dyn Meter>,
    notarize_fee: u128,
    prices: Arc<PriceConfig>,
    pending_timeout: Option<Duration>,
    events: OracleEventsSender,
}

impl Pipeline {
    async fn run(self, id: RequestId, request: OracleRequest) {
        let outcome = match self.pending_timeout {
            Some(bound) => tokio::time::timeout(bound, self.execute(&request))
                .await
                .unwrap_or(Err(Error::Timeout(bound))),
            None => self.execute(&request).await,
        };

        let status = match outcome {
            Ok(body) => {
                info!("Request {id} completed ({} bytes)", body.len());
                let _ = self.events.send(OracleEvent::RequestCompleted {
                    id: id.clone(),
                    body_len: body.len(),
                });
                RequestStatus::Completed(body)
            }
            Err(e) => {
                warn!("Request {id} failed: {e}");
                let _ = self.events.send(OracleEvent::RequestFailed {
                    id: id.clone(),
                    kind: e.kind(),
                    message: e.to_string(),
                });
                RequestStatus::Failed(e)
            }
        };
        self.records.complete(&id, status);
    }

    async fn execute(&self, request: &OracleRequest) -> Result<Bytes> {
        let verifier_id = self.registry.resolve(&self.identity)?;
        let verifier = self.verifiers.lookup(&verifier_id)?;
        match request {
            OracleRequest::Fetch(spec) => Ok(self.fetch(&verifier, spec).await?.body),
            OracleRequest::Prices(pairs) => self.price_pairs(&verifier, pairs).await,
        }
    }

    async fn fetch(&self, verifier: &VerifierNode, spec: &FetchSpec) -> Result<VerifiedResponse> {
        self.meter.charge(&self.identity, self.notarize_fee, "notarize");
        verifier.notarize_and_verify(spec).await
    }

    async fn price_pairs(&self, verifier: &VerifierNode, pairs: &[CurrencyPair]) -> Result<Bytes> {
        let mut tickers: Vec<&str> = pairs.iter().flat_map(CurrencyPair::tickers).collect();
        tickers.sort_unstable();
        tickers.dedup();

        let prices: BTreeMap<&str, std::result::Result<f64, PriceError>> = tickers
            .iter()
            .copied()
            .zip(join_all(tickers.iter().map(|ticker| self.token_price(verifier, ticker))).await)
            .collect();

        let pairs = pairs
            .iter()
            .map(|pair| {
                let outcome = match prices.get(pair.base.as_str()) {
                    Some(base) => price::pair_price(
                        base,
                        pair.quote.as_deref().and_then(|quote| prices.get(quote)),
                    ),
                    None => Err(PriceError::NoVerifiedSource(pair.base.clone())),
                };
                PairPrice::new(pair, outcome)
            })
            .collect();
        PriceResponse { pairs }.to_body()
    }

    /// USD price of `ticker` averaged over every feed whose fetch verified.
    async fn token_price(
        &self,
        verifier: &VerifierNode,
        ticker: &str,
    ) -> std::result::Result<f64, PriceError> {
        let verified = join_all(self.prices.fetches(ticker).into_iter().map(
            |(feed, spec)| async move {
                match self.fetch(verifier, &spec).await {
                    Ok(response) => Some((feed, response.body)),
                    Err(e) => {
                        warn!("No {feed} price for {ticker}: {e}");
                        None
                    }
                }
            },
        ))
        .await;

        let mut prices = Vec::new();
        for (feed, body) in verified.into_iter().flatten() {
            prices.push(feed.parse_price(&body)?);
        }
        debug!("{ticker}: {} verified price(s)", prices.len());
        price::average(&prices).ok_or_else(|| PriceError::NoVerifiedSource(ticker.to_string()))
    }
}

/// The processor role.
///
/// Owns the request record table. Every request, blocking or not, goes
/// through [`submit`](Self::submit) and ends in the same record.
pub struct RequestOrchestrator {
    owner: Identity,
    fees: RwLock<FeeSchedule>,
    whitelist: RwLock<HashSet<Identity>>,
    whitelist_enabled: bool,
    pipeline: Pipeline,
}

impl RequestOrchestrator {
    /// Create a processor.
    ///
    /// `verifiers` is where the processor looks up the verifier its
    /// registry binding names.
    #[must_use]
    pub fn new(
        identity: Identity,
        owner: Identity,
        registry: Arc<ConfigRegistry>,
        verifiers: Arc<Directory<VerifierNode>>,
        config: OrchestratorConfig,
    ) -> Self {
        let (events, _) = create_event_channel();
        info!(
            "Processor {identity} initialized (retention={}, pending_timeout={:?})",
            config.retention_capacity, config.pending_timeout
        );
        Self {
            owner,
            fees: RwLock::new(FeeSchedule::default()),
            whitelist: RwLock::new(HashSet::new()),
            whitelist_enabled: config.whitelist_enabled,
            pipeline: Pipeline {
                identity,
                registry,
                verifiers,
                records: Arc::new(RecordStore::with_capacity(config.retention_capacity)),
                meter: Arc::new(NoopMeter),
                notarize_fee: 0,
                prices: Arc::new(PriceConfig::default()),
                pending_timeout: config.pending_timeout,
                events,
            },
        }
    }

    /// Charge work to `meter` according to `fees`.
    #[must_use]
    pub fn with_meter(mut self, meter: Arc<dyn Meter>, fees: FeeSchedule) -> Self {
        self.pipeline.meter = meter;
        self.pipeline.notarize_fee = u128::from(fees.notarize);
        self.fees = RwLock::new(fees);
        self
    }

    /// Price currency pairs from the feeds in `prices`.
    #[must_use]
    pub fn with_price_sources(mut self, prices: PriceConfig) -> Self {
        self.pipeline.prices = Arc::new(prices);
        self
    }

    /// This processor's identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.pipeline.identity
    }

    /// The verifier this processor trusts.
    ///
    /// # Errors
    ///
    /// `Unbound` if no verifier is configured.
    pub fn verifier(&self) -> Result<Identity> {
        self.pipeline.registry.resolve(&self.pipeline.identity)
    }

    /// The verifier this processor trusts, if bound.
    #[must_use]
    pub fn get_verifier_canister(&self) -> Option<Identity> {
        self.pipeline.registry.get(&self.pipeline.identity)
    }

    /// Check the processor's verifier binding resolves to a live verifier.
    ///
    /// # Errors
    ///
    /// `Unbound` or `NotLive`.
    pub fn ensure_ready(&self) -> Result<Arc<VerifierNode>> {
        let verifier = self.verifier()?;
        self.pipeline.verifiers.lookup(&verifier)
    }

    /// Accept `spec` and start processing it.
    ///
    /// Returns immediately with the id of a Pending record.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if `spec` is malformed; `Unbound` or `NotLive` if
    /// no live verifier is configured.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime: the pipeline is spawned on
    /// the current one.
    pub fn submit(&self, spec: FetchSpec) -> Result<RequestId> {
        self.admit(None, OracleRequest::Fetch(spec))
    }

    /// Accept `spec` on behalf of the caller `origin`.
    ///
    /// The caller must be whitelisted (when enforced) and pays the
    /// transaction fee to the processor.
    ///
    /// # Errors
    ///
    /// `NotWhitelisted`, plus everything [`submit`](Self::submit) returns.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime: the pipeline is spawned on
    /// the current one.
    pub fn submit_from(&self, origin: &Identity, spec: FetchSpec) -> Result<RequestId> {
        self.check_whitelist(origin)?;
        self.admit(Some(origin.clone()), OracleRequest::Fetch(spec))
    }

    /// Accept a price request for `currency_pairs` on behalf of `origin`.
    ///
    /// `currency_pairs` is a comma separated list such as `BTC/ETH,SOL`.
    /// The completed record's body is a JSON [`PriceResponse`]. Admission
    /// and fees are those of [`submit_from`](Self::submit_from).
    ///
    /// # Errors
    ///
    /// `NotWhitelisted`; `InvalidRequest` for a malformed list or more than
    /// [`REQUEST_CURRENCY_PAIR_LIMIT`](crate::price::REQUEST_CURRENCY_PAIR_LIMIT)
    /// pairs; `Unbound` or `NotLive` if no live verifier is configured.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime: the pipeline is spawned on
    /// the current one.
    pub fn submit_prices(&self, origin: &Identity, currency_pairs: &str) -> Result<RequestId> {
        self.check_whitelist(origin)?;
        let pairs = price::parse_pairs(currency_pairs)?;
        self.admit(Some(origin.clone()), OracleRequest::Prices(pairs))
    }

    fn check_whitelist(&self, origin: &Identity) -> Result<()> {
        if self.whitelist_enabled && !self.is_allowed(origin) {
            warn!("Rejected request from {origin}: not whitelisted");
            return Err(ConfigError::NotWhitelisted(origin.clone()).into());
        }
        Ok(())
    }

    fn admit(&self, origin: Option<Identity>, request: OracleRequest) -> Result<RequestId> {
        if let OracleRequest::Fetch(spec) = &request {
            spec.validate()?;
        }
        self.ensure_ready()?;

        if let Some(origin) = &origin {
            let fee = u128::from(self.transaction_fee());
            self.pipeline
                .meter
                .transfer(origin, &self.pipeline.identity, fee, "transaction_fee");
        }

        let target = request.target();
        let id = self.pipeline.records.create(request.clone(), origin.clone());
        debug!("Accepted {id} for {target}");
        let _ = self.pipeline.events.send(OracleEvent::RequestSubmitted {
            id: id.clone(),
            origin,
            target,
        });

        tokio::spawn(self.pipeline.clone().run(id.clone(), request));
        Ok(id)
    }

    /// Current status of `id`. Never blocks.
    ///
    /// # Errors
    ///
    /// `NotFound` for ids never issued here, `Expired` for evicted ones.
    pub fn poll(&self, id: &RequestId) -> Result<RequestStatus> {
        self.pipeline.records.status(id)
    }

    /// Full record for `id`.
    ///
    /// # Errors
    ///
    /// As [`poll`](Self::poll).
    pub fn record(&self, id: &RequestId) -> Result<RequestRecord> {
        self.pipeline.records.get(id)
    }

    /// Wait for `id` to turn terminal.
    ///
    /// # Errors
    ///
    /// `Timeout` if `timeout` elapses first; the record stays Pending.
    pub async fn wait(&self, id: &RequestId, timeout: Duration) -> Result<RequestStatus> {
        self.pipeline.records.wait(id, timeout).await
    }

    /// Submit `spec` and wait for its verified body.
    ///
    /// # Errors
    ///
    /// Admission errors, `Timeout`, or the error the record failed with.
    pub async fn send_blocking(&self, spec: FetchSpec, timeout: Duration) -> Result<Bytes> {
        let id = self.submit(spec)?;
        self.wait(&id, timeout).await?.into_body()
    }

    /// [`send_blocking`](Self::send_blocking) on behalf of `origin`.
    ///
    /// # Errors
    ///
    /// As [`submit_from`](Self::submit_from) and [`send_blocking`](Self::send_blocking).
    pub async fn send_blocking_from(
        &self,
        origin: &Identity,
        spec: FetchSpec,
        timeout: Duration,
    ) -> Result<Bytes> {
        let id = self.submit_from(origin, spec)?;
        self.wait(&id, timeout).await?.into_body()
    }

    /// Current transaction fee.
    #[must_use]
    pub fn transaction_fee(&self) -> u64 {
        self.fees.read().transaction_fee
    }

    /// Full fee schedule.
    #[must_use]
    pub fn fees(&self) -> FeeSchedule {
        *self.fees.read()
    }

    /// Set the transaction fee. Owner only.
    ///
    /// # Errors
    ///
    /// `NotOwner` if `by` is not the owner.
    pub fn set_transaction_fee(&self, by: &Identity, fee: u64) -> Result<()> {
        self.only_owner(by)?;
        self.fees.write().transaction_fee = fee;
        info!("Transaction fee set to {fee}");
        let _ = self.pipeline.events.send(OracleEvent::FeeChanged { fee });
        Ok(())
    }

    /// Whitelist `caller`. Owner only.
    ///
    /// # Errors
    ///
    /// `NotOwner` if `by` is not the owner.
    pub fn allow_caller(&self, by: &Identity, caller: &Identity) -> Result<()> {
        self.only_owner(by)?;
        if self.whitelist.write().insert(caller.clone()) {
            info!("Whitelisted {caller}");
        }
        Ok(())
    }

    /// Remove `caller` from the whitelist. Owner only.
    ///
    /// Returns whether the caller was whitelisted.
    ///
    /// # Errors
    ///
    /// `NotOwner` if `by` is not the owner.
    pub fn revoke_caller(&self, by: &Identity, caller: &Identity) -> Result<bool> {
        self.only_owner(by)?;
        let removed = self.whitelist.write().remove(caller);
        if removed {
            info!("Removed {caller} from whitelist");
        }
        Ok(removed)
    }

    /// Whether `caller` is whitelisted.
    #[must_use]
    pub fn is_allowed(&self, caller: &Identity) -> bool {
        self.whitelist.read().contains(caller)
    }

    fn only_owner(&self, by: &Identity) -> Result<()> {
        if by == &self.owner {
            Ok(())
        } else {
            Err(ConfigError::NotOwner(by.clone()).into())
        }
    }

    /// Subscribe to request events.
    #[must_use]
    pub fn subscribe(&self) -> OracleEventsChannel {
        self.pipeline.events.subscribe()
    }

    /// Record table statistics.
    #[must_use]
    pub fn stats(&self) -> RecordStats {
        self.pipeline.records.stats()
    }
}

impl std::fmt::Debug for RequestOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOrchestrator")
            .field("identity", &self.pipeline.identity)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
