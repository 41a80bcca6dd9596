//! Wiring a local set of roles from configuration.

use crate::caller::Caller;
use crate::config::{LedgerSource, OracleConfig, RolesConfig};
use crate::error::{ConfigError, Error, Result};
use crate::event::OracleEventsChannel;
use crate::identity::Identity;
use crate::ledger::{
    BalanceSource, CommandBalances, CostLedger, CostReport, InMemoryLedger, Meter, NoopMeter,
    Savings,
};
use crate::notary::{Notary, NotaryClient};
use crate::orchestrator::{RequestOrchestrator, RequestStatus};
use crate::price::PriceResponse;
use crate::registry::{ConfigRegistry, Directory};
use crate::request::{FetchSpec, RequestId};
use crate::verifier::{VerifierConfig, VerifierNode};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Builder for a local deployment.
pub struct DeploymentBuilder {
    config: OracleConfig,
    notary: Option<Arc<dyn Notary>>,
}

impl DeploymentBuilder {
    /// Create a new builder with the given configuration.
    #[must_use]
    pub fn new(config: OracleConfig) -> Self {
        Self {
            config,
            notary: None,
        }
    }

    /// Use `notary` instead of an HTTP client for the configured URL.
    #[must_use]
    pub fn with_notary(mut self, notary: Arc<dyn Notary>) -> Self {
        self.notary = Some(notary);
        self
    }

    /// Connect the notary and wire the roles.
    ///
    /// # Errors
    ///
    /// Returns an error if the notary cannot be reached or its key is
    /// refused, if persisted bindings are unreadable, or if the ledger
    /// configuration is incomplete.
    pub async fn build(self) -> Result<Deployment> {
        let config = self.config;
        info!("Building adc-oracle deployment with config: {config:?}");

        std::fs::create_dir_all(&config.state_dir)?;

        let roles = RoleIds {
            caller: RolesConfig::identity(&config.roles.caller),
            processor: RolesConfig::identity(&config.roles.processor),
            verifier: RolesConfig::identity(&config.roles.verifier),
            owner: RolesConfig::identity(&config.roles.owner),
        };

        let (meter, balances): (Arc<dyn Meter>, Arc<dyn BalanceSource>) = match config.ledger.source
        {
            LedgerSource::Memory => {
                let ledger = Arc::new(InMemoryLedger::new());
                for role in roles.all() {
                    ledger.fund(&role, u128::from(config.ledger.initial_balance));
                }
                let meter: Arc<dyn Meter> = ledger.clone();
                let balances: Arc<dyn BalanceSource> = ledger;
                (meter, balances)
            }
            LedgerSource::Command => {
                let template = config.ledger.balance_command.as_deref().ok_or_else(|| {
                    ConfigError::Invalid("ledger.balance_command is required".to_string())
                })?;
                let meter: Arc<dyn Meter> = Arc::new(NoopMeter);
                let balances: Arc<dyn BalanceSource> = Arc::new(CommandBalances::new(template)?);
                (meter, balances)
            }
        };

        let notary: Arc<dyn Notary> = match self.notary {
            Some(notary) => notary,
            None => Arc::new(NotaryClient::new(config.notary.client_config())?),
        };

        let verifier = Arc::new(
            VerifierNode::connect_metered(
                roles.verifier.clone(),
                notary,
                VerifierConfig {
                    pinned_key_pem: config.notary.pinned_public_key.clone(),
                    verify_fee: u128::from(config.fees.verify),
                },
                Arc::clone(&meter),
            )
            .await?,
        );

        let bindings_path = config.bindings_path();
        let registry = Arc::new(ConfigRegistry::load(&bindings_path)?);
        bind_or_replace(&registry, &roles.caller, &roles.processor)?;
        bind_or_replace(&registry, &roles.processor, &roles.verifier)?;

        let verifiers = Arc::new(Directory::new());
        verifiers.register(roles.verifier.clone(), Arc::clone(&verifier));

        let processor = Arc::new(
            RequestOrchestrator::new(
                roles.processor.clone(),
                roles.owner.clone(),
                Arc::clone(&registry),
                verifiers,
                config.orchestrator.clone(),
            )
            .with_meter(Arc::clone(&meter), config.fees)
            .with_price_sources(config.price.clone()),
        );
        processor.allow_caller(&roles.owner, &roles.caller)?;

        let processors = Arc::new(Directory::new());
        processors.register(roles.processor.clone(), Arc::clone(&processor));

        let caller = Arc::new(
            Caller::new(roles.caller.clone(), Arc::clone(&registry), processors)
                .with_meter(meter, u128::from(config.fees.blocking_surcharge))
                .with_blocking_timeout(config.blocking_timeout()),
        );

        caller.ensure_ready()?;
        registry.save(&bindings_path)?;

        info!(
            "Deployment ready: caller {} -> processor {} -> verifier {}",
            roles.caller, roles.processor, roles.verifier
        );

        Ok(Deployment {
            config,
            roles,
            registry,
            caller,
            processor,
            verifier,
            costs: CostLedger::new(balances),
        })
    }
}

fn bind_or_replace(registry: &ConfigRegistry, source: &Identity, target: &Identity) -> Result<()> {
    match registry.bind(source, target) {
        Err(Error::Config(ConfigError::AlreadyBound { existing, .. })) => {
            warn!("Persisted binding {source} -> {existing} replaced by configured {target}");
            registry.rebind(source, target).map(|_| ())
        }
        other => other,
    }
}

/// Identities of the deployed roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleIds {
    /// Caller.
    pub caller: Identity,
    /// Processor.
    pub processor: Identity,
    /// Verifier.
    pub verifier: Identity,
    /// Processor owner.
    pub owner: Identity,
}

impl RoleIds {
    /// Caller, processor and verifier, in chain order.
    #[must_use]
    pub fn chain(&self) -> [Identity; 3] {
        [
            self.caller.clone(),
            self.processor.clone(),
            self.verifier.clone(),
        ]
    }

    fn all(&self) -> [Identity; 4] {
        [
            self.caller.clone(),
            self.processor.clone(),
            self.verifier.clone(),
            self.owner.clone(),
        ]
    }
}

/// Costs of one spec fetched over both calling conventions.
#[derive(Debug, Clone)]
pub struct PathComparison {
    /// Body from the blocking path.
    pub blocking_body: Bytes,
    /// Body from submit + poll.
    pub orchestrated_body: Bytes,
    /// Per-role costs of the blocking path.
    pub blocking: CostReport,
    /// Per-role costs of submit + poll.
    pub orchestrated: CostReport,
}

impl PathComparison {
    /// Savings of submit + poll over the blocking path.
    #[must_use]
    pub fn savings(&self) -> Savings {
        match (self.blocking.total(), self.orchestrated.total()) {
            (Some(blocking), Some(orchestrated)) => CostLedger::compare(blocking, orchestrated),
            _ => Savings::Undefined,
        }
    }
}

/// A wired local deployment.
pub struct Deployment {
    config: OracleConfig,
    roles: RoleIds,
    registry: Arc<ConfigRegistry>,
    caller: Arc<Caller>,
    processor: Arc<RequestOrchestrator>,
    verifier: Arc<VerifierNode>,
    costs: CostLedger,
}

impl Deployment {
    /// Configuration this deployment was built from.
    #[must_use]
    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Role identities.
    #[must_use]
    pub fn roles(&self) -> &RoleIds {
        &self.roles
    }

    /// Trust-chain bindings.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConfigRegistry> {
        &self.registry
    }

    /// The caller role.
    #[must_use]
    pub fn caller(&self) -> &Arc<Caller> {
        &self.caller
    }

    /// The processor role.
    #[must_use]
    pub fn processor(&self) -> &Arc<RequestOrchestrator> {
        &self.processor
    }

    /// The verifier role.
    #[must_use]
    pub fn verifier(&self) -> &Arc<VerifierNode> {
        &self.verifier
    }

    /// Balance snapshots for the deployed roles.
    #[must_use]
    pub fn costs(&self) -> &CostLedger {
        &self.costs
    }

    /// Subscribe to processor events.
    #[must_use]
    pub fn subscribe_events(&self) -> OracleEventsChannel {
        self.processor.subscribe()
    }

    /// Submit through the caller and poll every `interval` until terminal.
    ///
    /// # Errors
    ///
    /// Admission errors, the error the record failed with, or `Timeout`
    /// once the blocking bound has elapsed.
    pub async fn submit_and_poll(&self, spec: FetchSpec, interval: Duration) -> Result<Bytes> {
        let id = self.caller.submit(spec)?;
        self.poll_until_done(&id, interval).await
    }

    /// Request `currency_pairs` through the caller and poll every
    /// `interval` for the prices.
    ///
    /// # Errors
    ///
    /// As [`submit_and_poll`](Self::submit_and_poll), plus `Serialization`
    /// if the body is not a price response.
    pub async fn request_prices(
        &self,
        currency_pairs: &str,
        interval: Duration,
    ) -> Result<PriceResponse> {
        let id = self.caller.submit_adc_request(currency_pairs)?;
        let body = self.poll_until_done(&id, interval).await?;
        PriceResponse::from_body(&body)
    }

    async fn poll_until_done(&self, id: &RequestId, interval: Duration) -> Result<Bytes> {
        let bound = self.config.blocking_timeout();
        let polling = async {
            loop {
                match self.caller.poll_adc_response(id) {
                    Ok(RequestStatus::Pending) => {
                        debug!("{id} still pending");
                        tokio::time::sleep(interval).await;
                    }
                    Ok(RequestStatus::Completed(body)) => return Ok(body),
                    Ok(RequestStatus::Failed(e)) | Err(e) => return Err(e),
                }
            }
        };
        tokio::time::timeout(bound, polling)
            .await
            .unwrap_or(Err(Error::Timeout(bound)))
    }

    /// Fetch `spec` over both calling conventions and measure each.
    ///
    /// # Errors
    ///
    /// Returns the first error from either path.
    pub async fn compare_paths(&self, spec: FetchSpec, interval: Duration) -> Result<PathComparison> {
        let roles = self.roles.chain();

        let (blocking_body, blocking) = self
            .costs
            .measure(&roles, self.caller.send(spec.clone()))
            .await;
        let blocking_body = blocking_body?;

        let (orchestrated_body, orchestrated) = self
            .costs
            .measure(&roles, self.submit_and_poll(spec, interval))
            .await;
        let orchestrated_body = orchestrated_body?;

        Ok(PathComparison {
            blocking_body,
            orchestrated_body,
            blocking,
            orchestrated,
        })
    }
}

impl std::fmt::Debug for Deployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployment")
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}
