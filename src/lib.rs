//! # adc-oracle
//!
//! Authenticated data collection: fetch an HTTPS resource through a
//! notary, verify the notary's signed transcript against a pinned key, and
//! hand the verified body back to the caller that asked for it.
//!
//! ## Roles
//!
//! ```text
//! Caller ──▶ RequestOrchestrator (processor) ──▶ VerifierNode ──▶ notary
//! ```
//!
//! Each arrow is a binding in the [`ConfigRegistry`]. Bindings are
//! one-to-one and acyclic; a role is only usable once every link after it
//! resolves to a live component.
//!
//! ## Calling conventions
//!
//! - **Blocking**: [`Caller::send_http_request`] waits for the verified body
//! - **Submit and poll**: [`Caller::submit_http_request`] returns a
//!   [`RequestId`], redeemed later with [`Caller::get_adc_response`]
//!
//! Both paths share one record table in the processor, so a body is the
//! same whichever way it was asked for. [`Caller::submit_adc_request`]
//! uses the same table for currency pair prices built from verified feeds.
//! The [`CostLedger`] measures what each path costs every role.
//!
//! ## Example
//!
//! ```rust,ignore
//! use adc_oracle::{DeploymentBuilder, OracleConfig};
//!
//! let deployment = DeploymentBuilder::new(OracleConfig::default()).build().await?;
//! let body = deployment
//!     .caller()
//!     .send_http_request("https://example.com/txns", "GET", "", vec![], "")
//!     .await?;
//! ```

pub mod caller;
pub mod config;
pub mod deployment;
pub mod error;
pub mod event;
pub mod identity;
pub mod ledger;
pub mod notary;
pub mod orchestrator;
pub mod price;
pub mod registry;
pub mod request;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use caller::Caller;
pub use config::OracleConfig;
pub use deployment::{Deployment, DeploymentBuilder, PathComparison, RoleIds};
pub use error::{ConfigError, Error, ErrorKind, Result, TransportError, VerificationError};
pub use event::{OracleEvent, OracleEventsChannel};
pub use identity::Identity;
pub use ledger::{CostLedger, CostReport, Savings};
pub use notary::{Attestation, Notary, NotaryClient, NotaryInfo};
pub use orchestrator::{RequestOrchestrator, RequestStatus};
pub use price::{CurrencyPair, PriceResponse};
pub use registry::{ConfigRegistry, Directory};
pub use request::{FetchSpec, Header, HttpMethod, Redaction, RequestId};
pub use verifier::{VerifiedResponse, VerifierNode};
