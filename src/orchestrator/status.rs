//! Request records and their lifecycle.

use crate::error::Error;
use crate::identity::Identity;
use crate::price::CurrencyPair;
use crate::request::{FetchSpec, RequestId};
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Lifecycle state of a request.
///
/// ```text
/// Pending ──▶ Completed(body)
///    │
///    └──────▶ Failed(error)
/// ```
///
/// Terminal states are final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    /// Not yet notarized and verified.
    Pending,
    /// Verified response body.
    Completed(Bytes),
    /// Why the request cannot complete.
    Failed(Error),
}

impl RequestStatus {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// The verified body, if completed.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            Self::Completed(body) => Some(body),
            _ => None,
        }
    }

    /// The verified body, or the error the request failed with.
    ///
    /// # Errors
    ///
    /// The failure for `Failed`; `InvalidRequest` for `Pending`.
    pub fn into_body(self) -> Result<Bytes, Error> {
        match self {
            Self::Completed(body) => Ok(body),
            Self::Failed(e) => Err(e),
            Self::Pending => Err(Error::InvalidRequest(
                "request is still pending".to_string(),
            )),
        }
    }

    /// Short label for logs and CLI output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }
}

/// What a record asks the processor to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleRequest {
    /// One notarized fetch; the record body is the verified response body.
    Fetch(FetchSpec),
    /// Prices for currency pairs; the record body is a JSON
    /// [`PriceResponse`](crate::price::PriceResponse).
    Prices(Vec<CurrencyPair>),
}

impl OracleRequest {
    /// The URL, or the comma separated pair list, for logs and events.
    #[must_use]
    pub fn target(&self) -> String {
        match self {
            Self::Fetch(spec) => spec.url.clone(),
            Self::Prices(pairs) => pairs
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl From<FetchSpec> for OracleRequest {
    fn from(spec: FetchSpec) -> Self {
        Self::Fetch(spec)
    }
}

/// One submitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    /// Id handed to the submitter.
    pub id: RequestId,
    /// What was requested.
    pub request: OracleRequest,
    /// Submitting caller, if it came through a caller.
    pub origin: Option<Identity>,
    /// Current state.
    pub status: RequestStatus,
    /// When the record was created.
    pub submitted_at: DateTime<Utc>,
    /// When the record turned terminal.
    pub completed_at: Option<DateTime<Utc>>,
}
