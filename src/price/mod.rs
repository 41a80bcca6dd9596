//! Currency pair price requests.
//!
//! A price request names up to [`REQUEST_CURRENCY_PAIR_LIMIT`] pairs as a
//! comma separated list such as `BTC/ETH,SOL`; tickers are ASCII letters
//! and digits, at most [`MAX_TICKER_LEN`] long. For each distinct token the
//! processor fetches its USD price from every configured [`PriceSource`],
//! notarizing and verifying each fetch like any other request. The verified
//! prices are averaged per token and a pair is priced as base over quote;
//! a pair without a quote is priced in USD.
//!
//! Pair outcomes are independent: one token without a verified price marks
//! its pairs with an error and leaves the other pairs priced.

mod sources;

pub use sources::{PriceSource, DEFAULT_PYTH_URL, DEFAULT_REDSTONE_URL};

use crate::error::{Error, Result};
use crate::request::FetchSpec;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Most currency pairs accepted in one request.
pub const REQUEST_CURRENCY_PAIR_LIMIT: usize = 10;

/// Longest ticker accepted in a pair.
pub const MAX_TICKER_LEN: usize = 16;

/// Tickers end up in feed URLs, so only `[A-Z0-9]{1,16}` is accepted.
fn is_valid_ticker(ticker: &str) -> bool {
    !ticker.is_empty()
        && ticker.len() <= MAX_TICKER_LEN
        && ticker
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Why a token or pair has no price.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    /// Every fetch for the token failed notarization or verification.
    #[error("no verified price for {0}")]
    NoVerifiedSource(String),

    /// A verified response was not in the feed's format.
    #[error("{feed} response: {reason}")]
    Malformed {
        /// Feed that answered.
        feed: PriceSource,
        /// What was wrong.
        reason: String,
    },
}

/// A `BASE` or `BASE/QUOTE` pair of tickers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Priced token.
    pub base: String,
    /// Token the price is expressed in. `None` means USD.
    pub quote: Option<String>,
}

impl CurrencyPair {
    /// Tickers whose USD price this pair needs.
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.base.as_str()).chain(self.quote.as_deref())
    }
}

impl FromStr for CurrencyPair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        let parts: Vec<&str> = upper.split('/').map(str::trim).collect();
        let invalid = || Error::InvalidRequest(format!("invalid currency pair {s:?}"));
        if !parts.iter().all(|part| is_valid_ticker(part)) {
            return Err(invalid());
        }
        match parts.as_slice() {
            [base] => Ok(Self {
                base: (*base).to_string(),
                quote: None,
            }),
            [base, quote] => Ok(Self {
                base: (*base).to_string(),
                quote: Some((*quote).to_string()),
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.quote {
            Some(quote) => write!(f, "{}/{quote}", self.base),
            None => f.write_str(&self.base),
        }
    }
}

/// Parse a comma separated pair list. Blank entries are skipped.
///
/// # Errors
///
/// [`Error::InvalidRequest`] for an empty list, a malformed pair, or more
/// than [`REQUEST_CURRENCY_PAIR_LIMIT`] pairs.
pub fn parse_pairs(input: &str) -> Result<Vec<CurrencyPair>> {
    let pairs = input
        .split(',')
        .filter(|item| !item.trim().is_empty())
        .map(str::parse)
        .collect::<Result<Vec<CurrencyPair>>>()?;

    if pairs.is_empty() {
        return Err(Error::InvalidRequest("no currency pairs requested".to_string()));
    }
    if pairs.len() > REQUEST_CURRENCY_PAIR_LIMIT {
        return Err(Error::InvalidRequest(format!(
            "at most {REQUEST_CURRENCY_PAIR_LIMIT} currency pairs per request, got {}",
            pairs.len()
        )));
    }
    Ok(pairs)
}

/// Arithmetic mean, `None` for no prices.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn average(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        None
    } else {
        Some(prices.iter().sum::<f64>() / prices.len() as f64)
    }
}

/// Price of `pair` given the USD price of each of its tokens.
///
/// # Errors
///
/// The first token error, base before quote.
pub fn pair_price(
    base: &std::result::Result<f64, PriceError>,
    quote: Option<&std::result::Result<f64, PriceError>>,
) -> std::result::Result<f64, PriceError> {
    let base = base.clone()?;
    match quote {
        Some(quote) => Ok(base / quote.clone()?),
        None => Ok(base),
    }
}

/// Outcome for one requested pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairPrice {
    /// Pair as requested, normalized (`BTC/ETH`).
    pub pair: String,
    /// Price of one base token in the quote token.
    pub price: Option<f64>,
    /// Why `price` is missing.
    pub error: Option<String>,
}

impl PairPrice {
    /// Record the outcome for `pair`.
    #[must_use]
    pub fn new(pair: &CurrencyPair, outcome: std::result::Result<f64, PriceError>) -> Self {
        match outcome {
            Ok(price) => Self {
                pair: pair.to_string(),
                price: Some(price),
                error: None,
            },
            Err(e) => Self {
                pair: pair.to_string(),
                price: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// The body of a completed price request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceResponse {
    /// One entry per requested pair, in request order.
    pub pairs: Vec<PairPrice>,
}

impl PriceResponse {
    /// Decode a completed price request body.
    ///
    /// # Errors
    ///
    /// [`Error::Serialization`] if `body` is not a price response.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Encode as a record body.
    ///
    /// # Errors
    ///
    /// [`Error::Serialization`] if encoding fails.
    pub fn to_body(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Outcome for `pair`, if it was requested.
    #[must_use]
    pub fn get(&self, pair: &str) -> Option<&PairPrice> {
        self.pairs.iter().find(|p| p.pair == pair)
    }
}

/// Where token prices are fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceConfig {
    /// RedStone base URL.
    #[serde(default = "default_redstone_url")]
    pub redstone_url: String,

    /// Pyth Hermes base URL.
    #[serde(default = "default_pyth_url")]
    pub pyth_url: String,

    /// Pyth USD feed id per ticker. Tickers without one are priced from
    /// RedStone alone.
    #[serde(default)]
    pub pyth_feed_ids: BTreeMap<String, String>,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            redstone_url: default_redstone_url(),
            pyth_url: default_pyth_url(),
            pyth_feed_ids: BTreeMap::new(),
        }
    }
}

fn default_redstone_url() -> String {
    DEFAULT_REDSTONE_URL.to_string()
}

fn default_pyth_url() -> String {
    DEFAULT_PYTH_URL.to_string()
}

impl PriceConfig {
    /// The fetch for each feed that can price `ticker`.
    #[must_use]
    pub fn fetches(&self, ticker: &str) -> Vec<(PriceSource, FetchSpec)> {
        let mut fetches = vec![(
            PriceSource::Redstone,
            FetchSpec::get(PriceSource::Redstone.url(&self.redstone_url, ticker)),
        )];
        if let Some(feed_id) = self.pyth_feed_ids.get(ticker) {
            let feed_id = feed_id.trim_start_matches("0x");
            fetches.push((
                PriceSource::Pyth,
                FetchSpec::get(PriceSource::Pyth.url(&self.pyth_url, feed_id)),
            ));
        }
        fetches
    }
}
