//! Price feeds and their response formats.

use super::PriceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Default Pyth Hermes endpoint.
pub const DEFAULT_PYTH_URL: &str = "https://hermes.pyth.network";

/// Default RedStone endpoint.
pub const DEFAULT_REDSTONE_URL: &str = "https://api.redstone.finance";

/// A price feed a token's USD price can be fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    /// Pyth Hermes `latest_price_feeds`.
    Pyth,
    /// RedStone `prices`.
    Redstone,
}

impl PriceSource {
    /// URL of the latest price for `key` under `base_url`.
    ///
    /// `key` is the feed id for Pyth and the ticker for RedStone.
    #[must_use]
    pub fn url(self, base_url: &str, key: &str) -> String {
        let base_url = base_url.trim_end_matches('/');
        match self {
            Self::Pyth => format!("{base_url}/api/latest_price_feeds?ids[]={key}"),
            Self::Redstone => {
                format!("{base_url}/prices?symbol={key}&provider=redstone&limit=1")
            }
        }
    }

    /// Extract the USD price from a verified response body.
    ///
    /// # Errors
    ///
    /// [`PriceError::Malformed`] if the body is not in the feed's format or
    /// the price is not a positive finite number.
    pub fn parse_price(self, body: &[u8]) -> Result<f64, PriceError> {
        let data: Value = serde_json::from_slice(body).map_err(|e| self.malformed(e))?;
        let price = match self {
            Self::Pyth => parse_pyth(&data).map_err(|reason| self.malformed(reason))?,
            Self::Redstone => data
                .get(0)
                .and_then(|entry| entry.get("value"))
                .and_then(Value::as_f64)
                .ok_or_else(|| self.malformed("price not available: JSON structure changed"))?,
        };
        if !(price.is_finite() && price > 0.0) {
            return Err(self.malformed(format!("price {price} is not positive")));
        }
        Ok(price)
    }

    fn malformed(self, reason: impl fmt::Display) -> PriceError {
        PriceError::Malformed {
            feed: self,
            reason: reason.to_string(),
        }
    }
}

/// `[{"price": {"price": "6512345", "expo": -2, ...}, ...}]`
fn parse_pyth(data: &Value) -> Result<f64, String> {
    let feed = data
        .get(0)
        .and_then(|entry| entry.get("price"))
        .ok_or("missing price feed")?;
    let mantissa: f64 = feed
        .get("price")
        .and_then(Value::as_str)
        .ok_or("missing price mantissa")?
        .parse()
        .map_err(|e| format!("bad price mantissa: {e}"))?;
    let expo = feed
        .get("expo")
        .and_then(Value::as_i64)
        .ok_or("missing price exponent")?;
    let expo = i32::try_from(expo).map_err(|_| format!("price exponent {expo} out of range"))?;
    Ok(mantissa * 10f64.powi(expo))
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pyth => f.write_str("pyth"),
            Self::Redstone => f.write_str("redstone"),
        }
    }
}
