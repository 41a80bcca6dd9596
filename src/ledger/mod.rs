//! Per-role resource accounting.
//!
//! Roles are charged for the work they do (notarization, verification,
//! transaction fees). The [`CostLedger`] reads balances before and after an
//! operation and reports what each role consumed.
//!
//! # Architecture
//!
//! ```text
//!  measure(roles, op)
//!        │
//!        ▼
//! ┌──────────────────┐     ┌─────────────────┐
//! │ snapshot(before) │────▶│ BalanceSource   │
//! └────────┬─────────┘     │  InMemoryLedger │
//!          │               │  CommandBalances│
//!       run op             └─────────────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ snapshot(after)  │──▶ CostReport { per-role delta, total }
//! └──────────────────┘
//! ```
//!
//! Snapshots are best-effort: background work between the two readings is
//! attributed to the operation.
//!
//! A role that earns more than it spends (the processor keeps the caller's
//! transaction fee) reports zero consumption and its net gain as `credited`.

mod command;
mod memory;

pub use command::{CommandBalances, BALANCE_PATTERN};
pub use memory::InMemoryLedger;

use crate::error::Result;
use crate::identity::Identity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reads a role's current balance.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Current balance of `role`.
    ///
    /// # Errors
    ///
    /// `LedgerUnavailable` if the balance cannot be read.
    async fn balance(&self, role: &Identity) -> Result<u128>;
}

/// Charges roles for work as it happens.
pub trait Meter: Send + Sync {
    /// Debit `amount` from `role` for `op`.
    fn charge(&self, role: &Identity, amount: u128, op: &str);

    /// Credit `amount` to `role` for `op`.
    fn credit(&self, role: &Identity, amount: u128, op: &str);

    /// Move `amount` from `from` to `to`.
    fn transfer(&self, from: &Identity, to: &Identity, amount: u128, op: &str) {
        self.charge(from, amount, op);
        self.credit(to, amount, op);
    }
}

/// A meter that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMeter;

impl Meter for NoopMeter {
    fn charge(&self, _role: &Identity, _amount: u128, _op: &str) {}
    fn credit(&self, _role: &Identity, _amount: u128, _op: &str) {}
}

/// A role's balance at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostSnapshot {
    /// Role whose balance was read.
    pub role: Identity,
    /// Balance in the ledger's smallest unit.
    pub balance: u128,
    /// When the balance was read.
    pub taken_at: DateTime<Utc>,
}

/// Relative saving of one path against a baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Savings {
    /// `(1 - candidate / baseline) * 100`. Negative when the candidate costs more.
    Percent(f64),
    /// The baseline consumed nothing.
    Undefined,
}

impl fmt::Display for Savings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percent(p) => write!(f, "{p:.2}%"),
            Self::Undefined => f.write_str("undefined"),
        }
    }
}

/// What one role consumed during a measured operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCost {
    /// The role.
    pub role: Identity,
    /// Consumption, or `None` if either snapshot failed.
    pub consumed: Option<u128>,
    /// Net gain when the balance grew, or `None` if either snapshot failed.
    pub credited: Option<u128>,
}

/// Per-role consumption of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostReport {
    /// One entry per measured role, in measurement order.
    pub roles: Vec<RoleCost>,
}

impl CostReport {
    /// Sum of all role deltas. Unknown if any role's delta is unknown.
    #[must_use]
    pub fn total(&self) -> Option<u128> {
        self.roles
            .iter()
            .try_fold(0u128, |acc, r| r.consumed.map(|c| acc.saturating_add(c)))
    }

    /// Consumption of `role`, if measured and known.
    #[must_use]
    pub fn consumed_by(&self, role: &Identity) -> Option<u128> {
        self.roles
            .iter()
            .find(|r| &r.role == role)
            .and_then(|r| r.consumed)
    }

    /// Net gain of `role`, if measured and known.
    #[must_use]
    pub fn credited_to(&self, role: &Identity) -> Option<u128> {
        self.roles
            .iter()
            .find(|r| &r.role == role)
            .and_then(|r| r.credited)
    }
}

/// Balance snapshots and cost comparison over a [`BalanceSource`].
#[derive(Clone)]
pub struct CostLedger {
    source: Arc<dyn BalanceSource>,
}

impl CostLedger {
    /// Create a ledger reading from `source`.
    #[must_use]
    pub fn new(source: Arc<dyn BalanceSource>) -> Self {
        Self { source }
    }

    /// Read `role`'s balance now.
    ///
    /// # Errors
    ///
    /// `LedgerUnavailable` if the source cannot be read.
    pub async fn snapshot(&self, role: &Identity) -> Result<CostSnapshot> {
        let balance = self.source.balance(role).await?;
        debug!("Balance of {role}: {balance}");
        Ok(CostSnapshot {
            role: role.clone(),
            balance,
            taken_at: Utc::now(),
        })
    }

    /// Consumption between two snapshots of the same role.
    ///
    /// Zero, with a warning, when the balance grew; see [`credit`](Self::credit).
    #[must_use]
    pub fn delta(before: &CostSnapshot, after: &CostSnapshot) -> u128 {
        if after.balance > before.balance {
            warn!(
                "Balance of {} grew from {} to {}, reporting zero consumption",
                before.role, before.balance, after.balance
            );
        }
        before.balance.saturating_sub(after.balance)
    }

    /// Net gain between two snapshots of the same role.
    #[must_use]
    pub fn credit(before: &CostSnapshot, after: &CostSnapshot) -> u128 {
        let gained = after.balance.saturating_sub(before.balance);
        if gained > 0 {
            debug!("Balance of {} grew by {gained} during measurement", before.role);
        }
        gained
    }

    /// Savings of `candidate` relative to `baseline`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compare(baseline: u128, candidate: u128) -> Savings {
        if baseline == 0 {
            return Savings::Undefined;
        }
        Savings::Percent((1.0 - candidate as f64 / baseline as f64) * 100.0)
    }

    /// Run `op`, reporting what each of `roles` consumed meanwhile.
    pub async fn measure<F, T>(&self, roles: &[Identity], op: F) -> (T, CostReport)
    where
        F: Future<Output = T>,
    {
        let before = self.snapshot_all(roles).await;
        let output = op.await;
        let after = self.snapshot_all(roles).await;

        let roles = roles
            .iter()
            .zip(before.into_iter().zip(after))
            .map(|(role, pair)| match pair {
                // Growth is reported as credit, so no clamp warning here
                (Some(b), Some(a)) => RoleCost {
                    role: role.clone(),
                    consumed: Some(b.balance.saturating_sub(a.balance)),
                    credited: Some(Self::credit(&b, &a)),
                },
                _ => RoleCost {
                    role: role.clone(),
                    consumed: None,
                    credited: None,
                },
            })
            .collect();

        (output, CostReport { roles })
    }

    async fn snapshot_all(&self, roles: &[Identity]) -> Vec<Option<CostSnapshot>> {
        join_all(roles.iter().map(|role| async move {
            match self.snapshot(role).await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!("Could not snapshot {role}: {e}");
                    None
                }
            }
        }))
        .await
    }
}

impl fmt::Debug for CostLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostLedger").finish_non_exhaustive()
    }
}
