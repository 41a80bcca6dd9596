//! In-process accounts.

use super::{BalanceSource, Meter};
use crate::error::{Result, TransportError};
use crate::identity::Identity;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Local accounts standing in for the host environment's cycle balances.
///
/// Charges saturate at zero; an overdraft is logged, not refused.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: RwLock<HashMap<Identity, u128>>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to `role`, opening the account if needed.
    pub fn fund(&self, role: &Identity, amount: u128) {
        let mut accounts = self.accounts.write();
        let balance = accounts.entry(role.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Current balance, zero for unknown roles.
    #[must_use]
    pub fn balance_of(&self, role: &Identity) -> u128 {
        self.accounts.read().get(role).copied().unwrap_or(0)
    }
}

impl Meter for InMemoryLedger {
    fn charge(&self, role: &Identity, amount: u128, op: &str) {
        if amount == 0 {
            return;
        }
        let mut accounts = self.accounts.write();
        let balance = accounts.entry(role.clone()).or_insert(0);
        if *balance < amount {
            warn!("{role} overdrawn by {op}: balance {balance}, charge {amount}");
        }
        *balance = balance.saturating_sub(amount);
        debug!("Charged {role} {amount} for {op}");
    }

    fn credit(&self, role: &Identity, amount: u128, op: &str) {
        if amount == 0 {
            return;
        }
        self.fund(role, amount);
        debug!("Credited {role} {amount} for {op}");
    }
}

#[async_trait]
impl BalanceSource for InMemoryLedger {
    async fn balance(&self, role: &Identity) -> Result<u128> {
        self.accounts
            .read()
            .get(role)
            .copied()
            .ok_or_else(|| TransportError::LedgerUnavailable(format!("no account for {role}")).into())
    }
}
