//! Balances read from an external command.
//!
//! The template is split on whitespace and run without a shell. Every
//! `{id}` is replaced with the role's text identity, e.g.
//! `dfx canister status {id}`. The balance is taken from the first
//! `Balance: 1_234_567` line on stdout.

use super::BalanceSource;
use crate::error::{ConfigError, Error, Result, TransportError};
use crate::identity::Identity;
use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Pattern matching the balance line of the command's output.
pub const BALANCE_PATTERN: &str = r"Balance:\s+([\d_]+)";

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// [`BalanceSource`] that shells out per snapshot.
#[derive(Debug, Clone)]
pub struct CommandBalances {
    template: Vec<String>,
    pattern: Regex,
    timeout: Duration,
}

impl CommandBalances {
    /// Create a source from a command template.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the template is empty.
    pub fn new(template: &str) -> Result<Self> {
        let template: Vec<String> = template.split_whitespace().map(str::to_string).collect();
        if template.is_empty() {
            return Err(ConfigError::Invalid("balance command must not be empty".into()).into());
        }
        let pattern = Regex::new(BALANCE_PATTERN)
            .map_err(|e| ConfigError::Invalid(format!("balance pattern: {e}")))?;
        Ok(Self {
            template,
            pattern,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        })
    }

    /// Bound each command run.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line for `role`.
    fn argv(&self, role: &Identity) -> Vec<String> {
        let id = role.to_text();
        self.template.iter().map(|arg| arg.replace("{id}", &id)).collect()
    }

    /// Extract the balance from command output.
    fn parse(&self, stdout: &str) -> Option<u128> {
        let digits: String = self
            .pattern
            .captures(stdout)?
            .get(1)?
            .as_str()
            .chars()
            .filter(|c| *c != '_')
            .collect();
        digits.parse().ok()
    }
}

#[async_trait]
impl BalanceSource for CommandBalances {
    async fn balance(&self, role: &Identity) -> Result<u128> {
        let unavailable = |detail: String| Error::from(TransportError::LedgerUnavailable(detail));
        let argv = self.argv(role);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| unavailable("empty command".into()))?;
        debug!("Reading balance of {role} via {program}");

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| unavailable(format!("{program} timed out after {:?}", self.timeout)))?
        .map_err(|e| unavailable(format!("{program}: {e}")))?;

        if !output.status.success() {
            return Err(unavailable(format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        self.parse(&stdout)
            .ok_or_else(|| unavailable(format!("no balance in output of {program}")))
    }
}
