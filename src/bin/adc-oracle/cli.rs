//! Command-line interface definition.

use adc_oracle::request::{FetchSpec, Header};
use adc_oracle::OracleConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Authenticated data collection oracle.
#[derive(Parser, Debug)]
#[command(name = "adc-oracle")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Notary base URL.
    #[arg(long, global = true, env = "PROVER_URL")]
    pub notary_url: Option<String>,

    /// Directory for persisted bindings.
    #[arg(long, global = true, env = "ADC_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Log level.
    #[arg(long, global = true, env = "RUST_LOG")]
    pub log_level: Option<String>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Query the notary and print its public key.
    Info,

    /// Fetch a URL through the oracle and print the verified body.
    Fetch {
        /// Target URL.
        url: String,

        /// Calling convention.
        #[arg(long, value_enum, default_value = "blocking")]
        mode: FetchMode,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Request verified prices for currency pairs.
    Prices {
        /// Comma separated pairs, e.g. `BTC/ETH,SOL`. At most 10.
        pairs: String,

        /// Poll interval, in milliseconds.
        #[arg(long, default_value = "250")]
        poll_interval_ms: u64,
    },

    /// Fetch a URL over both calling conventions and compare their costs.
    Compare {
        /// Target URL.
        url: String,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Print the persisted trust chain.
    Bindings,
}

/// Calling convention for `fetch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FetchMode {
    /// Wait inline for the verified body.
    Blocking,
    /// Submit, then poll for the body.
    Submit,
}

/// Request shape shared by `fetch` and `compare`.
#[derive(clap::Args, Debug)]
pub struct RequestArgs {
    /// HTTP method.
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Comma separated redactions (e.g. `res:body:0-16,res:header:set-cookie`).
    #[arg(long, default_value = "")]
    pub redact: String,

    /// Request header as `name:value`. Repeatable.
    #[arg(long = "header", short = 'H')]
    pub headers: Vec<Header>,

    /// Request body.
    #[arg(long, default_value = "")]
    pub body: String,

    /// Poll interval for submitted requests, in milliseconds.
    #[arg(long, default_value = "250")]
    pub poll_interval_ms: u64,
}

impl RequestArgs {
    /// Build the fetch spec for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the method, redactions or URL are invalid.
    pub fn spec(&self, url: &str) -> color_eyre::Result<FetchSpec> {
        let spec = FetchSpec::from_parts(
            url,
            &self.method,
            &self.redact,
            self.headers.clone(),
            self.body.clone(),
        )?;
        spec.validate()?;
        Ok(spec)
    }

    /// Poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Cli {
    /// Build the effective configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn to_config(&self) -> color_eyre::Result<OracleConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            OracleConfig::from_file(path)?
        } else {
            OracleConfig::default()
        };

        // Override with CLI arguments
        if let Some(ref url) = self.notary_url {
            config.notary.url.clone_from(url);
        }
        if let Some(ref state_dir) = self.state_dir {
            config.state_dir.clone_from(state_dir);
        }
        if let Some(ref level) = self.log_level {
            config.log_level.clone_from(level);
        }

        Ok(config)
    }
}
