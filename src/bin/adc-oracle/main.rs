//! adc-oracle CLI entry point.

mod cli;

use adc_oracle::notary::{Notary, NotaryClient};
use adc_oracle::registry::ConfigRegistry;
use adc_oracle::{DeploymentBuilder, OracleConfig};
use clap::Parser;
use cli::{Cli, Command, FetchMode, LogFormat};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();
    let config = cli.to_config()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Text => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }

    info!("adc-oracle v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Info => info_cmd(&config).await?,
        Command::Bindings => bindings_cmd(&config)?,
        Command::Fetch { url, mode, request } => {
            let spec = request.spec(&url)?;
            let deployment = DeploymentBuilder::new(config).build().await?;
            let body = match mode {
                FetchMode::Blocking => deployment.caller().send(spec).await?,
                FetchMode::Submit => {
                    deployment
                        .submit_and_poll(spec, request.poll_interval())
                        .await?
                }
            };
            println!("{}", String::from_utf8_lossy(&body));
        }
        Command::Prices {
            pairs,
            poll_interval_ms,
        } => {
            let deployment = DeploymentBuilder::new(config).build().await?;
            let prices = deployment
                .request_prices(&pairs, Duration::from_millis(poll_interval_ms))
                .await?;
            for entry in &prices.pairs {
                match (entry.price, &entry.error) {
                    (Some(price), _) => println!("{:<16} {price}", entry.pair),
                    (None, Some(error)) => println!("{:<16} error: {error}", entry.pair),
                    (None, None) => println!("{:<16} unpriced", entry.pair),
                }
            }
        }
        Command::Compare { url, request } => {
            let spec = request.spec(&url)?;
            let deployment = DeploymentBuilder::new(config).build().await?;
            let comparison = deployment
                .compare_paths(spec, request.poll_interval())
                .await?;

            let roles = deployment.roles();
            println!("{:<10} {:>20} {:>20}", "role", "blocking", "submit+poll");
            for (name, role) in [
                ("caller", &roles.caller),
                ("processor", &roles.processor),
                ("verifier", &roles.verifier),
            ] {
                println!(
                    "{name:<10} {:>20} {:>20}",
                    amount(comparison.blocking.consumed_by(role)),
                    amount(comparison.orchestrated.consumed_by(role)),
                );
            }
            println!(
                "{:<10} {:>20} {:>20}",
                "total",
                amount(comparison.blocking.total()),
                amount(comparison.orchestrated.total()),
            );
            for (name, role) in [("processor", &roles.processor), ("verifier", &roles.verifier)] {
                let blocking = comparison.blocking.credited_to(role).unwrap_or(0);
                let orchestrated = comparison.orchestrated.credited_to(role).unwrap_or(0);
                if blocking > 0 || orchestrated > 0 {
                    println!(
                        "{:<10} {:>20} {:>20}",
                        format!("{name}+"),
                        blocking,
                        orchestrated,
                    );
                }
            }
            println!("savings: {}", comparison.savings());
        }
    }

    Ok(())
}

async fn info_cmd(config: &OracleConfig) -> color_eyre::Result<()> {
    let client = NotaryClient::new(config.notary.client_config())?;
    let info = client.get_info().await?;
    println!("notary: {}", config.notary.url);
    println!("live: {}", info.live);
    print!("{}", info.public_key_pem);
    if !info.public_key_pem.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn bindings_cmd(config: &OracleConfig) -> color_eyre::Result<()> {
    let path = config.bindings_path();
    let registry = ConfigRegistry::load(&path)?;
    if registry.is_empty() {
        println!("no bindings in {}", path.display());
        return Ok(());
    }
    for binding in registry.bindings() {
        println!("{} -> {}", binding.source, binding.target);
    }
    Ok(())
}

fn amount(value: Option<u128>) -> String {
    value.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}
