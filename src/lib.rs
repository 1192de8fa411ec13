//! A one-shot runner that collects lending-market state for a single
//! Granary or fmoney deployment. It resolves the network's configuration
//! and RPC endpoint, fetches off-chain pricing context for the market's
//! token and hands everything to a protocol parser.

use anyhow::Context;
use tracing::*;

pub mod config;
pub mod env;
pub mod fetch;
pub mod parser;

use config::{ConfigError, NetworkConfig, NetworkRegistry, RpcEndpoints};
use fetch::{pricing_url, ResilientFetcher, Sleeper, Transport};
use parser::{Parser, ParserFactory, ParserParams};

/// What a single runner process was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Registry key given on the command line, if any.
    pub network: Option<String>,
    pub pricing_api_url: String,
    /// Whether to fetch pricing context before running the parser.
    pub fetch_pricing: bool,
    pub poll_interval_hours: u64,
    pub lookback: u64,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub network: String,
    pub runner_name: String,
    pub pricing_available: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parser(anyhow::Error),
}

/// Run the parser for the invoked network.
///
/// Configuration problems fail before any network I/O. Pricing context is
/// best-effort: if it cannot be fetched the parser still runs. Any parser
/// failure fails the run.
#[allow(private_bounds)]
pub async fn run<T: Transport, S: Sleeper>(
    invocation: &Invocation,
    registry: &NetworkRegistry,
    rpc_endpoints: &RpcEndpoints,
    fetcher: &ResilientFetcher<T, S>,
    parsers: &impl ParserFactory,
) -> Result<RunReport, RunError> {
    let config = registry.resolve(invocation.network.as_deref())?;
    info!(
        "Running {} {} parser on {}",
        config.key, config.protocol, config.network
    );

    let rpc_url = rpc_endpoints.resolve(&config.network)?;
    let runner_name = parser::runner_name(config);

    let pricing_available = if invocation.fetch_pricing {
        fetch_pricing_context(invocation, config, fetcher).await
    } else {
        debug!("Pricing context disabled for {runner_name}");
        false
    };

    let params = ParserParams {
        config: config.clone(),
        runner_name: runner_name.clone(),
        rpc_url: rpc_url.to_string(),
        artifact: config.artifact.clone(),
        poll_interval_hours: invocation.poll_interval_hours,
        lookback: invocation.lookback,
    };
    debug!("Parser parameters: {params:?}");

    let parser = parsers
        .build(params)
        .with_context(|| format!("Error initializing parser {runner_name}"))
        .map_err(RunError::Parser)?;

    parser
        .run()
        .await
        .with_context(|| format!("{runner_name} failed"))
        .map_err(RunError::Parser)?;

    info!("{runner_name} finished");

    Ok(RunReport {
        network: config.key.clone(),
        runner_name,
        pricing_available,
    })
}

/// Fetch and log the pricing context for the network's token. Returns
/// whether it was available.
async fn fetch_pricing_context<T: Transport, S: Sleeper>(
    invocation: &Invocation,
    config: &NetworkConfig,
    fetcher: &ResilientFetcher<T, S>,
) -> bool {
    let url = match pricing_url(
        &invocation.pricing_api_url,
        &config.network,
        &config.token_address,
    ) {
        Ok(url) => url,
        Err(err) => {
            warn!("Skipping pricing context: {err:#}");
            return false;
        }
    };

    match fetcher.fetch(&url).await {
        Ok(market_data) => {
            info!("{} market data: {market_data}", config.network);
            true
        }
        Err(err) => {
            warn!("Continuing without pricing context: {err}");
            false
        }
    }
}
