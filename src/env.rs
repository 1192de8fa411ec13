//! A module for parsing the command line and environment variables into the
//! [`Env`] struct, which is read once at startup.

use clap::Parser;
use std::path::PathBuf;

use crate::config::{ConfigError, NetworkRegistry};
use crate::fetch::RetryPolicy;
use crate::Invocation;

/// Configuration options for a runner.
///
/// Every option except the network can also be set by an environment
/// variable, including from a `.env` file.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Env {
    /// Registry key of the market to run for, e.g. FANTOM.
    pub network: Option<String>,

    /// The log level to use.
    #[clap(long, env, default_value = "INFO")]
    pub log_level: tracing::Level,

    /// JSON network registry to use instead of the bundled one.
    #[clap(long, env)]
    pub config_path: Option<PathBuf>,

    /// Directory the parser writes its snapshot artifact into.
    #[clap(long, env, default_value = ".")]
    pub output_dir: PathBuf,

    /// Base URL of the token pricing API.
    #[clap(long, env, default_value = "https://web3.api.la-tribu.xyz")]
    pub pricing_api_url: String,

    /// Run the parser without fetching pricing context first.
    #[clap(long, env)]
    pub skip_pricing: bool,

    /// How many times to try the pricing request.
    #[clap(long, env, default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    /// Attempt `n` of the pricing request is followed by `n` times this
    /// delay.
    #[clap(long, env, default_value = "1000")]
    pub base_backoff_ms: u64,

    /// Timeout of a single pricing request.
    #[clap(long, env, default_value = "5000", value_parser = clap::value_parser!(u64).range(1..))]
    pub request_timeout_ms: u64,

    /// How often the parser is scheduled to poll, in hours.
    #[clap(long, env, default_value = "24")]
    pub poll_interval_hours: u64,

    /// Lookback window handed to the parser, in poll intervals.
    #[clap(long, env, default_value = "1")]
    pub lookback: u64,
}

impl Env {
    /// Read the configuration from the environment and set up logging.
    pub fn init() -> Self {
        dotenv::dotenv().ok();
        let env = Env::parse();
        let env_filter =
            format!("none,lending_runner={log_level}", log_level = &env.log_level);

        tracing_subscriber::fmt()
            .with_max_level(env.log_level)
            .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
            .init();

        env
    }

    pub fn registry(&self) -> Result<NetworkRegistry, ConfigError> {
        match &self.config_path {
            Some(path) => NetworkRegistry::load(path),
            None => NetworkRegistry::embedded(),
        }
    }

    pub fn retry_policy(&self) -> anyhow::Result<RetryPolicy> {
        RetryPolicy::new(
            self.max_attempts,
            self.base_backoff_ms,
            self.request_timeout_ms,
        )
    }

    pub fn invocation(&self) -> Invocation {
        Invocation {
            network: self.network.clone(),
            pricing_api_url: self.pricing_api_url.clone(),
            fetch_pricing: !self.skip_pricing,
            poll_interval_hours: self.poll_interval_hours,
            lookback: self.lookback,
        }
    }
}
