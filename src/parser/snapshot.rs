//! A parser that records the chain head seen through the runner's RPC
//! endpoint, along with the market being tracked, as a JSON artifact.

use alloy::network::AnyNetwork;
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::transports::http;
use backon::{ExponentialBuilder, Retryable};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::*;

use super::{Parser, ParserFactory, ParserParams};

/// Provider connected to the runner's JSON-RPC HTTP URL.
pub type HttpProvider = RootProvider<http::Http<http::Client>, AnyNetwork>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot<'a> {
    runner: &'a str,
    protocol: String,
    network: &'a str,
    token_address: &'a str,
    protocol_fields: &'a BTreeMap<String, serde_json::Value>,
    chain_id: u64,
    block_number: u64,
    poll_interval_hours: u64,
    lookback: u64,
    collected_at: chrono::DateTime<chrono::Utc>,
}

pub struct SnapshotParser {
    params: ParserParams,
    output_dir: PathBuf,
    provider: HttpProvider,
}

impl SnapshotParser {
    /// Create a parser connected to the blockchain via the RPC URL in
    /// `params`. No request is made until [`Parser::run`].
    pub fn connect(
        params: ParserParams,
        output_dir: impl Into<PathBuf>,
    ) -> anyhow::Result<Self> {
        let rpc_url = params.rpc_url.parse()?;
        let provider =
            ProviderBuilder::new().network::<AnyNetwork>().on_http(rpc_url);

        Ok(Self { params, output_dir: output_dir.into(), provider })
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(&self.params.artifact)
    }
}

impl Parser for SnapshotParser {
    async fn run(&self) -> anyhow::Result<()> {
        let ParserParams { config, runner_name, .. } = &self.params;
        info!(
            "{runner_name}: collecting {} snapshot on {}",
            config.protocol, config.network
        );

        let chain_id = (|| async { self.provider.get_chain_id().await })
            .retry(ExponentialBuilder::default())
            .notify(|err, dur| {
                warn!("Retrying chain id query in {dur:?} due to {err:?}");
            })
            .await?;

        let block_number = (|| async { self.provider.get_block_number().await })
            .retry(ExponentialBuilder::default())
            .notify(|err, dur| {
                warn!("Retrying block number query in {dur:?} due to {err:?}");
            })
            .await?;
        debug!("Chain {chain_id} is at block {block_number}");

        let snapshot = Snapshot {
            runner: runner_name,
            protocol: config.protocol.to_string(),
            network: &config.network,
            token_address: &config.token_address,
            protocol_fields: &config.extra,
            chain_id,
            block_number,
            poll_interval_hours: self.params.poll_interval_hours,
            lookback: self.params.lookback,
            collected_at: chrono::Utc::now(),
        };

        let path = self.artifact_path();
        let file = std::fs::File::create(&path)?;
        serde_json::to_writer_pretty(file, &snapshot)?;
        info!("Wrote block {block_number} snapshot to {}", path.display());

        Ok(())
    }
}

/// Builds [`SnapshotParser`]s writing into a fixed output directory.
pub struct SnapshotParserFactory {
    output_dir: PathBuf,
}

impl SnapshotParserFactory {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }
}

impl ParserFactory for SnapshotParserFactory {
    type Parser = SnapshotParser;

    fn build(&self, params: ParserParams) -> anyhow::Result<SnapshotParser> {
        SnapshotParser::connect(params, self.output_dir.clone())
    }
}
