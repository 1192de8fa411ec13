//! The parser seam. The runner resolves everything a parser needs into
//! [`ParserParams`], asks a [`ParserFactory`] for a parser and awaits its
//! single entry point.

use crate::config::{NetworkConfig, Protocol};

#[cfg(test)]
pub mod mock;
pub mod snapshot;

/// Everything a parser is constructed with.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserParams {
    pub config: NetworkConfig,
    pub runner_name: String,
    pub rpc_url: String,

    /// File name of the snapshot artifact to persist.
    pub artifact: String,

    pub poll_interval_hours: u64,

    /// Lookback window, in poll intervals.
    pub lookback: u64,
}

/// Human-readable name identifying the runner in logs and artifacts.
pub fn runner_name(config: &NetworkConfig) -> String {
    match config.protocol {
        Protocol::Granary => format!("GranaryParser-{}-Runner", config.network),
        Protocol::Fmoney => "fmoneyParser-Runner".to_string(),
    }
}

/// A protocol-specific scrape-and-persist cycle.
pub(crate) trait Parser {
    async fn run(&self) -> anyhow::Result<()>;
}

/// Builds the parser for a resolved invocation.
pub(crate) trait ParserFactory {
    type Parser: Parser;

    fn build(&self, params: ParserParams) -> anyhow::Result<Self::Parser>;
}
