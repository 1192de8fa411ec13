#![warn(clippy::complexity)]

use ::lending_runner::config::RpcEndpoints;
use ::lending_runner::env::Env;
use ::lending_runner::fetch::ResilientFetcher;
use ::lending_runner::parser::snapshot::SnapshotParserFactory;
use ::lending_runner::run;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let env = Env::init();
    let registry = env.registry()?;
    let rpc_endpoints = RpcEndpoints::from_env();
    let fetcher = ResilientFetcher::http(env.retry_policy()?)?;
    let parsers = SnapshotParserFactory::new(&env.output_dir);

    run(&env.invocation(), &registry, &rpc_endpoints, &fetcher, &parsers)
        .await?;

    Ok(())
}
