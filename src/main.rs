use std::{future::Future, path::PathBuf, sync::Arc};

use alloy::{
    network::EthereumWallet,
    providers::{ProviderBuilder, RootProvider},
    rpc::client::ClientBuilder,
    transports::{
        http::{Client, Http},
        layers::RetryBackoffLayer,
    },
};
use clap::{Parser, Subcommand};

use autonomous_airdrop::{
    chain::{ChainReader, RpcChain},
    config::{Config, Environment, LocatorKind},
    constants::CONFIG_FILE_PATH,
    flow::{cancellable, prepare_claim, run_claim, FlowContext},
    locator::{EventLocator, IndexerLocator, LogScanLocator},
    logger::init_default_logger,
    submit::{ClaimSubmitter, RpcSubmitter},
};

#[derive(Parser, Debug)]
#[command(name = "autonomous-airdrop")]
#[command(about = "Prove a recent swap and claim the airdrop for it", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file
    #[arg(short, long, default_value = CONFIG_FILE_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the query for the latest swap and submit the claim
    Claim,
    /// Build the query and print it with its fee, without submitting
    Build,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let _guard = init_default_logger();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let env = Environment::from_env()?;
    let config = Config::read_from_file(&cli.config).await?;

    let client = ClientBuilder::default()
        .layer(RetryBackoffLayer::new(10, 2, 500))
        .transport(Http::<Client>::new(env.provider_uri.clone()), false);
    let provider = Arc::new(
        ProviderBuilder::new().with_recommended_fillers().on_provider(RootProvider::new(client)),
    );

    let wallet = Arc::new(EthereumWallet::new(env.signer.clone()));
    let ctx = FlowContext { claimer: env.signer.address(), chain_id: env.chain_id, config };
    let chain = RpcChain::new(provider.clone());
    let submitter = RpcSubmitter::new(provider.clone(), wallet, env.chain_id);

    tracing::info!("Claiming for {} on chain {}", ctx.claimer, ctx.chain_id);
    let cancel = tokio::signal::ctrl_c();

    match ctx.config.locator {
        LocatorKind::Rpc => {
            let locator = LogScanLocator::new(provider.clone(), ctx.config.lookback_blocks);
            dispatch(&cli.command, &ctx, &locator, &chain, &submitter, cancel).await
        }
        LocatorKind::Indexer => {
            let chain_name = ctx
                .config
                .indexer_chain_name
                .clone()
                .ok_or_else(|| eyre::eyre!("`INDEXER_CHAIN_NAME` must be set for the indexer"))?;
            let api_key = env
                .indexer_api_key
                .clone()
                .ok_or_else(|| eyre::eyre!("`INDEXER_API_KEY` must be set for the indexer"))?;
            let locator = IndexerLocator::new(ctx.config.indexer_url.clone(), chain_name, api_key);
            dispatch(&cli.command, &ctx, &locator, &chain, &submitter, cancel).await
        }
    }
}

async fn dispatch(
    command: &Command,
    ctx: &FlowContext,
    locator: &impl EventLocator,
    chain: &impl ChainReader,
    submitter: &impl ClaimSubmitter,
    cancel: impl Future,
) -> eyre::Result<()> {
    match command {
        Command::Claim => {
            let outcome = cancellable(run_claim(ctx, locator, chain, submitter), cancel).await?;
            tracing::info!(
                "Claim for swap {} confirmed in {}",
                outcome.prepared.event.tx_hash,
                outcome.tx_hash
            );
        }
        Command::Build => {
            let prepared = cancellable(prepare_claim(ctx, locator, chain), cancel).await?;
            let output = serde_json::json!({
                "compiledQuery": prepared.compiled,
                "fee": prepared.fee,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
