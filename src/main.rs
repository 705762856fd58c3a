use alloy::network::EthereumWallet;
use alloy::primitives::TxHash;
use alloy::providers::ProviderBuilder;
use alloy::signers::Signer;
use alloy::signers::local::PrivateKeySigner;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use cctp_orchestrator::config::{Ctx, Env, setup_tracing};
use cctp_orchestrator::{
    BridgeId, BridgeOrchestrator, BridgeRequest, BridgeRun, BundlerClient, Chain, ChainHandles,
    EvmEndpoint, TransferMode, Usdc,
};

#[derive(Parser, Debug)]
#[command(about = "Bridge a USDC balance between chains via the transaction bundling service")]
struct Cli {
    #[clap(flatten)]
    env: Env,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a fresh bridge from a source chain to a destination chain.
    Bridge {
        #[clap(long)]
        amount: Usdc,
        #[clap(long)]
        source: Chain,
        #[clap(long)]
        destination: Chain,
        #[clap(long, default_value = "fast")]
        mode: TransferMode,
        /// Broadcast owner-signed transactions directly instead of routing
        /// through gas sponsorship.
        #[clap(long)]
        no_sponsorship: bool,
    },
    /// Finish a bridge from a recorded (bridge id, burn tx hash) checkpoint.
    Resume {
        #[clap(long)]
        bridge_id: String,
        #[clap(long)]
        burn_tx_hash: TxHash,
        #[clap(long)]
        source: Chain,
        #[clap(long)]
        destination: Chain,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let ctx = Ctx::load_files(&cli.env.config, &cli.env.secrets)?;
    setup_tracing(&ctx.log_level);

    match cli.command {
        Command::Bridge {
            amount,
            source,
            destination,
            mode,
            no_sponsorship,
        } => {
            let (orchestrator, owner) = build_orchestrator(&ctx, source, destination).await?;
            let request = BridgeRequest {
                owner,
                source_chain: source,
                destination_chain: destination,
                amount,
                transfer_mode: mode,
                gas_sponsorship: !no_sponsorship,
            };

            report(orchestrator.start_bridge(&request).await?);
        }
        Command::Resume {
            bridge_id,
            burn_tx_hash,
            source,
            destination,
        } => {
            let (orchestrator, _) = build_orchestrator(&ctx, source, destination).await?;

            report(
                orchestrator
                    .resume_bridge(BridgeId::new(bridge_id), burn_tx_hash)
                    .await?,
            );
        }
    }

    Ok(())
}

async fn build_orchestrator(
    ctx: &Ctx,
    source: Chain,
    destination: Chain,
) -> anyhow::Result<(
    BridgeOrchestrator<BundlerClient, PrivateKeySigner>,
    alloy::primitives::Address,
)> {
    let owner_signer = PrivateKeySigner::from_bytes(&ctx.owner_private_key)?;
    let sponsor_signer = PrivateKeySigner::from_bytes(&ctx.sponsor_private_key)?;
    let owner = owner_signer.address();
    let sponsor = sponsor_signer.address();

    let source_handles = build_handles(ctx, source, &owner_signer, &sponsor_signer).await?;
    let destination_handles =
        build_handles(ctx, destination, &owner_signer, &sponsor_signer).await?;

    let bundler = BundlerClient::new(ctx.api_base_url.clone(), ctx.api_key.clone())?;

    let orchestrator = BridgeOrchestrator::new(
        bundler,
        owner_signer,
        sponsor,
        source_handles,
        destination_handles,
        ctx.attestation.clone(),
    );

    Ok((orchestrator, owner))
}

async fn build_handles(
    ctx: &Ctx,
    chain: Chain,
    owner: &PrivateKeySigner,
    sponsor: &PrivateKeySigner,
) -> anyhow::Result<ChainHandles> {
    let rpc_url = ctx.rpc_url(chain)?;

    let owner_provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(owner.clone()))
        .connect(rpc_url.as_str())
        .await?;
    let sponsor_provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(sponsor.clone()))
        .connect(rpc_url.as_str())
        .await?;

    Ok(ChainHandles {
        owner: Arc::new(EvmEndpoint::new(owner_provider)),
        sponsor: Arc::new(EvmEndpoint::new(sponsor_provider)),
    })
}

fn report(run: BridgeRun) {
    match run {
        BridgeRun::Completed(outcome) => {
            println!("bridge {} complete", outcome.bridge_id);
            println!("burn tx: {}", outcome.burn_tx_hash);
            match outcome.mint_tx_hash {
                Some(mint_tx_hash) => println!("mint tx: {mint_tx_hash}"),
                None => println!("mint: already completed by a prior run"),
            }
        }
        BridgeRun::Resumable(handle) => {
            println!("attestation still pending; the bridge is safe to finish later:");
            println!(
                "  resume --bridge-id {} --burn-tx-hash {}",
                handle.bridge_id, handle.burn_tx_hash
            );
        }
    }
}
