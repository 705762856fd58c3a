//! Cross-chain bridge workflow driver.
//!
//! Sequences one bridge request through five strictly ordered states:
//!
//! 1. **AccountsReady** — create-or-verify the owner's proxy account on both
//!    chains (idempotent; an existing account is a no-op read).
//! 2. **Funded** — move the amount into the source-chain proxy account,
//!    gas-sponsored or owner-signed.
//! 3. **Burned** — prepare and execute the bridge burn; the issued bridge id
//!    and the confirmed burn transaction hash form the resumability
//!    checkpoint and are logged before the workflow proceeds.
//! 4. **AttestationReady** — poll the attestation oracle with a bounded
//!    budget.
//! 5. **Minted** — broadcast the oracle-provided mint transaction on the
//!    destination chain, unless the bridge already completed.
//!
//! No state is ever re-entered: resuming a bridge re-enters the workflow at
//! the attestation wait using the recorded checkpoint and never issues a
//! second burn. An attestation timeout is not a failure; it surfaces as a
//! [`BridgeRun::Resumable`] handle. Failures carry the state they occurred
//! in plus the checkpoint when one exists.
//!
//! Steps of a single request are strictly sequential, but independent
//! requests may run concurrently as separate tasks sharing endpoints and
//! the service client; the per-endpoint submit lock serializes a shared
//! sponsor account's nonce usage.

use alloy::primitives::{Address, TxHash};
use alloy::signers::Signer;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::attestation::{AttestationConfig, AttestationPoller, AttestationStatus, PollOutcome};
use crate::bundler::{
    BridgeId, BundlerApi, BundlerError, BurnRequest, Chain, PreparedAction, TransferAction,
    TransferMode, TransferRequest, Usdc,
};
use crate::chain::{ChainEndpoint, ChainError, PreparedTransaction};
use crate::sponsorship::{GasSponsorshipCoordinator, SponsorshipError};

/// Token slug the funding transfer moves.
const BRIDGED_TOKEN: &str = "USDC";

/// A bridge submission. Immutable once handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct BridgeRequest {
    pub owner: Address,
    pub source_chain: Chain,
    pub destination_chain: Chain,
    pub amount: Usdc,
    pub transfer_mode: TransferMode,
    pub gas_sponsorship: bool,
}

/// Terminal record of a successful bridge run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOutcome {
    pub bridge_id: BridgeId,
    pub burn_tx_hash: TxHash,
    /// `None` when the bridge had already been completed by a prior run.
    pub mint_tx_hash: Option<TxHash>,
}

/// Durable pair sufficient to finish a bridge later without re-burning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumableHandle {
    pub bridge_id: BridgeId,
    pub burn_tx_hash: TxHash,
}

/// Result of driving a bridge as far as it can currently go.
#[derive(Debug)]
pub enum BridgeRun {
    Completed(BridgeOutcome),
    /// Attestation did not arrive within the polling budget. Not an error:
    /// the burn is final and the mint right still exists.
    Resumable(ResumableHandle),
}

/// The workflow state being established when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    AccountsReady,
    Funded,
    Burned,
    AttestationReady,
    Minted,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AccountsReady => "AccountsReady",
            Self::Funded => "Funded",
            Self::Burned => "Burned",
            Self::AttestationReady => "AttestationReady",
            Self::Minted => "Minted",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Bundler(#[from] BundlerError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Sponsorship(#[from] SponsorshipError),

    /// The mint landed on the destination chain and reverted: funds are
    /// burned on the source chain with no matching mint. This is the one
    /// failure class an operator must be able to tell apart from every
    /// other.
    #[error("mint transaction {tx_hash} reverted on the destination chain")]
    MintReverted { tx_hash: TxHash },
}

/// A workflow failure, annotated with the state it occurred in and the
/// resumability checkpoint when one had been recorded.
#[derive(Debug)]
pub struct BridgeError {
    pub state: BridgeState,
    pub bridge_id: Option<BridgeId>,
    pub burn_tx_hash: Option<TxHash>,
    pub source: StepError,
}

impl BridgeError {
    fn new(state: BridgeState, source: StepError) -> Self {
        Self {
            state,
            bridge_id: None,
            burn_tx_hash: None,
            source,
        }
    }

    fn with_bridge_id(mut self, bridge_id: BridgeId) -> Self {
        self.bridge_id = Some(bridge_id);
        self
    }

    fn with_checkpoint(mut self, bridge_id: BridgeId, burn_tx_hash: TxHash) -> Self {
        self.bridge_id = Some(bridge_id);
        self.burn_tx_hash = Some(burn_tx_hash);
        self
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bridge workflow failed in state {}", self.state)?;
        if let Some(bridge_id) = &self.bridge_id {
            write!(f, " (bridge id: {bridge_id}")?;
            if let Some(burn_tx_hash) = &self.burn_tx_hash {
                write!(f, ", burn tx: {burn_tx_hash}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Owner- and sponsor-funded submission paths for one chain.
#[derive(Clone)]
pub struct ChainHandles {
    pub owner: Arc<dyn ChainEndpoint>,
    pub sponsor: Arc<dyn ChainEndpoint>,
}

/// Top-level stateful driver for bridge requests.
///
/// Holds everything a request needs: the preparation service client, the
/// owner's off-chain signer, the sponsor address, and per-chain submission
/// handles. Construction is explicit; there is no process-wide client
/// state.
pub struct BridgeOrchestrator<B, S> {
    bundler: B,
    owner_signer: S,
    sponsor: Address,
    source: ChainHandles,
    destination: ChainHandles,
    attestation: AttestationConfig,
}

impl<B, S> BridgeOrchestrator<B, S>
where
    B: BundlerApi,
    S: Signer + Send + Sync,
{
    pub fn new(
        bundler: B,
        owner_signer: S,
        sponsor: Address,
        source: ChainHandles,
        destination: ChainHandles,
        attestation: AttestationConfig,
    ) -> Self {
        Self {
            bundler,
            owner_signer,
            sponsor,
            source,
            destination,
            attestation,
        }
    }

    /// Drives a fresh bridge request to a terminal result.
    ///
    /// Cancellation safety: every network interaction is an `.await`
    /// suspension point, so dropping the returned future stops the workflow
    /// cleanly. A caller that cancels after the burn was submitted but
    /// before it confirmed must not assume the burn never happened; check
    /// the burn transaction (the bridge id is logged as soon as it is
    /// issued) before treating the attempt as a no-op.
    pub async fn start_bridge(&self, request: &BridgeRequest) -> Result<BridgeRun, BridgeError> {
        info!(
            owner = %request.owner,
            source = %request.source_chain,
            destination = %request.destination_chain,
            amount = %request.amount,
            sponsored = request.gas_sponsorship,
            "starting bridge"
        );

        self.ensure_accounts(request).await?;
        self.fund(request).await?;
        let (bridge_id, burn_tx_hash) = self.burn(request).await?;

        let mint_endpoint = if request.gas_sponsorship {
            &self.destination.sponsor
        } else {
            &self.destination.owner
        };
        self.finish(bridge_id, burn_tx_hash, mint_endpoint).await
    }

    /// Re-enters the workflow at the attestation wait using a recorded
    /// checkpoint. Never issues a burn: exactly one burn exists per bridge
    /// id, and that burn already happened.
    ///
    /// Safe to call repeatedly; once the bridge has minted, every further
    /// resume reports completion without broadcasting anything.
    pub async fn resume_bridge(
        &self,
        bridge_id: BridgeId,
        burn_tx_hash: TxHash,
    ) -> Result<BridgeRun, BridgeError> {
        info!(%bridge_id, %burn_tx_hash, "resuming bridge from checkpoint");
        self.finish(bridge_id, burn_tx_hash, &self.destination.sponsor)
            .await
    }

    async fn ensure_accounts(&self, request: &BridgeRequest) -> Result<(), BridgeError> {
        let chains = [
            (request.source_chain, &self.source),
            (request.destination_chain, &self.destination),
        ];

        for (chain, handles) in chains {
            let creation = self
                .bundler
                .account_create(chain, request.owner)
                .await
                .map_err(|e| BridgeError::new(BridgeState::AccountsReady, e.into()))?;

            match creation.transaction {
                Some(tx) => {
                    handles
                        .owner
                        .submit_and_confirm(tx, "account creation")
                        .await
                        .map_err(|e| BridgeError::new(BridgeState::AccountsReady, e.into()))?;
                    info!(%chain, account = %creation.account_address, "proxy account created");
                }
                None => {
                    info!(%chain, account = %creation.account_address, "proxy account already exists");
                }
            }
        }

        Ok(())
    }

    async fn fund(&self, request: &BridgeRequest) -> Result<(), BridgeError> {
        let transfer = TransferRequest {
            owner: request.owner,
            chain: request.source_chain,
            token: BRIDGED_TOKEN.to_owned(),
            amount: request.amount,
            action: TransferAction::Deposit,
            spender: self.sponsor,
            gas_sponsorship: request.gas_sponsorship,
        };

        let action = self
            .bundler
            .transfer_prepare(&transfer)
            .await
            .map_err(|e| BridgeError::new(BridgeState::Funded, e.into()))?;

        let tx_hash = self
            .execute(request.source_chain, &self.source, request.owner, "fund", action)
            .await
            .map_err(|e| BridgeError::new(BridgeState::Funded, e))?;
        info!(%tx_hash, "source account funded");

        Ok(())
    }

    async fn burn(&self, request: &BridgeRequest) -> Result<(BridgeId, TxHash), BridgeError> {
        let burn = BurnRequest {
            owner: request.owner,
            chain: request.source_chain,
            amount: request.amount,
            destination_chain: request.destination_chain,
            destination_address: request.owner,
            gas_sponsorship: request.gas_sponsorship,
            transfer_mode: request.transfer_mode,
        };

        let preparation = self
            .bundler
            .burn_prepare(&burn)
            .await
            .map_err(|e| BridgeError::new(BridgeState::Burned, e.into()))?;
        let bridge_id = preparation.bridge_id;

        // The bridge id exists before the burn is on-chain. Log it first so
        // an operator can reconcile a crash between submission and
        // confirmation.
        info!(%bridge_id, "burn prepared");

        let burn_tx_hash = self
            .execute(
                request.source_chain,
                &self.source,
                request.owner,
                "burn",
                preparation.action,
            )
            .await
            .map_err(|e| {
                BridgeError::new(BridgeState::Burned, e).with_bridge_id(bridge_id.clone())
            })?;

        info!(%bridge_id, %burn_tx_hash, "burn confirmed, checkpoint recorded");

        Ok((bridge_id, burn_tx_hash))
    }

    async fn finish(
        &self,
        bridge_id: BridgeId,
        burn_tx_hash: TxHash,
        mint_endpoint: &Arc<dyn ChainEndpoint>,
    ) -> Result<BridgeRun, BridgeError> {
        let poller = AttestationPoller::new(self.attestation.clone());
        let outcome = poller
            .wait_for_attestation(&self.bundler, &bridge_id, burn_tx_hash, self.sponsor)
            .await
            .map_err(|e| {
                BridgeError::new(BridgeState::AttestationReady, e.into())
                    .with_checkpoint(bridge_id.clone(), burn_tx_hash)
            })?;

        match outcome {
            PollOutcome::AlreadyCompleted => Ok(BridgeRun::Completed(BridgeOutcome {
                bridge_id,
                burn_tx_hash,
                mint_tx_hash: None,
            })),
            PollOutcome::TimedOut { attempts, .. } => {
                warn!(
                    %bridge_id,
                    %burn_tx_hash,
                    attempts,
                    "attestation timed out, returning resumable handle"
                );
                Ok(BridgeRun::Resumable(ResumableHandle {
                    bridge_id,
                    burn_tx_hash,
                }))
            }
            PollOutcome::Ready(mint_tx) => {
                self.mint(bridge_id, burn_tx_hash, mint_tx, mint_endpoint)
                    .await
            }
        }
    }

    async fn mint(
        &self,
        bridge_id: BridgeId,
        burn_tx_hash: TxHash,
        mint_tx: PreparedTransaction,
        mint_endpoint: &Arc<dyn ChainEndpoint>,
    ) -> Result<BridgeRun, BridgeError> {
        match mint_endpoint.submit_and_confirm(mint_tx, "mint").await {
            Ok(mint_tx_hash) => {
                info!(%bridge_id, %mint_tx_hash, "mint confirmed, bridge complete");
                Ok(BridgeRun::Completed(BridgeOutcome {
                    bridge_id,
                    burn_tx_hash,
                    mint_tx_hash: Some(mint_tx_hash),
                }))
            }
            Err(ChainError::ExecutionReverted { tx_hash }) => {
                // Two resumers can race to the same mint; the loser's
                // transaction reverts. Ask the oracle once before deciding
                // this was a genuine failure.
                warn!(%bridge_id, %tx_hash, "mint reverted, re-checking bridge status");

                let preparation = self
                    .bundler
                    .mint_prepare(&bridge_id, burn_tx_hash, self.sponsor)
                    .await
                    .map_err(|e| {
                        BridgeError::new(BridgeState::Minted, e.into())
                            .with_checkpoint(bridge_id.clone(), burn_tx_hash)
                    })?;

                if matches!(AttestationStatus::from(preparation), AttestationStatus::Completed) {
                    info!(%bridge_id, "bridge was completed by another process");
                    return Ok(BridgeRun::Completed(BridgeOutcome {
                        bridge_id,
                        burn_tx_hash,
                        mint_tx_hash: None,
                    }));
                }

                Err(
                    BridgeError::new(BridgeState::Minted, StepError::MintReverted { tx_hash })
                        .with_checkpoint(bridge_id, burn_tx_hash),
                )
            }
            Err(e) => Err(BridgeError::new(BridgeState::Minted, e.into())
                .with_checkpoint(bridge_id, burn_tx_hash)),
        }
    }

    /// Executes a prepared step on the right path: sponsored payloads go
    /// through the coordinator, direct transactions through the owner's
    /// endpoint.
    async fn execute(
        &self,
        chain: Chain,
        handles: &ChainHandles,
        owner: Address,
        label: &str,
        action: PreparedAction,
    ) -> Result<TxHash, StepError> {
        match action {
            PreparedAction::Sponsored(payload) => {
                let coordinator = GasSponsorshipCoordinator::new(
                    &self.bundler,
                    &self.owner_signer,
                    handles.sponsor.as_ref(),
                    chain,
                    owner,
                    self.sponsor,
                );
                Ok(coordinator.sponsor_and_submit(label, &payload).await?)
            }
            PreparedAction::Direct(tx) => {
                Ok(handles.owner.submit_and_confirm(tx, label).await?)
            }
        }
    }
}
