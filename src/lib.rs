//! Client-side orchestration for burn-and-mint stablecoin bridging.
//!
//! Drives a bridge request through a strictly ordered workflow across two
//! independently-finalized chains: provision proxy accounts, fund the
//! source-chain account, burn, wait for the external attestation oracle,
//! and mint on the destination chain. Steps that support gas sponsorship
//! route an owner-signed EIP-712 payload through the transaction
//! preparation service so a sponsor account pays gas on both chains and the
//! owner never needs native gas.
//!
//! The workflow is resumable: once a burn is confirmed, the issued bridge
//! id plus the burn transaction hash are sufficient to finish the bridge
//! from another process at any later time.

pub mod attestation;
pub mod bundler;
pub mod chain;
pub mod config;
pub mod orchestrator;
pub mod sponsorship;
pub mod typed_data;

#[cfg(test)]
pub(crate) mod test_utils;

pub use attestation::{AttestationConfig, AttestationPoller, AttestationStatus, PollOutcome};
pub use bundler::{BridgeId, BundlerApi, BundlerClient, Chain, TransferMode, Usdc};
pub use chain::{ChainEndpoint, EvmEndpoint, PreparedTransaction};
pub use orchestrator::{
    BridgeError, BridgeOrchestrator, BridgeOutcome, BridgeRequest, BridgeRun, BridgeState,
    ChainHandles, ResumableHandle, StepError,
};
pub use sponsorship::GasSponsorshipCoordinator;
pub use typed_data::{NormalizedTypedData, TypedDataKind};
