//! Bounded polling of the bridge attestation oracle.
//!
//! After a burn is confirmed on the source chain, an external oracle must
//! attest to it before the destination chain will mint. Attestation latency
//! is unbounded, so the poller runs a fixed-interval loop with a hard
//! attempt bound and hands the durable `(bridge id, burn tx hash)` pair back
//! to the caller on timeout instead of failing the bridge. Every `.await` in
//! the loop is a cancellation point; dropping the future (or racing it
//! against a deadline) stops the poll cleanly.

use alloy::primitives::{Address, TxHash};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::bundler::{BridgeId, BundlerApi, BundlerError, MintPreparation};
use crate::chain::PreparedTransaction;

/// Attestation polling cadence. These are operational settings, not
/// protocol constants; the defaults give the oracle ten minutes.
#[derive(Debug, Clone)]
pub struct AttestationConfig {
    pub poll_interval: Duration,
    pub max_attempts: usize,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_attempts: 60,
        }
    }
}

/// Oracle verdict for one poll. Re-derived from the oracle on every call,
/// never cached.
#[derive(Debug, Clone)]
pub enum AttestationStatus {
    /// Attestation not yet produced; keep polling.
    Pending,
    /// Attested: the embedded transaction mints on the destination chain.
    Ready(PreparedTransaction),
    /// The bridge already minted; nothing left to broadcast.
    Completed,
}

impl From<MintPreparation> for AttestationStatus {
    fn from(preparation: MintPreparation) -> Self {
        match (preparation.status.as_deref(), preparation.transaction) {
            (Some("completed"), _) => Self::Completed,
            (_, Some(tx)) => Self::Ready(tx),
            (Some("pending") | None, None) => Self::Pending,
            (Some(other), None) => {
                warn!(status = other, "unrecognized attestation status, treating as pending");
                Self::Pending
            }
        }
    }
}

/// Terminal result of a polling run.
#[derive(Debug)]
pub enum PollOutcome {
    /// Attestation arrived; proceed to mint with the embedded transaction.
    Ready(PreparedTransaction),
    /// The oracle reports the bridge finished; skip the mint entirely.
    AlreadyCompleted,
    /// Attempt budget exhausted while the oracle still reported pending.
    /// Carries everything needed to resume later; the bridge itself is
    /// still live.
    TimedOut {
        bridge_id: BridgeId,
        burn_tx_hash: TxHash,
        attempts: usize,
    },
}

/// Fixed-interval attestation poller with a hard attempt bound.
pub struct AttestationPoller {
    config: AttestationConfig,
}

impl AttestationPoller {
    pub const fn new(config: AttestationConfig) -> Self {
        Self { config }
    }

    /// Polls until the oracle reports ready or completed, or the attempt
    /// budget runs out.
    ///
    /// The first call happens immediately; an oracle that reports
    /// `completed` on that call short-circuits without a second request.
    /// Total wait is bounded by `max_attempts * poll_interval`.
    pub async fn wait_for_attestation<B: BundlerApi>(
        &self,
        bundler: &B,
        bridge_id: &BridgeId,
        burn_tx_hash: TxHash,
        sender: Address,
    ) -> Result<PollOutcome, BundlerError> {
        for attempt in 1..=self.config.max_attempts {
            let preparation = bundler.mint_prepare(bridge_id, burn_tx_hash, sender).await?;

            match AttestationStatus::from(preparation) {
                AttestationStatus::Completed => {
                    info!(%bridge_id, attempt, "bridge already completed, no mint needed");
                    return Ok(PollOutcome::AlreadyCompleted);
                }
                AttestationStatus::Ready(tx) => {
                    info!(%bridge_id, attempt, "attestation ready");
                    return Ok(PollOutcome::Ready(tx));
                }
                AttestationStatus::Pending => {
                    debug!(
                        %bridge_id,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        "attestation pending"
                    );
                    if attempt < self.config.max_attempts {
                        sleep(self.config.poll_interval).await;
                    }
                }
            }
        }

        warn!(
            %bridge_id,
            %burn_tx_hash,
            attempts = self.config.max_attempts,
            "attestation still pending after attempt budget, bridge is resumable"
        );

        Ok(PollOutcome::TimedOut {
            bridge_id: bridge_id.clone(),
            burn_tx_hash,
            attempts: self.config.max_attempts,
        })
    }
}
