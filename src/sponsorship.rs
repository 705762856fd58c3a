//! Gas-sponsored execution of owner-signed typed payloads.
//!
//! The owner authorizes a step by signing a normalized EIP-712 payload
//! off-chain; the preparation service verifies that signature and returns a
//! transaction the sponsor pays for and broadcasts. The owner's key is never
//! needed by, or exposed to, the sponsor side.

use alloy::primitives::{Address, TxHash};
use alloy::signers::Signer;
use tracing::debug;

use crate::bundler::{BundlerApi, BundlerError, Chain, SponsorshipRequest};
use crate::chain::{ChainEndpoint, ChainError};
use crate::typed_data::{self, NormalizeError};

#[derive(Debug, thiserror::Error)]
pub enum SponsorshipError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("owner signer failed")]
    Signer(#[source] alloy::signers::Error),

    #[error(transparent)]
    Bundler(#[from] BundlerError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Drives one gas-sponsored step: normalize, owner-sign, exchange for a
/// sponsor-payable transaction, broadcast via the sponsor's endpoint.
pub struct GasSponsorshipCoordinator<'a, B, S> {
    bundler: &'a B,
    signer: &'a S,
    sponsor_endpoint: &'a dyn ChainEndpoint,
    chain: Chain,
    owner: Address,
    sponsor: Address,
}

impl<'a, B, S> GasSponsorshipCoordinator<'a, B, S>
where
    B: BundlerApi,
    S: Signer + Send + Sync,
{
    pub fn new(
        bundler: &'a B,
        signer: &'a S,
        sponsor_endpoint: &'a dyn ChainEndpoint,
        chain: Chain,
        owner: Address,
        sponsor: Address,
    ) -> Self {
        Self {
            bundler,
            signer,
            sponsor_endpoint,
            chain,
            owner,
            sponsor,
        }
    }

    /// Executes a typed signing payload through the sponsorship path and
    /// returns the confirmed transaction hash.
    ///
    /// Strictly sequential: the service is never contacted before the owner
    /// signature exists, and a [`BundlerError::SignatureRejected`] is
    /// surfaced as-is rather than retried, since resubmitting the same
    /// signature cannot succeed.
    pub async fn sponsor_and_submit(
        &self,
        label: &str,
        typed_data: &serde_json::Value,
    ) -> Result<TxHash, SponsorshipError> {
        let normalized = typed_data::normalize(typed_data)?;
        debug!(kind = ?normalized.kind(), label, "normalized typed signing payload");

        let payload = normalized.to_typed_data()?;
        let signature = self
            .signer
            .sign_dynamic_typed_data(&payload)
            .await
            .map_err(SponsorshipError::Signer)?;
        debug!(owner = %self.owner, label, "owner signature obtained");

        let request = SponsorshipRequest {
            owner: self.owner,
            chain: self.chain,
            eip712: typed_data.clone(),
            signature: alloy::hex::encode_prefixed(signature.as_bytes()),
            sender: self.sponsor,
        };
        let sponsored = self.bundler.gas_sponsorship_prepare(&request).await?;

        let tx_hash = self
            .sponsor_endpoint
            .submit_and_confirm(sponsored, label)
            .await?;

        Ok(tx_hash)
    }
}
