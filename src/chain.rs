//! Per-chain transaction submission and confirmation.
//!
//! Provides a unified trait for broadcasting service-built transactions and
//! waiting for their receipts, with a production implementation over a
//! wallet-enabled alloy provider. Idempotency is the caller's
//! responsibility: a resend with a different nonce is a new transaction.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use backon::Retryable;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, trace};

/// Interval between receipt lookups after a broadcast.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Maximum receipt lookups before giving up on a broadcast transaction.
const RECEIPT_MAX_ATTEMPTS: usize = 90;

/// A fully-formed transaction built by the preparation service.
///
/// Numeric fields arrive as decimal strings or JSON numbers depending on the
/// endpoint, so they are held as [`U256`] and narrowed when the request is
/// assembled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreparedTransaction {
    pub to: Address,
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
    pub gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    #[serde(default)]
    pub nonce: Option<U256>,
    #[serde(default)]
    pub chain_id: Option<u64>,
}

impl PreparedTransaction {
    /// Converts into an alloy transaction request, leaving unset fields to
    /// the provider's filler chain.
    pub fn into_request(self) -> Result<TransactionRequest, ChainError> {
        let gas = u64::try_from(self.gas)
            .map_err(|_| ChainError::NumericOverflow { field: "gas" })?;
        let max_fee = u128::try_from(self.max_fee_per_gas)
            .map_err(|_| ChainError::NumericOverflow { field: "maxFeePerGas" })?;
        let max_priority = u128::try_from(self.max_priority_fee_per_gas)
            .map_err(|_| ChainError::NumericOverflow {
                field: "maxPriorityFeePerGas",
            })?;

        let mut request = TransactionRequest::default()
            .with_to(self.to)
            .with_input(self.data)
            .with_value(self.value)
            .with_gas_limit(gas)
            .with_max_fee_per_gas(max_fee)
            .with_max_priority_fee_per_gas(max_priority);

        if let Some(nonce) = self.nonce {
            let nonce = u64::try_from(nonce)
                .map_err(|_| ChainError::NumericOverflow { field: "nonce" })?;
            request = request.with_nonce(nonce);
        }
        if let Some(chain_id) = self.chain_id {
            request = request.with_chain_id(chain_id);
        }

        Ok(request)
    }
}

/// Receipt summary for a confirmed, successful transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("node rejected transaction broadcast")]
    Broadcast(#[source] alloy::transports::RpcError<alloy::transports::TransportErrorKind>),

    #[error("failed to fetch receipt for tx {tx_hash}")]
    ReceiptFetch {
        tx_hash: TxHash,
        #[source]
        source: alloy::transports::RpcError<alloy::transports::TransportErrorKind>,
    },

    #[error("no receipt for tx {tx_hash} after {attempts} attempts")]
    ReceiptTimeout { tx_hash: TxHash, attempts: usize },

    #[error("transaction {tx_hash} reverted on-chain")]
    ExecutionReverted { tx_hash: TxHash },

    #[error("transaction field {field} exceeds its representable range")]
    NumericOverflow { field: &'static str },
}

/// Broadcasts transactions on one chain and confirms their receipts.
///
/// A broadcast the node rejects surfaces as [`ChainError::Broadcast`]. A
/// confirmation that lands with a failed receipt status surfaces as
/// [`ChainError::ExecutionReverted`] and must not be retried as-is: the
/// transaction executed and failed.
#[async_trait]
pub trait ChainEndpoint: Send + Sync {
    async fn broadcast(&self, tx: PreparedTransaction) -> Result<TxHash, ChainError>;

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<Confirmation, ChainError>;

    /// Broadcasts and waits for a successful receipt, logging progress under
    /// the given label.
    async fn submit_and_confirm(
        &self,
        tx: PreparedTransaction,
        label: &str,
    ) -> Result<TxHash, ChainError> {
        let tx_hash = self.broadcast(tx).await?;
        info!(%tx_hash, label, "transaction broadcast, awaiting confirmation");

        let confirmation = self.wait_for_receipt(tx_hash).await?;
        info!(
            %tx_hash,
            block_number = confirmation.block_number,
            label,
            "transaction confirmed"
        );

        Ok(tx_hash)
    }
}

enum ReceiptPoll {
    NotYetMined,
    Transport(alloy::transports::RpcError<alloy::transports::TransportErrorKind>),
}

/// Chain endpoint backed by a wallet-enabled alloy provider.
///
/// Alloy's filler chain handles gas estimation fallbacks, nonce assignment,
/// chain id, and signing. Submission is serialized through an internal mutex
/// so that workflows sharing one endpoint (and therefore one funding
/// account) cannot race each other to the same nonce.
pub struct EvmEndpoint<P> {
    provider: P,
    submit_lock: Mutex<()>,
}

impl<P> EvmEndpoint<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            submit_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl<P> ChainEndpoint for EvmEndpoint<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn broadcast(&self, tx: PreparedTransaction) -> Result<TxHash, ChainError> {
        let request = tx.into_request()?;

        let _guard = self.submit_lock.lock().await;
        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(ChainError::Broadcast)?;

        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<Confirmation, ChainError> {
        let backoff = backon::ConstantBuilder::default()
            .with_delay(RECEIPT_POLL_INTERVAL)
            .with_max_times(RECEIPT_MAX_ATTEMPTS);

        let fetch_receipt = || async {
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => Ok(receipt),
                Ok(None) => {
                    trace!(%tx_hash, "receipt not yet available");
                    Err(ReceiptPoll::NotYetMined)
                }
                Err(e) => Err(ReceiptPoll::Transport(e)),
            }
        };

        let receipt = fetch_receipt
            .retry(backoff)
            .when(|e| matches!(e, ReceiptPoll::NotYetMined))
            .await
            .map_err(|e| match e {
                ReceiptPoll::NotYetMined => ChainError::ReceiptTimeout {
                    tx_hash,
                    attempts: RECEIPT_MAX_ATTEMPTS,
                },
                ReceiptPoll::Transport(source) => ChainError::ReceiptFetch { tx_hash, source },
            })?;

        if !receipt.status() {
            return Err(ChainError::ExecutionReverted { tx_hash });
        }

        Ok(Confirmation {
            tx_hash,
            block_number: receipt.block_number.unwrap_or_default(),
        })
    }
}
