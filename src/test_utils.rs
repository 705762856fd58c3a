//! Hand-rolled stubs for the service and chain-endpoint seams.

use alloy::primitives::{Address, B256, ChainId, Signature, TxHash, U256, address};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::bundler::{
    AccountCreation, BridgeId, BundlerApi, BundlerError, BurnPreparation, BurnRequest, Chain,
    MintPreparation, PreparedAction, SponsorshipRequest, TransferRequest,
};
use crate::chain::{ChainEndpoint, ChainError, Confirmation, PreparedTransaction};

pub(crate) fn sample_transaction() -> PreparedTransaction {
    PreparedTransaction {
        to: address!("0x1234567890123456789012345678901234567890"),
        data: alloy::primitives::Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
        value: U256::ZERO,
        gas: U256::from(100_000u64),
        max_fee_per_gas: U256::from(2_000_000_000u64),
        max_priority_fee_per_gas: U256::from(100_000u64),
        nonce: None,
        chain_id: Some(8453),
    }
}

pub(crate) fn safe_tx_payload() -> serde_json::Value {
    json!({
        "domain": {
            "chainId": 8453,
            "verifyingContract": "0x4200000000000000000000000000000000000042"
        },
        "types": {
            "SafeTx": [
                { "name": "to", "type": "address" },
                { "name": "value", "type": "uint256" },
                { "name": "data", "type": "bytes" },
                { "name": "operation", "type": "uint8" },
                { "name": "safeTxGas", "type": "uint256" },
                { "name": "baseGas", "type": "uint256" },
                { "name": "gasPrice", "type": "uint256" },
                { "name": "gasToken", "type": "address" },
                { "name": "refundReceiver", "type": "address" },
                { "name": "nonce", "type": "uint256" }
            ]
        },
        "message": {
            "to": "0x1234567890123456789012345678901234567890",
            "value": "0",
            "data": "0x",
            "operation": 0,
            "safeTxGas": "0",
            "baseGas": "0",
            "gasPrice": "0",
            "gasToken": "0x0000000000000000000000000000000000000000",
            "refundReceiver": "0x0000000000000000000000000000000000000000",
            "nonce": "3"
        }
    })
}

pub(crate) fn permit2_payload() -> serde_json::Value {
    json!({
        "domain": {
            "name": "Permit2",
            "chainId": 8453,
            "verifyingContract": "0x000000000022D473030F116dDEE9F6B43aC78BA3"
        },
        "types": {
            "TokenPermissions": [
                { "name": "token", "type": "address" },
                { "name": "amount", "type": "uint256" }
            ],
            "PermitTransferFrom": [
                { "name": "permitted", "type": "TokenPermissions" },
                { "name": "spender", "type": "address" },
                { "name": "nonce", "type": "uint256" },
                { "name": "deadline", "type": "uint256" }
            ]
        },
        "message": {
            "permitted": {
                "token": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
                "amount": "100000000"
            },
            "spender": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
            "nonce": "1",
            "deadline": "1893456000"
        }
    })
}

pub(crate) fn pending() -> MintPreparation {
    MintPreparation {
        status: Some("pending".to_owned()),
        transaction: None,
    }
}

pub(crate) fn ready() -> MintPreparation {
    MintPreparation {
        status: Some("ready".to_owned()),
        transaction: Some(sample_transaction()),
    }
}

#[derive(Default)]
struct StubState {
    mint_script: Mutex<VecDeque<MintPreparation>>,
    last_sponsorship: Mutex<Option<SponsorshipRequest>>,
    account_calls: AtomicUsize,
    transfer_calls: AtomicUsize,
    burn_calls: AtomicUsize,
    mint_calls: AtomicUsize,
    sponsorship_calls: AtomicUsize,
}

/// Scripted preparation-service stub. Clones share call counters and the
/// mint script, so a clone can be handed to the orchestrator while the
/// original asserts.
#[derive(Clone)]
pub(crate) struct StubBundler {
    account_transaction: Option<PreparedTransaction>,
    transfer_direct: Option<PreparedTransaction>,
    burn_direct: Option<PreparedTransaction>,
    state: Arc<StubState>,
}

impl StubBundler {
    pub(crate) fn new() -> Self {
        Self {
            account_transaction: None,
            transfer_direct: None,
            burn_direct: None,
            state: Arc::new(StubState::default()),
        }
    }

    pub(crate) fn with_account_transaction(mut self, tx: Option<PreparedTransaction>) -> Self {
        self.account_transaction = tx;
        self
    }

    /// Prepare fund and burn as direct owner-signed transactions instead of
    /// typed sponsorship payloads.
    pub(crate) fn with_direct_actions(mut self, tx: PreparedTransaction) -> Self {
        self.transfer_direct = Some(tx.clone());
        self.burn_direct = Some(tx);
        self
    }

    pub(crate) fn with_mint_script(self, script: Vec<MintPreparation>) -> Self {
        *self.state.mint_script.lock().unwrap() = script.into();
        self
    }

    pub(crate) fn account_calls(&self) -> usize {
        self.state.account_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn transfer_calls(&self) -> usize {
        self.state.transfer_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn burn_calls(&self) -> usize {
        self.state.burn_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn mint_calls(&self) -> usize {
        self.state.mint_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sponsorship_calls(&self) -> usize {
        self.state.sponsorship_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_sponsorship(&self) -> Option<SponsorshipRequest> {
        self.state.last_sponsorship.lock().unwrap().clone()
    }
}

#[async_trait]
impl BundlerApi for StubBundler {
    async fn account_create(
        &self,
        _chain: Chain,
        _owner: Address,
    ) -> Result<AccountCreation, BundlerError> {
        self.state.account_calls.fetch_add(1, Ordering::SeqCst);
        Ok(AccountCreation {
            account_address: address!("0xcccccccccccccccccccccccccccccccccccccccc"),
            transaction: self.account_transaction.clone(),
        })
    }

    async fn transfer_prepare(
        &self,
        _request: &TransferRequest,
    ) -> Result<PreparedAction, BundlerError> {
        self.state.transfer_calls.fetch_add(1, Ordering::SeqCst);
        Ok(match &self.transfer_direct {
            Some(tx) => PreparedAction::Direct(tx.clone()),
            None => PreparedAction::Sponsored(safe_tx_payload()),
        })
    }

    async fn burn_prepare(&self, _request: &BurnRequest) -> Result<BurnPreparation, BundlerError> {
        self.state.burn_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BurnPreparation {
            bridge_id: BridgeId::new("b1"),
            action: match &self.burn_direct {
                Some(tx) => PreparedAction::Direct(tx.clone()),
                None => PreparedAction::Sponsored(safe_tx_payload()),
            },
        })
    }

    async fn mint_prepare(
        &self,
        _bridge_id: &BridgeId,
        _burn_tx_hash: TxHash,
        _sender: Address,
    ) -> Result<MintPreparation, BundlerError> {
        self.state.mint_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.state.mint_script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(pending))
    }

    async fn gas_sponsorship_prepare(
        &self,
        request: &SponsorshipRequest,
    ) -> Result<PreparedTransaction, BundlerError> {
        self.state.sponsorship_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.last_sponsorship.lock().unwrap() = Some(request.clone());
        Ok(sample_transaction())
    }
}

/// Chain endpoint stub that records broadcasts and hands out sequential
/// transaction hashes. Receipts succeed until `fail_after` is hit.
pub(crate) struct RecordingEndpoint {
    broadcasts: Mutex<Vec<PreparedTransaction>>,
    fail_after_index: AtomicUsize,
}

impl RecordingEndpoint {
    pub(crate) fn new() -> Self {
        Self {
            broadcasts: Mutex::new(Vec::new()),
            fail_after_index: AtomicUsize::new(usize::MAX),
        }
    }

    pub(crate) fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().unwrap().len()
    }

    /// Receipts for every broadcast revert.
    pub(crate) fn set_revert(&self, revert: bool) {
        self.fail_after_index
            .store(if revert { 0 } else { usize::MAX }, Ordering::SeqCst);
    }

    /// Receipts succeed for the first `n` broadcasts, then revert.
    pub(crate) fn fail_after(&self, n: usize) {
        self.fail_after_index.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainEndpoint for RecordingEndpoint {
    async fn broadcast(&self, tx: PreparedTransaction) -> Result<TxHash, ChainError> {
        let mut broadcasts = self.broadcasts.lock().unwrap();
        broadcasts.push(tx);
        Ok(B256::from(U256::from(broadcasts.len() as u64)))
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<Confirmation, ChainError> {
        if self.broadcast_count() > self.fail_after_index.load(Ordering::SeqCst) {
            return Err(ChainError::ExecutionReverted { tx_hash });
        }

        Ok(Confirmation {
            tx_hash,
            block_number: 1,
        })
    }
}

/// Signer whose key access always fails, for order-of-operations tests.
pub(crate) struct FailingSigner;

#[async_trait]
impl alloy::signers::Signer for FailingSigner {
    async fn sign_hash(&self, _hash: &B256) -> Result<Signature, alloy::signers::Error> {
        Err(alloy::signers::Error::other("signer unavailable"))
    }

    fn address(&self) -> Address {
        Address::ZERO
    }

    fn chain_id(&self) -> Option<ChainId> {
        None
    }

    fn set_chain_id(&mut self, _chain_id: Option<ChainId>) {}
}
