//! Client for the transaction-preparation/bundling service.
//!
//! The service builds every transaction this crate broadcasts: proxy account
//! creation, funding transfers, bridge burns, attestation-gated mints, and
//! gas-sponsored wrappers around owner-signed EIP-712 payloads. The client
//! never inspects what a prepared transaction does; it only carries the
//! typed request/response envelopes.
//!
//! [`BundlerApi`] is the seam the orchestration layers drive, implemented
//! here by the reqwest-backed [`BundlerClient`].

use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::chain::PreparedTransaction;

/// Chains the bridging flow is wired for, serialized as the service's
/// lowercase slugs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Base,
    Arbitrum,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            Self::Ethereum => "ethereum",
            Self::Base => "base",
            Self::Arbitrum => "arbitrum",
        };
        write!(f, "{slug}")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown chain: {0}")]
pub struct UnknownChainError(String);

impl FromStr for Chain {
    type Err = UnknownChainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ethereum" => Ok(Self::Ethereum),
            "base" => Ok(Self::Base),
            "arbitrum" => Ok(Self::Arbitrum),
            other => Err(UnknownChainError(other.to_owned())),
        }
    }
}

/// A USDC amount in human units, serialized as the decimal string the
/// service expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usdc(#[serde(with = "rust_decimal::serde::str")] pub Decimal);

impl fmt::Display for Usdc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Usdc {
    type Err = rust_decimal::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(value).map(Self)
    }
}

/// Opaque bridge correlation key issued by the burn preparation call.
///
/// Together with the burn transaction hash this is sufficient to resume a
/// bridge after a crash or timeout; it must never be discarded once a burn
/// has been submitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgeId(String);

impl BridgeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bridge settlement speed. Fast transfers trade a small fee for attestation
/// at a lower finality threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    Standard,
    Fast,
}

impl FromStr for TransferMode {
    type Err = UnknownTransferModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "standard" => Ok(Self::Standard),
            "fast" => Ok(Self::Fast),
            other => Err(UnknownTransferModeError(other.to_owned())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown transfer mode: {0}")]
pub struct UnknownTransferModeError(String);

/// Closed set of proxy-account transfer actions. Bodies of unrelated DeFi
/// actions never pass through this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferAction {
    Deposit,
    Withdraw,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub owner: Address,
    pub chain: Chain,
    pub token: String,
    pub amount: Usdc,
    pub action: TransferAction,
    pub spender: Address,
    pub gas_sponsorship: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRequest {
    pub owner: Address,
    pub chain: Chain,
    pub amount: Usdc,
    pub destination_chain: Chain,
    pub destination_address: Address,
    pub gas_sponsorship: bool,
    pub transfer_mode: TransferMode,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorshipRequest {
    pub owner: Address,
    pub chain: Chain,
    /// The raw typed signing payload as the service issued it. The service
    /// verifies the signature against this payload before agreeing to pay
    /// gas.
    pub eip712: serde_json::Value,
    pub signature: String,
    pub sender: Address,
}

/// Result of a proxy account create-or-verify call. A `None` transaction
/// means the account already exists.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCreation {
    pub account_address: Address,
    #[serde(default)]
    pub transaction: Option<PreparedTransaction>,
}

/// A prepared step: either a typed payload for the gas-sponsored path or a
/// transaction the owner signs and broadcasts directly.
#[derive(Debug, Clone)]
pub enum PreparedAction {
    Sponsored(serde_json::Value),
    Direct(PreparedTransaction),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferResponse {
    #[serde(default)]
    eip712: Option<serde_json::Value>,
    #[serde(default)]
    transaction: Option<PreparedTransaction>,
}

impl TransferResponse {
    fn into_action(self) -> Result<PreparedAction, BundlerError> {
        match (self.eip712, self.transaction) {
            (Some(payload), _) => Ok(PreparedAction::Sponsored(payload)),
            (None, Some(tx)) => Ok(PreparedAction::Direct(tx)),
            (None, None) => Err(BundlerError::MissingField { field: "transaction" }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BurnResponse {
    #[serde(default)]
    bridge_id: Option<String>,
    #[serde(default)]
    eip712: Option<serde_json::Value>,
    #[serde(default)]
    transaction: Option<PreparedTransaction>,
}

/// Burn preparation: the bridge correlation key plus the payload to execute.
#[derive(Debug, Clone)]
pub struct BurnPreparation {
    pub bridge_id: BridgeId,
    pub action: PreparedAction,
}

/// Raw mint preparation response. Interpreted by the attestation poller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintPreparation {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transaction: Option<PreparedTransaction>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountCreateBody {
    chain: Chain,
    owner: Address,
    sender: Address,
    estimate_gas: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct MintBody {
    bridge_id: BridgeId,
    burn_tx_hash: TxHash,
    sender: Address,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SponsorshipResponse {
    #[serde(default)]
    transaction: Option<PreparedTransaction>,
}

#[derive(Debug, thiserror::Error)]
pub enum BundlerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service refused the owner signature (HTTP {status}): {message}")]
    SignatureRejected { status: u16, message: String },

    #[error("service returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("service response missing required field: {field}")]
    MissingField { field: &'static str },
}

/// Operations the preparation service exposes to the bridging workflow.
#[async_trait]
pub trait BundlerApi: Send + Sync {
    /// Idempotent create-or-verify of the owner's proxy account on a chain.
    async fn account_create(
        &self,
        chain: Chain,
        owner: Address,
    ) -> Result<AccountCreation, BundlerError>;

    /// Prepares a transfer into or out of the owner's proxy account.
    async fn transfer_prepare(
        &self,
        request: &TransferRequest,
    ) -> Result<PreparedAction, BundlerError>;

    /// Prepares the bridge burn, issuing the durable bridge id.
    async fn burn_prepare(&self, request: &BurnRequest) -> Result<BurnPreparation, BundlerError>;

    /// Queries attestation progress and, once attested, the mint transaction.
    async fn mint_prepare(
        &self,
        bridge_id: &BridgeId,
        burn_tx_hash: TxHash,
        sender: Address,
    ) -> Result<MintPreparation, BundlerError>;

    /// Exchanges an owner-signed payload for a sponsor-payable transaction.
    /// The service verifies the signature before building the transaction.
    async fn gas_sponsorship_prepare(
        &self,
        request: &SponsorshipRequest,
    ) -> Result<PreparedTransaction, BundlerError>;
}

/// HTTP client for the preparation service.
pub struct BundlerClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl BundlerClient {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Result<Self, BundlerError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.as_str().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, BundlerError>
    where
        B: Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let response = self
            .http_client
            .post(format!("{}{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BundlerError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl BundlerApi for BundlerClient {
    async fn account_create(
        &self,
        chain: Chain,
        owner: Address,
    ) -> Result<AccountCreation, BundlerError> {
        let body = AccountCreateBody {
            chain,
            owner,
            sender: owner,
            estimate_gas: true,
        };

        self.post("/v2/earn/account", &body).await
    }

    async fn transfer_prepare(
        &self,
        request: &TransferRequest,
    ) -> Result<PreparedAction, BundlerError> {
        let response: TransferResponse = self.post("/v2/earn/transfer", request).await?;
        response.into_action()
    }

    async fn burn_prepare(&self, request: &BurnRequest) -> Result<BurnPreparation, BundlerError> {
        let response: BurnResponse = self.post("/v2/cctp/burn", request).await?;

        let bridge_id = response
            .bridge_id
            .map(BridgeId::new)
            .ok_or(BundlerError::MissingField { field: "bridgeId" })?;

        let action = TransferResponse {
            eip712: response.eip712,
            transaction: response.transaction,
        }
        .into_action()?;

        Ok(BurnPreparation { bridge_id, action })
    }

    async fn mint_prepare(
        &self,
        bridge_id: &BridgeId,
        burn_tx_hash: TxHash,
        sender: Address,
    ) -> Result<MintPreparation, BundlerError> {
        let body = MintBody {
            bridge_id: bridge_id.clone(),
            burn_tx_hash,
            sender,
        };

        let response = self
            .http_client
            .post(format!("{}/v2/cctp/mint", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        // 202 means the attestation is still being produced.
        if response.status() == StatusCode::ACCEPTED {
            return Ok(MintPreparation {
                status: Some("pending".to_owned()),
                transaction: None,
            });
        }

        let status = response.status();
        if !status.is_success() {
            return Err(BundlerError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json().await?)
    }

    async fn gas_sponsorship_prepare(
        &self,
        request: &SponsorshipRequest,
    ) -> Result<PreparedTransaction, BundlerError> {
        let response = self
            .http_client
            .post(format!("{}/v2/gas-sponsorship/prepare", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            // The service cryptographically verifies the owner signature
            // before agreeing to pay gas; a client error here means the
            // signature (or its payload) did not check out. Retrying with
            // the same signature cannot succeed.
            return Err(BundlerError::SignatureRejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        if !status.is_success() {
            return Err(BundlerError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: SponsorshipResponse = response.json().await?;
        body.transaction
            .ok_or(BundlerError::MissingField { field: "transaction" })
    }
}
