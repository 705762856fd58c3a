//! EIP-712 payload normalization for off-chain co-signing.
//!
//! The preparation service returns typed signing payloads in one of two
//! shapes: a Safe-style "transaction to execute" and a Permit2-style token
//! permission transfer. Both occur with uppercase and lowercase root keys
//! depending on the service version. This module detects the shape once,
//! reshapes the type-declaration map into the canonical
//! `{domain, types, primaryType, message}` envelope, and hands it to an
//! off-chain signer. Values are never transformed; only the type map is
//! reshaped and the primary type selected. An unrecognized shape fails
//! loudly instead of signing the wrong structure.

use alloy::dyn_abi::TypedData;
use serde_json::{Map, Value};

/// Which of the two known EIP-712 root structures a payload carries.
///
/// Determined once at the service boundary and carried explicitly; nothing
/// downstream re-detects the shape by key matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedDataKind {
    /// Safe-style transaction-to-execute payload.
    SafeTx,
    /// Permit2-style token permission transfer.
    Permit2Transfer,
}

impl TypedDataKind {
    pub const fn primary_type(self) -> &'static str {
        match self {
            Self::SafeTx => "SafeTx",
            Self::Permit2Transfer => "PermitTransferFrom",
        }
    }
}

/// Canonical typed-data envelope ready for signing.
#[derive(Debug, Clone)]
pub struct NormalizedTypedData {
    kind: TypedDataKind,
    domain: Value,
    types: Map<String, Value>,
    message: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("unrecognized typed data schema, found root types: {found:?}")]
    UnknownSchema { found: Vec<String> },

    #[error("typed data is missing the {name} struct required by its root type")]
    MissingStruct { name: &'static str },

    #[error("typed data payload is missing the {field} field")]
    MissingField { field: &'static str },

    #[error("failed to assemble canonical typed data envelope")]
    InvalidEnvelope(#[from] serde_json::Error),
}

/// Looks a struct definition up under either naming convention.
fn field_list<'a>(types: &'a Map<String, Value>, keys: [&str; 2]) -> Option<&'a Value> {
    keys.iter().find_map(|key| types.get(*key))
}

/// Normalizes a raw typed signing payload into the canonical envelope.
///
/// Every struct definition the root type depends on is preserved verbatim;
/// a payload whose root type is neither known shape is rejected with
/// [`NormalizeError::UnknownSchema`].
pub fn normalize(raw: &Value) -> Result<NormalizedTypedData, NormalizeError> {
    let types = raw
        .get("types")
        .and_then(Value::as_object)
        .ok_or(NormalizeError::MissingField { field: "types" })?;
    let domain = raw
        .get("domain")
        .cloned()
        .ok_or(NormalizeError::MissingField { field: "domain" })?;
    let message = raw
        .get("message")
        .cloned()
        .ok_or(NormalizeError::MissingField { field: "message" })?;

    let mut canonical = Map::new();
    if let Some(domain_type) = types.get("EIP712Domain") {
        canonical.insert("EIP712Domain".to_owned(), domain_type.clone());
    }

    let kind = if let Some(safe_tx) = field_list(types, ["SafeTx", "safeTx"]) {
        canonical.insert("SafeTx".to_owned(), safe_tx.clone());
        TypedDataKind::SafeTx
    } else if let Some(permit) = field_list(types, ["PermitTransferFrom", "permitTransferFrom"]) {
        let token_permissions = field_list(types, ["TokenPermissions", "tokenPermissions"])
            .ok_or(NormalizeError::MissingStruct {
                name: "TokenPermissions",
            })?;
        canonical.insert("TokenPermissions".to_owned(), token_permissions.clone());
        canonical.insert("PermitTransferFrom".to_owned(), permit.clone());
        TypedDataKind::Permit2Transfer
    } else {
        return Err(NormalizeError::UnknownSchema {
            found: types.keys().cloned().collect(),
        });
    };

    Ok(NormalizedTypedData {
        kind,
        domain,
        types: canonical,
        message,
    })
}

impl NormalizedTypedData {
    pub const fn kind(&self) -> TypedDataKind {
        self.kind
    }

    pub const fn primary_type(&self) -> &'static str {
        self.kind.primary_type()
    }

    /// Assembles the envelope into an alloy [`TypedData`] for signing.
    pub fn to_typed_data(&self) -> Result<TypedData, NormalizeError> {
        let envelope = serde_json::json!({
            "domain": self.domain,
            "types": self.types,
            "primaryType": self.primary_type(),
            "message": self.message,
        });

        Ok(serde_json::from_value(envelope)?)
    }
}
