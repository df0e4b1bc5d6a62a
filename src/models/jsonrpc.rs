//! JSON-RPC payload parsing at the trust boundary.
//!
//! The request body is turned into an [`RpcPayload`] once. Every item is
//! shape-checked during the parse, so later stages only ever see typed
//! [`RpcCall`]s. The validated JSON text is kept verbatim for forwarding.

use serde::Deserialize;
use serde_json::Value;
use serde_json::value::RawValue;

use crate::error::{AppError, AppResult};

/// The only protocol version tag accepted.
pub const JSONRPC_VERSION: &str = "2.0";

/// The fields the gate inspects. Everything else in the item stays opaque.
///
/// Derived `Deserialize` rejects a repeated `jsonrpc` or `method` key.
#[derive(Deserialize)]
struct Envelope {
    jsonrpc: Option<Value>,
    method: Option<Value>,
}

/// One shape-checked JSON-RPC call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcCall {
    method: String,
}

impl RpcCall {
    pub fn method(&self) -> &str {
        &self.method
    }

    fn from_raw(item: &RawValue) -> AppResult<Self> {
        // serde would also accept a positional array for the struct.
        if !item.get().starts_with('{') {
            return Err(AppError::InvalidRpc);
        }

        let envelope: Envelope =
            serde_json::from_str(item.get()).map_err(|_| AppError::InvalidRpc)?;

        match (envelope.jsonrpc, envelope.method) {
            (Some(Value::String(version)), Some(Value::String(method)))
                if version == JSONRPC_VERSION =>
            {
                Ok(Self { method })
            }
            _ => Err(AppError::InvalidRpc),
        }
    }
}

/// A validated request body: one call or a non-empty batch.
#[derive(Debug)]
pub enum RpcPayload {
    Single { call: RpcCall, raw: Box<RawValue> },
    Batch { calls: Vec<RpcCall>, raw: Box<RawValue> },
}

impl RpcPayload {
    /// Parse and shape-check a request body.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidPayload` if the body is not JSON, is an empty
    ///   array, or is neither an object nor an array.
    /// - `AppError::InvalidRpc` on the first item (in order) lacking
    ///   `"jsonrpc": "2.0"` or a string `method`.
    pub fn parse(body: &[u8]) -> AppResult<Self> {
        let raw: &RawValue = serde_json::from_slice(body).map_err(|_| AppError::InvalidPayload)?;
        let text = raw.get();

        match text.as_bytes().first() {
            Some(b'[') => {
                let items: Vec<&RawValue> =
                    serde_json::from_str(text).map_err(|_| AppError::InvalidPayload)?;
                if items.is_empty() {
                    return Err(AppError::InvalidPayload);
                }

                let calls = items
                    .into_iter()
                    .map(RpcCall::from_raw)
                    .collect::<AppResult<Vec<_>>>()?;

                Ok(Self::Batch {
                    calls,
                    raw: raw.to_owned(),
                })
            }
            Some(b'{') => Ok(Self::Single {
                call: RpcCall::from_raw(raw)?,
                raw: raw.to_owned(),
            }),
            _ => Err(AppError::InvalidPayload),
        }
    }

    /// All calls in request order.
    pub fn calls(&self) -> &[RpcCall] {
        match self {
            Self::Single { call, .. } => std::slice::from_ref(call),
            Self::Batch { calls, .. } => calls,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch { .. })
    }

    /// The validated JSON text, exactly as the client sent it.
    pub fn as_json(&self) -> &str {
        match self {
            Self::Single { raw, .. } | Self::Batch { raw, .. } => raw.get(),
        }
    }
}
