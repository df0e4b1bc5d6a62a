//! JSON-RPC method whitelist.
//!
//! The set is built once at startup from [`DEFAULT_ALLOWED_METHODS`] plus any
//! `RPC_EXTRA_METHODS` and never changes afterwards. State-mutating methods
//! such as `eth_sendRawTransaction` are not in the default set.

use std::collections::HashSet;

use crate::error::{AppError, AppResult};
use crate::models::RpcPayload;

/// Read-only methods forwarded by default.
pub const DEFAULT_ALLOWED_METHODS: [&str; 9] = [
    "eth_chainId",
    "net_version",
    "eth_blockNumber",
    "eth_call",
    "eth_getBalance",
    "eth_getTransactionReceipt",
    "eth_getTransactionByHash",
    "eth_estimateGas",
    "eth_gasPrice",
];

/// Immutable set of JSON-RPC method names the gate forwards.
#[derive(Debug, Clone)]
pub struct AllowedMethods {
    methods: HashSet<String>,
}

impl AllowedMethods {
    /// Default set extended with `extra`.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let methods = DEFAULT_ALLOWED_METHODS
            .iter()
            .map(|m| (*m).to_string())
            .chain(extra.into_iter().map(Into::into))
            .collect();

        Self { methods }
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains(method)
    }

    /// Number of whitelisted methods.
    pub fn count(&self) -> usize {
        self.methods.len()
    }

    /// Check every call of an already shape-validated payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::RpcMethodNotAllowed` naming the first call, in
    /// request order, whose method is not in the set.
    pub fn check(&self, payload: &RpcPayload) -> AppResult<()> {
        match payload.calls().iter().find(|call| !self.contains(call.method())) {
            Some(call) => Err(AppError::RpcMethodNotAllowed(call.method().to_string())),
            None => Ok(()),
        }
    }
}

impl Default for AllowedMethods {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}
