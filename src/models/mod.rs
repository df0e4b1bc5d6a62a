mod api;
mod jsonrpc;

pub use api::{ErrorBody, HealthResponse};
pub use jsonrpc::{JSONRPC_VERSION, RpcCall, RpcPayload};
