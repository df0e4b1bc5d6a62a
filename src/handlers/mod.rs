mod health;
mod rpc;
pub mod util;

pub use health::health;
pub use rpc::rpc_gate;
