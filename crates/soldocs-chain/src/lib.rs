pub mod client;
pub mod idl;
pub mod retry;

pub use client::{AccountInfo, ChainRpc, JsonRpcChainClient};
pub use idl::{decode_idl_account, derive_idl_address, fetch_idl};
pub use retry::{is_transient, with_retry, DEFAULT_MAX_RETRIES};
